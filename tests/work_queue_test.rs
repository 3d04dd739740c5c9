//! Work-queue discipline tests against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use hivecrawl::stats::spawn_aggregator;
use hivecrawl::work_queue::{UrlCleaner, WorkQueue};
use hivecrawl::{Store, clean_url};

const BASE: &str = "https://site.example";

fn cleaner() -> UrlCleaner {
    Arc::new(|url: &str| clean_url(BASE, url))
}

fn queue_on(store: Arc<dyn Store>) -> (WorkQueue, hivecrawl::StatsSnapshot) {
    let (stats, snapshot, _task) = spawn_aggregator(1024);
    let queue = WorkQueue::new(
        store,
        "qtest",
        cleaner(),
        stats,
        Duration::from_millis(100),
        3,
    );
    (queue, snapshot)
}

#[tokio::test]
async fn push_then_pop_returns_canonical_url() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    assert!(queue.push("https://site.example/word/hi/", 0, false).await.unwrap());
    let job = queue.pop().await.unwrap().unwrap();
    assert_eq!(job.url, "/word/hi");
    assert_eq!(job.retry, 0);
    assert_eq!(queue.doing_len().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_and_done_urls_are_not_requeued() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    assert!(queue.push("/a", 0, false).await.unwrap());
    assert!(!queue.push("/a/", 0, false).await.unwrap());

    let job = queue.pop().await.unwrap().unwrap();
    queue.finish(&job.url).await.unwrap();
    // Finished URLs stay finished even after the seen-cache would expire.
    assert!(!queue.push("/a", 0, false).await.unwrap());
    assert_eq!(queue.todo_len().await.unwrap(), 0);
}

#[tokio::test]
async fn urls_in_doing_are_not_requeued() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    queue.push("/a", 0, false).await.unwrap();
    let job = queue.pop().await.unwrap().unwrap();
    assert!(!queue.push(&job.url, 0, false).await.unwrap());
}

#[tokio::test]
async fn front_pushes_are_served_before_the_backlog() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    queue.push("/backlog1", 0, false).await.unwrap();
    queue.push("/backlog2", 0, false).await.unwrap();
    queue.push("/seed", 0, true).await.unwrap();

    assert_eq!(queue.pop().await.unwrap().unwrap().url, "/seed");
    assert_eq!(queue.pop().await.unwrap().unwrap().url, "/backlog1");
    assert_eq!(queue.pop().await.unwrap().unwrap().url, "/backlog2");
}

#[tokio::test]
async fn pop_times_out_on_empty_queue() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);
    assert!(queue.pop().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_jobs_requeue_with_incremented_retry() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    queue.push("/x", 0, false).await.unwrap();
    let job = queue.pop().await.unwrap().unwrap();
    queue.fail_recoverable(&job).await.unwrap();

    let requeued = queue.pop().await.unwrap().unwrap();
    assert_eq!(requeued.url, "/x");
    assert_eq!(requeued.retry, 1);
    assert_eq!(queue.doing_len().await.unwrap(), 1);
}

#[tokio::test]
async fn retries_are_bounded_to_four_total_attempts() {
    let (_, store) = common::memory_store();
    let (queue, snapshot) = queue_on(store);

    queue.push("/x", 0, false).await.unwrap();
    let mut attempts = 0;
    while let Some(job) = queue.pop().await.unwrap() {
        attempts += 1;
        queue.fail_recoverable(&job).await.unwrap();
    }
    // Initial attempt plus three requeues.
    assert_eq!(attempts, 4);
    assert_eq!(queue.todo_len().await.unwrap(), 0);
    assert_eq!(queue.doing_len().await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(snapshot.get(hivecrawl::stats::DISCARDED_JOBS), 1);
}

#[tokio::test]
async fn rollback_moves_doing_back_to_todo() {
    let (raw, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    // Simulate a crashed run that claimed two URLs.
    raw.set_add("qtest_doing", "/p").await.unwrap();
    raw.set_add("qtest_doing", "/q").await.unwrap();

    queue.rollback().await.unwrap();
    assert_eq!(queue.doing_len().await.unwrap(), 0);
    assert_eq!(queue.todo_len().await.unwrap(), 2);

    let mut recovered = vec![
        queue.pop().await.unwrap().unwrap().url,
        queue.pop().await.unwrap().unwrap().url,
    ];
    recovered.sort();
    assert_eq!(recovered, vec!["/p", "/q"]);
}

#[tokio::test]
async fn rollback_respects_already_done_urls() {
    let (raw, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    raw.set_add("qtest_done", "/p").await.unwrap();
    raw.set_add("qtest_doing", "/p").await.unwrap();

    queue.rollback().await.unwrap();
    assert_eq!(queue.todo_len().await.unwrap(), 0);
}

#[tokio::test]
async fn reset_empties_every_collection() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    queue.push("/a", 0, false).await.unwrap();
    queue.push("/b", 0, false).await.unwrap();
    let job = queue.pop().await.unwrap().unwrap();
    queue.finish(&job.url).await.unwrap();

    queue.reset().await.unwrap();
    assert_eq!(queue.todo_len().await.unwrap(), 0);
    assert_eq!(queue.doing_len().await.unwrap(), 0);
    assert_eq!(queue.done_len().await.unwrap(), 0);
    // And the seen-cache was dropped with the store state.
    assert!(queue.push("/a", 0, false).await.unwrap());
}

#[tokio::test]
async fn legacy_bare_string_entries_are_claimable() {
    let (raw, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    raw.list_push_front("qtest_todo", "/legacy/entry")
        .await
        .unwrap();
    let job = queue.pop().await.unwrap().unwrap();
    assert_eq!(job.url, "/legacy/entry");
    assert_eq!(job.retry, 0);
}

#[tokio::test]
async fn done_set_holds_each_url_once() {
    let (_, store) = common::memory_store();
    let (queue, _) = queue_on(store);

    queue.finish("/a").await.unwrap();
    queue.finish("/a").await.unwrap();
    assert_eq!(queue.done_len().await.unwrap(), 1);
}
