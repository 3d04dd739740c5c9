//! Single-consumer result collection.
//!
//! One task owns the user context and drains the result channel; because
//! nothing else touches the context, `Site::collect_results` needs no
//! synchronization. The context is handed back when the channel closes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::site::Site;

/// Spawn the collector task. Resolves to the context once every result
/// sender is gone.
pub fn spawn_collector<S: Site>(
    site: Arc<S>,
    mut context: S::Context,
    mut rx: mpsc::Receiver<Value>,
) -> tokio::task::JoinHandle<S::Context> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            site.collect_results(&mut context, record);
        }
        context
    })
}
