//! Canonicalization properties.

use hivecrawl::clean_url;
use proptest::prelude::*;

const BASE: &str = "https://www.glosbe.example";

#[test]
fn canonical_forms_are_byte_equal_identities() {
    let same = [
        "https://www.glosbe.example/en/zh/hello",
        "/en/zh/hello",
        "/en/zh/hello/",
        "en/zh/hello",
        " /en/zh/hello ",
        "/en//zh/hello",
    ];
    for url in same {
        assert_eq!(clean_url(BASE, url), "/en/zh/hello", "for input {url:?}");
    }
}

#[test]
fn invalid_input_yields_root() {
    for url in ["", " ", "/", "//", "///"] {
        assert_eq!(clean_url(BASE, url), "/");
    }
}

proptest! {
    #[test]
    fn clean_is_idempotent(raw in "[a-zA-Z0-9/_ .-]{0,40}") {
        let once = clean_url(BASE, &raw);
        prop_assert_eq!(clean_url(BASE, &once), once.clone());
    }

    #[test]
    fn clean_always_yields_a_leading_slash(raw in "[a-zA-Z0-9/_ .-]{0,40}") {
        let cleaned = clean_url(BASE, &raw);
        prop_assert!(cleaned.starts_with('/'));
    }

    #[test]
    fn clean_strips_the_base_prefix(path in "[a-z0-9/-]{0,30}") {
        let absolute = format!("{BASE}/{path}");
        prop_assert_eq!(clean_url(BASE, &absolute), clean_url(BASE, &format!("/{path}")));
    }
}
