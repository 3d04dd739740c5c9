//! URL canonicalization.
//!
//! Every URL entering the work queue passes through `clean_url`; the cleaned
//! form is the identity key deciding whether a page was visited before.

/// Canonicalize `url` into a stable queue key relative to `base_url`.
///
/// Strips the base prefix, trims whitespace, drops trailing slashes,
/// collapses duplicate slashes, and guarantees a leading `/`. Never fails:
/// degenerate input canonicalizes to `"/"`. Idempotent, so cleaning an
/// already-cleaned URL is a no-op.
#[must_use]
pub fn clean_url(base_url: &str, url: &str) -> String {
    let mut url = if base_url.is_empty() {
        url.to_string()
    } else {
        url.replace(base_url, "")
    };
    url = url.trim().to_string();
    while url.contains("//") {
        url = url.replace("//", "/");
    }
    // Trailing slashes can expose trailing whitespace (and vice versa), so
    // strip both kinds together to stay idempotent.
    let url = url.trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    if url.is_empty() {
        return "/".to_string();
    }
    if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://dict.example.com";

    #[test]
    fn strips_base_and_trailing_slash() {
        assert_eq!(
            clean_url(BASE, "https://dict.example.com/word/hello/"),
            "/word/hello"
        );
        assert_eq!(clean_url(BASE, "/word/hello"), "/word/hello");
    }

    #[test]
    fn collapses_duplicate_slashes() {
        assert_eq!(clean_url(BASE, "/a//b"), "/a/b");
        assert_eq!(clean_url(BASE, "///a"), "/a");
    }

    #[test]
    fn degenerate_input_becomes_root() {
        assert_eq!(clean_url(BASE, ""), "/");
        assert_eq!(clean_url(BASE, "   "), "/");
        assert_eq!(clean_url(BASE, "/"), "/");
        assert_eq!(clean_url(BASE, "https://dict.example.com"), "/");
    }

    #[test]
    fn adds_missing_leading_slash() {
        assert_eq!(clean_url(BASE, "word/hi"), "/word/hi");
    }

    #[test]
    fn idempotent_on_typical_inputs() {
        for raw in ["/a//b/", "https://dict.example.com/x/", " /y ", "z", ""] {
            let once = clean_url(BASE, raw);
            assert_eq!(clean_url(BASE, &once), once, "not idempotent for {raw:?}");
        }
    }
}
