//! Free-text sanitization applied to every submission before it is stored.

use std::collections::HashSet;
use std::sync::OnceLock;

// Keeps no tags at all, so `<pre>` and friends never reach a second pass.
fn cleaner() -> &'static ammonia::Builder<'static> {
    static CLEANER: OnceLock<ammonia::Builder<'static>> = OnceLock::new();
    CLEANER.get_or_init(|| {
        let mut builder = ammonia::Builder::empty();
        builder.clean_content_tags(HashSet::from(["script", "style"]));
        builder
    })
}

/// Strip every tag, dropping script and style bodies entirely, and keep the readable text
/// HTML-escaped.
///
/// The output is already in sanitized form, so running it through again is a no-op.
pub fn sanitize_text(raw: &str) -> String {
    cleaner().clean(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "plain tip about the shipment",
        "<script>alert(1)</script>Hello",
        "<img src=x onerror=alert(1)>caught",
        "<a href=\"javascript:alert(1)\">click</a>",
        "<a href=\"https://example.org/report\">source</a>",
        "<b>bold</b> and <i>italic</i>",
        "a < b && c > d",
        "&lt;script&gt;already escaped&lt;/script&gt;",
        "<style>body{display:none}</style>visible",
        "<div onclick=\"steal()\">text</div>",
        "unterminated <b tag",
        "emoji 🙂 and accents é",
        "<pre>\n\nx</pre>",
        "<textarea>\n\nnote</textarea>",
        "<listing>\n\nrow</listing>",
    ];

    #[test]
    fn script_payload_keeps_only_text() {
        let cleaned = sanitize_text("<script>alert(1)</script>Hello");
        assert!(!cleaned.to_ascii_lowercase().contains("<script"));
        assert!(!cleaned.contains("alert(1)"));
        assert!(cleaned.contains("Hello"));
    }

    #[test]
    fn event_handlers_and_javascript_urls_are_removed() {
        let img = sanitize_text("<img src=x onerror=alert(1)>caught");
        assert!(!img.contains("onerror"));
        assert!(img.contains("caught"));

        let link = sanitize_text("<a href=\"javascript:alert(1)\">click</a>");
        assert!(!link.contains("javascript:"));
        assert!(link.contains("click"));
    }

    #[test]
    fn no_markup_survives() {
        let cleaned = sanitize_text(
            "<b>bold</b> <pre>\n\nblock</pre> <a href=\"https://example.org\">x</a>",
        );
        assert!(!cleaned.contains('<'));
        assert!(cleaned.contains("bold"));
        assert!(cleaned.contains("block"));
    }

    #[test]
    fn leading_newlines_in_preformatted_blocks_are_stable() {
        let once = sanitize_text("<pre>\n\nx</pre>");
        assert_eq!(sanitize_text(&once), once);
        assert!(!once.contains("pre"));
    }

    #[test]
    fn plain_text_survives_untouched() {
        assert_eq!(
            sanitize_text("Tip: check warehouse 3"),
            "Tip: check warehouse 3"
        );
    }

    #[test]
    fn sanitizing_twice_matches_sanitizing_once() {
        for sample in SAMPLES {
            let once = sanitize_text(sample);
            let twice = sanitize_text(&once);
            assert_eq!(once, twice, "sanitizer not idempotent for {sample:?}");
        }
    }
}
