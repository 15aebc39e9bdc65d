use std::collections::HashSet;

use anyhow::Context as _;
use lol_html::{RewriteStrSettings, comments, element, rewrite_str};
use scraper::{Html, Selector};

// Playback banner, toolbar and analytics artifacts injected by the archive.
// Best-effort: unmatched content is untouched.
const ARCHIVE_DOMAIN_MARKERS: &[&str] = &[
    "web.archive.org",
    "archive.org",
    "web-static.archive.org",
];
const PLAYBACK_SCRIPT_MARKERS: &[&str] = &[
    "wombat.js",
    "banner-styles",
    "ruffle.js",
    "analytics.js",
    "google-analytics.com",
];
const SCRIPT_TEXT_MARKERS: &[&str] = &["Wayback", "wayback"];
const TOOLBAR_CSS_MARKERS: &[&str] = &["wm-toolbar", "wm-ipp"];
const TOOLBAR_COMMENT_MARKERS: &[&str] = &["WAYBACK TOOLBAR", "archive.org", "ARCHIVE"];

fn is_junk_script(src: &str, text: &str) -> bool {
    ARCHIVE_DOMAIN_MARKERS.iter().any(|m| src.contains(m))
        || PLAYBACK_SCRIPT_MARKERS.iter().any(|m| src.contains(m))
        || SCRIPT_TEXT_MARKERS.iter().any(|m| text.contains(m))
}

// Inline text is invisible to the streaming pass, so junk decided by element
// content (script bodies, style sheets) is located up front by document-order
// index; the removal pass counts matching start tags in the same order.
fn inline_junk_indices(html: &str) -> (HashSet<usize>, HashSet<usize>) {
    let document = Html::parse_document(html);
    let mut scripts = HashSet::new();
    let mut styles = HashSet::new();

    if let Ok(selector) = Selector::parse("script") {
        for (index, element) in document.select(&selector).enumerate() {
            let src = element.value().attr("src").unwrap_or_default();
            let text: String = element.text().collect();
            if is_junk_script(src, &text) {
                scripts.insert(index);
            }
        }
    }
    if let Ok(selector) = Selector::parse("style") {
        for (index, element) in document.select(&selector).enumerate() {
            let text: String = element.text().collect();
            if TOOLBAR_CSS_MARKERS.iter().any(|m| text.contains(m)) {
                styles.insert(index);
            }
        }
    }

    (scripts, styles)
}

fn references_archive(value: &str) -> bool {
    ARCHIVE_DOMAIN_MARKERS.iter().any(|m| value.contains(m))
}

/// Strips archive-injected playback artifacts from a page: toolbar markup and
/// CSS, wombat/banner/analytics scripts, archive-domain links, iframes and
/// meta references, toolbar comments, and all `noscript` blocks (their
/// content was archive-time conditional and is unreliable in a mirror).
pub fn scrub(html: &str) -> anyhow::Result<String> {
    let (junk_scripts, junk_styles) = inline_junk_indices(html);

    let mut script_index = 0usize;
    let mut style_index = 0usize;

    let mut handlers = vec![
        element!("script", move |el| {
            if junk_scripts.contains(&script_index) {
                el.remove();
            }
            script_index += 1;
            Ok(())
        }),
        element!("style", move |el| {
            if junk_styles.contains(&style_index) {
                el.remove();
            }
            style_index += 1;
            Ok(())
        }),
        element!("link[href]", |el| {
            if el.get_attribute("href").is_some_and(|href| references_archive(&href)) {
                el.remove();
            }
            Ok(())
        }),
        element!("iframe[src]", |el| {
            if el.get_attribute("src").is_some_and(|src| references_archive(&src)) {
                el.remove();
            }
            Ok(())
        }),
        element!("meta[content]", |el| {
            if el.get_attribute("content").is_some_and(|content| references_archive(&content)) {
                el.remove();
            }
            Ok(())
        }),
        element!(r#"[id*="wm-ipp"]"#, |el| {
            el.remove();
            Ok(())
        }),
        element!("noscript", |el| {
            el.remove();
            Ok(())
        }),
    ];

    handlers.push(comments!("*", |comment| {
        let text = comment.text();
        if TOOLBAR_COMMENT_MARKERS.iter().any(|m| text.contains(m)) {
            comment.remove();
        }
        Ok(())
    }));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .context("scrub archive artifacts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_scripts_by_every_source_marker() {
        for marker in ARCHIVE_DOMAIN_MARKERS.iter().chain(PLAYBACK_SCRIPT_MARKERS) {
            let html = format!(r#"<body><script src="https://{marker}/x.js"></script><p>keep</p></body>"#);
            let out = scrub(&html).expect("scrub");
            assert!(!out.contains("script"), "marker {marker} survived: {out}");
            assert!(out.contains("<p>keep</p>"));
        }
    }

    #[test]
    fn removes_inline_scripts_by_text_marker() {
        for marker in SCRIPT_TEXT_MARKERS {
            let html = format!("<body><script>var x = '{marker} banner';</script></body>");
            let out = scrub(&html).expect("scrub");
            assert!(!out.contains("script"), "marker {marker} survived: {out}");
        }

        let out = scrub("<body><script>var site = 1;</script></body>").expect("scrub");
        assert!(out.contains("var site = 1;"));
    }

    #[test]
    fn keeps_ordinary_scripts_adjacent_to_junk() {
        let html = r#"<body>
            <script>var keep_me = 1;</script>
            <script>/* Wayback rewrite shim */</script>
            <script>var also_kept = 2;</script>
        </body>"#;
        let out = scrub(html).expect("scrub");
        assert!(out.contains("var keep_me = 1;"));
        assert!(out.contains("var also_kept = 2;"));
        assert!(!out.contains("Wayback"));
    }

    #[test]
    fn removes_archive_links_and_iframes_and_meta() {
        let html = r#"<head>
            <link rel="stylesheet" href="https://web-static.archive.org/banner.css">
            <link rel="stylesheet" href="/site.css">
            <meta name="origin" content="https://web.archive.org/web/x">
            <meta charset="utf-8">
        </head><body>
            <iframe src="https://web.archive.org/frame"></iframe>
            <iframe src="/player.html"></iframe>
        </body>"#;
        let out = scrub(html).expect("scrub");
        assert!(!out.contains("banner.css"));
        assert!(out.contains("/site.css"));
        assert!(!out.contains(r#"content="https://web.archive.org"#));
        assert!(out.contains("charset"));
        assert!(!out.contains("https://web.archive.org/frame"));
        assert!(out.contains("/player.html"));
    }

    #[test]
    fn removes_toolbar_styles_by_every_marker() {
        for marker in TOOLBAR_CSS_MARKERS {
            let html = format!("<head><style>#{marker} {{ display: block; }}</style><style>p {{ color: red; }}</style></head>");
            let out = scrub(&html).expect("scrub");
            assert!(!out.contains(marker), "marker {marker} survived: {out}");
            assert!(out.contains("color: red"));
        }
    }

    #[test]
    fn removes_elements_with_toolbar_ids() {
        let html = r#"<body><div id="wm-ipp-base"><p>toolbar</p></div><div id="content">site</div></body>"#;
        let out = scrub(html).expect("scrub");
        assert!(!out.contains("toolbar"));
        assert!(out.contains("site"));
    }

    #[test]
    fn removes_toolbar_comments_by_every_marker() {
        for marker in TOOLBAR_COMMENT_MARKERS {
            let html = format!("<body><!-- BEGIN {marker} INSERT --><p>x</p><!-- plain note --></body>");
            let out = scrub(&html).expect("scrub");
            assert!(!out.contains(marker), "marker {marker} survived: {out}");
            assert!(out.contains("plain note"));
        }
    }

    #[test]
    fn removes_all_noscript_blocks() {
        let html = "<body><noscript><img src='/tracking.gif'></noscript><p>kept</p></body>";
        let out = scrub(html).expect("scrub");
        assert!(!out.contains("noscript"));
        assert!(!out.contains("tracking.gif"));
        assert!(out.contains("kept"));
    }
}
