use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use url::Url;

use crate::archive::{self, RESOURCE_TAGS};
use crate::cli::ExternalPolicy;
use crate::paths;

/// Read-only view the rewriter needs for one page: the accumulated
/// canonical-URL → local-path map plus the page's own identity.
pub struct RewriteContext<'a> {
    pub url_map: &'a HashMap<Url, PathBuf>,
    pub page_url: &'a Url,
    pub base_url: &'a Url,
    pub external: ExternalPolicy,
}

/// Rewrites every link-bearing attribute of interest to a path relative to
/// the current page's own local file (forward slashes) when the target is a
/// mapped same-site resource. Unmapped anchors follow the external-link
/// policy; unmapped non-anchors keep their original value, so a failed
/// download degrades to a broken-but-present link.
///
/// Re-running over already-rewritten output is a no-op: relative values
/// resolve to URLs that are either absent from the map or map back to the
/// same relative path.
pub fn rewrite(html: &str, ctx: &RewriteContext<'_>) -> anyhow::Result<String> {
    let page_dir = ctx
        .url_map
        .get(ctx.page_url)
        .and_then(|path| path.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut handlers = Vec::new();

    let anchor_dir = page_dir.clone();
    handlers.push(element!("a[href]", move |el| {
        let Some(raw) = el.get_attribute("href") else {
            return Ok(());
        };
        if let Some(value) = anchor_target(&raw, ctx, &anchor_dir) {
            el.set_attribute("href", &value)?;
        }
        Ok(())
    }));

    for (tag, attr, _) in RESOURCE_TAGS {
        let dir = page_dir.clone();
        handlers.push(element!(format!("{tag}[{attr}]"), move |el| {
            let Some(raw) = el.get_attribute(attr) else {
                return Ok(());
            };
            if let Some(value) = resource_target(&raw, ctx, &dir) {
                el.set_attribute(attr, &value)?;
            }
            Ok(())
        }));
    }

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .context("rewrite page markup")
}

fn anchor_target(raw: &str, ctx: &RewriteContext<'_>, page_dir: &Path) -> Option<String> {
    let canonical = archive::canonicalize(raw, ctx.page_url)?;
    if canonical.scheme() != "http" && canonical.scheme() != "https" {
        return None;
    }

    if archive::same_site(&canonical, ctx.base_url) {
        if let Some(local) = ctx.url_map.get(&canonical) {
            return Some(paths::relative_from(local, page_dir));
        }
        // Same-site page that never made it into the mirror: keep the
        // attribute as written rather than pointing it off-site.
        return None;
    }

    match ctx.external {
        ExternalPolicy::Original => Some(canonical.into()),
        ExternalPolicy::Archive | ExternalPolicy::Delete => None,
    }
}

fn resource_target(raw: &str, ctx: &RewriteContext<'_>, page_dir: &Path) -> Option<String> {
    let canonical = archive::canonicalize(raw, ctx.base_url)?;
    if canonical.scheme() != "http" && canonical.scheme() != "https" {
        return None;
    }
    if !archive::same_site(&canonical, ctx.base_url) {
        return None;
    }
    let local = ctx.url_map.get(&canonical)?;
    Some(paths::relative_from(local, page_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test url")
    }

    fn fixture() -> (HashMap<Url, PathBuf>, Url, Url) {
        let base = url("https://example.com/");
        let mut map = HashMap::new();
        map.insert(base.clone(), PathBuf::from("index.html"));
        map.insert(
            url("https://example.com/about"),
            PathBuf::from("about/index.html"),
        );
        map.insert(
            url("https://example.com/img/logo.png"),
            PathBuf::from("assets/img/logo.png"),
        );
        let page = base.clone();
        (map, page, base)
    }

    #[test]
    fn same_site_image_becomes_relative_and_external_script_is_kept() {
        let (map, page, base) = fixture();
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html = r#"<img src="/img/logo.png"><script src="https://cdn.partner.net/lib.js"></script>"#;
        let out = rewrite(html, &ctx).expect("rewrite");
        assert!(out.contains(r#"<img src="assets/img/logo.png">"#), "got: {out}");
        assert!(out.contains(r#"src="https://cdn.partner.net/lib.js""#));
    }

    #[test]
    fn relative_paths_climb_out_of_nested_page_directories() {
        let (map, _, base) = fixture();
        let page = url("https://example.com/about");
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html = r#"<img src="/img/logo.png"><a href="/">Home</a>"#;
        let out = rewrite(html, &ctx).expect("rewrite");
        assert!(out.contains(r#"<img src="../assets/img/logo.png">"#), "got: {out}");
        assert!(out.contains(r#"<a href="../index.html">"#), "got: {out}");
    }

    #[test]
    fn external_anchor_policy_original_substitutes_canonical_url() {
        let (map, page, base) = fixture();
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html = r#"<a href="https://web.archive.org/web/20200101000000/https://partner.net/deal">Deal</a>"#;
        let out = rewrite(html, &ctx).expect("rewrite");
        assert!(out.contains(r#"href="https://partner.net/deal""#), "got: {out}");
    }

    #[test]
    fn external_anchor_policy_archive_leaves_the_archived_form() {
        let (map, page, base) = fixture();
        for policy in [ExternalPolicy::Archive, ExternalPolicy::Delete] {
            let ctx = RewriteContext {
                url_map: &map,
                page_url: &page,
                base_url: &base,
                external: policy,
            };
            let html =
                r#"<a href="https://web.archive.org/web/20200101000000/https://partner.net/deal">Deal</a>"#;
            let out = rewrite(html, &ctx).expect("rewrite");
            assert!(
                out.contains(r#"href="https://web.archive.org/web/20200101000000/https://partner.net/deal""#),
                "got: {out}"
            );
        }
    }

    #[test]
    fn archive_encoded_same_site_references_resolve_through_the_map() {
        let (map, page, base) = fixture();
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html =
            r#"<img src="/web/20200101000000im_/https://example.com/img/logo.png">"#;
        let out = rewrite(html, &ctx).expect("rewrite");
        assert!(out.contains(r#"<img src="assets/img/logo.png">"#), "got: {out}");
    }

    #[test]
    fn rewriting_already_rewritten_markup_is_stable() {
        let (map, page, base) = fixture();
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html = r#"<img src="/img/logo.png"><a href="/about">About</a>"#;
        let once = rewrite(html, &ctx).expect("first pass");
        let twice = rewrite(&once, &ctx).expect("second pass");
        assert_eq!(once, twice);
    }

    #[test]
    fn data_uris_are_left_alone() {
        let (map, page, base) = fixture();
        let ctx = RewriteContext {
            url_map: &map,
            page_url: &page,
            base_url: &base,
            external: ExternalPolicy::Original,
        };

        let html = r#"<img src="data:image/png;base64,AAAA">"#;
        let out = rewrite(html, &ctx).expect("rewrite");
        assert!(out.contains("data:image/png;base64,AAAA"));
    }
}
