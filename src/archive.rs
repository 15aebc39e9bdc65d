use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use url::Url;

const DEFAULT_ARCHIVE_HOST: &str = "https://web.archive.org";

/// Base URL of the Wayback playback service. Overridable for tests that
/// stand in their own archive endpoint.
pub fn archive_host() -> String {
    std::env::var("WAYMIRROR_ARCHIVE_HOST").unwrap_or_else(|_| DEFAULT_ARCHIVE_HOST.to_owned())
}

// Archive-relative reference: /web/<14+ digit timestamp><optional infix>/<original url>
static RELATIVE_ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/web/(\d{14,})[a-z_]*/(https?://.+)$").expect("relative archive pattern")
});

// Absolute playback URL with the same timestamp/infix shape.
static ABSOLUTE_ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://web\.archive\.org/web/(\d{14,})[a-z_]*/(https?://.+)$")
        .expect("absolute archive pattern")
});

// Snapshot input links come from the archive UI and may carry any digit run.
static SNAPSHOT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://web\.archive\.org/web/(\d+)[a-zA-Z_]*/(https?://.+)$")
        .expect("snapshot link pattern")
});

const SKIP_DOMAINS: &[&str] = &[
    "api.",
    "ssc.api.bbc.com",
    "scorecardresearch",
    "doubleclick.net",
    "chartbeat.com",
    "google-analytics.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "googletagservices.com",
];

/// Tracking/analytics hosts that are intentionally never fetched.
pub fn is_skip_listed(url: &str) -> bool {
    SKIP_DOMAINS.iter().any(|pattern| url.contains(pattern))
}

/// One archived capture of the site: the archive-assigned timestamp plus the
/// site's entry URL.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: String,
    pub base_url: Url,
}

impl Snapshot {
    pub fn parse(link: &str) -> anyhow::Result<Self> {
        let captures = SNAPSHOT_LINK_RE
            .captures(link.trim())
            .ok_or_else(|| anyhow::anyhow!("not a wayback snapshot link: {link}"))?;
        let timestamp = captures[1].to_owned();
        let base_url = Url::parse(&captures[2])
            .with_context(|| format!("parse archived site url in: {link}"))?;
        Ok(Self {
            timestamp,
            base_url,
        })
    }

    /// Parses the full input list. All links MUST reference the same site;
    /// disagreement or a malformed link aborts before any crawling begins.
    pub fn parse_all(links: &[String]) -> anyhow::Result<Vec<Self>> {
        if links.is_empty() {
            anyhow::bail!("at least one snapshot link is required");
        }

        let mut snapshots = Vec::with_capacity(links.len());
        for link in links {
            snapshots.push(Self::parse(link)?);
        }

        let base_url = &snapshots[0].base_url;
        for snapshot in &snapshots[1..] {
            if snapshot.base_url != *base_url {
                anyhow::bail!(
                    "all snapshot links must reference the same site: {} vs {}",
                    base_url,
                    snapshot.base_url
                );
            }
        }

        Ok(snapshots)
    }
}

/// Short code embedded in a playback URL telling the archive how to serve a
/// resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Script,
    Stylesheet,
    Media,
}

impl ResourceKind {
    pub fn infix(self) -> &'static str {
        match self {
            Self::Image => "im_",
            Self::Script => "js_",
            Self::Stylesheet => "cs_",
            Self::Media => "id_",
        }
    }
}

/// The closed set of link-bearing tags the mirror downloads, with the
/// attribute that carries the reference.
pub const RESOURCE_TAGS: &[(&str, &str, ResourceKind)] = &[
    ("img", "src", ResourceKind::Image),
    ("script", "src", ResourceKind::Script),
    ("link", "href", ResourceKind::Stylesheet),
    ("source", "src", ResourceKind::Media),
    ("video", "src", ResourceKind::Media),
    ("audio", "src", ResourceKind::Media),
    ("iframe", "src", ResourceKind::Media),
];

/// Strips archive timestamp/infix encoding from a link, yielding the original
/// site URL. Returns `None` for links that cannot be resolved at all; the
/// caller leaves those untouched.
///
/// `data:` URIs pass through unchanged. A `/web/` prefix that fails the
/// timestamp pattern resolves against the archive host itself (known
/// imprecision kept from the reference behavior).
pub fn canonicalize(link: &str, base: &Url) -> Option<Url> {
    if link.starts_with("data:") {
        return Url::parse(link).ok();
    }

    if let Some(captures) = RELATIVE_ARCHIVE_RE.captures(link) {
        return Url::parse(&captures[2]).ok();
    }

    if link.contains("web.archive.org") {
        if let Some(captures) = ABSOLUTE_ARCHIVE_RE.captures(link) {
            return Url::parse(&captures[2]).ok();
        }
    }

    if link.starts_with("/web/") {
        return Url::parse(&archive_host()).ok()?.join(link).ok();
    }

    base.join(link).ok()
}

/// Playback URL for a page capture: `{host}/web/{timestamp}/{url}`.
pub fn page_url(timestamp: &str, url: &Url) -> String {
    format!("{}/web/{timestamp}/{url}", archive_host())
}

/// Playback URL for a resource capture: `{host}/web/{timestamp}{infix}/{url}`.
/// Already-archived references are returned as given.
pub fn resource_url(timestamp: &str, kind: ResourceKind, url: &Url) -> String {
    if ABSOLUTE_ARCHIVE_RE.is_match(url.as_str()) {
        return url.to_string();
    }
    format!("{}/web/{timestamp}{}/{url}", archive_host(), kind.infix())
}

/// Two URLs belong to the same mirrored site when host and port agree.
pub fn same_site(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
