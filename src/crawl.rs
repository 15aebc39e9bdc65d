use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use crate::archive::{self, Snapshot};
use crate::cli::MirrorArgs;
use crate::extract::{self, ResourceRef};
use crate::fetch::{self, Candidate};
use crate::paths;
use crate::rewrite::{self, RewriteContext};
use crate::scrub;
use crate::sitemap::{self, PageEntry};

/// Crawl-lifetime state: the canonical-URL → local-path map, the set of
/// resources already attempted, and the breadth-first frontier. Owned
/// exclusively by the engine; helpers get read access through borrows.
struct MirrorState {
    url_map: HashMap<Url, PathBuf>,
    attempted: HashSet<Url>,
    visited: HashSet<Url>,
    enqueued: HashSet<Url>,
    frontier: VecDeque<Url>,
}

impl MirrorState {
    fn new(entry: Url) -> Self {
        let mut state = Self {
            url_map: HashMap::new(),
            attempted: HashSet::new(),
            visited: HashSet::new(),
            enqueued: HashSet::new(),
            frontier: VecDeque::new(),
        };
        state.enqueue(entry);
        state
    }

    /// Appends a URL to the frontier unless it was ever enqueued before.
    fn enqueue(&mut self, url: Url) -> bool {
        if self.enqueued.insert(url.clone()) {
            self.frontier.push_back(url);
            true
        } else {
            false
        }
    }
}

pub async fn run(args: MirrorArgs) -> anyhow::Result<()> {
    let snapshots = Snapshot::parse_all(&args.snapshots).context("validate snapshot links")?;
    let base_url = snapshots[0].base_url.clone();

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    let client = fetch::client()?;
    let mut state = MirrorState::new(base_url.clone());
    let mut pages: Vec<PageEntry> = Vec::new();

    while let Some(current) = state.frontier.pop_front() {
        if !state.visited.insert(current.clone()) {
            continue;
        }

        let Some((html, timestamp)) = fetch::resolve_page(&client, &current, &snapshots).await
        else {
            tracing::warn!(url = %current, "not found in any snapshot");
            continue;
        };
        tracing::info!(url = %current, %timestamp, "mirroring page");

        let page_rel = paths::page_path(&current);
        state
            .url_map
            .entry(current.clone())
            .or_insert_with(|| page_rel.clone());

        let scan = extract::scan(&html);

        for resource in &scan.resources {
            download_resource(&client, &snapshots, &base_url, &out_dir, &mut state, resource)
                .await;
        }

        let rewritten = {
            let ctx = RewriteContext {
                url_map: &state.url_map,
                page_url: &current,
                base_url: &base_url,
                external: args.external,
            };
            rewrite::rewrite(&html, &ctx).with_context(|| format!("rewrite page: {current}"))?
        };
        let cleaned =
            scrub::scrub(&rewritten).with_context(|| format!("scrub page: {current}"))?;

        let destination = out_dir.join(&page_rel);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create page dir: {}", parent.display()))?;
        }
        std::fs::write(&destination, cleaned)
            .with_context(|| format!("write page: {}", destination.display()))?;
        pages.push(PageEntry {
            url: current.clone(),
            timestamp,
        });

        if args.recursive {
            for raw in &scan.anchors {
                let Some(link) = archive::canonicalize(raw, &current) else {
                    continue;
                };
                if link.scheme() != "http" && link.scheme() != "https" {
                    continue;
                }
                if !archive::same_site(&link, &base_url) {
                    continue;
                }
                if state.enqueue(link.clone()) {
                    tracing::debug!(url = %link, "queued page");
                }
            }
        }
    }

    sitemap::write(&pages, &out_dir.join("sitemap.xml")).context("write sitemap")?;
    remove_wayback_static(&out_dir);

    tracing::info!(pages = pages.len(), "mirror complete");
    Ok(())
}

/// Resolves one extracted reference to its canonical URL, fetches it at most
/// once per crawl, and records the local mapping on success. Failures are
/// warnings; the page keeps its original attribute for that reference.
async fn download_resource(
    client: &reqwest::Client,
    snapshots: &[Snapshot],
    base_url: &Url,
    out_dir: &Path,
    state: &mut MirrorState,
    resource: &ResourceRef,
) {
    let link = resource.link.as_str();
    if link.starts_with("data:") || archive::is_skip_listed(link) {
        tracing::debug!(%link, "skipping embedded or skip-listed reference");
        return;
    }

    let Some(canonical) = archive::canonicalize(link, base_url) else {
        tracing::debug!(%link, "unresolvable resource link");
        return;
    };
    if canonical.scheme() != "http" && canonical.scheme() != "https" {
        return;
    }

    let candidates = if link.starts_with("/web/") {
        // The page already referenced an archive path; fetch exactly that.
        vec![Candidate {
            archive_url: format!("{}{link}", archive::archive_host()),
            timestamp: None,
        }]
    } else {
        snapshots
            .iter()
            .map(|snapshot| Candidate {
                archive_url: archive::resource_url(&snapshot.timestamp, resource.kind, &canonical),
                timestamp: Some(snapshot.timestamp.clone()),
            })
            .collect()
    };

    // Resource identity is the canonical URL: one fetch per crawl no matter
    // how many pages reference it.
    if !state.attempted.insert(canonical.clone()) {
        return;
    }

    let relative = paths::resource_path(&canonical);
    let destination = out_dir.join(&relative);
    if destination.exists() {
        state.url_map.entry(canonical).or_insert(relative);
        return;
    }

    if fetch::download(client, &candidates, &destination).await {
        state.url_map.entry(canonical).or_insert(relative);
    } else {
        tracing::warn!(url = %canonical, "resource skipped after exhausting snapshots");
    }
}

fn remove_wayback_static(out_dir: &Path) {
    let junk = out_dir.join("assets").join("_static");
    if !junk.is_dir() {
        return;
    }
    match std::fs::remove_dir_all(&junk) {
        Ok(()) => tracing::info!(path = %junk.display(), "removed wayback static assets"),
        Err(err) => {
            tracing::warn!(path = %junk.display(), %err, "failed to remove wayback static assets");
        }
    }
}
