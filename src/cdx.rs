use std::path::PathBuf;

use anyhow::Context as _;
use url::Url;

use crate::archive;
use crate::cli::CdxArgs;
use crate::fetch::{self, Candidate};
use crate::sitemap::{self, PageEntry};

// CDX json rows: urlkey, timestamp, original, mimetype, statuscode, ...
const CDX_COLUMNS: usize = 5;

#[derive(Debug, PartialEq)]
struct CatalogRow {
    original: String,
    mime: String,
    status: String,
}

fn parse_catalog(rows: Vec<Vec<String>>) -> Vec<CatalogRow> {
    rows.into_iter()
        .skip(1) // column header
        .filter(|row| row.len() >= CDX_COLUMNS)
        .map(|mut row| CatalogRow {
            status: row.remove(4),
            mime: row.remove(3),
            original: row.remove(2),
        })
        .collect()
}

async fn catalog(
    client: &reqwest::Client,
    url_pattern: &str,
    timestamp: &str,
) -> anyhow::Result<Vec<CatalogRow>> {
    let endpoint = format!("{}/cdx/search/cdx", archive::archive_host());
    let response = client
        .get(&endpoint)
        .query(&[
            ("url", url_pattern),
            ("matchType", "prefix"),
            ("from", timestamp),
            ("to", timestamp),
            ("output", "json"),
        ])
        .send()
        .await
        .context("query cdx catalog")?
        .error_for_status()
        .context("cdx catalog status")?;

    let body = response.text().await.context("read cdx catalog body")?;
    let rows: Vec<Vec<String>> =
        serde_json::from_str(&body).context("parse cdx catalog json")?;
    Ok(parse_catalog(rows))
}

/// Downloads every image the catalog lists for the domain at the given
/// timestamp, flat into the output directory by basename. Independent of the
/// mirror crawl; per-item failures are logged and skipped.
pub async fn images(args: CdxArgs) -> anyhow::Result<()> {
    let client = fetch::client()?;
    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    let rows = catalog(&client, &format!("{}*", args.domain), &args.timestamp).await?;
    let mut saved = 0usize;
    for row in rows {
        if row.status != "200" || !row.mime.starts_with("image/") {
            continue;
        }
        let Ok(original) = Url::parse(&row.original) else {
            tracing::debug!(url = %row.original, "unparseable catalog url");
            continue;
        };

        let file_name = original
            .path()
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("resource")
            .to_owned();
        let destination = out_dir.join(file_name);
        if destination.exists() {
            continue;
        }

        let candidate = Candidate {
            archive_url: format!(
                "{}/web/{}id_/{original}",
                archive::archive_host(),
                args.timestamp
            ),
            timestamp: Some(args.timestamp.clone()),
        };
        if fetch::download(&client, &[candidate], &destination).await {
            saved += 1;
        } else {
            tracing::warn!(url = %original, "catalog image skipped");
        }
    }

    tracing::info!(saved, "catalog image download complete");
    Ok(())
}

/// Downloads every archived HTML page the catalog lists for the domain at
/// the given timestamp (link structure not required) and writes a sitemap
/// of the fetched set.
pub async fn pages(args: CdxArgs) -> anyhow::Result<()> {
    let client = fetch::client()?;
    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    let rows = catalog(&client, &format!("{}/*", args.domain), &args.timestamp).await?;
    let mut entries: Vec<PageEntry> = Vec::new();
    for row in rows {
        if row.status != "200" || !row.mime.starts_with("text/html") {
            continue;
        }
        let Ok(original) = Url::parse(&row.original) else {
            tracing::debug!(url = %row.original, "unparseable catalog url");
            continue;
        };

        let destination = out_dir.join(catalog_page_path(&original));
        if !destination.exists() {
            let candidate = Candidate {
                archive_url: format!(
                    "{}/web/{}id_/{original}",
                    archive::archive_host(),
                    args.timestamp
                ),
                timestamp: Some(args.timestamp.clone()),
            };
            if !fetch::download(&client, &[candidate], &destination).await {
                tracing::warn!(url = %original, "catalog page skipped");
                continue;
            }
        }
        entries.push(PageEntry {
            url: original,
            timestamp: args.timestamp.clone(),
        });
    }

    sitemap::write(&entries, &out_dir.join("sitemap.xml")).context("write catalog sitemap")?;
    tracing::info!(pages = entries.len(), "catalog page download complete");
    Ok(())
}

// Catalog downloads are standalone files, so extensionless pages get a
// `.html` suffix instead of an index.html directory.
fn catalog_page_path(url: &Url) -> PathBuf {
    let mut path = url.path().trim_start_matches('/').to_owned();
    if path.is_empty() || path.ends_with('/') {
        path.push_str("index.html");
    } else if !path.rsplit('/').next().unwrap_or_default().contains('.') {
        path.push_str(".html");
    }
    PathBuf::from(path)
}
