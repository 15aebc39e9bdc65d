use std::io::Cursor;
use std::path::Path;

use anyhow::Context as _;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use url::Url;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// One successfully mirrored page: its canonical URL and the timestamp of
/// the snapshot that served it.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub url: Url,
    pub timestamp: String,
}

/// Writes the crawled page set as an XML sitemap. `<lastmod>` is derived
/// from the serving snapshot's capture timestamp, so output is stable across
/// runs.
pub fn write(entries: &[PageEntry], destination: &Path) -> anyhow::Result<()> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .context("write xml declaration")?;
    writer
        .write_event(Event::Start(
            BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
        ))
        .context("open urlset")?;

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .context("open url element")?;

        writer
            .write_event(Event::Start(BytesStart::new("loc")))
            .context("open loc")?;
        writer
            .write_event(Event::Text(BytesText::new(entry.url.as_str())))
            .context("write loc")?;
        writer
            .write_event(Event::End(BytesEnd::new("loc")))
            .context("close loc")?;

        if let Some(date) = capture_date(&entry.timestamp) {
            writer
                .write_event(Event::Start(BytesStart::new("lastmod")))
                .context("open lastmod")?;
            writer
                .write_event(Event::Text(BytesText::new(&date)))
                .context("write lastmod")?;
            writer
                .write_event(Event::End(BytesEnd::new("lastmod")))
                .context("close lastmod")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .context("close url element")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .context("close urlset")?;

    let xml = writer.into_inner().into_inner();
    std::fs::write(destination, xml)
        .with_context(|| format!("write sitemap: {}", destination.display()))?;

    Ok(())
}

// Archive timestamps are YYYYMMDDhhmmss with an occasional trailing
// disambiguator; anything unparseable just drops the lastmod.
fn capture_date(timestamp: &str) -> Option<String> {
    let prefix = timestamp.get(..14)?;
    let parsed = chrono::NaiveDateTime::parse_from_str(prefix, "%Y%m%d%H%M%S").ok()?;
    Some(parsed.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_loc_and_lastmod_per_page() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let destination = temp.path().join("sitemap.xml");

        let entries = vec![
            PageEntry {
                url: Url::parse("https://example.com/")?,
                timestamp: "20190301123456".to_owned(),
            },
            PageEntry {
                url: Url::parse("https://example.com/about")?,
                timestamp: "20200615000000".to_owned(),
            },
        ];
        write(&entries, &destination)?;

        let xml = std::fs::read_to_string(&destination)?;
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(xml.contains(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#));
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<loc>https://example.com/about</loc>"));
        assert!(xml.contains("<lastmod>2019-03-01</lastmod>"));
        assert!(xml.contains("<lastmod>2020-06-15</lastmod>"));
        Ok(())
    }

    #[test]
    fn unparseable_timestamps_omit_lastmod() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let destination = temp.path().join("sitemap.xml");

        let entries = vec![PageEntry {
            url: Url::parse("https://example.com/")?,
            timestamp: "not-a-date-00".to_owned(),
        }];
        write(&entries, &destination)?;

        let xml = std::fs::read_to_string(&destination)?;
        assert!(xml.contains("<loc>"));
        assert!(!xml.contains("<lastmod>"));
        Ok(())
    }

    #[test]
    fn capture_dates_parse_the_leading_fourteen_digits() {
        assert_eq!(capture_date("20190301123456"), Some("2019-03-01".to_owned()));
        assert_eq!(capture_date("20190301123456789"), Some("2019-03-01".to_owned()));
        assert_eq!(capture_date("2019"), None);
        assert_eq!(capture_date("20191399123456"), None);
    }
}
