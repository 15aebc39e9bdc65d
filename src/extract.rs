use scraper::{Html, Selector};

use crate::archive::{RESOURCE_TAGS, ResourceKind};

/// A link-bearing reference pulled out of a page, classified by the tag that
/// carried it.
#[derive(Debug, Clone)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub link: String,
}

/// Everything the crawl needs from one page's as-served markup: resource
/// references to download and outbound anchor links to enqueue.
#[derive(Debug, Default)]
pub struct PageScan {
    pub resources: Vec<ResourceRef>,
    pub anchors: Vec<String>,
}

pub fn scan(html: &str) -> PageScan {
    let document = Html::parse_document(html);
    let mut scan = PageScan::default();

    for (tag, attr, kind) in RESOURCE_TAGS {
        let Ok(selector) = Selector::parse(tag) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(link) = element.value().attr(attr) {
                if link.is_empty() {
                    continue;
                }
                scan.resources.push(ResourceRef {
                    kind: *kind,
                    link: link.to_owned(),
                });
            }
        }
    }

    let Ok(anchor_selector) = Selector::parse("a[href]") else {
        return scan;
    };
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        scan.anchors.push(href.to_owned());
    }

    scan
}
