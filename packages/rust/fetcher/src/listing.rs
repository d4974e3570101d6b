//! Related-identifier extraction from a desktop detail page.
//!
//! Two structural signals are read, in this order:
//! 1. any element carrying a `data-asin` attribute
//! 2. any `a[href]` containing `/dp/<identifier>`

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use asinscout_shared::Asin;

static DATA_ASIN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-asin]").expect("data-asin selector"));

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Matches `/DP/B0XXXXXXXX` in an upper-cased href.
static DP_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/DP/(B0[A-Z0-9]{8})").expect("dp link regex"));

/// Extract every identifier referenced by the page, first-seen order,
/// without duplicates. The page's own identifier is included when present.
pub fn extract_related_asins(html: &str) -> Vec<Asin> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |asin: Asin| {
        if seen.insert(asin.clone()) {
            out.push(asin);
        }
    };

    for el in doc.select(&DATA_ASIN_SEL) {
        if let Some(asin) = el.value().attr("data-asin").and_then(Asin::from_candidate) {
            push(asin);
        }
    }

    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let upper = href.to_ascii_uppercase();
        if let Some(asin) = DP_LINK_RE
            .captures(&upper)
            .and_then(|caps| Asin::from_candidate(&caps[1]))
        {
            push(asin);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(asins: &[Asin]) -> Vec<&str> {
        asins.iter().map(Asin::as_str).collect()
    }

    #[test]
    fn extracts_fixture_in_first_seen_order() {
        let html = std::fs::read_to_string("../../../fixtures/html/detail-desktop.html")
            .expect("read fixture");
        let asins = extract_related_asins(&html);
        assert_eq!(
            ids(&asins),
            vec!["B0D4QMBS75", "B0AAAAAAA1", "B0BBBBBBB2", "B0DDDDDDD4"]
        );
    }

    #[test]
    fn ignores_malformed_attributes() {
        let html = r#"<div data-asin="  "></div><div data-asin="B0SHORT"></div><div data-asin=" b0zzzzzzz9 "></div>"#;
        assert_eq!(ids(&extract_related_asins(html)), vec!["B0ZZZZZZZ9"]);
    }

    #[test]
    fn link_signal_is_case_insensitive() {
        let html = r#"<a href="/some-product/DP/b0yyyyyyy8/ref=x">x</a><a href="/gp/help">h</a>"#;
        assert_eq!(ids(&extract_related_asins(html)), vec!["B0YYYYYYY8"]);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract_related_asins("").is_empty());
    }
}
