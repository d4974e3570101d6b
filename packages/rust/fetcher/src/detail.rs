//! Best-effort metadata extraction from a (mobile) detail page.
//!
//! Every selector here is a heuristic. A missing element or an unparsable
//! value leaves the field `None`; nothing in this module returns an error.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

/// Fields extracted from one detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub rating: Option<f64>,
    pub reviews: Option<u64>,
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
}

static TITLE_SELS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&["#title", "#productTitle"]));

static PRICE_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".a-color-price",
        "#priceblock_ourprice",
        ".a-price .a-offscreen",
    ])
});

static RATING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".acr-stars-text").expect("rating selector"));

static REVIEWS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#acrCustomerReviewText").expect("reviews selector"));

static PRICE_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.,]").expect("price strip regex"));

static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d.]+)\s*out of 5").expect("rating regex"));

static REVIEWS_NEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*)\s*(?:global\s+)?ratings?\b").expect("reviews regex")
});

static GROUPED_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("grouped int regex"));

/// Extract title, price, rating and review count from a detail page.
pub fn extract_detail(html: &str) -> DetailFields {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &TITLE_SELS).map(|t| collapse_whitespace(&t));
    let price = first_text(&doc, &PRICE_SELS).and_then(|t| parse_price(&t));

    let rating_text = doc
        .select(&RATING_SEL)
        .next()
        .map(element_text)
        .or_else(|| find_text_node(&doc, "out of 5"));
    let rating = rating_text.as_deref().and_then(parse_rating);

    let reviews_text = doc
        .select(&REVIEWS_SEL)
        .next()
        .map(element_text)
        .or_else(|| find_text_node(&doc, "ratings"));
    let reviews = reviews_text.as_deref().and_then(parse_review_count);

    DetailFields {
        title,
        price,
        rating,
        reviews,
    }
}

/// Normalize a displayed price: keep digits and separators, then parse as a
/// decimal. The last `.` or `,` is the decimal point when one or two digits
/// follow it; every other separator must group thousands.
///
/// `"£12,345.67"` → `12345.67`; `"12,99 €"` → `12.99`;
/// `"1.234,56 €"` → `1234.56`; `"N/A"` → `None`.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let stripped = PRICE_STRIP_RE.replace_all(text, "");
    let cleaned: &str = &stripped;

    let (int_part, fraction) = match cleaned.rfind(['.', ',']) {
        Some(pos) if (1..=2).contains(&(cleaned.len() - pos - 1)) => {
            (&cleaned[..pos], Some((&cleaned[pos + 1..], &cleaned[pos..=pos])))
        }
        _ => (&cleaned[..], None),
    };

    let whole = ungroup(int_part, fraction.map(|(_, sep)| sep))?;
    let normalized = match fraction {
        Some((digits, _)) => format!("{whole}.{digits}"),
        None => whole,
    };
    Decimal::from_str(&normalized).ok()
}

/// Strip thousands separators from the integer part of a price. `None` when
/// the grouping is inconsistent or reuses the decimal separator.
fn ungroup(int_part: &str, decimal_sep: Option<&str>) -> Option<String> {
    let Some(sep) = int_part.chars().find(|c| !c.is_ascii_digit()) else {
        return (!int_part.is_empty()).then(|| int_part.to_string());
    };
    if decimal_sep.is_some_and(|d| d.starts_with(sep)) {
        return None;
    }

    let mut groups = int_part.split(sep);
    let head = groups.next()?;
    if !(1..=3).contains(&head.len()) {
        return None;
    }

    let mut whole = head.to_string();
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        whole.push_str(group);
    }
    Some(whole)
}

/// First number before "out of 5", within 0.0–5.0.
pub fn parse_rating(text: &str) -> Option<f64> {
    let caps = RATING_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// Integer next to "ratings", else the first comma-grouped integer.
pub fn parse_review_count(text: &str) -> Option<u64> {
    let raw = REVIEWS_NEAR_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .or_else(|| GROUPED_INT_RE.find(text).map(|m| m.as_str().to_string()))?;
    raw.replace(',', "").parse().ok()
}

/// Trimmed text of the first element matched by any selector, in order.
fn first_text(doc: &Html, sels: &[Selector]) -> Option<String> {
    sels.iter().find_map(|sel| {
        doc.select(sel)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// First text node in the document containing `needle`.
fn find_text_node(doc: &Html, needle: &str) -> Option<String> {
    doc.root_element()
        .text()
        .find(|t| t.contains(needle))
        .map(|t| t.trim().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
