//! Core domain types: identifiers, marketplaces, and the records passed
//! between pipeline stages.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, ScoutError};

// ---------------------------------------------------------------------------
// Asin
// ---------------------------------------------------------------------------

/// Canonical (upper-case) identifier pattern.
static ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^B0[A-Z0-9]{8}$").expect("asin regex"));

/// A validated catalog identifier: `B0` followed by 8 alphanumerics,
/// always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asin(String);

impl Asin {
    /// Validate and normalize a raw identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let candidate = raw.trim().to_ascii_uppercase();
        if ASIN_RE.is_match(&candidate) {
            Ok(Self(candidate))
        } else {
            Err(ScoutError::validation(format!(
                "invalid ASIN '{}': expected 10 characters starting with B0 (e.g. B0D4QMBS75)",
                raw.trim()
            )))
        }
    }

    /// Lenient variant for untrusted upstream data; `None` when the value
    /// is not an identifier.
    pub fn from_candidate(raw: &str) -> Option<Self> {
        Self::parse(raw).ok()
    }

    /// Whether `raw` (case-insensitively, after trimming) is an identifier.
    pub fn matches_pattern(raw: &str) -> bool {
        ASIN_RE.is_match(&raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Asin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Asin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Asin {
    type Err = ScoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Asin {
    type Error = ScoutError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Asin> for String {
    fn from(value: Asin) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

/// Target storefront.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    #[default]
    #[serde(alias = "gb")]
    Uk,
    Us,
    De,
    Fr,
    It,
    Es,
}

impl Marketplace {
    /// Every supported marketplace, in display order.
    pub const ALL: [Marketplace; 6] = [
        Marketplace::Uk,
        Marketplace::Us,
        Marketplace::De,
        Marketplace::Fr,
        Marketplace::It,
        Marketplace::Es,
    ];

    /// Storefront host name.
    pub fn host(self) -> &'static str {
        match self {
            Self::Uk => "www.amazon.co.uk",
            Self::Us => "www.amazon.com",
            Self::De => "www.amazon.de",
            Self::Fr => "www.amazon.fr",
            Self::It => "www.amazon.it",
            Self::Es => "www.amazon.es",
        }
    }

    /// Numeric domain code used by the Keepa API.
    pub fn keepa_domain(self) -> u8 {
        match self {
            Self::Us => 1,
            Self::Uk => 2,
            Self::De => 3,
            Self::Fr => 4,
            Self::It => 8,
            Self::Es => 9,
        }
    }

    /// English-locale `Accept-Language` header value.
    pub fn accept_language(self) -> &'static str {
        match self {
            Self::Us => "en-US,en;q=0.9",
            _ => "en-GB,en;q=0.9",
        }
    }

    /// Short lowercase code (`uk`, `us`, ...).
    pub fn code(self) -> &'static str {
        match self {
            Self::Uk => "uk",
            Self::Us => "us",
            Self::De => "de",
            Self::Fr => "fr",
            Self::It => "it",
            Self::Es => "es",
        }
    }

    /// `https://{host}` as a URL.
    pub fn base_url(self) -> Url {
        // Hosts are static and well-formed.
        Url::parse(&format!("https://{}", self.host())).expect("static marketplace host")
    }

    /// Canonical desktop product URL for `asin`.
    pub fn product_url(self, asin: &Asin) -> String {
        format!("https://{}/dp/{asin}", self.host())
    }
}

impl std::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Marketplace {
    type Err = ScoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let key = lowered.strip_prefix("www.").unwrap_or(&lowered);
        if key == "gb" {
            return Ok(Self::Uk);
        }

        Self::ALL
            .into_iter()
            .find(|m| key == m.code() || Some(key) == m.host().strip_prefix("www."))
            .ok_or_else(|| {
                let codes: Vec<&str> = Self::ALL.iter().map(|m| m.code()).collect();
                ScoutError::validation(format!(
                    "unknown marketplace '{s}': expected one of {}",
                    codes.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Discovery output
// ---------------------------------------------------------------------------

/// Which relationship source produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Structured product API (Keepa).
    Keepa,
    /// Detail page scrape.
    PageScrape,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keepa => "keepa",
            Self::PageScrape => "page_scrape",
        }
    }
}

/// Related identifiers for a seed: seed excluded, deduplicated, capped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationResult {
    /// Candidates in first-seen order.
    pub asins: Vec<Asin>,
    /// Why the result is empty (or other notes from the source).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Producing source; `None` when nothing was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
}

impl RelationResult {
    /// An empty result explained by `diagnostic`.
    pub fn empty(diagnostic: impl Into<String>) -> Self {
        Self {
            asins: Vec::new(),
            diagnostic: Some(diagnostic.into()),
            source: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.asins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.asins.len()
    }
}

// ---------------------------------------------------------------------------
// ProductSnapshot
// ---------------------------------------------------------------------------

/// Best-effort commercial metadata for one identifier.
///
/// Optional fields are `None` whenever extraction failed; there are no
/// placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSnapshot {
    pub asin: Asin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Currency-stripped price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Star rating, 0.0–5.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,
    /// Canonical product URL.
    pub url: String,
}

impl ProductSnapshot {
    /// Snapshot with every optional field absent.
    pub fn empty(asin: Asin, marketplace: Marketplace) -> Self {
        let url = marketplace.product_url(&asin);
        Self {
            asin,
            title: None,
            price: None,
            rating: None,
            reviews: None,
            url,
        }
    }

    /// Whether any metadata was captured.
    pub fn has_data(&self) -> bool {
        self.title.is_some() || self.price.is_some() || self.rating.is_some() || self.reviews.is_some()
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// User-supplied niche criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Terms that add to the relevance score when found in the title.
    pub include_terms: Vec<String>,
    /// Terms that veto a snapshot when found in the title.
    pub exclude_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_min: Option<u64>,
}

impl FilterCriteria {
    /// True when no term or threshold is configured.
    pub fn is_empty(&self) -> bool {
        self.include_terms.iter().all(|t| t.trim().is_empty())
            && self.exclude_terms.iter().all(|t| t.trim().is_empty())
            && self.price_min.is_none()
            && self.price_max.is_none()
            && self.rating_min.is_none()
            && self.reviews_min.is_none()
    }
}

/// Why a snapshot was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    /// The title contains this exclude term.
    ExcludedTerm(String),
    PriceBelowMin,
    PriceAboveMax,
    RatingBelowMin,
    RatingMissing,
    ReviewsBelowMin,
    ReviewsMissing,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExcludedTerm(term) => write!(f, "excluded term '{term}'"),
            Self::PriceBelowMin => f.write_str("price below minimum"),
            Self::PriceAboveMax => f.write_str("price above maximum"),
            Self::RatingBelowMin => f.write_str("rating below minimum"),
            Self::RatingMissing => f.write_str("rating missing"),
            Self::ReviewsBelowMin => f.write_str("reviews below minimum"),
            Self::ReviewsMissing => f.write_str("review count missing"),
        }
    }
}

/// A snapshot with its relevance score and keep/drop decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSnapshot {
    #[serde(flatten)]
    pub snapshot: ProductSnapshot,
    /// Number of include terms found in the title.
    pub score: u32,
    pub kept: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drop_reasons: Vec<DropReason>,
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one pipeline invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
