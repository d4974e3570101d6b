//! Keepa product API: structured relationship source and keyword search.
//!
//! Responses are read as untyped JSON. Keepa payloads are not
//! schema-guaranteed, so every field is looked up defensively and every
//! relation entry is re-validated as an identifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use asinscout_shared::{
    Asin, FetchErrorKind, Marketplace, RelationResult, Result, ScoutError, SourceKind,
};

use crate::{CandidateSet, RelationshipSource};

/// Product fields unioned into the candidate set, in read order.
const RELATION_FIELDS: [&str; 4] = ["alsoBought", "alsoViewed", "frequentlyBoughtTogether", "related"];

const NO_KEY: &str = "no Keepa API key configured";
const NO_PRODUCT: &str = "Keepa returned no product";
const NO_RELATIONS: &str = "Keepa returned zero related identifiers";

// ---------------------------------------------------------------------------
// KeepaClient
// ---------------------------------------------------------------------------

/// Thin client over the two Keepa endpoints we use.
#[derive(Clone)]
pub struct KeepaClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl std::fmt::Debug for KeepaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepaClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// One row of a keyword search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordHit {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub root_category: Option<i64>,
    /// As reported by Keepa, in the marketplace's smallest currency unit.
    pub buy_box_price: Option<i64>,
    pub sales_rank_drops_30: Option<i64>,
}

impl KeepaClient {
    pub fn new(endpoint: &str, api_key: SecretString, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("asinscout/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScoutError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Product lookup without price history.
    #[instrument(skip_all, fields(asin = %asin, marketplace = %marketplace))]
    pub async fn product(&self, asin: &Asin, marketplace: Marketplace) -> Result<Value> {
        let domain = marketplace.keepa_domain().to_string();
        self.get_json(
            "product",
            &[("domain", domain.as_str()), ("asin", asin.as_str()), ("history", "0")],
        )
        .await
    }

    /// Keyword search over the marketplace catalog.
    #[instrument(skip_all, fields(term = %term, marketplace = %marketplace, page = page))]
    pub async fn search(
        &self,
        term: &str,
        marketplace: Marketplace,
        page: u32,
    ) -> Result<Vec<KeywordHit>> {
        let domain = marketplace.keepa_domain().to_string();
        let page = page.to_string();
        let body = self
            .get_json(
                "query",
                &[
                    ("domain", domain.as_str()),
                    ("type", "product"),
                    ("term", term),
                    ("page", page.as_str()),
                ],
            )
            .await?;

        let Some(products) = body.get("products").and_then(Value::as_array) else {
            let detail = upstream_error(&body).unwrap_or_else(|| "no products field".into());
            return Err(ScoutError::SourceUnavailable(format!(
                "Keepa search failed: {detail}"
            )));
        };

        let hits: Vec<KeywordHit> = products.iter().filter_map(keyword_hit).collect();
        info!(hits = hits.len(), "keyword search complete");
        Ok(hits)
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{path}", self.endpoint);
        debug!(%url, "querying Keepa");

        // The key travels in the query string; strip URLs from errors so it
        // never reaches logs or diagnostics.
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .query(params)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    FetchErrorKind::Timeout
                } else {
                    FetchErrorKind::Transport
                };
                ScoutError::fetch(&url, kind, e.without_url().to_string())
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ScoutError::fetch(&url, FetchErrorKind::Body, e.without_url().to_string())
        })?;

        let parsed = serde_json::from_str::<Value>(&text);

        if !status.is_success() {
            // Keepa reports key/token problems as JSON with a non-2xx status;
            // keep those so the caller can surface the upstream message.
            return match parsed {
                Ok(body) if upstream_error(&body).is_some() => Ok(body),
                _ => Err(ScoutError::fetch(
                    &url,
                    FetchErrorKind::Status(status.as_u16()),
                    format!("HTTP {status}"),
                )),
            };
        }

        parsed.map_err(|e| ScoutError::parse(format!("Keepa response is not JSON: {e}")))
    }
}

/// The upstream error indicator, if present and non-empty.
fn upstream_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) if map.is_empty() => None,
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        ),
        Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn keyword_hit(product: &Value) -> Option<KeywordHit> {
    let asin = product.get("asin")?.as_str()?.trim().to_ascii_uppercase();
    let text = |key: &str| product.get(key).and_then(Value::as_str).map(str::to_string);
    let int = |key: &str| product.get(key).and_then(Value::as_i64);

    Some(KeywordHit {
        asin,
        title: text("title"),
        brand: text("brand"),
        root_category: int("rootCategory"),
        buy_box_price: int("buyBoxPrice").filter(|p| *p >= 0),
        sales_rank_drops_30: int("salesRankDrops30"),
    })
}

/// Interpret a product lookup response for `seed`.
pub(crate) fn relations_from_response(
    body: &Value,
    seed: &Asin,
    max_items: usize,
) -> RelationResult {
    if let Some(error) = upstream_error(body) {
        return RelationResult::empty(format!("Keepa reported an error: {error}"));
    }

    let Some(product) = body
        .get("products")
        .and_then(Value::as_array)
        .and_then(|products| products.first())
    else {
        return RelationResult::empty(NO_PRODUCT);
    };

    let mut candidates = CandidateSet::new(seed.clone(), max_items);
    let entries = RELATION_FIELDS
        .iter()
        .filter_map(|field| product.get(*field).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(Asin::from_candidate);
    candidates.extend(entries);

    if candidates.is_empty() {
        return RelationResult::empty(NO_RELATIONS);
    }
    candidates.into_result(SourceKind::Keepa)
}

// ---------------------------------------------------------------------------
// KeepaSource
// ---------------------------------------------------------------------------

/// Structured-API relationship source. Always tried first when enabled.
#[derive(Debug, Clone)]
pub struct KeepaSource {
    /// `None` when no credential was supplied.
    client: Option<KeepaClient>,
}

impl KeepaSource {
    /// Build the source; a missing key is not an error, it only makes every
    /// lookup report "no API key configured".
    pub fn new(api_key: Option<SecretString>, endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = api_key
            .map(|key| KeepaClient::new(endpoint, key, timeout_secs))
            .transpose()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RelationshipSource for KeepaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Keepa
    }

    async fn discover(&self, seed: &Asin, marketplace: Marketplace, max_items: usize) -> RelationResult {
        let Some(client) = &self.client else {
            return RelationResult::empty(NO_KEY);
        };

        match client.product(seed, marketplace).await {
            Ok(body) => relations_from_response(&body, seed, max_items),
            Err(e) => {
                warn!(%seed, error = %e, "Keepa lookup failed");
                RelationResult::empty(format!("Keepa request failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed() -> Asin {
        Asin::parse("B0D4QMBS75").unwrap()
    }

    fn fixture(name: &str) -> Value {
        let content = std::fs::read_to_string(format!("../../../fixtures/json/{name}"))
            .expect("read fixture");
        serde_json::from_str(&content).expect("fixture json")
    }

    fn ids(result: &RelationResult) -> Vec<&str> {
        result.asins.iter().map(Asin::as_str).collect()
    }

    #[test]
    fn unions_relation_fields_defensively() {
        let result = relations_from_response(&fixture("keepa-product.json"), &seed(), 100);
        assert_eq!(
            ids(&result),
            vec!["B0AAAAAAA1", "B0BBBBBBB2", "B0CCCCCCC3", "B0DDDDDDD4"]
        );
        assert_eq!(result.source, Some(SourceKind::Keepa));
        assert!(result.diagnostic.is_none());
    }

    #[test]
    fn caps_at_max_items() {
        let result = relations_from_response(&fixture("keepa-product.json"), &seed(), 2);
        assert_eq!(ids(&result), vec!["B0AAAAAAA1", "B0BBBBBBB2"]);
    }

    #[test]
    fn distinguishes_failure_diagnostics() {
        let err = serde_json::json!({ "error": { "type": "invalidKey", "message": "key rejected" } });
        let result = relations_from_response(&err, &seed(), 10);
        assert!(result.is_empty());
        assert_eq!(result.diagnostic.as_deref(), Some("Keepa reported an error: key rejected"));

        let none = serde_json::json!({ "products": [] });
        assert_eq!(
            relations_from_response(&none, &seed(), 10).diagnostic.as_deref(),
            Some(NO_PRODUCT)
        );

        let absent = serde_json::json!({ "tokensLeft": 5 });
        assert_eq!(
            relations_from_response(&absent, &seed(), 10).diagnostic.as_deref(),
            Some(NO_PRODUCT)
        );

        let bare = serde_json::json!({ "products": [{ "asin": "B0D4QMBS75", "alsoBought": ["B0D4QMBS75"] }] });
        assert_eq!(
            relations_from_response(&bare, &seed(), 10).diagnostic.as_deref(),
            Some(NO_RELATIONS)
        );
    }

    #[test]
    fn empty_error_indicator_is_ignored() {
        let body = serde_json::json!({ "error": "", "products": [{ "related": ["B0AAAAAAA1"] }] });
        assert_eq!(ids(&relations_from_response(&body, &seed(), 10)), vec!["B0AAAAAAA1"]);
    }

    #[tokio::test]
    async fn missing_key_reports_diagnostic() {
        let source = KeepaSource::new(None, "https://api.keepa.com", 5).unwrap();
        let result = source.discover(&seed(), Marketplace::Uk, 10).await;
        assert!(result.is_empty());
        assert_eq!(result.diagnostic.as_deref(), Some(NO_KEY));
    }

    #[tokio::test]
    async fn product_lookup_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product"))
            .and(query_param("key", "test-key"))
            .and(query_param("domain", "2"))
            .and(query_param("asin", "B0D4QMBS75"))
            .and(query_param("history", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture("keepa-product.json")))
            .expect(1)
            .mount(&server)
            .await;

        let source = KeepaSource::new(Some(SecretString::from("test-key".to_string())), &server.uri(), 5).unwrap();
        let result = source.discover(&seed(), Marketplace::Uk, 50).await;
        assert_eq!(result.len(), 4);
    }

    #[tokio::test]
    async fn upstream_http_error_with_json_body() {
        let server = MockServer::start().await;
        Mock::given(path("/product"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(serde_json::json!({ "error": { "message": "payment required" } })),
            )
            .mount(&server)
            .await;

        let source = KeepaSource::new(Some(SecretString::from("k".to_string())), &server.uri(), 5).unwrap();
        let result = source.discover(&seed(), Marketplace::Uk, 50).await;
        assert_eq!(
            result.diagnostic.as_deref(),
            Some("Keepa reported an error: payment required")
        );
    }

    #[tokio::test]
    async fn transport_failure_never_leaks_key() {
        let server = MockServer::start().await;
        Mock::given(path("/product"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let source =
            KeepaSource::new(Some(SecretString::from("super-secret".to_string())), &server.uri(), 5).unwrap();
        let result = source.discover(&seed(), Marketplace::Uk, 50).await;
        let diagnostic = result.diagnostic.unwrap();
        assert!(diagnostic.starts_with("Keepa request failed"));
        assert!(!diagnostic.contains("super-secret"));
    }

    #[tokio::test]
    async fn keyword_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(path("/query"))
            .and(query_param("type", "product"))
            .and(query_param("term", "airlock"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture("keepa-query.json")))
            .mount(&server)
            .await;

        let client = KeepaClient::new(&server.uri(), SecretString::from("k".to_string()), 5).unwrap();
        let hits = client.search("airlock", Marketplace::Uk, 0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].brand.as_deref(), Some("BrewCo"));
        assert_eq!(hits[0].buy_box_price, Some(1500));
        assert_eq!(hits[1].sales_rank_drops_30, None);
    }

    #[tokio::test]
    async fn keyword_search_without_products_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "bad term" })))
            .mount(&server)
            .await;

        let client = KeepaClient::new(&server.uri(), SecretString::from("k".to_string()), 5).unwrap();
        let err = client.search("x", Marketplace::Us, 0).await.unwrap_err();
        assert!(matches!(err, ScoutError::SourceUnavailable(ref m) if m.contains("bad term")));
    }
}
