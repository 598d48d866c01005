//! Exchange-rate and market-quote providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{normalize_base, read_json};
use crate::cascade::{Provider, ProviderError};

const EXCHANGE_RATE_API_URL: &str = "https://v6.exchangerate-api.com";
const FIXER_URL: &str = "https://data.fixer.io";
const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co";

/// Currency pair to price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePair {
    pub from: String,
    pub to: String,
}

impl RatePair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Latest price for a ticker symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketQuote {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// ExchangeRate-API
// ─────────────────────────────────────────────────────────────────────────────

pub struct ExchangeRateApi {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeRateApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, EXCHANGE_RATE_API_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    result: String,
    conversion_rate: Option<f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

#[async_trait]
impl Provider<RatePair, f64> for ExchangeRateApi {
    fn name(&self) -> &str {
        "exchangerate_api"
    }

    async fn fetch(&self, pair: &RatePair, api_key: &str) -> Result<f64, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v6/{}/pair/{}/{}",
                self.base_url, api_key, pair.from, pair.to
            ))
            .send()
            .await?;
        let parsed: PairResponse = read_json(response).await?;

        if parsed.result != "success" {
            return Err(ProviderError::malformed(
                parsed.error_type.unwrap_or_else(|| parsed.result.clone()),
            ));
        }
        positive_rate(parsed.conversion_rate)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixer
// ─────────────────────────────────────────────────────────────────────────────

pub struct Fixer {
    client: reqwest::Client,
    base_url: String,
}

impl Fixer {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, FIXER_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FixerResponse {
    success: bool,
    #[serde(default)]
    rates: std::collections::HashMap<String, f64>,
    error: Option<FixerError>,
}

#[derive(Debug, Deserialize)]
struct FixerError {
    #[serde(rename = "type")]
    kind: String,
}

#[async_trait]
impl Provider<RatePair, f64> for Fixer {
    fn name(&self) -> &str {
        "fixer"
    }

    async fn fetch(&self, pair: &RatePair, api_key: &str) -> Result<f64, ProviderError> {
        // Free plans are EUR-based, so both legs are requested and crossed.
        let symbols = format!("{},{}", pair.from, pair.to);
        let response = self
            .client
            .get(format!("{}/api/latest", self.base_url))
            .query(&[("access_key", api_key), ("symbols", symbols.as_str())])
            .send()
            .await?;
        let parsed: FixerResponse = read_json(response).await?;

        if !parsed.success {
            let kind = parsed.error.map(|e| e.kind).unwrap_or_default();
            return Err(ProviderError::malformed(format!("fixer error: {}", kind)));
        }

        let leg = |code: &str| -> Option<f64> {
            if code == "EUR" {
                Some(1.0)
            } else {
                parsed.rates.get(code).copied()
            }
        };
        match (leg(&pair.from), leg(&pair.to)) {
            (Some(from), Some(to)) if from > 0.0 => positive_rate(Some(to / from)),
            _ => Err(ProviderError::malformed("missing rate for requested pair")),
        }
    }
}

fn positive_rate(rate: Option<f64>) -> Result<f64, ProviderError> {
    match rate {
        Some(r) if r.is_finite() && r > 0.0 => Ok(r),
        _ => Err(ProviderError::malformed("missing or non-positive rate")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alpha Vantage
// ─────────────────────────────────────────────────────────────────────────────

pub struct AlphaVantage {
    client: reqwest::Client,
    base_url: String,
}

impl AlphaVantage {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, ALPHA_VANTAGE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: String,
    #[serde(rename = "05. price")]
    price: String,
    #[serde(rename = "10. change percent")]
    change_percent: String,
}

#[async_trait]
impl Provider<String, MarketQuote> for AlphaVantage {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    async fn fetch(&self, symbol: &String, api_key: &str) -> Result<MarketQuote, ProviderError> {
        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol.as_str()),
                ("apikey", api_key),
            ])
            .send()
            .await?;
        let parsed: GlobalQuoteResponse = read_json(response).await?;

        // Throttled responses come back 200 with only a "Note".
        let quote = match (parsed.quote, parsed.note) {
            (Some(q), _) if !q.symbol.is_empty() => q,
            (_, Some(note)) => return Err(ProviderError::Status { status: 429, body: note }),
            _ => return Err(ProviderError::malformed("empty quote")),
        };

        let price: f64 = quote
            .price
            .trim()
            .parse()
            .map_err(|_| ProviderError::malformed(format!("bad price: {}", quote.price)))?;
        let change_percent: f64 = quote
            .change_percent
            .trim()
            .trim_end_matches('%')
            .parse()
            .unwrap_or(0.0);

        Ok(MarketQuote {
            symbol: quote.symbol,
            price,
            change_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_exchange_rate_api_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v6/test-key/pair/USD/EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "base_code": "USD",
                "target_code": "EUR",
                "conversion_rate": 0.9213
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ExchangeRateApi::with_base_url(reqwest::Client::new(), server.uri());
        let rate = provider
            .fetch(&RatePair::new("USD", "EUR"), "test-key")
            .await
            .unwrap();
        assert!((rate - 0.9213).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exchange_rate_api_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "error",
                "error-type": "invalid-key"
            })))
            .mount(&server)
            .await;

        let provider = ExchangeRateApi::with_base_url(reqwest::Client::new(), server.uri());
        let err = provider
            .fetch(&RatePair::new("USD", "EUR"), "bad")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid-key"));
    }

    #[tokio::test]
    async fn test_fixer_crosses_through_eur() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest"))
            .and(query_param("access_key", "fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "base": "EUR",
                "rates": {"USD": 1.25, "GBP": 0.85}
            })))
            .mount(&server)
            .await;

        let provider = Fixer::with_base_url(reqwest::Client::new(), server.uri());
        let rate = provider.fetch(&RatePair::new("USD", "GBP"), "fx").await.unwrap();
        assert!((rate - 0.68).abs() < 1e-9);

        let to_eur = provider.fetch(&RatePair::new("USD", "EUR"), "fx").await.unwrap();
        assert!((to_eur - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_http_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let provider = Fixer::with_base_url(reqwest::Client::new(), server.uri());
        let err = provider.fetch(&RatePair::new("USD", "GBP"), "fx").await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_alpha_vantage_throttle_note() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
            })))
            .mount(&server)
            .await;

        let provider = AlphaVantage::with_base_url(reqwest::Client::new(), server.uri());
        let err = provider.fetch(&"IBM".to_string(), "av").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_alpha_vantage_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Global Quote": {
                    "01. symbol": "IBM",
                    "05. price": "182.5000",
                    "10. change percent": "-0.4512%"
                }
            })))
            .mount(&server)
            .await;

        let provider = AlphaVantage::with_base_url(reqwest::Client::new(), server.uri());
        let quote = provider.fetch(&"IBM".to_string(), "av").await.unwrap();
        assert_eq!(quote.symbol, "IBM");
        assert_eq!(quote.price, 182.5);
        assert!((quote.change_percent + 0.4512).abs() < 1e-9);
    }
}
