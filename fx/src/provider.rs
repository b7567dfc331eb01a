//! Rate source trait, response shape detection and the HTTP client.

use async_trait::async_trait;
use bazaar_common::{Currency, DurationExt, MonetaryError, RateTable};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

/// Which known layout a rates response used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatesShape {
    /// `{ "rates": { ... }, ... }` straight from the upstream provider.
    FlatRatesShape,
    /// The same layout tagged with a `provider` field, as the backend
    /// proxy emits when it serves its own fallback table.
    ProviderRatesShape {
        provider: String,
        warning: Option<String>,
    },
}

/// A validated rates response.
#[derive(Debug, Clone, PartialEq)]
pub struct RatesPayload {
    pub table: RateTable,
    pub shape: RatesShape,
}

/// Trait for exchange rate sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch one complete rate table relative to `base`.
    async fn fetch_rates(&self, base: &Currency) -> FxResult<RatesPayload>;
}

/// Detect the response shape and turn the body into a rate table.
///
/// The body must hold a `rates` object. A `base_code` or `base` field, when
/// present, must match `expected_base`. Entries that are not positive numbers
/// are dropped, except the base entry, which must be 1.
pub fn parse_rates_body(body: &str, expected_base: &Currency) -> FxResult<RatesPayload> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FxError::MalformedResponse(format!("body is not JSON: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(FxError::MalformedResponse("body is not an object".to_string()));
    };

    let rates = match object.get("rates") {
        Some(Value::Object(rates)) => rates,
        Some(_) => {
            return Err(FxError::MalformedResponse(
                "`rates` is not an object".to_string(),
            ))
        }
        None => return Err(FxError::MalformedResponse("missing `rates`".to_string())),
    };

    let declared_base = object
        .get("base_code")
        .or_else(|| object.get("base"))
        .and_then(Value::as_str)
        .map(Currency::new);
    if let Some(declared) = &declared_base {
        if declared != expected_base {
            return Err(FxError::MalformedResponse(format!(
                "rates are relative to {declared}, expected {expected_base}"
            )));
        }
    }

    let mut table = RateTable::new(expected_base.clone());
    for (code, raw) in rates {
        let currency = Currency::new(code.as_str());
        let Some(rate) = decimal_from_json(raw) else {
            if &currency == expected_base {
                return Err(FxError::MalformedResponse(format!(
                    "rate for base {code} is not a number"
                )));
            }
            warn!(currency = %code, value = %raw, "Dropping non-numeric rate");
            continue;
        };
        match table.insert(currency, rate) {
            Ok(()) => {}
            Err(MonetaryError::InvalidRate { currency, rate }) => {
                warn!(%currency, %rate, "Dropping non-positive rate");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let shape = match object.get("provider").and_then(Value::as_str) {
        Some(provider) => RatesShape::ProviderRatesShape {
            provider: provider.to_string(),
            warning: object
                .get("warning")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        None => RatesShape::FlatRatesShape,
    };

    Ok(RatesPayload { table, shape })
}

/// Read a JSON number as a decimal without going through binary floating point.
fn decimal_from_json(raw: &Value) -> Option<Decimal> {
    let Value::Number(number) = raw else {
        return None;
    };
    let text = number.to_string();
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Fetches rates with one HTTP GET against the backend rates endpoint.
pub struct HttpRateSource {
    client: Client,
    url: String,
    timeout: std::time::Duration,
}

impl HttpRateSource {
    /// Create a new HTTP source with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: chrono::Duration) -> FxResult<Self> {
        let timeout = timeout.as_std();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn fetch_rates(&self, base: &Currency) -> FxResult<RatesPayload> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                FxError::Timeout(self.timeout)
            } else {
                FxError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FxError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FxError::Timeout(self.timeout)
            } else {
                FxError::Transport(e.to_string())
            }
        })?;

        let payload = parse_rates_body(&body, base)?;

        match &payload.shape {
            RatesShape::FlatRatesShape => {
                debug!(url = %self.url, currencies = payload.table.len(), "Fetched rates");
            }
            RatesShape::ProviderRatesShape { provider, warning } => {
                warn!(
                    url = %self.url,
                    provider = %provider,
                    warning = warning.as_deref().unwrap_or(""),
                    "Rates endpoint answered from a secondary provider"
                );
            }
        }

        Ok(payload)
    }
}

/// Scripted rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    response: parking_lot::Mutex<Option<RateTable>>,
    calls: std::sync::atomic::AtomicUsize,
    delay: Option<std::time::Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// A source that always answers with `table`.
    pub fn answering(table: RateTable) -> Self {
        Self {
            name: "mock".to_string(),
            response: parking_lot::Mutex::new(Some(table)),
            calls: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// A source whose every request fails with a transport error.
    pub fn failing() -> Self {
        Self {
            name: "mock".to_string(),
            response: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the scripted answer.
    pub fn set_response(&self, table: Option<RateTable>) {
        *self.response.lock() = table;
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, _base: &Currency) -> FxResult<RatesPayload> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().clone();
        response
            .map(|table| RatesPayload {
                table,
                shape: RatesShape::FlatRatesShape,
            })
            .ok_or_else(|| FxError::Transport("connection refused".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UPSTREAM_BODY: &str = r#"{
        "provider": null,
        "result": "success",
        "base_code": "USD",
        "time_last_update_unix": 1700000000,
        "rates": { "USD": 1, "EUR": 0.92, "TND": 3.1 }
    }"#;

    const BACKEND_FALLBACK_BODY: &str = r#"{
        "provider": "fallback",
        "warning": "Using default exchange rates. API unavailable.",
        "base": "USD",
        "date": "2026-10-17",
        "rates": { "USD": 1, "EUR": 0.85, "GBP": 0.73 }
    }"#;

    /// Serve exactly one canned HTTP response on an ephemeral port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/api/exchange-rates")
    }

    #[test]
    fn test_parse_flat_shape() {
        let payload = parse_rates_body(UPSTREAM_BODY, &Currency::usd()).unwrap();

        assert_eq!(payload.shape, RatesShape::FlatRatesShape);
        assert_eq!(payload.table.multiplier(&Currency::eur()), Some(dec!(0.92)));
        assert_eq!(payload.table.multiplier(&Currency::tnd()), Some(dec!(3.1)));
        assert_eq!(payload.table.multiplier(&Currency::usd()), Some(Decimal::ONE));
    }

    #[test]
    fn test_parse_provider_shape() {
        let payload = parse_rates_body(BACKEND_FALLBACK_BODY, &Currency::usd()).unwrap();

        assert_eq!(
            payload.shape,
            RatesShape::ProviderRatesShape {
                provider: "fallback".to_string(),
                warning: Some("Using default exchange rates. API unavailable.".to_string()),
            }
        );
        assert_eq!(payload.table.multiplier(&Currency::gbp()), Some(dec!(0.73)));
    }

    #[test]
    fn test_parse_minimal_body_inserts_base() {
        let payload = parse_rates_body(r#"{"rates":{"EUR":0.85}}"#, &Currency::usd()).unwrap();
        assert_eq!(payload.table.multiplier(&Currency::usd()), Some(Decimal::ONE));
        assert_eq!(payload.table.len(), 2);
    }

    #[test]
    fn test_parse_rejects_unrecognized_shapes() {
        let usd = Currency::usd();
        let cases = [
            "not json",
            "[1, 2, 3]",
            r#"{"data": {"EUR": 0.85}}"#,
            r#"{"rates": [0.85]}"#,
            r#"{"rates": {"USD": "1"}}"#,
            r#"{"base": "EUR", "rates": {"USD": 1.17}}"#,
        ];

        for body in cases {
            assert!(parse_rates_body(body, &usd).is_err(), "accepted {body}");
        }
    }

    #[test]
    fn test_parse_drops_invalid_entries() {
        let body = r#"{"rates": {"USD": 1, "EUR": 0.85, "GBP": "0.73", "JPY": 0, "CAD": -1.25, "CHF": null}}"#;

        let payload = parse_rates_body(body, &Currency::usd()).unwrap();

        assert_eq!(payload.table.len(), 2);
        assert_eq!(payload.table.multiplier(&Currency::eur()), Some(dec!(0.85)));
        assert!(!payload.table.contains(&Currency::gbp()));
        assert!(!payload.table.contains(&Currency::jpy()));
    }

    #[test]
    fn test_parse_scientific_rate() {
        let payload = parse_rates_body(r#"{"rates":{"VND":2.5e4}}"#, &Currency::usd()).unwrap();
        assert_eq!(payload.table.multiplier(&Currency::new("VND")), Some(dec!(25000)));
    }

    #[test]
    fn test_parse_rejects_base_not_unity() {
        let result = parse_rates_body(r#"{"rates":{"USD":2}}"#, &Currency::usd());
        assert!(matches!(result, Err(FxError::Monetary(_))));
    }

    #[tokio::test]
    async fn test_http_source_success() {
        let url = serve_once("HTTP/1.1 200 OK", BACKEND_FALLBACK_BODY).await;
        let source = HttpRateSource::new(url, chrono::Duration::seconds(5)).unwrap();

        let payload = source.fetch_rates(&Currency::usd()).await.unwrap();

        assert_eq!(payload.table.multiplier(&Currency::eur()), Some(dec!(0.85)));
        assert!(matches!(payload.shape, RatesShape::ProviderRatesShape { .. }));
    }

    #[tokio::test]
    async fn test_http_source_bad_status() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let source = HttpRateSource::new(url, chrono::Duration::seconds(5)).unwrap();

        let result = source.fetch_rates(&Currency::usd()).await;

        assert!(matches!(result, Err(FxError::UnexpectedStatus(503))));
    }

    #[tokio::test]
    async fn test_http_source_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source =
            HttpRateSource::new(format!("http://{addr}/rates"), chrono::Duration::seconds(2)).unwrap();
        let result = source.fetch_rates(&Currency::usd()).await;

        assert!(matches!(result, Err(FxError::Transport(_)) | Err(FxError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_mock_source_counts_calls() {
        let source = MockRateSource::failing();
        assert!(source.fetch_rates(&Currency::usd()).await.is_err());

        source.set_response(Some(RateTable::new(Currency::usd())));
        assert!(source.fetch_rates(&Currency::usd()).await.is_ok());
        assert_eq!(source.calls(), 2);
    }
}
