//! Currency rate API client
//!
//! `GET {base_url}/currencies/{code}.json` answers with
//! `{"date": "...", "<code>": {"<other>": rate, ...}}`. A flat
//! `{"<other>": rate}` object is accepted as well.

use cellflow_core::{FetchError, FetchFuture, Source};
use serde_json::Value as Json;

use crate::value::{Rates, Value};

/// Public jsDelivr mirror of the currency API.
pub const DEFAULT_API_BASE: &str =
    "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1";

/// Where to fetch rates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyApiConfig {
    pub base_url: String,
}

impl Default for CurrencyApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl CurrencyApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// URL of the rate table for `code`.
    pub fn rates_url(&self, code: &str) -> String {
        format!(
            "{}/currencies/{}.json",
            self.base_url.trim_end_matches('/'),
            code.to_lowercase()
        )
    }
}

/// HTTP client for rate tables.
#[derive(Debug, Clone)]
pub struct RatesClient {
    http: reqwest::Client,
    config: CurrencyApiConfig,
}

impl RatesClient {
    pub fn new(config: CurrencyApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CurrencyApiConfig {
        &self.config
    }

    /// Fetch the rate table for `code`.
    pub async fn fetch_rates(&self, code: &str) -> Result<Rates, FetchError> {
        let url = self.config.rates_url(code);
        tracing::debug!(%url, "fetching rates");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_rates(code, &body)
    }
}

impl Source<Value> for RatesClient {
    fn fetch(&self, key: &str) -> FetchFuture<Value> {
        let client = self.clone();
        let code = key.to_string();
        Box::pin(async move { client.fetch_rates(&code).await.map(Value::Rates) })
    }
}

/// Parse a rate table answer for base `code`.
///
/// Non-numeric entries (such as `date`) are ignored.
pub fn parse_rates(code: &str, body: &str) -> Result<Rates, FetchError> {
    let json: Json = serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let Json::Object(root) = json else {
        return Err(FetchError::Malformed("expected a JSON object".into()));
    };

    let table = match root.get(&code.to_lowercase()) {
        Some(Json::Object(nested)) => nested,
        Some(_) => return Err(FetchError::Malformed(format!("`{code}` is not an object"))),
        None => &root,
    };

    let rates: Rates = table
        .iter()
        .filter_map(|(name, rate)| rate.as_f64().map(|r| (name.to_lowercase(), r)))
        .collect();

    if rates.is_empty() {
        return Err(FetchError::Malformed(format!("no rates for `{code}`")));
    }
    Ok(rates)
}
