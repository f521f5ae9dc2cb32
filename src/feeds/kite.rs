use crate::config::KiteConfig;
use crate::feeds::retry::RetryPolicy;
use crate::feeds::{PriceSource, Quote};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// REST client for Kite Connect v3.
///
/// Serves LTP/quote reads and the instrument dump; order placement lives
/// in `execution::kite` on top of the same authenticated client.
pub struct KiteClient {
    config: KiteConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LtpEntry {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    last_price: f64,
    ohlc: Ohlc,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    close: f64,
}

impl KiteClient {
    pub fn new(config: KiteConfig, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .build()
            .context("failed to build Kite HTTP client")?;

        Ok(Self { config, http, retry })
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.config.api_key, self.config.access_token)
    }

    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        self.http
            .request(method, url)
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
    }

    /// Decode the `{status, data}` envelope Kite wraps every JSON reply in.
    pub(crate) async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let text = resp.text().await?;
        let body: Envelope<T> = serde_json::from_str(&text)
            .with_context(|| format!("HTTP {status}: unexpected body {text}"))?;

        if body.status != "success" {
            bail!(
                "{}: {}",
                body.error_type.as_deref().unwrap_or("KiteError"),
                body.message.as_deref().unwrap_or("no message")
            );
        }
        body.data.context("success response without data")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .query(&[("i", symbol)])
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Full instrument dump for an exchange segment, as Kite's CSV text.
    pub async fn instruments_csv(&self, exchange: &str) -> Result<String> {
        let path = format!("/instruments/{exchange}");
        let path = path.as_str();
        self.retry
            .run("instruments", || async move {
                let resp = self
                    .request(reqwest::Method::GET, path)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(resp.text().await?)
            })
            .await
    }
}

#[async_trait]
impl PriceSource for KiteClient {
    async fn last_traded_price(&self, symbol: &str) -> Result<f64> {
        let price = self
            .retry
            .run("ltp", || async move {
                let mut data: HashMap<String, LtpEntry> = self.get_json("/quote/ltp", symbol).await?;
                data.remove(symbol)
                    .map(|e| e.last_price)
                    .with_context(|| format!("{symbol} missing from LTP response"))
            })
            .await?;
        debug!(symbol, price, "ltp");
        Ok(price)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.retry
            .run("quote", || async move {
                let mut data: HashMap<String, QuoteEntry> = self.get_json("/quote", symbol).await?;
                let q = data
                    .remove(symbol)
                    .with_context(|| format!("{symbol} missing from quote response"))?;
                Ok(Quote {
                    last_price: q.last_price,
                    prev_close: q.ohlc.close,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ltp_envelope() {
        let text = r#"{"status":"success","data":{"NSE:NIFTY 50":{"instrument_token":256265,"last_price":22498.35}}}"#;
        let body: Envelope<HashMap<String, LtpEntry>> = serde_json::from_str(text).unwrap();
        assert_eq!(body.status, "success");
        let data = body.data.unwrap();
        assert_eq!(data["NSE:NIFTY 50"].last_price, 22498.35);
    }

    #[test]
    fn test_parse_quote_envelope() {
        let text = r#"{"status":"success","data":{"NSE:INDIA VIX":{"instrument_token":264969,"last_price":14.2,
            "ohlc":{"open":13.9,"high":14.5,"low":13.8,"close":13.75}}}}"#;
        let body: Envelope<HashMap<String, QuoteEntry>> = serde_json::from_str(text).unwrap();
        let data = body.data.unwrap();
        let q = &data["NSE:INDIA VIX"];
        assert_eq!(q.last_price, 14.2);
        assert_eq!(q.ohlc.close, 13.75);
    }

    #[test]
    fn test_parse_error_envelope() {
        let text = r#"{"status":"error","message":"Incorrect `api_key` or `access_token`.","error_type":"TokenException"}"#;
        let body: Envelope<HashMap<String, LtpEntry>> = serde_json::from_str(text).unwrap();
        assert_eq!(body.status, "error");
        assert!(body.data.is_none());
        assert_eq!(body.error_type.as_deref(), Some("TokenException"));
    }
}
