use crate::error::FetchError;
use reqwest::Client;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

pub const PAGE_SIZE: u32 = 200;

/// One row of the ranked market list. Position in the fetched `Vec` is the rank.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AssetSnapshot {
    #[serde(deserialize_with = "deserialize_symbol")]
    pub symbol: String,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub total_volume: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub high_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub low_24h: Option<f64>,
}

impl AssetSnapshot {
    pub fn price(&self) -> f64 {
        self.current_price.unwrap_or(0.0)
    }

    /// 24h change in percent; a missing value counts as no change.
    pub fn change_24h(&self) -> f64 {
        self.price_change_percentage_24h.unwrap_or(0.0)
    }

    pub fn volume(&self) -> f64 {
        self.total_volume.unwrap_or(0.0)
    }

    pub fn market_cap(&self) -> f64 {
        self.market_cap.unwrap_or(0.0)
    }

    // Without a reported range, the current price is the best guess for both ends.
    pub fn high(&self) -> f64 {
        self.high_24h.unwrap_or_else(|| self.price())
    }

    pub fn low(&self) -> f64 {
        self.low_24h.unwrap_or_else(|| self.price())
    }
}

fn deserialize_symbol<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_uppercase())
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, a numeric string or null")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v).filter(|v| v.is_finite()))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            // "NaN" and "inf" parse as f64 but are no more usable than null.
            let parsed = v.trim().parse::<f64>().map_err(E::custom)?;
            Ok(Some(parsed).filter(|v| v.is_finite()))
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

pub(crate) fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

fn market_query() -> Vec<(&'static str, String)> {
    vec![
        ("vs_currency", "usd".to_string()),
        ("order", "market_cap_desc".to_string()),
        ("per_page", PAGE_SIZE.to_string()),
        ("page", "1".to_string()),
        ("sparkline", "false".to_string()),
        ("price_change_percentage", "24h".to_string()),
    ]
}

/// Fetches up to 200 assets ranked by market cap. Any failure here, a timeout
/// included, is fatal to the run.
pub async fn fetch_market_snapshot(
    client: &Client,
    base_url: &str,
    timeout: Duration,
) -> Result<Vec<AssetSnapshot>, FetchError> {
    let url = format!("{}/coins/markets", base_url.trim_end_matches('/'));
    debug!(%url, "fetching market snapshot");

    let response = client
        .get(&url)
        .query(&market_query())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_send(&url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let mut assets: Vec<AssetSnapshot> = response
        .json()
        .await
        .map_err(|e| FetchError::from_body(&url, e))?;
    assets.truncate(PAGE_SIZE as usize);

    info!(count = assets.len(), "market snapshot fetched");
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port_url, serve_once, serve_silent};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn decodes_numbers_strings_and_nulls() {
        let raw = r#"[
            {"symbol": "btc", "current_price": 65000.5, "price_change_percentage_24h": "3.21",
             "total_volume": 1000, "market_cap": null, "high_24h": "", "low_24h": 64000},
            {"symbol": " eth ", "current_price": "3100"}
        ]"#;
        let assets: Vec<AssetSnapshot> = serde_json::from_str(raw).unwrap();

        assert_eq!(assets[0].symbol, "BTC");
        assert_eq!(assets[0].change_24h(), 3.21);
        assert_eq!(assets[0].volume(), 1000.0);
        assert_eq!(assets[0].market_cap, None);
        assert_eq!(assets[0].high(), 65000.5);
        assert_eq!(assets[0].low(), 64000.0);

        assert_eq!(assets[1].symbol, "ETH");
        assert_eq!(assets[1].price(), 3100.0);
        assert_eq!(assets[1].change_24h(), 0.0);
    }

    #[test]
    fn non_finite_strings_decode_as_missing() {
        let raw = r#"{"symbol": "x", "current_price": "NaN", "price_change_percentage_24h": "inf",
                      "total_volume": "-infinity", "high_24h": "12.5"}"#;
        let asset: AssetSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(asset.current_price, None);
        assert_eq!(asset.price_change_percentage_24h, None);
        assert_eq!(asset.total_volume, None);
        assert_eq!(asset.change_24h(), 0.0);
        assert_eq!(asset.high(), 12.5);
    }

    #[test]
    fn garbage_numeric_string_is_rejected() {
        let raw = r#"{"symbol": "x", "current_price": "abc"}"#;
        assert!(serde_json::from_str::<AssetSnapshot>(raw).is_err());
    }

    #[tokio::test]
    async fn fetches_and_decodes_market_list() {
        let body = r#"[{"symbol":"btc","current_price":65000.1234,"price_change_percentage_24h":3.21}]"#;
        let (base, request) = serve_once(200, body).await;

        let assets = fetch_market_snapshot(&Client::new(), &base, WAIT).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].symbol, "BTC");

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /coins/markets?"));
        assert!(request.contains("vs_currency=usd"));
        assert!(request.contains("order=market_cap_desc"));
        assert!(request.contains("per_page=200"));
        assert!(request.contains("price_change_percentage=24h"));
    }

    #[tokio::test]
    async fn non_success_status_is_fatal() {
        let (base, _request) = serve_once(429, r#"{"error":"rate limited"}"#).await;
        let err = fetch_market_snapshot(&Client::new(), &base, WAIT).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let err = fetch_market_snapshot(&Client::new(), &closed_port_url(), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn stalled_provider_is_a_timeout() {
        let base = serve_silent().await;
        let err = fetch_market_snapshot(&Client::new(), &base, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, FetchError::Timeout { ref url } if url.ends_with("/coins/markets")));
    }
}
