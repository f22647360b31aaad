use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::market::deserialize_f64_lenient;

/// Fear & Greed reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentiment {
    pub value: u8,
    pub label: String,
}

/// Decorative market-wide context. `None` in either field means the source was unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroContext {
    pub sentiment: Option<Sentiment>,
    pub btc_dominance: Option<f64>,
}

// --- Wire shapes ---

#[derive(Deserialize, Debug)]
struct FearGreedResponse {
    #[serde(default)]
    data: Vec<FearGreedEntry>,
}

#[derive(Deserialize, Debug)]
struct FearGreedEntry {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    value_classification: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GlobalResponse {
    #[serde(default)]
    data: Option<GlobalData>,
}

#[derive(Deserialize, Debug)]
struct GlobalData {
    #[serde(default)]
    market_cap_percentage: HashMap<String, DominanceValue>,
}

#[derive(Deserialize, Debug)]
struct DominanceValue(#[serde(deserialize_with = "deserialize_f64_lenient")] Option<f64>);

// --- Decoding ---

fn sentiment_from(response: FearGreedResponse) -> Option<Sentiment> {
    let entry = response.data.into_iter().next()?;
    let value = entry.value?.trim().parse::<u8>().ok()?;
    if value > 100 {
        return None;
    }
    Some(Sentiment {
        value,
        label: entry
            .value_classification
            .unwrap_or_else(|| "N/A".to_string()),
    })
}

fn dominance_from(response: GlobalResponse) -> Option<f64> {
    let pct = response.data?.market_cap_percentage.get("btc")?.0?;
    if !pct.is_finite() || pct <= 0.0 {
        return None;
    }
    Some((pct * 10.0).round() / 10.0)
}

// --- Fetching ---

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<T, reqwest::Error> {
    client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .json::<T>()
        .await
}

pub async fn fetch_sentiment(client: &Client, base_url: &str, timeout: Duration) -> Option<Sentiment> {
    let url = format!("{}/fng/?limit=1", base_url.trim_end_matches('/'));
    match get_json::<FearGreedResponse>(client, &url, timeout).await {
        Ok(response) => {
            let sentiment = sentiment_from(response);
            if sentiment.is_none() {
                warn!("Fear & Greed response had no usable reading");
            }
            sentiment
        }
        Err(e) => {
            warn!(error = %e, "Could not fetch Fear & Greed Index");
            None
        }
    }
}

pub async fn fetch_btc_dominance(client: &Client, base_url: &str, timeout: Duration) -> Option<f64> {
    let url = format!("{}/global", base_url.trim_end_matches('/'));
    match get_json::<GlobalResponse>(client, &url, timeout).await {
        Ok(response) => {
            let dominance = dominance_from(response);
            if dominance.is_none() {
                warn!("global response had no BTC dominance");
            }
            dominance
        }
        Err(e) => {
            warn!(error = %e, "Could not fetch BTC Dominance");
            None
        }
    }
}

/// Runs both macro requests one after the other. Never fails: each field degrades on its own.
pub async fn fetch_macro_context(
    client: &Client,
    alternative_me_url: &str,
    coingecko_url: &str,
    timeout: Duration,
) -> MacroContext {
    let sentiment = fetch_sentiment(client, alternative_me_url, timeout).await;
    let btc_dominance = fetch_btc_dominance(client, coingecko_url, timeout).await;
    info!(
        sentiment = sentiment.as_ref().map(|s| s.value),
        btc_dominance, "macro context ready"
    );
    MacroContext {
        sentiment,
        btc_dominance,
    }
}
