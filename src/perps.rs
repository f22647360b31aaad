use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::indicators::book_imbalance;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerpRequestKind {
    #[serde(rename = "metaAndAssetContext")]
    MetaAndAssetContext,
    #[serde(rename = "clearinghouseState")]
    ClearinghouseState,
}

#[derive(Serialize, Debug)]
struct PerpRequest<'a> {
    #[serde(rename = "type")]
    kind: PerpRequestKind,
    coin: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerpContext {
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
    pub mark_price: Option<f64>,
}

impl PerpContext {
    fn is_empty(&self) -> bool {
        self.funding_rate.is_none() && self.open_interest.is_none() && self.mark_price.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookPressure {
    pub bid_volume: f64,
    pub ask_volume: f64,
}

impl BookPressure {
    pub fn imbalance_pct(&self) -> f64 {
        book_imbalance(self.bid_volume, self.ask_volume)
    }
}

/// Whatever the perpetuals venue could tell us about one coin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerpSnapshot {
    pub context: Option<PerpContext>,
    pub book: Option<BookPressure>,
}

impl PerpSnapshot {
    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.book.is_none()
    }
}

// Numbers arrive as JSON numbers or decimal strings.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key).and_then(as_f64)
}

fn context_from_object(obj: &Value) -> PerpContext {
    PerpContext {
        funding_rate: field(obj, "funding"),
        open_interest: field(obj, "openInterest"),
        mark_price: field(obj, "markPx"),
    }
}

/// Accepts either a flat context object or the `[meta, contexts]` pair where the
/// coin's index in `meta.universe` selects its entry in `contexts`.
fn parse_context(body: &Value, coin: &str) -> Option<PerpContext> {
    let context = match body {
        Value::Array(parts) => {
            let universe = parts.first()?.get("universe")?.as_array()?;
            let index = universe.iter().position(|asset| {
                asset
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.eq_ignore_ascii_case(coin))
            })?;
            context_from_object(parts.get(1)?.as_array()?.get(index)?)
        }
        Value::Object(_) => context_from_object(body),
        _ => return None,
    };
    if context.is_empty() { None } else { Some(context) }
}

fn side_volume(side: &Value) -> Option<f64> {
    let levels = side.as_array()?;
    Some(levels.iter().filter_map(|level| field(level, "sz")).sum())
}

fn parse_book(body: &Value) -> Option<BookPressure> {
    let levels = body.get("levels")?.as_array()?;
    Some(BookPressure {
        bid_volume: side_volume(levels.first()?)?,
        ask_volume: side_volume(levels.get(1)?)?,
    })
}

async fn post_info(
    client: &Client,
    base_url: &str,
    kind: PerpRequestKind,
    coin: &str,
    timeout: Duration,
) -> Option<Value> {
    let url = format!("{}/info", base_url.trim_end_matches('/'));
    let result: Result<Value, reqwest::Error> = async {
        client
            .post(&url)
            .json(&PerpRequest { kind, coin })
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
    .await;

    match result {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(?kind, coin, error = %e, "perpetuals request failed");
            None
        }
    }
}

pub async fn fetch_perp_context(
    client: &Client,
    base_url: &str,
    coin: &str,
    timeout: Duration,
) -> Option<PerpContext> {
    let body = post_info(client, base_url, PerpRequestKind::MetaAndAssetContext, coin, timeout).await?;
    let context = parse_context(&body, coin);
    if context.is_none() {
        debug!(coin, "no perpetual context in response");
    }
    context
}

pub async fn fetch_book_pressure(
    client: &Client,
    base_url: &str,
    coin: &str,
    timeout: Duration,
) -> Option<BookPressure> {
    let body = post_info(client, base_url, PerpRequestKind::ClearinghouseState, coin, timeout).await?;
    let book = parse_book(&body);
    if book.is_none() {
        debug!(coin, "no book levels in response");
    }
    book
}

/// Both perpetuals lookups for one coin, one after the other.
pub async fn fetch_perp_snapshot(
    client: &Client,
    base_url: &str,
    coin: &str,
    timeout: Duration,
) -> PerpSnapshot {
    PerpSnapshot {
        context: fetch_perp_context(client, base_url, coin, timeout).await,
        book: fetch_book_pressure(client, base_url, coin, timeout).await,
    }
}
