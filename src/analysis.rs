//! The one-shot digest pipeline.

use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use tracing::{error, info};

use crate::comfy_table;
use crate::indicators::IndicatorSet;
use crate::macro_context::fetch_macro_context;
use crate::market::fetch_market_snapshot;
use crate::perps::fetch_perp_snapshot;
use crate::report::{Narrative, Report, build_report, narrative_asset};
use crate::settings::Settings;
use crate::storage_utils::AppConfig;
use crate::telegram::TelegramSink;

pub struct RunSummary {
    pub report: Report,
    pub delivered: bool,
}

/// Runs the full digest pipeline:
/// 1. Fetches the ranked market list (fatal on failure).
/// 2. Fetches sentiment and BTC dominance (each degrades to unavailable).
/// 3. Derives indicators (and perpetuals data) for the narrative asset.
/// 4. Assembles the report.
/// 5. Delivers it; a failed delivery is logged and the run still succeeds.
pub async fn run_analysis_pipeline(config: &AppConfig, settings: Settings) -> Result<RunSummary> {
    let client = Client::builder().build()?;
    let sink = TelegramSink::new(client.clone(), &config.endpoints.telegram, settings)
        .with_timeout(config.timeouts.request());
    run_with(&client, config, &sink).await
}

async fn run_with(client: &Client, config: &AppConfig, sink: &TelegramSink) -> Result<RunSummary> {
    let endpoints = &config.endpoints;
    let market_timeout = config.timeouts.market();
    let request_timeout = config.timeouts.request();

    // Step 1: Market snapshot
    let assets = match fetch_market_snapshot(client, &endpoints.coingecko, market_timeout).await {
        Ok(assets) => assets,
        Err(e) => {
            if e.is_timeout() {
                error!("API timeout - try again in 30 seconds");
            } else {
                error!(error = %e, "Error fetching market data");
            }
            return Err(e.into());
        }
    };

    // Step 2: Macro context
    let context = fetch_macro_context(
        client,
        &endpoints.alternative_me,
        &endpoints.coingecko,
        request_timeout,
    )
    .await;

    // Step 3: Indicators for the highlighted asset
    let narrative = match narrative_asset(&assets, &config.report) {
        Some(asset) => {
            let perps = if config.report.include_perps {
                Some(
                    fetch_perp_snapshot(client, &endpoints.hyperliquid, &asset.symbol, request_timeout)
                        .await,
                )
            } else {
                None
            };
            Some(Narrative {
                symbol: asset.symbol.clone(),
                indicators: IndicatorSet::derive(asset, &context),
                perps,
            })
        }
        None => None,
    };

    // Step 4: Report
    let report = build_report(
        &assets,
        &context,
        &config.report,
        narrative.as_ref(),
        Utc::now(),
    );
    let text = report.render();

    // Step 5: Delivery
    let delivered = sink.send(&text).await;

    println!("{}", comfy_table::render(&assets, &context, config.report.top_n));
    println!("{}", text);
    info!(assets = assets.len(), delivered, "digest run finished");

    Ok(RunSummary { report, delivered })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::storage_utils::{Endpoints, ReportConfig, Timeouts};
    use crate::test_support::{closed_port_url, serve_once, serve_once_then_stall, serve_silent};
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            bot_token: "1:t".to_string(),
            chat_id: "7".to_string(),
        }
    }

    fn config(endpoints: Endpoints) -> AppConfig {
        AppConfig {
            report: ReportConfig {
                include_perps: false,
                ..ReportConfig::default()
            },
            endpoints,
            timeouts: Timeouts::default(),
        }
    }

    #[tokio::test]
    async fn failed_dominance_still_completes_and_delivers() {
        let (market, _m) = serve_once(
            200,
            r#"[{"symbol":"btc","current_price":65000.1234,"price_change_percentage_24h":3.21,
                 "total_volume":1,"market_cap":2,"high_24h":66000,"low_24h":64000}]"#,
        )
        .await;
        let (fng, _f) = serve_once(
            200,
            r#"{"data":[{"value":"40","value_classification":"Fear"}]}"#,
        )
        .await;
        let (telegram, sent) = serve_once(200, r#"{"ok":true}"#).await;

        // Dominance shares the market host, which only answers once.
        let config = config(Endpoints {
            coingecko: market,
            alternative_me: fng,
            hyperliquid: closed_port_url(),
            telegram: telegram.clone(),
        });
        let sink = TelegramSink::new(Client::new(), telegram, settings());

        let summary = run_with(&Client::new(), &config, &sink).await.unwrap();
        assert!(summary.delivered);

        let text = summary.report.render();
        assert!(text.contains("BTC Dominance: *N/A*"));
        assert!(text.contains("Fear & Greed: *40* (Fear)"));
        assert!(text.contains("1. BTC $65000.12 (+3.21%)"));
        assert!(text.contains("*Indicators (BTC):*"));
        assert!(sent.await.unwrap().contains("BTC Dominance: *N/A*"));
    }

    #[tokio::test]
    async fn market_failure_aborts_before_delivery() {
        let (market, _m) = serve_once(500, "{}").await;
        let config = config(Endpoints {
            coingecko: market,
            alternative_me: closed_port_url(),
            hyperliquid: closed_port_url(),
            telegram: closed_port_url(),
        });
        let sink = TelegramSink::new(Client::new(), closed_port_url(), settings());

        let err = run_with(&Client::new(), &config, &sink).await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn market_timeout_aborts_before_delivery() {
        let (telegram, sent) = serve_once(200, r#"{"ok":true}"#).await;
        let mut config = config(Endpoints {
            coingecko: serve_silent().await,
            alternative_me: closed_port_url(),
            hyperliquid: closed_port_url(),
            telegram: telegram.clone(),
        });
        config.timeouts.market_ms = 200;
        let sink = TelegramSink::new(Client::new(), telegram, settings());

        let err = run_with(&Client::new(), &config, &sink).await.err().unwrap();
        let fetch_err = err.downcast_ref::<FetchError>().unwrap();
        assert!(fetch_err.is_timeout());
        assert!(matches!(fetch_err, FetchError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sent.is_finished());
    }

    #[tokio::test]
    async fn stalled_dominance_renders_unavailable() {
        // Market and dominance share one host: the market call is answered, the
        // dominance call hangs until the request timeout.
        let market = serve_once_then_stall(
            200,
            r#"[{"symbol":"btc","current_price":65000,"price_change_percentage_24h":1.5}]"#,
        )
        .await;
        let (fng, _f) = serve_once(
            200,
            r#"{"data":[{"value":"61","value_classification":"Greed"}]}"#,
        )
        .await;
        let (telegram, sent) = serve_once(200, r#"{"ok":true}"#).await;

        let mut config = config(Endpoints {
            coingecko: market,
            alternative_me: fng,
            hyperliquid: closed_port_url(),
            telegram: telegram.clone(),
        });
        config.timeouts.request_ms = 200;
        let sink = TelegramSink::new(Client::new(), telegram, settings());

        let summary = run_with(&Client::new(), &config, &sink).await.unwrap();
        assert!(summary.delivered);

        let text = summary.report.render();
        assert!(text.contains("BTC Dominance: *N/A*"));
        assert!(text.contains("Fear & Greed: *61* (Greed)"));
        assert!(sent.await.unwrap().contains("BTC Dominance: *N/A*"));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_the_run() {
        let (market, _m) = serve_once(200, r#"[{"symbol":"eth","current_price":3000}]"#).await;
        let config = config(Endpoints {
            coingecko: market,
            alternative_me: closed_port_url(),
            hyperliquid: closed_port_url(),
            telegram: closed_port_url(),
        });
        let sink = TelegramSink::new(Client::new(), closed_port_url(), settings());

        let summary = run_with(&Client::new(), &config, &sink).await.unwrap();
        assert!(!summary.delivered);
        assert!(summary.report.render().contains("Fear & Greed: *N/A* (N/A)"));
    }
}
