use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::format_utils::{
    UNAVAILABLE, escape_markdown, format_change_pct, format_price, format_signed, or_unavailable,
};
use crate::indicators::IndicatorSet;
use crate::macro_context::MacroContext;
use crate::market::AssetSnapshot;
use crate::perps::PerpSnapshot;
use crate::storage_utils::ReportConfig;

pub const TITLE: &str = "🔷 *V3 DATA READY*";
pub const CALL_TO_ACTION: &str = "Forward this to AI with:\n`Run V3 analysis on this data`";

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: Option<String>,
    pub lines: Vec<String>,
}

impl Section {
    fn titled(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: Some(title.into()),
            lines,
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(title);
            if !self.lines.is_empty() {
                out.push('\n');
            }
        }
        out.push_str(&self.lines.join("\n"));
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub sections: Vec<Section>,
}

impl Report {
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[cfg(test)]
    pub fn section(&self, title_prefix: &str) -> Option<&Section> {
        self.sections.iter().find(|s| {
            s.title
                .as_deref()
                .is_some_and(|t| t.starts_with(title_prefix))
        })
    }
}

/// Indicator block for one highlighted asset.
#[derive(Debug, Clone)]
pub struct Narrative {
    pub symbol: String,
    pub indicators: IndicatorSet,
    pub perps: Option<PerpSnapshot>,
}

/// `SYM $price (+x.xx%)`, the line shape shared by the ranked sections.
pub fn asset_line(asset: &AssetSnapshot) -> String {
    format!(
        "{} {} ({})",
        escape_markdown(&asset.symbol),
        format_price(asset.price()),
        format_change_pct(asset.change_24h())
    )
}

fn header_section(generated_at: DateTime<Utc>) -> Section {
    Section {
        title: None,
        lines: vec![
            TITLE.to_string(),
            format!("`{}`", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ],
    }
}

fn macro_section(context: &MacroContext) -> Section {
    let sentiment = match &context.sentiment {
        Some(s) => format!("Fear & Greed: *{}* ({})", s.value, s.label),
        None => format!("Fear & Greed: *{}* ({})", UNAVAILABLE, UNAVAILABLE),
    };
    let dominance = format!(
        "BTC Dominance: *{}*",
        or_unavailable(context.btc_dominance, |d| format!("{:.1}%", d))
    );
    Section::titled("*Macro:*", vec![sentiment, dominance])
}

fn top_section(assets: &[AssetSnapshot], top_n: usize) -> Section {
    let lines = assets
        .iter()
        .take(top_n)
        .enumerate()
        .map(|(i, asset)| format!("{}. {}", i + 1, asset_line(asset)))
        .collect();
    Section::titled(format!("*Top {}:*", top_n), lines)
}

pub fn momentum_movers<'a>(
    assets: &'a [AssetSnapshot],
    config: &ReportConfig,
) -> impl Iterator<Item = &'a AssetSnapshot> {
    let (start, end) = config.scan_bounds(assets.len());
    let threshold = config.momentum_threshold_pct;
    assets[start..end]
        .iter()
        .filter(move |asset| asset.change_24h().abs() > threshold)
        .take(config.momentum_limit)
}

fn momentum_section(assets: &[AssetSnapshot], config: &ReportConfig) -> Section {
    let lines = momentum_movers(assets, config)
        .map(|asset| {
            format!(
                "{} {}",
                escape_markdown(&asset.symbol),
                format_change_pct(asset.change_24h())
            )
        })
        .collect();
    Section::titled(
        format!("*High Momentum (>{}%):*", config.momentum_threshold_pct),
        lines,
    )
}

pub fn watchlist_hits<'a>(
    assets: &'a [AssetSnapshot],
    config: &ReportConfig,
) -> impl Iterator<Item = &'a AssetSnapshot> {
    let (start, end) = config.scan_bounds(assets.len());
    let wanted: HashSet<String> = config
        .watchlist
        .iter()
        .map(|s| s.trim().to_uppercase())
        .collect();
    assets[start..end]
        .iter()
        .filter(move |asset| wanted.contains(&asset.symbol))
}

fn watchlist_section(assets: &[AssetSnapshot], config: &ReportConfig) -> Section {
    let lines = watchlist_hits(assets, config).map(asset_line).collect();
    Section::titled("*Your Watchlist:*", lines)
}

fn narrative_lines(narrative: &Narrative) -> Vec<String> {
    let set = &narrative.indicators;
    let aux = |name: &str, key: &str| set.get(name).and_then(|r| r.aux.get(key).copied());
    let note = |name: &str| {
        set.get(name)
            .map(|r| r.interpretation.clone())
            .unwrap_or_default()
    };

    let mut lines = Vec::new();

    if let Some(rsi) = set.number("RSI") {
        lines.push(format!("RSI~ {:.0} ({})", rsi, note("RSI")));
    }
    if let (Some(macd), Some(signal)) = (set.number("MACD"), aux("MACD", "signal")) {
        lines.push(format!(
            "MACD~ {} / signal {} ({})",
            format_signed(macd),
            format_signed(signal),
            note("MACD")
        ));
    }
    if let (Some(adx), Some(plus), Some(minus)) =
        (set.number("ADX"), aux("ADX", "+DI"), aux("ADX", "-DI"))
    {
        lines.push(format!(
            "ADX~ {:.0} (+DI {:.0} / -DI {:.0}) {}",
            adx,
            plus,
            minus,
            note("ADX")
        ));
    }
    if let (Some(e20), Some(e50), Some(e200)) =
        (aux("EMA", "EMA20"), aux("EMA", "EMA50"), aux("EMA", "EMA200"))
    {
        lines.push(format!(
            "EMA 20/50/200~ {} / {} / {} ({})",
            format_price(e20),
            format_price(e50),
            format_price(e200),
            note("EMA")
        ));
    }
    if let (Some(r), Some(p), Some(s)) = (
        aux("LEVELS", "resistance"),
        set.number("LEVELS"),
        aux("LEVELS", "support"),
    ) {
        lines.push(format!(
            "Levels: R {} | P {} | S {}",
            format_price(r),
            format_price(p),
            format_price(s)
        ));
    }
    if let Some(atr) = set.number("ATR") {
        lines.push(format!("Range~ {}% ({})", format_signed(atr), note("ATR")));
    }
    if let Some(cvd) = set.get("CVD") {
        lines.push(format!("Order flow: {} ({})", cvd.value, cvd.interpretation));
    }
    if let (Some(score), Some(h1), Some(h4)) = (
        set.number("CONFLUENCE"),
        aux("CONFLUENCE", "1h"),
        aux("CONFLUENCE", "4h"),
    ) {
        lines.push(format!(
            "Confluence: *{:.0}/90* {} (1h~ {}, 4h~ {})",
            score,
            note("CONFLUENCE"),
            format_change_pct(h1),
            format_change_pct(h4)
        ));
    }
    if let Some(alt) = set.number("ALT_RISK") {
        lines.push(format!("Alt risk ratio: {:.2} ({})", alt, note("ALT_RISK")));
    }

    if let Some(perps) = narrative.perps.as_ref().filter(|p| !p.is_empty()) {
        let mark = perps
            .context
            .as_ref()
            .and_then(|c| c.mark_price)
            .map(format_price);
        let funding = perps
            .context
            .as_ref()
            .and_then(|c| c.funding_rate)
            .map(|f| format!("{:+.4}%", f * 100.0));
        let open_interest = perps
            .context
            .as_ref()
            .and_then(|c| c.open_interest)
            .map(|oi| format!("{:.2}", oi));
        let book = perps
            .book
            .map(|b| format_change_pct(b.imbalance_pct()));
        lines.push(format!(
            "Perps: mark {} | funding {} | OI {} | book {}",
            mark.as_deref().unwrap_or(UNAVAILABLE),
            funding.as_deref().unwrap_or(UNAVAILABLE),
            open_interest.as_deref().unwrap_or(UNAVAILABLE),
            book.as_deref().unwrap_or(UNAVAILABLE)
        ));
    }

    lines
}

fn narrative_section(narrative: &Narrative) -> Section {
    Section::titled(
        format!("*Indicators ({}):*", escape_markdown(&narrative.symbol)),
        narrative_lines(narrative),
    )
}

/// The asset the narrative describes: the configured symbol if listed, else rank 1.
pub fn narrative_asset<'a>(
    assets: &'a [AssetSnapshot],
    config: &ReportConfig,
) -> Option<&'a AssetSnapshot> {
    config
        .narrative_symbol
        .as_deref()
        .and_then(|wanted| {
            let wanted = wanted.trim().to_uppercase();
            assets.iter().find(|a| a.symbol == wanted)
        })
        .or_else(|| assets.first())
}

/// Assembles the digest. Every section is bounded by a fixed count, except the
/// watchlist, which is bounded by the configured list itself.
pub fn build_report(
    assets: &[AssetSnapshot],
    context: &MacroContext,
    config: &ReportConfig,
    narrative: Option<&Narrative>,
    generated_at: DateTime<Utc>,
) -> Report {
    let mut sections = vec![
        header_section(generated_at),
        macro_section(context),
        top_section(assets, config.top_n),
        momentum_section(assets, config),
        watchlist_section(assets, config),
    ];
    if let Some(narrative) = narrative {
        sections.push(narrative_section(narrative));
    }
    sections.push(Section::titled(
        "*Next step:*",
        vec![CALL_TO_ACTION.to_string()],
    ));
    Report { sections }
}
