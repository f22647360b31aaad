use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::format_utils::{format_change_pct, format_price};
use crate::indicators::IndicatorSet;
use crate::macro_context::MacroContext;
use crate::market::AssetSnapshot;

// Fades weaker movers toward gray, never below 40% intensity.
fn get_visibility_ratio(current_pct: f64, top_pct: f64) -> f64 {
    if top_pct <= 0.0 {
        1.0
    } else {
        (0.4 + 0.6 * (current_pct.abs() / top_pct)).clamp(0.4, 1.0)
    }
}

/// Console view of the top `top_n` assets with their indicator proxies.
pub fn render(assets: &[AssetSnapshot], context: &MacroContext, top_n: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Asset").add_attribute(Attribute::Bold),
            Cell::new("Price")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("24h")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("RSI~").add_attribute(Attribute::Bold),
            Cell::new("ADX~").add_attribute(Attribute::Bold),
            Cell::new("Confluence").add_attribute(Attribute::Bold),
            Cell::new("Call").add_attribute(Attribute::Bold),
        ]);

    let shown = &assets[..top_n.min(assets.len())];
    let top_move = shown
        .iter()
        .map(|a| a.change_24h().abs())
        .fold(0.0_f64, f64::max);

    for (i, asset) in shown.iter().enumerate() {
        let change = asset.change_24h();
        let set = IndicatorSet::derive(asset, context);
        let ratio = get_visibility_ratio(change, top_move);
        let shade = (255.0 * ratio) as u8;
        let change_color = if change < 0.0 {
            Color::Rgb { r: shade, g: 0, b: 0 }
        } else {
            Color::Rgb { r: 0, g: shade, b: 0 }
        };
        let score = set.number("CONFLUENCE").unwrap_or(0.0);
        let call = set
            .get("CONFLUENCE")
            .map(|r| r.interpretation.clone())
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(i + 1).fg(Color::DarkGrey),
            Cell::new(&asset.symbol).fg(Color::Rgb {
                r: 0,
                g: shade,
                b: shade,
            }),
            Cell::new(format_price(asset.price())).set_alignment(CellAlignment::Right),
            Cell::new(format_change_pct(change))
                .fg(change_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}", set.number("RSI").unwrap_or(50.0))),
            Cell::new(format!("{:.0}", set.number("ADX").unwrap_or(0.0))),
            Cell::new(format!("{:.0}/90", score)),
            Cell::new(call),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(symbol: &str, price: f64, change: f64) -> AssetSnapshot {
        AssetSnapshot {
            symbol: symbol.to_string(),
            current_price: Some(price),
            price_change_percentage_24h: Some(change),
            ..AssetSnapshot::default()
        }
    }

    #[test]
    fn visibility_ratio_is_clamped() {
        assert_eq!(get_visibility_ratio(5.0, 0.0), 1.0);
        assert_eq!(get_visibility_ratio(10.0, 10.0), 1.0);
        assert_eq!(get_visibility_ratio(0.0, 10.0), 0.4);
        assert_eq!(get_visibility_ratio(-10.0, 10.0), 1.0);
    }

    #[test]
    fn renders_only_top_rows() {
        let assets = vec![
            snap("BTC", 65000.0, 3.0),
            snap("ETH", 3000.0, -30.0),
            snap("PEPE", 0.000012, 30.0),
        ];
        let table = render(&assets, &MacroContext::default(), 2);
        assert_eq!(table.row_iter().count(), 2);

        let text = table.to_string();
        assert!(text.contains("BTC"));
        assert!(text.contains("-30.00%"));
        assert!(text.contains("STRONG SELL"));
        assert!(!text.contains("PEPE"));
    }
}
