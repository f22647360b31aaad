use regex::Regex;
use std::sync::LazyLock;

/// Below this price six decimals are shown instead of two.
pub const MICRO_PRICE: f64 = 0.01;

pub const UNAVAILABLE: &str = "N/A";

static MARKDOWN_SPECIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([_*`\[])").expect("static pattern is valid")
});

/// `$0.003421` below one cent, `$65000.12` otherwise.
pub fn format_price(price: f64) -> String {
    if price < MICRO_PRICE {
        format!("${:.6}", price)
    } else {
        format!("${:.2}", price)
    }
}

/// Always signed: `+3.21`, `-7.50`, `+0.00`.
pub fn format_signed(value: f64) -> String {
    // -0.0 would otherwise print as "-0.00"
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:+.2}", value)
}

pub fn format_change_pct(change: f64) -> String {
    format!("{}%", format_signed(change))
}

/// Escapes the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    MARKDOWN_SPECIALS.replace_all(text, r"\$1").into_owned()
}

pub fn or_unavailable<T, F>(value: Option<T>, render: F) -> String
where
    F: FnOnce(T) -> String,
{
    value.map(render).unwrap_or_else(|| UNAVAILABLE.to_string())
}
