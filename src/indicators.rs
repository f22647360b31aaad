//! Heuristic indicators derived from a single 24h sample.
//!
//! None of these are real time-series indicators. Each one mimics the shape of its
//! namesake using only the 24h change, volume and high/low range of one snapshot, so
//! every function here is a pure piecewise mapping with local zero guards.

use crate::macro_context::MacroContext;
use crate::market::AssetSnapshot;
use std::collections::BTreeMap;
use std::fmt;

/// Dominance assumed for the alt-risk ratio when the macro source is unavailable.
pub const FALLBACK_BTC_DOMINANCE: f64 = 57.0;

/// Volume/market-cap turnover (percent) above which order flow counts as directional.
pub const ORDER_FLOW_TURNOVER_PCT: f64 = 2.0;

pub const EMA_WEIGHTS: [(u32, f64); 3] = [(20, 0.3), (50, 0.5), (200, 0.8)];

pub const RESISTANCE_CONFIDENCE: u8 = 75;
pub const SUPPORT_CONFIDENCE: u8 = 75;
pub const PIVOT_CONFIDENCE: u8 = 60;

// --- Result types ---

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Number(f64),
    Category(String),
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorValue::Number(v) => write!(f, "{:.2}", v),
            IndicatorValue::Category(c) => f.write_str(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorReading {
    pub value: IndicatorValue,
    pub aux: BTreeMap<&'static str, f64>,
    pub interpretation: String,
}

impl IndicatorReading {
    fn number(value: f64, interpretation: impl Into<String>) -> Self {
        Self {
            value: IndicatorValue::Number(value),
            aux: BTreeMap::new(),
            interpretation: interpretation.into(),
        }
    }

    fn category(value: impl Into<String>, interpretation: impl Into<String>) -> Self {
        Self {
            value: IndicatorValue::Category(value.into()),
            aux: BTreeMap::new(),
            interpretation: interpretation.into(),
        }
    }

    fn with(mut self, key: &'static str, value: f64) -> Self {
        self.aux.insert(key, value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFlow {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for OrderFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderFlow::Positive => "POSITIVE",
            OrderFlow::Negative => "NEGATIVE",
            OrderFlow::Neutral => "NEUTRAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendStrength {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
}

impl Macd {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaLevel {
    pub period: u32,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub confidence: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyLevels {
    pub resistance: Level,
    pub support: Level,
    pub pivot: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Watch,
    Hold,
    Sell,
    StrongSell,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recommendation::StrongBuy => "STRONG BUY",
            Recommendation::Buy => "BUY",
            Recommendation::Watch => "WATCH",
            Recommendation::Hold => "HOLD",
            Recommendation::Sell => "SELL",
            Recommendation::StrongSell => "STRONG SELL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confluence {
    pub change_1h: f64,
    pub change_4h: f64,
    pub score: u8,
    pub recommendation: Recommendation,
}

// --- Pure mappings ---

/// `(high - low) / price * 100`, 0 for a non-positive price.
pub fn range_volatility(high: f64, low: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    ((high - low) / price * 100.0).max(0.0)
}

/// OBV proxy: the day's volume carrying the sign of the day's change.
pub fn signed_volume(volume: f64, change: f64) -> f64 {
    if change > 0.0 {
        volume
    } else if change < 0.0 {
        -volume
    } else {
        0.0
    }
}

/// CVD proxy: directional only when turnover exceeds [`ORDER_FLOW_TURNOVER_PCT`].
pub fn order_flow(volume: f64, market_cap: f64, change: f64) -> OrderFlow {
    if market_cap <= 0.0 {
        return OrderFlow::Neutral;
    }
    let turnover = volume / market_cap * 100.0;
    if turnover <= ORDER_FLOW_TURNOVER_PCT {
        OrderFlow::Neutral
    } else if change > 0.0 {
        OrderFlow::Positive
    } else if change < 0.0 {
        OrderFlow::Negative
    } else {
        OrderFlow::Neutral
    }
}

/// Bid/ask imbalance in percent, 0 for an empty book.
pub fn book_imbalance(bid_volume: f64, ask_volume: f64) -> f64 {
    let total = bid_volume + ask_volume;
    if total <= 0.0 {
        return 0.0;
    }
    (bid_volume - ask_volume) / total * 100.0
}

/// ADX proxy. The directional pair always sums to 100.
pub fn trend_strength(change: f64) -> TrendStrength {
    let abs = change.abs();
    let (adx, dominant) = if abs > 10.0 {
        (40.0, 80.0)
    } else if abs > 5.0 {
        (30.0, 70.0)
    } else if abs > 2.0 {
        (22.0, 60.0)
    } else {
        (15.0, 50.0)
    };
    let (plus_di, minus_di) = if change < 0.0 {
        (100.0 - dominant, dominant)
    } else {
        (dominant, 100.0 - dominant)
    };
    TrendStrength {
        adx,
        plus_di,
        minus_di,
    }
}

/// `(100 - d) / d`, with [`FALLBACK_BTC_DOMINANCE`] standing in for a missing or
/// non-positive dominance.
pub fn alt_risk_ratio(btc_dominance: Option<f64>) -> f64 {
    let dominance = btc_dominance
        .filter(|d| *d > 0.0)
        .unwrap_or(FALLBACK_BTC_DOMINANCE);
    (100.0 - dominance) / dominance
}

pub fn approx_rsi(change: f64) -> f64 {
    let abs = change.abs();
    let (up, down) = if abs > 10.0 {
        (85.0, 15.0)
    } else if abs > 5.0 {
        (70.0, 30.0)
    } else if abs > 2.0 {
        (55.0, 45.0)
    } else {
        return 50.0;
    };
    if change > 0.0 { up } else { down }
}

pub fn approx_macd(change: f64) -> Macd {
    if change > 2.0 {
        Macd {
            macd: 1.5,
            signal: 1.0,
        }
    } else if change < -2.0 {
        Macd {
            macd: -1.5,
            signal: -1.0,
        }
    } else {
        Macd {
            macd: 0.1,
            signal: 0.1,
        }
    }
}

/// Linear back-extrapolation of the 24h change, labelled by EMA period.
pub fn approx_ema_levels(price: f64, change: f64) -> [EmaLevel; 3] {
    EMA_WEIGHTS.map(|(period, weight)| EmaLevel {
        period,
        level: price * (1.0 - change / 100.0 * weight),
    })
}

pub fn key_levels(high: f64, low: f64) -> KeyLevels {
    KeyLevels {
        resistance: Level {
            price: high,
            confidence: RESISTANCE_CONFIDENCE,
        },
        support: Level {
            price: low,
            confidence: SUPPORT_CONFIDENCE,
        },
        pivot: Level {
            price: (high + low) / 2.0,
            confidence: PIVOT_CONFIDENCE,
        },
    }
}

fn score_24h(abs: f64) -> u8 {
    if abs > 10.0 {
        40
    } else if abs > 5.0 {
        30
    } else if abs > 2.0 {
        20
    } else {
        10
    }
}

fn score_4h(abs: f64) -> u8 {
    if abs > 2.0 {
        30
    } else if abs > 1.0 {
        20
    } else if abs > 0.5 {
        10
    } else {
        0
    }
}

fn score_1h(abs: f64) -> u8 {
    if abs > 1.0 {
        20
    } else if abs > 0.5 {
        10
    } else if abs > 0.2 {
        5
    } else {
        0
    }
}

/// Scores the 24h change against 4h (`/6`) and 1h (`/24`) fractions of itself.
/// The score lies in `[0, 90]`.
pub fn confluence(change: f64) -> Confluence {
    let change_4h = change / 6.0;
    let change_1h = change / 24.0;
    let score = score_24h(change.abs()) + score_4h(change_4h.abs()) + score_1h(change_1h.abs());

    let recommendation = match score {
        80.. if change > 0.0 => Recommendation::StrongBuy,
        80.. if change < 0.0 => Recommendation::StrongSell,
        60.. if change > 0.0 => Recommendation::Buy,
        60.. if change < 0.0 => Recommendation::Sell,
        40.. => Recommendation::Watch,
        _ => Recommendation::Hold,
    };

    Confluence {
        change_1h,
        change_4h,
        score,
        recommendation,
    }
}

// --- Assembled set ---

/// Named readings for one asset, in a stable order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorSet {
    pub readings: BTreeMap<&'static str, IndicatorReading>,
}

impl IndicatorSet {
    pub fn derive(asset: &AssetSnapshot, context: &MacroContext) -> Self {
        let price = asset.price();
        let change = asset.change_24h();
        let (high, low) = (asset.high(), asset.low());
        let mut readings = BTreeMap::new();

        let volatility = range_volatility(high, low, price);
        let volatility_note = if volatility > 10.0 {
            "High volatility"
        } else if volatility > 5.0 {
            "Moderate volatility"
        } else {
            "Low volatility"
        };
        readings.insert(
            "ATR",
            IndicatorReading::number(volatility, volatility_note).with("range", high - low),
        );

        let obv = signed_volume(asset.volume(), change);
        let obv_note = if obv > 0.0 {
            "Volume backing the advance"
        } else if obv < 0.0 {
            "Volume backing the decline"
        } else {
            "No directional volume"
        };
        readings.insert("OBV", IndicatorReading::number(obv, obv_note));

        let flow = order_flow(asset.volume(), asset.market_cap(), change);
        let flow_note = match flow {
            OrderFlow::Positive => "Heavy turnover with buyers in control",
            OrderFlow::Negative => "Heavy turnover with sellers in control",
            OrderFlow::Neutral => "Turnover too light to read",
        };
        readings.insert(
            "CVD",
            IndicatorReading::category(flow.to_string(), flow_note),
        );

        let trend = trend_strength(change);
        let trend_note = if trend.adx >= 40.0 {
            "Very strong trend"
        } else if trend.adx >= 30.0 {
            "Strong trend"
        } else if trend.adx >= 22.0 {
            "Developing trend"
        } else {
            "Weak or no trend"
        };
        readings.insert(
            "ADX",
            IndicatorReading::number(trend.adx, trend_note)
                .with("+DI", trend.plus_di)
                .with("-DI", trend.minus_di),
        );

        let rsi = approx_rsi(change);
        let rsi_note = if rsi >= 70.0 {
            "Overbought"
        } else if rsi <= 30.0 {
            "Oversold"
        } else {
            "Neutral"
        };
        readings.insert("RSI", IndicatorReading::number(rsi, rsi_note));

        let macd = approx_macd(change);
        let macd_note = if macd.histogram() > 0.0 {
            "Bullish crossover"
        } else if macd.histogram() < 0.0 {
            "Bearish crossover"
        } else {
            "Flat"
        };
        readings.insert(
            "MACD",
            IndicatorReading::number(macd.macd, macd_note)
                .with("signal", macd.signal)
                .with("histogram", macd.histogram()),
        );

        let emas = approx_ema_levels(price, change);
        let above = emas.iter().filter(|e| price > e.level).count();
        let ema_note = match above {
            3 => "Price above all EMAs",
            0 => "Price below all EMAs",
            _ => "Price between EMAs",
        };
        let mut ema_reading = IndicatorReading::number(emas[0].level, ema_note);
        for ema in emas {
            let key = match ema.period {
                20 => "EMA20",
                50 => "EMA50",
                _ => "EMA200",
            };
            ema_reading = ema_reading.with(key, ema.level);
        }
        readings.insert("EMA", ema_reading);

        let levels = key_levels(high, low);
        readings.insert(
            "LEVELS",
            IndicatorReading::number(levels.pivot.price, "Pivot between 24h support and resistance")
                .with("resistance", levels.resistance.price)
                .with("support", levels.support.price)
                .with("pivot_confidence", levels.pivot.confidence as f64)
                .with("resistance_confidence", levels.resistance.confidence as f64)
                .with("support_confidence", levels.support.confidence as f64),
        );

        let conf = confluence(change);
        readings.insert(
            "CONFLUENCE",
            IndicatorReading::number(conf.score as f64, conf.recommendation.to_string())
                .with("1h", conf.change_1h)
                .with("4h", conf.change_4h),
        );

        let alt_risk = alt_risk_ratio(context.btc_dominance);
        let alt_note = if alt_risk > 1.0 {
            "Altcoins hold more of the market than BTC"
        } else {
            "BTC dominant, altcoin risk elevated"
        };
        readings.insert("ALT_RISK", IndicatorReading::number(alt_risk, alt_note));

        Self { readings }
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorReading> {
        self.readings.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)?.value {
            IndicatorValue::Number(v) => Some(v),
            IndicatorValue::Category(_) => None,
        }
    }
}
