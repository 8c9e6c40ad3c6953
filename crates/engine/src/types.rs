//! Types shared across the pipeline stages

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::labeling::Label;

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
    pub quote_volume: Decimal,
    pub trades: u64,
    pub taker_buy_base_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

/// Indicator features computed for one candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Rolling 6-bar volume-weighted typical price
    pub vwap: f64,
    pub rsi_14: f64,
    /// MACD(12, 26, 9) histogram
    pub macd_hist: f64,
    pub atr_14: f64,
    /// Position of close inside the 20-bar, 2σ Bollinger band (0 = lower, 1 = upper)
    pub bb_percent_b: f64,
    pub sma_50: f64,
    pub ema_20: f64,
    /// UTC hour of the candle open (0–23)
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
}

/// A feature row with a defined triple-barrier outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    #[serde(flatten)]
    pub features: FeatureRow,
    pub label: Label,
    /// Numeric class: +1 profit, -1 loss, 0 timeout
    pub label_code: i8,
}
