//! Indicator features per candle
//!
//! Streams each candle through `ta` indicators and emits one [`FeatureRow`]
//! per candle once every indicator has warmed up. Rows with an undefined
//! feature (zero-volume VWAP window, zero-width Bollinger band) are dropped.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};
use tracing::debug;

use crate::error::{LabelError, LabelResult};
use crate::types::{FeatureRow, Kline};

/// Indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// 6 × 4h candles = 24h
    pub vwap_window: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub sma_period: usize,
    pub ema_period: usize,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            vwap_window: 6,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            bb_period: 20,
            bb_multiplier: 2.0,
            sma_period: 50,
            ema_period: 20,
        }
    }
}

impl FeatureSettings {
    /// Number of candles consumed before the first complete row
    pub fn warmup(&self) -> usize {
        [
            self.vwap_window,
            self.rsi_period + 1,
            self.macd_slow + self.macd_signal - 1,
            self.atr_period,
            self.bb_period,
            self.sma_period,
            self.ema_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

fn to_f64(value: Decimal, index: usize, field: &str) -> LabelResult<f64> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LabelError::malformed(index, format!("{field} {value} is not representable")))
}

fn ta_err(name: &'static str) -> impl Fn(ta::errors::TaError) -> LabelError {
    move |e| LabelError::invalid(name, format!("{e:?}"))
}

struct RollingVwap {
    window: usize,
    values: VecDeque<(f64, f64)>,
    pv_sum: f64,
    vol_sum: f64,
}

impl RollingVwap {
    fn new(window: usize) -> Self {
        Self {
            window,
            values: VecDeque::with_capacity(window + 1),
            pv_sum: 0.0,
            vol_sum: 0.0,
        }
    }

    fn next(&mut self, typical_price: f64, volume: f64) -> Option<f64> {
        let pv = typical_price * volume;
        self.values.push_back((pv, volume));
        self.pv_sum += pv;
        self.vol_sum += volume;
        if self.values.len() > self.window {
            if let Some((old_pv, old_vol)) = self.values.pop_front() {
                self.pv_sum -= old_pv;
                self.vol_sum -= old_vol;
            }
        }
        if self.values.len() < self.window || self.vol_sum <= 0.0 {
            return None;
        }
        Some(self.pv_sum / self.vol_sum)
    }
}

/// Computes indicator features over a candle sequence
pub struct FeatureEngineer {
    settings: FeatureSettings,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(FeatureSettings::default())
    }
}

impl FeatureEngineer {
    pub fn new(settings: FeatureSettings) -> Self {
        Self { settings }
    }

    /// Compute feature rows for time-ordered candles
    pub fn compute(&self, klines: &[Kline]) -> LabelResult<Vec<FeatureRow>> {
        let s = &self.settings;
        let mut rsi = RelativeStrengthIndex::new(s.rsi_period).map_err(ta_err("rsi_period"))?;
        let mut macd = MovingAverageConvergenceDivergence::new(s.macd_fast, s.macd_slow, s.macd_signal)
            .map_err(ta_err("macd"))?;
        let mut atr = AverageTrueRange::new(s.atr_period).map_err(ta_err("atr_period"))?;
        let mut bb =
            BollingerBands::new(s.bb_period, s.bb_multiplier).map_err(ta_err("bb_period"))?;
        let mut sma = SimpleMovingAverage::new(s.sma_period).map_err(ta_err("sma_period"))?;
        let mut ema = ExponentialMovingAverage::new(s.ema_period).map_err(ta_err("ema_period"))?;
        if s.vwap_window == 0 {
            return Err(LabelError::invalid("vwap_window", 0));
        }
        let mut vwap = RollingVwap::new(s.vwap_window);

        let warmup = s.warmup();
        let mut rows = Vec::with_capacity(klines.len().saturating_sub(warmup - 1));
        let mut undefined = 0usize;

        for (i, kline) in klines.iter().enumerate() {
            let open = to_f64(kline.open, i, "open")?;
            let high = to_f64(kline.high, i, "high")?;
            let low = to_f64(kline.low, i, "low")?;
            let close = to_f64(kline.close, i, "close")?;
            let volume = to_f64(kline.volume, i, "volume")?;

            let bar = DataItem::builder()
                .open(open)
                .high(high)
                .low(low)
                .close(close)
                .volume(volume)
                .build()
                .map_err(|e| LabelError::malformed(i, format!("inconsistent candle: {e:?}")))?;

            let rsi_v = rsi.next(close);
            let macd_v = macd.next(close);
            let atr_v = atr.next(&bar);
            let bb_v = bb.next(close);
            let sma_v = sma.next(close);
            let ema_v = ema.next(close);
            let vwap_v = vwap.next((high + low + close) / 3.0, volume);

            if i + 1 < warmup {
                continue;
            }

            let band = bb_v.upper - bb_v.lower;
            let (Some(vwap_v), true) = (vwap_v, band > 0.0) else {
                undefined += 1;
                continue;
            };

            let opened = DateTime::<Utc>::from_timestamp_millis(kline.open_time).ok_or_else(|| {
                LabelError::malformed(i, format!("open time {} out of range", kline.open_time))
            })?;

            rows.push(FeatureRow {
                open_time: kline.open_time,
                open,
                high,
                low,
                close,
                volume,
                vwap: vwap_v,
                rsi_14: rsi_v,
                macd_hist: macd_v.histogram,
                atr_14: atr_v,
                bb_percent_b: (close - bb_v.lower) / band,
                sma_50: sma_v,
                ema_20: ema_v,
                hour: opened.hour(),
                day_of_week: opened.weekday().num_days_from_monday(),
            });
        }

        debug!(
            candles = klines.len(),
            rows = rows.len(),
            warmup,
            undefined,
            "Computed features"
        );
        Ok(rows)
    }
}
