//! Conversions between pipeline types and persistence records

use anyhow::{Context, Result};
use persistence::repository::{CandleRecord, LabeledFeatureRecord};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::labeling::{BarrierParameters, Label};
use crate::types::{FeatureRow, Kline, LabeledRow};

pub fn candle_record(symbol: &str, interval: &str, k: &Kline) -> CandleRecord {
    CandleRecord {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        open_time: k.open_time,
        open: k.open.to_string(),
        high: k.high.to_string(),
        low: k.low.to_string(),
        close: k.close.to_string(),
        volume: k.volume.to_string(),
        close_time: k.close_time,
        quote_volume: k.quote_volume.to_string(),
        trades: k.trades as i64,
        taker_buy_base_volume: k.taker_buy_base_volume.to_string(),
        taker_buy_quote_volume: k.taker_buy_quote_volume.to_string(),
    }
}

impl TryFrom<&CandleRecord> for Kline {
    type Error = anyhow::Error;

    fn try_from(r: &CandleRecord) -> Result<Self> {
        let dec = |field: &str, value: &str| {
            Decimal::from_str(value).with_context(|| {
                format!(
                    "stored {} {} candle {} has invalid {}: {:?}",
                    r.symbol, r.interval, r.open_time, field, value
                )
            })
        };
        Ok(Kline {
            open_time: r.open_time,
            open: dec("open", &r.open)?,
            high: dec("high", &r.high)?,
            low: dec("low", &r.low)?,
            close: dec("close", &r.close)?,
            volume: dec("volume", &r.volume)?,
            close_time: r.close_time,
            quote_volume: dec("quote_volume", &r.quote_volume)?,
            trades: u64::try_from(r.trades).context("negative trade count")?,
            taker_buy_base_volume: dec("taker_buy_base_volume", &r.taker_buy_base_volume)?,
            taker_buy_quote_volume: dec("taker_buy_quote_volume", &r.taker_buy_quote_volume)?,
        })
    }
}

pub fn labeled_record(
    symbol: &str,
    interval: &str,
    row: &LabeledRow,
    params: &BarrierParameters,
) -> LabeledFeatureRecord {
    let f = &row.features;
    LabeledFeatureRecord {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        open_time: f.open_time,
        open: f.open,
        high: f.high,
        low: f.low,
        close: f.close,
        volume: f.volume,
        vwap: f.vwap,
        rsi_14: f.rsi_14,
        macd_hist: f.macd_hist,
        atr_14: f.atr_14,
        bb_percent_b: f.bb_percent_b,
        sma_50: f.sma_50,
        ema_20: f.ema_20,
        hour: i64::from(f.hour),
        day_of_week: i64::from(f.day_of_week),
        label: i64::from(row.label_code),
        profit_take: params.profit_take(),
        stop_loss: params.stop_loss(),
        horizon: params.horizon() as i64,
    }
}

impl TryFrom<&LabeledFeatureRecord> for LabeledRow {
    type Error = anyhow::Error;

    fn try_from(r: &LabeledFeatureRecord) -> Result<Self> {
        let label = i8::try_from(r.label)
            .ok()
            .and_then(Label::from_code)
            .with_context(|| format!("row {} has invalid label {}", r.open_time, r.label))?;
        let label_code = label.code().context("stored label without a numeric code")?;
        Ok(LabeledRow {
            features: FeatureRow {
                open_time: r.open_time,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
                vwap: r.vwap,
                rsi_14: r.rsi_14,
                macd_hist: r.macd_hist,
                atr_14: r.atr_14,
                bb_percent_b: r.bb_percent_b,
                sma_50: r.sma_50,
                ema_20: r.ema_20,
                hour: u32::try_from(r.hour).context("negative hour")?,
                day_of_week: u32::try_from(r.day_of_week).context("negative day of week")?,
            },
            label,
            label_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_record_preserves_decimals() {
        let k = Kline {
            open_time: 1,
            open: dec!(0.01634790),
            high: dec!(0.80000000),
            low: dec!(0.01575800),
            close: dec!(0.01577100),
            volume: dec!(148976.11427815),
            close_time: 2,
            quote_volume: dec!(2434.19055334),
            trades: 308,
            taker_buy_base_volume: dec!(1756.87402397),
            taker_buy_quote_volume: dec!(28.46694368),
        };
        let record = candle_record("BTCUSDT", "4h", &k);
        assert_eq!(record.close, "0.01577100");
        assert_eq!(Kline::try_from(&record).unwrap(), k);
    }

    #[test]
    fn test_stored_candle_with_bad_decimal_fails() {
        let k = Kline {
            open_time: 1,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
            close_time: 2,
            quote_volume: dec!(1),
            trades: 1,
            taker_buy_base_volume: dec!(1),
            taker_buy_quote_volume: dec!(1),
        };
        let mut record = candle_record("BTCUSDT", "4h", &k);
        record.close = "abc".to_string();
        let err = Kline::try_from(&record).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn test_stored_label_outside_classes_fails() {
        let row = LabeledRow {
            features: FeatureRow {
                open_time: 7,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                vwap: 1.0,
                rsi_14: 50.0,
                macd_hist: 0.0,
                atr_14: 0.0,
                bb_percent_b: 0.5,
                sma_50: 1.0,
                ema_20: 1.0,
                hour: 4,
                day_of_week: 6,
            },
            label: Label::Loss,
            label_code: -1,
        };
        let mut record = labeled_record("BTCUSDT", "4h", &row, &BarrierParameters::default());
        assert_eq!(record.label, -1);
        assert_eq!(record.horizon, 12);
        assert_eq!(LabeledRow::try_from(&record).unwrap(), row);

        record.label = 5;
        assert!(LabeledRow::try_from(&record).is_err());
    }
}
