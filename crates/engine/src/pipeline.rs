//! Pipeline orchestration: fetch → features → labels → storage
//!
//! [`build_labeled_dataset`] is the pure part and does no I/O.
//! [`FeaturePipeline`] wires it to the Binance client and the database.

use anyhow::{Context, Result};
use chrono::Utc;
use persistence::repository::{CandleRepository, FeatureRepository};
use persistence::Database;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{lookback_window, BinanceClient};
use crate::config::PipelineConfig;
use crate::dataset::{attach_labels, clean_candles, validate_candles, LabelDistribution};
use crate::error::LabelResult;
use crate::features::{FeatureEngineer, FeatureSettings};
use crate::labeling::{label_parallel, BarrierParameters, LabelSeries, PriceSeries};
use crate::storage::{candle_record, labeled_record};
use crate::types::{Kline, LabeledRow};

/// Output of one labeling pass
#[derive(Debug, Clone, Serialize)]
pub struct LabeledDataset {
    /// Rows with a defined label, oldest first
    pub rows: Vec<LabeledRow>,
    /// Labels aligned with every feature row, including `Insufficient` ones
    pub labels: LabelSeries,
    pub distribution: LabelDistribution,
    pub candles: usize,
    pub feature_rows: usize,
}

/// Validate, clean, compute features and label a candle set
pub fn build_labeled_dataset(
    candles: Vec<Kline>,
    params: &BarrierParameters,
    settings: &FeatureSettings,
) -> LabelResult<LabeledDataset> {
    validate_candles(&candles)?;
    let candles = clean_candles(candles);
    let candle_count = candles.len();

    let rows = FeatureEngineer::new(settings.clone()).compute(&candles)?;
    let feature_rows = rows.len();
    info!(candles = candle_count, feature_rows, "Features computed");

    let series = PriceSeries::new(
        rows.iter().map(|r| r.open_time).collect(),
        rows.iter().map(|r| r.close).collect(),
    )?;

    info!(
        profit_take_pct = params.profit_take() * 100.0,
        stop_loss_pct = params.stop_loss() * 100.0,
        horizon = params.horizon(),
        "Applying triple barrier labels"
    );
    let labels = label_parallel(&series, params)?;
    let distribution = LabelDistribution::from_series(&labels);

    let rows = attach_labels(rows, &labels)?;
    info!(
        labeled = rows.len(),
        profit = distribution.profit,
        loss = distribution.loss,
        timeout = distribution.timeout,
        dropped = distribution.insufficient,
        "Labels attached"
    );
    if rows.is_empty() {
        warn!("No row has a full forward window; the labeled table is empty");
    }

    Ok(LabeledDataset {
        rows,
        labels,
        distribution,
        candles: candle_count,
        feature_rows,
    })
}

/// Runs the stages against Binance and the local database
pub struct FeaturePipeline<'a> {
    binance: &'a BinanceClient,
    db: &'a Database,
}

impl<'a> FeaturePipeline<'a> {
    pub fn new(binance: &'a BinanceClient, db: &'a Database) -> Self {
        Self { binance, db }
    }

    /// Fetch `config.years` of candles and upsert them; returns candles fetched
    pub async fn fetch_and_store(&self, config: &PipelineConfig) -> Result<usize> {
        let (start, end) = lookback_window(config.years, Utc::now());
        let klines = self
            .binance
            .get_klines_paginated(&config.symbol, &config.interval, start, end)
            .await?;

        if klines.is_empty() {
            anyhow::bail!(
                "Binance returned no candles for {} {}",
                config.symbol,
                config.interval
            );
        }

        let records: Vec<_> = klines
            .iter()
            .map(|k| candle_record(&config.symbol, &config.interval, k))
            .collect();
        CandleRepository::new(self.db.pool())
            .upsert_batch(&records)
            .await
            .context("storing candles")?;

        info!(
            symbol = %config.symbol,
            interval = %config.interval,
            candles = klines.len(),
            "Candles stored"
        );
        Ok(klines.len())
    }

    /// Label the stored candles and replace the market's labeled table
    pub async fn build_and_store(&self, config: &PipelineConfig) -> Result<LabeledDataset> {
        let records = CandleRepository::new(self.db.pool())
            .load(&config.symbol, &config.interval)
            .await
            .context("loading candles")?;
        if records.is_empty() {
            anyhow::bail!(
                "No stored candles for {} {}; run `fetch` first",
                config.symbol,
                config.interval
            );
        }
        info!(rows = records.len(), "Loaded raw candles");

        let candles = records
            .iter()
            .map(Kline::try_from)
            .collect::<Result<Vec<_>>>()?;

        let dataset = build_labeled_dataset(candles, &config.barriers, &config.features)
            .with_context(|| format!("labeling {} {}", config.symbol, config.interval))?;

        let records: Vec<_> = dataset
            .rows
            .iter()
            .map(|row| labeled_record(&config.symbol, &config.interval, row, &config.barriers))
            .collect();
        FeatureRepository::new(self.db.pool())
            .replace(&config.symbol, &config.interval, &records)
            .await
            .context("storing labeled features")?;

        Ok(dataset)
    }

    /// Fetch then build
    pub async fn run(&self, config: &PipelineConfig) -> Result<LabeledDataset> {
        self.fetch_and_store(config).await?;
        self.build_and_store(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::Label;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const HOUR_MS: i64 = 3_600_000;

    fn make_klines(prices: &[f64]) -> Vec<Kline> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let price = Decimal::from_str_exact(&format!("{:.2}", p)).unwrap();
                Kline {
                    open_time: (i as i64) * 4 * HOUR_MS,
                    open: price,
                    high: price + dec!(1),
                    low: price - dec!(1),
                    close: price,
                    volume: dec!(100),
                    close_time: ((i + 1) as i64) * 4 * HOUR_MS - 1,
                    quote_volume: price * dec!(100),
                    trades: 10,
                    taker_buy_base_volume: dec!(50),
                    taker_buy_quote_volume: price * dec!(50),
                }
            })
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 6.0 * ((i as f64) * 0.25).sin())
            .collect()
    }

    #[test]
    fn test_build_drops_warmup_and_tail() {
        let params = BarrierParameters::new(0.03, 0.02, 12).unwrap();
        let dataset =
            build_labeled_dataset(make_klines(&wave(200)), &params, &FeatureSettings::default())
                .unwrap();

        assert_eq!(dataset.candles, 200);
        assert_eq!(dataset.feature_rows, 151);
        assert_eq!(dataset.labels.len(), dataset.feature_rows);
        assert_eq!(dataset.distribution.insufficient, 12);
        assert_eq!(dataset.rows.len(), 151 - 12);
        assert!(dataset.rows.iter().all(|r| r.label.is_defined()));
        assert_eq!(
            dataset.labels.get(dataset.feature_rows - 1),
            Some(Label::Insufficient)
        );
    }

    #[test]
    fn test_build_sorts_shuffled_candles() {
        let params = BarrierParameters::default();
        let mut klines = make_klines(&wave(120));
        klines.reverse();
        let dataset =
            build_labeled_dataset(klines, &params, &FeatureSettings::default()).unwrap();
        assert!(dataset
            .rows
            .windows(2)
            .all(|w| w[0].features.open_time < w[1].features.open_time));
    }

    #[test]
    fn test_build_with_too_few_candles_fails() {
        let err = build_labeled_dataset(
            make_klines(&wave(20)),
            &BarrierParameters::default(),
            &FeatureSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err, crate::error::LabelError::EmptyInput);
    }

    #[tokio::test]
    async fn test_build_and_store_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let binance = BinanceClient::with_base_url("http://127.0.0.1:9").unwrap();
        let config = PipelineConfig::default();

        let records: Vec<_> = make_klines(&wave(150))
            .iter()
            .map(|k| candle_record(&config.symbol, &config.interval, k))
            .collect();
        CandleRepository::new(db.pool())
            .upsert_batch(&records)
            .await
            .unwrap();

        let pipeline = FeaturePipeline::new(&binance, &db);
        let dataset = pipeline.build_and_store(&config).await.unwrap();

        let stored = FeatureRepository::new(db.pool())
            .load(&config.symbol, &config.interval)
            .await
            .unwrap();
        assert_eq!(stored.len(), dataset.rows.len());
        let first = LabeledRow::try_from(&stored[0]).unwrap();
        assert_eq!(first.label, dataset.rows[0].label);
        assert_eq!(first.features.open_time, dataset.rows[0].features.open_time);
    }

    #[tokio::test]
    async fn test_build_without_candles_fails() {
        let db = Database::in_memory().await.unwrap();
        let binance = BinanceClient::with_base_url("http://127.0.0.1:9").unwrap();
        let err = FeaturePipeline::new(&binance, &db)
            .build_and_store(&PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fetch"));
    }
}
