//! Labeled feature table repository

use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

/// One labeled training row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LabeledFeatureRecord {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    pub rsi_14: f64,
    pub macd_hist: f64,
    pub atr_14: f64,
    pub bb_percent_b: f64,
    pub sma_50: f64,
    pub ema_20: f64,
    pub hour: i64,
    pub day_of_week: i64,
    /// +1 profit, -1 loss, 0 timeout
    pub label: i64,
    pub profit_take: f64,
    pub stop_loss: f64,
    pub horizon: i64,
}

/// Row counts per label value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub profit: i64,
    pub loss: i64,
    pub timeout: i64,
}

impl LabelCounts {
    pub fn total(&self) -> i64 {
        self.profit + self.loss + self.timeout
    }
}

/// Repository for the labeled feature table
pub struct FeatureRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FeatureRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace every row of one market with `records`, atomically.
    ///
    /// On error the transaction is rolled back and the previous table stays intact.
    pub async fn replace(
        &self,
        symbol: &str,
        interval: &str,
        records: &[LabeledFeatureRecord],
    ) -> DbResult<u64> {
        if let Some(r) = records
            .iter()
            .find(|r| r.symbol != symbol || r.interval != interval)
        {
            return Err(DbError::Query(format!(
                "record for {} {} in replace of {} {}",
                r.symbol, r.interval, symbol, interval
            )));
        }

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM labeled_features WHERE symbol = ? AND interval = ?")
            .bind(symbol)
            .bind(interval)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut written = 0;
        for r in records {
            let result = sqlx::query(
                r#"
                INSERT INTO labeled_features (
                    symbol, interval, open_time, open, high, low, close, volume,
                    vwap, rsi_14, macd_hist, atr_14, bb_percent_b, sma_50, ema_20,
                    hour, day_of_week, label, profit_take, stop_loss, horizon
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.symbol)
            .bind(&r.interval)
            .bind(r.open_time)
            .bind(r.open)
            .bind(r.high)
            .bind(r.low)
            .bind(r.close)
            .bind(r.volume)
            .bind(r.vwap)
            .bind(r.rsi_14)
            .bind(r.macd_hist)
            .bind(r.atr_14)
            .bind(r.bb_percent_b)
            .bind(r.sma_50)
            .bind(r.ema_20)
            .bind(r.hour)
            .bind(r.day_of_week)
            .bind(r.label)
            .bind(r.profit_take)
            .bind(r.stop_loss)
            .bind(r.horizon)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!(symbol, interval, deleted, written, "Replaced labeled features");
        Ok(written)
    }

    /// All labeled rows of one market, oldest first
    pub async fn load(&self, symbol: &str, interval: &str) -> DbResult<Vec<LabeledFeatureRecord>> {
        let records = sqlx::query_as::<_, LabeledFeatureRecord>(
            r#"
            SELECT symbol, interval, open_time, open, high, low, close, volume,
                   vwap, rsi_14, macd_hist, atr_14, bb_percent_b, sma_50, ema_20,
                   hour, day_of_week, label, profit_take, stop_loss, horizon
            FROM labeled_features
            WHERE symbol = ? AND interval = ?
            ORDER BY open_time ASC
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn label_counts(&self, symbol: &str, interval: &str) -> DbResult<LabelCounts> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT label, COUNT(*)
            FROM labeled_features
            WHERE symbol = ? AND interval = ?
            GROUP BY label
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .fetch_all(self.pool)
        .await?;

        let mut counts = LabelCounts::default();
        for (label, count) in rows {
            match label {
                1 => counts.profit = count,
                -1 => counts.loss = count,
                0 => counts.timeout = count,
                other => return Err(DbError::Query(format!("unexpected label value {other}"))),
            }
        }
        Ok(counts)
    }
}
