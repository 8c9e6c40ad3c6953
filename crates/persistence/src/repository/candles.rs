//! Raw candle repository

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A stored exchange candle; decimal fields kept as their exchange strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CandleRecord {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: i64,
    pub quote_volume: String,
    pub trades: i64,
    pub taker_buy_base_volume: String,
    pub taker_buy_quote_volume: String,
}

/// Repository for raw candles
pub struct CandleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CandleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace candles in a single transaction; returns rows written
    pub async fn upsert_batch(&self, records: &[CandleRecord]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT OR REPLACE INTO candles (
                    symbol, interval, open_time, open, high, low, close, volume,
                    close_time, quote_volume, trades,
                    taker_buy_base_volume, taker_buy_quote_volume
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.symbol)
            .bind(&record.interval)
            .bind(record.open_time)
            .bind(&record.open)
            .bind(&record.high)
            .bind(&record.low)
            .bind(&record.close)
            .bind(&record.volume)
            .bind(record.close_time)
            .bind(&record.quote_volume)
            .bind(record.trades)
            .bind(&record.taker_buy_base_volume)
            .bind(&record.taker_buy_quote_volume)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// All candles for a market, oldest first
    pub async fn load(&self, symbol: &str, interval: &str) -> DbResult<Vec<CandleRecord>> {
        let records = sqlx::query_as::<_, CandleRecord>(
            r#"
            SELECT symbol, interval, open_time, open, high, low, close, volume,
                   close_time, quote_volume, trades,
                   taker_buy_base_volume, taker_buy_quote_volume
            FROM candles
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

    pub async fn count(&self, symbol: &str, interval: &str) -> DbResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM candles WHERE symbol = ? AND interval = ?")
                .bind(symbol)
                .bind(interval)
                .fetch_one(self.pool)
                .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(symbol: &str, open_time: i64, close: &str) -> CandleRecord {
        CandleRecord {
            symbol: symbol.to_string(),
            interval: "4h".to_string(),
            open_time,
            open: close.to_string(),
            high: close.to_string(),
            low: close.to_string(),
            close: close.to_string(),
            volume: "10.00000000".to_string(),
            close_time: open_time + 14_399_999,
            quote_volume: "1000".to_string(),
            trades: 42,
            taker_buy_base_volume: "5".to_string(),
            taker_buy_quote_volume: "500".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_load_ordered() {
        let db = Database::in_memory().await.unwrap();
        let repo = CandleRepository::new(db.pool());

        repo.upsert_batch(&[
            record("BTCUSDT", 200, "101.5"),
            record("BTCUSDT", 100, "100.25"),
            record("ETHUSDT", 100, "3000"),
        ])
        .await
        .unwrap();

        let loaded = repo.load("BTCUSDT", "4h").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].open_time, 100);
        assert_eq!(loaded[0].close, "100.25");
        assert_eq!(loaded[1], record("BTCUSDT", 200, "101.5"));
        assert_eq!(repo.count("ETHUSDT", "4h").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_candle() {
        let db = Database::in_memory().await.unwrap();
        let repo = CandleRepository::new(db.pool());

        repo.upsert_batch(&[record("BTCUSDT", 100, "1")]).await.unwrap();
        repo.upsert_batch(&[record("BTCUSDT", 100, "2")]).await.unwrap();

        let loaded = repo.load("BTCUSDT", "4h").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].close, "2");
    }
}
