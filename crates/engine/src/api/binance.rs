//! Binance public API client for historical klines (no authentication required)

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::Kline;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

/// Raw kline data from Binance API (array of arrays)
#[derive(Debug, Deserialize)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    #[allow(dead_code)] String, // 11: Ignore
);

impl TryFrom<RawKline> for Kline {
    type Error = anyhow::Error;

    fn try_from(raw: RawKline) -> Result<Self> {
        let dec = |field: &str, value: &str| {
            Decimal::from_str(value)
                .with_context(|| format!("kline {} has invalid {}: {:?}", raw.0, field, value))
        };
        Ok(Kline {
            open_time: raw.0,
            open: dec("open", &raw.1)?,
            high: dec("high", &raw.2)?,
            low: dec("low", &raw.3)?,
            close: dec("close", &raw.4)?,
            volume: dec("volume", &raw.5)?,
            close_time: raw.6,
            quote_volume: dec("quote volume", &raw.7)?,
            trades: raw.8,
            taker_buy_base_volume: dec("taker buy base volume", &raw.9)?,
            taker_buy_quote_volume: dec("taker buy quote volume", &raw.10)?,
        })
    }
}

/// `(start_ms, end_ms)` covering `years * 365` days up to `now`
pub fn lookback_window(years: u32, now: DateTime<Utc>) -> (i64, i64) {
    let start = now - Duration::days(365 * i64::from(years));
    (start.timestamp_millis(), now.timestamp_millis())
}

/// Where the next page should start, or `None` when the batch was the last one
pub(crate) fn next_page_start(batch: &[Kline], end_time: i64) -> Option<i64> {
    if batch.len() < MAX_KLINES_PER_REQUEST as usize {
        return None;
    }
    let next = batch.last()?.open_time + 1;
    (next < end_time).then_some(next)
}

impl BinanceClient {
    /// Create a new Binance client with default base URL
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch klines (candlestick data) for a symbol
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Kline>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.base_url, symbol, interval
        );

        if let Some(start) = start_time {
            url.push_str(&format!("&startTime={}", start));
        }
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }

        let limit = limit.unwrap_or(500).min(MAX_KLINES_PER_REQUEST);
        url.push_str(&format!("&limit={}", limit));

        debug!(symbol, interval, ?start_time, "Fetching klines from Binance");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_klines: Vec<RawKline> = response.json().await?;
        let klines = raw_klines
            .into_iter()
            .map(Kline::try_from)
            .collect::<Result<Vec<_>>>()?;

        debug!(count = klines.len(), "Fetched klines");
        Ok(klines)
    }

    /// Fetch klines with automatic pagination for ranges > 1000 bars
    pub async fn get_klines_paginated(
        &self,
        symbol: &str,
        interval: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Kline>> {
        let mut all_klines = Vec::new();
        let mut current_start = start_time;

        info!(
            symbol,
            interval,
            start = %DateTime::<Utc>::from_timestamp_millis(start_time).unwrap_or_default(),
            end = %DateTime::<Utc>::from_timestamp_millis(end_time).unwrap_or_default(),
            "Fetching paginated klines from Binance"
        );

        while current_start < end_time {
            let klines = self
                .get_klines(
                    symbol,
                    interval,
                    Some(current_start),
                    Some(end_time),
                    Some(MAX_KLINES_PER_REQUEST),
                )
                .await
                .with_context(|| format!("fetching {symbol} {interval} from {current_start}"))?;

            let next = next_page_start(&klines, end_time);
            all_klines.extend(klines);

            match next {
                Some(next) => current_start = next,
                None => break,
            }

            // Small delay to respect rate limits
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        info!(total = all_klines.len(), "Paginated kline fetch complete");
        Ok(all_klines)
    }
}
