//! Database schema definitions

/// SQL to create all tables
/// NOTE: Candle prices/volumes stored as TEXT to preserve rust_decimal::Decimal precision
pub const CREATE_TABLES: &str = r#"
-- Raw exchange candles
CREATE TABLE IF NOT EXISTS candles (
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    open_time INTEGER NOT NULL,
    open TEXT NOT NULL,
    high TEXT NOT NULL,
    low TEXT NOT NULL,
    close TEXT NOT NULL,
    volume TEXT NOT NULL,
    close_time INTEGER NOT NULL,
    quote_volume TEXT NOT NULL,
    trades INTEGER NOT NULL,
    taker_buy_base_volume TEXT NOT NULL,
    taker_buy_quote_volume TEXT NOT NULL,
    PRIMARY KEY (symbol, interval, open_time)
);

-- Labeled feature table consumed by model training
CREATE TABLE IF NOT EXISTS labeled_features (
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    open_time INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL,
    vwap REAL NOT NULL,
    rsi_14 REAL NOT NULL,
    macd_hist REAL NOT NULL,
    atr_14 REAL NOT NULL,
    bb_percent_b REAL NOT NULL,
    sma_50 REAL NOT NULL,
    ema_20 REAL NOT NULL,
    hour INTEGER NOT NULL,
    day_of_week INTEGER NOT NULL,
    label INTEGER NOT NULL CHECK (label IN (-1, 0, 1)),
    profit_take REAL NOT NULL,
    stop_loss REAL NOT NULL,
    horizon INTEGER NOT NULL,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (symbol, interval, open_time)
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_labeled_features_label ON labeled_features(symbol, interval, label)
"#;
