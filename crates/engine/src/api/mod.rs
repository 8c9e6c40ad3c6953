//! Exchange API clients

pub mod binance;

pub use binance::{lookback_window, BinanceClient};
