//! Run configuration passed explicitly into each pipeline entry point

use serde::{Deserialize, Serialize};

use crate::api::binance::DEFAULT_BASE_URL;
use crate::features::FeatureSettings;
use crate::labeling::BarrierParameters;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_INTERVAL: &str = "4h";
pub const DEFAULT_DB_PATH: &str = "data/features.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub symbol: String,
    /// Binance interval string, e.g. `4h`
    pub interval: String,
    /// Years of history to fetch
    pub years: u32,
    pub barriers: BarrierParameters,
    pub features: FeatureSettings,
    pub db_path: String,
    pub binance_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            interval: DEFAULT_INTERVAL.to_string(),
            years: 5,
            barriers: BarrierParameters::default(),
            features: FeatureSettings::default(),
            db_path: DEFAULT_DB_PATH.to_string(),
            binance_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}
