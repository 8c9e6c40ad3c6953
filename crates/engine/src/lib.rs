//! Labeling engine — triple-barrier labels over exchange candles
//!
//! Provides:
//! - Triple-barrier labeler (sequential and rayon-parallel)
//! - Indicator feature computation over OHLCV candles
//! - Binance public API client for historical klines
//! - Dataset assembly and the fetch → label → store pipeline

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod labeling;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use api::{lookback_window, BinanceClient};
pub use config::PipelineConfig;
pub use dataset::{attach_labels, chronological_split, LabelDistribution};
pub use error::{LabelError, LabelResult};
pub use features::{FeatureEngineer, FeatureSettings};
pub use labeling::{
    label, label_closes, label_parallel, BarrierParameters, Label, LabelSeries, PriceSeries,
};
pub use pipeline::{build_labeled_dataset, FeaturePipeline, LabeledDataset};
pub use types::*;
