//! Repository implementations for database operations

pub mod candles;
pub mod features;

pub use candles::*;
pub use features::*;
