//! Dataset assembly: raw candle checks, label merge and train/test split
//!
//! These are caller-side policies around the labeler. The labeler keeps every
//! position; dropping `Insufficient` rows happens here.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LabelError, LabelResult};
use crate::labeling::{Label, LabelSeries};
use crate::types::{FeatureRow, Kline, LabeledRow};

/// Reject an empty candle set or a candle without a positive close
pub fn validate_candles(klines: &[Kline]) -> LabelResult<()> {
    if klines.is_empty() {
        return Err(LabelError::EmptyInput);
    }
    if let Some((i, k)) = klines
        .iter()
        .enumerate()
        .find(|(_, k)| k.close <= Decimal::ZERO)
    {
        return Err(LabelError::malformed(
            i,
            format!("non-positive close {} at open time {}", k.close, k.open_time),
        ));
    }
    Ok(())
}

/// Sort by open time and drop repeated open times (first occurrence wins)
pub fn clean_candles(mut klines: Vec<Kline>) -> Vec<Kline> {
    klines.sort_by_key(|k| k.open_time);
    klines.dedup_by_key(|k| k.open_time);
    klines
}

/// Merge labels onto their feature rows, dropping rows without a full forward window
pub fn attach_labels(rows: Vec<FeatureRow>, labels: &LabelSeries) -> LabelResult<Vec<LabeledRow>> {
    if rows.len() != labels.len() {
        return Err(LabelError::malformed(
            rows.len().min(labels.len()),
            format!("{} feature rows for {} labels", rows.len(), labels.len()),
        ));
    }
    Ok(rows
        .into_iter()
        .zip(labels.iter())
        .filter_map(|(features, label)| {
            label.code().map(|label_code| LabeledRow {
                features,
                label,
                label_code,
            })
        })
        .collect())
}

/// Per-class counts of a label set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub profit: usize,
    pub loss: usize,
    pub timeout: usize,
    pub insufficient: usize,
}

impl LabelDistribution {
    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut dist = Self::default();
        for label in labels {
            match label {
                Label::Profit => dist.profit += 1,
                Label::Loss => dist.loss += 1,
                Label::Timeout => dist.timeout += 1,
                Label::Insufficient => dist.insufficient += 1,
            }
        }
        dist
    }

    pub fn from_series(labels: &LabelSeries) -> Self {
        Self::from_labels(labels.iter())
    }

    pub fn from_rows(rows: &[LabeledRow]) -> Self {
        Self::from_labels(rows.iter().map(|r| r.label))
    }

    pub fn defined(&self) -> usize {
        self.profit + self.loss + self.timeout
    }

    /// Share of each defined class keyed by numeric code
    pub fn fractions(&self) -> BTreeMap<i8, f64> {
        let total = self.defined();
        let mut out = BTreeMap::new();
        if total == 0 {
            return out;
        }
        for (code, count) in [(-1, self.loss), (0, self.timeout), (1, self.profit)] {
            out.insert(code, count as f64 / total as f64);
        }
        out
    }
}

/// Unshuffled split: the last `floor(n * test_fraction)` rows form the test set
pub fn chronological_split<T: Clone>(rows: &[T], test_fraction: f64) -> LabelResult<(Vec<T>, Vec<T>)> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(LabelError::invalid("test_fraction", test_fraction));
    }
    let test_len = (rows.len() as f64 * test_fraction).floor() as usize;
    let (train, test) = rows.split_at(rows.len() - test_len);
    Ok((train.to_vec(), test.to_vec()))
}
