//! Triple-barrier labeling
//!
//! Classifies every position of a price series by which barrier the forward
//! path touches first: the profit barrier at `entry * (1 + profit_take)`, the
//! loss barrier at `entry * (1 - stop_loss)`, or neither within `horizon`
//! steps. Positions without a full forward window are `Insufficient` and carry
//! no numeric code; filtering them is left to the caller.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LabelError, LabelResult};

/// Outcome of the forward scan for one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Profit,
    Loss,
    Timeout,
    Insufficient,
}

impl Label {
    /// Numeric class (+1 / -1 / 0), `None` for `Insufficient`
    pub fn code(self) -> Option<i8> {
        match self {
            Label::Profit => Some(1),
            Label::Loss => Some(-1),
            Label::Timeout => Some(0),
            Label::Insufficient => None,
        }
    }

    pub fn is_defined(self) -> bool {
        self != Label::Insufficient
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(Label::Profit),
            -1 => Some(Label::Loss),
            0 => Some(Label::Timeout),
            _ => None,
        }
    }
}

/// Barrier configuration, validated on construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarrierParameters {
    profit_take: f64,
    stop_loss: f64,
    horizon: usize,
}

impl BarrierParameters {
    pub fn new(profit_take: f64, stop_loss: f64, horizon: usize) -> LabelResult<Self> {
        if !profit_take.is_finite() || profit_take <= 0.0 {
            return Err(LabelError::invalid("profit_take", profit_take));
        }
        if !stop_loss.is_finite() || stop_loss <= 0.0 {
            return Err(LabelError::invalid("stop_loss", stop_loss));
        }
        if horizon < 1 {
            return Err(LabelError::invalid("horizon", horizon));
        }
        Ok(Self {
            profit_take,
            stop_loss,
            horizon,
        })
    }

    pub fn profit_take(&self) -> f64 {
        self.profit_take
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Upper and lower barrier levels for an entry price
    pub fn barriers(&self, entry: f64) -> (f64, f64) {
        (
            entry * (1.0 + self.profit_take),
            entry * (1.0 - self.stop_loss),
        )
    }
}

impl Default for BarrierParameters {
    /// +3% / -2% over 12 bars
    fn default() -> Self {
        Self {
            profit_take: 0.03,
            stop_loss: 0.02,
            horizon: 12,
        }
    }
}

/// Time-ordered closing prices
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    timestamps: Option<Vec<i64>>,
    prices: Vec<f64>,
}

impl PriceSeries {
    /// Series indexed by timestamp; timestamps must be strictly increasing
    pub fn new(timestamps: Vec<i64>, prices: Vec<f64>) -> LabelResult<Self> {
        if timestamps.len() != prices.len() {
            return Err(LabelError::malformed(
                timestamps.len().min(prices.len()),
                format!(
                    "{} timestamps for {} prices",
                    timestamps.len(),
                    prices.len()
                ),
            ));
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(LabelError::malformed(
                i + 1,
                format!(
                    "timestamp {} does not follow {}",
                    timestamps[i + 1],
                    timestamps[i]
                ),
            ));
        }
        Self::validate_prices(&prices)?;
        Ok(Self {
            timestamps: Some(timestamps),
            prices,
        })
    }

    /// Series indexed by position
    pub fn from_closes(prices: Vec<f64>) -> LabelResult<Self> {
        Self::validate_prices(&prices)?;
        Ok(Self {
            timestamps: None,
            prices,
        })
    }

    fn validate_prices(prices: &[f64]) -> LabelResult<()> {
        if prices.is_empty() {
            return Err(LabelError::EmptyInput);
        }
        if let Some((i, p)) = prices.iter().enumerate().find(|(_, p)| !p.is_finite()) {
            return Err(LabelError::malformed(i, format!("non-finite price {p}")));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn timestamps(&self) -> Option<&[i64]> {
        self.timestamps.as_deref()
    }
}

/// One label per input position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSeries {
    labels: Vec<Label>,
}

impl LabelSeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Label> {
        self.labels.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.iter().copied()
    }

    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    pub fn defined_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_defined()).count()
    }

    /// Numeric codes, `None` where the forward window was incomplete
    pub fn codes(&self) -> Vec<Option<i8>> {
        self.labels.iter().map(|l| l.code()).collect()
    }
}

impl From<Vec<Label>> for LabelSeries {
    fn from(labels: Vec<Label>) -> Self {
        Self { labels }
    }
}

/// Label a single position.
///
/// Within one forward step the loss barrier is checked before the profit
/// barrier, so a step that satisfies both resolves to `Loss`.
fn label_at(prices: &[f64], i: usize, params: &BarrierParameters) -> Label {
    let horizon = params.horizon;
    // `i < len`, so the subtraction cannot underflow
    if horizon >= prices.len() - i {
        return Label::Insufficient;
    }

    let (upper, lower) = params.barriers(prices[i]);
    for &price in &prices[i + 1..=i + horizon] {
        if price <= lower {
            return Label::Loss;
        }
        if price >= upper {
            return Label::Profit;
        }
    }
    Label::Timeout
}

/// Label every position of `prices`
pub fn label(prices: &PriceSeries, params: &BarrierParameters) -> LabelResult<LabelSeries> {
    let params = BarrierParameters::new(params.profit_take, params.stop_loss, params.horizon)?;
    let closes = prices.prices();
    let labels = (0..closes.len())
        .map(|i| label_at(closes, i, &params))
        .collect();
    Ok(LabelSeries { labels })
}

/// Same result as [`label`], with start indices spread across the rayon pool
pub fn label_parallel(
    prices: &PriceSeries,
    params: &BarrierParameters,
) -> LabelResult<LabelSeries> {
    let params = BarrierParameters::new(params.profit_take, params.stop_loss, params.horizon)?;
    let closes = prices.prices();
    let labels = (0..closes.len())
        .into_par_iter()
        .map(|i| label_at(closes, i, &params))
        .collect();
    Ok(LabelSeries { labels })
}

/// Convenience entry over a bare slice of closes
pub fn label_closes(closes: &[f64], params: &BarrierParameters) -> LabelResult<LabelSeries> {
    let series = PriceSeries::from_closes(closes.to_vec())?;
    label(&series, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pt: f64, sl: f64, horizon: usize) -> BarrierParameters {
        BarrierParameters::new(pt, sl, horizon).unwrap()
    }

    #[test]
    fn test_reference_scenario() {
        let labels = label_closes(&[100.0, 106.0, 95.0, 110.0, 90.0], &params(0.05, 0.05, 2))
            .unwrap();
        assert_eq!(labels.get(0), Some(Label::Profit));
        assert_eq!(labels.get(1), Some(Label::Loss));
        assert_eq!(labels.get(2), Some(Label::Profit));
        assert_eq!(labels.get(3), Some(Label::Insufficient));
        assert_eq!(labels.get(4), Some(Label::Insufficient));
        assert_eq!(labels.codes(), vec![Some(1), Some(-1), Some(1), None, None]);
    }

    #[test]
    fn test_output_aligned_with_input() {
        let p = params(0.03, 0.02, 12);
        for n in [1, 5, 12, 13, 40] {
            let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64).sin()).collect();
            let labels = label_closes(&closes, &p).unwrap();
            assert_eq!(labels.len(), n);
        }
    }

    #[test]
    fn test_profit_hit_before_loss() {
        // Rises through +10% at step 2, falls through -10% only at step 3
        let labels =
            label_closes(&[100.0, 104.0, 111.0, 85.0, 100.0], &params(0.1, 0.1, 3)).unwrap();
        assert_eq!(labels.get(0), Some(Label::Profit));
    }

    #[test]
    fn test_loss_hit_before_profit() {
        let labels =
            label_closes(&[100.0, 97.0, 89.0, 120.0, 100.0], &params(0.1, 0.1, 3)).unwrap();
        assert_eq!(labels.get(0), Some(Label::Loss));
    }

    #[test]
    fn test_flat_path_times_out() {
        let closes = [100.0, 100.5, 99.5, 100.2, 99.8, 100.1, 100.0];
        let labels = label_closes(&closes, &params(0.03, 0.02, 3)).unwrap();
        for i in 0..4 {
            assert_eq!(labels.get(i), Some(Label::Timeout), "index {i}");
        }
        assert_eq!(labels.count(Label::Timeout), 4);
    }

    #[test]
    fn test_tail_is_insufficient_not_timeout() {
        let closes: Vec<f64> = vec![100.0; 10];
        let labels = label_closes(&closes, &params(0.03, 0.02, 4)).unwrap();
        assert_eq!(labels.defined_count(), 6);
        for i in 6..10 {
            assert_eq!(labels.get(i), Some(Label::Insufficient));
            assert_eq!(labels.get(i).unwrap().code(), None);
        }
        assert_eq!(labels.count(Label::Timeout), 6);
    }

    #[test]
    fn test_partial_window_hit_is_still_insufficient() {
        // Index 1 would hit profit at the last price, but its window is short
        let labels = label_closes(&[100.0, 100.0, 200.0], &params(0.05, 0.05, 2)).unwrap();
        assert_eq!(labels.get(0), Some(Label::Profit));
        assert_eq!(labels.get(1), Some(Label::Insufficient));
    }

    #[test]
    fn test_horizon_longer_than_series() {
        let labels = label_closes(&[100.0, 200.0, 10.0], &params(0.05, 0.05, 5)).unwrap();
        assert!(labels.iter().all(|l| l == Label::Insufficient));
    }

    #[test]
    fn test_huge_horizon_is_insufficient_everywhere() {
        let labels =
            label_closes(&[100.0, 101.0, 102.0], &params(0.05, 0.05, usize::MAX)).unwrap();
        assert_eq!(labels.len(), 3);
        assert!(labels.iter().all(|l| l == Label::Insufficient));

        let series = PriceSeries::from_closes(vec![100.0, 101.0, 102.0]).unwrap();
        let parallel = label_parallel(&series, &params(0.05, 0.05, usize::MAX)).unwrap();
        assert_eq!(parallel, labels);
    }

    #[test]
    fn test_barrier_equality_counts_as_hit() {
        let p = params(0.5, 0.25, 1);
        let up = label_closes(&[100.0, 150.0], &p).unwrap();
        assert_eq!(up.get(0), Some(Label::Profit));
        let down = label_closes(&[100.0, 75.0], &p).unwrap();
        assert_eq!(down.get(0), Some(Label::Loss));
    }

    #[test]
    fn test_same_step_breach_resolves_to_loss() {
        // Zero entry collapses both barriers onto 0.0
        let labels = label_closes(&[0.0, 0.0], &params(0.05, 0.05, 1)).unwrap();
        assert_eq!(labels.get(0), Some(Label::Loss));

        // Negative entry inverts the barriers; -100 is both <= lower and >= upper
        let labels = label_closes(&[-100.0, -100.0], &params(0.05, 0.05, 1)).unwrap();
        assert_eq!(labels.get(0), Some(Label::Loss));
    }

    #[test]
    fn test_deterministic_and_parallel_match() {
        let closes: Vec<f64> = (0..500)
            .map(|i| 100.0 + 8.0 * ((i as f64) * 0.37).sin() + (i as f64) * 0.01)
            .collect();
        let series = PriceSeries::from_closes(closes).unwrap();
        let p = params(0.03, 0.02, 12);
        let first = label(&series, &p).unwrap();
        let second = label(&series, &p).unwrap();
        let parallel = label_parallel(&series, &p).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, parallel);
        assert!(first.count(Label::Profit) > 0);
        assert!(first.count(Label::Loss) > 0);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(matches!(
            BarrierParameters::new(0.0, 0.02, 12),
            Err(LabelError::InvalidParameter { name: "profit_take", .. })
        ));
        assert!(matches!(
            BarrierParameters::new(0.03, -0.01, 12),
            Err(LabelError::InvalidParameter { name: "stop_loss", .. })
        ));
        assert!(matches!(
            BarrierParameters::new(0.03, 0.02, 0),
            Err(LabelError::InvalidParameter { name: "horizon", .. })
        ));
        assert!(matches!(
            BarrierParameters::new(f64::NAN, 0.02, 12),
            Err(LabelError::InvalidParameter { name: "profit_take", .. })
        ));
        assert!(matches!(
            BarrierParameters::new(0.03, f64::INFINITY, 12),
            Err(LabelError::InvalidParameter { name: "stop_loss", .. })
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = label_closes(&[], &BarrierParameters::default()).unwrap_err();
        assert_eq!(err, LabelError::EmptyInput);
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let err = label_closes(&[100.0, f64::NAN, 101.0], &BarrierParameters::default())
            .unwrap_err();
        assert!(matches!(err, LabelError::MalformedSeries { index: 1, .. }));
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_non_monotonic_timestamps_rejected() {
        let err = PriceSeries::new(vec![0, 60_000, 60_000], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, LabelError::MalformedSeries { index: 2, .. }));

        let err = PriceSeries::new(vec![0, 60_000], vec![1.0]).unwrap_err();
        assert!(matches!(err, LabelError::MalformedSeries { .. }));

        let ok = PriceSeries::new(vec![0, 60_000, 120_000], vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ok.timestamps(), Some(&[0, 60_000, 120_000][..]));
    }

    #[test]
    fn test_label_codes_roundtrip() {
        for l in [Label::Profit, Label::Loss, Label::Timeout] {
            assert_eq!(Label::from_code(l.code().unwrap()), Some(l));
        }
        assert_eq!(Label::from_code(2), None);
    }
}
