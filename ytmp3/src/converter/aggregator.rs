//! Weighted combination of stage-local progress into one job percentage.

use crate::{Error, Result};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Combines stage-local percentages using fixed stage weights.
///
/// Stage `i` maps its local `[0, 100]` onto `[offset_i, offset_i + weight_i]`
/// where `offset_i` is the sum of the preceding weights. The result never
/// decreases across calls.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weights: Vec<f64>,
    offsets: Vec<f64>,
    overall: f64,
}

impl ProgressAggregator {
    /// Weights must be non-empty, non-negative and sum to 100.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::validation("at least one stage weight is required"));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::validation(format!("invalid stage weights: {:?}", weights)));
        }
        let total: f64 = weights.iter().sum();
        if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::validation(format!(
                "stage weights must sum to 100, got {}",
                total
            )));
        }

        let offsets = weights
            .iter()
            .scan(0.0, |acc, w| {
                let offset = *acc;
                *acc += w;
                Some(offset)
            })
            .collect();

        Ok(Self {
            weights,
            offsets,
            overall: 0.0,
        })
    }

    /// Fold a stage-local percentage into the overall value and return it.
    ///
    /// Out-of-range stage indices leave the value unchanged.
    pub fn update(&mut self, stage: usize, local_percent: f64) -> f64 {
        let (Some(weight), Some(offset)) = (self.weights.get(stage), self.offsets.get(stage))
        else {
            return self.overall;
        };

        let local = if local_percent.is_nan() {
            0.0
        } else {
            local_percent.clamp(0.0, 100.0)
        };
        let candidate = (offset + local * weight / 100.0).min(100.0);
        if candidate > self.overall {
            self.overall = candidate;
        }
        self.overall
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn stage_count(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_weights() {
        assert!(ProgressAggregator::new(vec![]).is_err());
        assert!(ProgressAggregator::new(vec![50.0, 40.0]).is_err());
        assert!(ProgressAggregator::new(vec![150.0, -50.0]).is_err());
        assert!(ProgressAggregator::new(vec![f64::NAN, 100.0]).is_err());
    }

    #[test]
    fn test_acquisition_stays_within_first_half() {
        let mut agg = ProgressAggregator::new(vec![50.0, 50.0]).unwrap();
        assert_eq!(agg.update(0, 0.0), 0.0);
        assert_eq!(agg.update(0, 42.0), 21.0);
        assert_eq!(agg.update(0, 100.0), 50.0);
        assert_eq!(agg.update(0, 500.0), 50.0);
    }

    #[test]
    fn test_transcoding_never_below_half() {
        let mut agg = ProgressAggregator::new(vec![50.0, 50.0]).unwrap();
        agg.update(0, 100.0);
        assert_eq!(agg.update(1, 0.0), 50.0);
        assert_eq!(agg.update(1, 50.0), 75.0);
        assert!((agg.update(1, 99.9) - 99.95).abs() < 1e-9);
        assert_eq!(agg.update(1, 100.0), 100.0);
    }

    #[test]
    fn test_never_regresses() {
        let mut agg = ProgressAggregator::new(vec![50.0, 50.0]).unwrap();
        agg.update(1, 20.0);
        assert_eq!(agg.overall(), 60.0);
        // A late acquisition callback cannot pull the value back.
        assert_eq!(agg.update(0, 100.0), 60.0);
        assert_eq!(agg.update(1, f64::NAN), 60.0);
    }

    #[test]
    fn test_unknown_stage_is_ignored() {
        let mut agg = ProgressAggregator::new(vec![100.0]).unwrap();
        agg.update(0, 30.0);
        assert_eq!(agg.update(7, 90.0), 30.0);
        assert_eq!(agg.stage_count(), 1);
    }
}
