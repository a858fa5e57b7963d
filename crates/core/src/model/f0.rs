//! Pitch mapping by log-F0 mean/variance normalisation.

use crate::error::ModelError;
use ndarray::{Array1, ArrayView1};

/// Mean and standard deviation of log F0 over a speaker's voiced frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Stats {
    mean: f64,
    std: f64,
}

impl F0Stats {
    pub fn new(mean: f64, std: f64) -> Result<Self, ModelError> {
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(ModelError::InvalidStatistic(format!(
                "log-F0 stats need finite mean and positive std, got ({mean}, {std})"
            )));
        }
        Ok(Self { mean, std })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PitchMapper {
    source: F0Stats,
    target: F0Stats,
}

impl PitchMapper {
    pub fn new(source: F0Stats, target: F0Stats) -> Self {
        Self { source, target }
    }

    /// Maps voiced values into the target speaker's range; zero and negative
    /// (unvoiced) values stay zero.
    pub fn map(&self, f0: ArrayView1<f64>) -> Array1<f64> {
        let scale = self.target.std / self.source.std;
        f0.mapv(|value| {
            if value > 0.0 {
                (scale * (value.ln() - self.source.mean) + self.target.mean).exp()
            } else {
                0.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unvoiced_passes_through() {
        let mapper = PitchMapper::new(
            F0Stats::new(100.0_f64.ln(), 0.2).unwrap(),
            F0Stats::new(200.0_f64.ln(), 0.1).unwrap(),
        );
        let out = mapper.map(array![0.0, 0.0].view());
        assert_eq!(out, array![0.0, 0.0]);
    }

    #[test]
    fn test_mean_maps_to_mean() {
        let mapper = PitchMapper::new(
            F0Stats::new(100.0_f64.ln(), 0.2).unwrap(),
            F0Stats::new(200.0_f64.ln(), 0.1).unwrap(),
        );
        let out = mapper.map(array![100.0, 0.0, 100.0 * 0.2_f64.exp()].view());
        assert!((out[0] - 200.0).abs() < 1e-9);
        assert_eq!(out[1], 0.0);
        // One source std above the mean lands one target std above.
        assert!((out[2] - 200.0 * 0.1_f64.exp()).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_degenerate_stats() {
        assert!(F0Stats::new(5.0, 0.0).is_err());
        assert!(F0Stats::new(f64::NAN, 1.0).is_err());
    }
}
