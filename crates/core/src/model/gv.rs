//! Global-variance postfilter.

use crate::error::{ModelError, StageError};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Per-dimension global-variance statistics: the mean and the variance of
/// the per-utterance variance of each cepstral dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct GvStats {
    mean: Array1<f64>,
    var: Array1<f64>,
}

impl GvStats {
    pub fn new(mean: Vec<f64>, var: Vec<f64>) -> Result<Self, ModelError> {
        if mean.len() != var.len() {
            return Err(ModelError::Shape {
                what: "gv variance row",
                expected: mean.len(),
                found: var.len(),
            });
        }
        if mean.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ModelError::InvalidStatistic(
                "gv means must be finite and non-negative".into(),
            ));
        }
        Ok(Self {
            mean: Array1::from(mean),
            var: Array1::from(var),
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn var(&self) -> &Array1<f64> {
        &self.var
    }
}

#[derive(Debug, Clone)]
pub struct GvPostfilter {
    target: GvStats,
    converted: GvStats,
    morph: f64,
}

impl GvPostfilter {
    /// First dimension the postfilter touches; column 0 is the power term.
    pub const START_DIM: usize = 1;

    /// `converted` holds GV statistics of converted training data and stands
    /// in for the variance of each incoming block.
    pub fn new(target: GvStats, converted: GvStats, morph: f64) -> Result<Self, ModelError> {
        if target.dim() != converted.dim() {
            return Err(ModelError::Shape {
                what: "converted gv stats",
                expected: target.dim(),
                found: converted.dim(),
            });
        }
        if let Some(d) = (Self::START_DIM..converted.dim()).find(|&d| converted.mean[d] <= 0.0) {
            return Err(ModelError::InvalidStatistic(format!(
                "converted gv mean of dimension {d} must be positive"
            )));
        }
        if !morph.is_finite() {
            return Err(ModelError::InvalidStatistic(format!("morph coefficient {morph}")));
        }
        Ok(Self {
            target,
            converted,
            morph,
        })
    }

    pub fn dim(&self) -> usize {
        self.target.dim()
    }

    /// Rescales every dimension from `START_DIM` on around its block mean so
    /// its variance moves toward the target GV, then blends with the input by
    /// the morph coefficient.
    pub fn apply(&self, mcep: ArrayView2<f64>) -> Result<Array2<f64>, StageError> {
        if mcep.ncols() != self.dim() {
            return Err(StageError::ShapeMismatch(format!(
                "gv postfilter expects {} columns, got {}",
                self.dim(),
                mcep.ncols()
            )));
        }
        let mut out = mcep.to_owned();
        if mcep.nrows() == 0 {
            return Ok(out);
        }
        let means = mcep.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.dim()));
        for d in Self::START_DIM..self.dim() {
            let gain = (self.target.mean[d] / self.converted.mean[d]).sqrt();
            let mean = means[d];
            for value in out.column_mut(d) {
                let filtered = gain * (*value - mean) + mean;
                *value = self.morph * filtered + (1.0 - self.morph) * *value;
            }
        }
        Ok(out)
    }
}
