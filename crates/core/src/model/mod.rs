//! Statistical models applied by the conversion worker.
//!
//! Everything here is loaded once at startup and shared read-only between
//! threads behind an `Arc`.

pub mod delta;
pub mod f0;
pub mod gmm;
pub mod gv;
mod linalg;

pub use f0::{F0Stats, PitchMapper};
pub use gmm::{ConversionMode, CovarianceType, GmmParams, MixtureModel};
pub use gv::{GvPostfilter, GvStats};

use crate::error::{ModelError, StageError};
use ndarray::{s, Array2, ArrayView2};

/// The model bundle for one source/target speaker pair.
#[derive(Debug, Clone)]
pub struct ConversionModels {
    pitch: PitchMapper,
    spectral: MixtureModel,
    gv: GvPostfilter,
    mode: ConversionMode,
    alpha: f64,
}

impl ConversionModels {
    pub fn new(
        pitch: PitchMapper,
        spectral: MixtureModel,
        gv: GvPostfilter,
        mode: ConversionMode,
        alpha: f64,
    ) -> Result<Self, ModelError> {
        // GV covers the power column too; the mixture model does not.
        if gv.dim() != spectral.static_dim() + 1 {
            return Err(ModelError::Shape {
                what: "gv statistics",
                expected: spectral.static_dim() + 1,
                found: gv.dim(),
            });
        }
        if !(alpha.abs() < 1.0) {
            return Err(ModelError::InvalidStatistic(format!(
                "warping coefficient {alpha} outside (-1, 1)"
            )));
        }
        Ok(Self {
            pitch,
            spectral,
            gv,
            mode,
            alpha,
        })
    }

    pub fn pitch(&self) -> &PitchMapper {
        &self.pitch
    }

    pub fn spectral(&self) -> &MixtureModel {
        &self.spectral
    }

    pub fn gv(&self) -> &GvPostfilter {
        &self.gv
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Width of the cepstral matrices the bundle accepts, power column
    /// included.
    pub fn mcep_width(&self) -> usize {
        self.gv.dim()
    }

    /// Regresses columns `1..` of `mcep` through the mixture model and puts
    /// the original power column back in front.
    pub fn map_spectrum(&self, mcep: ArrayView2<f64>) -> Result<Array2<f64>, StageError> {
        if mcep.ncols() != self.mcep_width() {
            return Err(StageError::ShapeMismatch(format!(
                "expected {} cepstral columns, got {}",
                self.mcep_width(),
                mcep.ncols()
            )));
        }
        let source = delta::static_delta(mcep.slice(s![.., 1..]));
        let converted = self.spectral.convert(source.view(), self.mode)?;

        let mut out = Array2::<f64>::zeros(mcep.raw_dim());
        out.column_mut(0).assign(&mcep.column(0));
        out.slice_mut(s![.., 1..]).assign(&converted);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// A bundle over two cepstral columns (power + one) whose spectral map
    /// is `y = 2x + 1`, with identity pitch and morph 0.
    pub(crate) fn linear_models(mode: ConversionMode) -> ConversionModels {
        let cov = vec![
            1.0, 0.0, 2.0, 0.0, //
            0.0, 1.0, 0.0, 2.0, //
            2.0, 0.0, 4.01, 0.0, //
            0.0, 2.0, 0.0, 4.01,
        ];
        let params = GmmParams {
            weights: vec![1.0],
            means: vec![vec![0.0, 0.0, 1.0, 0.0]],
            covariances: vec![cov],
        };
        let stats = F0Stats::new(100.0_f64.ln(), 0.2).unwrap();
        ConversionModels::new(
            PitchMapper::new(stats, stats),
            MixtureModel::from_params(&params, CovarianceType::Full).unwrap(),
            GvPostfilter::new(
                GvStats::new(vec![1.0, 1.0], vec![0.0, 0.0]).unwrap(),
                GvStats::new(vec![1.0, 1.0], vec![0.0, 0.0]).unwrap(),
                0.0,
            )
            .unwrap(),
            mode,
            0.42,
        )
        .unwrap()
    }

    #[test]
    fn test_power_column_is_bit_identical() {
        let models = linear_models(ConversionMode::Mmse);
        let mcep = array![[-1.234_567_89, 0.5], [3.0e-7, -0.25], [17.5, 1.0]];
        let out = models.map_spectrum(mcep.view()).unwrap();
        for t in 0..mcep.nrows() {
            assert_eq!(out[[t, 0]].to_bits(), mcep[[t, 0]].to_bits());
        }
    }

    #[test]
    fn test_map_spectrum_converts_remaining_columns() {
        let models = linear_models(ConversionMode::Mmse);
        let mcep = array![[0.0, 0.5], [0.0, 0.5]];
        let out = models.map_spectrum(mcep.view()).unwrap();
        assert!((out[[0, 1]] - 2.0).abs() < 1e-9);
        assert!((out[[1, 1]] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let models = linear_models(ConversionMode::Mlpg);
        assert!(models.map_spectrum(array![[0.0, 1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_rejects_mismatched_gv() {
        let models = linear_models(ConversionMode::Mmse);
        let gv = GvPostfilter::new(
            GvStats::new(vec![1.0; 3], vec![0.0; 3]).unwrap(),
            GvStats::new(vec![1.0; 3], vec![0.0; 3]).unwrap(),
            1.0,
        )
        .unwrap();
        let result = ConversionModels::new(
            *models.pitch(),
            models.spectral().clone(),
            gv,
            ConversionMode::Mmse,
            0.42,
        );
        assert!(result.is_err());
    }
}
