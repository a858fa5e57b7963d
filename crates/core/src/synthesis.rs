//! Waveform synthesis stage interface.

use crate::error::StageError;
use ndarray::{ArrayView1, ArrayView2};

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub sample_rate: u32,
    pub fftl: usize,
    pub shift_ms: f64,
    pub mcep_alpha: f64,
}

impl SynthesisConfig {
    pub fn shift_samples(&self) -> usize {
        (self.sample_rate as f64 * self.shift_ms / 1000.0).round() as usize
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if self.sample_rate == 0 || self.fftl < 4 || !self.fftl.is_power_of_two() {
            return Err(StageError::InvalidConfig(format!(
                "synthesis needs a positive rate and power-of-two fft, got {} Hz / {}",
                self.sample_rate, self.fftl
            )));
        }
        let shift = self.shift_samples();
        if shift == 0 || 2 * shift > self.fftl {
            return Err(StageError::InvalidConfig(format!(
                "frame shift of {shift} samples does not fit fft length {}",
                self.fftl
            )));
        }
        if !(self.mcep_alpha.abs() < 1.0) {
            return Err(StageError::InvalidConfig(format!(
                "warping coefficient {} outside (-1, 1)",
                self.mcep_alpha
            )));
        }
        Ok(())
    }
}

/// Everything needed to render one converted frame.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub f0: ArrayView1<'a, f64>,
    pub mcep: ArrayView2<'a, f64>,
    pub aperiodicity: ArrayView2<'a, f64>,
    /// Cepstrum whose per-frame energy the output should keep. `None`
    /// renders `mcep` as is.
    pub reference_mcep: Option<ArrayView2<'a, f64>>,
    /// Exact length of the rendered waveform.
    pub num_samples: usize,
}

impl SynthesisInput<'_> {
    pub fn validate(&self) -> Result<(), StageError> {
        let frames = self.mcep.nrows();
        if self.f0.len() != frames || self.aperiodicity.nrows() != frames {
            return Err(StageError::ShapeMismatch(format!(
                "f0 has {} frames, cepstrum {}, aperiodicity {}",
                self.f0.len(),
                frames,
                self.aperiodicity.nrows()
            )));
        }
        if let Some(reference) = self.reference_mcep {
            if reference.dim() != self.mcep.dim() {
                return Err(StageError::ShapeMismatch(format!(
                    "reference cepstrum is {:?}, converted is {:?}",
                    reference.dim(),
                    self.mcep.dim()
                )));
            }
        }
        Ok(())
    }
}

/// Renders a waveform (PCM scale, not yet clamped) from converted features.
pub trait WaveformSynthesizer: Send + 'static {
    fn synthesize(&mut self, input: &SynthesisInput<'_>) -> Result<Vec<f64>, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_shift_must_fit_fft() {
        let config = SynthesisConfig {
            sample_rate: 48000,
            fftl: 256,
            shift_ms: 5.0,
            mcep_alpha: 0.55,
        };
        assert_eq!(config.shift_samples(), 240);
        assert!(config.validate().is_err());
        let config = SynthesisConfig { fftl: 1024, ..config };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_input_frame_counts_must_agree() {
        let f0 = Array1::<f64>::zeros(3);
        let mcep = Array2::<f64>::zeros((3, 4));
        let ap = Array2::<f64>::zeros((2, 5));
        let input = SynthesisInput {
            f0: f0.view(),
            mcep: mcep.view(),
            aperiodicity: ap.view(),
            reference_mcep: None,
            num_samples: 100,
        };
        assert!(input.validate().is_err());
    }
}
