//! Feature analysis stage interface.

use crate::error::StageError;
use crate::frame::{AudioFrame, FeatureFrame};

/// Parameters shared by every analysis backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    /// FFT length; spectra have `fftl / 2 + 1` bins.
    pub fftl: usize,
    pub shift_ms: f64,
    pub min_f0: f64,
    pub max_f0: f64,
    /// Cepstral order; cepstra have `mcep_dim + 1` columns.
    pub mcep_dim: usize,
    /// All-pass warping coefficient.
    pub mcep_alpha: f64,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), StageError> {
        if self.sample_rate == 0 {
            return Err(StageError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.fftl < 4 || !self.fftl.is_power_of_two() {
            return Err(StageError::InvalidConfig(format!(
                "fft length {} is not a power of two",
                self.fftl
            )));
        }
        if self.shift_samples() == 0 {
            return Err(StageError::InvalidConfig(format!(
                "frame shift of {} ms is shorter than one sample",
                self.shift_ms
            )));
        }
        if !(self.min_f0 > 0.0 && self.min_f0 < self.max_f0) {
            return Err(StageError::InvalidConfig(format!(
                "pitch bounds [{}, {}] are not increasing and positive",
                self.min_f0, self.max_f0
            )));
        }
        if self.max_f0 >= self.sample_rate as f64 / 2.0 {
            return Err(StageError::InvalidConfig(format!(
                "max f0 {} is above Nyquist",
                self.max_f0
            )));
        }
        if self.mcep_dim == 0 || self.mcep_dim > self.fftl / 2 {
            return Err(StageError::InvalidConfig(format!(
                "cepstral order {} out of range for fft length {}",
                self.mcep_dim, self.fftl
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

    pub fn shift_samples(&self) -> usize {
        (self.sample_rate as f64 * self.shift_ms / 1000.0).round() as usize
    }

    /// Samples handed to the pitch estimator per frame: at least two periods
    /// of `min_f0`, and never shorter than the FFT segment.
    pub fn pitch_window(&self) -> usize {
        let longest_period = (self.sample_rate as f64 / self.min_f0).ceil() as usize;
        self.fftl.max(2 * longest_period + 2)
    }

    pub fn spectrum_bins(&self) -> usize {
        self.fftl / 2 + 1
    }

    /// Analysis frames covering `num_samples`, one per shift starting at 0.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.shift_samples().max(1) + 1
    }
}

/// Turns one captured frame into its acoustic features.
///
/// Implementations run on the extraction worker thread, one frame at a
/// time, and must emit exactly one [`FeatureFrame`] per call carrying the
/// input's sequence number, sample rate and length.
pub trait FeatureAnalyzer: Send + 'static {
    fn analyze(&mut self, frame: &AudioFrame) -> Result<FeatureFrame, StageError>;
}
