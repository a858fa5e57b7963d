use super::cepstrum::{CepstrumTransform, POWER_FLOOR};
use super::pitch;
use super::hann;
use crate::analysis::{AnalysisConfig, FeatureAnalyzer};
use crate::error::StageError;
use crate::frame::{AudioFrame, FeatureFrame};
use ndarray::{Array1, Array2};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Smallest aperiodicity a voiced bin can have.
const MIN_APERIODICITY: f64 = 0.001;

/// Frame-by-frame analysis: autocorrelation pitch, Hann-windowed power
/// spectrum, a band aperiodicity that rises toward Nyquist, and a warped
/// cepstrum of the power spectrum.
pub struct VocoderAnalyzer {
    config: AnalysisConfig,
    window: Vec<f64>,
    window_power: f64,
    fft: Arc<dyn Fft<f64>>,
    cepstrum: CepstrumTransform,
}

impl VocoderAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, StageError> {
        config.validate()?;
        let window = hann(config.fftl);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let fft = FftPlanner::new().plan_fft_forward(config.fftl);
        let cepstrum = CepstrumTransform::new(config.fftl);
        Ok(Self {
            config,
            window,
            window_power,
            fft,
            cepstrum,
        })
    }

    /// `n` samples centred on `center`, zero outside the signal.
    fn segment(signal: &[f64], center: usize, n: usize) -> Vec<f64> {
        let start = center as isize - (n / 2) as isize;
        (0..n)
            .map(|i| {
                let index = start + i as isize;
                if index >= 0 && (index as usize) < signal.len() {
                    signal[index as usize]
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Power spectral density of a segment, normalised so white noise of
    /// variance `v` gives `v` in every bin.
    fn power_spectrum(&self, segment: &[f64]) -> Array1<f64> {
        let mut buffer: Vec<Complex<f64>> = segment
            .iter()
            .zip(&self.window)
            .map(|(x, w)| Complex::new(x * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);
        let bins = self.config.spectrum_bins();
        buffer[..bins]
            .iter()
            .map(|c| (c.norm_sqr() / self.window_power).max(POWER_FLOOR))
            .collect()
    }

    fn aperiodicity(&self, estimate: &pitch::PitchEstimate) -> Array1<f64> {
        let bins = self.config.spectrum_bins();
        if !estimate.is_voiced() {
            return Array1::ones(bins);
        }
        let base = (1.0 - estimate.periodicity).max(MIN_APERIODICITY);
        let top = (bins - 1) as f64;
        Array1::from_shape_fn(bins, |k| {
            let position = k as f64 / top;
            base + (1.0 - base) * position * position
        })
    }
}

impl FeatureAnalyzer for VocoderAnalyzer {
    fn analyze(&mut self, frame: &AudioFrame) -> Result<FeatureFrame, StageError> {
        if frame.sample_rate() != self.config.sample_rate {
            return Err(StageError::InvalidConfig(format!(
                "analyzer runs at {} Hz but frame {} is {} Hz",
                self.config.sample_rate,
                frame.seq(),
                frame.sample_rate()
            )));
        }
        let signal = frame.to_f64();
        let shift = self.config.shift_samples();
        let frames = self.config.num_frames(signal.len());
        let bins = self.config.spectrum_bins();
        let order = self.config.mcep_dim;
        let pitch_window = self.config.pitch_window();

        let mut f0 = Array1::<f64>::zeros(frames);
        let mut spectrogram = Array2::<f64>::zeros((frames, bins));
        let mut aperiodicity = Array2::<f64>::zeros((frames, bins));
        let mut mcep = Array2::<f64>::zeros((frames, order + 1));

        for t in 0..frames {
            let segment = Self::segment(&signal, t * shift, self.config.fftl);
            let long_segment = (pitch_window > self.config.fftl)
                .then(|| Self::segment(&signal, t * shift, pitch_window));
            let estimate = pitch::estimate(
                long_segment.as_deref().unwrap_or(segment.as_slice()),
                self.config.sample_rate,
                self.config.min_f0,
                self.config.max_f0,
            );
            let power = self.power_spectrum(&segment);
            f0[t] = estimate.f0;
            mcep.row_mut(t)
                .assign(&self.cepstrum.sp2mc(power.view(), order, self.config.mcep_alpha));
            aperiodicity.row_mut(t).assign(&self.aperiodicity(&estimate));
            spectrogram.row_mut(t).assign(&power);
        }

        Ok(FeatureFrame::new(
            frame.seq(),
            frame.sample_rate(),
            signal.len(),
            f0,
            spectrogram,
            aperiodicity,
            mcep,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: 16000,
            fftl: 1024,
            shift_ms: 5.0,
            min_f0: 50.0,
            max_f0: 500.0,
            mcep_dim: 24,
            mcep_alpha: 0.42,
        }
    }

    fn tone(seq: u64, len: usize) -> AudioFrame {
        let samples = (0..len)
            .map(|n| (8000.0 * (2.0 * PI * 200.0 * n as f64 / 16000.0).sin()) as i16)
            .collect();
        AudioFrame::new(seq, 16000, samples)
    }

    #[test]
    fn test_feature_shapes() {
        let mut analyzer = VocoderAnalyzer::new(config()).unwrap();
        let features = analyzer.analyze(&tone(9, 4000)).unwrap();
        assert_eq!(features.seq(), 9);
        assert_eq!(features.num_samples(), 4000);
        assert_eq!(features.num_frames(), 51);
        assert_eq!(features.f0().len(), 51);
        assert_eq!(features.spectrogram().dim(), (51, 513));
        assert_eq!(features.aperiodicity().dim(), (51, 513));
        assert_eq!(features.mcep().dim(), (51, 25));
    }

    #[test]
    fn test_tone_is_voiced_mid_frame() {
        let mut analyzer = VocoderAnalyzer::new(config()).unwrap();
        let features = analyzer.analyze(&tone(0, 4000)).unwrap();
        let f0 = features.f0()[25];
        assert!((f0 - 200.0).abs() < 1.0, "f0 {f0}");
        assert!(features.aperiodicity()[[25, 0]] < 0.1);
    }

    #[test]
    fn test_low_pitch_found_at_high_sample_rate() {
        let config = AnalysisConfig {
            sample_rate: 48000,
            ..config()
        };
        assert!(config.pitch_window() > config.fftl);
        let samples = (0..24000)
            .map(|n| (8000.0 * (2.0 * PI * 60.0 * n as f64 / 48000.0).sin()) as i16)
            .collect();
        let mut analyzer = VocoderAnalyzer::new(config).unwrap();
        let features = analyzer.analyze(&AudioFrame::new(0, 48000, samples)).unwrap();
        let f0 = features.f0()[50];
        assert!((f0 - 60.0).abs() < 1.0, "f0 {f0}");
    }

    #[test]
    fn test_silence_is_unvoiced_and_aperiodic() {
        let mut analyzer = VocoderAnalyzer::new(config()).unwrap();
        let features = analyzer
            .analyze(&AudioFrame::new(0, 16000, vec![0; 2000]))
            .unwrap();
        assert!(features.f0().iter().all(|&f| f == 0.0));
        assert!(features.aperiodicity().iter().all(|&a| a == 1.0));
        assert!(features.mcep().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_rejects_rate_mismatch() {
        let mut analyzer = VocoderAnalyzer::new(config()).unwrap();
        assert!(analyzer.analyze(&AudioFrame::new(0, 8000, vec![0; 100])).is_err());
    }
}
