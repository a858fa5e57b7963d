use super::cepstrum::CepstrumTransform;
use super::hann;
use crate::error::StageError;
use crate::synthesis::{SynthesisConfig, SynthesisInput, WaveformSynthesizer};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Noise excitation is regenerated from this seed on every call so equal
/// inputs always render equal waveforms.
const NOISE_SEED: u64 = 0x766f_786d_6f72_7068;

/// Mixed pulse/noise excitation shaped frame by frame with the spectral
/// envelope and overlap-added with a Hann window two shifts long.
pub struct VocoderSynthesizer {
    config: SynthesisConfig,
    shift: usize,
    window: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    cepstrum: CepstrumTransform,
}

impl VocoderSynthesizer {
    pub fn new(config: SynthesisConfig) -> Result<Self, StageError> {
        config.validate()?;
        let shift = config.shift_samples();
        let mut planner = FftPlanner::new();
        Ok(Self {
            shift,
            window: hann(2 * shift),
            forward: planner.plan_fft_forward(config.fftl),
            inverse: planner.plan_fft_inverse(config.fftl),
            cepstrum: CepstrumTransform::new(config.fftl),
            config,
        })
    }

    /// Unit-power pulse train following `f0`, and unit-variance noise.
    fn excitation(&self, f0: ArrayView1<f64>, len: usize) -> (Vec<f64>, Vec<f64>) {
        let fs = f64::from(self.config.sample_rate);
        let last = f0.len().saturating_sub(1);
        let mut pulses = vec![0.0; len];
        let mut phase = 0.0;
        for (n, pulse) in pulses.iter_mut().enumerate() {
            let frame = ((n + self.shift / 2) / self.shift).min(last);
            let freq = f0[frame];
            if freq > 0.0 {
                phase += freq / fs;
                if phase >= 1.0 {
                    phase -= 1.0;
                    *pulse = (fs / freq).sqrt();
                }
            } else {
                phase = 0.0;
            }
        }

        let mut rng = StdRng::seed_from_u64(NOISE_SEED);
        let scale = 3.0_f64.sqrt();
        let noise = (0..len).map(|_| rng.gen_range(-1.0..1.0) * scale).collect();
        (pulses, noise)
    }

    /// Moves each frame's power term so its energy matches the reference.
    fn restore_power(&mut self, mcep: &mut Array2<f64>, reference: ArrayView2<f64>) {
        let alpha = self.config.mcep_alpha;
        for (t, reference_row) in reference.outer_iter().enumerate() {
            let target = self.cepstrum.energy(reference_row, alpha);
            let current = self.cepstrum.energy(mcep.row(t), alpha);
            if target > 0.0 && current > 0.0 && target.is_finite() && current.is_finite() {
                mcep[[t, 0]] += 0.5 * (target / current).ln();
            }
        }
    }

    fn windowed(&self, source: &[f64], center: usize) -> Vec<Complex<f64>> {
        let n = self.config.fftl;
        let offset = n / 2 - self.shift;
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        for (i, w) in self.window.iter().enumerate() {
            let index = center as isize + i as isize - self.shift as isize;
            if index >= 0 && (index as usize) < source.len() {
                buffer[offset + i] = Complex::new(source[index as usize] * w, 0.0);
            }
        }
        buffer
    }
}

impl WaveformSynthesizer for VocoderSynthesizer {
    fn synthesize(&mut self, input: &SynthesisInput<'_>) -> Result<Vec<f64>, StageError> {
        input.validate()?;
        let len = input.num_samples;
        let frames = input.mcep.nrows();
        let mut output = vec![0.0; len];
        if len == 0 || frames == 0 {
            return Ok(output);
        }
        let n = self.config.fftl;
        let bins = n / 2 + 1;
        if input.aperiodicity.ncols() != bins {
            return Err(StageError::ShapeMismatch(format!(
                "aperiodicity has {} bins, fft length {} needs {}",
                input.aperiodicity.ncols(),
                n,
                bins
            )));
        }

        let mut mcep = input.mcep.to_owned();
        if let Some(reference) = input.reference_mcep {
            self.restore_power(&mut mcep, reference);
        }
        let (pulses, noise) = self.excitation(input.f0, len);
        let scale = 1.0 / n as f64;

        for t in 0..frames {
            let center = t * self.shift;
            if center >= len + self.shift {
                break;
            }
            let power = self.cepstrum.mc2sp(mcep.row(t), self.config.mcep_alpha);
            let mut voiced = self.windowed(&pulses, center);
            let mut unvoiced = self.windowed(&noise, center);
            self.forward.process(&mut voiced);
            self.forward.process(&mut unvoiced);

            for k in 0..n {
                let bin = if k <= n / 2 { k } else { n - k };
                let ap = input.aperiodicity[[t, bin]].clamp(0.0, 1.0);
                let p = power[bin];
                voiced[k] = voiced[k] * (p * (1.0 - ap)).sqrt() + unvoiced[k] * (p * ap).sqrt();
            }
            self.inverse.process(&mut voiced);

            let start = center as isize - (n / 2) as isize;
            for (m, value) in voiced.iter().enumerate() {
                let index = start + m as isize;
                if index >= 0 && (index as usize) < len {
                    output[index as usize] += value.re * scale;
                }
            }
        }
        Ok(output)
    }
}
