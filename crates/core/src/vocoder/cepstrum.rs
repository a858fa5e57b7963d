//! Power spectrum <-> warped cepstrum conversion.

use ndarray::{Array1, ArrayView1};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Lower bound applied to power spectra before taking logarithms.
pub const POWER_FLOOR: f64 = 1e-10;

/// Frequency transform of a cepstrum through a first-order all-pass warp.
///
/// Maps `c` (any length) to `order + 1` coefficients on the scale warped by
/// `alpha`. `alpha == 0` truncates or zero-pads.
pub fn freqt(c: &[f64], order: usize, alpha: f64) -> Vec<f64> {
    let beta = 1.0 - alpha * alpha;
    let mut g = vec![0.0; order + 1];
    let mut d = vec![0.0; order + 1];
    for &coef in c.iter().rev() {
        d.copy_from_slice(&g);
        g[0] = coef + alpha * d[0];
        if order >= 1 {
            g[1] = beta * d[0] + alpha * d[1];
        }
        for j in 2..=order {
            g[j] = d[j - 1] + alpha * (d[j] - g[j - 1]);
        }
    }
    g
}

/// FFT plans and scratch for one FFT length.
pub struct CepstrumTransform {
    fftl: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
}

impl CepstrumTransform {
    pub fn new(fftl: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fftl,
            forward: planner.plan_fft_forward(fftl),
            inverse: planner.plan_fft_inverse(fftl),
            buffer: vec![Complex::new(0.0, 0.0); fftl],
        }
    }

    /// Fills the buffer with the even extension of a half spectrum or half
    /// cepstrum of `fftl / 2 + 1` real values.
    fn load_symmetric(&mut self, half: &[f64]) {
        let n = self.fftl;
        for k in 0..=n / 2 {
            self.buffer[k] = Complex::new(half[k], 0.0);
        }
        for k in 1..n / 2 {
            self.buffer[n - k] = Complex::new(half[k], 0.0);
        }
    }

    /// Warped cepstrum of order `order` from a `fftl / 2 + 1` bin power
    /// spectrum.
    pub fn sp2mc(&mut self, power: ArrayView1<f64>, order: usize, alpha: f64) -> Array1<f64> {
        let n = self.fftl;
        let log_power: Vec<f64> = power.iter().map(|p| p.max(POWER_FLOOR).ln()).collect();
        self.load_symmetric(&log_power);
        self.inverse.process(&mut self.buffer);

        let scale = 1.0 / n as f64;
        let mut cepstrum: Vec<f64> = self.buffer[..=n / 2].iter().map(|c| c.re * scale).collect();
        cepstrum[0] /= 2.0;
        cepstrum[n / 2] /= 2.0;
        Array1::from(freqt(&cepstrum, order, alpha))
    }

    /// Power spectrum of `fftl / 2 + 1` bins from a warped cepstrum.
    pub fn mc2sp(&mut self, mcep: ArrayView1<f64>, alpha: f64) -> Array1<f64> {
        let n = self.fftl;
        let coefficients: Vec<f64> = mcep.to_vec();
        let mut cepstrum = freqt(&coefficients, n / 2, -alpha);
        cepstrum[0] *= 2.0;
        cepstrum[n / 2] *= 2.0;
        self.load_symmetric(&cepstrum);
        self.forward.process(&mut self.buffer);
        self.buffer[..=n / 2].iter().map(|c| c.re.exp()).collect()
    }

    /// Mean power of the spectrum a cepstrum describes.
    pub fn energy(&mut self, mcep: ArrayView1<f64>, alpha: f64) -> f64 {
        self.mc2sp(mcep, alpha).mean().unwrap_or(0.0)
    }
}
