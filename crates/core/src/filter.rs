//! Linear-phase FIR high-pass for captured audio.
//!
//! Windowed-sinc design with a Hamming window, normalised to unit gain at
//! Nyquist. The filter keeps its delay line between blocks so consecutive
//! capture frames filter as one continuous signal.

use crate::error::StageError;
use std::f64::consts::PI;

pub struct HighPassFilter {
    taps: Vec<f64>,
    /// Last `taps.len() - 1` input samples, oldest first.
    history: Vec<f64>,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f64, sample_rate: u32, num_taps: usize) -> Result<Self, StageError> {
        let nyquist = f64::from(sample_rate) / 2.0;
        if num_taps % 2 == 0 {
            return Err(StageError::InvalidConfig(format!(
                "high-pass needs an odd tap count, got {num_taps}"
            )));
        }
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(StageError::InvalidConfig(format!(
                "cutoff {cutoff_hz} Hz outside (0, {nyquist}) Hz"
            )));
        }
        let taps = design_highpass(cutoff_hz / nyquist, num_taps);
        Ok(Self {
            history: vec![0.0; taps.len() - 1],
            taps,
        })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Filters one block, continuing from the previous block's tail.
    pub fn process(&mut self, block: &[f64]) -> Vec<f64> {
        let order = self.taps.len() - 1;
        let mut extended = Vec::with_capacity(order + block.len());
        extended.extend_from_slice(&self.history);
        extended.extend_from_slice(block);

        let output: Vec<f64> = (0..block.len())
            .map(|n| {
                let newest = n + order;
                self.taps
                    .iter()
                    .enumerate()
                    .map(|(k, h)| h * extended[newest - k])
                    .sum::<f64>()
            })
            .collect();

        self.history.copy_from_slice(&extended[extended.len() - order..]);
        output
    }
}

/// `cutoff` is normalised so that 1.0 is Nyquist.
fn design_highpass(cutoff: f64, num_taps: usize) -> Vec<f64> {
    let center = (num_taps - 1) as f64 / 2.0;
    let mut taps: Vec<f64> = (0..num_taps)
        .map(|n| {
            let m = n as f64 - center;
            let ideal = sinc(m) - cutoff * sinc(cutoff * m);
            ideal * hamming(n, num_taps)
        })
        .collect();

    // Unity gain at Nyquist, where cos(pi * m) alternates sign.
    let gain: f64 = taps
        .iter()
        .enumerate()
        .map(|(n, h)| h * (PI * (n as f64 - center)).cos())
        .sum();
    for h in &mut taps {
        *h /= gain;
    }
    taps
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn hamming(n: usize, len: usize) -> f64 {
    0.54 - 0.46 * (2.0 * PI * n as f64 / (len - 1) as f64).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HIGHPASS_CUTOFF_HZ, HIGHPASS_TAPS};

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    fn tone(freq: f64, fs: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| 1000.0 * (2.0 * PI * freq * n as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_taps_are_symmetric() {
        let filter = HighPassFilter::new(HIGHPASS_CUTOFF_HZ, 16000, HIGHPASS_TAPS).unwrap();
        let taps = filter.taps();
        assert_eq!(taps.len(), HIGHPASS_TAPS);
        for i in 0..taps.len() / 2 {
            assert!((taps[i] - taps[taps.len() - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_attenuates_dc() {
        let mut filter = HighPassFilter::new(HIGHPASS_CUTOFF_HZ, 16000, HIGHPASS_TAPS).unwrap();
        let out = filter.process(&vec![500.0; 4000]);
        // 255 taps give a DC gain of about 0.11 for a 70 Hz cutoff at 16 kHz.
        assert!(rms(&out[HIGHPASS_TAPS..]) < 0.15 * 500.0);
    }

    #[test]
    fn test_half_amplitude_at_cutoff() {
        let mut filter = HighPassFilter::new(HIGHPASS_CUTOFF_HZ, 16000, HIGHPASS_TAPS).unwrap();
        let input = tone(HIGHPASS_CUTOFF_HZ, 16000.0, 8000);
        let out = filter.process(&input);
        let ratio = rms(&out[HIGHPASS_TAPS..]) / rms(&input[HIGHPASS_TAPS..]);
        assert!((ratio - 0.5).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_passes_speech_band() {
        let mut filter = HighPassFilter::new(HIGHPASS_CUTOFF_HZ, 16000, HIGHPASS_TAPS).unwrap();
        let input = tone(1000.0, 16000.0, 4000);
        let out = filter.process(&input);
        let ratio = rms(&out[HIGHPASS_TAPS..]) / rms(&input[HIGHPASS_TAPS..]);
        assert!((ratio - 1.0).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn test_block_split_matches_single_pass() {
        let input = tone(300.0, 16000.0, 3000);
        let mut whole = HighPassFilter::new(100.0, 16000, 31).unwrap();
        let mut split = HighPassFilter::new(100.0, 16000, 31).unwrap();
        let expected = whole.process(&input);
        let mut actual = split.process(&input[..1234]);
        actual.extend(split.process(&input[1234..]));
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(HighPassFilter::new(70.0, 16000, 254).is_err());
        assert!(HighPassFilter::new(9000.0, 16000, 255).is_err());
        assert!(HighPassFilter::new(0.0, 16000, 255).is_err());
    }
}
