//! Compact reference vocoder backing the analysis and synthesis stages.

pub mod analyzer;
pub mod cepstrum;
pub mod pitch;
pub mod synthesizer;

pub use analyzer::VocoderAnalyzer;
pub use synthesizer::VocoderSynthesizer;

use std::f64::consts::PI;

/// Periodic Hann window. Copies shifted by `len / 2` sum to one.
pub(crate) fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / len as f64).cos())
        .collect()
}
