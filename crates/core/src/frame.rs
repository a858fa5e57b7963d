//! Frames passed between pipeline stages.
//!
//! Every frame carries the sequence number the capture stage assigned to the
//! audio it came from, so ordering can be checked at any point downstream.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// One capture period of mono 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    seq: u64,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(seq: u64, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            seq,
            sample_rate,
            samples,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples widened to `f64`, still on the 16-bit scale.
    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| f64::from(s)).collect()
    }
}

/// Acoustic descriptors of one [`AudioFrame`].
///
/// Rows of the matrices are analysis frames (one per frame shift). Column 0 of
/// `mcep` is the power coefficient; the conversion stages never modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    seq: u64,
    sample_rate: u32,
    num_samples: usize,
    f0: Array1<f64>,
    spectrogram: Array2<f64>,
    aperiodicity: Array2<f64>,
    mcep: Array2<f64>,
}

impl FeatureFrame {
    pub fn new(
        seq: u64,
        sample_rate: u32,
        num_samples: usize,
        f0: Array1<f64>,
        spectrogram: Array2<f64>,
        aperiodicity: Array2<f64>,
        mcep: Array2<f64>,
    ) -> Self {
        Self {
            seq,
            sample_rate,
            num_samples,
            f0,
            spectrogram,
            aperiodicity,
            mcep,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the audio frame these features were taken from.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of analysis frames.
    pub fn num_frames(&self) -> usize {
        self.f0.len()
    }

    pub fn f0(&self) -> ArrayView1<'_, f64> {
        self.f0.view()
    }

    pub fn spectrogram(&self) -> ArrayView2<'_, f64> {
        self.spectrogram.view()
    }

    pub fn aperiodicity(&self) -> ArrayView2<'_, f64> {
        self.aperiodicity.view()
    }

    pub fn mcep(&self) -> ArrayView2<'_, f64> {
        self.mcep.view()
    }
}

/// Converted audio, ready for playback. Same length and rate as its source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedAudioFrame {
    seq: u64,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl ConvertedAudioFrame {
    pub fn new(seq: u64, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            seq,
            sample_rate,
            samples,
        }
    }

    /// Builds a frame from synthesized samples, clamping each one to the
    /// 16-bit range.
    pub fn from_waveform(seq: u64, sample_rate: u32, waveform: &[f64]) -> Self {
        Self::new(
            seq,
            sample_rate,
            waveform.iter().copied().map(clamp_to_i16).collect(),
        )
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Little-endian PCM bytes, as written to a device or file.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Rounds and clips to `[-32768, 32767]`. Out-of-range values saturate,
/// NaN maps to silence.
pub fn clamp_to_i16(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    value
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_saturates_instead_of_wrapping() {
        assert_eq!(clamp_to_i16(40000.0), i16::MAX);
        assert_eq!(clamp_to_i16(-40000.0), i16::MIN);
        assert_eq!(clamp_to_i16(32767.4), 32767);
        assert_eq!(clamp_to_i16(-32768.0), -32768);
        assert_eq!(clamp_to_i16(f64::INFINITY), i16::MAX);
        assert_eq!(clamp_to_i16(f64::NEG_INFINITY), i16::MIN);
        assert_eq!(clamp_to_i16(f64::NAN), 0);
    }

    #[test]
    fn test_from_waveform_keeps_length_and_seq() {
        let frame = ConvertedAudioFrame::from_waveform(7, 16000, &[0.4, 1e9, -1e9, -12.6]);
        assert_eq!(frame.seq(), 7);
        assert_eq!(frame.samples(), &[0, 32767, -32768, -13]);
    }

    #[test]
    fn test_audio_frame_to_f64() {
        let frame = AudioFrame::new(0, 16000, vec![-2, 0, 5]);
        assert_eq!(frame.to_f64(), vec![-2.0, 0.0, 5.0]);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_le_bytes() {
        let frame = ConvertedAudioFrame::new(0, 16000, vec![1, -1]);
        assert_eq!(frame.to_le_bytes(), vec![1, 0, 0xff, 0xff]);
    }
}
