//! Feature-to-audio conversion applied by the conversion worker.

use crate::error::StageError;
use crate::frame::{ConvertedAudioFrame, FeatureFrame};
use crate::model::ConversionModels;
use crate::synthesis::{SynthesisInput, WaveformSynthesizer};
use log::trace;
use std::sync::Arc;

/// Runs the fixed conversion sequence for one feature frame: pitch map,
/// spectral map, GV postfilter, synthesis with power restoration, clamp.
pub struct FrameConverter<S> {
    models: Arc<ConversionModels>,
    synthesizer: S,
}

impl<S: WaveformSynthesizer> FrameConverter<S> {
    pub fn new(models: Arc<ConversionModels>, synthesizer: S) -> Self {
        Self {
            models,
            synthesizer,
        }
    }

    pub fn convert(&mut self, features: &FeatureFrame) -> Result<ConvertedAudioFrame, StageError> {
        let f0 = self.models.pitch().map(features.f0());
        let mapped = self.models.map_spectrum(features.mcep())?;
        let postfiltered = self.models.gv().apply(mapped.view())?;

        let mut waveform = self.synthesizer.synthesize(&SynthesisInput {
            f0: f0.view(),
            mcep: postfiltered.view(),
            aperiodicity: features.aperiodicity(),
            reference_mcep: Some(features.mcep()),
            num_samples: features.num_samples(),
        })?;
        if waveform.len() != features.num_samples() {
            trace!(
                "frame {}: synthesized {} samples, resizing to {}",
                features.seq(),
                waveform.len(),
                features.num_samples()
            );
            waveform.resize(features.num_samples(), 0.0);
        }

        Ok(ConvertedAudioFrame::from_waveform(
            features.seq(),
            features.sample_rate(),
            &waveform,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::linear_models;
    use crate::model::ConversionMode;
    use ndarray::{array, Array1, Array2};
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(Array1<f64>, Array2<f64>, Option<Array2<f64>>)>>>;

    /// Records what it was asked to render and returns a fixed waveform.
    struct Recorder {
        waveform: Vec<f64>,
        seen: Seen,
    }

    impl WaveformSynthesizer for Recorder {
        fn synthesize(&mut self, input: &SynthesisInput<'_>) -> Result<Vec<f64>, StageError> {
            self.seen.lock().unwrap().push((
                input.f0.to_owned(),
                input.mcep.to_owned(),
                input.reference_mcep.map(|r| r.to_owned()),
            ));
            Ok(self.waveform.clone())
        }
    }

    fn features(num_samples: usize) -> FeatureFrame {
        FeatureFrame::new(
            4,
            16000,
            num_samples,
            array![0.0, 120.0, 130.0],
            Array2::zeros((3, 5)),
            Array2::ones((3, 5)),
            array![[-2.5, 0.1], [0.75, 0.2], [1.0e-3, 0.3]],
        )
    }

    fn recording_converter(waveform: Vec<f64>) -> (FrameConverter<Recorder>, Seen) {
        let seen = Seen::default();
        let recorder = Recorder {
            waveform,
            seen: seen.clone(),
        };
        let models = Arc::new(linear_models(ConversionMode::Mlpg));
        (FrameConverter::new(models, recorder), seen)
    }

    #[test]
    fn test_output_keeps_seq_rate_and_length() {
        let (mut converter, _) = recording_converter(vec![1.0; 10]);
        let out = converter.convert(&features(6)).unwrap();
        assert_eq!(out.seq(), 4);
        assert_eq!(out.sample_rate(), 16000);
        assert_eq!(out.samples(), &[1, 1, 1, 1, 1, 1]);

        let (mut converter, _) = recording_converter(vec![7.0]);
        let out = converter.convert(&features(6)).unwrap();
        assert_eq!(out.samples(), &[7, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_samples_are_clamped() {
        let (mut converter, _) = recording_converter(vec![1.0e6, -1.0e6, f64::NAN, 12.6]);
        let out = converter.convert(&features(4)).unwrap();
        assert_eq!(out.samples(), &[i16::MAX, i16::MIN, 0, 13]);
    }

    #[test]
    fn test_power_column_reaches_synthesis_unchanged() {
        let (mut converter, seen) = recording_converter(vec![0.0; 4]);
        let input = features(4);
        converter.convert(&input).unwrap();
        let seen = seen.lock().unwrap();
        let (f0, mcep, reference) = &seen[0];
        assert_eq!(f0[0], 0.0);
        for t in 0..3 {
            assert_eq!(mcep[[t, 0]].to_bits(), input.mcep()[[t, 0]].to_bits());
        }
        assert_eq!(reference.as_ref(), Some(&input.mcep().to_owned()));
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let input = features(4);
        let (mut a, seen_a) = recording_converter(vec![3.0; 4]);
        let (mut b, seen_b) = recording_converter(vec![3.0; 4]);
        let first = a.convert(&input).unwrap();
        let second = b.convert(&input).unwrap();
        assert_eq!(first.to_le_bytes(), second.to_le_bytes());
        assert_eq!(*seen_a.lock().unwrap(), *seen_b.lock().unwrap());
    }

    #[test]
    fn test_vocoder_conversion_repeats_byte_for_byte() {
        use crate::analysis::{AnalysisConfig, FeatureAnalyzer};
        use crate::frame::AudioFrame;
        use crate::synthesis::SynthesisConfig;
        use crate::vocoder::{VocoderAnalyzer, VocoderSynthesizer};
        use std::f64::consts::PI;

        let mut analyzer = VocoderAnalyzer::new(AnalysisConfig {
            sample_rate: 16000,
            fftl: 1024,
            shift_ms: 5.0,
            min_f0: 50.0,
            max_f0: 500.0,
            mcep_dim: 1,
            mcep_alpha: 0.42,
        })
        .unwrap();
        let samples = (0..3200)
            .map(|n| (6000.0 * (2.0 * PI * 150.0 * n as f64 / 16000.0).sin()) as i16)
            .collect();
        let input = analyzer.analyze(&AudioFrame::new(2, 16000, samples)).unwrap();

        let synthesizer = VocoderSynthesizer::new(SynthesisConfig {
            sample_rate: 16000,
            fftl: 1024,
            shift_ms: 5.0,
            mcep_alpha: 0.42,
        })
        .unwrap();
        let models = Arc::new(linear_models(ConversionMode::Mlpg));
        let mut converter = FrameConverter::new(models, synthesizer);

        let first = converter.convert(&input).unwrap();
        let second = converter.convert(&input).unwrap();
        assert_eq!(first.len(), 3200);
        assert!(first.samples().iter().any(|&s| s != 0));
        assert_eq!(first.to_le_bytes(), second.to_le_bytes());
    }

    #[test]
    fn test_shape_errors_propagate() {
        let (mut converter, _) = recording_converter(vec![0.0; 4]);
        let bad = FeatureFrame::new(
            0,
            16000,
            4,
            array![0.0],
            Array2::zeros((1, 5)),
            Array2::ones((1, 5)),
            array![[0.0, 1.0, 2.0]],
        );
        assert!(converter.convert(&bad).is_err());
    }
}
