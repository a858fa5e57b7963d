//! Streaming voice conversion.
//!
//! Captured audio flows through a bounded recording queue into a feature
//! extraction worker, a conversion worker and back to the orchestrator for
//! playback. See [`pipeline`] for the wiring and [`queue`] for the
//! backpressure policy.

pub mod analysis;
pub mod constants;
pub mod converter;
pub mod device;
pub mod error;
pub mod filter;
pub mod frame;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod shutdown;
pub mod synthesis;
pub mod vocoder;
pub mod workers;

pub use analysis::{AnalysisConfig, FeatureAnalyzer};
pub use converter::FrameConverter;
pub use device::{AudioSink, AudioSource};
pub use error::{DeviceError, ModelError, PipelineError, QueueError, StageError};
pub use filter::HighPassFilter;
pub use frame::{AudioFrame, ConvertedAudioFrame, FeatureFrame};
pub use model::ConversionModels;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState, RunSummary};
pub use queue::BoundedQueue;
pub use shutdown::{stop_signal, StopHandle, StopListener};
pub use synthesis::{SynthesisConfig, SynthesisInput, WaveformSynthesizer};
pub use vocoder::{VocoderAnalyzer, VocoderSynthesizer};
