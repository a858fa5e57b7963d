//! The two processing loops that run beside the orchestrator.
//!
//! Each worker owns its stage, blocks on its input queue until an item or
//! the stop signal arrives, and pushes exactly one output per input.

use crate::analysis::FeatureAnalyzer;
use crate::converter::FrameConverter;
use crate::error::{PipelineError, StageError};
use crate::frame::{AudioFrame, ConvertedAudioFrame, FeatureFrame};
use crate::queue::BoundedQueue;
use crate::shutdown::StopListener;
use crate::synthesis::WaveformSynthesizer;
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const EXTRACT_THREAD: &str = "voxmorph-extract";
pub const CONVERT_THREAD: &str = "voxmorph-convert";

/// A running worker thread and its output counter.
pub struct WorkerHandle {
    name: &'static str,
    thread: JoinHandle<Result<(), StageError>>,
    processed: Arc<AtomicU64>,
}

impl WorkerHandle {
    fn spawn<F>(name: &'static str, processed: Arc<AtomicU64>, body: F) -> Result<Self, PipelineError>
    where
        F: FnOnce() -> Result<(), StageError> + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let result = body();
                match &result {
                    Ok(()) => info!("{name} stopped"),
                    Err(e) => error!("{name} failed: {e}"),
                }
                result
            })
            .map_err(|source| PipelineError::Spawn { name, source })?;
        Ok(Self {
            name,
            thread,
            processed,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Frames this worker has pushed downstream.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the thread. A stage error or a panic becomes the error.
    pub fn join(self) -> Result<u64, PipelineError> {
        let Self {
            name,
            thread,
            processed,
        } = self;
        match thread.join() {
            Ok(Ok(())) => Ok(processed.load(Ordering::Relaxed)),
            Ok(Err(e)) => Err(PipelineError::Stage(e)),
            Err(_) => Err(PipelineError::WorkerPanicked(name)),
        }
    }
}

pub struct FeatureExtractionWorker<A> {
    analyzer: A,
    input: BoundedQueue<AudioFrame>,
    output: BoundedQueue<FeatureFrame>,
    stop: StopListener,
    processed: Arc<AtomicU64>,
}

impl<A: FeatureAnalyzer> FeatureExtractionWorker<A> {
    pub fn new(
        analyzer: A,
        input: BoundedQueue<AudioFrame>,
        output: BoundedQueue<FeatureFrame>,
        stop: StopListener,
    ) -> Self {
        Self {
            analyzer,
            input,
            output,
            stop,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run(mut self) -> Result<(), StageError> {
        while let Some(frame) = self.input.dequeue_or_stop(&self.stop) {
            let features = self.analyzer.analyze(&frame)?;
            debug!("extracted frame {} ({} analysis frames)", features.seq(), features.num_frames());
            self.output.enqueue(features);
            self.output.enforce_capacity();
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn spawn(self) -> Result<WorkerHandle, PipelineError> {
        let processed = self.processed.clone();
        WorkerHandle::spawn(EXTRACT_THREAD, processed, move || self.run())
    }
}

pub struct ConversionWorker<S> {
    converter: FrameConverter<S>,
    input: BoundedQueue<FeatureFrame>,
    output: BoundedQueue<ConvertedAudioFrame>,
    stop: StopListener,
    processed: Arc<AtomicU64>,
}

impl<S: WaveformSynthesizer> ConversionWorker<S> {
    pub fn new(
        converter: FrameConverter<S>,
        input: BoundedQueue<FeatureFrame>,
        output: BoundedQueue<ConvertedAudioFrame>,
        stop: StopListener,
    ) -> Self {
        Self {
            converter,
            input,
            output,
            stop,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run(mut self) -> Result<(), StageError> {
        while let Some(features) = self.input.dequeue_or_stop(&self.stop) {
            let converted = self.converter.convert(&features)?;
            debug!("converted frame {}", converted.seq());
            self.output.enqueue(converted);
            self.output.enforce_capacity();
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn spawn(self) -> Result<WorkerHandle, PipelineError> {
        let processed = self.processed.clone();
        WorkerHandle::spawn(CONVERT_THREAD, processed, move || self.run())
    }
}
