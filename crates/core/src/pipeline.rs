//! The orchestrator: wires stages together, runs the capture/playback loop
//! on the calling thread and supervises the worker threads.
//!
//! ```text
//! source -> [recorded, drop-oldest] -> extract -> [features] -> convert -> [converted] -> sink
//! ```

use crate::analysis::FeatureAnalyzer;
use crate::constants::{DRAIN_TIMEOUT_MS, MAX_RECORDED_QUEUE_SIZE};
use crate::converter::FrameConverter;
use crate::device::{AudioSink, AudioSource};
use crate::error::PipelineError;
use crate::frame::{AudioFrame, ConvertedAudioFrame, FeatureFrame};
use crate::queue::BoundedQueue;
use crate::shutdown::{stop_signal, StopHandle, StopListener};
use crate::synthesis::WaveformSynthesizer;
use crate::workers::{ConversionWorker, FeatureExtractionWorker, WorkerHandle, CONVERT_THREAD, EXTRACT_THREAD};
use log::{debug, error, info, warn};
use std::fmt;
use std::time::{Duration, Instant};

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Queue bounds and shutdown timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Recorded frames kept before the oldest are dropped.
    pub max_recorded: usize,
    /// `None` leaves the feature queue unbounded.
    pub feature_queue_cap: Option<usize>,
    /// `None` leaves the converted queue unbounded.
    pub converted_queue_cap: Option<usize>,
    /// Longest wait for in-flight frames once the source runs dry.
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_recorded: MAX_RECORDED_QUEUE_SIZE,
            feature_queue_cap: None,
            converted_queue_cap: None,
            drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// The source is exhausted; remaining frames are being played out.
    Draining,
    Stopped,
}

/// Frame accounting for one run. Once the run has ended normally,
/// `captured == played + dropped() + flushed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub captured: u64,
    pub recorded_dropped: u64,
    pub features_dropped: u64,
    pub converted_dropped: u64,
    pub extracted: u64,
    pub converted: u64,
    pub played: u64,
    pub flushed: u64,
}

impl RunSummary {
    pub fn dropped(&self) -> u64 {
        self.recorded_dropped + self.features_dropped + self.converted_dropped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured {}, played {}, dropped {} (recorded {}, features {}, converted {}), flushed {}",
            self.captured,
            self.played,
            self.dropped(),
            self.recorded_dropped,
            self.features_dropped,
            self.converted_dropped,
            self.flushed
        )
    }
}

enum LoopExit {
    Exhausted,
    Stopped,
}

pub struct Pipeline<Src, Snk> {
    config: PipelineConfig,
    source: Src,
    sink: Snk,
    recorded: BoundedQueue<AudioFrame>,
    features: BoundedQueue<FeatureFrame>,
    converted: BoundedQueue<ConvertedAudioFrame>,
    stop_handle: StopHandle,
    stop: StopListener,
    state: PipelineState,
    workers: Vec<WorkerHandle>,
    summary: RunSummary,
}

impl<Src: AudioSource, Snk: AudioSink> Pipeline<Src, Snk> {
    pub fn new(config: PipelineConfig, source: Src, sink: Snk) -> Self {
        let (handle, listener) = stop_signal();
        Self::with_stop_signal(config, source, sink, handle, listener)
    }

    /// Uses an existing stop signal, so a device can watch the same stop
    /// as the workers.
    pub fn with_stop_signal(
        config: PipelineConfig,
        source: Src,
        sink: Snk,
        stop_handle: StopHandle,
        stop: StopListener,
    ) -> Self {
        if config.feature_queue_cap.is_none() {
            warn!("feature queue is unbounded; memory grows while conversion falls behind");
        }
        if config.converted_queue_cap.is_none() {
            warn!("converted queue is unbounded; memory grows while playback falls behind");
        }
        Self {
            recorded: BoundedQueue::new("recorded", Some(config.max_recorded)),
            features: BoundedQueue::new("features", config.feature_queue_cap),
            converted: BoundedQueue::new("converted", config.converted_queue_cap),
            config,
            source,
            sink,
            stop_handle,
            stop,
            state: PipelineState::Idle,
            workers: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Handle that requests a graceful stop, e.g. from a signal handler.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            recorded_dropped: self.recorded.dropped_count(),
            features_dropped: self.features.dropped_count(),
            converted_dropped: self.converted.dropped_count(),
            ..self.summary.clone()
        }
    }

    /// Runs until the stop signal fires, the source is exhausted and drained,
    /// or something fails. Devices and workers are shut down on every path.
    pub fn run<A, S>(&mut self, analyzer: A, converter: FrameConverter<S>) -> Result<RunSummary, PipelineError>
    where
        A: FeatureAnalyzer,
        S: WaveformSynthesizer,
    {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::NotIdle(self.state));
        }
        let outcome = self
            .start(analyzer, converter)
            .and_then(|()| self.main_loop())
            .and_then(|exit| match exit {
                LoopExit::Exhausted => self.drain(),
                LoopExit::Stopped => {
                    info!("stop requested");
                    Ok(())
                }
            });
        let shutdown = self.shutdown();
        outcome?;
        shutdown?;

        let summary = self.summary();
        info!("pipeline stopped: {summary}");
        Ok(summary)
    }

    fn start<A, S>(&mut self, analyzer: A, converter: FrameConverter<S>) -> Result<(), PipelineError>
    where
        A: FeatureAnalyzer,
        S: WaveformSynthesizer,
    {
        let extract = FeatureExtractionWorker::new(
            analyzer,
            self.recorded.clone(),
            self.features.clone(),
            self.stop.clone(),
        );
        self.workers.push(extract.spawn()?);

        let convert = ConversionWorker::new(
            converter,
            self.features.clone(),
            self.converted.clone(),
            self.stop.clone(),
        );
        self.workers.push(convert.spawn()?);

        self.state = PipelineState::Running;
        info!(
            "pipeline running (recorded cap {}, feature cap {:?}, converted cap {:?})",
            self.config.max_recorded, self.config.feature_queue_cap, self.config.converted_queue_cap
        );
        Ok(())
    }

    fn main_loop(&mut self) -> Result<LoopExit, PipelineError> {
        loop {
            if self.stop.is_triggered() {
                return Ok(LoopExit::Stopped);
            }
            self.supervise()?;
            debug!(
                "queue depths: recorded {}, features {}, converted {}",
                self.recorded.len(),
                self.features.len(),
                self.converted.len()
            );

            self.recorded.enforce_cap(self.config.max_recorded);

            match self.source.read_frame()? {
                Some(frame) => {
                    self.summary.captured += 1;
                    self.recorded.enqueue(frame);
                }
                None if self.stop.is_triggered() => return Ok(LoopExit::Stopped),
                None => return Ok(LoopExit::Exhausted),
            }

            if let Some(frame) = self.converted.try_dequeue() {
                self.play(&frame)?;
            }
        }
    }

    /// Frames captured but not yet played or dropped.
    fn outstanding(&self) -> u64 {
        let summary = self.summary();
        summary
            .captured
            .saturating_sub(summary.played + summary.dropped())
    }

    fn drain(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Draining;
        info!("source exhausted; draining {} frame(s)", self.outstanding());
        let deadline = Instant::now() + self.config.drain_timeout;
        while self.outstanding() > 0 {
            if self.stop.is_triggered() {
                return Ok(());
            }
            self.supervise()?;
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "drain timed out with {} frame(s) outstanding",
                    self.outstanding()
                );
                return Ok(());
            }
            if let Some(frame) = self.converted.dequeue_timeout((deadline - now).min(DRAIN_POLL)) {
                self.play(&frame)?;
            }
        }
        self.sink.finish()?;
        Ok(())
    }

    fn play(&mut self, frame: &ConvertedAudioFrame) -> Result<(), PipelineError> {
        self.sink.play_frame(frame)?;
        self.summary.played += 1;
        Ok(())
    }

    /// Fails if a worker has ended while the pipeline still needs it.
    fn supervise(&mut self) -> Result<(), PipelineError> {
        let Some(index) = self.workers.iter().position(WorkerHandle::is_finished) else {
            return Ok(());
        };
        let worker = self.workers.swap_remove(index);
        let name = worker.name();
        let reason = match worker.join() {
            Ok(processed) => {
                self.record_processed(name, processed);
                "returned before a stop request".to_string()
            }
            Err(e) => e.to_string(),
        };
        error!("{name} exited while the pipeline was running: {reason}");
        Err(PipelineError::WorkerExited { name, reason })
    }

    fn record_processed(&mut self, name: &str, processed: u64) {
        match name {
            EXTRACT_THREAD => self.summary.extracted = processed,
            CONVERT_THREAD => self.summary.converted = processed,
            _ => {}
        }
    }

    fn flush_queues(&mut self) -> u64 {
        (self.recorded.flush() + self.features.flush() + self.converted.flush()) as u64
    }

    /// Stop capture, discard queued frames, stop and join the workers, then
    /// discard whatever they produced on the way out.
    fn shutdown(&mut self) -> Result<(), PipelineError> {
        self.source.stop();
        let mut flushed = self.flush_queues();
        self.stop_handle.trigger();

        let mut first_error = None;
        for worker in std::mem::take(&mut self.workers) {
            let name = worker.name();
            match worker.join() {
                Ok(processed) => {
                    debug!("{name} processed {processed} frame(s)");
                    self.record_processed(name, processed);
                }
                Err(e) => {
                    error!("{name}: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        flushed += self.flush_queues();
        if flushed > 0 {
            info!("discarded {flushed} in-flight frame(s)");
        }
        self.summary.flushed += flushed;
        self.state = PipelineState::Stopped;
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;

    struct NoSource;

    impl AudioSource for NoSource {
        fn read_frame(&mut self) -> Result<Option<AudioFrame>, DeviceError> {
            Ok(None)
        }
    }

    struct NoSink;

    impl AudioSink for NoSink {
        fn play_frame(&mut self, _frame: &ConvertedAudioFrame) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_recorded, 2);
        assert_eq!(config.feature_queue_cap, None);
        assert_eq!(config.converted_queue_cap, None);
    }

    #[test]
    fn test_new_pipeline_is_idle() {
        let pipeline = Pipeline::new(PipelineConfig::default(), NoSource, NoSink);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.summary(), RunSummary::default());
        assert!(!pipeline.stop_handle().is_triggered());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            captured: 5,
            recorded_dropped: 1,
            played: 4,
            ..RunSummary::default()
        };
        assert_eq!(summary.dropped(), 1);
        assert_eq!(
            summary.to_string(),
            "captured 5, played 4, dropped 1 (recorded 1, features 0, converted 0), flushed 0"
        );
    }
}
