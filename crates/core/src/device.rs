//! Capture and playback interfaces the orchestrator drives.
//!
//! The app implements these on top of real audio devices; tests use
//! in-memory sources and sinks.

use crate::error::DeviceError;
use crate::frame::{AudioFrame, ConvertedAudioFrame};

pub trait AudioSource {
    /// Blocks until one full frame is captured. `Ok(None)` means the source
    /// has nothing more to give (end of input or a stop request).
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, DeviceError>;

    /// Stops capturing. Called once during shutdown, before queues are
    /// flushed.
    fn stop(&mut self) {}
}

pub trait AudioSink {
    /// Blocks until the device has accepted every sample of `frame`.
    fn play_frame(&mut self, frame: &ConvertedAudioFrame) -> Result<(), DeviceError>;

    /// Waits for already accepted audio to finish playing.
    fn finish(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, DeviceError> {
        (**self).read_frame()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn play_frame(&mut self, frame: &ConvertedAudioFrame) -> Result<(), DeviceError> {
        (**self).play_frame(frame)
    }

    fn finish(&mut self) -> Result<(), DeviceError> {
        (**self).finish()
    }
}
