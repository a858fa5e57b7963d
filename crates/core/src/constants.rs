//! Shared constants for the voxmorph pipeline.

/// Samples per captured frame when none is given (~1 s at 16 kHz).
pub const DEFAULT_FRAMES_PER_BUFFER: usize = 16384;

/// Recording queue bound; only the freshest frames are worth converting.
pub const MAX_RECORDED_QUEUE_SIZE: usize = 2;

/// High-pass cutoff applied to captured audio (Hz)
pub const HIGHPASS_CUTOFF_HZ: f64 = 70.0;

/// Tap count of the capture high-pass FIR. Odd, so the filter is type I.
pub const HIGHPASS_TAPS: usize = 255;

/// Full-scale value used to move between `i16` PCM and `f32` device samples.
pub const PCM_SCALE: f32 = 32768.0;

/// How long a drain may wait for the last converted frames (ms)
pub const DRAIN_TIMEOUT_MS: u64 = 5000;
