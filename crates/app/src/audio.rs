use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use voxmorph_core::constants::{HIGHPASS_TAPS, PCM_SCALE};
use voxmorph_core::frame::clamp_to_i16;
use voxmorph_core::{
    AudioFrame, AudioSink, AudioSource, ConvertedAudioFrame, DeviceError, HighPassFilter,
    StopListener,
};

/// Sleep between ring buffer polls while a device catches up.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// How long a device may make no progress before it counts as gone.
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the platform audio host. Devices are opened through it and
/// addressed by their position in the host's enumeration.
pub struct AudioSystem {
    host: cpal::Host,
}

impl AudioSystem {
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!("Audio host: {}", host.id().name());
        Self { host }
    }

    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    pub fn input_devices(&self) -> Result<BTreeMap<usize, String>> {
        let devices = self.host.input_devices().context("failed to enumerate input devices")?;
        Ok(devices.map(device_name).enumerate().collect())
    }

    pub fn output_devices(&self) -> Result<BTreeMap<usize, String>> {
        let devices = self.host.output_devices().context("failed to enumerate output devices")?;
        Ok(devices.map(device_name).enumerate().collect())
    }

    pub fn open_microphone(
        &self,
        index: usize,
        sample_rate: u32,
        frame_size: usize,
        cutoff_hz: f64,
        stop: StopListener,
    ) -> Result<Microphone> {
        let device = self
            .host
            .input_devices()
            .context("failed to enumerate input devices")?
            .nth(index)
            .with_context(|| format!("no input device with index {index}"))?;
        info!("Using input device: {}", device_name(device.clone()));
        Microphone::open(&device, sample_rate, frame_size, cutoff_hz, stop)
    }

    pub fn open_speaker(&self, index: usize, sample_rate: u32, frame_size: usize) -> Result<Speaker> {
        let device = self
            .host
            .output_devices()
            .context("failed to enumerate output devices")?
            .nth(index)
            .with_context(|| format!("no output device with index {index}"))?;
        info!("Using output device: {}", device_name(device.clone()));
        Speaker::open(&device, sample_rate, frame_size)
    }
}

fn device_name(device: cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

fn mono_config(sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Capture stage: a mono input stream feeding a ring buffer, read back in
/// fixed-size high-passed frames.
pub struct Microphone {
    stream: cpal::Stream,
    consumer: HeapCons<f32>,
    filter: HighPassFilter,
    block: Vec<f32>,
    sample_rate: u32,
    next_seq: u64,
    overflowed: Arc<AtomicU64>,
    stop: StopListener,
}

impl Microphone {
    fn open(
        device: &cpal::Device,
        sample_rate: u32,
        frame_size: usize,
        cutoff_hz: f64,
        stop: StopListener,
    ) -> Result<Self> {
        let filter = HighPassFilter::new(cutoff_hz, sample_rate, HIGHPASS_TAPS)
            .context("invalid high-pass settings")?;

        // Room for a few frames so a slow orchestrator iteration does not
        // lose audio.
        let rb = HeapRb::<f32>::new(frame_size * 4);
        let (mut producer, consumer) = rb.split();
        let overflowed = Arc::new(AtomicU64::new(0));
        let overflow_counter = overflowed.clone();

        let stream = device
            .build_input_stream(
                &mono_config(sample_rate),
                move |data: &[f32], _| {
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        overflow_counter.fetch_add((data.len() - pushed) as u64, Ordering::Relaxed);
                    }
                },
                |err| warn!("Input error: {}", err),
                None,
            )
            .context("failed to open input stream")?;
        stream.play().context("failed to start input stream")?;

        Ok(Self {
            stream,
            consumer,
            filter,
            block: vec![0.0; frame_size],
            sample_rate,
            next_seq: 0,
            overflowed,
            stop,
        })
    }
}

impl AudioSource for Microphone {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, DeviceError> {
        let mut filled = 0;
        let mut last_progress = Instant::now();
        while filled < self.block.len() {
            if self.stop.is_triggered() {
                return Ok(None);
            }
            let read = self.consumer.pop_slice(&mut self.block[filled..]);
            if read > 0 {
                filled += read;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(DeviceError::Stream(format!(
                    "no input for {} s",
                    STALL_TIMEOUT.as_secs()
                )));
            } else {
                thread::sleep(POLL_INTERVAL);
            }
        }

        let lost = self.overflowed.swap(0, Ordering::Relaxed);
        if lost > 0 {
            warn!("capture ring overflowed, {lost} samples lost");
        }

        let pcm: Vec<f64> = self
            .block
            .iter()
            .map(|&s| f64::from(s * PCM_SCALE))
            .collect();
        let samples = self.filter.process(&pcm).into_iter().map(clamp_to_i16).collect();
        let frame = AudioFrame::new(self.next_seq, self.sample_rate, samples);
        self.next_seq += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        if let Err(e) = self.stream.pause() {
            debug!("failed to pause input stream: {}", e);
        }
    }
}

/// Playback stage: a mono output stream draining a ring buffer that
/// `play_frame` fills.
pub struct Speaker {
    _stream: cpal::Stream,
    producer: HeapProd<f32>,
    scratch: Vec<f32>,
}

impl Speaker {
    fn open(device: &cpal::Device, sample_rate: u32, frame_size: usize) -> Result<Self> {
        let rb = HeapRb::<f32>::new(frame_size * 2);
        let (producer, mut consumer) = rb.split();

        let stream = device
            .build_output_stream(
                &mono_config(sample_rate),
                move |data: &mut [f32], _| {
                    let read = consumer.pop_slice(data);
                    for sample in data.iter_mut().skip(read) {
                        *sample = 0.0;
                    }
                },
                |err| warn!("Output error: {}", err),
                None,
            )
            .context("failed to open output stream")?;
        stream.play().context("failed to start output stream")?;

        Ok(Self {
            _stream: stream,
            producer,
            scratch: Vec::with_capacity(frame_size),
        })
    }

    /// Polls until `done` holds, failing if the ring stops moving.
    fn wait_for(&mut self, mut step: impl FnMut(&mut HeapProd<f32>) -> (bool, bool)) -> Result<(), DeviceError> {
        let mut last_progress = Instant::now();
        loop {
            let (done, progressed) = step(&mut self.producer);
            if done {
                return Ok(());
            }
            if progressed {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(DeviceError::Stream(format!(
                    "output stalled for {} s",
                    STALL_TIMEOUT.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl AudioSink for Speaker {
    fn play_frame(&mut self, frame: &ConvertedAudioFrame) -> Result<(), DeviceError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.extend(frame.samples().iter().map(|&s| f32::from(s) / PCM_SCALE));

        let mut offset = 0;
        let result = self.wait_for(|producer| {
            let pushed = producer.push_slice(&scratch[offset..]);
            offset += pushed;
            (offset == scratch.len(), pushed > 0)
        });
        self.scratch = scratch;
        result
    }

    fn finish(&mut self) -> Result<(), DeviceError> {
        let mut remaining = self.producer.occupied_len();
        self.wait_for(|producer| {
            let now = producer.occupied_len();
            let progressed = now < remaining;
            remaining = now;
            (now == 0, progressed)
        })
    }
}
