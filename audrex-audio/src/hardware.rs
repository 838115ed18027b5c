//! Output-stream backed playback using cpal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use audrex_cache::AudioBuffer;
use audrex_timing::{ClockKind, ClockSource, WallClock};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info, trace};

use crate::error::SetupError;
use crate::traits::AudioPlayer;

const NOT_SCHEDULED: u64 = u64::MAX;

/// State shared between the host thread and the audio callback.
#[derive(Debug)]
struct StreamState {
    frames_elapsed: AtomicU64,
    onset_frame: AtomicU64,
    stopped: AtomicBool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            frames_elapsed: AtomicU64::new(0),
            onset_frame: AtomicU64::new(NOT_SCHEDULED),
            stopped: AtomicBool::new(false),
        }
    }
}

/// Free-running clock of the output stream: frames rendered so far,
/// expressed in milliseconds. Timeouts run on a wall clock started with the
/// stream, since the frame count freezes if the device stops calling back.
#[derive(Debug, Clone)]
pub struct AudioClock {
    state: Arc<StreamState>,
    sample_rate: u32,
    timer: WallClock,
}

impl AudioClock {
    fn new(state: Arc<StreamState>, sample_rate: u32) -> Self {
        Self {
            state,
            sample_rate: sample_rate.max(1),
            timer: WallClock::new(),
        }
    }

    fn frames_to_ms(&self, frames: u64) -> f64 {
        frames as f64 * 1_000.0 / self.sample_rate as f64
    }

    fn ms_to_frames(&self, ms: f64) -> u64 {
        (ms.max(0.0) * self.sample_rate as f64 / 1_000.0).round() as u64
    }
}

impl ClockSource for AudioClock {
    fn now_ms(&self) -> f64 {
        self.frames_to_ms(self.state.frames_elapsed.load(Ordering::Acquire))
    }

    fn kind(&self) -> ClockKind {
        ClockKind::AudioHardware
    }

    fn timer_ms(&self) -> f64 {
        self.timer.now_ms()
    }
}

/// Fills output blocks from the stimulus, starting at the scheduled onset
/// frame, and reports the frame where the stimulus ran out.
struct StreamRenderer {
    buffer: AudioBuffer,
    ratio: f64,
    output_frames: u64,
    state: Arc<StreamState>,
    completion: Sender<u64>,
    ended: bool,
}

impl StreamRenderer {
    fn new(
        buffer: AudioBuffer,
        output_rate: u32,
        state: Arc<StreamState>,
        completion: Sender<u64>,
    ) -> Self {
        let ratio = buffer.sample_rate() as f64 / output_rate.max(1) as f64;
        let output_frames = (buffer.frames() as f64 / ratio).ceil() as u64;
        Self {
            buffer,
            ratio,
            output_frames,
            state,
            completion,
            ended: false,
        }
    }

    fn render<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        let start = self.state.frames_elapsed.load(Ordering::Acquire);
        let onset = self.state.onset_frame.load(Ordering::Acquire);
        let stopped = self.state.stopped.load(Ordering::Acquire);

        let mut frames = 0u64;
        for frame in data.chunks_mut(channels.max(1)) {
            let now = start + frames;
            frames += 1;

            let position = if stopped || self.ended || onset == NOT_SCHEDULED || now < onset {
                None
            } else {
                Some(now - onset)
            };

            match position {
                Some(p) if p < self.output_frames => {
                    let source = (p as f64 * self.ratio) as usize;
                    for (channel, sample) in frame.iter_mut().enumerate() {
                        *sample = T::from_sample(self.buffer.sample(source, channel));
                    }
                }
                Some(_) => {
                    silence(frame);
                    self.ended = true;
                    // Bounded(1) and sent once; a dropped receiver means the
                    // player was stopped.
                    let _ = self.completion.try_send(onset + self.output_frames);
                }
                None => silence(frame),
            }
        }

        self.state
            .frames_elapsed
            .store(start + frames, Ordering::Release);
    }
}

fn silence<T: Sample + FromSample<f32>>(frame: &mut [T]) {
    for sample in frame.iter_mut() {
        *sample = T::from_sample(0.0f32);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: StreamRenderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data, channels),
        |err| error!("audio output stream error: {}", err),
        None,
    )
}

/// Plays one stimulus on the default output device.
pub struct HardwarePlayer {
    _stream: cpal::Stream,
    clock: AudioClock,
    completion: Option<Receiver<u64>>,
    scheduled: bool,
}

impl HardwarePlayer {
    /// Opens the default output device with `buffer` loaded. `Ok(None)` means
    /// the host has no output device; any failure after a device was found
    /// is a setup error.
    pub fn open(buffer: AudioBuffer) -> Result<Option<(AudioClock, HardwarePlayer)>, SetupError> {
        let host = cpal::default_host();
        let Some(device) = host.default_output_device() else {
            debug!(host = ?host.id(), "no default output device");
            return Ok(None);
        };

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;

        let state = Arc::new(StreamState::new());
        let (tx, rx) = channel::bounded(1);
        let renderer = StreamRenderer::new(buffer, sample_rate, Arc::clone(&state), tx);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
            other => return Err(SetupError::SampleFormat(other)),
        };
        stream.play()?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "hardware audio clock running"
        );

        let clock = AudioClock::new(state, sample_rate);
        let player = HardwarePlayer {
            _stream: stream,
            clock: clock.clone(),
            completion: Some(rx),
            scheduled: false,
        };
        Ok(Some((clock, player)))
    }
}

impl AudioPlayer for HardwarePlayer {
    fn schedule(&mut self, onset_delay_ms: f64) -> Result<f64, SetupError> {
        if self.scheduled {
            return Err(SetupError::AlreadyScheduled);
        }
        let now = self.clock.state.frames_elapsed.load(Ordering::Acquire);
        let onset = now + self.clock.ms_to_frames(onset_delay_ms);
        self.clock.state.onset_frame.store(onset, Ordering::Release);
        self.scheduled = true;

        let onset_ms = self.clock.frames_to_ms(onset);
        debug!(onset_ms, onset_frame = onset, "hardware playback scheduled");
        Ok(onset_ms)
    }

    fn poll_completion(&mut self) -> Option<f64> {
        let end = self.completion.as_ref()?.try_recv().ok()?;
        self.completion = None;
        Some(self.clock.frames_to_ms(end))
    }

    fn stop(&mut self) {
        if self.completion.take().is_some() {
            trace!("hardware playback stopped");
        }
        self.clock.state.stopped.store(true, Ordering::Release);
    }
}
