use audrex_cache::AudioBuffer;
use audrex_timing::{ClockSource, WallClock};
use tracing::{debug, trace};

use crate::error::SetupError;
use crate::traits::AudioPlayer;

/// Playback element timed on a clock rather than an output stream. Used when
/// no audio device exists: it starts immediately and reports completion once
/// the stimulus duration has elapsed.
#[derive(Debug, Clone)]
pub struct WallPlayer<C: ClockSource = WallClock> {
    clock: C,
    duration_ms: f64,
    onset_ms: Option<f64>,
    stopped: bool,
    delivered: bool,
}

impl<C: ClockSource> WallPlayer<C> {
    pub fn new(clock: C, buffer: &AudioBuffer) -> Self {
        Self::with_duration(clock, buffer.duration_ms())
    }

    pub fn with_duration(clock: C, duration_ms: f64) -> Self {
        Self {
            clock,
            duration_ms,
            onset_ms: None,
            stopped: false,
            delivered: false,
        }
    }
}

impl<C: ClockSource> AudioPlayer for WallPlayer<C> {
    fn schedule(&mut self, onset_delay_ms: f64) -> Result<f64, SetupError> {
        if self.onset_ms.is_some() {
            return Err(SetupError::AlreadyScheduled);
        }
        let onset = self.clock.now_ms() + onset_delay_ms.max(0.0);
        debug!(onset_ms = onset, duration_ms = self.duration_ms, "wall-clock playback started");
        self.onset_ms = Some(onset);
        Ok(onset)
    }

    fn poll_completion(&mut self) -> Option<f64> {
        if self.stopped || self.delivered {
            return None;
        }
        let end = self.onset_ms? + self.duration_ms;
        if self.clock.now_ms() < end {
            return None;
        }
        self.delivered = true;
        Some(end)
    }

    fn stop(&mut self) {
        if !self.stopped {
            trace!("wall-clock playback stopped");
        }
        self.stopped = true;
    }
}
