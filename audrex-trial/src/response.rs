use audrex_core::ChoiceIndex;
use tracing::trace;

/// The first accepted response of a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseRecord {
    pub choice: ChoiceIndex,
    /// Raw clock reading when the response was accepted.
    pub at_ms: f64,
    /// Measured from trial start.
    pub rt_ms: f64,
    /// Measured from audio onset.
    pub rt_onset_ms: f64,
}

/// Per-trial gate for choice inputs. Accepts one response; everything after
/// it, or while disabled, is dropped.
#[derive(Debug, Clone)]
pub struct ResponseCollector {
    enabled: bool,
    trial_start_ms: f64,
    onset_ms: f64,
    record: Option<ResponseRecord>,
}

impl ResponseCollector {
    pub fn new(enabled: bool, trial_start_ms: f64, onset_ms: f64) -> Self {
        Self {
            enabled,
            trial_start_ms,
            onset_ms,
            record: None,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether choice controls should be drawn as clickable. Turns false for
    /// good once a response is in, even if the trial keeps running.
    pub fn controls_enabled(&self) -> bool {
        self.enabled && self.record.is_none()
    }

    /// Returns false and changes nothing when a response already exists or
    /// collection is disabled.
    pub fn record(&mut self, choice: ChoiceIndex, at_ms: f64) -> bool {
        if self.record.is_some() || !self.enabled {
            trace!(choice, at_ms, enabled = self.enabled, "response dropped");
            return false;
        }
        self.record = Some(ResponseRecord {
            choice,
            at_ms,
            rt_ms: at_ms - self.trial_start_ms,
            rt_onset_ms: at_ms - self.onset_ms,
        });
        self.enabled = false;
        true
    }

    pub fn response(&self) -> Option<&ResponseRecord> {
        self.record.as_ref()
    }
}
