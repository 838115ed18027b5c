use super::config::TrialConfig;
use super::response::ResponseCollector;
use super::sink::TrialSink;
use audrex_audio::{AudioPlayer, SetupError};
use audrex_core::{ChoiceIndex, TrialPhase, TrialResult};
use audrex_timing::{ClockSource, DeadlineScheduler, TimeoutHandle, TimeoutScheduler};
use tracing::{debug, info, trace, warn};

/// Everything that can move a running trial forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialEvent {
    /// A choice control was activated.
    Response { choice: ChoiceIndex },
    /// Playback reached its natural end at `at_ms` on the active clock.
    AudioEnded { at_ms: f64 },
    Timeout(TimeoutHandle),
}

/// The trigger that won the race to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Response,
    AudioEnded,
    Timeout,
}

/// One audio button-response trial. Every trigger arrives through
/// [`TrialStateMachine::handle`], and the result reaches the sink once.
pub struct TrialStateMachine<C, P, S = DeadlineScheduler, K = Vec<TrialResult>>
where
    C: ClockSource,
    P: AudioPlayer,
    S: TimeoutScheduler,
    K: TrialSink,
{
    config: TrialConfig,
    clock: C,
    player: P,
    scheduler: S,
    sink: K,
    phase: TrialPhase,
    collector: ResponseCollector,
    trial_start_ms: f64,
    timer_start_ms: f64,
    onset_ms: f64,
    audio_end_ms: Option<f64>,
    timeout: Option<TimeoutHandle>,
    finalized_by: Option<Trigger>,
}

impl<C, P, S, K> TrialStateMachine<C, P, S, K>
where
    C: ClockSource,
    P: AudioPlayer,
    S: TimeoutScheduler,
    K: TrialSink,
{
    /// Schedules playback, arms the timeout and enters `Running`. A player
    /// that cannot schedule keeps the trial from starting.
    pub fn start(
        config: TrialConfig,
        clock: C,
        mut player: P,
        mut scheduler: S,
        sink: K,
    ) -> Result<Self, SetupError> {
        let kind = clock.kind();
        trace!(phase = ?TrialPhase::Initializing, clock = ?kind, "trial initializing");

        let onset_ms = player.schedule(kind.onset_delay_ms())?;
        let trial_start_ms = clock.now_ms();
        let timer_start_ms = clock.timer_ms();

        let collector = ResponseCollector::new(
            !config.ignore_responses_during_audio,
            trial_start_ms,
            onset_ms,
        );

        let timeout = config
            .response_timeout_ms
            .filter(|ms| *ms > 0)
            .map(|ms| scheduler.schedule(timer_start_ms, ms as f64));

        info!(
            stimulus = %config.stimulus,
            clock = ?kind,
            onset_ms,
            trial_start_ms,
            timeout_ms = ?config.response_timeout_ms,
            "trial running"
        );

        Ok(Self {
            config,
            clock,
            player,
            scheduler,
            sink,
            phase: TrialPhase::Running,
            collector,
            trial_start_ms,
            timer_start_ms,
            onset_ms,
            audio_end_ms: None,
            timeout,
            finalized_by: None,
        })
    }

    /// Single transition function. Returns true when the event was accepted;
    /// events arriving outside `Running` are ignored. A response is only
    /// considered after every trigger already due at the time it arrives.
    pub fn handle(&mut self, event: TrialEvent) -> bool {
        if !self.phase.allows_input() {
            trace!(?event, phase = ?self.phase, "event after trial end ignored");
            return false;
        }
        if let TrialEvent::Response { .. } = event {
            self.settle_due();
        }
        self.dispatch(event)
    }

    /// Turns a pending completion notification and an expired timeout into
    /// events, earliest first. A timeout wins a tie with the completion.
    pub fn poll(&mut self) -> bool {
        if !self.phase.allows_input() {
            return false;
        }
        self.settle_due()
    }

    fn settle_due(&mut self) -> bool {
        let completion = self.player.poll_completion();
        let timeout = self
            .scheduler
            .expired(self.clock.timer_ms())
            .map(|(handle, deadline)| (handle, self.on_trial_clock(deadline)));

        let mut progressed = false;
        match (completion, timeout) {
            (Some(at_ms), Some((handle, due_ms))) if due_ms <= at_ms => {
                progressed |= self.dispatch(TrialEvent::Timeout(handle));
                progressed |= self.dispatch(TrialEvent::AudioEnded { at_ms });
            }
            (completion, timeout) => {
                if let Some(at_ms) = completion {
                    progressed |= self.dispatch(TrialEvent::AudioEnded { at_ms });
                }
                if let Some((handle, _)) = timeout {
                    progressed |= self.dispatch(TrialEvent::Timeout(handle));
                }
            }
        }
        progressed
    }

    fn dispatch(&mut self, event: TrialEvent) -> bool {
        if !self.phase.allows_input() {
            trace!(?event, phase = ?self.phase, "event after trial end ignored");
            return false;
        }
        match event {
            TrialEvent::Response { choice } => self.on_response(choice),
            TrialEvent::AudioEnded { at_ms } => self.on_audio_ended(at_ms),
            TrialEvent::Timeout(handle) => self.on_timeout(handle),
        }
    }

    /// Deadlines are kept on the timer reading; this maps one onto the
    /// trial's clock.
    fn on_trial_clock(&self, timer_ms: f64) -> f64 {
        self.trial_start_ms + (timer_ms - self.timer_start_ms)
    }

    fn on_response(&mut self, choice: ChoiceIndex) -> bool {
        if choice >= self.config.choices.len() {
            warn!(
                choice,
                choices = self.config.choices.len(),
                "response for unknown choice ignored"
            );
            return false;
        }

        let now = self.clock.now_ms();
        if !self.collector.record(choice, now) {
            return false;
        }
        debug!(choice, at_ms = now, "response recorded");

        if self.config.response_ends_trial {
            self.finalize(Trigger::Response);
        }
        true
    }

    fn on_audio_ended(&mut self, at_ms: f64) -> bool {
        if self.audio_end_ms.is_some() {
            trace!(at_ms, "duplicate audio completion ignored");
            return false;
        }
        self.audio_end_ms = Some(at_ms);
        debug!(at_ms, duration_ms = at_ms - self.onset_ms, "audio ended");

        if self.config.ignore_responses_during_audio {
            self.collector.enable();
        }
        if self.config.trial_ends_after_audio {
            self.finalize(Trigger::AudioEnded);
        }
        true
    }

    fn on_timeout(&mut self, handle: TimeoutHandle) -> bool {
        if self.timeout != Some(handle) {
            trace!(?handle, "stale timeout ignored");
            return false;
        }
        self.timeout = None;
        debug!(at_ms = self.clock.now_ms(), "response window elapsed");
        self.finalize(Trigger::Timeout);
        true
    }

    /// Leaves `Running` before doing any work, so a trigger raised while
    /// finalizing finds the guard already closed.
    fn finalize(&mut self, trigger: Trigger) {
        if self.phase != TrialPhase::Running {
            return;
        }
        self.phase = TrialPhase::Finalizing;
        self.finalized_by = Some(trigger);

        self.scheduler.cancel_all();
        self.timeout = None;
        self.player.stop();
        self.collector.disable();

        let result = self.build_result();
        info!(
            ?trigger,
            rt = ?result.rt,
            rt_audio = ?result.rt_audio,
            audio_ended = result.audio_ended,
            button = ?result.button_pressed,
            "trial finished"
        );
        self.sink.finish_trial(result);
        self.phase = TrialPhase::Done;
    }

    /// Derived fields only appear when every reading they need was observed
    /// before finalization. All readings come from the one active clock.
    fn build_result(&self) -> TrialResult {
        let response = self.collector.response();
        let on_hardware = self.clock.kind().is_hardware();

        TrialResult {
            rt: response.map(|r| r.rt_ms),
            rt_audio: response.filter(|_| on_hardware).map(|r| r.rt_onset_ms),
            audio_ended: self.audio_end_ms.is_some(),
            audio_duration: self.audio_end_ms.map(|end| end - self.onset_ms),
            rt_from_audio_end: response
                .zip(self.audio_end_ms)
                .map(|(r, end)| r.at_ms - end),
            stimulus: self.config.stimulus.clone(),
            button_pressed: response.map(|r| r.choice),
            audio_clock: on_hardware,
        }
    }

    /// Returns current phase
    pub fn current_phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether the presentation surface should draw choices as clickable.
    pub fn controls_enabled(&self) -> bool {
        self.phase.allows_input() && self.collector.controls_enabled()
    }

    pub fn button_markup(&self) -> Vec<String> {
        self.config.button_markup()
    }

    pub fn onset_ms(&self) -> f64 {
        self.onset_ms
    }

    pub fn trial_start_ms(&self) -> f64 {
        self.trial_start_ms
    }

    pub fn audio_ended(&self) -> bool {
        self.audio_end_ms.is_some()
    }

    pub fn finalized_by(&self) -> Option<Trigger> {
        self.finalized_by
    }

    /// Earliest armed deadline, for hosts that sleep between polls.
    pub fn next_deadline_ms(&self) -> Option<f64> {
        self.scheduler
            .next_deadline()
            .map(|deadline| self.on_trial_clock(deadline))
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Releases the trial, handing back the sink.
    pub fn into_sink(self) -> K {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audrex_audio::WallPlayer;
    use audrex_timing::{ClockKind, ManualClock};

    type TestTrial = TrialStateMachine<ManualClock, WallPlayer<ManualClock>>;

    fn start(config: TrialConfig, kind: ClockKind, audio_ms: f64) -> (ManualClock, TestTrial) {
        let clock = ManualClock::new(kind);
        let player = WallPlayer::with_duration(clock.clone(), audio_ms);
        let trial = TrialStateMachine::start(
            config,
            clock.clone(),
            player,
            DeadlineScheduler::new(),
            Vec::new(),
        )
        .unwrap();
        (clock, trial)
    }

    #[test]
    fn start_enters_running_with_onset_delay_per_clock() {
        let (_, hw) = start(TrialConfig::new("a", ["x"]), ClockKind::AudioHardware, 500.0);
        assert_eq!(hw.current_phase(), TrialPhase::Running);
        assert_eq!(hw.onset_ms(), 100.0);
        assert_eq!(hw.trial_start_ms(), 0.0);

        let (_, wall) = start(TrialConfig::new("a", ["x"]), ClockKind::Wall, 500.0);
        assert_eq!(wall.onset_ms(), 0.0);
    }

    #[test]
    fn response_ends_trial_by_default() {
        let (clock, mut trial) = start(TrialConfig::new("a", ["x", "y"]), ClockKind::Wall, 5_000.0);
        clock.set(640.0);
        assert!(trial.handle(TrialEvent::Response { choice: 1 }));
        assert!(trial.is_done());
        assert_eq!(trial.finalized_by(), Some(Trigger::Response));

        let results = trial.into_sink();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rt, Some(640.0));
        assert_eq!(results[0].rt_audio, None);
        assert_eq!(results[0].button_pressed, Some(1));
        assert!(!results[0].audio_ended);
    }

    #[test]
    fn out_of_range_choice_is_ignored() {
        let (_, mut trial) = start(TrialConfig::new("a", ["x"]), ClockKind::Wall, 100.0);
        assert!(!trial.handle(TrialEvent::Response { choice: 3 }));
        assert!(trial.controls_enabled());
        assert_eq!(trial.current_phase(), TrialPhase::Running);
    }

    #[test]
    fn response_without_ending_keeps_trial_running_but_disables_controls() {
        let config = TrialConfig {
            response_ends_trial: false,
            ..TrialConfig::new("a", ["x", "y"])
        };
        let (clock, mut trial) = start(config, ClockKind::Wall, 1_000.0);
        clock.set(300.0);
        assert!(trial.handle(TrialEvent::Response { choice: 0 }));
        assert!(!trial.controls_enabled());
        assert!(!trial.handle(TrialEvent::Response { choice: 1 }));
        assert_eq!(trial.current_phase(), TrialPhase::Running);
        assert!(trial.sink().is_empty());
    }

    #[test]
    fn completion_is_recorded_even_when_it_does_not_end_the_trial() {
        let config = TrialConfig::new("a", ["x"]);
        let (clock, mut trial) = start(config, ClockKind::Wall, 400.0);
        clock.set(450.0);
        assert!(trial.poll());
        assert!(trial.audio_ended());
        assert_eq!(trial.current_phase(), TrialPhase::Running);

        clock.set(700.0);
        trial.handle(TrialEvent::Response { choice: 0 });
        let result = &trial.sink()[0];
        assert_eq!(result.audio_duration, Some(400.0));
        assert_eq!(result.rt_from_audio_end, Some(300.0));
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let config = TrialConfig {
            response_ends_trial: false,
            ..TrialConfig::new("a", ["x"])
        };
        let (_, mut trial) = start(config, ClockKind::Wall, 400.0);
        assert!(trial.handle(TrialEvent::AudioEnded { at_ms: 400.0 }));
        assert!(!trial.handle(TrialEvent::AudioEnded { at_ms: 410.0 }));
    }

    #[test]
    fn stale_timeout_handle_is_ignored() {
        let config = TrialConfig {
            response_timeout_ms: Some(1_000),
            ..TrialConfig::new("a", ["x"])
        };
        let (_, mut trial) = start(config, ClockKind::Wall, 5_000.0);
        let mut other = DeadlineScheduler::new();
        other.schedule(0.0, 0.0);
        let foreign = other.schedule(0.0, 0.0);
        assert!(!trial.handle(TrialEvent::Timeout(foreign)));
        assert_eq!(trial.current_phase(), TrialPhase::Running);
    }

    #[test]
    fn finalizing_stops_playback_and_clears_deadlines() {
        let config = TrialConfig {
            response_timeout_ms: Some(3_000),
            ..TrialConfig::new("a", ["x"])
        };
        let (clock, mut trial) = start(config, ClockKind::Wall, 1_000.0);
        assert_eq!(trial.next_deadline_ms(), Some(3_000.0));
        clock.set(200.0);
        trial.handle(TrialEvent::Response { choice: 0 });
        assert_eq!(trial.next_deadline_ms(), None);

        clock.set(5_000.0);
        assert!(!trial.poll());
        assert!(!trial.audio_ended());
        assert_eq!(trial.sink().len(), 1);
    }
}
