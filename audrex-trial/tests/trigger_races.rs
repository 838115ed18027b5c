use audrex_audio::WallPlayer;
use audrex_timing::{ClockKind, DeadlineScheduler, ManualClock};
use audrex_trial::{TrialConfig, TrialEvent, TrialStateMachine};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Click(usize),
    Poll,
    EchoCompletion,
}

fn step() -> impl Strategy<Value = (u16, Step)> {
    (
        0u16..600,
        prop_oneof![
            (0usize..3).prop_map(Step::Click),
            Just(Step::Poll),
            Just(Step::EchoCompletion),
        ],
    )
}

fn config() -> impl Strategy<Value = TrialConfig> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::option::of(1u64..3_000),
    )
        .prop_map(|(response_ends, audio_ends, ignore, timeout)| TrialConfig {
            response_ends_trial: response_ends,
            trial_ends_after_audio: audio_ends,
            ignore_responses_during_audio: ignore,
            response_timeout_ms: timeout,
            ..TrialConfig::new("tone.wav", ["a", "b"])
        })
}

proptest! {
    #[test]
    fn triggers_finalize_exactly_once(
        config in config(),
        hardware in any::<bool>(),
        audio_ms in 1.0f64..3_000.0,
        steps in prop::collection::vec(step(), 0..40),
    ) {
        let kind = if hardware { ClockKind::AudioHardware } else { ClockKind::Wall };
        let clock = ManualClock::new(kind);
        let player = WallPlayer::with_duration(clock.clone(), audio_ms);
        let timeout_ms = config.response_timeout_ms;
        let mut trial = TrialStateMachine::start(
            config,
            clock.clone(),
            player,
            DeadlineScheduler::new(),
            Vec::new(),
        )
        .unwrap();

        let mut was_done = false;
        for (delta, step) in steps {
            clock.advance(delta as f64);
            let accepted = match step {
                Step::Click(choice) => trial.handle(TrialEvent::Response { choice }),
                Step::Poll => trial.poll(),
                Step::EchoCompletion => {
                    let at_ms = trial.onset_ms() + audio_ms;
                    trial.handle(TrialEvent::AudioEnded { at_ms })
                }
            };

            if was_done {
                prop_assert!(!accepted);
            }
            prop_assert!(trial.sink().len() <= 1);
            prop_assert_eq!(trial.sink().len() == 1, trial.is_done());
            prop_assert_eq!(trial.finalized_by().is_some(), trial.is_done());
            was_done = trial.is_done();
        }

        clock.advance(10_000.0);
        trial.poll();
        if timeout_ms.is_some() {
            prop_assert!(trial.is_done());
        }

        let results = trial.into_sink();
        prop_assert!(results.len() <= 1);
        for result in results {
            prop_assert_eq!(result.audio_duration.is_some(), result.audio_ended);
            prop_assert_eq!(
                result.rt_from_audio_end.is_some(),
                result.rt.is_some() && result.audio_ended
            );
            prop_assert_eq!(result.rt.is_some(), result.button_pressed.is_some());
            if let (Some(rt), Some(limit)) = (result.rt, timeout_ms) {
                prop_assert!(rt < limit as f64, "response at {} accepted past {} ms window", rt, limit);
            }
            if !hardware {
                prop_assert!(result.rt_audio.is_none());
            } else {
                prop_assert_eq!(result.rt_audio.is_some(), result.rt.is_some());
            }
        }
    }
}
