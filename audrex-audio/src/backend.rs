use audrex_cache::AudioCache;
use audrex_timing::{ClockKind, ClockSource, WallClock};
use tracing::info;

use crate::error::SetupError;
use crate::traits::AudioPlayer;
use crate::wall::WallPlayer;

#[cfg(feature = "backend-cpal")]
use crate::hardware::{AudioClock, HardwarePlayer};

/// Clock chosen for a trial. Callers only go through [`ClockSource`].
#[derive(Debug, Clone)]
pub enum ActiveClock {
    #[cfg(feature = "backend-cpal")]
    Hardware(AudioClock),
    Wall(WallClock),
}

impl ClockSource for ActiveClock {
    fn now_ms(&self) -> f64 {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActiveClock::Hardware(clock) => clock.now_ms(),
            ActiveClock::Wall(clock) => clock.now_ms(),
        }
    }

    fn kind(&self) -> ClockKind {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActiveClock::Hardware(clock) => clock.kind(),
            ActiveClock::Wall(clock) => clock.kind(),
        }
    }

    fn timer_ms(&self) -> f64 {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActiveClock::Hardware(clock) => clock.timer_ms(),
            ActiveClock::Wall(clock) => clock.timer_ms(),
        }
    }
}

/// Player matching the [`ActiveClock`] variant it was selected with.
pub enum ActivePlayer {
    #[cfg(feature = "backend-cpal")]
    Hardware(HardwarePlayer),
    Wall(WallPlayer),
}

impl AudioPlayer for ActivePlayer {
    fn schedule(&mut self, onset_delay_ms: f64) -> Result<f64, SetupError> {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActivePlayer::Hardware(player) => player.schedule(onset_delay_ms),
            ActivePlayer::Wall(player) => player.schedule(onset_delay_ms),
        }
    }

    fn poll_completion(&mut self) -> Option<f64> {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActivePlayer::Hardware(player) => player.poll_completion(),
            ActivePlayer::Wall(player) => player.poll_completion(),
        }
    }

    fn stop(&mut self) {
        match self {
            #[cfg(feature = "backend-cpal")]
            ActivePlayer::Hardware(player) => player.stop(),
            ActivePlayer::Wall(player) => player.stop(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendPreference {
    /// Hardware clock when an output device opens, wall clock otherwise.
    #[default]
    Auto,
    WallClockOnly,
}

/// Clock and player for one trial, always from the same backend.
pub struct Backend {
    pub clock: ActiveClock,
    pub player: ActivePlayer,
}

impl Backend {
    pub fn kind(&self) -> ClockKind {
        self.clock.kind()
    }
}

/// Resolves `stimulus` and looks for an output device once. A missing
/// stimulus or a device that fails to open is fatal; a host without any
/// output device gets the wall-clock pair.
pub fn select_backend(
    cache: &AudioCache,
    stimulus: &str,
    preference: BackendPreference,
) -> Result<Backend, SetupError> {
    let buffer = cache.resolve(stimulus)?;

    #[cfg(feature = "backend-cpal")]
    if preference == BackendPreference::Auto {
        if let Some((clock, player)) = HardwarePlayer::open(buffer.clone())? {
            return Ok(Backend {
                clock: ActiveClock::Hardware(clock),
                player: ActivePlayer::Hardware(player),
            });
        }
    }

    info!(
        stimulus,
        ?preference,
        "no audio output in use, timing trial on the wall clock"
    );
    let clock = WallClock::new();
    Ok(Backend {
        clock: ActiveClock::Wall(clock),
        player: ActivePlayer::Wall(WallPlayer::new(clock, &buffer)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use audrex_cache::{AssetError, AudioBuffer};

    #[test]
    fn unknown_stimulus_is_fatal() {
        let cache = AudioCache::new();
        let err = select_backend(&cache, "missing.wav", BackendPreference::WallClockOnly)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Asset(AssetError::Missing(_))));
    }

    #[test]
    fn wall_preference_yields_wall_pair() {
        let mut cache = AudioCache::new();
        cache.insert("beep", AudioBuffer::silence(20.0, 8_000, 1));
        let mut backend =
            select_backend(&cache, "beep", BackendPreference::WallClockOnly).unwrap();
        assert_eq!(backend.kind(), ClockKind::Wall);
        assert!(matches!(backend.player, ActivePlayer::Wall(_)));

        let onset = backend.player.schedule(backend.kind().onset_delay_ms()).unwrap();
        assert!(onset <= backend.clock.now_ms());
        backend.player.stop();
        backend.player.stop();
        assert_eq!(backend.player.poll_completion(), None);
    }
}
