//! Stimulus playback for audrex trials
//!
//! Two backends share the [`AudioPlayer`] contract:
//! - a hardware path driven by the output stream's frame clock via `cpal`
//!   (feature: `backend-cpal`)
//! - a wall-clock path used when no output device is available
//!
//! [`select_backend`] looks for a device once and hands back a matching clock/player pair.

pub mod backend;
pub mod error;
pub mod traits;
pub mod wall;

#[cfg(feature = "backend-cpal")]
pub mod hardware;

pub use backend::{ActiveClock, ActivePlayer, Backend, BackendPreference, select_backend};
pub use error::SetupError;
pub use traits::AudioPlayer;
pub use wall::WallPlayer;

#[cfg(feature = "backend-cpal")]
pub use hardware::{AudioClock, HardwarePlayer};
