use audrex_cache::AssetError;
use thiserror::Error;

/// Failures that keep a trial from reaching `Running`.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("playback was already scheduled")]
    AlreadyScheduled,
    #[cfg(feature = "backend-cpal")]
    #[error("audio output config unavailable: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[cfg(feature = "backend-cpal")]
    #[error("audio output stream could not be built: {0}")]
    Stream(#[from] cpal::BuildStreamError),
    #[cfg(feature = "backend-cpal")]
    #[error("audio output stream could not start: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[cfg(feature = "backend-cpal")]
    #[error("unsupported output sample format {0:?}")]
    SampleFormat(cpal::SampleFormat),
}
