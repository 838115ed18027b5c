use crate::error::SetupError;

/// Playback of one decoded stimulus.
pub trait AudioPlayer {
    /// Starts playback `onset_delay_ms` from now and returns the onset on the
    /// active clock. The value is known before sound is audible.
    fn schedule(&mut self, onset_delay_ms: f64) -> Result<f64, SetupError>;

    /// Clock reading at which playback ran to its natural end. Yields at most
    /// once and never after [`AudioPlayer::stop`].
    fn poll_completion(&mut self) -> Option<f64>;

    /// Halts playback and detaches the completion notification. Calling it
    /// again, before scheduling or after completion is harmless.
    fn stop(&mut self);
}
