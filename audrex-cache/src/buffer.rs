use std::sync::Arc;

/// Decoded audio ready for playback: interleaved `f32` frames.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }

    /// Silent buffer lasting `duration_ms`.
    pub fn silence(duration_ms: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration_ms.max(0.0) / 1_000.0 * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels.max(1) as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1_000.0 / self.sample_rate as f64
    }

    /// Sample for `channel` at `frame`; out-of-range reads are silent and
    /// channels beyond the source are folded onto the last one.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        let channel = channel.min(channels - 1);
        self.samples
            .get(frame * channels + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_frame_count() {
        let buffer = AudioBuffer::new(vec![0.0; 44_100 * 2], 44_100, 2);
        assert_eq!(buffer.frames(), 44_100);
        assert_eq!(buffer.duration_ms(), 1_000.0);
    }

    #[test]
    fn silence_has_requested_length() {
        let buffer = AudioBuffer::silence(1500.0, 48_000, 1);
        assert_eq!(buffer.frames(), 72_000);
        assert!(buffer.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mono_source_feeds_every_output_channel() {
        let buffer = AudioBuffer::new(vec![0.25, 0.5], 8_000, 1);
        assert_eq!(buffer.sample(1, 0), 0.5);
        assert_eq!(buffer.sample(1, 1), 0.5);
        assert_eq!(buffer.sample(7, 0), 0.0);
    }
}
