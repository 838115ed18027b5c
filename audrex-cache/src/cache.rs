use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use string_cache::DefaultAtom as Atom;
use thiserror::Error;
use tracing::{debug, info};

use crate::buffer::AudioBuffer;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("stimulus `{0}` has not been preloaded")]
    Missing(String),
    #[error("failed to decode `{path}`: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("`{0}` contains no audio frames")]
    Empty(PathBuf),
}

/// Decoded stimuli keyed by their interned identifier.
#[derive(Debug, Default)]
pub struct AudioCache {
    entries: HashMap<Atom, AudioBuffer>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the WAV file at `path` and stores it under `id`.
    pub fn preload(&mut self, id: &str, path: impl AsRef<Path>) -> Result<&AudioBuffer, AssetError> {
        let path = path.as_ref();
        let buffer = decode_wav(path)?;
        info!(
            stimulus = id,
            path = %path.display(),
            duration_ms = buffer.duration_ms(),
            "stimulus preloaded"
        );
        Ok(self.insert(id, buffer))
    }

    pub fn insert(&mut self, id: &str, buffer: AudioBuffer) -> &AudioBuffer {
        let atom = Atom::from(id);
        self.entries.insert(atom.clone(), buffer);
        &self.entries[&atom]
    }

    /// Shares the decoded samples; the clone is cheap.
    pub fn resolve(&self, id: &str) -> Result<AudioBuffer, AssetError> {
        let buffer = self
            .entries
            .get(&Atom::from(id))
            .cloned()
            .ok_or_else(|| AssetError::Missing(id.to_string()))?;
        debug!(stimulus = id, "stimulus resolved");
        Ok(buffer)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&Atom::from(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_wav(path: &Path) -> Result<AudioBuffer, AssetError> {
    let decode_err = |source: hound::Error| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    if samples.is_empty() {
        return Err(AssetError::Empty(path.to_path_buf()));
    }
    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_tone(path: &Path, frames: usize, sample_rate: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = if i % 2 == 0 { i16::MAX / 2 } else { -(i16::MAX / 2) };
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn preload_decodes_and_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 16_000, 16_000);

        let mut cache = AudioCache::new();
        cache.preload("tone", &path).unwrap();
        let buffer = cache.resolve("tone").unwrap();
        assert_eq!(buffer.duration_ms(), 1_000.0);
        assert!((buffer.sample(0, 0) - 0.5).abs() < 1e-3);
        assert!(cache.contains("tone"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_stimulus_is_an_error() {
        let cache = AudioCache::new();
        assert!(matches!(cache.resolve("nope"), Err(AssetError::Missing(id)) if id == "nope"));
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        let mut cache = AudioCache::new();
        assert!(matches!(
            cache.preload("broken", &path),
            Err(AssetError::Decode { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_tone(&path, 0, 8_000);
        let mut cache = AudioCache::new();
        assert!(matches!(cache.preload("empty", &path), Err(AssetError::Empty(_))));
    }
}
