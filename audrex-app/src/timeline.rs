use anyhow::{Context, Result, bail};
use audrex_cache::AudioCache;
use audrex_trial::TrialConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A run of trials plus the audio files they refer to.
///
/// ```json
/// {
///   "stimuli": { "tone": "sounds/tone.wav" },
///   "trials": [{ "stimulus": "tone", "choices": ["low", "high"] }]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Timeline {
    /// Stimulus id to WAV path, relative paths resolved against the
    /// timeline file.
    #[serde(default)]
    pub stimuli: BTreeMap<String, PathBuf>,
    pub trials: Vec<TrialConfig>,
}

impl Timeline {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading timeline {}", path.display()))?;
        let mut timeline: Timeline = serde_json::from_str(&text)
            .with_context(|| format!("parsing timeline {}", path.display()))?;

        if let Some(base) = path.parent() {
            for file in timeline.stimuli.values_mut() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        timeline.validate()?;
        Ok(timeline)
    }

    fn validate(&self) -> Result<()> {
        if self.trials.is_empty() {
            bail!("timeline has no trials");
        }
        for (i, trial) in self.trials.iter().enumerate() {
            if !self.stimuli.contains_key(&trial.stimulus) {
                bail!("trial {i} plays unknown stimulus {:?}", trial.stimulus);
            }
        }
        Ok(())
    }

    /// Decodes every stimulus up front so no trial starts on a cold cache.
    pub fn preload(&self) -> Result<AudioCache> {
        let mut cache = AudioCache::new();
        for (id, file) in &self.stimuli {
            let buffer = cache.preload(id, file)?;
            debug!(id, path = %file.display(), duration_ms = buffer.duration_ms(), "stimulus decoded");
        }
        info!(stimuli = cache.len(), trials = self.trials.len(), "timeline loaded");
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn relative_stimulus_paths_follow_the_timeline_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "run.json",
            r#"{
                "stimuli": { "tone": "tone.wav" },
                "trials": [
                    { "stimulus": "tone", "choices": ["a", "b"], "timing_response": 1500 },
                    { "stimulus": "tone", "trial_ends_after_audio": true }
                ]
            }"#,
        );

        let timeline = Timeline::load(&path).unwrap();
        assert_eq!(timeline.stimuli["tone"], dir.path().join("tone.wav"));
        assert_eq!(timeline.trials.len(), 2);
        assert_eq!(timeline.trials[0].response_timeout_ms, Some(1500));
        assert_eq!(timeline.trials[1].choices, vec![" ".to_string()]);
        assert!(timeline.trials[1].trial_ends_after_audio);
    }

    #[test]
    fn unknown_stimulus_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "run.json",
            r#"{ "stimuli": {}, "trials": [{ "stimulus": "nope" }] }"#,
        );
        let err = Timeline::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unknown stimulus"));
    }

    #[test]
    fn missing_wav_fails_preload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "run.json",
            r#"{ "stimuli": { "tone": "absent.wav" }, "trials": [{ "stimulus": "tone" }] }"#,
        );
        let timeline = Timeline::load(&path).unwrap();
        assert!(timeline.preload().is_err());
    }
}
