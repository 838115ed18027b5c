use serde::{Deserialize, Deserializer, Serialize};

pub type ChoiceIndex = usize;

/// Data handed to the host when a trial finalizes. Every time is in
/// milliseconds on the clock that was active for the trial.
///
/// Absent values are written as `-1`. Reading a record back, presence is
/// taken from `button_pressed`, `audio_ended` and `audio_clock` rather than
/// from the number, so a real `rt_from_audio_end` of -1 ms survives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    /// Response time measured from trial start.
    #[serde(serialize_with = "sentinel::serialize")]
    pub rt: Option<f64>,
    /// Response time measured from audio onset; only reported on the
    /// hardware audio clock.
    #[serde(serialize_with = "sentinel::serialize")]
    pub rt_audio: Option<f64>,
    pub audio_ended: bool,
    #[serde(serialize_with = "sentinel::serialize")]
    pub audio_duration: Option<f64>,
    #[serde(serialize_with = "sentinel::serialize")]
    pub rt_from_audio_end: Option<f64>,
    pub stimulus: String,
    #[serde(with = "sentinel")]
    pub button_pressed: Option<ChoiceIndex>,
    /// True when the times were read from the audio hardware clock.
    pub audio_clock: bool,
}

#[derive(Deserialize)]
struct WireResult {
    rt: f64,
    rt_audio: f64,
    audio_ended: bool,
    audio_duration: f64,
    rt_from_audio_end: f64,
    stimulus: String,
    #[serde(with = "sentinel")]
    button_pressed: Option<ChoiceIndex>,
    /// Missing in plain jsPsych records.
    #[serde(default)]
    audio_clock: Option<bool>,
}

impl From<WireResult> for TrialResult {
    fn from(wire: WireResult) -> Self {
        let responded = wire.button_pressed.is_some();
        let audio_clock = wire
            .audio_clock
            .unwrap_or(wire.rt_audio != sentinel::SENTINEL as f64);
        Self {
            rt: responded.then_some(wire.rt),
            rt_audio: (responded && audio_clock).then_some(wire.rt_audio),
            audio_ended: wire.audio_ended,
            audio_duration: wire.audio_ended.then_some(wire.audio_duration),
            rt_from_audio_end: (responded && wire.audio_ended).then_some(wire.rt_from_audio_end),
            stimulus: wire.stimulus,
            button_pressed: wire.button_pressed,
            audio_clock,
        }
    }
}

impl<'de> Deserialize<'de> for TrialResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireResult::deserialize(deserializer).map(Self::from)
    }
}

/// Serializes `None` as `-1` so results line up with jsPsych trial data.
pub mod sentinel {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub const SENTINEL: i64 = -1;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_i64(SENTINEL),
        }
    }

    /// Any negative index reads as "no choice".
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Ok(usize::try_from(raw).ok())
    }
}
