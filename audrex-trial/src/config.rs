use audrex_core::ButtonHtml;
use serde::{Deserialize, Serialize};

/// Parameters of one audio button-response trial. Field names follow the
/// jsPsych plugin so existing timelines deserialize unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub stimulus: String,
    pub choices: Vec<String>,
    pub button_html: ButtonHtml,
    pub prompt: String,
    /// `None` waits for a response forever. On the wire any value `<= 0`
    /// (conventionally -1) means the same.
    #[serde(rename = "timing_response", with = "timeout_ms")]
    pub response_timeout_ms: Option<u64>,
    pub response_ends_trial: bool,
    pub trial_ends_after_audio: bool,
    pub ignore_responses_during_audio: bool,
    /// Button spacing in pixels.
    pub margin_vertical: f32,
    pub margin_horizontal: f32,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            stimulus: String::new(),
            choices: vec![" ".to_string()],
            button_html: ButtonHtml::default(),
            prompt: String::new(),
            response_timeout_ms: None,
            response_ends_trial: true,
            trial_ends_after_audio: false,
            ignore_responses_during_audio: false,
            margin_vertical: 0.0,
            margin_horizontal: 8.0,
        }
    }
}

impl TrialConfig {
    pub fn new<I, L>(stimulus: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            stimulus: stimulus.into(),
            choices: choices.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Markup for each choice with `%choice%` filled in.
    pub fn button_markup(&self) -> Vec<String> {
        self.button_html.render(&self.choices)
    }
}

mod timeout_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ms) => serializer.serialize_u64(*ms),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(raw.filter(|ms| *ms > 0.0).map(|ms| ms.round() as u64))
    }
}
