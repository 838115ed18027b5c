use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BUTTON_HTML: &str = r#"<button class="jspsych-btn">%choice%</button>"#;
const CHOICE_PLACEHOLDER: &str = "%choice%";

/// Markup template for the choice controls: either one template shared by
/// every choice or one template per choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ButtonHtml {
    Shared(String),
    PerChoice(Vec<String>),
}

impl Default for ButtonHtml {
    fn default() -> Self {
        ButtonHtml::Shared(DEFAULT_BUTTON_HTML.to_string())
    }
}

impl ButtonHtml {
    /// One template per choice. A per-choice list whose length disagrees with
    /// `choice_count` is replaced by its first entry replicated.
    pub fn templates(&self, choice_count: usize) -> Vec<&str> {
        match self {
            ButtonHtml::Shared(t) => vec![t.as_str(); choice_count],
            ButtonHtml::PerChoice(list) if list.len() == choice_count => {
                list.iter().map(String::as_str).collect()
            }
            ButtonHtml::PerChoice(list) => {
                warn!(
                    templates = list.len(),
                    choices = choice_count,
                    "button_html length does not match choices, using a shared template"
                );
                let shared = list.first().map_or(DEFAULT_BUTTON_HTML, String::as_str);
                vec![shared; choice_count]
            }
        }
    }

    /// Substitutes every `%choice%` with the matching label.
    pub fn render(&self, choices: &[String]) -> Vec<String> {
        self.templates(choices.len())
            .into_iter()
            .zip(choices)
            .map(|(template, label)| template.replace(CHOICE_PLACEHOLDER, label))
            .collect()
    }
}

/// Drops anything between `<` and `>` and collapses whitespace, leaving the
/// text a participant would read.
pub fn strip_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn shared_template_is_replicated() {
        let html = ButtonHtml::Shared("<b>%choice%</b>".into());
        assert_eq!(
            html.render(&labels(&["yes", "no"])),
            vec!["<b>yes</b>", "<b>no</b>"]
        );
    }

    #[test]
    fn per_choice_templates_are_used_in_order() {
        let html = ButtonHtml::PerChoice(vec!["<i>%choice%</i>".into(), "<u>%choice%</u>".into()]);
        assert_eq!(
            html.render(&labels(&["a", "b"])),
            vec!["<i>a</i>", "<u>b</u>"]
        );
    }

    #[test]
    fn mismatched_template_count_falls_back_to_first() {
        let html = ButtonHtml::PerChoice(vec!["[%choice%]".into()]);
        assert_eq!(
            html.render(&labels(&["a", "b", "c"])),
            vec!["[a]", "[b]", "[c]"]
        );
    }

    #[test]
    fn empty_template_list_falls_back_to_default() {
        let html = ButtonHtml::PerChoice(Vec::new());
        let rendered = html.render(&labels(&["go"]));
        assert_eq!(rendered, vec![r#"<button class="jspsych-btn">go</button>"#]);
    }

    #[test]
    fn placeholder_is_replaced_everywhere() {
        let html = ButtonHtml::Shared("%choice%-%choice%".into());
        assert_eq!(html.render(&labels(&["x"])), vec!["x-x"]);
    }

    #[test]
    fn deserializes_string_or_list() {
        let shared: ButtonHtml = serde_json::from_str(r#""<p>%choice%</p>""#).unwrap();
        assert_eq!(shared, ButtonHtml::Shared("<p>%choice%</p>".into()));
        let list: ButtonHtml = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(list, ButtonHtml::PerChoice(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn strip_markup_keeps_visible_text() {
        assert_eq!(
            strip_markup(r#"<button class="jspsych-btn">Left  ear</button>"#),
            "Left ear"
        );
        assert_eq!(strip_markup("<p>Which?</p><p>Pick one</p>"), "Which? Pick one");
    }
}
