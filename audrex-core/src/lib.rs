pub mod phase;
pub mod stimulus;
pub mod trial;

pub use phase::TrialPhase;
pub use stimulus::{ButtonHtml, DEFAULT_BUTTON_HTML, strip_markup};
pub use trial::{ChoiceIndex, TrialResult, sentinel};
