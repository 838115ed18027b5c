pub mod config;
pub mod response;
pub mod sink;
pub mod state;

pub use config::TrialConfig;
pub use response::{ResponseCollector, ResponseRecord};
pub use sink::TrialSink;
pub use state::{TrialEvent, TrialStateMachine, Trigger};
