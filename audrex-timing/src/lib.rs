pub mod clock;
pub mod manual;
pub mod scheduler;

pub use clock::{ClockKind, ClockSource, WallClock, HARDWARE_ONSET_DELAY_MS};
pub use manual::ManualClock;
pub use scheduler::{DeadlineScheduler, TimeoutHandle, TimeoutScheduler};
