use std::time::{Duration, Instant};

/// Scheduling slack added on the hardware path so the driver can honor a
/// sample-accurate start.
pub const HARDWARE_ONSET_DELAY_MS: f64 = 100.0;

/// Which backend a clock reading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockKind {
    AudioHardware,
    Wall,
}

impl ClockKind {
    pub fn onset_delay_ms(&self) -> f64 {
        match self {
            ClockKind::AudioHardware => HARDWARE_ONSET_DELAY_MS,
            ClockKind::Wall => 0.0,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, ClockKind::AudioHardware)
    }
}

/// Monotonic millisecond time source for one trial.
pub trait ClockSource {
    fn now_ms(&self) -> f64;
    fn kind(&self) -> ClockKind;

    /// Reading that timeouts are armed and checked against. It must keep
    /// advancing even if `now_ms` stalls, so clocks driven by an output
    /// stream override it with a wall reading.
    fn timer_ms(&self) -> f64 {
        self.now_ms()
    }
}

/// Wall-clock variant, relative to the instant it was created.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    start: Instant,
}

impl ClockSource for WallClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000.0
    }

    fn kind(&self) -> ClockKind {
        ClockKind::Wall
    }
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // SAFETY: `req` outlives the call and a null remainder pointer is allowed.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}
