use std::cell::Cell;
use std::rc::Rc;

use crate::clock::{ClockKind, ClockSource};

/// Clock that only moves when told to. Clones share the same reading, so a
/// simulated player and the trial that owns it observe one timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
    frozen_at: Rc<Cell<Option<f64>>>,
    kind: ClockKind,
}

impl ManualClock {
    pub fn new(kind: ClockKind) -> Self {
        Self {
            now: Rc::new(Cell::new(0.0)),
            frozen_at: Rc::new(Cell::new(None)),
            kind,
        }
    }

    pub fn set(&self, ms: f64) {
        debug_assert!(ms >= self.now.get(), "manual clock moved backwards");
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.set(self.now.get() + ms);
    }

    /// Stops `now_ms` at its current reading while `timer_ms` keeps following
    /// `set`/`advance`, like a stream clock whose callbacks stopped.
    pub fn freeze(&self) {
        self.frozen_at.set(Some(self.now.get()));
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> f64 {
        self.frozen_at.get().unwrap_or(self.now.get())
    }

    fn kind(&self) -> ClockKind {
        self.kind
    }

    fn timer_ms(&self) -> f64 {
        self.now.get()
    }
}
