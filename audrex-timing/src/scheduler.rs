use tracing::trace;

/// Identifies one armed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(u64);

/// Deadline registry polled by the host loop. Expired deadlines are handed
/// back as handles instead of invoking callbacks.
pub trait TimeoutScheduler {
    fn schedule(&mut self, now_ms: f64, delay_ms: f64) -> TimeoutHandle;
    /// Returns false when the handle already fired or was cancelled.
    fn cancel(&mut self, handle: TimeoutHandle) -> bool;
    fn cancel_all(&mut self);
    /// Pops the earliest deadline that is due at `now_ms`, along with the
    /// time it was due.
    fn expired(&mut self, now_ms: f64) -> Option<(TimeoutHandle, f64)>;
    fn next_deadline(&self) -> Option<f64>;
}

#[derive(Debug, Default)]
pub struct DeadlineScheduler {
    next_id: u64,
    pending: Vec<(TimeoutHandle, f64)>,
}

impl DeadlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeoutScheduler for DeadlineScheduler {
    fn schedule(&mut self, now_ms: f64, delay_ms: f64) -> TimeoutHandle {
        let handle = TimeoutHandle(self.next_id);
        self.next_id += 1;
        let deadline = now_ms + delay_ms.max(0.0);
        trace!(?handle, deadline, "timeout armed");
        self.pending.push((handle, deadline));
        handle
    }

    fn cancel(&mut self, handle: TimeoutHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(h, _)| *h != handle);
        before != self.pending.len()
    }

    fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            trace!(count = self.pending.len(), "timeouts cleared");
        }
        self.pending.clear();
    }

    fn expired(&mut self, now_ms: f64) -> Option<(TimeoutHandle, f64)> {
        let (index, _) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (_, deadline))| *deadline <= now_ms)
            .min_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))?;
        Some(self.pending.remove(index))
    }

    fn next_deadline(&self) -> Option<f64> {
        self.pending
            .iter()
            .map(|(_, deadline)| *deadline)
            .min_by(f64::total_cmp)
    }
}
