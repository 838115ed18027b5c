use audrex_core::TrialResult;

/// Receives the single result a trial produces.
pub trait TrialSink {
    fn finish_trial(&mut self, result: TrialResult);
}

impl TrialSink for Vec<TrialResult> {
    fn finish_trial(&mut self, result: TrialResult) {
        self.push(result);
    }
}

impl<K: TrialSink + ?Sized> TrialSink for &mut K {
    fn finish_trial(&mut self, result: TrialResult) {
        (**self).finish_trial(result);
    }
}
