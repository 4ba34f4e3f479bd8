//! Progress reporting and cooperative cancellation.

/// Decision returned by the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueOrAbort {
    Continue,
    Abort,
}

/// Synchronous progress callback: `(current, total, message)`.
pub type ProgressCallback<'a> = dyn FnMut(u64, u64, &str) -> ContinueOrAbort + 'a;

/// Counts phase steps and forwards them to the callback.
///
/// Reporting is synchronous and happens at phase boundaries only; the
/// callback's sole observable effect on the pipeline is the abort
/// decision.
pub struct ProgressHandler<'a> {
    callback: Option<&'a mut ProgressCallback<'a>>,
    current: u64,
    total: u64,
}

impl<'a> ProgressHandler<'a> {
    pub fn new(callback: Option<&'a mut ProgressCallback<'a>>) -> Self {
        Self {
            callback,
            current: 0,
            total: 0,
        }
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Reports one step. Returns true if the run should abort.
    pub fn report(&mut self, message: &str) -> bool {
        self.report_increment(message, 1)
    }

    /// Reports a step worth several units of the total.
    pub fn report_increment(&mut self, message: &str, steps: u64) -> bool {
        self.current = (self.current + steps).min(self.total);
        tracing::info!(
            current = self.current,
            total = self.total,
            "{message}"
        );
        match &mut self.callback {
            Some(callback) => {
                matches!(callback(self.current, self.total, message), ContinueOrAbort::Abort)
            }
            None => false,
        }
    }

    /// Final report filling the bar to the total.
    pub fn report_finish(&mut self) {
        self.current = self.total;
        if let Some(callback) = &mut self.callback {
            callback(self.current, self.total, "Done");
        }
    }
}
