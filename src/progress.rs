use crate::domain::LookupStatus;

/// Running processed/found tally for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub invalid: usize,
}

impl Tally {
    pub fn record(&mut self, status: LookupStatus) {
        self.processed += 1;
        match status {
            LookupStatus::Found => self.found += 1,
            LookupStatus::NotFound => self.not_found += 1,
        }
    }

    pub fn record_invalid(&mut self) {
        self.processed += 1;
        self.invalid += 1;
    }
}

/// Sink the engine and the batch loop report progress and warnings to.
/// Frontends (CLI, a future GUI) implement this; nothing in the engine talks
/// to a process-wide singleton.
pub trait Progress {
    /// Called once at the start with the number of rows to process (if known).
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// Something degraded (challenge page, timeout); the run continues.
    fn warn(&mut self, _msg: &str) {}

    /// Called at the end, successful or not.
    fn finish(&mut self, _tally: &Tally) {}
}

/// Default sink: forwards everything to the log stack.
pub struct LogProgress;

impl Progress for LogProgress {
    fn begin(&mut self, total: usize) {
        log::info!("Processing {} rows", total);
    }

    fn log(&mut self, msg: &str) {
        log::info!("{}", msg);
    }

    fn warn(&mut self, msg: &str) {
        log::warn!("{}", msg);
    }

    fn finish(&mut self, tally: &Tally) {
        log::info!(
            "Done  |  processed: {}  |  found: {}  |  missed: {}  |  invalid: {}",
            tally.processed,
            tally.found,
            tally.not_found,
            tally.invalid,
        );
    }
}

/// A no-op sink.
pub struct NullProgress;

impl Progress for NullProgress {}
