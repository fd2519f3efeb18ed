// THEORY:
// Progress is observational only. A run reports a fraction of the expected
// frame count when both the frame count and the frame rate are usable;
// otherwise every update, the final one included, goes through
// `report_unavailable` so no observer ever sees a made-up percentage.
// `ProgressBus` keeps just the latest update on a `watch` channel.

use tokio::sync::watch;

/// Observes a run's progress. Purely observational: implementations must not
/// block for long, and nothing they do can stop the run.
pub trait ProgressSink: Send + Sync {
    /// `fraction` is in `[0, 1]`.
    fn report(&self, fraction: f32, message: &str);

    /// Progress cannot be expressed as a fraction (unknown frame count or
    /// frame rate). The default forwards the message at zero progress.
    fn report_unavailable(&self, message: &str) {
        self.report(0.0, message);
    }
}

/// Writes progress to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f32, message: &str) {
        log::info!("[{:>5.1}%] {}", fraction * 100.0, message);
    }

    fn report_unavailable(&self, message: &str) {
        log::warn!("[  n/a ] {}", message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Idle,
    Fraction { fraction: f32, message: String },
    Unavailable { message: String },
}

/// Publishes the latest progress on a `watch` channel so any number of
/// observers (a UI, a status endpoint) can sample it without slowing the run.
#[derive(Clone)]
pub struct ProgressBus {
    tx: watch::Sender<ProgressUpdate>,
}

impl ProgressBus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressUpdate::Idle);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> ProgressUpdate {
        self.tx.borrow().clone()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBus {
    fn report(&self, fraction: f32, message: &str) {
        self.tx.send_replace(ProgressUpdate::Fraction { fraction, message: message.to_string() });
    }

    fn report_unavailable(&self, message: &str) {
        self.tx.send_replace(ProgressUpdate::Unavailable { message: message.to_string() });
    }
}
