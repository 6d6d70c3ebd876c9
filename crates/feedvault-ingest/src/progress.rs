//! Progress channel between a run and its single consumer
//!
//! The stream carries percentages in non-decreasing order and ends with
//! exactly one [`ProgressEvent::Finished`].

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", content = "percent", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Percentage complete, 0-100, two decimals
    Progress(f64),
    /// End of stream
    Finished,
}

/// `processed / total * 100`, rounded to two decimals.
pub fn percent_complete(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = processed.min(total) as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Producer half, owned by the orchestrator.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last: f64,
    finished: bool,
}

/// Consumer half.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    done: bool,
}

pub fn channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            last: 0.0,
            finished: false,
        },
        ProgressStream { rx, done: false },
    )
}

impl ProgressSender {
    /// Emit the percentage for `processed` of `total` files.
    pub fn report(&mut self, processed: usize, total: usize) -> f64 {
        let percent = percent_complete(processed, total);
        self.emit(percent)
    }

    /// Emit `percent`, clamped to [0, 100] and never below the last value sent.
    pub fn emit(&mut self, percent: f64) -> f64 {
        let percent = if percent.is_nan() { self.last } else { percent.clamp(0.0, 100.0) };
        let percent = percent.max(self.last);
        self.last = percent;
        self.send(ProgressEvent::Progress(percent));
        percent
    }

    /// Close the stream.
    pub fn finish(mut self) {
        self.finish_inner();
    }

    fn finish_inner(&mut self) {
        if !self.finished {
            self.finished = true;
            self.send(ProgressEvent::Finished);
        }
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!(?event, "Progress consumer gone; dropping event");
        }
    }
}

impl Drop for ProgressSender {
    fn drop(&mut self) {
        // A run that panics or is aborted still terminates the stream.
        self.finish_inner();
    }
}

impl ProgressStream {
    /// Next event; `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(ProgressEvent::Finished) | None => {
                self.done = true;
                Some(ProgressEvent::Finished)
            },
            Some(event) => Some(event),
        }
    }

    /// Drain the stream, returning every event including the sentinel.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}
