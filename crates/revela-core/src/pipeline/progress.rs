//! Progress reporting and cooperative cancellation.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};

/// Which pass of which operation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extrema,
    Histogram,
    Alignment,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Extrema => "base/leader density",
            Stage::Histogram => "density histogram",
            Stage::Alignment => "channel alignment",
            Stage::Export => "export",
        };
        f.write_str(label)
    }
}

/// One progress tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Frames finished in this stage
    pub done: usize,
    pub total: usize,
    pub message: String,
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards every `interval`-th event, plus the last one of each stage.
pub struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    interval: usize,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, interval: usize) -> Self {
        Self {
            sink,
            interval: interval.max(1),
        }
    }

    pub fn tick(&self, stage: Stage, done: usize, total: usize, message: impl Into<String>) {
        if done % self.interval == 0 || done == total {
            self.sink.report(ProgressEvent {
                stage,
                done,
                total,
                message: message.into(),
            });
        }
    }
}

/// Shared cancellation flag checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reporter_cadence_includes_last() {
        let seen = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| seen.lock().unwrap().push(e.done);
        let reporter = Reporter::new(&sink, 3);
        for done in 1..=7 {
            reporter.tick(Stage::Histogram, done, 7, "");
        }
        assert_eq!(*seen.lock().unwrap(), vec![3, 6, 7]);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(PipelineError::Cancelled)));
    }
}
