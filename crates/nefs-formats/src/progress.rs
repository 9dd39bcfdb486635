//! Cooperative cancellation and weighted progress reporting
//!
//! Long operations split their work into nested tasks, each claiming a
//! fraction (weight) of its parent. Reports go to a caller-supplied
//! [`ProgressSink`] as an overall fraction in `0.0..=1.0`. Cancellation is
//! only checked at table, chunk and item boundaries.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{NefsError, NefsResult};

/// Receives progress updates
pub trait ProgressSink: Send + Sync {
    /// Called with the overall completed fraction and the current task message
    fn report(&self, fraction: f64, message: &str);
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return [`NefsError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> NefsResult<()> {
        if self.is_cancelled() {
            Err(NefsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    start: f64,
    span: f64,
    completed: f64,
}

/// Progress tracker with nested weighted tasks
#[derive(Clone)]
pub struct NefsProgress {
    token: CancellationToken,
    sink: Option<Arc<dyn ProgressSink>>,
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl Default for NefsProgress {
    fn default() -> Self {
        Self::new(CancellationToken::new(), None)
    }
}

impl std::fmt::Debug for NefsProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NefsProgress")
            .field("cancelled", &self.token.is_cancelled())
            .field("fraction", &self.fraction())
            .finish()
    }
}

impl NefsProgress {
    /// Create a tracker reporting to `sink`
    pub fn new(token: CancellationToken, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            token,
            sink,
            frames: Arc::new(Mutex::new(vec![Frame {
                start: 0.0,
                span: 1.0,
                completed: 0.0,
            }])),
        }
    }

    /// Tracker without a sink that can never be cancelled from outside
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancellation token observed by this tracker
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Return [`NefsError::Cancelled`] if cancellation was requested
    pub fn check_cancelled(&self) -> NefsResult<()> {
        self.token.check()
    }

    /// Overall completed fraction
    pub fn fraction(&self) -> f64 {
        let frames = self.frames.lock();
        frames
            .last()
            .map_or(1.0, |f| (f.start + f.span * f.completed).min(1.0))
    }

    /// Start a sub-task owning `weight` of the current task
    ///
    /// The sub-task completes when the returned guard is dropped.
    pub fn begin_task(&self, weight: f64, message: &str) -> ProgressTask<'_> {
        let weight = weight.clamp(0.0, 1.0);
        {
            let mut frames = self.frames.lock();
            let parent = frames.last().copied().unwrap_or(Frame {
                start: 0.0,
                span: 1.0,
                completed: 0.0,
            });
            frames.push(Frame {
                start: parent.start + parent.span * parent.completed,
                span: parent.span * weight,
                completed: 0.0,
            });
        }
        self.report(message);
        ProgressTask {
            progress: self,
            weight,
        }
    }

    fn end_task(&self, weight: f64) {
        let mut frames = self.frames.lock();
        if frames.len() > 1 {
            frames.pop();
        }
        if let Some(parent) = frames.last_mut() {
            parent.completed = (parent.completed + weight).min(1.0);
        }
    }

    fn report(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink.report(self.fraction(), message);
        }
    }
}

/// Guard for a running sub-task
#[derive(Debug)]
pub struct ProgressTask<'a> {
    progress: &'a NefsProgress,
    weight: f64,
}

impl ProgressTask<'_> {
    /// Report a message without changing the completed fraction
    pub fn message(&self, message: &str) {
        self.progress.report(message);
    }
}

impl Drop for ProgressTask<'_> {
    fn drop(&mut self) {
        self.progress.end_task(self.weight);
    }
}
