//! Batching action buffer in front of the sink.

use anyhow::{bail, Result};
use futures::future::join_all;
use hubsync::action::Action;
use hubsync::sink::ActionSink;
use std::mem;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Buffers actions and hands them to the sink in batches.
///
/// When a push would take the buffer past the threshold, the buffered batch
/// is flushed on a background task first. [`ActionQueue::drain`] waits for
/// every background flush and then emits whatever is left.
pub struct ActionQueue {
    sink: Arc<dyn ActionSink>,
    threshold: usize,
    buffer: Vec<Action>,
    in_flight: Vec<JoinHandle<Result<()>>>,
    pushed: usize,
    flushed: usize,
}

impl ActionQueue {
    pub fn new(sink: Arc<dyn ActionSink>, threshold: usize) -> Self {
        Self {
            sink,
            threshold: threshold.max(1),
            buffer: Vec::new(),
            in_flight: Vec::new(),
            pushed: 0,
            flushed: 0,
        }
    }

    pub fn push(&mut self, action: Action) {
        if self.buffer.len() >= self.threshold {
            self.flush_in_background();
        }
        self.buffer.push(action);
        self.pushed += 1;
    }

    fn flush_in_background(&mut self) {
        let batch = mem::take(&mut self.buffer);
        let count = batch.len();
        self.flushed += count;

        debug!(count, "Flushing action batch");
        let sink = Arc::clone(&self.sink);
        self.in_flight
            .push(tokio::spawn(async move { sink.emit(batch).await }));
    }

    /// Actions pushed so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Actions handed to the sink so far (including flushes still in flight).
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    /// Waits for in-flight flushes, then emits the remainder as a final batch.
    ///
    /// Every flush is awaited even if an earlier one failed; any failure is
    /// reported afterwards as a single error.
    pub async fn drain(&mut self) -> Result<()> {
        let mut failures = 0usize;

        for result in join_all(mem::take(&mut self.in_flight)).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Action batch flush failed");
                    failures += 1;
                }
                Err(e) => {
                    error!(error = %e, "Action batch flush task panicked");
                    failures += 1;
                }
            }
        }

        if !self.buffer.is_empty() {
            let batch = mem::take(&mut self.buffer);
            self.flushed += batch.len();
            if let Err(e) = self.sink.emit(batch).await {
                error!(error = %e, "Final action batch flush failed");
                failures += 1;
            }
        }

        info!(
            pushed = self.pushed,
            flushed = self.flushed,
            "Action queue drained"
        );

        if failures > 0 {
            bail!("{} action batch(es) failed to flush", failures);
        }
        Ok(())
    }
}
