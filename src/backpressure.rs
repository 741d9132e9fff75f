//! Send policies applied when a stage writes into its output queue.
//!
//! Under [`OverflowPolicy::Block`] a full queue stalls the emitting worker,
//! which stops it from receiving and so pushes the stall upstream. Under
//! [`OverflowPolicy::DropWithCallback`] a full queue diverts the item to a
//! callback and the worker carries on.

use crate::buffer::Sender;
use crate::metrics::StageMetrics;
use crossbeam::channel::TrySendError;
use std::fmt;
use std::sync::Arc;

/// Receives items that could not be enqueued under `DropWithCallback`.
///
/// Runs synchronously on the emitting thread and must not block.
pub type OverflowCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// What a stage does when its output queue is full
pub enum OverflowPolicy<T> {
    /// Wait until the queue has room. Never loses items; may deadlock if the
    /// queue is never drained.
    Block,
    /// Hand the item to the callback and continue without waiting
    DropWithCallback(OverflowCallback<T>),
}

impl<T> OverflowPolicy<T> {
    /// Build a `DropWithCallback` policy from a closure
    pub fn drop_with<F>(callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        OverflowPolicy::DropWithCallback(Arc::new(callback))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, OverflowPolicy::Block)
    }
}

impl<T> Default for OverflowPolicy<T> {
    fn default() -> Self {
        OverflowPolicy::Block
    }
}

impl<T> Clone for OverflowPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            OverflowPolicy::Block => OverflowPolicy::Block,
            OverflowPolicy::DropWithCallback(callback) => {
                OverflowPolicy::DropWithCallback(Arc::clone(callback))
            }
        }
    }
}

impl<T> fmt::Debug for OverflowPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => f.write_str("Block"),
            OverflowPolicy::DropWithCallback(_) => f.write_str("DropWithCallback(..)"),
        }
    }
}

/// The write end of a stage output, bound to the stage's overflow policy.
///
/// A stage owns exactly one `Emitter`; dropping it closes the output queue.
/// Fan-in merge threads only borrow it, so the close cannot race a send.
pub struct Emitter<T> {
    sender: Sender<T>,
    policy: OverflowPolicy<T>,
    metrics: StageMetrics,
}

impl<T: Send> Emitter<T> {
    pub fn new(sender: Sender<T>, policy: OverflowPolicy<T>, metrics: StageMetrics) -> Self {
        Self {
            sender,
            policy,
            metrics,
        }
    }

    /// Send one item according to the policy
    pub fn emit(&self, item: T) {
        let item = match self.sender.try_send(item) {
            Ok(()) => {
                self.metrics.record_emitted();
                return;
            }
            Err(TrySendError::Full(item)) => item,
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("output queue disconnected, item discarded");
                return;
            }
        };

        match &self.policy {
            OverflowPolicy::Block => {
                self.metrics.record_block();
                match self.sender.send(item) {
                    Ok(()) => self.metrics.record_emitted(),
                    Err(_) => tracing::trace!("output queue disconnected while blocked"),
                }
            }
            OverflowPolicy::DropWithCallback(callback) => {
                self.metrics.record_dropped();
                callback(item);
            }
        }
    }

    pub fn policy(&self) -> &OverflowPolicy<T> {
        &self.policy
    }
}
