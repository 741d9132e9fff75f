//! Bounded queues connecting stages.
//!
//! Every queue is a crossbeam bounded MPMC channel. A queue closes when its
//! last `Sender` is dropped; receivers see that as the end of `Receiver::iter`.
//! The pipeline never closes the external input queue itself, only the queues
//! it allocates.

pub use crossbeam::channel::{Receiver, Sender};

/// Smallest capacity a stage output may have
pub const MIN_CAPACITY: usize = 1;

/// Capacity used when a stage does not configure one
pub const DEFAULT_CAPACITY: usize = MIN_CAPACITY;

/// Capacity of the private queue between a fanned-out worker and its merger
pub(crate) const FAN_IN_CAPACITY: usize = 1;

/// Clamp a requested capacity to the supported minimum
pub fn clamp_capacity(capacity: usize) -> usize {
    capacity.max(MIN_CAPACITY)
}

/// Create a bounded queue, clamping the capacity to at least [`MIN_CAPACITY`]
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam::channel::bounded(clamp_capacity(capacity))
}
