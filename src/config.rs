//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is assembled once, handed to
//! [`Pipeline::new`](crate::Pipeline::new) and consumed there. Stages that end
//! up with no stations are inert and are discarded at that point.

use crate::backpressure::OverflowPolicy;
use crate::buffer::{clamp_capacity, DEFAULT_CAPACITY};
use crate::logger::{Logger, NopLogger};
use crate::station::{Finalizer, Station, StationHandle};
use std::fmt;
use std::sync::Arc;

/// Configuration of one pipeline stage
pub struct StageConfig<T> {
    pub(crate) name: String,
    pub(crate) stations: Vec<StationHandle<T>>,
    pub(crate) output_capacity: usize,
    pub(crate) overflow_policy: OverflowPolicy<T>,
}

impl<T> StageConfig<T> {
    /// Create an empty stage with an output capacity of 1 and the `Block` policy
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stations: Vec::new(),
            output_capacity: DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::Block,
        }
    }

    /// Add a station. More than one station fans the stage out.
    pub fn station<S>(mut self, station: S) -> Self
    where
        S: Station<T> + 'static,
    {
        self.stations.push(StationHandle::plain(station));
        self
    }

    /// Add a station that also produces trailing output when its input ends
    pub fn finalizing_station<S>(mut self, station: S) -> Self
    where
        S: Finalizer<T> + 'static,
    {
        self.stations.push(StationHandle::finalizing(station));
        self
    }

    /// Add stations whose capabilities are already resolved
    pub fn stations(mut self, stations: impl IntoIterator<Item = StationHandle<T>>) -> Self {
        self.stations.extend(stations);
        self
    }

    /// Capacity of the stage output queue; values below 1 are raised to 1
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = clamp_capacity(capacity);
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy<T>) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Divert items to `callback` instead of waiting when the output is full
    pub fn drop_with_callback<F>(self, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.overflow_policy(OverflowPolicy::drop_with(callback))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn capacity(&self) -> usize {
        self.output_capacity
    }

    pub fn policy(&self) -> &OverflowPolicy<T> {
        &self.overflow_policy
    }

    /// A stage without stations never runs
    pub fn is_inert(&self) -> bool {
        self.stations.is_empty()
    }
}

impl<T> fmt::Debug for StageConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageConfig")
            .field("name", &self.name)
            .field("stations", &self.stations)
            .field("output_capacity", &self.output_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .finish()
    }
}

/// Logger plus the ordered list of stages
pub struct PipelineConfig<T> {
    pub logger: Arc<dyn Logger>,
    pub stages: Vec<StageConfig<T>>,
}

impl<T> PipelineConfig<T> {
    pub fn new(logger: Arc<dyn Logger>, stages: Vec<StageConfig<T>>) -> Self {
        Self { logger, stages }
    }
}

impl<T> Default for PipelineConfig<T> {
    fn default() -> Self {
        Self {
            logger: Arc::new(NopLogger),
            stages: Vec::new(),
        }
    }
}
