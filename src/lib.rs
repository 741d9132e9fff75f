//! Multi-stage concurrent pipelines with per-stage fan-out/fan-in.
//!
//! A pipeline is an ordered chain of stages between an external input queue
//! and a terminal drain. Each stage runs one or more stations; with more than
//! one, the stations compete for items from the shared input and their outputs
//! are merged back into a single bounded output queue.
//!
//! # Features
//!
//! - Bounded crossbeam queues between stages; closing cascades from the
//!   external input to the drain
//! - Per-stage overflow policy: block on a full output, or divert the item to
//!   a callback
//! - Optional finalize hook for trailing output once a station's input ends
//! - Exactly one closer per queue, enforced by ownership rather than flags
//! - Per-stage metrics: processed, emitted, dropped, blocked, sampled latency
//!
//! # Example
//!
//! ```
//! use station_pipeline::{bounded, FilterStation, MapStation, PipelineBuilder, StageConfig};
//!
//! let (tx, rx) = bounded(16);
//! let producer = std::thread::spawn(move || {
//!     for i in 0..10 {
//!         tx.send(i).unwrap();
//!     }
//! });
//!
//! PipelineBuilder::new()
//!     .add_stage(StageConfig::new("square").station(MapStation::new("square", |v: i64| v * v)))
//!     .add_stage(
//!         StageConfig::new("even")
//!             .station(FilterStation::new("even", |v: &i64| v % 2 == 0))
//!             .station(FilterStation::new("even", |v: &i64| v % 2 == 0))
//!             .output_capacity(8),
//!     )
//!     .build(rx)
//!     .run();
//!
//! producer.join().unwrap();
//! ```

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod station;

// Re-exports for convenience
pub use backpressure::{Emitter, OverflowCallback, OverflowPolicy};
pub use buffer::{bounded, Receiver, Sender};
pub use config::{PipelineConfig, StageConfig};
pub use error::{PipelineError, Result};
pub use logger::{Logger, NopLogger, TracingLogger};
pub use metrics::{MetricsSnapshot, PercentileTracker, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use stage::Stage;
pub use station::{
    FilterStation, Finalizer, FlatMapStation, MapStation, Passthrough, Station, StationHandle,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
