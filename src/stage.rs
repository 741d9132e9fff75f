//! Stage worker pool.
//!
//! A stage runs its stations against one shared input queue and writes to one
//! shared output queue, which it closes exactly once.
//!
//! ```text
//!                      ┌─ worker 0 ─▶ private 0 ─▶ merge 0 ─┐
//!   input ──(compete)──┼─ worker 1 ─▶ private 1 ─▶ merge 1 ─┼──▶ Emitter ──▶ output
//!                      └─ worker K ─▶ private K ─▶ merge K ─┘
//! ```
//!
//! With a single station the worker runs on the stage thread and writes
//! straight through the emitter. With several, each worker gets a private
//! queue drained by its own merge thread, and the scope join over all of them
//! is the barrier that gates the single close of the shared output.

use crate::backpressure::{Emitter, OverflowPolicy};
use crate::buffer::{self, Receiver, Sender, FAN_IN_CAPACITY};
use crate::config::StageConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::{StageMetrics, LATENCY_SAMPLE_INTERVAL};
use crate::station::StationHandle;
use std::thread;
use std::time::Instant;

/// A retained pipeline stage, ready to be wired between two queues
pub struct Stage<T> {
    name: String,
    stations: Vec<StationHandle<T>>,
    output_capacity: usize,
    overflow_policy: OverflowPolicy<T>,
    metrics: StageMetrics,
}

impl<T: Send + 'static> Stage<T> {
    /// Build a stage from its configuration, or `None` if it has no stations
    pub fn from_config(config: StageConfig<T>) -> Option<Self> {
        if config.is_inert() {
            return None;
        }
        Some(Self {
            name: config.name,
            stations: config.stations,
            output_capacity: config.output_capacity,
            overflow_policy: config.overflow_policy,
            metrics: StageMetrics::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn is_fanned_out(&self) -> bool {
        self.stations.len() > 1
    }

    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Run every station until `input` closes, then close `output`.
    ///
    /// Blocks the calling thread. Errors only if a fan-out thread could not be
    /// spawned or panicked; the output is closed in every case.
    pub fn run(self, input: Receiver<T>, output: Sender<T>) -> Result<()> {
        let Stage {
            name,
            stations,
            overflow_policy,
            metrics,
            ..
        } = self;
        let emitter = Emitter::new(output, overflow_policy, metrics.clone());
        tracing::debug!(
            stage = %name,
            stations = stations.len(),
            policy = ?emitter.policy(),
            "stage started"
        );

        let result = match <[StationHandle<T>; 1]>::try_from(stations) {
            Ok([station]) => {
                run_station(station, &input, |item| emitter.emit(item), &metrics);
                Ok(())
            }
            Err(stations) => run_fanned_out(&name, stations, &input, &emitter, &metrics),
        };

        drop(emitter);
        tracing::debug!(stage = %name, "stage finished, output closed");
        result
    }
}

/// The worker loop shared by both paths
fn run_station<T>(
    mut station: StationHandle<T>,
    input: &Receiver<T>,
    mut send: impl FnMut(T),
    metrics: &StageMetrics,
) {
    let mut received: u64 = 0;
    for item in input.iter() {
        metrics.record_processed();
        if received % LATENCY_SAMPLE_INTERVAL == 0 {
            let start = Instant::now();
            station.process(item, &mut send);
            metrics.record_latency(start.elapsed().as_nanos() as u64);
        } else {
            station.process(item, &mut send);
        }
        received += 1;
    }

    if station.finalize(&mut send) {
        metrics.record_finalized();
    }
    tracing::trace!(station = station.name(), received, "station drained");
}

fn run_fanned_out<T: Send + 'static>(
    stage: &str,
    stations: Vec<StationHandle<T>>,
    input: &Receiver<T>,
    emitter: &Emitter<T>,
    metrics: &StageMetrics,
) -> Result<()> {
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(stations.len() * 2);
        let mut failure = None;

        for (index, station) in stations.into_iter().enumerate() {
            let (private_tx, private_rx) = buffer::bounded(FAN_IN_CAPACITY);

            let worker = format!("{stage}-worker-{index}");
            let worker_input = input.clone();
            let worker_metrics = metrics.clone();
            let spawned = thread::Builder::new()
                .name(worker.clone())
                .spawn_scoped(scope, move || {
                    run_station(
                        station,
                        &worker_input,
                        |item| {
                            // Only fails if the merge thread died; its panic is reported on join.
                            let _ = private_tx.send(item);
                        },
                        &worker_metrics,
                    );
                });
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                Err(source) => {
                    failure = Some(PipelineError::Spawn { worker, source });
                    break;
                }
            }

            let merge = format!("{stage}-merge-{index}");
            let spawned = thread::Builder::new()
                .name(merge.clone())
                .spawn_scoped(scope, move || {
                    for item in private_rx.iter() {
                        emitter.emit(item);
                    }
                });
            match spawned {
                Ok(handle) => handles.push((merge, handle)),
                Err(source) => {
                    failure = Some(PipelineError::Spawn {
                        worker: merge,
                        source,
                    });
                    break;
                }
            }
        }

        for (worker, handle) in handles {
            if let Err(payload) = handle.join() {
                let err = PipelineError::panicked(worker, payload);
                tracing::error!(%err, "fan-out thread failed");
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}
