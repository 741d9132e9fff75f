//! Sink for values that reach the end of a pipeline.

use std::fmt;

/// Receives one formatted message per item drained at the end of the pipeline
pub trait Logger: Send + Sync {
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Discards everything; the default logger
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _args: fmt::Arguments<'_>) {}
}

/// Forwards drained values to `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "station_pipeline::drain", "{}", args);
    }
}

impl<F> Logger for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}
