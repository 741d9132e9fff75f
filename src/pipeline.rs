use crate::buffer::{self, Receiver};
use crate::config::{PipelineConfig, StageConfig};
use crate::error::{PipelineError, Result};
use crate::logger::{Logger, NopLogger};
use crate::metrics::StageMetrics;
use crate::stage::Stage;
use std::fmt;
use std::sync::Arc;
use std::thread;

/// Fluent builder for a [`Pipeline`]
pub struct PipelineBuilder<T> {
    logger: Arc<dyn Logger>,
    stages: Vec<StageConfig<T>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn new() -> Self {
        Self {
            logger: Arc::new(NopLogger),
            stages: Vec::new(),
        }
    }

    /// Set the sink that receives every value reaching the end of the pipeline
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Append a stage. Stages without stations are dropped at build time.
    pub fn add_stage(mut self, stage: StageConfig<T>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn into_config(self) -> PipelineConfig<T> {
        PipelineConfig::new(self.logger, self.stages)
    }

    /// Build the pipeline reading from `input`
    pub fn build(self, input: Receiver<T>) -> Pipeline<T> {
        Pipeline::new(input, self.into_config())
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain of stages between an external input queue and a terminal drain.
///
/// Each stage's output queue is the next stage's input. Running the pipeline
/// consumes it; the run returns once the external input has been closed by
/// its producer and everything behind it has drained.
pub struct Pipeline<T> {
    input: Receiver<T>,
    logger: Arc<dyn Logger>,
    stages: Vec<Stage<T>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create a pipeline from a configuration, discarding stages that have no stations
    pub fn new(input: Receiver<T>, config: PipelineConfig<T>) -> Self {
        let PipelineConfig { logger, stages } = config;
        let stages = stages
            .into_iter()
            .filter_map(|config| {
                let name = config.name().to_string();
                let stage = Stage::from_config(config);
                if stage.is_none() {
                    tracing::debug!(stage = %name, "discarding stage without stations");
                }
                stage
            })
            .collect();

        Self {
            input,
            logger,
            stages,
        }
    }

    /// Number of stages that will run
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Metrics of a retained stage. Clone the handle to keep reading it
    /// while or after the pipeline runs.
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.stages.get(index).map(Stage::metrics)
    }

    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (i, stage) in self.stages.iter().enumerate() {
            summary.push_str(&format!(
                "  Stage {} ({}): {}\n",
                i,
                stage.name(),
                stage.metrics().snapshot().format()
            ));
        }
        summary
    }
}

impl<T: Send + fmt::Debug + 'static> Pipeline<T> {
    /// Run the pipeline to completion.
    ///
    /// Blocks until the external input closes and the last queue has been
    /// drained into the logger.
    ///
    /// # Panics
    ///
    /// Panics after the pipeline has drained if a worker panicked or a thread
    /// could not be spawned. Use [`Pipeline::try_run`] to get those as errors.
    pub fn run(self) {
        if let Err(err) = self.try_run() {
            tracing::error!(%err, "pipeline aborted");
            panic!("pipeline aborted: {err}");
        }
    }

    /// Run the pipeline to completion, reporting worker failures as errors
    pub fn try_run(self) -> Result<()> {
        let Pipeline {
            input,
            logger,
            stages,
        } = self;
        tracing::debug!(stages = stages.len(), "pipeline starting");

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(stages.len());
            let mut failure = None;
            let mut upstream = input;

            for stage in stages {
                let (output, downstream) = buffer::bounded(stage.output_capacity());
                let name = stage.name().to_string();
                let stage_input = upstream;
                upstream = downstream;

                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || stage.run(stage_input, output));
                match spawned {
                    Ok(handle) => handles.push((name, handle)),
                    Err(source) => {
                        // The dropped closure closes `upstream`, so the drain below ends at once.
                        failure = Some(PipelineError::Spawn {
                            worker: name,
                            source,
                        });
                        break;
                    }
                }
            }

            for item in upstream.iter() {
                logger.log(format_args!("value at end of pipeline: {item:?}"));
            }
            drop(upstream);

            for (name, handle) in handles {
                let err = match handle.join() {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err,
                    Err(payload) => PipelineError::panicked(name, payload),
                };
                tracing::error!(%err, "stage failed");
                if failure.is_none() {
                    failure = Some(err);
                }
            }

            tracing::debug!("pipeline drained");
            match failure {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}
