//! The processing-engine contract.
//!
//! An engine is synchronous and CPU bound; callers run it on the blocking
//! pool. A batch walks its inputs strictly in order. After every input the
//! observer is told the outcome and may stop the batch before the next input
//! starts.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use semi_core::config_schema::ConfigSchema;
use semi_core::processing_config::{PreviewOptions, ProcessingConfig};
use tokio_util::sync::CancellationToken;

/// Failure that aborts the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Engine fault: {0}")]
    Fault(String),
}

/// Failure of a single input.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The input itself is unusable. Recorded, the batch carries on.
    #[error("{reason}")]
    Input { reason: String },

    /// The engine cannot continue with any input.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ProcessError {
    pub fn input(reason: impl Into<String>) -> Self {
        ProcessError::Input {
            reason: reason.into(),
        }
    }
}

/// An input that produced no output, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFailure {
    pub input: PathBuf,
    pub reason: String,
}

/// One batch invocation.
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    pub inputs: &'a [PathBuf],
    pub config: &'a ProcessingConfig,
    pub output_dir: &'a Path,
    /// `Some` for preview batches: outputs are downscaled and re-encoded at
    /// the preview quality.
    pub preview: Option<PreviewOptions>,
}

/// Outcome of one input, reported after it finished.
#[derive(Debug, Clone, Copy)]
pub struct InputOutcome<'a> {
    /// 1-based position of the input.
    pub index: usize,
    pub total: usize,
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    pub error: Option<&'a str>,
}

/// Receives per-input callbacks from [`ProcessingEngine::process_batch`].
pub trait BatchObserver {
    /// Called once per finished input, successful or not. Returning
    /// [`ControlFlow::Break`] stops the batch before the next input.
    fn on_progress(&mut self, outcome: InputOutcome<'_>) -> ControlFlow<()>;

    /// Called before `on_progress` for inputs that failed.
    fn on_error(&mut self, _input: &Path, _reason: &str) {}
}

pub trait ProcessingEngine: Send + Sync + 'static {
    /// Process a single input into `output_dir`, returning the output path.
    fn process_one(
        &self,
        input: &Path,
        config: &ProcessingConfig,
        output_dir: &Path,
        preview: Option<&PreviewOptions>,
    ) -> Result<PathBuf, ProcessError>;

    /// Schema describing the configuration this engine accepts.
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::current()
    }

    /// Process `request.inputs` in order.
    ///
    /// Per-input failures are collected and returned; an [`EngineError`]
    /// aborts the batch. `cancel` is checked before each input starts, the
    /// observer after each input finishes.
    fn process_batch(
        &self,
        request: &BatchRequest<'_>,
        cancel: &CancellationToken,
        observer: &mut dyn BatchObserver,
    ) -> Result<Vec<InputFailure>, EngineError> {
        std::fs::create_dir_all(request.output_dir)?;

        let total = request.inputs.len();
        let mut failures = Vec::new();

        for (i, input) in request.inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(input = %input.display(), "Batch stopped before input");
                break;
            }

            let result = self.process_one(
                input,
                request.config,
                request.output_dir,
                request.preview.as_ref(),
            );

            let flow = match result {
                Ok(output) => observer.on_progress(InputOutcome {
                    index: i + 1,
                    total,
                    input,
                    output: Some(output.as_path()),
                    error: None,
                }),
                Err(ProcessError::Input { reason }) => {
                    tracing::warn!(input = %input.display(), error = %reason, "Input failed");
                    observer.on_error(input, &reason);
                    let flow = observer.on_progress(InputOutcome {
                        index: i + 1,
                        total,
                        input,
                        output: None,
                        error: Some(&reason),
                    });
                    failures.push(InputFailure {
                        input: input.clone(),
                        reason,
                    });
                    flow
                }
                Err(ProcessError::Engine(e)) => return Err(e),
            };

            if flow.is_break() {
                break;
            }
        }

        Ok(failures)
    }
}
