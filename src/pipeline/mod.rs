/*!
 * Request pipeline: document in, narrated and captioned video out.
 *
 * - `state`: the per-request state machine
 * - `workspace`: per-request scratch directory
 * - `orchestrator`: runs the stages in order and surfaces failures
 */

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::composition::ComposedVideo;
use crate::errors::{AppError, PipelineError};
use crate::language_utils::LanguageTag;

pub mod orchestrator;
pub mod state;
pub mod workspace;

pub use orchestrator::{PipelineOrchestrator, ProgressCallback};
pub use state::{PipelineStage, PipelineState, StateMachine};
pub use workspace::Workspace;

/// One document/video pair to turn into a narrated video
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub id: Uuid,
    pub source_document: PathBuf,
    pub source_video: PathBuf,
    pub output_name: String,
    /// Overrides the orchestrator's default narration language
    pub language: Option<LanguageTag>,
}

impl PipelineRequest {
    pub fn new(
        source_document: impl Into<PathBuf>,
        source_video: impl Into<PathBuf>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_document: source_document.into(),
            source_video: source_video.into(),
            output_name: output_name.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: LanguageTag) -> Self {
        self.language = Some(language);
        self
    }
}

/// A request that reached `Done`
#[derive(Debug)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub output_name: String,
    pub video: ComposedVideo,
    pub history: Vec<PipelineState>,
    /// Captions were dropped because recognition found no segments
    pub degraded: bool,
}

impl PipelineOutcome {
    pub fn state(&self) -> &PipelineState {
        self.history.last().unwrap_or(&PipelineState::Done)
    }
}

/// A request that reached `Failed`
#[derive(Debug, Error)]
#[error("Request {request_id} failed at {stage}: {reason}")]
pub struct PipelineFailure {
    pub request_id: Uuid,
    pub stage: PipelineStage,
    pub reason: String,
    pub history: Vec<PipelineState>,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn state(&self) -> PipelineState {
        PipelineState::Failed {
            stage: self.stage,
            reason: self.reason.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, PipelineError::Cancelled)
    }
}

impl From<PipelineFailure> for AppError {
    fn from(failure: PipelineFailure) -> Self {
        AppError::Pipeline {
            stage: failure.stage.to_string(),
            reason: failure.reason,
        }
    }
}
