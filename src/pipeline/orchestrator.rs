use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alignment::SubtitleAligner;
use crate::captions::CaptionTrack;
use crate::composition::{ComposedVideo, MediaComposer};
use crate::errors::PipelineError;
use crate::language_utils::LanguageTag;
use crate::narration::NarrationSynthesizer;
use crate::pipeline::state::{PipelineStage, PipelineState, StateMachine};
use crate::pipeline::workspace::Workspace;
use crate::pipeline::{PipelineFailure, PipelineOutcome, PipelineRequest};
use crate::providers::{DocumentHandle, DocumentSource};
use crate::text_normalizer;

// @module: Pipeline orchestration

/// Receives every state a request enters, in order
pub type ProgressCallback = Arc<dyn Fn(Uuid, &PipelineState) + Send + Sync>;

/// Result of the stages that produce the video
struct Produced {
    video: ComposedVideo,
    degraded: bool,
}

/// Runs requests through extraction, normalization, synthesis, alignment and composition
///
/// Holds only shared, read-only handles: cloning is cheap and any number of
/// requests may run concurrently on clones or on the same instance.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    documents: Arc<dyn DocumentSource>,
    synthesizer: NarrationSynthesizer,
    aligner: SubtitleAligner,
    composer: MediaComposer,
    default_language: LanguageTag,
    workspace_root: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("documents", &self.documents)
            .field("synthesizer", &self.synthesizer)
            .field("aligner", &self.aligner)
            .field("composer", &self.composer)
            .field("default_language", &self.default_language)
            .field("workspace_root", &self.workspace_root)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        synthesizer: NarrationSynthesizer,
        aligner: SubtitleAligner,
        composer: MediaComposer,
    ) -> Self {
        Self {
            documents,
            synthesizer,
            aligner,
            composer,
            default_language: LanguageTag::default(),
            workspace_root: None,
            progress: None,
        }
    }

    /// Language used when a request carries none
    pub fn with_language(mut self, language: LanguageTag) -> Self {
        self.default_language = language;
        self
    }

    /// Parent directory of the per-request workspaces (defaults to the system temp dir)
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run a request to completion
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutcome, PipelineFailure> {
        self.run_with_cancellation(request, CancellationToken::new()).await
    }

    /// Run a request, ending it as `Failed` as soon as `token` is cancelled
    ///
    /// Dropping the returned future has the same effect on resources: the
    /// workspace is removed and running subprocesses are killed.
    pub async fn run_with_cancellation(
        &self,
        request: PipelineRequest,
        token: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let mut machine = StateMachine::new();
        self.notify(request.id, machine.current());
        info!(
            "Request {} received: {} + {} -> {}",
            request.id,
            request.source_document.display(),
            request.source_video.display(),
            request.output_name
        );

        let workspace = match Workspace::create(self.workspace_root.as_deref(), request.id) {
            Ok(workspace) => workspace,
            Err(e) => return Err(self.fail(&request, machine, PipelineStage::Prepare, e.into())),
        };

        let result = self.execute(&request, &mut machine, &workspace, &token).await;
        workspace.release();

        match result {
            Ok(produced) => {
                if let Err(e) = self.advance(request.id, &mut machine, PipelineState::Done) {
                    return Err(self.fail(&request, machine, PipelineStage::Compose, e));
                }
                info!(
                    "Request {} done: {:.2}s video, {} caption(s){}",
                    request.id,
                    produced.video.duration_seconds(),
                    produced.video.caption_count(),
                    if produced.degraded { " (degraded: no captions)" } else { "" }
                );
                Ok(PipelineOutcome {
                    request_id: request.id,
                    output_name: request.output_name,
                    video: produced.video,
                    history: machine.into_history(),
                    degraded: produced.degraded,
                })
            }
            Err(e) => {
                let stage = machine.current().pending_stage().unwrap_or(PipelineStage::Compose);
                Err(self.fail(&request, machine, stage, e))
            }
        }
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        machine: &mut StateMachine,
        workspace: &Workspace,
        token: &CancellationToken,
    ) -> Result<Produced, PipelineError> {
        let language = request.language.clone().unwrap_or_else(|| self.default_language.clone());
        let document = DocumentHandle::new(&request.source_document);

        let raw = guarded(token, self.documents.extract(&document)).await?;
        self.advance(request.id, machine, PipelineState::Extracted)?;

        ensure_active(token)?;
        let text = text_normalizer::normalize(&raw)?;
        drop(raw);
        debug!("Request {}: {} speakable chars after normalization", request.id, text.char_count());
        self.advance(request.id, machine, PipelineState::Normalized)?;

        let audio = guarded(token, self.synthesizer.synthesize(&text, &language)).await?;
        drop(text);
        self.advance(request.id, machine, PipelineState::Synthesized)?;

        let mut degraded = false;
        let captions = match guarded(token, self.aligner.align(&audio, &language)).await {
            Ok(track) => track,
            Err(PipelineError::Alignment(e)) if e.is_recoverable() => {
                warn!("Request {}: {}; continuing without captions", request.id, e);
                degraded = true;
                CaptionTrack::empty()
            }
            Err(e) => return Err(e),
        };
        self.advance(request.id, machine, PipelineState::Aligned)?;

        let video = guarded(
            token,
            self.composer
                .compose(&request.source_video, &audio, &captions, workspace.path()),
        )
        .await?;
        self.advance(request.id, machine, PipelineState::Composed)?;

        Ok(Produced { video, degraded })
    }

    fn advance(&self, request_id: Uuid, machine: &mut StateMachine, next: PipelineState) -> Result<(), PipelineError> {
        let state = machine.transition(next)?;
        info!("Request {}: {}", request_id, state);
        self.notify(request_id, state);
        Ok(())
    }

    fn fail(
        &self,
        request: &PipelineRequest,
        mut machine: StateMachine,
        stage: PipelineStage,
        error: PipelineError,
    ) -> PipelineFailure {
        let reason = match &error {
            PipelineError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };

        match machine.fail(stage, reason.clone()) {
            Ok(state) => {
                error!("Request {} {}", request.id, state);
                self.notify(request.id, state);
            }
            Err(e) => error!("Request {}: {}", request.id, e),
        }

        PipelineFailure {
            request_id: request.id,
            stage,
            reason,
            history: machine.into_history(),
            error,
        }
    }

    fn notify(&self, request_id: Uuid, state: &PipelineState) {
        if let Some(callback) = &self.progress {
            callback(request_id, state);
        }
    }
}

fn ensure_active(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Run one external call, abandoning it if the token fires first
async fn guarded<T, E, F>(token: &CancellationToken, call: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    PipelineError: From<E>,
{
    ensure_active(token)?;
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PipelineError::Cancelled),
        result = call => result.map_err(PipelineError::from),
    }
}
