use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alignment::SubtitleAligner;
use crate::app_config::Config;
use crate::composition::MediaComposer;
use crate::file_utils::FileManager;
use crate::narration::NarrationSynthesizer;
use crate::pipeline::{PipelineOrchestrator, PipelineRequest, PipelineState};
use crate::providers::document::{DocumentRouter, PdfTextSource};
use crate::providers::ffmpeg::FfmpegMuxer;
use crate::providers::openai::{OpenAiSpeech, OpenAiTranscriber};
use crate::providers::sink::DirectorySink;
use crate::providers::{MediaMuxer, ResultSink, SpeechRecognizer, SpeechSynthesizer};

// @module: Application controller for narration requests

/// Main application controller: builds clients from the config and runs requests
pub struct Controller {
    // @field: App configuration
    config: Config,
}

/// Clients built from the configuration
struct Capabilities {
    speech: Arc<dyn SpeechSynthesizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    muxer: Arc<dyn MediaMuxer>,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        let speech_config = &self.config.speech;
        let composition = &self.config.composition;

        let speech = OpenAiSpeech::new(
            &speech_config.api_settings(),
            speech_config.voice.clone(),
            speech_config.speed,
            speech_config.max_input_chars(),
        );
        let recognizer = OpenAiTranscriber::new(&self.config.recognition.api_settings());
        let muxer = FfmpegMuxer::new(composition.ffmpeg_path.clone(), composition.ffprobe_path.clone())
            .with_codecs(composition.video_codec.clone(), composition.audio_codec.clone())
            .with_subtitle_style(composition.subtitle_style.clone())
            .with_timeout(composition.timeout());

        Capabilities {
            speech: Arc::new(speech),
            recognizer: Arc::new(recognizer),
            muxer: Arc::new(muxer),
        }
    }

    /// Wire the configured clients into an orchestrator staging outputs in `staging_dir`
    pub fn build_orchestrator(&self, staging_dir: &Path) -> Result<PipelineOrchestrator> {
        let capabilities = self.capabilities();
        let pdf = PdfTextSource::new(
            self.config.document.pdftotext_path.clone(),
            Duration::from_secs(self.config.document.timeout_secs),
        );

        let aligner = SubtitleAligner::new(capabilities.recognizer)
            .with_overlap_tolerance(self.config.recognition.overlap_tolerance_seconds());
        let composer = MediaComposer::new(capabilities.muxer)
            .with_caption_mode(self.config.composition.caption_mode)
            .with_staging_dir(staging_dir);

        Ok(PipelineOrchestrator::new(
            Arc::new(DocumentRouter::standard(pdf)),
            NarrationSynthesizer::new(capabilities.speech),
            aligner,
            composer,
        )
        .with_language(self.config.language_tag()?))
    }

    /// Narrate `document` over `video` and write `<output_dir>/<output_name>.mp4`
    pub async fn run(
        &self,
        document: PathBuf,
        video: PathBuf,
        output_name: &str,
        output_dir: PathBuf,
        force_overwrite: bool,
    ) -> Result<PathBuf> {
        FileManager::validate_inputs(&document, &video, &self.config.composition.ffprobe_path)?;

        let output_path = FileManager::output_path_for(&output_dir, output_name)?;
        if output_path.exists() && !force_overwrite {
            return Err(anyhow!(
                "Output file already exists: {} (use --force-overwrite to replace it)",
                output_path.display()
            ));
        }
        FileManager::ensure_dir(&output_dir)?;

        info!(
            "🎬 narravid: {} speech ({}) / {} recognition ({}), captions: {}",
            self.config.speech.provider.display_name(),
            self.config.speech.api_settings().model,
            self.config.recognition.provider.display_name(),
            self.config.recognition.api_settings().model,
            self.config.composition.caption_mode
        );

        let orchestrator = self.build_orchestrator(&output_dir)?;
        let sink = DirectorySink::new(&output_dir, force_overwrite);
        let request = PipelineRequest::new(document, video, output_name);

        let token = CancellationToken::new();
        let ctrl_c_token = token.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling request");
                ctrl_c_token.cancel();
            }
        });

        let result = run_with_progress(&orchestrator, &sink, request, token).await;
        ctrl_c.abort();
        result
    }

    /// Check that every configured service and tool answers
    pub async fn check(&self) -> Result<()> {
        let capabilities = self.capabilities();
        let mut failures = Vec::new();

        let checks = [
            ("speech", capabilities.speech.test_connection().await),
            ("recognition", capabilities.recognizer.test_connection().await),
            ("ffmpeg", capabilities.muxer.test_connection().await),
        ];
        for (name, result) in checks {
            match result {
                Ok(()) => info!("✅ {} OK", name),
                Err(e) => {
                    error!("❌ {} unavailable: {}", name, e);
                    failures.push(name);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Unavailable: {}", failures.join(", ")))
        }
    }
}

/// Run one request with a spinner and hand the result to `sink`
pub async fn run_with_progress(
    orchestrator: &PipelineOrchestrator,
    sink: &dyn ResultSink,
    request: PipelineRequest,
    token: CancellationToken,
) -> Result<PathBuf> {
    let start_time = std::time::Instant::now();

    let progress_bar = ProgressBar::new(6);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:30}] {pos}/{len} {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));
    progress_bar.enable_steady_tick(Duration::from_millis(120));
    progress_bar.set_message("Extracting text");

    let pb = progress_bar.clone();
    let orchestrator = orchestrator.clone().with_progress(Arc::new(move |_: Uuid, state: &PipelineState| {
        let (position, message) = progress_step(state);
        pb.set_position(position);
        pb.set_message(message);
    }));

    let output_name = request.output_name.clone();
    let outcome = orchestrator.run_with_cancellation(request, token).await;
    progress_bar.finish_and_clear();

    let outcome = outcome?;
    if outcome.degraded {
        warn!("No captions could be derived from the narration, the video has none");
    }

    let duration = outcome.video.duration_seconds();
    let captions = outcome.video.caption_count();
    let path = sink.deliver(outcome.video, &output_name).await?;

    info!(
        "Narrated video written to {} ({:.1}s, {} caption(s)) in {:.1}s",
        path.display(),
        duration,
        captions,
        start_time.elapsed().as_secs_f64()
    );
    Ok(path)
}

// Position on a six-step bar and the label of the work that follows
fn progress_step(state: &PipelineState) -> (u64, &'static str) {
    match state {
        PipelineState::Received => (0, "Extracting text"),
        PipelineState::Extracted => (1, "Cleaning text"),
        PipelineState::Normalized => (2, "Synthesizing narration"),
        PipelineState::Synthesized => (3, "Aligning captions"),
        PipelineState::Aligned => (4, "Composing video"),
        PipelineState::Composed => (5, "Finishing"),
        PipelineState::Done => (6, "Done"),
        PipelineState::Failed { .. } => (0, "Failed"),
    }
}
