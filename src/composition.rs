/*!
 * Final video composition.
 *
 * Reconciles the narration timeline with the source video timeline, writes
 * the intermediate narration and caption files into the request workspace and
 * asks the muxer to produce a staged output file. The staged file is removed
 * on any failure, so a composition either yields a complete video or nothing.
 */

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use tempfile::TempPath;

use crate::captions::CaptionTrack;
use crate::errors::CompositionError;
use crate::narration::NarrationAudio;
use crate::providers::{CaptionInput, CaptionMode, MediaMuxer, MuxJob};

/// Durations below this are treated as empty timelines
const MIN_DURATION_SECONDS: f64 = 0.001;

/// A probed, read-only source video
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVideo {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub video_codec: Option<String>,
    pub has_audio_track: bool,
}

/// Timing decisions for one composition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionPlan {
    pub video_seconds: f64,
    pub audio_seconds: f64,
    /// Always `max(video_seconds, audio_seconds)`
    pub output_seconds: f64,
    /// How long the last frame is held when the narration outlasts the video
    pub freeze_extend_seconds: f64,
    /// Silence appended to the narration when the video outlasts it
    pub audio_pad_seconds: f64,
}

impl CompositionPlan {
    pub fn new(video_seconds: f64, audio_seconds: f64) -> Result<Self, CompositionError> {
        if !(video_seconds >= MIN_DURATION_SECONDS) {
            return Err(CompositionError::ZeroDuration(format!("source video is {:.3}s long", video_seconds)));
        }
        if !(audio_seconds >= MIN_DURATION_SECONDS) {
            return Err(CompositionError::ZeroDuration(format!("narration is {:.3}s long", audio_seconds)));
        }

        let output_seconds = video_seconds.max(audio_seconds);
        Ok(Self {
            video_seconds,
            audio_seconds,
            output_seconds,
            freeze_extend_seconds: output_seconds - video_seconds,
            audio_pad_seconds: output_seconds - audio_seconds,
        })
    }

    pub fn extends_video(&self) -> bool {
        self.freeze_extend_seconds > 0.0
    }
}

/// A finished video waiting to be delivered
///
/// The file is deleted when this value is dropped unless `persist` moved it.
#[derive(Debug)]
pub struct ComposedVideo {
    file: TempPath,
    duration_seconds: f64,
    caption_count: usize,
}

impl ComposedVideo {
    pub(crate) fn new(file: TempPath, duration_seconds: f64, caption_count: usize) -> Self {
        Self { file, duration_seconds, caption_count }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn caption_count(&self) -> usize {
        self.caption_count
    }

    /// Move the video to its final location
    ///
    /// Falls back to copy-and-delete when the rename crosses filesystems.
    pub fn persist(self, destination: &Path) -> io::Result<()> {
        match self.file.persist(destination) {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!("Rename to {} failed ({}), copying instead", destination.display(), err.error);
                std::fs::copy(&err.path, destination)?;
                Ok(())
            }
        }
    }
}

/// Muxes narration and captions onto source videos
#[derive(Debug, Clone)]
pub struct MediaComposer {
    muxer: Arc<dyn MediaMuxer>,
    caption_mode: CaptionMode,
    staging_dir: Option<PathBuf>,
}

impl MediaComposer {
    pub fn new(muxer: Arc<dyn MediaMuxer>) -> Self {
        Self {
            muxer,
            caption_mode: CaptionMode::default(),
            staging_dir: None,
        }
    }

    pub fn with_caption_mode(mut self, mode: CaptionMode) -> Self {
        self.caption_mode = mode;
        self
    }

    /// Directory staged outputs are created in (defaults to the system temp dir)
    ///
    /// Staging on the same filesystem as the final destination lets delivery
    /// rename instead of copy.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Probe a source video
    pub async fn probe_source(&self, video_path: &Path) -> Result<SourceVideo, CompositionError> {
        let probe = self.muxer.probe(video_path).await.map_err(|e| CompositionError::Probe {
            path: video_path.display().to_string(),
            message: e.to_string(),
        })?;

        if !probe.has_video {
            return Err(CompositionError::Probe {
                path: video_path.display().to_string(),
                message: "no video stream found".to_string(),
            });
        }

        Ok(SourceVideo {
            path: video_path.to_path_buf(),
            duration_seconds: probe.duration_seconds,
            has_audio_track: probe.has_audio(),
            video_codec: probe.video_codec,
        })
    }

    /// Produce the final video
    ///
    /// Intermediate files go into `workspace`; the output is staged outside of
    /// it so it survives the workspace being released.
    pub async fn compose(
        &self,
        video_path: &Path,
        audio: &NarrationAudio,
        captions: &CaptionTrack,
        workspace: &Path,
    ) -> Result<ComposedVideo, CompositionError> {
        let source = self.probe_source(video_path).await?;
        let plan = CompositionPlan::new(source.duration_seconds, audio.duration_seconds())?;

        debug!(
            "Composition plan: video {:.2}s, narration {:.2}s, output {:.2}s, freeze {:.2}s, pad {:.2}s",
            plan.video_seconds, plan.audio_seconds, plan.output_seconds,
            plan.freeze_extend_seconds, plan.audio_pad_seconds
        );
        if source.has_audio_track {
            debug!("Source audio of {} will be replaced by the narration", source.path.display());
        }

        let narration_path = workspace.join("narration.wav");
        let wav = audio.to_wav_bytes().map_err(io::Error::other)?;
        tokio::fs::write(&narration_path, wav).await?;

        let caption_input = if captions.is_empty() {
            None
        } else {
            let srt_path = workspace.join("captions.srt");
            tokio::fs::write(&srt_path, captions.to_srt()).await?;
            Some(CaptionInput { path: srt_path, mode: self.caption_mode })
        };

        let staging_dir = self.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
        let staged = tempfile::Builder::new()
            .prefix(".narravid-")
            .suffix(".mp4")
            .tempfile_in(&staging_dir)?
            .into_temp_path();

        let job = MuxJob {
            video_path: source.path.clone(),
            video_codec: source.video_codec.clone(),
            narration_path,
            captions: caption_input,
            output_path: staged.to_path_buf(),
            freeze_extend_seconds: plan.freeze_extend_seconds,
            output_duration_seconds: plan.output_seconds,
        };

        // On error `staged` is dropped here, removing any partial output
        self.muxer.mux(&job).await?;

        let output = self.muxer.probe(&staged).await.map_err(|e| CompositionError::Probe {
            path: staged.display().to_string(),
            message: e.to_string(),
        })?;

        info!(
            "Composed {:.2}s video with {} caption(s)",
            output.duration_seconds,
            captions.len()
        );
        Ok(ComposedVideo::new(staged, output.duration_seconds, captions.len()))
    }
}
