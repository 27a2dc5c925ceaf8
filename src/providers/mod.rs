/*!
 * External capabilities used by the narration pipeline.
 *
 * Every boundary the pipeline crosses is an `async_trait` object so the
 * orchestrator can be driven by real clients or by the mocks in `mock`:
 * - `DocumentSource`: raw text out of a document (plain text, `pdftotext`)
 * - `SpeechSynthesizer`: text to WAV audio (OpenAI-compatible speech API)
 * - `SpeechRecognizer`: WAV audio to timed segments (OpenAI-compatible transcription API)
 * - `MediaMuxer`: probe and mux media files (ffprobe / ffmpeg)
 * - `ResultSink`: where finished videos are delivered
 */

use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::composition::ComposedVideo;
use crate::errors::{AppError, ExtractionError, ProviderError};
use crate::language_utils::LanguageTag;
use crate::text_normalizer::DocumentText;

/// A document handed to the pipeline, identified by its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    path: PathBuf,
}

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased file extension, empty when there is none
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Source of raw document text
#[async_trait]
pub trait DocumentSource: Send + Sync + Debug {
    /// Extract the raw text of a document
    async fn extract(&self, document: &DocumentHandle) -> Result<DocumentText, ExtractionError>;
}

/// Encoded audio returned by a speech service
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    /// WAV container bytes
    pub wav: Bytes,
}

/// Text-to-speech capability
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    /// Synthesize one piece of text into WAV audio
    ///
    /// # Arguments
    /// * `text` - Text to speak, at most `max_input_chars()` characters
    /// * `language` - Narration language
    async fn synthesize(&self, text: &str, language: &LanguageTag) -> Result<SynthesizedSpeech, ProviderError>;

    /// Largest input the service accepts in one call, `None` when unlimited
    fn max_input_chars(&self) -> Option<usize>;

    /// Test the connection to the service
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// One timed span of recognized speech
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

/// Speech-to-text capability
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + Debug {
    /// Recognize timed segments in WAV audio
    async fn recognize(&self, wav: Bytes, language: &LanguageTag) -> Result<Vec<RecognizedSegment>, ProviderError>;

    /// Test the connection to the service
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// How captions end up in the composed video
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    /// Rendered into the picture
    #[default]
    Burn,
    /// Muxed as a selectable subtitle stream
    Soft,
}

impl fmt::Display for CaptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Burn => write!(f, "burn"),
            Self::Soft => write!(f, "soft"),
        }
    }
}

/// What a probe learned about a media file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    pub has_video: bool,
    /// Codec name of the first video stream, as ffprobe reports it
    pub video_codec: Option<String>,
    /// Titles of the audio streams, in stream order (empty string when untitled)
    pub audio_track_titles: Vec<String>,
    pub subtitle_streams: usize,
}

impl MediaProbe {
    pub fn has_audio(&self) -> bool {
        !self.audio_track_titles.is_empty()
    }
}

/// Title the muxers give the narration audio track
pub const NARRATION_TRACK_TITLE: &str = "Narration";

/// Captions to attach during a mux
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionInput {
    /// SRT file with audio-relative timestamps
    pub path: PathBuf,
    pub mode: CaptionMode,
}

/// A fully planned mux: every input exists and every timing is decided
#[derive(Debug, Clone, PartialEq)]
pub struct MuxJob {
    pub video_path: PathBuf,
    /// Codec of the source video stream, when the probe could tell
    pub video_codec: Option<String>,
    pub narration_path: PathBuf,
    pub captions: Option<CaptionInput>,
    pub output_path: PathBuf,
    /// Seconds to hold the last video frame past the end of the source
    pub freeze_extend_seconds: f64,
    pub output_duration_seconds: f64,
}

/// Media probing and muxing capability
#[async_trait]
pub trait MediaMuxer: Send + Sync + Debug {
    /// Inspect a media file
    async fn probe(&self, path: &Path) -> Result<MediaProbe, ProviderError>;

    /// Write `job.output_path` from the job's inputs
    async fn mux(&self, job: &MuxJob) -> Result<(), ProviderError>;

    /// Check that the underlying tools are available
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Final destination of composed videos
#[async_trait]
pub trait ResultSink: Send + Sync + Debug {
    /// Take ownership of a composed video and return where it now lives
    async fn deliver(&self, video: ComposedVideo, output_name: &str) -> Result<PathBuf, AppError>;
}

pub mod document;
pub mod ffmpeg;
pub mod mock;
pub mod openai;
pub mod sink;
