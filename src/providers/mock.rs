/*!
 * Mock capability implementations for testing.
 *
 * Each mock takes a `MockBehavior` and counts the calls it receives:
 * - `MockDocumentSource` returns canned text
 * - `MockSpeechSynthesizer` returns a sine tone whose length follows the input text
 * - `MockSpeechRecognizer` returns evenly spaced segments covering the audio
 * - `MockMediaMuxer` works on JSON descriptor files (`MockMediaFile`) instead of real media
 * - `MockResultSink` records deliveries
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::composition::ComposedVideo;
use crate::errors::{AppError, ExtractionError, ProviderError};
use crate::language_utils::LanguageTag;
use crate::narration::NarrationAudio;
use crate::providers::{
    CaptionMode, DocumentHandle, DocumentSource, MediaMuxer, MediaProbe, MuxJob, RecognizedSegment,
    ResultSink, SpeechRecognizer, SpeechSynthesizer, SynthesizedSpeech, NARRATION_TRACK_TITLE,
};
use crate::text_normalizer::DocumentText;

/// Behavior mode shared by the mocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Succeeds with nothing: empty text, zero samples or no segments
    Empty,
    /// Succeeds after a delay (for cancellation testing)
    Slow { delay_ms: u64 },
    /// Synthesizer: digital silence instead of a tone
    Silent,
    /// Synthesizer: every second chunk comes back at a different sample rate
    MixedFormats,
    /// Recognizer: segments run past the end of the audio
    Overshoot,
    /// Recognizer: segments come back in reverse order
    Unordered,
}

/// Tone frequency of mock narration
const MOCK_TONE_HZ: f64 = 440.0;

/// Length of each mock recognition segment
const MOCK_SEGMENT_SECONDS: f64 = 2.0;

async fn apply_common(behavior: MockBehavior, count: usize, what: &str) -> Result<(), ProviderError> {
    match behavior {
        MockBehavior::Failing => Err(ProviderError::ApiError {
            message: format!("Simulated {} failure", what),
            status_code: 500,
        }),
        MockBehavior::Intermittent { fail_every } if fail_every > 0 && count % fail_every == fail_every - 1 => {
            Err(ProviderError::ApiError {
                message: format!("Simulated intermittent {} failure (request #{})", what, count + 1),
                status_code: 503,
            })
        }
        MockBehavior::Slow { delay_ms } => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Mock document source returning fixed text
#[derive(Debug, Clone)]
pub struct MockDocumentSource {
    text: String,
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
}

impl MockDocumentSource {
    pub fn new(text: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            text: text.into(),
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working(text: impl Into<String>) -> Self {
        Self::new(text, MockBehavior::Working)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockDocumentSource {
    async fn extract(&self, _document: &DocumentHandle) -> Result<DocumentText, ExtractionError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        apply_common(self.behavior, count, "extraction").await?;

        match self.behavior {
            MockBehavior::Empty => Ok(DocumentText::new("")),
            _ => Ok(DocumentText::new(self.text.clone())),
        }
    }
}

/// Mock speech synthesizer producing sine tones
#[derive(Debug, Clone)]
pub struct MockSpeechSynthesizer {
    behavior: MockBehavior,
    max_input_chars: Option<usize>,
    seconds_per_char: f64,
    fixed_seconds: Option<f64>,
    sample_rate: u32,
    request_count: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl MockSpeechSynthesizer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            max_input_chars: None,
            seconds_per_char: 0.05,
            fixed_seconds: None,
            sample_rate: 16_000,
            request_count: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Report an input limit so the text gets chunked
    pub fn with_max_input_chars(mut self, limit: usize) -> Self {
        self.max_input_chars = Some(limit);
        self
    }

    /// Produce exactly this much audio per request regardless of the text
    pub fn with_fixed_seconds(mut self, seconds: f64) -> Self {
        self.fixed_seconds = Some(seconds);
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Texts received, in call order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, text: &str, _language: &LanguageTag) -> Result<SynthesizedSpeech, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(text.to_string());
        apply_common(self.behavior, count, "synthesis").await?;

        let seconds = self
            .fixed_seconds
            .unwrap_or_else(|| text.chars().count() as f64 * self.seconds_per_char);

        let audio = match self.behavior {
            MockBehavior::Empty => NarrationAudio::silence(0.0, self.sample_rate),
            MockBehavior::Silent => NarrationAudio::silence(seconds, self.sample_rate),
            MockBehavior::MixedFormats if count % 2 == 1 => {
                NarrationAudio::tone(seconds, self.sample_rate * 2, MOCK_TONE_HZ)
            }
            _ => NarrationAudio::tone(seconds, self.sample_rate, MOCK_TONE_HZ),
        };

        let wav = audio
            .to_wav_bytes()
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(SynthesizedSpeech { wav: Bytes::from(wav) })
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }
}

/// Mock speech recognizer producing evenly spaced segments
#[derive(Debug, Clone)]
pub struct MockSpeechRecognizer {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
}

impl MockSpeechRecognizer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for MockSpeechRecognizer {
    async fn recognize(&self, wav: Bytes, _language: &LanguageTag) -> Result<Vec<RecognizedSegment>, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        apply_common(self.behavior, count, "recognition").await?;

        if self.behavior == MockBehavior::Empty {
            return Ok(Vec::new());
        }

        let audio = NarrationAudio::from_wav_bytes(&wav)
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let duration = audio.duration_seconds();

        let mut segments = Vec::new();
        let mut start = 0.0;
        while start < duration {
            let end = (start + MOCK_SEGMENT_SECONDS).min(duration);
            segments.push(RecognizedSegment {
                start_seconds: start,
                end_seconds: end,
                text: format!("Segment {}", segments.len() + 1),
            });
            start = end;
        }

        match self.behavior {
            MockBehavior::Overshoot => {
                if let Some(last) = segments.last_mut() {
                    last.end_seconds = duration + 1.5;
                }
                segments.push(RecognizedSegment {
                    start_seconds: duration + 0.5,
                    end_seconds: duration + 3.0,
                    text: "Hallucinated tail".to_string(),
                });
            }
            MockBehavior::Unordered => segments.reverse(),
            _ => {}
        }

        Ok(segments)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }
}

/// Stand-in for a media file: a JSON descriptor the mock muxer can probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockMediaFile {
    pub duration_seconds: f64,
    #[serde(default = "default_true")]
    pub has_video: bool,
    #[serde(default)]
    pub audio_tracks: Vec<String>,
    #[serde(default)]
    pub subtitle_streams: usize,
    /// Burned-in caption count, zero for soft or no captions
    #[serde(default)]
    pub burned_captions: usize,
    #[serde(default)]
    pub video_codec: Option<String>,
}

fn default_true() -> bool {
    true
}

impl MockMediaFile {
    /// A video with an original (non-narration) audio track
    pub fn video(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            has_video: true,
            audio_tracks: vec!["Original".to_string()],
            subtitle_streams: 0,
            burned_captions: 0,
            video_codec: Some("h264".to_string()),
        }
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Mock muxer reading and writing `MockMediaFile` descriptors
#[derive(Debug, Clone)]
pub struct MockMediaMuxer {
    behavior: MockBehavior,
    jobs: Arc<Mutex<Vec<MuxJob>>>,
}

impl MockMediaMuxer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// A muxer that writes part of the output and then fails
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Mux jobs received, in call order
    pub fn jobs(&self) -> Vec<MuxJob> {
        self.jobs.lock().clone()
    }

    fn probe_error(path: &Path, e: impl std::fmt::Display) -> ProviderError {
        ProviderError::ProcessFailed {
            program: "mock-ffprobe".to_string(),
            message: format!("{}: {}", path.display(), e),
        }
    }
}

#[async_trait]
impl MediaMuxer for MockMediaMuxer {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, ProviderError> {
        let file = MockMediaFile::read(path).map_err(|e| Self::probe_error(path, e))?;
        Ok(MediaProbe {
            duration_seconds: file.duration_seconds,
            has_video: file.has_video,
            video_codec: file.video_codec,
            audio_track_titles: file.audio_tracks,
            subtitle_streams: file.subtitle_streams,
        })
    }

    async fn mux(&self, job: &MuxJob) -> Result<(), ProviderError> {
        let count = {
            let mut jobs = self.jobs.lock();
            jobs.push(job.clone());
            jobs.len() - 1
        };

        if self.behavior == MockBehavior::Failing {
            // Leave a truncated file behind, like an encoder dying mid-write
            let _ = std::fs::write(&job.output_path, b"{\"duration_seconds\": 1");
            return Err(ProviderError::ProcessFailed {
                program: "mock-ffmpeg".to_string(),
                message: "Simulated encoder crash".to_string(),
            });
        }
        apply_common(self.behavior, count, "mux").await?;

        let video = MockMediaFile::read(&job.video_path).map_err(|e| Self::probe_error(&job.video_path, e))?;
        let narration = std::fs::read(&job.narration_path).map_err(|e| Self::probe_error(&job.narration_path, e))?;
        let narration = NarrationAudio::from_wav_bytes(&narration).map_err(|e| Self::probe_error(&job.narration_path, e))?;

        let (subtitle_streams, burned_captions) = match &job.captions {
            Some(captions) => {
                let srt = std::fs::read_to_string(&captions.path).map_err(|e| Self::probe_error(&captions.path, e))?;
                let cues = srt.lines().filter(|l| l.contains(" --> ")).count();
                match captions.mode {
                    CaptionMode::Soft => (1, 0),
                    CaptionMode::Burn => (0, cues),
                }
            }
            None => (0, 0),
        };

        let output = MockMediaFile {
            duration_seconds: (video.duration_seconds + job.freeze_extend_seconds).max(narration.duration_seconds()),
            has_video: true,
            audio_tracks: vec![NARRATION_TRACK_TITLE.to_string()],
            subtitle_streams,
            burned_captions,
            video_codec: video.video_codec,
        };
        output.write(&job.output_path).map_err(|e| Self::probe_error(&job.output_path, e))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A delivery recorded by `MockResultSink`
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredVideo {
    pub output_name: String,
    pub duration_seconds: f64,
    pub caption_count: usize,
}

/// Mock sink that keeps delivered videos in a directory and records them
#[derive(Debug, Clone)]
pub struct MockResultSink {
    dir: PathBuf,
    delivered: Arc<Mutex<Vec<DeliveredVideo>>>,
}

impl MockResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn delivered(&self) -> Vec<DeliveredVideo> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ResultSink for MockResultSink {
    async fn deliver(&self, video: ComposedVideo, output_name: &str) -> Result<PathBuf, AppError> {
        let destination = self.dir.join(format!("{}.mp4", output_name));
        self.delivered.lock().push(DeliveredVideo {
            output_name: output_name.to_string(),
            duration_seconds: video.duration_seconds(),
            caption_count: video.caption_count(),
        });
        video.persist(&destination)?;
        Ok(destination)
    }
}
