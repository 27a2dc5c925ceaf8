/*!
 * Caption alignment against the synthesized narration.
 *
 * The narration is transcribed back by a recognition service, and its timed
 * segments become the caption track. Whatever the recognizer returns is
 * normalized so that every caption lies inside the narration timeline.
 */

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::captions::{CaptionSegment, CaptionTrack};
use crate::errors::AlignmentError;
use crate::language_utils::LanguageTag;
use crate::narration::NarrationAudio;
use crate::providers::{RecognizedSegment, SpeechRecognizer};

/// Default overlap allowed between consecutive captions
pub const DEFAULT_OVERLAP_TOLERANCE_SECONDS: f64 = 0.05;

/// Derives caption tracks from narration audio
#[derive(Debug, Clone)]
pub struct SubtitleAligner {
    recognizer: Arc<dyn SpeechRecognizer>,
    overlap_tolerance_seconds: f64,
}

impl SubtitleAligner {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            overlap_tolerance_seconds: DEFAULT_OVERLAP_TOLERANCE_SECONDS,
        }
    }

    pub fn with_overlap_tolerance(mut self, tolerance_seconds: f64) -> Self {
        self.overlap_tolerance_seconds = tolerance_seconds.max(0.0);
        self
    }

    /// Transcribe the narration and turn the result into a caption track
    pub async fn align(
        &self,
        audio: &NarrationAudio,
        language: &LanguageTag,
    ) -> Result<CaptionTrack, AlignmentError> {
        let wav = audio
            .to_wav_bytes()
            .map_err(|e| AlignmentError::Encoding(e.to_string()))?;

        let recognized = self.recognizer.recognize(Bytes::from(wav), language).await?;
        let duration = audio.duration_seconds();
        let received = recognized.len();

        let track = normalize_segments(recognized, duration, self.overlap_tolerance_seconds);

        if track.is_empty() {
            if audio.is_silent() {
                info!("Narration is silent, continuing without captions");
                return Ok(track);
            }
            warn!("Recognition returned {} segment(s), none usable", received);
            return Err(AlignmentError::NoSegments { duration_seconds: duration });
        }

        debug!("Aligned {} of {} recognized segment(s) to {:.2}s of narration", track.len(), received, duration);
        Ok(track)
    }
}

/// Clamp, order and de-overlap raw recognizer output against the narration length
pub fn normalize_segments(
    segments: Vec<RecognizedSegment>,
    duration_seconds: f64,
    overlap_tolerance_seconds: f64,
) -> CaptionTrack {
    let mut captions: Vec<CaptionSegment> = segments
        .into_iter()
        .filter_map(|segment| {
            let text = segment.text.trim();
            if text.is_empty() || !segment.start_seconds.is_finite() || !segment.end_seconds.is_finite() {
                return None;
            }
            Some(CaptionSegment::new(
                segment.start_seconds.max(0.0),
                segment.end_seconds,
                text,
            ))
        })
        .collect();

    captions.sort_by(|a, b| {
        a.start_seconds
            .total_cmp(&b.start_seconds)
            .then(a.end_seconds.total_cmp(&b.end_seconds))
    });

    let mut aligned: Vec<CaptionSegment> = Vec::with_capacity(captions.len());
    for mut caption in captions {
        if caption.start_seconds >= duration_seconds {
            continue;
        }
        caption.end_seconds = caption.end_seconds.min(duration_seconds);
        if caption.end_seconds <= caption.start_seconds {
            continue;
        }

        if let Some(previous) = aligned.last_mut() {
            if previous.end_seconds - caption.start_seconds > overlap_tolerance_seconds {
                previous.end_seconds = caption.start_seconds;
            }
        }
        // A previous caption trimmed to nothing is dropped
        if aligned.last().is_some_and(|p| p.end_seconds <= p.start_seconds) {
            aligned.pop();
        }

        aligned.push(caption);
    }

    CaptionTrack::from_sorted(aligned)
}
