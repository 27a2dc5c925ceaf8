/*!
 * Tests for caption alignment against narration audio
 */

use std::sync::Arc;

use anyhow::Result;
use narravid::alignment::{normalize_segments, SubtitleAligner};
use narravid::captions::CaptionTrack;
use narravid::errors::AlignmentError;
use narravid::language_utils::LanguageTag;
use narravid::narration::NarrationAudio;
use narravid::providers::mock::{MockBehavior, MockSpeechRecognizer};
use narravid::providers::RecognizedSegment;

fn segment(start: f64, end: f64, text: &str) -> RecognizedSegment {
    RecognizedSegment { start_seconds: start, end_seconds: end, text: text.to_string() }
}

/// Every caption lies inside the narration and none overlap beyond the tolerance
fn assert_well_formed(track: &CaptionTrack, duration: f64, tolerance: f64) {
    let mut previous_end: Option<f64> = None;
    for caption in track.iter() {
        assert!(caption.start_seconds >= 0.0);
        assert!(caption.end_seconds > caption.start_seconds);
        assert!(caption.end_seconds <= duration);
        if let Some(end) = previous_end {
            assert!(end - caption.start_seconds <= tolerance);
        }
        previous_end = Some(caption.end_seconds);
    }
}

#[tokio::test]
async fn test_align_withWorkingRecognizer_shouldCoverNarration() -> Result<()> {
    let audio = NarrationAudio::tone(5.0, 16_000, 440.0);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::working()));

    let track = aligner.align(&audio, &LanguageTag::default()).await?;

    assert_eq!(track.len(), 3);
    assert_eq!(track.end_seconds(), 5.0);
    assert_well_formed(&track, 5.0, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_align_withOvershootingRecognizer_shouldClampToNarration() -> Result<()> {
    let audio = NarrationAudio::tone(3.0, 16_000, 440.0);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::new(MockBehavior::Overshoot)));

    let track = aligner.align(&audio, &LanguageTag::default()).await?;

    assert!(track.iter().all(|c| c.text != "Hallucinated tail"));
    assert_eq!(track.end_seconds(), 3.0);
    assert_well_formed(&track, 3.0, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_align_withUnorderedSegments_shouldSortByStart() -> Result<()> {
    let audio = NarrationAudio::tone(6.5, 16_000, 440.0);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::new(MockBehavior::Unordered)));

    let track = aligner.align(&audio, &LanguageTag::default()).await?;
    let texts: Vec<&str> = track.iter().map(|c| c.text.as_str()).collect();

    assert_eq!(texts, vec!["Segment 1", "Segment 2", "Segment 3", "Segment 4"]);
    assert_well_formed(&track, 6.5, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_align_withNoSegmentsForSpeech_shouldReturnRecoverableError() -> Result<()> {
    let audio = NarrationAudio::tone(2.0, 16_000, 440.0);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::new(MockBehavior::Empty)));

    let error = aligner.align(&audio, &LanguageTag::default()).await.unwrap_err();

    assert!(matches!(error, AlignmentError::NoSegments { .. }));
    assert!(error.is_recoverable());
    Ok(())
}

#[tokio::test]
async fn test_align_withNoSegmentsForSilence_shouldReturnEmptyTrack() -> Result<()> {
    let audio = NarrationAudio::silence(2.0, 16_000);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::new(MockBehavior::Empty)));

    let track = aligner.align(&audio, &LanguageTag::default()).await?;

    assert!(track.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_align_withRecognitionOutage_shouldNotBeRecoverable() {
    let audio = NarrationAudio::tone(1.0, 16_000, 440.0);
    let aligner = SubtitleAligner::new(Arc::new(MockSpeechRecognizer::new(MockBehavior::Failing)));

    let error = aligner.align(&audio, &LanguageTag::default()).await.unwrap_err();

    assert!(matches!(error, AlignmentError::Recognition(_)));
    assert!(!error.is_recoverable());
}

#[test]
fn test_normalizeSegments_shouldTrimOverlapsBeyondTolerance() {
    let track = normalize_segments(
        vec![
            segment(0.0, 2.0, "first"),
            segment(1.98, 3.0, "small overlap"),
            segment(2.5, 4.0, "large overlap"),
        ],
        4.0,
        0.05,
    );
    let spans: Vec<(f64, f64)> = track.iter().map(|c| (c.start_seconds, c.end_seconds)).collect();

    assert_eq!(spans, vec![(0.0, 2.0), (1.98, 2.5), (2.5, 4.0)]);
    assert_well_formed(&track, 4.0, 0.05);
}

#[test]
fn test_normalizeSegments_shouldDropBlankAndInvalidSegments() {
    let track = normalize_segments(
        vec![
            segment(-0.5, 1.0, " starts early "),
            segment(1.0, 1.0, "zero length"),
            segment(1.2, 1.8, "   "),
            segment(f64::NAN, 2.0, "nan"),
            segment(2.0, 2.5, "kept"),
        ],
        10.0,
        0.05,
    );
    let texts: Vec<&str> = track.iter().map(|c| c.text.as_str()).collect();

    assert_eq!(texts, vec!["starts early", "kept"]);
    assert_eq!(track.iter().next().map(|c| c.start_seconds), Some(0.0));
}

#[test]
fn test_normalizeSegments_withOverlapSwallowingCaption_shouldDropIt() {
    let track = normalize_segments(
        vec![segment(1.0, 3.0, "later"), segment(1.0, 2.0, "same start")],
        5.0,
        0.05,
    );
    let texts: Vec<&str> = track.iter().map(|c| c.text.as_str()).collect();

    assert_eq!(texts, vec!["later"]);
}
