/*!
 * Media composition tests against the mock muxer
 */

use anyhow::Result;

use narravid::captions::CaptionTrack;
use narravid::errors::CompositionError;
use narravid::narration::NarrationAudio;
use narravid::providers::mock::{MockMediaFile, MockMediaMuxer};
use narravid::providers::CaptionMode;

use crate::common::{self, TestPipeline};

fn captions() -> Result<CaptionTrack> {
    Ok(CaptionTrack::parse_srt_string(
        "1\n00:00:00,000 --> 00:00:02,000\nFirst line\n\n2\n00:00:02,000 --> 00:00:03,500\nSecond line\n",
    )?)
}

#[tokio::test]
async fn test_compose_sameInputsTwice_shouldGiveEqualDurations() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 6.0)?;
    let audio = NarrationAudio::tone(7.5, 16_000, 440.0);
    let track = captions()?;
    let composer = TestPipeline::default().composer(dir.path());

    let first_workspace = common::create_temp_dir()?;
    let second_workspace = common::create_temp_dir()?;
    let first = composer.compose(&video, &audio, &track, first_workspace.path()).await?;
    let second = composer.compose(&video, &audio, &track, second_workspace.path()).await?;

    assert_eq!(first.duration_seconds(), second.duration_seconds());
    assert_ne!(first.path(), second.path());
    assert_eq!(first.caption_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_compose_withSoftCaptions_shouldMuxSubtitleStream() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 4.0)?;
    let audio = NarrationAudio::tone(3.5, 16_000, 440.0);
    let composer = TestPipeline::default()
        .with_caption_mode(CaptionMode::Soft)
        .composer(dir.path());

    let composed = composer.compose(&video, &audio, &captions()?, workspace.path()).await?;
    let output = MockMediaFile::read(composed.path())?;

    assert_eq!(output.subtitle_streams, 1);
    assert_eq!(output.burned_captions, 0);
    assert!(workspace.path().join("captions.srt").exists());
    assert!(workspace.path().join("narration.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_compose_withBurnedCaptions_shouldRenderEveryCue() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 4.0)?;
    let audio = NarrationAudio::tone(3.5, 16_000, 440.0);
    let composer = TestPipeline::default().composer(dir.path());

    let composed = composer.compose(&video, &audio, &captions()?, workspace.path()).await?;
    let output = MockMediaFile::read(composed.path())?;

    assert_eq!(output.subtitle_streams, 0);
    assert_eq!(output.burned_captions, 2);
    Ok(())
}

#[tokio::test]
async fn test_compose_withEmptyTrack_shouldSkipCaptionFile() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 4.0)?;
    let audio = NarrationAudio::tone(2.0, 16_000, 440.0);
    let pipeline = TestPipeline::default();

    let composed = pipeline
        .composer(dir.path())
        .compose(&video, &audio, &CaptionTrack::empty(), workspace.path())
        .await?;

    assert_eq!(composed.caption_count(), 0);
    assert!(pipeline.muxer.jobs()[0].captions.is_none());
    assert!(!workspace.path().join("captions.srt").exists());
    Ok(())
}

#[tokio::test]
async fn test_compose_withEmptyTrackOnWebmSource_shouldPassProbedCodecToMuxer() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let path = dir.path().join("clip.webm");
    let mut webm = MockMediaFile::video(4.0);
    webm.video_codec = Some("vp8".to_string());
    webm.write(&path)?;
    let pipeline = TestPipeline::default();

    let composed = pipeline
        .composer(dir.path())
        .compose(&path, &NarrationAudio::tone(2.0, 16_000, 440.0), &CaptionTrack::empty(), workspace.path())
        .await?;

    let jobs = pipeline.muxer.jobs();
    assert_eq!(jobs[0].video_codec.as_deref(), Some("vp8"));
    assert!(jobs[0].captions.is_none());
    assert_eq!(composed.duration_seconds(), 4.0);
    Ok(())
}

#[tokio::test]
async fn test_compose_withUnreadableVideo_shouldReportProbeError() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let not_a_video = common::create_test_file(dir.path(), "clip.mp4", "garbage")?;
    let audio = NarrationAudio::tone(2.0, 16_000, 440.0);

    let result = TestPipeline::default()
        .composer(dir.path())
        .compose(&not_a_video, &audio, &CaptionTrack::empty(), workspace.path())
        .await;

    assert!(matches!(result, Err(CompositionError::Probe { .. })));
    Ok(())
}

#[tokio::test]
async fn test_compose_withAudioOnlySource_shouldReportProbeError() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let path = dir.path().join("podcast.mp4");
    let mut audio_only = MockMediaFile::video(5.0);
    audio_only.has_video = false;
    audio_only.write(&path)?;

    let result = TestPipeline::default()
        .composer(dir.path())
        .compose(&path, &NarrationAudio::tone(1.0, 16_000, 440.0), &CaptionTrack::empty(), workspace.path())
        .await;

    assert!(matches!(result, Err(CompositionError::Probe { .. })));
    Ok(())
}

#[tokio::test]
async fn test_compose_withEmptyNarration_shouldReportZeroDuration() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 4.0)?;
    let pipeline = TestPipeline::default();

    let result = pipeline
        .composer(dir.path())
        .compose(&video, &NarrationAudio::silence(0.0, 16_000), &CaptionTrack::empty(), workspace.path())
        .await;

    assert!(matches!(result, Err(CompositionError::ZeroDuration(_))));
    assert!(pipeline.muxer.jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_composedVideo_shouldBeRemovedOnDropUnlessPersisted() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 2.0)?;
    let audio = NarrationAudio::tone(1.0, 16_000, 440.0);
    let composer = TestPipeline::default().composer(dir.path());

    let dropped = composer.compose(&video, &audio, &CaptionTrack::empty(), workspace.path()).await?;
    let dropped_path = dropped.path().to_path_buf();
    drop(dropped);
    assert!(!dropped_path.exists());

    let kept = composer.compose(&video, &audio, &CaptionTrack::empty(), workspace.path()).await?;
    let destination = dir.path().join("final.mp4");
    kept.persist(&destination)?;
    assert_eq!(MockMediaFile::read(&destination)?.duration_seconds, 2.0);
    Ok(())
}

#[tokio::test]
async fn test_compose_withFailingMuxer_shouldRemoveStagedOutput() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging)?;
    let workspace = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 2.0)?;
    let track = captions()?;

    let result = TestPipeline::default()
        .with_muxer(MockMediaMuxer::failing())
        .composer(&staging)
        .compose(&video, &NarrationAudio::tone(1.0, 16_000, 440.0), &track, workspace.path())
        .await;

    assert!(matches!(result, Err(CompositionError::Mux(_))));
    assert_eq!(common::entry_count(&staging), 0);
    Ok(())
}
