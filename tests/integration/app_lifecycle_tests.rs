/*!
 * Integration tests for application lifecycle
 */

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use narravid::app_config::{Config, ServiceProvider};
use narravid::app_controller::{run_with_progress, Controller};
use narravid::pipeline::PipelineRequest;
use narravid::providers::document::{DocumentRouter, PdfTextSource};
use narravid::providers::mock::{MockDocumentSource, MockMediaFile, MockResultSink, MockSpeechSynthesizer};
use narravid::providers::sink::DirectorySink;

use crate::common::{self, TestPipeline};

fn offline_config() -> Config {
    let mut config = Config::default();
    config.speech.provider = ServiceProvider::LocalAI;
    config.recognition.provider = ServiceProvider::LocalAI;
    for provider in config
        .speech
        .available_providers
        .iter_mut()
        .chain(config.recognition.available_providers.iter_mut())
    {
        provider.endpoint = "http://127.0.0.1:9/v1".to_string();
        provider.timeout_secs = 2;
    }
    config.composition.ffmpeg_path = "/nonexistent/ffmpeg".to_string();
    config.composition.ffprobe_path = "/nonexistent/ffprobe".to_string();
    config
}

#[tokio::test]
async fn test_runWithProgress_shouldDeliverThroughSink() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default();
    let orchestrator = pipeline.orchestrator(
        Arc::new(MockDocumentSource::working("A short narrated lesson.")),
        dir.path(),
        &dir.path().join("work"),
    );
    let sink = MockResultSink::new(dir.path());

    let path = run_with_progress(
        &orchestrator,
        &sink,
        PipelineRequest::new("doc.txt", &video, "lesson"),
        CancellationToken::new(),
    )
    .await?;

    assert_eq!(path, dir.path().join("lesson.mp4"));
    assert!(MockMediaFile::read(&path)?.duration_seconds >= 3.0);
    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].output_name, "lesson");
    Ok(())
}

#[tokio::test]
async fn test_runWithProgress_withDirectorySink_shouldWriteSanitizedName() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let out = dir.path().join("out");
    let document = common::create_test_file(dir.path(), "notes.md", "# Notes\n\nNarrate these notes.")?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 1.0)?;
    std::fs::create_dir_all(&out)?;

    let orchestrator = TestPipeline::default().orchestrator(
        Arc::new(DocumentRouter::standard(PdfTextSource::default())),
        &out,
        &dir.path().join("work"),
    );
    let path = run_with_progress(
        &orchestrator,
        &DirectorySink::new(&out, false),
        PipelineRequest::new(&document, &video, "../Lesson: One.mp4"),
        CancellationToken::new(),
    )
    .await?;

    assert_eq!(path, out.join("Lesson_ One.mp4"));
    assert_eq!(common::entry_count(&out), 1);
    Ok(())
}

#[tokio::test]
async fn test_runWithProgress_withFailure_shouldReportStageAndDeliverNothing() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let orchestrator = TestPipeline::default()
        .with_synthesizer(MockSpeechSynthesizer::failing())
        .orchestrator(
            Arc::new(MockDocumentSource::working("Text.")),
            dir.path(),
            &dir.path().join("work"),
        );
    let sink = MockResultSink::new(dir.path());

    let error = run_with_progress(
        &orchestrator,
        &sink,
        PipelineRequest::new("doc.txt", &video, "lesson"),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(error.to_string().contains("synthesize"));
    assert!(sink.delivered().is_empty());
    assert!(!dir.path().join("lesson.mp4").exists());
    Ok(())
}

#[test]
fn test_controller_withDefaultConfig_shouldRequireApiKey() {
    assert!(Controller::with_config(Config::default()).is_err());
    assert!(Controller::with_config(offline_config()).is_ok());
}

#[test]
fn test_controller_check_withUnreachableServices_shouldFail() -> Result<()> {
    let controller = Controller::with_config(offline_config())?;
    let error = tokio_test::block_on(controller.check()).unwrap_err().to_string();

    assert!(error.contains("speech"));
    assert!(error.contains("recognition"));
    assert!(error.contains("ffmpeg"));
    Ok(())
}

#[tokio::test]
async fn test_controller_run_withSwappedInputs_shouldFailValidation() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let document = common::create_test_file(dir.path(), "doc.txt", "Hello.")?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 2.0)?;
    let controller = Controller::with_config(offline_config())?;

    let result = controller
        .run(video, document, "lesson", dir.path().join("out"), false)
        .await;

    assert!(result.is_err());
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test]
fn test_config_saveAndLoad_shouldRoundTripOverrides() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");
    let mut config = offline_config();
    config.language = "es".to_string();
    config.save(&path)?;

    let loaded = Config::from_file(&path)?;
    assert_eq!(loaded.language, "es");
    assert_eq!(loaded.speech.provider, ServiceProvider::LocalAI);
    assert_eq!(loaded.speech.api_settings().endpoint, "http://127.0.0.1:9/v1");
    loaded.validate()?;
    Ok(())
}
