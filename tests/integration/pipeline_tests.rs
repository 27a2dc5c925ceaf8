/*!
 * End-to-end pipeline tests against mock capabilities
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use narravid::errors::PipelineError;
use narravid::pipeline::{PipelineRequest, PipelineStage, PipelineState};
use narravid::providers::document::{DocumentRouter, PdfTextSource, PDF_EXTENSIONS};
use narravid::providers::mock::{
    MockBehavior, MockDocumentSource, MockMediaFile, MockMediaMuxer, MockSpeechRecognizer, MockSpeechSynthesizer,
};
use narravid::text_normalizer::{normalize, DocumentText};

use crate::common::{self, TestPipeline};

fn documents(text: &str) -> Arc<MockDocumentSource> {
    Arc::new(MockDocumentSource::working(text))
}

#[tokio::test]
async fn test_pipeline_withPdfText_shouldReachDoneAndCleanWorkspace() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let work = dir.path().join("work");
    let video = common::create_test_video(dir.path(), "intro.mp4", 2.0)?;
    let pipeline = TestPipeline::default();

    let orchestrator = pipeline.orchestrator(documents(&common::sample_pdf_text()), dir.path(), &work);
    let outcome = orchestrator
        .run(PipelineRequest::new("course.pdf", &video, "lesson"))
        .await?;

    assert_eq!(outcome.state(), &PipelineState::Done);
    assert!(!outcome.degraded);
    assert!(outcome.video.caption_count() > 0);
    assert_eq!(common::entry_count(&work), 0);

    let spoken = pipeline.synthesizer.inputs().join(" ");
    assert!(spoken.contains("without taking ownership"));
    assert!(!spoken.contains("Rust Course"));
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withLongerNarration_shouldFreezeExtendVideo() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "short.mp4", 6.0)?;
    let pipeline = TestPipeline::default().with_synthesizer(MockSpeechSynthesizer::working().with_fixed_seconds(10.0));

    let outcome = pipeline
        .orchestrator(documents("Ten seconds of narration."), dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new("doc.txt", &video, "long"))
        .await?;

    assert!(outcome.video.duration_seconds() >= 10.0);
    let job = &pipeline.muxer.jobs()[0];
    assert!((job.freeze_extend_seconds - 4.0).abs() < 1e-9);
    assert!((job.output_duration_seconds - 10.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withShorterNarration_shouldKeepVideoLengthAndReplaceAudio() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "long.mp4", 9.0)?;
    let pipeline = TestPipeline::default().with_synthesizer(MockSpeechSynthesizer::working().with_fixed_seconds(4.0));

    let outcome = pipeline
        .orchestrator(documents("Four seconds."), dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new("doc.txt", &video, "short"))
        .await?;

    assert!((outcome.video.duration_seconds() - 9.0).abs() < 1e-9);
    let output = MockMediaFile::read(outcome.video.path())?;
    assert_eq!(output.audio_tracks, vec!["Narration".to_string()]);
    assert_eq!(pipeline.muxer.jobs()[0].freeze_extend_seconds, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withUnspeakableDocument_shouldFailBeforeSynthesis() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default();

    let failure = pipeline
        .orchestrator(documents("• • •\n12\n\x0c■ ■\n- 13 -\n"), dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new("doc.pdf", &video, "empty"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Normalize);
    assert!(matches!(failure.error, PipelineError::EmptyContent(_)));
    assert_eq!(pipeline.synthesizer.request_count(), 0);
    assert_eq!(pipeline.muxer.jobs().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withNoRecognizedSegments_shouldFinishDegraded() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default()
        .with_synthesizer(MockSpeechSynthesizer::working().with_fixed_seconds(5.0))
        .with_recognizer(MockSpeechRecognizer::new(MockBehavior::Empty));

    let outcome = pipeline
        .orchestrator(documents("Audible narration."), dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new("doc.txt", &video, "uncaptioned"))
        .await?;

    assert_eq!(outcome.state(), &PipelineState::Done);
    assert!(outcome.degraded);
    assert_eq!(outcome.video.caption_count(), 0);
    assert!(pipeline.muxer.jobs()[0].captions.is_none());
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withSilentNarrationAndNoSegments_shouldNotBeDegraded() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default()
        .with_synthesizer(MockSpeechSynthesizer::new(MockBehavior::Silent).with_fixed_seconds(2.0))
        .with_recognizer(MockSpeechRecognizer::new(MockBehavior::Empty));

    let outcome = pipeline
        .orchestrator(documents("Quiet."), dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new("doc.txt", &video, "quiet"))
        .await?;

    assert!(!outcome.degraded);
    assert_eq!(outcome.video.caption_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withRecognitionOutage_shouldFailAtAlign() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let work = dir.path().join("work");
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default().with_recognizer(MockSpeechRecognizer::new(MockBehavior::Failing));

    let failure = pipeline
        .orchestrator(documents("Some narration."), dir.path(), &work)
        .run(PipelineRequest::new("doc.txt", &video, "broken"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Align);
    assert!(matches!(failure.error, PipelineError::Alignment(_)));
    assert_eq!(common::entry_count(&work), 0);
    assert_eq!(pipeline.muxer.jobs().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withMuxFailure_shouldLeaveNoArtifactBehind() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let staging = dir.path().join("staging");
    let work = dir.path().join("work");
    std::fs::create_dir_all(&staging)?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default().with_muxer(MockMediaMuxer::failing());

    let failure = pipeline
        .orchestrator(documents("Some narration."), &staging, &work)
        .run(PipelineRequest::new("doc.txt", &video, "broken"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Compose);
    assert_eq!(failure.history.last(), Some(&failure.state()));
    assert_eq!(pipeline.muxer.jobs().len(), 1);
    assert!(!pipeline.muxer.jobs()[0].output_path.exists());
    assert_eq!(common::entry_count(&staging), 0);
    assert_eq!(common::entry_count(&work), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withUnsupportedDocument_shouldFailAtExtract() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let slides = common::create_test_file(dir.path(), "slides.pptx", "binary")?;
    let pipeline = TestPipeline::default();
    let router = Arc::new(DocumentRouter::standard(PdfTextSource::default()));

    let failure = pipeline
        .orchestrator(router, dir.path(), &dir.path().join("work"))
        .run(PipelineRequest::new(&slides, &video, "slides"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Extract);
    assert_eq!(failure.history.len(), 2);
    assert_eq!(pipeline.synthesizer.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_concurrentRequests_shouldStayIndependent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let work = dir.path().join("work");
    let video = common::create_test_video(dir.path(), "tiny.mp4", 0.5)?;
    let pipeline = TestPipeline::default();

    let texts = [
        "One short sentence.",
        "A somewhat longer sentence that keeps going for a while.",
        "Two sentences here. And the second one.",
        "Narration number four is the longest of all of these, by quite a margin indeed.",
    ];

    let mut tasks = Vec::new();
    for (index, text) in texts.iter().enumerate() {
        let path = common::create_test_file(dir.path(), &format!("doc{}.txt", index), text)?;
        let orchestrator = pipeline.orchestrator(
            Arc::new(DocumentRouter::standard(PdfTextSource::default())),
            dir.path(),
            &work,
        );
        let request = PipelineRequest::new(path, &video, format!("out{}", index));
        tasks.push(tokio::spawn(async move { orchestrator.run(request).await }));
    }

    for (index, task) in tasks.into_iter().enumerate() {
        let outcome = task.await?.map_err(|f| anyhow::anyhow!(f.to_string()))?;
        let expected = normalize(&DocumentText::new(texts[index]))?.char_count() as f64 * 0.05;

        assert_eq!(outcome.output_name, format!("out{}", index));
        assert!((outcome.video.duration_seconds() - expected).abs() < 1e-3);
    }
    assert_eq!(pipeline.synthesizer.request_count(), texts.len());
    assert_eq!(common::entry_count(&work), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_cancelledDuringSynthesis_shouldFailAndReleaseWorkspace() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let work = dir.path().join("work");
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default()
        .with_synthesizer(MockSpeechSynthesizer::new(MockBehavior::Slow { delay_ms: 10_000 }));
    let orchestrator = pipeline.orchestrator(documents("Slow narration."), dir.path(), &work);

    let token = CancellationToken::new();
    let request_token = token.clone();
    let started = Instant::now();
    let task = tokio::spawn(async move {
        orchestrator
            .run_with_cancellation(PipelineRequest::new("doc.txt", &video, "slow"), request_token)
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    let failure = task.await?.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(failure.is_cancelled());
    assert_eq!(failure.stage, PipelineStage::Synthesize);
    assert_eq!(failure.reason, "cancelled");
    assert_eq!(common::entry_count(&work), 0);
    assert_eq!(pipeline.muxer.jobs().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_droppedRequest_shouldReleaseWorkspace() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let work = dir.path().join("work");
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default()
        .with_synthesizer(MockSpeechSynthesizer::new(MockBehavior::Slow { delay_ms: 10_000 }));
    let orchestrator = pipeline.orchestrator(documents("Slow narration."), dir.path(), &work);

    let run = orchestrator.run(PipelineRequest::new("doc.txt", &video, "dropped"));
    let result = tokio::time::timeout(Duration::from_millis(100), run).await;

    assert!(result.is_err());
    assert_eq!(common::entry_count(&work), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_withLanguageOverride_shouldUseRequestLanguage() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let video = common::create_test_video(dir.path(), "clip.mp4", 3.0)?;
    let pipeline = TestPipeline::default();
    let pdf = MockDocumentSource::working("Bonjour tout le monde.");
    let router = DocumentRouter::standard(PdfTextSource::default()).with_source(PDF_EXTENSIONS, Arc::new(pdf.clone()));

    let request = PipelineRequest::new("cours.pdf", &video, "fr").with_language("fra".parse()?);
    assert_eq!(request.language.as_ref().map(|l| l.as_str()), Some("fr"));

    let outcome = pipeline
        .orchestrator(Arc::new(router), dir.path(), &dir.path().join("work"))
        .run(request)
        .await?;

    assert_eq!(outcome.state(), &PipelineState::Done);
    assert_eq!(pdf.request_count(), 1);
    Ok(())
}
