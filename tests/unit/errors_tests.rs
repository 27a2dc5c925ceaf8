/*!
 * Tests for error classification and messages
 */

use narravid::errors::{
    AlignmentError, AppError, CompositionError, EmptyContentError, ExtractionError, PipelineError, ProviderError,
    SynthesisError,
};

#[test]
fn test_providerError_isTransient_shouldFlagRetryableFailures() {
    assert!(ProviderError::ConnectionError("reset".to_string()).is_transient());
    assert!(ProviderError::Timeout("slow".to_string()).is_transient());
    assert!(ProviderError::RateLimitExceeded("429".to_string()).is_transient());
    assert!(ProviderError::ApiError { status_code: 503, message: "busy".to_string() }.is_transient());

    assert!(!ProviderError::ApiError { status_code: 400, message: "bad".to_string() }.is_transient());
    assert!(!ProviderError::AuthenticationError("key".to_string()).is_transient());
    assert!(!ProviderError::ParseError("json".to_string()).is_transient());
}

#[test]
fn test_pipelineError_fromStageErrors_shouldKeepCauseInMessage() {
    let extraction: PipelineError = ExtractionError::UnsupportedFormat("pptx".to_string()).into();
    let empty: PipelineError = EmptyContentError.into();
    let synthesis: PipelineError = SynthesisError::EmptyAudio.into();
    let composition: PipelineError = CompositionError::ZeroDuration("video".to_string()).into();

    assert_eq!(extraction.to_string(), "Extraction error: Unsupported document format: pptx");
    assert_eq!(empty.to_string(), "Document contains no speakable content after normalization");
    assert!(synthesis.to_string().contains("empty audio"));
    assert!(composition.to_string().contains("Zero-duration input: video"));
}

#[test]
fn test_alignmentError_onlyNoSegmentsIsRecoverable() {
    assert!(AlignmentError::NoSegments { duration_seconds: 2.0 }.is_recoverable());
    assert!(!AlignmentError::Encoding("wav".to_string()).is_recoverable());
    assert!(!AlignmentError::Recognition(ProviderError::Timeout("t".to_string())).is_recoverable());
}

#[test]
fn test_appError_pipeline_shouldNameStage() {
    let error = AppError::Pipeline { stage: "compose".to_string(), reason: "Mux failed".to_string() };
    assert_eq!(error.to_string(), "Pipeline failed at compose: Mux failed");
}
