/*!
 * # narravid - narrated, captioned videos from documents
 *
 * A Rust library that turns a static document into a narrated video with
 * captions derived from the narration itself.
 *
 * ## Pipeline
 *
 * raw text -> `text_normalizer` -> `narration` (speech synthesis) ->
 * `alignment` (speech recognition) -> `composition` (ffmpeg mux) -> video
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `text_normalizer`: Cleanup of extracted document text
 * - `narration`: Narration audio and chunked speech synthesis
 * - `captions`: Caption segments and SRT files
 * - `alignment`: Caption tracks from speech recognition
 * - `composition`: Duration reconciliation and muxing
 * - `pipeline`: Per-request state machine and orchestration
 * - `providers`: Capability traits and their clients:
 *   - `providers::document`: Plain text and `pdftotext` extraction
 *   - `providers::openai`: OpenAI-compatible speech and transcription
 *   - `providers::ffmpeg`: ffprobe/ffmpeg muxing
 *   - `providers::sink`: Output directory delivery
 *   - `providers::mock`: In-process stand-ins for tests
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod alignment;
pub mod app_config;
pub mod app_controller;
pub mod captions;
pub mod composition;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod narration;
pub mod pipeline;
pub mod providers;
pub mod text_normalizer;

// Re-export main types for easier usage
pub use app_config::Config;
pub use captions::{CaptionSegment, CaptionTrack};
pub use composition::{ComposedVideo, MediaComposer};
pub use errors::{AlignmentError, AppError, CompositionError, EmptyContentError, PipelineError, ProviderError, SynthesisError};
pub use language_utils::LanguageTag;
pub use narration::{NarrationAudio, NarrationSynthesizer};
pub use pipeline::{PipelineFailure, PipelineOrchestrator, PipelineOutcome, PipelineRequest, PipelineState};
pub use text_normalizer::{normalize, DocumentText, NormalizedText};
