/*!
 * Error types for the narravid application.
 *
 * Each pipeline stage has its own error type so the orchestrator can tell a
 * recoverable condition from a request-fatal one. Capability clients report
 * transport problems as `ProviderError`, which the stage errors wrap.
 */

use thiserror::Error;

/// Errors that can occur when talking to an external capability
/// (speech service, recognition service, ffmpeg, pdftotext)
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An external process exited unsuccessfully
    #[error("Process {program} failed: {message}")]
    ProcessFailed {
        /// Executable name
        program: String,
        /// Filtered stderr or exit status
        message: String,
    },
}

impl ProviderError {
    /// Whether a client may retry the call that produced this error
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Errors raised while pulling raw text out of a document
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The document could not be read
    #[error("Failed to read document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document type is not supported by any source
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The extraction tool failed
    #[error("Extraction tool failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Raised when a document has nothing left to say after cleaning
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Document contains no speakable content after normalization")]
pub struct EmptyContentError;

/// Errors that can occur while producing narration audio
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// The speech capability failed or was unreachable
    #[error("Speech service error: {0}")]
    Provider(#[from] ProviderError),

    /// The input was refused before any call (unsupported language, empty text)
    #[error("Synthesis input rejected: {0}")]
    Rejected(String),

    /// The returned audio could not be decoded
    #[error("Invalid audio returned by speech service: {0}")]
    InvalidAudio(String),

    /// Chunks came back in different formats and cannot be concatenated
    #[error("Audio chunk {index} has format {found}, expected {expected}")]
    FormatMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Decoding produced no samples
    #[error("Speech service returned empty audio")]
    EmptyAudio,
}

/// Errors that can occur while deriving captions from narration
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// Recognition produced no usable segment for audible narration
    #[error("Recognition produced no segments for {duration_seconds:.2}s of audible narration")]
    NoSegments { duration_seconds: f64 },

    /// The recognition capability failed or was unreachable
    #[error("Recognition service error: {0}")]
    Recognition(#[from] ProviderError),

    /// The narration could not be encoded for the recognizer
    #[error("Failed to encode narration audio: {0}")]
    Encoding(String),
}

impl AlignmentError {
    /// Only the zero-segment case may be degraded to an empty caption track
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoSegments { .. })
    }
}

/// Errors that can occur while encoding the final video
#[derive(Error, Debug)]
pub enum CompositionError {
    /// The source video could not be probed
    #[error("Failed to read source video {path}: {message}")]
    Probe { path: String, message: String },

    /// One of the timelines is empty
    #[error("Zero-duration input: {0}")]
    ZeroDuration(String),

    /// The encoder/muxer failed
    #[error("Mux failed: {0}")]
    Mux(#[from] ProviderError),

    /// Writing intermediate or staged files failed
    #[error("File error during composition: {0}")]
    Io(#[from] std::io::Error),
}

/// Any error that ends (or degrades) a pipeline request
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    EmptyContent(#[from] EmptyContentError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    /// The request was cancelled by its caller
    #[error("Request cancelled")]
    Cancelled,

    /// A state transition skipped or repeated a stage
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The per-request workspace could not be created
    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pipeline request failed
    #[error("Pipeline failed at {stage}: {reason}")]
    Pipeline { stage: String, reason: String },

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
