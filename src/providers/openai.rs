/*!
 * OpenAI-compatible speech and transcription clients.
 *
 * Works against api.openai.com as well as self-hosted servers exposing the
 * same routes (LocalAI and friends):
 * - `POST {endpoint}/audio/speech` for synthesis, WAV response
 * - `POST {endpoint}/audio/transcriptions` for recognition, `verbose_json` response
 *
 * Server errors, rate limits and network failures are retried with
 * exponential backoff; client errors are returned immediately.
 */

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::language_utils::LanguageTag;
use crate::providers::{RecognizedSegment, SpeechRecognizer, SpeechSynthesizer, SynthesizedSpeech};

/// Connection settings shared by both clients
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL including the API version, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    /// Bearer token, empty for servers without authentication
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    pub backoff_base_ms: u64,
}

/// HTTP plumbing with retry, shared by the speech and transcription clients
#[derive(Debug, Clone)]
struct ApiConnection {
    base_url: String,
    api_key: String,
    client: Client,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ApiConnection {
    fn new(settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    /// Send a request, rebuilding it for every attempt
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> Result<RequestBuilder, ProviderError>,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.max_retries {
            let request = self.authorize(build()?);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let error_text = response.text().await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    let err = classify_status(status, error_text);

                    if !err.is_transient() {
                        // Client error - don't retry
                        error!("{} request rejected: {}", what, err);
                        return Err(err);
                    }
                    error!("{} request failed: {} - attempt {}/{}", what, err, attempt + 1, self.max_retries + 1);
                    last_error = Some(err);
                }
                Err(e) if e.is_builder() => {
                    return Err(ProviderError::RequestFailed(format!("Invalid {} request: {}", what, e)));
                }
                Err(e) => {
                    // Network error - can retry
                    let err = if e.is_timeout() {
                        ProviderError::Timeout(format!("{} request: {}", what, e))
                    } else {
                        ProviderError::ConnectionError(format!("{} request: {}", what, e))
                    };
                    error!("{} network error: {} - attempt {}/{}", what, err, attempt + 1, self.max_retries + 1);
                    last_error = Some(err);
                }
            }

            attempt += 1;

            // If we have more retries left, wait with exponential backoff
            if attempt <= self.max_retries {
                let backoff_ms = self.backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::RequestFailed(format!("{} request failed after {} attempts", what, self.max_retries + 1))
        }))
    }

    /// Lightweight authenticated GET used to check reachability
    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self
            .authorize(self.client.get(self.url("models")))
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(classify_status(status, error_text))
    }
}

fn classify_status(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message,
        },
    }
}

/// Body of a speech request
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
}

/// Text-to-speech client for `/audio/speech`
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    connection: ApiConnection,
    model: String,
    voice: String,
    speed: f32,
    max_input_chars: Option<usize>,
}

impl OpenAiSpeech {
    pub fn new(settings: &ApiSettings, voice: impl Into<String>, speed: f32, max_input_chars: Option<usize>) -> Self {
        Self {
            connection: ApiConnection::new(settings),
            model: settings.model.clone(),
            voice: voice.into(),
            speed,
            max_input_chars,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, language: &LanguageTag) -> Result<SynthesizedSpeech, ProviderError> {
        // The speech route infers the language from the text itself
        debug!("Requesting {} chars of {} speech from {}", text.chars().count(), language, self.model);

        let url = self.connection.url("audio/speech");
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
            speed: self.speed,
        };

        let response = self
            .connection
            .send_with_retry("Speech", || Ok(self.connection.client.post(&url).json(&body)))
            .await?;

        let wav = response
            .bytes()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read speech audio: {}", e)))?;

        if !wav.starts_with(b"RIFF") {
            return Err(ProviderError::ParseError(format!(
                "Expected WAV audio, got {} bytes starting with {:?}",
                wav.len(),
                String::from_utf8_lossy(&wav[..wav.len().min(16)])
            )));
        }

        Ok(SynthesizedSpeech { wav })
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.connection.test_connection().await
    }
}

/// `verbose_json` transcription response
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Speech-to-text client for `/audio/transcriptions`
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    connection: ApiConnection,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(settings: &ApiSettings) -> Self {
        Self {
            connection: ApiConnection::new(settings),
            model: settings.model.clone(),
        }
    }

    fn build_form(&self, wav: &Bytes, language: &LanguageTag) -> Result<Form, ProviderError> {
        let file = Part::bytes(wav.to_vec())
            .file_name("narration.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        Ok(Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("language", language.as_str().to_string()))
    }
}

/// Turn a transcription response into recognized segments
fn segments_from_response(response: TranscriptionResponse) -> Vec<RecognizedSegment> {
    if response.segments.is_empty() {
        // Some servers only return the full text and duration
        return match response.duration {
            Some(duration) if duration > 0.0 && !response.text.trim().is_empty() => {
                warn!("Transcription has no segments, using the full text as one caption");
                vec![RecognizedSegment {
                    start_seconds: 0.0,
                    end_seconds: duration,
                    text: response.text,
                }]
            }
            _ => Vec::new(),
        };
    }

    response
        .segments
        .into_iter()
        .map(|s| RecognizedSegment {
            start_seconds: s.start,
            end_seconds: s.end,
            text: s.text,
        })
        .collect()
}

#[async_trait]
impl SpeechRecognizer for OpenAiTranscriber {
    async fn recognize(&self, wav: Bytes, language: &LanguageTag) -> Result<Vec<RecognizedSegment>, ProviderError> {
        debug!("Transcribing {} bytes of narration with {}", wav.len(), self.model);

        let url = self.connection.url("audio/transcriptions");
        let response = self
            .connection
            .send_with_retry("Transcription", || {
                Ok(self.connection.client.post(&url).multipart(self.build_form(&wav, language)?))
            })
            .await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read transcription: {}", e)))?;

        let parsed: TranscriptionResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!(
                "Failed to parse transcription response: {}. Raw response (first 500 chars): {}",
                e,
                response_text.chars().take(500).collect::<String>()
            );
            ProviderError::ParseError(e.to_string())
        })?;

        Ok(segments_from_response(parsed))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.connection.test_connection().await
    }
}
