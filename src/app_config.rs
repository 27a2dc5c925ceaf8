use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::language_utils::LanguageTag;
use crate::providers::openai::ApiSettings;
use crate::providers::CaptionMode;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Narration language code (ISO 639-1 or 639-2)
    #[serde(default = "default_language")]
    pub language: String,

    /// Document extraction settings
    #[serde(default)]
    pub document: DocumentConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Speech recognition settings
    #[serde(default)]
    pub recognition: RecognitionConfig,

    /// ffmpeg settings
    #[serde(default)]
    pub composition: CompositionConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Speech service provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProvider {
    // @provider: OpenAI hosted API
    #[default]
    OpenAI,
    // @provider: LocalAI (OpenAI-compatible local server)
    LocalAI,
}

impl ServiceProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::LocalAI => "LocalAI",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::LocalAI => "localai".to_string(),
        }
    }

    // @returns: Whether the provider refuses unauthenticated requests
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl std::fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for ServiceProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "localai" => Ok(Self::LocalAI),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Which service a provider entry configures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Speech,
    Recognition,
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max chars per request, 0 for unlimited
    #[serde(default)]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @param kind: Speech or recognition entry
    // @returns: Provider config with defaults
    pub fn new(provider_type: ServiceProvider, kind: ServiceKind) -> Self {
        let endpoint = match provider_type {
            ServiceProvider::OpenAI => default_openai_endpoint(),
            ServiceProvider::LocalAI => default_localai_endpoint(),
        };
        match kind {
            ServiceKind::Speech => Self {
                provider_type: provider_type.to_lowercase_string(),
                model: default_speech_model(),
                api_key: String::new(),
                endpoint,
                max_chars_per_request: default_speech_max_chars(),
                timeout_secs: default_timeout_secs(),
            },
            ServiceKind::Recognition => Self {
                provider_type: provider_type.to_lowercase_string(),
                model: default_recognition_model(),
                api_key: String::new(),
                endpoint,
                max_chars_per_request: 0,
                timeout_secs: default_recognition_timeout_secs(),
            },
        }
    }
}

fn find_provider<'a>(providers: &'a [ProviderConfig], provider: &ServiceProvider) -> Option<&'a ProviderConfig> {
    let provider_str = provider.to_lowercase_string();
    providers.iter().find(|p| p.provider_type == provider_str)
}

// Entry for the provider, with empty fields filled from its defaults
fn resolve_provider(providers: &[ProviderConfig], provider: ServiceProvider, kind: ServiceKind) -> ProviderConfig {
    let defaults = ProviderConfig::new(provider, kind);
    let Some(configured) = find_provider(providers, &provider) else {
        return defaults;
    };

    let mut resolved = configured.clone();
    if resolved.model.is_empty() {
        resolved.model = defaults.model;
    }
    if resolved.endpoint.is_empty() {
        resolved.endpoint = defaults.endpoint;
    }
    resolved
}

/// Document extraction configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DocumentConfig {
    /// Path to the poppler `pdftotext` binary
    #[serde(default = "default_pdftotext_path")]
    pub pdftotext_path: String,

    /// Extraction timeout in seconds
    #[serde(default = "default_document_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            pdftotext_path: default_pdftotext_path(),
            timeout_secs: default_document_timeout_secs(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Synthesis provider to use
    #[serde(default)]
    pub provider: ServiceProvider,

    /// Available synthesis providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Voice name sent with each request
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speaking rate, 0.25 to 4.0
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl SpeechConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        find_provider(&self.available_providers, &self.provider)
    }

    /// Connection settings for the active provider
    pub fn api_settings(&self) -> ApiSettings {
        let provider = resolve_provider(&self.available_providers, self.provider, ServiceKind::Speech);
        ApiSettings {
            endpoint: provider.endpoint,
            api_key: provider.api_key,
            model: provider.model,
            timeout_secs: provider.timeout_secs,
            max_retries: self.retry_count,
            backoff_base_ms: self.retry_backoff_ms,
        }
    }

    /// Input limit of the active provider, `None` when unlimited
    pub fn max_input_chars(&self) -> Option<usize> {
        let provider = resolve_provider(&self.available_providers, self.provider, ServiceKind::Speech);
        (provider.max_chars_per_request > 0).then_some(provider.max_chars_per_request)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: ServiceProvider::default(),
            available_providers: vec![
                ProviderConfig::new(ServiceProvider::OpenAI, ServiceKind::Speech),
                ProviderConfig::new(ServiceProvider::LocalAI, ServiceKind::Speech),
            ],
            voice: default_voice(),
            speed: default_speed(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    /// Recognition provider to use
    #[serde(default)]
    pub provider: ServiceProvider,

    /// Available recognition providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Caption overlap tolerated before trimming, in milliseconds
    #[serde(default = "default_overlap_tolerance_ms")]
    pub overlap_tolerance_ms: u64,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl RecognitionConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        find_provider(&self.available_providers, &self.provider)
    }

    /// Connection settings for the active provider
    pub fn api_settings(&self) -> ApiSettings {
        let provider = resolve_provider(&self.available_providers, self.provider, ServiceKind::Recognition);
        ApiSettings {
            endpoint: provider.endpoint,
            api_key: provider.api_key,
            model: provider.model,
            timeout_secs: provider.timeout_secs,
            max_retries: self.retry_count,
            backoff_base_ms: self.retry_backoff_ms,
        }
    }

    pub fn overlap_tolerance_seconds(&self) -> f64 {
        self.overlap_tolerance_ms as f64 / 1000.0
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            provider: ServiceProvider::default(),
            available_providers: vec![
                ProviderConfig::new(ServiceProvider::OpenAI, ServiceKind::Recognition),
                ProviderConfig::new(ServiceProvider::LocalAI, ServiceKind::Recognition),
            ],
            overlap_tolerance_ms: default_overlap_tolerance_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Media composition configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompositionConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Encoder used when the picture has to be re-encoded
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Burn captions into the picture or mux them as a subtitle stream
    #[serde(default)]
    pub caption_mode: CaptionMode,

    /// ASS style applied to burned captions
    #[serde(default = "default_subtitle_style")]
    pub subtitle_style: String,

    /// Timeout for a single ffmpeg run in seconds
    #[serde(default = "default_composition_timeout_secs")]
    pub timeout_secs: u64,
}

impl CompositionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            caption_mode: CaptionMode::default(),
            subtitle_style: default_subtitle_style(),
            timeout_secs: default_composition_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_recognition_timeout_secs() -> u64 {
    300
}

fn default_document_timeout_secs() -> u64 {
    120
}

fn default_composition_timeout_secs() -> u64 {
    1800
}

fn default_speech_max_chars() -> usize {
    4096 // OpenAI rejects longer speech input
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_overlap_tolerance_ms() -> u64 {
    50
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_localai_endpoint() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_recognition_model() -> String {
    "whisper-1".to_string()
}

fn default_pdftotext_path() -> String {
    "pdftotext".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_subtitle_style() -> String {
    crate::providers::ffmpeg::DEFAULT_SUBTITLE_STYLE.to_string()
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        self.language_tag()?;

        if self.speech.provider.requires_api_key() && self.speech.api_settings().api_key.is_empty() {
            return Err(anyhow!(
                "Speech API key is required for {} provider",
                self.speech.provider.display_name()
            ));
        }
        if self.recognition.provider.requires_api_key() && self.recognition.api_settings().api_key.is_empty() {
            return Err(anyhow!(
                "Recognition API key is required for {} provider",
                self.recognition.provider.display_name()
            ));
        }

        validate_endpoint("Speech", &self.speech.api_settings().endpoint)?;
        validate_endpoint("Recognition", &self.recognition.api_settings().endpoint)?;

        if !(0.25..=4.0).contains(&self.speech.speed) {
            return Err(anyhow!("Speech speed must be between 0.25 and 4.0, got {}", self.speech.speed));
        }
        if self.speech.voice.trim().is_empty() {
            return Err(anyhow!("Speech voice must not be empty"));
        }

        let timeouts = [
            ("document.timeout_secs", self.document.timeout_secs),
            ("speech timeout_secs", self.speech.api_settings().timeout_secs),
            ("recognition timeout_secs", self.recognition.api_settings().timeout_secs),
            ("composition.timeout_secs", self.composition.timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(anyhow!("{} must be greater than zero", name));
        }

        let tools = [
            ("document.pdftotext_path", &self.document.pdftotext_path),
            ("composition.ffmpeg_path", &self.composition.ffmpeg_path),
            ("composition.ffprobe_path", &self.composition.ffprobe_path),
        ];
        if let Some((name, _)) = tools.iter().find(|(_, path)| path.trim().is_empty()) {
            return Err(anyhow!("{} must not be empty", name));
        }

        Ok(())
    }

    /// Parsed narration language
    pub fn language_tag(&self) -> Result<LanguageTag> {
        LanguageTag::parse(&self.language)
            .with_context(|| format!("Invalid narration language: {}", self.language))
    }

    /// Read a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        let mut file =
            File::create(path).with_context(|| format!("Failed to create config file: {}", path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            language: default_language(),
            document: DocumentConfig::default(),
            speech: SpeechConfig::default(),
            recognition: RecognitionConfig::default(),
            composition: CompositionConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

// @validates: Endpoint is an absolute http(s) URL with a host
fn validate_endpoint(service: &str, endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| anyhow!("{} endpoint '{}' is not a valid URL: {}", service, endpoint, e))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(anyhow!("{} endpoint must be an http(s) URL, got '{}'", service, endpoint));
    }
    Ok(())
}
