/*!
 * Document text sources.
 *
 * Plain text and Markdown files are read directly; PDFs go through the
 * poppler `pdftotext` tool, which separates pages with form feeds. The
 * `DocumentRouter` picks a source by file extension.
 */

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use tokio::process::Command;

use crate::errors::{ExtractionError, ProviderError};
use crate::providers::{DocumentHandle, DocumentSource};
use crate::text_normalizer::DocumentText;

/// Extensions read as plain text
pub const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Extensions read through `pdftotext`
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Reads UTF-8 (or lossy-decoded) text files
#[derive(Debug, Clone, Default)]
pub struct PlainTextSource;

#[async_trait]
impl DocumentSource for PlainTextSource {
    async fn extract(&self, document: &DocumentHandle) -> Result<DocumentText, ExtractionError> {
        let bytes = tokio::fs::read(document.path()).await.map_err(|source| ExtractionError::Io {
            path: document.path().display().to_string(),
            source,
        })?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                debug!("{} is not valid UTF-8, decoding lossily", document.path().display());
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(DocumentText::new(text.trim_start_matches('\u{feff}')))
    }
}

/// Extracts PDF text with the `pdftotext` command line tool
#[derive(Debug, Clone)]
pub struct PdfTextSource {
    pdftotext_path: String,
    timeout: Duration,
}

impl Default for PdfTextSource {
    fn default() -> Self {
        Self::new("pdftotext", Duration::from_secs(120))
    }
}

impl PdfTextSource {
    pub fn new(pdftotext_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pdftotext_path: pdftotext_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DocumentSource for PdfTextSource {
    async fn extract(&self, document: &DocumentHandle) -> Result<DocumentText, ExtractionError> {
        let path = document.path();
        if !path.exists() {
            return Err(ExtractionError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "document not found"),
            });
        }

        let mut command = Command::new(&self.pdftotext_path);
        command
            .args(["-enc", "UTF-8"])
            .arg(path)
            .arg("-")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            result = command.output() => {
                result.map_err(|e| ProviderError::ProcessFailed {
                    program: self.pdftotext_path.clone(),
                    message: format!("Failed to execute: {}", e),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ProviderError::Timeout(format!(
                    "pdftotext did not finish within {} seconds",
                    self.timeout.as_secs()
                )).into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("pdftotext failed on {}: {}", path.display(), stderr);
            return Err(ProviderError::ProcessFailed {
                program: self.pdftotext_path.clone(),
                message: stderr,
            }
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            "Extracted {} chars over {} page(s) from {}",
            text.chars().count(),
            text.matches('\x0c').count().max(1),
            path.display()
        );
        Ok(DocumentText::new(text))
    }
}

/// Chooses a document source by file extension
#[derive(Debug, Clone, Default)]
pub struct DocumentRouter {
    routes: Vec<(Vec<String>, Arc<dyn DocumentSource>)>,
}

impl DocumentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text files plus PDFs through the given extractor
    pub fn standard(pdf: PdfTextSource) -> Self {
        Self::new()
            .with_source(PLAIN_TEXT_EXTENSIONS, Arc::new(PlainTextSource))
            .with_source(PDF_EXTENSIONS, Arc::new(pdf))
    }

    /// Register a source for some extensions (later registrations win)
    pub fn with_source(mut self, extensions: &[&str], source: Arc<dyn DocumentSource>) -> Self {
        let extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self.routes.insert(0, (extensions, source));
        self
    }

    /// Whether some source accepts this extension
    pub fn supports(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.routes.iter().any(|(exts, _)| exts.contains(&extension))
    }
}

#[async_trait]
impl DocumentSource for DocumentRouter {
    async fn extract(&self, document: &DocumentHandle) -> Result<DocumentText, ExtractionError> {
        let extension = document.extension();
        let source = self
            .routes
            .iter()
            .find(|(exts, _)| exts.contains(&extension))
            .map(|(_, source)| source)
            .ok_or_else(|| {
                ExtractionError::UnsupportedFormat(format!(
                    "{} (extension '{}')",
                    document.path().display(),
                    extension
                ))
            })?;

        source.extract(document).await
    }
}
