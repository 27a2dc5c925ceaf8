use anyhow::{Result, Context, anyhow};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use log::debug;

use crate::providers::document::{PDF_EXTENSIONS, PLAIN_TEXT_EXTENSIONS};

// @module: File and directory utilities

// @const: Common video file extensions supported by ffmpeg
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v",
    "mpg", "mpeg", "ogv", "ts", "mts", "m2ts",
];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    // @sanitizes: User-supplied output name into a bare file stem
    // @strips: Directories, a trailing video extension, unsafe characters
    pub fn sanitize_output_name(name: &str) -> Result<String> {
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        let stem = match base.rsplit_once('.') {
            Some((stem, ext)) if VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => stem,
            _ => base,
        };

        let cleaned: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') { c } else { '_' })
            .collect();
        let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string();

        if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
            return Err(anyhow!("Invalid output name: {:?}", name));
        }
        Ok(cleaned)
    }

    // @generates: Final video path for an output name
    pub fn output_path_for<P: AsRef<Path>>(output_dir: P, output_name: &str) -> Result<PathBuf> {
        let stem = Self::sanitize_output_name(output_name)?;
        Ok(output_dir.as_ref().join(format!("{}.mp4", stem)))
    }

    /// Detect whether a file is a narratable document or a video supported by ffmpeg
    pub fn detect_file_type<P: AsRef<Path>>(path: P, ffprobe_path: &str) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow!("File does not exist: {:?}", path));
        }

        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();

            if PDF_EXTENSIONS.contains(&ext_str.as_str()) {
                return Ok(FileType::Document(DocumentKind::Pdf));
            }
            if PLAIN_TEXT_EXTENSIONS.contains(&ext_str.as_str()) {
                return Ok(FileType::Document(DocumentKind::PlainText));
            }
            if VIDEO_EXTENSIONS.contains(&ext_str.as_str()) {
                return Ok(FileType::Video);
            }
        }

        // PDFs without an extension still carry the magic number
        let mut header = [0u8; 5];
        if let Ok(mut file) = fs::File::open(path) {
            if file.read_exact(&mut header).is_ok() && &header == b"%PDF-" {
                return Ok(FileType::Document(DocumentKind::Pdf));
            }
        }

        // If extension check doesn't work, try to examine the file with ffprobe
        let output = Command::new(ffprobe_path)
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=codec_type"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .output();

        if let Ok(output) = output {
            let kind = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
            if output.status.success() && kind == "video" {
                return Ok(FileType::Video);
            }
        } else {
            debug!("ffprobe unavailable while detecting type of {}", path.display());
        }

        Ok(FileType::Unknown)
    }

    // @validates: Pipeline inputs before any work starts
    pub fn validate_inputs<P1: AsRef<Path>, P2: AsRef<Path>>(
        document: P1,
        video: P2,
        ffprobe_path: &str,
    ) -> Result<DocumentKind> {
        let document = document.as_ref();
        let video = video.as_ref();

        let kind = match Self::detect_file_type(document, ffprobe_path)? {
            FileType::Document(kind) => kind,
            other => {
                return Err(anyhow!(
                    "{} is not a supported document (expected .pdf, .txt or .md, detected {:?})",
                    document.display(),
                    other
                ))
            }
        };

        match Self::detect_file_type(video, ffprobe_path)? {
            FileType::Video => Ok(kind),
            other => Err(anyhow!(
                "{} is not a supported video file (detected {:?})",
                video.display(),
                other
            )),
        }
    }
}

/// Kinds of narratable documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

/// Enum representing different file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Document to narrate
    Document(DocumentKind),
    /// Video file supported by ffmpeg
    Video,
    /// Unknown file type
    Unknown,
}
