use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{warn, debug};

// @module: Caption segments and SRT serialization

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

/// A timestamped span of subtitle text, relative to the narration audio
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    // @field: Start time in seconds
    pub start_seconds: f64,

    // @field: End time in seconds
    pub end_seconds: f64,

    // @field: Caption text
    pub text: String,
}

impl CaptionSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }

    // @creates: Validated caption segment
    // @validates: Time range and non-empty text
    pub fn new_validated(start_seconds: f64, end_seconds: f64, text: &str) -> Result<Self> {
        if !start_seconds.is_finite() || !end_seconds.is_finite() || start_seconds < 0.0 {
            return Err(anyhow!(
                "Invalid caption times: {} --> {}",
                start_seconds, end_seconds
            ));
        }
        if end_seconds <= start_seconds {
            return Err(anyhow!(
                "Invalid time range: end time {} <= start time {}",
                end_seconds, start_seconds
            ));
        }

        let trimmed_text = text.trim();
        if trimmed_text.is_empty() {
            return Err(anyhow!("Empty caption text at {:.3}s", start_seconds));
        }

        Ok(Self::new(start_seconds, end_seconds, trimmed_text))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
    pub fn format_timestamp(seconds: f64) -> String {
        let ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let secs = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }

    /// Parse an SRT timestamp into seconds
    pub fn parse_timestamp(timestamp: &str) -> Result<f64> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        let total_ms = hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis;
        Ok(total_ms as f64 / 1000.0)
    }
}

/// Ordered, finite caption sequence for one narration
///
/// Iteration is restartable: `iter()` can be called any number of times and
/// always yields segments in non-decreasing start order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionTrack {
    segments: Vec<CaptionSegment>,
}

impl CaptionTrack {
    /// A track with no captions (narration without subtitles)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a track from segments that are already normalized
    pub(crate) fn from_sorted(segments: Vec<CaptionSegment>) -> Self {
        debug_assert!(segments.windows(2).all(|w| w[0].start_seconds <= w[1].start_seconds));
        Self { segments }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptionSegment> + Clone + '_ {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last caption, zero for an empty track
    pub fn end_seconds(&self) -> f64 {
        self.segments.iter().map(|s| s.end_seconds).fold(0.0, f64::max)
    }

    /// Render the track as SRT text
    pub fn to_srt(&self) -> String {
        self.to_string()
    }

    /// Write the track to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("Failed to create subtitle file: {}", path.display()))?;
        write!(file, "{}", self)?;

        debug!("Wrote {} caption(s) to {}", self.len(), path.display());
        Ok(())
    }

    /// Parse SRT text into a track, sorted by start time
    pub fn parse_srt_string(content: &str) -> Result<Self> {
        let mut segments = Vec::new();

        let mut current_seq: Option<usize> = None;
        let mut current_times: Option<(f64, f64)> = None;
        let mut current_text = String::new();

        let mut flush = |seq: Option<usize>, times: Option<(f64, f64)>, text: &mut String| {
            if let (Some(seq), Some((start, end))) = (seq, times) {
                match CaptionSegment::new_validated(start, end, text) {
                    Ok(segment) => segments.push(segment),
                    Err(e) => warn!("Skipping invalid caption {}: {}", seq, e),
                }
            }
            text.clear();
        };

        for (line_no, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                if current_times.is_some() {
                    flush(current_seq.take(), current_times.take(), &mut current_text);
                }
                continue;
            }

            if current_seq.is_none() && current_text.is_empty() {
                if let Ok(num) = trimmed.parse::<usize>() {
                    current_seq = Some(num);
                    continue;
                }
            }

            if current_seq.is_some() && current_times.is_none() {
                if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                    let start = Self::captured_seconds(&caps, 1);
                    let end = Self::captured_seconds(&caps, 5);
                    current_times = Some((start, end));
                    continue;
                }
            }

            if current_times.is_some() {
                if !current_text.is_empty() {
                    current_text.push('\n');
                }
                current_text.push_str(trimmed);
            } else {
                warn!("Unexpected text at line {} before timestamp: {}", line_no + 1, trimmed);
            }
        }
        flush(current_seq, current_times, &mut current_text);

        if segments.is_empty() {
            return Err(anyhow!("No valid caption entries were found in the SRT content"));
        }

        segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        Ok(Self { segments })
    }

    fn captured_seconds(caps: &regex::Captures, start_idx: usize) -> f64 {
        let field = |i: usize| -> u64 {
            caps.get(start_idx + i)
                .map_or(0, |m| m.as_str().parse().unwrap_or(0))
        };
        let ms = (field(0) * 3600 + field(1) * 60 + field(2)) * 1000 + field(3);
        ms as f64 / 1000.0
    }
}

impl<'a> IntoIterator for &'a CaptionTrack {
    type Item = &'a CaptionSegment;
    type IntoIter = std::slice::Iter<'a, CaptionSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl fmt::Display for CaptionTrack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            writeln!(f, "{}", i + 1)?;
            writeln!(
                f,
                "{} --> {}",
                CaptionSegment::format_timestamp(segment.start_seconds),
                CaptionSegment::format_timestamp(segment.end_seconds)
            )?;
            // An arrow inside the text would be read as a timing line
            writeln!(f, "{}", segment.text.replace("-->", "->"))?;
            writeln!(f)?;
        }
        Ok(())
    }
}
