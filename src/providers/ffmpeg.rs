/*!
 * ffprobe / ffmpeg backed media muxer.
 *
 * Probing parses `ffprobe -print_format json` output. Muxing replaces the
 * source audio with the narration, holds the last frame with `tpad` when the
 * narration is longer than the video, pads the narration with silence when it
 * is shorter, and attaches captions either burned in (`subtitles` filter) or
 * as a `mov_text` stream.
 */

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use serde_json::Value;
use tokio::process::Command;

use crate::errors::ProviderError;
use crate::providers::{CaptionMode, MediaMuxer, MediaProbe, MuxJob, NARRATION_TRACK_TITLE};

/// Subtitle look used when burning captions
pub const DEFAULT_SUBTITLE_STYLE: &str = "FontName=Arial,Bold=10,FontSize=12,Alignment=6,MarginV=20";

/// Video codecs the mp4 container accepts without re-encoding
const MP4_COPYABLE_CODECS: &[&str] = &["h264", "hevc", "mpeg4", "av1", "vp9"];

/// Muxer driving the ffmpeg command line tools
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: String,
    ffprobe_path: String,
    video_codec: String,
    audio_codec: String,
    subtitle_style: String,
    timeout: Duration,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            subtitle_style: DEFAULT_SUBTITLE_STYLE.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            ..Self::default()
        }
    }

    pub fn with_codecs(mut self, video_codec: impl Into<String>, audio_codec: impl Into<String>) -> Self {
        self.video_codec = video_codec.into();
        self.audio_codec = audio_codec.into();
        self
    }

    pub fn with_subtitle_style(mut self, style: impl Into<String>) -> Self {
        self.subtitle_style = style.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a tool with the per-call timeout; the child is killed if the call is dropped
    async fn run(&self, program: &str, mut command: Command) -> Result<Output, ProviderError> {
        command.kill_on_drop(true).stdin(Stdio::null());

        let output = tokio::select! {
            result = command.output() => {
                result.map_err(|e| ProviderError::ProcessFailed {
                    program: program.to_string(),
                    message: format!("Failed to execute: {}", e),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ProviderError::Timeout(format!(
                    "{} did not finish within {} seconds",
                    program,
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let filtered = filter_ffmpeg_stderr(&stderr);
            error!("{} failed ({}): {}", program, output.status, filtered);
            return Err(ProviderError::ProcessFailed {
                program: program.to_string(),
                message: filtered,
            });
        }

        Ok(output)
    }

    /// Arguments for one mux, plus the directory ffmpeg must run in
    ///
    /// Burned captions are referenced by file name relative to that directory
    /// so that no path escaping is needed inside the filter graph.
    fn build_mux_args(&self, job: &MuxJob) -> (Vec<String>, Option<PathBuf>) {
        let mut args = Vec::new();
        push_args(&mut args, &["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]);
        push_args(&mut args, &["-i", &job.video_path.display().to_string()]);
        push_args(&mut args, &["-i", &job.narration_path.display().to_string()]);

        let mut video_filters = Vec::new();
        if job.freeze_extend_seconds > 0.0 {
            video_filters.push(format!("tpad=stop_mode=clone:stop_duration={:.3}", job.freeze_extend_seconds));
        }

        let mut working_dir = None;
        let mut soft_captions = false;
        if let Some(captions) = &job.captions {
            match captions.mode {
                CaptionMode::Burn => {
                    let file_name = captions
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    video_filters.push(format!(
                        "subtitles=filename={}:force_style='{}'",
                        file_name, self.subtitle_style
                    ));
                    working_dir = captions.path.parent().map(Path::to_path_buf);
                }
                CaptionMode::Soft => {
                    push_args(&mut args, &["-i", &captions.path.display().to_string()]);
                    soft_captions = true;
                }
            }
        }

        if video_filters.is_empty() && can_copy_into_mp4(job.video_codec.as_deref()) {
            push_args(&mut args, &["-map", "0:v:0", "-c:v", "copy"]);
        } else if video_filters.is_empty() {
            debug!("Re-encoding {:?} video for the mp4 container", job.video_codec);
            push_args(&mut args, &["-map", "0:v:0", "-c:v", &self.video_codec, "-pix_fmt", "yuv420p"]);
        } else {
            let graph = format!("[0:v:0]{}[v]", video_filters.join(","));
            push_args(&mut args, &["-filter_complex", &graph]);
            push_args(&mut args, &["-map", "[v]", "-c:v", &self.video_codec, "-pix_fmt", "yuv420p"]);
        }

        // Narration replaces the source audio; apad fills out a shorter narration
        push_args(&mut args, &["-map", "1:a:0", "-af", "apad", "-c:a", &self.audio_codec]);
        push_args(&mut args, &["-metadata:s:a:0", &format!("title={}", NARRATION_TRACK_TITLE)]);

        if soft_captions {
            push_args(&mut args, &["-map", "2:s:0", "-c:s", "mov_text"]);
        }

        push_args(&mut args, &["-t", &format!("{:.3}", job.output_duration_seconds)]);
        push_args(&mut args, &["-movflags", "+faststart", "-f", "mp4"]);
        args.push(job.output_path.display().to_string());

        (args, working_dir)
    }
}

// Unknown codecs are re-encoded
fn can_copy_into_mp4(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| MP4_COPYABLE_CODECS.contains(&c.to_lowercase().as_str()))
}

fn push_args(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Parse `ffprobe -show_format -show_streams` JSON
fn parse_probe(json: &Value) -> Result<MediaProbe, ProviderError> {
    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ProviderError::ParseError("ffprobe output has no streams".to_string()))?;

    let as_seconds = |v: Option<&Value>| -> Option<f64> {
        v.and_then(|d| d.as_str())
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite())
    };

    let mut probe = MediaProbe::default();
    let mut longest_stream = 0.0f64;

    for stream in streams {
        let codec_type = stream.get("codec_type").and_then(|v| v.as_str()).unwrap_or("");
        let attached_pic = stream
            .get("disposition")
            .and_then(|d| d.get("attached_pic"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            == 1;

        match codec_type {
            "video" if !attached_pic => {
                if !probe.has_video {
                    probe.video_codec = stream.get("codec_name").and_then(|v| v.as_str()).map(str::to_string);
                }
                probe.has_video = true;
            }
            "audio" => {
                let title = stream
                    .get("tags")
                    .and_then(|t| t.get("title"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string();
                probe.audio_track_titles.push(title);
            }
            "subtitle" => probe.subtitle_streams += 1,
            _ => {}
        }

        if let Some(duration) = as_seconds(stream.get("duration")) {
            longest_stream = longest_stream.max(duration);
        }
    }

    probe.duration_seconds = as_seconds(json.get("format").and_then(|f| f.get("duration")))
        .unwrap_or(longest_stream);

    Ok(probe)
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("; ")
    }
}

/// Absolute form of a path, so ffmpeg can run in another directory
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl MediaMuxer for FfmpegMuxer {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, ProviderError> {
        if !path.exists() {
            return Err(ProviderError::ProcessFailed {
                program: self.ffprobe_path.clone(),
                message: format!("File not found: {}", path.display()),
            });
        }

        let mut command = Command::new(&self.ffprobe_path);
        command.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"]);
        command.arg(path);

        let output = self.run(&self.ffprobe_path, command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: Value = serde_json::from_str(&stdout)
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse ffprobe JSON output: {}", e)))?;

        parse_probe(&json)
    }

    async fn mux(&self, job: &MuxJob) -> Result<(), ProviderError> {
        let job = MuxJob {
            video_path: absolute(&job.video_path),
            narration_path: absolute(&job.narration_path),
            output_path: absolute(&job.output_path),
            ..job.clone()
        };
        let (args, working_dir) = self.build_mux_args(&job);
        debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let mut command = Command::new(&self.ffmpeg_path);
        command.args(&args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        self.run(&self.ffmpeg_path, command).await.map(|_| ())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        for program in [&self.ffmpeg_path, &self.ffprobe_path] {
            let mut command = Command::new(program);
            command.arg("-version");
            self.run(program, command).await?;
        }
        Ok(())
    }
}
