/*!
 * Narration synthesis.
 *
 * Normalized text is split into chunks the speech service accepts, each chunk
 * is synthesized in order, decoded from WAV and concatenated into a single
 * `NarrationAudio`. The duration of the narration is always derived from the
 * decoded sample count.
 */

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};

use crate::errors::SynthesisError;
use crate::language_utils::LanguageTag;
use crate::providers::SpeechSynthesizer;
use crate::text_normalizer::NormalizedText;

/// Peak amplitude under which a narration counts as silent (about -54 dBFS)
const SILENCE_PEAK: u16 = 64;

/// Decoded narration audio, interleaved 16-bit PCM
#[derive(Clone, PartialEq)]
pub struct NarrationAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl NarrationAudio {
    /// Wrap interleaved samples
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self { samples, sample_rate, channels }
    }

    /// Decode a WAV container
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, SynthesisError> {
        let bytes: Cow<[u8]> = match repair_streamed_header(bytes) {
            Some(fixed) => {
                debug!("Patched streamed WAV header sizes");
                Cow::Owned(fixed)
            }
            None => Cow::Borrowed(bytes),
        };

        let mut reader = WavReader::new(Cursor::new(bytes.as_ref()))
            .map_err(|e| SynthesisError::InvalidAudio(format!("Failed to parse WAV data: {}", e)))?;

        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(SynthesisError::InvalidAudio(format!(
                "Unusable WAV format: {} Hz, {} channel(s)",
                spec.sample_rate, spec.channels
            )));
        }

        let bits = spec.bits_per_sample;
        let samples: Result<Vec<i16>, hound::Error> = match spec.sample_format {
            SampleFormat::Int if bits <= 16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v << (16 - bits)))
                .collect(),
            SampleFormat::Int => reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> (bits - 16)) as i16))
                .collect(),
            SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect(),
        };
        let samples = samples
            .map_err(|e| SynthesisError::InvalidAudio(format!("Failed to read WAV samples: {}", e)))?;

        Ok(Self::from_samples(samples, spec.sample_rate, spec.channels))
    }

    /// Join decoded chunks end to end without inserting gaps
    pub fn concat(parts: Vec<NarrationAudio>) -> Result<Self, SynthesisError> {
        let mut parts = parts.into_iter();
        let Some(mut joined) = parts.next() else {
            return Err(SynthesisError::EmptyAudio);
        };

        for (offset, part) in parts.enumerate() {
            if part.sample_rate != joined.sample_rate || part.channels != joined.channels {
                return Err(SynthesisError::FormatMismatch {
                    index: offset + 1,
                    expected: joined.format_label(),
                    found: part.format_label(),
                });
            }
            joined.samples.extend_from_slice(&part.samples);
        }

        Ok(joined)
    }

    /// A sine tone, mostly useful for tests and mocks
    pub fn tone(duration_seconds: f64, sample_rate: u32, frequency_hz: f64) -> Self {
        let count = (duration_seconds * sample_rate as f64).round() as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                ((t * frequency_hz * std::f64::consts::TAU).sin() * 8000.0) as i16
            })
            .collect();
        Self::from_samples(samples, sample_rate, 1)
    }

    /// Mono digital silence
    pub fn silence(duration_seconds: f64, sample_rate: u32) -> Self {
        let count = (duration_seconds * sample_rate as f64).round() as usize;
        Self::from_samples(vec![0; count], sample_rate, 1)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Exact duration from the sample count
    pub fn duration_seconds(&self) -> f64 {
        let frames_per_second = self.sample_rate as f64 * self.channels as f64;
        if frames_per_second == 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / frames_per_second
    }

    /// True when no sample rises above the silence floor
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| s.unsigned_abs() < SILENCE_PEAK)
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Encode as a 16-bit PCM WAV container
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, self.wav_spec())?;
            for sample in &self.samples {
                writer.write_sample(*sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    fn format_label(&self) -> String {
        format!("{} Hz/{} ch", self.sample_rate, self.channels)
    }
}

impl fmt::Debug for NarrationAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationAudio")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_seconds", &self.duration_seconds())
            .finish()
    }
}

/// Streaming TTS endpoints send placeholder RIFF and data sizes.
/// Returns a copy with the sizes set to what was actually received.
fn repair_streamed_header(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let len = u32::from_le_bytes([bytes[offset + 4], bytes[offset + 5], bytes[offset + 6], bytes[offset + 7]]) as usize;
        let body = offset + 8;

        if id == b"data" {
            let available = bytes.len() - body;
            let riff_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
            if len <= available && riff_len == bytes.len() - 8 {
                return None;
            }
            let mut fixed = bytes.to_vec();
            let data_len = len.min(available) as u32;
            fixed[offset + 4..offset + 8].copy_from_slice(&data_len.to_le_bytes());
            let riff = (bytes.len() - 8) as u32;
            fixed[4..8].copy_from_slice(&riff.to_le_bytes());
            return Some(fixed);
        }

        offset = body.checked_add(len)?.checked_add(len & 1)?;
    }
    None
}

/// Split text into chunks of at most `max_chars` characters
///
/// Sentences are kept whole where possible; a sentence longer than the limit
/// is split between words, and a word longer than the limit between
/// characters. Concatenating the chunks with single spaces reproduces the
/// input text (whitespace-collapsed).
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let mut push_piece = |piece: &str, chunks: &mut Vec<String>| {
        let piece_len = piece.chars().count();
        let needed = if current.is_empty() { piece_len } else { current_len + 1 + piece_len };
        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(piece);
        current_len += piece_len;
    };

    for sentence in split_sentences(text) {
        if sentence.chars().count() <= max_chars {
            push_piece(sentence, &mut chunks);
            continue;
        }

        debug!("Sentence of {} chars exceeds limit {}, splitting on words", sentence.chars().count(), max_chars);
        for word in sentence.split_whitespace() {
            if word.chars().count() <= max_chars {
                push_piece(word, &mut chunks);
                continue;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                push_piece(&piece, &mut chunks);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sentences end at `.`, `!` or `?` (plus closing quotes or brackets) followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut after_terminator = false;

    for (idx, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            after_terminator = true;
        } else if after_terminator && c.is_whitespace() {
            let sentence = text[start..idx].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = idx;
            after_terminator = false;
        } else if !matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}') {
            after_terminator = false;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Turns normalized text into narration audio through a speech capability
#[derive(Debug, Clone)]
pub struct NarrationSynthesizer {
    speech: Arc<dyn SpeechSynthesizer>,
}

impl NarrationSynthesizer {
    pub fn new(speech: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { speech }
    }

    /// Synthesize the whole text, chunk by chunk, in order
    pub async fn synthesize(
        &self,
        text: &NormalizedText,
        language: &LanguageTag,
    ) -> Result<NarrationAudio, SynthesisError> {
        let chunks = match self.speech.max_input_chars() {
            Some(limit) => split_into_chunks(text.as_str(), limit),
            None => vec![text.as_str().to_string()],
        };

        if chunks.is_empty() {
            return Err(SynthesisError::Rejected("no text to synthesize".to_string()));
        }

        info!("Synthesizing {} chars of narration in {} chunk(s)", text.char_count(), chunks.len());

        let mut parts = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            debug!("Synthesizing chunk {}/{} ({} chars)", index + 1, chunks.len(), chunk.chars().count());
            let speech = self.speech.synthesize(chunk, language).await?;
            parts.push(NarrationAudio::from_wav_bytes(&speech.wav)?);
        }

        let audio = NarrationAudio::concat(parts)?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        debug!("Narration decoded: {:?}", audio);
        Ok(audio)
    }
}
