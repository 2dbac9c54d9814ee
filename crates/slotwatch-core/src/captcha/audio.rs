//! Shared audio preprocessing for the solver cascade.
//!
//! Codec internals are the providers' problem; this step only has to
//! reject payloads no provider could use and label the container so each
//! provider can send the right content type.

use crate::error::SolveError;

/// An audio challenge as pulled from the portal.
#[derive(Debug, Clone)]
pub struct AudioChallenge {
    pub bytes: Vec<u8>,
    /// Where the payload came from, for diagnostics only.
    pub source_url: Option<String>,
}

impl AudioChallenge {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            source_url: None,
        }
    }

    pub fn with_source(bytes: Vec<u8>, source_url: impl Into<String>) -> Self {
        Self {
            bytes,
            source_url: Some(source_url.into()),
        }
    }
}

/// Audio container sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
}

impl AudioFormat {
    pub fn mime(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ogg => "audio/ogg",
        }
    }
}

/// A challenge that passed preprocessing and is ready for any provider.
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Validate and label the challenge payload. Failure here means no
/// provider can be tried at all, reported as [`SolveError::BadAudio`] so
/// the caller can tell "bad audio" apart from "bad providers".
pub fn prepare(challenge: &AudioChallenge) -> Result<PreparedAudio, SolveError> {
    if challenge.bytes.is_empty() {
        return Err(SolveError::BadAudio("empty audio payload".into()));
    }
    // Anything shorter than a container header is noise, not audio.
    if challenge.bytes.len() < 12 {
        return Err(SolveError::BadAudio(format!(
            "payload too short to be audio ({} bytes)",
            challenge.bytes.len()
        )));
    }

    let format = sniff(&challenge.bytes).ok_or_else(|| {
        SolveError::BadAudio("unrecognized audio container (expected WAV, MP3 or OGG)".into())
    })?;

    Ok(PreparedAudio {
        bytes: challenge.bytes.clone(),
        format,
    })
}

fn sniff(bytes: &[u8]) -> Option<AudioFormat> {
    if bytes.starts_with(b"RIFF") && bytes[8..12] == *b"WAVE" {
        return Some(AudioFormat::Wav);
    }
    if bytes.starts_with(b"OggS") {
        return Some(AudioFormat::Ogg);
    }
    // MP3: ID3 tag or a raw MPEG frame sync (0xFFEx/0xFFFx).
    if bytes.starts_with(b"ID3") || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return Some(AudioFormat::Mp3);
    }
    None
}

#[cfg(test)]
pub(crate) fn wav_fixture() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}
