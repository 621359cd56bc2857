//! **Speech-to-Text (STT)** - convert a committed `AudioTurn` into text.
//!
//! `DeepgramStt` is the production backend; `PlaceholderStt` lets the
//! pipeline run in tests without network access. Backends are synchronous;
//! the assistant calls them through `spawn_blocking`.

use crate::error::{VoiceError, VoiceResult};
use crate::turn::AudioTurn;

/// Backend for converting PCM into text.
pub trait SttBackend: Send + Sync {
    /// Transcribe one turn. Return an empty string if nothing was detected.
    fn transcribe(&self, turn: &AudioTurn) -> VoiceResult<String>;
}

/// Encode mono f32 PCM to 16-bit WAV bytes for API upload.
fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Placeholder STT: returns a fixed string. Use for exercising the pipeline
/// without a Deepgram key.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, turn: &AudioTurn) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} samples, {:.1}s]",
            turn.samples.len(),
            turn.duration.as_secs_f32()
        ))
    }
}

/// Production STT backend: Deepgram pre-recorded transcription.
/// Uses `DEEPGRAM_API_URL` (default https://api.deepgram.com),
/// `DEEPGRAM_API_KEY`, and `DEEPGRAM_STT_MODEL` (default nova-2).
#[derive(Debug, Clone)]
pub struct DeepgramStt {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    /// Model: nova-2, nova-3, etc.
    pub model: String,
    client: reqwest::blocking::Client,
}

impl DeepgramStt {
    /// Build from environment: DEEPGRAM_API_URL, DEEPGRAM_API_KEY, DEEPGRAM_STT_MODEL.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("DEEPGRAM_API_URL")
            .unwrap_or_else(|_| "https://api.deepgram.com".to_string());
        let api_key = std::env::var("DEEPGRAM_API_KEY")
            .map_err(|_| VoiceError::Config("STT requires DEEPGRAM_API_KEY".to_string()))?;
        let model =
            std::env::var("DEEPGRAM_STT_MODEL").unwrap_or_else(|_| "nova-2".to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

impl SttBackend for DeepgramStt {
    fn transcribe(&self, turn: &AudioTurn) -> VoiceResult<String> {
        if turn.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(&turn.samples, turn.sample_rate);
        let url = format!(
            "{}/v1/listen?model={}&smart_format=true",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        let transcript = json["results"]["channels"][0]["alternatives"][0]["transcript"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn turn_of(samples: Vec<f32>) -> AudioTurn {
        AudioTurn {
            samples,
            sample_rate: 16000,
            duration: Duration::from_millis(30),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn placeholder_returns_message() {
        let stt = PlaceholderStt::new();
        let s = stt.transcribe(&turn_of(vec![0.0; 480])).unwrap();
        assert!(s.contains("480"));
    }

    #[test]
    fn placeholder_with_response() {
        let stt = PlaceholderStt::with_response("hello world");
        assert_eq!(stt.transcribe(&turn_of(vec![])).unwrap(), "hello world");
    }

    #[test]
    fn wav_header_is_well_formed() {
        let wav = pcm_f32_to_wav(&[0.0, 0.5, -0.5], 16000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 6);
        // sample rate little-endian at offset 24
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
    }
}
