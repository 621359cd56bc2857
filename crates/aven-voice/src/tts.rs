//! **Text-to-Speech (TTS)** - render the assistant's reply as PCM audio.
//!
//! `OpenAiTts` requests raw PCM (`response_format: pcm`) so synthesized audio
//! can be captured straight into the room track without a decoder.

use crate::error::{VoiceError, VoiceResult};
use std::time::Duration;

const DEFAULT_TTS_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// OpenAI's pcm response format is 24 kHz mono signed 16-bit little-endian.
pub const OPENAI_PCM_SAMPLE_RATE: u32 = 24000;

/// Synthesized speech as room-ready PCM.
#[derive(Debug, Clone, Default)]
pub struct SynthesizedAudio {
    /// Mono i16 samples.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Backend that turns text into PCM audio. Return empty samples to skip playback.
pub trait TtsBackend: Send + Sync {
    fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedAudio>;
}

/// Placeholder TTS: returns empty audio so nothing is published.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str) -> VoiceResult<SynthesizedAudio> {
        Ok(SynthesizedAudio::default())
    }
}

/// Production TTS backend: OpenAI speech synthesis.
/// Uses `TTS_API_URL` (default https://api.openai.com/v1), `OPENAI_API_KEY`
/// (or `TTS_API_KEY`), `TTS_MODEL` (default tts-1), `TTS_VOICE` (default alloy).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Voice: alloy, echo, fable, onyx, nova, shimmer.
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl OpenAiTts {
    /// Build from environment: TTS_API_URL, OPENAI_API_KEY / TTS_API_KEY, TTS_MODEL, TTS_VOICE.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url =
            std::env::var("TTS_API_URL").unwrap_or_else(|_| DEFAULT_TTS_API_BASE.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("TTS_API_KEY"))
            .map_err(|_| {
                VoiceError::Config("TTS requires OPENAI_API_KEY or TTS_API_KEY".to_string())
            })?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        let mut tts = Self::new(base_url, api_key, model)?;
        tts.voice = voice;
        Ok(tts)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: DEFAULT_VOICE.to_string(),
            client,
        })
    }

    /// Set a fixed voice (e.g. `nova`).
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

impl TtsBackend for OpenAiTts {
    fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SynthesizedAudio::default());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "pcm",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(SynthesizedAudio {
            samples,
            sample_rate: OPENAI_PCM_SAMPLE_RATE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_returns_empty() {
        let tts = PlaceholderTts;
        let out = tts.synthesize("hello").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn explicit_voice_overrides_default() {
        let tts = OpenAiTts::new("https://api.openai.com/v1", "key", "tts-1")
            .unwrap()
            .with_voice("nova");
        assert_eq!(tts.voice, "nova");
    }
}
