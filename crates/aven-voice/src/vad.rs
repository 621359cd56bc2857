//! Voice Activity Detection using WebRTC VAD
//!
//! `VadModel::load` is the blocking, one-time initialization performed at
//! worker pre-warm; the model is shared across jobs behind an `Arc`.
//! `VadDetector` is the per-session engine built from the model on the
//! pipeline thread (the underlying VAD is not `Send`).

use crate::error::{VoiceError, VoiceResult};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz)
    pub sample_rate: u32,

    /// Detection aggressiveness (0-3, where 3 is most aggressive)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 3,
        }
    }
}

fn engine_params(config: &VadConfig) -> VoiceResult<(SampleRate, VadMode)> {
    let sample_rate = match config.sample_rate {
        8000 => SampleRate::Rate8kHz,
        16000 => SampleRate::Rate16kHz,
        32000 => SampleRate::Rate32kHz,
        48000 => SampleRate::Rate48kHz,
        other => {
            return Err(VoiceError::Config(format!(
                "VAD supports 8000, 16000, 32000, or 48000 Hz, got {}",
                other
            )))
        }
    };

    let mode = match config.mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        3 => VadMode::VeryAggressive,
        other => {
            return Err(VoiceError::Config(format!(
                "VAD mode must be 0-3, got {}",
                other
            )))
        }
    };

    Ok((sample_rate, mode))
}

/// A validated, warmed VAD model. This is the pre-warm payload: loading it
/// once up front keeps the first job from paying the initialization cost.
pub struct VadModel {
    config: VadConfig,
    chunk_size: usize,
}

impl VadModel {
    /// Load and warm the model. Blocking; call once at process pre-warm.
    pub fn load(config: VadConfig) -> VoiceResult<Self> {
        info!(
            sample_rate = config.sample_rate,
            mode = config.mode,
            "loading VAD model"
        );

        engine_params(&config)?;

        // 30ms windows; the engine accepts 10/20/30ms frames.
        let chunk_size = (config.sample_rate as f32 * 0.03) as usize;

        let model = Self { config, chunk_size };

        // Warm-up: build an engine and run one silent window through it so
        // any engine-level failure surfaces here rather than mid-job.
        let mut detector = model.detector()?;
        detector.process_chunk(&vec![0.0f32; chunk_size])?;

        info!(chunk_size, "VAD model ready");
        Ok(model)
    }

    /// Build a per-session detector. Must be called on the thread that will
    /// run it; the engine is not `Send`.
    pub fn detector(&self) -> VoiceResult<VadDetector> {
        let (sample_rate, mode) = engine_params(&self.config)?;
        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(sample_rate);

        Ok(VadDetector {
            vad,
            chunk_size: self.chunk_size,
            sample_rate: self.config.sample_rate,
        })
    }

    /// Expected analysis window length in samples (30ms).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

/// Per-session voice activity detector
pub struct VadDetector {
    vad: Vad,
    chunk_size: usize,
    sample_rate: u32,
}

impl VadDetector {
    /// Classify one 30ms window of mono f32 samples as speech or silence.
    pub fn process_chunk(&mut self, audio: &[f32]) -> VoiceResult<bool> {
        if audio.len() != self.chunk_size {
            return Err(VoiceError::VadProcessing(format!(
                "expected {} samples, got {}",
                self.chunk_size,
                audio.len()
            )));
        }

        let audio_i16: Vec<i16> = audio
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        let is_speech = self
            .vad
            .is_voice_segment(&audio_i16)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD engine failed: {:?}", e)))?;

        debug!("VAD window: {}", if is_speech { "speech" } else { "silence" });
        Ok(is_speech)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_default_model() {
        let model = VadModel::load(VadConfig::default()).unwrap();
        assert_eq!(model.chunk_size(), 480); // 30ms at 16kHz
    }

    #[test]
    fn invalid_sample_rate_rejected() {
        let config = VadConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(VadModel::load(config).is_err());
    }

    #[test]
    fn invalid_mode_rejected() {
        let config = VadConfig {
            mode: 7,
            ..Default::default()
        };
        assert!(VadModel::load(config).is_err());
    }

    #[test]
    fn wrong_window_length_errors() {
        let model = VadModel::load(VadConfig::default()).unwrap();
        let mut detector = model.detector().unwrap();
        assert!(detector.process_chunk(&[0.0f32; 100]).is_err());
    }

    #[test]
    fn silence_is_not_speech() {
        let model = VadModel::load(VadConfig::default()).unwrap();
        let mut detector = model.detector().unwrap();
        let silence = vec![0.0f32; 480];
        assert!(!detector.process_chunk(&silence).unwrap());
    }
}
