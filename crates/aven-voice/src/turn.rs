//! Turn segmentation for conversational flow
//!
//! Gap logic: a turn is committed once the user has been silent past a
//! threshold. Very short blips are dropped, and an overly long turn is
//! auto-committed so the pipeline never buffers unbounded audio.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One committed user utterance, ready for transcription.
#[derive(Debug, Clone)]
pub struct AudioTurn {
    /// Mono f32 PCM at `sample_rate`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Events emitted by the turn manager
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// User started speaking
    SpeechStarted { timestamp: DateTime<Utc> },

    /// User stopped speaking (gap threshold reached)
    SpeechEnded {
        timestamp: DateTime<Utc>,
        duration: Duration,
    },

    /// Turn is committed and ready for STT
    Committed(AudioTurn),
}

/// Configuration for turn detection
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Silence duration before committing a turn
    pub silence_threshold: Duration,

    /// Minimum speech duration for a valid turn
    pub min_speech_duration: Duration,

    /// Maximum turn duration before auto-commit
    pub max_turn_duration: Duration,

    /// Sample rate of the incoming audio
    pub sample_rate: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(800),
            min_speech_duration: Duration::from_millis(200),
            max_turn_duration: Duration::from_secs(30),
            sample_rate: 16000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    Speaking,
    SilenceDetected,
}

/// Segments the VAD signal into committed turns
pub struct TurnManager {
    config: TurnConfig,
    state: TurnState,

    speech_start: Option<Instant>,
    last_speech: Option<Instant>,

    buffer: Vec<f32>,

    event_tx: mpsc::UnboundedSender<TurnEvent>,
}

impl TurnManager {
    pub fn new(config: TurnConfig) -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Self {
            config,
            state: TurnState::Idle,
            speech_start: None,
            last_speech: None,
            buffer: Vec::new(),
            event_tx,
        };

        (manager, event_rx)
    }

    /// Feed one VAD classification plus the window it was computed from.
    pub fn process_vad_result(&mut self, is_speech: bool, window: &[f32]) -> VoiceResult<()> {
        let now = Instant::now();

        match (self.state, is_speech) {
            (TurnState::Idle, true) => {
                info!("speech started");
                self.state = TurnState::Speaking;
                self.speech_start = Some(now);
                self.last_speech = Some(now);
                self.buffer.clear();
                self.buffer.extend_from_slice(window);

                self.emit(TurnEvent::SpeechStarted {
                    timestamp: Utc::now(),
                })?;
            }

            (TurnState::Speaking, true) => {
                self.last_speech = Some(now);
                self.buffer.extend_from_slice(window);

                if let Some(start) = self.speech_start {
                    if now.duration_since(start) >= self.config.max_turn_duration {
                        warn!("max turn duration reached, auto-committing");
                        return self.commit();
                    }
                }
            }

            (TurnState::Speaking, false) => {
                debug!("silence window");
                self.state = TurnState::SilenceDetected;
                // Keep the buffer; the user may resume.
            }

            (TurnState::SilenceDetected, true) => {
                debug!("speech resumed");
                self.state = TurnState::Speaking;
                self.last_speech = Some(now);
                self.buffer.extend_from_slice(window);
            }

            (TurnState::SilenceDetected, false) => {
                if let Some(last) = self.last_speech {
                    if now.duration_since(last) >= self.config.silence_threshold {
                        info!("gap threshold reached, committing turn");
                        return self.commit();
                    }
                }
            }

            (TurnState::Idle, false) => {}
        }

        Ok(())
    }

    fn commit(&mut self) -> VoiceResult<()> {
        if self.state == TurnState::Idle {
            return Ok(());
        }

        let duration = self
            .speech_start
            .map(|start| Instant::now().duration_since(start))
            .unwrap_or_default();

        if duration < self.config.min_speech_duration {
            debug!(?duration, "speech too short, dropping");
            self.reset();
            return Ok(());
        }

        info!(?duration, samples = self.buffer.len(), "turn committed");

        self.emit(TurnEvent::SpeechEnded {
            timestamp: Utc::now(),
            duration,
        })?;

        let samples = std::mem::take(&mut self.buffer);
        self.emit(TurnEvent::Committed(AudioTurn {
            samples,
            sample_rate: self.config.sample_rate,
            duration,
            timestamp: Utc::now(),
        }))?;

        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.speech_start = None;
        self.last_speech = None;
        self.buffer.clear();
    }

    fn emit(&self, event: TurnEvent) -> VoiceResult<()> {
        self.event_tx
            .send(event)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            TurnState::Idle => "idle",
            TurnState::Speaking => "speaking",
            TurnState::SilenceDetected => "silence_detected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TurnConfig {
        TurnConfig {
            silence_threshold: Duration::from_millis(50),
            min_speech_duration: Duration::from_millis(0),
            ..Default::default()
        }
    }

    #[test]
    fn speech_start_emits_event() {
        let (mut manager, mut rx) = TurnManager::new(test_config());

        let window = vec![0.5f32; 480];
        manager.process_vad_result(true, &window).unwrap();

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, TurnEvent::SpeechStarted { .. }));
        assert_eq!(manager.state_name(), "speaking");
    }

    #[test]
    fn gap_commits_turn_with_buffered_audio() {
        let (mut manager, mut rx) = TurnManager::new(test_config());
        let window = vec![0.5f32; 480];

        manager.process_vad_result(true, &window).unwrap();
        manager.process_vad_result(true, &window).unwrap();
        manager.process_vad_result(false, &window).unwrap();

        std::thread::sleep(Duration::from_millis(60));
        manager.process_vad_result(false, &window).unwrap();

        let mut committed = None;
        while let Ok(event) = rx.try_recv() {
            if let TurnEvent::Committed(turn) = event {
                committed = Some(turn);
            }
        }
        let turn = committed.expect("turn should commit after the gap");
        assert_eq!(turn.samples.len(), 960); // two speech windows buffered
        assert_eq!(turn.sample_rate, 16000);
        assert_eq!(manager.state_name(), "idle");
    }

    #[test]
    fn long_turn_auto_commits_at_max_duration() {
        let config = TurnConfig {
            silence_threshold: Duration::from_secs(10),
            min_speech_duration: Duration::from_millis(0),
            max_turn_duration: Duration::from_millis(30),
            ..Default::default()
        };
        let (mut manager, mut rx) = TurnManager::new(config);
        let window = vec![0.5f32; 480];

        manager.process_vad_result(true, &window).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        manager.process_vad_result(true, &window).unwrap();

        let mut committed = None;
        while let Ok(event) = rx.try_recv() {
            if let TurnEvent::Committed(turn) = event {
                committed = Some(turn);
            }
        }
        let turn = committed.expect("turn should auto-commit past max duration");
        assert_eq!(turn.samples.len(), 960);
        assert_eq!(manager.state_name(), "idle");
    }

    #[test]
    fn short_blip_is_dropped() {
        let config = TurnConfig {
            silence_threshold: Duration::from_millis(10),
            min_speech_duration: Duration::from_millis(500),
            ..Default::default()
        };
        let (mut manager, mut rx) = TurnManager::new(config);
        let window = vec![0.5f32; 480];

        manager.process_vad_result(true, &window).unwrap();
        manager.process_vad_result(false, &window).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        manager.process_vad_result(false, &window).unwrap();

        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, TurnEvent::Committed(_)));
        }
        assert_eq!(manager.state_name(), "idle");
    }
}
