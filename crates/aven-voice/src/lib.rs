//! # Aven Voice - room-based voice assistant pipeline
//!
//! Building blocks for voice-chat agents that live inside real-time media
//! rooms: voice activity detection, turn segmentation, speech-to-text,
//! chat-completion and speech-synthesis clients, room transport, and a small
//! worker runtime that dispatches jobs to an agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Worker runtime                         │
//! │   prewarm (once) → filter(JobRequest) → run(JobContext)      │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Voice Assistant                         │
//! │  ┌───────────┐  ┌───────┐  ┌──────────────┐  ┌───────────┐  │
//! │  │ Room audio│→ │  VAD  │→ │ Turn manager │→ │ STT→LLM→TTS│  │
//! │  └───────────┘  └───────┘  └──────────────┘  └─────┬─────┘  │
//! │        ↑                                           ↓         │
//! │  ┌───────────┐        kill signal          ┌───────────┐    │
//! │  │ Interrupt │←───────────────────────────│  Playback │    │
//! │  └───────────┘                             └───────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod error;
pub mod llm;
pub mod room;
pub mod stt;
pub mod tts;
pub mod turn;
pub mod vad;
pub mod worker;

pub use assistant::VoiceAssistant;
pub use chat::{ChatContext, ChatMessage, ChatRole};
pub use error::{VoiceError, VoiceResult};
pub use llm::{LlmBackend, OpenAiLlm, PlaceholderLlm};
pub use room::{
    mint_join_token, ConnectOptions, ParticipantInfo, PlayOutcome, RoomHandle, RoomPlayback,
};
pub use stt::{DeepgramStt, PlaceholderStt, SttBackend};
pub use tts::{OpenAiTts, PlaceholderTts, SynthesizedAudio, TtsBackend};
pub use turn::{AudioTurn, TurnConfig, TurnEvent, TurnManager};
pub use vad::{VadConfig, VadDetector, VadModel};
pub use worker::{JobContext, JobDispatcher, JobOffer, JobRequest, VoiceAgent, Worker};
