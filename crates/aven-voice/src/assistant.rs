//! Voice Assistant - ties room audio, VAD, turn-taking, and the STT → LLM →
//! TTS pipeline together for one job.
//!
//! Remote audio frames feed a dedicated VAD thread (the VAD engine is not
//! `Send`); committed turns flow into an async pipeline task that transcribes,
//! asks the LLM for a reply, synthesizes it, and plays it into the room.
//! User speech during playback flips the kill-switch and the assistant falls
//! silent.

use crate::chat::{ChatContext, ChatRole};
use crate::error::{VoiceError, VoiceResult};
use crate::llm::LlmBackend;
use crate::room::{ParticipantInfo, PlayOutcome, RoomHandle, RoomPlayback};
use crate::stt::SttBackend;
use crate::tts::{TtsBackend, OPENAI_PCM_SAMPLE_RATE};
use crate::turn::{AudioTurn, TurnConfig, TurnEvent, TurnManager};
use crate::vad::VadModel;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sample rate of the published agent track; matches the TTS output format.
const PLAYBACK_SAMPLE_RATE: u32 = OPENAI_PCM_SAMPLE_RATE;

/// A per-job voice assistant. Construct with the pre-warmed VAD model and the
/// speech/language/synthesis services, `start` it on a room and participant,
/// then let the pipeline converse.
pub struct VoiceAssistant {
    vad: Arc<VadModel>,
    stt: Arc<dyn SttBackend>,
    llm: Arc<dyn LlmBackend>,
    tts: Arc<dyn TtsBackend>,
    chat: Arc<StdMutex<ChatContext>>,
    turn_config: TurnConfig,

    playback: Option<RoomPlayback>,
    pipeline: Option<tokio::task::JoinHandle<()>>,
    vad_thread: Option<thread::JoinHandle<()>>,
    _room: Option<RoomHandle>,
}

impl VoiceAssistant {
    pub fn new(
        vad: Arc<VadModel>,
        stt: Arc<dyn SttBackend>,
        llm: Arc<dyn LlmBackend>,
        tts: Arc<dyn TtsBackend>,
        chat_ctx: ChatContext,
    ) -> Self {
        let turn_config = TurnConfig {
            sample_rate: vad.sample_rate(),
            ..Default::default()
        };
        Self {
            vad,
            stt,
            llm,
            tts,
            chat: Arc::new(StdMutex::new(chat_ctx)),
            turn_config,
            playback: None,
            pipeline: None,
            vad_thread: None,
            _room: None,
        }
    }

    /// Override the turn segmentation parameters before `start`.
    pub fn with_turn_config(mut self, config: TurnConfig) -> Self {
        self.turn_config = config;
        self
    }

    /// Bind the assistant to a room and participant and start the pipeline.
    pub async fn start(
        &mut self,
        room: RoomHandle,
        participant: ParticipantInfo,
    ) -> VoiceResult<()> {
        if self.playback.is_some() {
            return Err(VoiceError::Config("assistant already started".to_string()));
        }
        info!(identity = %participant.identity, "starting voice assistant");

        let playback = room.publish_audio(PLAYBACK_SAMPLE_RATE).await?;
        let frames = room
            .take_remote_audio()
            .ok_or_else(|| VoiceError::Room("remote audio already taken".to_string()))?;

        let (vad_thread, turn_rx) = spawn_vad_thread(
            Arc::clone(&self.vad),
            frames,
            playback.clone(),
            self.turn_config.clone(),
        );

        let pipeline = tokio::spawn(pipeline_loop(
            Arc::clone(&self.stt),
            Arc::clone(&self.llm),
            Arc::clone(&self.tts),
            Arc::clone(&self.chat),
            playback.clone(),
            turn_rx,
        ));

        self.playback = Some(playback);
        self.pipeline = Some(pipeline);
        self.vad_thread = Some(vad_thread);
        self._room = Some(room);
        Ok(())
    }

    /// Speak a scripted utterance. With `allow_interruptions`, user speech
    /// cuts it off mid-utterance.
    pub async fn say(&self, text: &str, allow_interruptions: bool) -> VoiceResult<PlayOutcome> {
        let playback = self
            .playback
            .as_ref()
            .ok_or_else(|| VoiceError::Config("assistant not started".to_string()))?;
        info!(%text, "assistant says");

        {
            let mut chat = self.chat.lock().unwrap_or_else(|e| e.into_inner());
            chat.append(ChatRole::Assistant, text);
        }

        let tts = Arc::clone(&self.tts);
        let utterance = text.to_string();
        let audio = tokio::task::spawn_blocking(move || tts.synthesize(&utterance))
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))??;
        if audio.is_empty() {
            return Ok(PlayOutcome::Completed);
        }
        if audio.sample_rate != playback.sample_rate() {
            return Err(VoiceError::Tts(format!(
                "synthesized {} Hz but room track expects {} Hz",
                audio.sample_rate,
                playback.sample_rate()
            )));
        }
        playback.play(&audio.samples, allow_interruptions).await
    }

    /// Current conversation log (cloned).
    pub fn chat_snapshot(&self) -> ChatContext {
        self.chat.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Wait for the pipeline to end (room closed or audio stream dropped).
    pub async fn closed(&mut self) {
        if let Some(handle) = self.pipeline.take() {
            let _ = handle.await;
        }
        if let Some(thread) = self.vad_thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }
    }
}

/// VAD runs on its own thread: the engine is not `Send`, and chunk analysis
/// must not stall the async reactor.
fn spawn_vad_thread(
    vad: Arc<VadModel>,
    mut frames: mpsc::UnboundedReceiver<Vec<f32>>,
    playback: RoomPlayback,
    turn_config: TurnConfig,
) -> (thread::JoinHandle<()>, mpsc::UnboundedReceiver<TurnEvent>) {
    let (mut manager, turn_rx) = TurnManager::new(turn_config);

    let handle = thread::spawn(move || {
        let mut detector = match vad.detector() {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to build VAD detector");
                return;
            }
        };
        debug!("VAD thread started");

        let window = detector.chunk_size();
        let mut buf: Vec<f32> = Vec::new();

        while let Some(frame) = frames.blocking_recv() {
            buf.extend_from_slice(&frame);
            while buf.len() >= window {
                let chunk: Vec<f32> = buf.drain(..window).collect();
                match detector.process_chunk(&chunk) {
                    Ok(is_speech) => {
                        if is_speech && playback.is_playing() {
                            info!("user speech during playback, interrupting");
                            playback.stop();
                        }
                        if let Err(e) = manager.process_vad_result(is_speech, &chunk) {
                            // Receiver gone; the job is over.
                            debug!(error = %e, "turn channel closed, VAD thread exiting");
                            return;
                        }
                    }
                    Err(e) => error!(error = %e, "VAD processing error"),
                }
            }
        }
        debug!("audio frames closed, VAD thread exiting");
    });

    (handle, turn_rx)
}

async fn pipeline_loop(
    stt: Arc<dyn SttBackend>,
    llm: Arc<dyn LlmBackend>,
    tts: Arc<dyn TtsBackend>,
    chat: Arc<StdMutex<ChatContext>>,
    playback: RoomPlayback,
    mut turn_rx: mpsc::UnboundedReceiver<TurnEvent>,
) {
    while let Some(event) = turn_rx.recv().await {
        if let TurnEvent::Committed(turn) = event {
            if let Err(e) = handle_turn(&stt, &llm, &tts, &chat, &playback, turn).await {
                warn!(error = %e, "turn pipeline failed");
            }
        }
    }
    debug!("turn events closed, pipeline exiting");
}

async fn handle_turn(
    stt: &Arc<dyn SttBackend>,
    llm: &Arc<dyn LlmBackend>,
    tts: &Arc<dyn TtsBackend>,
    chat: &Arc<StdMutex<ChatContext>>,
    playback: &RoomPlayback,
    turn: AudioTurn,
) -> VoiceResult<()> {
    let stt = Arc::clone(stt);
    let text = tokio::task::spawn_blocking(move || stt.transcribe(&turn))
        .await
        .map_err(|e| VoiceError::Stt(e.to_string()))??;
    if text.trim().is_empty() {
        return Ok(());
    }
    info!(%text, "user said");

    let snapshot = {
        let mut guard = chat.lock().unwrap_or_else(|e| e.into_inner());
        guard.append(ChatRole::User, text);
        guard.clone()
    };

    let llm = Arc::clone(llm);
    let reply = tokio::task::spawn_blocking(move || llm.complete(&snapshot))
        .await
        .map_err(|e| VoiceError::Llm(e.to_string()))??;
    if reply.trim().is_empty() {
        return Ok(());
    }
    info!(%reply, "assistant replies");

    {
        let mut guard = chat.lock().unwrap_or_else(|e| e.into_inner());
        guard.append(ChatRole::Assistant, reply.clone());
    }

    let tts = Arc::clone(tts);
    let audio = tokio::task::spawn_blocking(move || tts.synthesize(&reply))
        .await
        .map_err(|e| VoiceError::Tts(e.to_string()))??;
    if audio.is_empty() {
        return Ok(());
    }
    if audio.sample_rate != playback.sample_rate() {
        return Err(VoiceError::Tts(format!(
            "synthesized {} Hz but room track expects {} Hz",
            audio.sample_rate,
            playback.sample_rate()
        )));
    }
    playback.play(&audio.samples, true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PlaceholderLlm;
    use crate::stt::PlaceholderStt;
    use crate::tts::PlaceholderTts;
    use crate::vad::VadConfig;

    fn test_assistant() -> VoiceAssistant {
        let vad = Arc::new(VadModel::load(VadConfig::default()).unwrap());
        VoiceAssistant::new(
            vad,
            Arc::new(PlaceholderStt::new()),
            Arc::new(PlaceholderLlm::new()),
            Arc::new(PlaceholderTts),
            ChatContext::with_system("You are a voice assistant."),
        )
    }

    #[test]
    fn chat_has_exactly_one_system_message_at_construction() {
        let assistant = test_assistant();
        let chat = assistant.chat_snapshot();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat.messages()[0].role, ChatRole::System);
    }

    #[tokio::test]
    async fn say_before_start_is_an_error() {
        let assistant = test_assistant();
        let err = assistant.say("hello", true).await.unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }
}
