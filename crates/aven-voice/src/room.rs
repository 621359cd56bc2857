//! Room transport - connect, wait for participants, move audio both ways.
//!
//! Wraps the LiveKit SDK: remote participant audio is resampled to the
//! pipeline rate and handed out as raw f32 frames; synthesized speech is
//! published through a local audio track. `RoomPlayback::stop` is the
//! interruption kill-switch.

use crate::error::{VoiceError, VoiceResult};
use futures::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Options for joining a room. Only remote audio is attached; other track
/// kinds are ignored at the event pump.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Sample rate remote audio is resampled to for the pipeline.
    pub capture_sample_rate: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
        }
    }
}

/// A remote user connected to the room.
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub identity: String,
    pub name: String,
}

impl ParticipantInfo {
    fn from_remote(p: &RemoteParticipant) -> Self {
        Self {
            identity: p.identity().0,
            name: p.name(),
        }
    }
}

/// A live connection to a media room. Dropping the handle leaves the room.
pub struct RoomHandle {
    room: Arc<Room>,
    participants: Mutex<mpsc::UnboundedReceiver<ParticipantInfo>>,
    remote_audio: StdMutex<Option<mpsc::UnboundedReceiver<Vec<f32>>>>,
}

impl RoomHandle {
    /// Connect to a room and start routing its events.
    pub async fn connect(url: &str, token: &str, options: ConnectOptions) -> VoiceResult<Self> {
        let room_options = RoomOptions {
            auto_subscribe: true,
            ..Default::default()
        };
        let (room, events) = Room::connect(url, token, room_options).await?;
        info!(room = %room.name(), "connected to room");

        let (participant_tx, participant_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_events(events, options, participant_tx, audio_tx));

        Ok(Self {
            room: Arc::new(room),
            participants: Mutex::new(participant_rx),
            remote_audio: StdMutex::new(Some(audio_rx)),
        })
    }

    pub fn name(&self) -> String {
        self.room.name()
    }

    /// Suspend until a remote participant is present in the room.
    pub async fn wait_for_participant(&self) -> VoiceResult<ParticipantInfo> {
        if let Some(p) = self.room.remote_participants().into_values().next() {
            return Ok(ParticipantInfo::from_remote(&p));
        }
        let mut rx = self.participants.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| VoiceError::Room("room closed before a participant joined".to_string()))
    }

    /// Take the remote-audio frame receiver. Frames are mono f32 at the
    /// configured capture rate. Returns `None` if already taken.
    pub fn take_remote_audio(&self) -> Option<mpsc::UnboundedReceiver<Vec<f32>>> {
        self.remote_audio
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Publish a local audio track and return the playback handle for it.
    pub async fn publish_audio(&self, sample_rate: u32) -> VoiceResult<RoomPlayback> {
        let source = NativeAudioSource::new(AudioSourceOptions::default(), sample_rate, 1, 100);
        let track = LocalAudioTrack::create_audio_track(
            "agent-voice",
            RtcAudioSource::Native(source.clone()),
        );
        self.room
            .local_participant()
            .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
            .await?;
        info!(sample_rate, "published agent audio track");

        Ok(RoomPlayback {
            source,
            sample_rate,
            playing: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    options: ConnectOptions,
    participant_tx: mpsc::UnboundedSender<ParticipantInfo>,
    audio_tx: mpsc::UnboundedSender<Vec<f32>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::ParticipantConnected(p) => {
                let info = ParticipantInfo::from_remote(&p);
                debug!(identity = %info.identity, "participant connected");
                let _ = participant_tx.send(info);
            }
            RoomEvent::TrackSubscribed { track, participant, .. } => match track {
                RemoteTrack::Audio(audio) => {
                    debug!(identity = %participant.identity().0, "attached remote audio track");
                    let mut stream = NativeAudioStream::new(
                        audio.rtc_track(),
                        options.capture_sample_rate as i32,
                        1,
                    );
                    let tx = audio_tx.clone();
                    tokio::spawn(async move {
                        while let Some(frame) = stream.next().await {
                            if frame.data.is_empty() {
                                continue;
                            }
                            let samples: Vec<f32> = frame
                                .data
                                .iter()
                                .map(|&s| s as f32 / 32768.0)
                                .collect();
                            if tx.send(samples).is_err() {
                                break;
                            }
                        }
                        debug!("remote audio stream ended");
                    });
                }
                _ => debug!("ignoring non-audio track"),
            },
            RoomEvent::Disconnected { reason } => {
                warn!(?reason, "room disconnected");
                break;
            }
            _ => {}
        }
    }
}

/// Result of a playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Completed,
    Interrupted,
}

/// Publishes PCM into the room's agent track in 10ms frames.
/// Clone freely; `stop` from any thread halts an interruptible `play`.
#[derive(Clone)]
pub struct RoomPlayback {
    source: NativeAudioSource,
    sample_rate: u32,
    playing: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl RoomPlayback {
    /// Stream `samples` into the room. When `interruptible`, a concurrent
    /// `stop` aborts between frames and the outcome is `Interrupted`.
    pub async fn play(&self, samples: &[i16], interruptible: bool) -> VoiceResult<PlayOutcome> {
        if samples.is_empty() {
            return Ok(PlayOutcome::Completed);
        }

        self.stopped.store(false, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);

        let frame_len = (self.sample_rate / 100) as usize; // 10ms
        let mut scratch = vec![0i16; frame_len];
        let mut outcome = PlayOutcome::Completed;

        let result = async {
            for chunk in samples.chunks(frame_len) {
                if interruptible && self.stopped.load(Ordering::SeqCst) {
                    outcome = PlayOutcome::Interrupted;
                    debug!("playback interrupted");
                    break;
                }
                let data: Cow<'_, [i16]> = if chunk.len() == frame_len {
                    Cow::Borrowed(chunk)
                } else {
                    // Pad the tail frame with silence.
                    scratch[..chunk.len()].copy_from_slice(chunk);
                    scratch[chunk.len()..].fill(0);
                    Cow::Borrowed(&scratch[..])
                };
                let frame = AudioFrame {
                    data,
                    sample_rate: self.sample_rate,
                    num_channels: 1,
                    samples_per_channel: frame_len as u32,
                };
                self.source
                    .capture_frame(&frame)
                    .await
                    .map_err(|e| VoiceError::Room(e.to_string()))?;
            }
            Ok(())
        }
        .await;

        self.playing.store(false, Ordering::SeqCst);
        result.map(|_| outcome)
    }

    /// Interruption kill-switch: halt the current interruptible playback.
    pub fn stop(&self) {
        if self.playing.load(Ordering::SeqCst) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Mint a room-scoped join token for the agent identity.
pub fn mint_join_token(
    api_key: &str,
    api_secret: &str,
    room_name: &str,
    identity: &str,
    display_name: &str,
) -> VoiceResult<String> {
    AccessToken::with_api_key(api_key, api_secret)
        .with_identity(identity)
        .with_name(display_name)
        .with_grants(VideoGrants {
            room_join: true,
            room: room_name.to_string(),
            can_publish: true,
            can_subscribe: true,
            ..Default::default()
        })
        .with_ttl(Duration::from_secs(3600))
        .to_jwt()
        .map_err(|e| VoiceError::Token(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_playback(sample_rate: u32) -> RoomPlayback {
        RoomPlayback {
            source: NativeAudioSource::new(AudioSourceOptions::default(), sample_rate, 1, 100),
            sample_rate,
            playing: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn default_options_capture_at_16k() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.capture_sample_rate, 16000);
    }

    #[tokio::test]
    async fn stop_interrupts_interruptible_playback() {
        let playback = test_playback(16000);
        // 2s of audio; the source queue paces capture, so playback outlives
        // the stop call below.
        let samples = vec![0i16; 32000];

        let handle = {
            let playback = playback.clone();
            tokio::spawn(async move { playback.play(&samples, true).await })
        };

        while !playback.is_playing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        playback.stop();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PlayOutcome::Interrupted);
        assert!(!playback.is_playing());
    }

    #[tokio::test]
    async fn stop_does_not_abort_non_interruptible_playback() {
        let playback = test_playback(16000);
        let samples = vec![0i16; 8000]; // 500ms

        let handle = {
            let playback = playback.clone();
            tokio::spawn(async move { playback.play(&samples, false).await })
        };

        while !playback.is_playing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        playback.stop();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PlayOutcome::Completed);
    }

    #[test]
    fn join_token_is_a_jwt() {
        let jwt = mint_join_token("api-key", "secret-at-least-256-bits-long-okay", "sbx-demo", "agent", "Agent").unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }
}
