//! The sandbox-scoped assistant: job filtering plus the per-room session.

use aven_voice::{
    mint_join_token, ChatContext, ConnectOptions, DeepgramStt, JobContext, JobRequest, OpenAiLlm,
    OpenAiTts, RoomHandle, VadConfig, VadModel, VoiceAgent, VoiceAssistant, VoiceError,
    VoiceResult,
};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

const PERSONA: &str = "You are a voice assistant created by LiveKit. Your interface with users \
     will be voice. You should use short and concise responses, and avoiding usage of \
     unpronouncable punctuation. You were created as a demo to showcase the capabilities of \
     LiveKit's agents framework, as well as the ease of development of realtime AI prototypes. \
     You are currently running in a LiveKit Sandbox, which is an environment that allows \
     developers to instantly deploy prototypes of their realtime AI applications to share \
     with others.";

const GREETING: &str = "Hey, how can I help you today?";

const AGENT_IDENTITY: &str = "aven-agent";

/// How the agent authenticates to the media server.
enum Credentials {
    /// A pre-minted join token (LIVEKIT_TOKEN).
    Token(String),
    /// API key pair; a room-scoped token is minted per job.
    ApiKey { key: String, secret: String },
}

/// A voice assistant worker scoped to one sandbox. With a sandbox id set it
/// only takes rooms named for that sandbox; without one it takes everything.
pub struct SandboxAgent {
    sandbox: Option<String>,
    url: String,
    credentials: Credentials,
}

impl SandboxAgent {
    /// Build from environment: LIVEKIT_URL, LIVEKIT_SANDBOX_ID, and either
    /// LIVEKIT_TOKEN or LIVEKIT_API_KEY + LIVEKIT_API_SECRET.
    pub fn from_env() -> VoiceResult<Self> {
        let url = std::env::var("LIVEKIT_URL")
            .map_err(|_| VoiceError::Config("LIVEKIT_URL is required".to_string()))?;
        let sandbox = std::env::var("LIVEKIT_SANDBOX_ID")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let credentials = match std::env::var("LIVEKIT_TOKEN") {
            Ok(token) => Credentials::Token(token),
            Err(_) => {
                let key = std::env::var("LIVEKIT_API_KEY").map_err(|_| {
                    VoiceError::Config(
                        "set LIVEKIT_TOKEN, or LIVEKIT_API_KEY + LIVEKIT_API_SECRET".to_string(),
                    )
                })?;
                let secret = std::env::var("LIVEKIT_API_SECRET").map_err(|_| {
                    VoiceError::Config("LIVEKIT_API_SECRET is required".to_string())
                })?;
                Credentials::ApiKey { key, secret }
            }
        };

        Ok(Self {
            sandbox,
            url,
            credentials,
        })
    }

    fn join_token(&self, room: &str) -> VoiceResult<String> {
        match &self.credentials {
            Credentials::Token(token) => Ok(token.clone()),
            Credentials::ApiKey { key, secret } => {
                mint_join_token(key, secret, room, AGENT_IDENTITY, "Aven Agent")
            }
        }
    }

    async fn run_session(&self, ctx: JobContext<VadModel>) -> VoiceResult<()> {
        let room_name = ctx.offer.room_name.clone();
        let token = self.join_token(&room_name)?;

        let room = RoomHandle::connect(&self.url, &token, ConnectOptions::default()).await?;
        let participant = room.wait_for_participant().await?;
        info!(room = %room_name, identity = %participant.identity, "participant joined");

        let stt = Arc::new(DeepgramStt::from_env()?);
        let llm = Arc::new(OpenAiLlm::from_env()?);
        let tts = Arc::new(OpenAiTts::from_env()?);

        let mut assistant = VoiceAssistant::new(
            Arc::clone(&ctx.prewarmed),
            stt,
            llm,
            tts,
            ChatContext::with_system(PERSONA),
        );
        assistant.start(room, participant).await?;
        assistant.say(GREETING, true).await?;

        assistant.closed().await;
        info!(room = %room_name, "session ended");
        Ok(())
    }
}

impl VoiceAgent for SandboxAgent {
    type Prewarmed = VadModel;

    fn prewarm(&self) -> VoiceResult<VadModel> {
        VadModel::load(VadConfig::default())
    }

    fn filter_request(&self, request: JobRequest) -> impl Future<Output = ()> + Send {
        let accept = accepts_room(self.sandbox.as_deref(), request.room_name());
        async move {
            if accept {
                request.accept();
            } else {
                request.reject("room is outside this sandbox");
            }
        }
    }

    fn run_job(
        &self,
        ctx: JobContext<VadModel>,
    ) -> impl Future<Output = VoiceResult<()>> + Send {
        self.run_session(ctx)
    }
}

/// Sandbox ids look like `my-demo-abc123`; rooms created for that sandbox are
/// prefixed with `sbx-abc123`. No sandbox id means take every room.
fn accepts_room(sandbox: Option<&str>, room: &str) -> bool {
    match sandbox.and_then(sandbox_suffix) {
        Some(hash) => room.starts_with(&format!("sbx-{hash}")),
        None => true,
    }
}

/// The hash is the part after the last dash (the whole id if there is none).
fn sandbox_suffix(sandbox: &str) -> Option<&str> {
    let trimmed = sandbox.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.rsplit('-').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_is_the_full_demo_script() {
        assert!(PERSONA.starts_with("You are a voice assistant created by LiveKit."));
        assert!(PERSONA.contains("avoiding usage of unpronouncable punctuation."));
        assert!(PERSONA.contains(
            "demo to showcase the capabilities of LiveKit's agents framework"
        ));
        assert!(PERSONA.ends_with(
            "prototypes of their realtime AI applications to share with others."
        ));
    }

    #[test]
    fn suffix_is_part_after_last_dash() {
        assert_eq!(sandbox_suffix("my-demo-abc123"), Some("abc123"));
        assert_eq!(sandbox_suffix("abc123"), Some("abc123"));
        assert_eq!(sandbox_suffix("  "), None);
    }

    #[test]
    fn matching_sandbox_room_is_accepted() {
        assert!(accepts_room(Some("demo-abc123"), "sbx-abc123"));
        assert!(accepts_room(Some("demo-abc123"), "sbx-abc123-room1"));
    }

    #[test]
    fn other_sandbox_rooms_are_rejected() {
        assert!(!accepts_room(Some("demo-abc123"), "sbx-xyz789-room1"));
        assert!(!accepts_room(Some("demo-abc123"), "lobby"));
    }

    #[test]
    fn no_sandbox_accepts_everything() {
        assert!(accepts_room(None, "lobby"));
        assert!(accepts_room(None, "sbx-xyz789"));
    }
}
