//! Aven sandbox voice agent worker.
//!
//! Pre-warms the VAD model once, then joins the requested media room as a
//! voice assistant: greets the first participant and converses until the
//! room closes.

mod agent;

use agent::SandboxAgent;
use aven_voice::{JobOffer, Worker};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env.local (sandbox credentials) or .env before any env::var calls
    if dotenvy::from_filename(".env.local").is_err() {
        if let Err(e) = dotenvy::dotenv() {
            eprintln!("[aven-agent] .env not loaded: {} (using system environment)", e);
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let agent = SandboxAgent::from_env().expect("load agent config");

    let room = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AGENT_ROOM").ok())
        .expect("pass a room name as the first argument or set AGENT_ROOM");

    let (worker, dispatcher) = Worker::new(agent);
    dispatcher
        .submit(JobOffer {
            id: format!("job-{}", std::process::id()),
            room_name: room,
        })
        .expect("submit job offer");

    // Keep the dispatcher alive so Ctrl-C, not queue closure, ends the worker.
    let _dispatcher = dispatcher;

    if let Err(e) = worker.run().await {
        tracing::error!(error = %e, "worker failed");
        std::process::exit(1);
    }
}
