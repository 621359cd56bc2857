//! Worker runtime - offer rooms to an agent, run the jobs it accepts.
//!
//! An agent implements three callbacks: `prewarm` (one-time blocking
//! initialization, shared by every job), `filter_request` (take or decline an
//! offered room), and `run_job` (drive one accepted session). The worker
//! prewarms exactly once before the first job, then loops on offers. When
//! every dispatcher is dropped the worker drains in-flight jobs and returns;
//! Ctrl-C aborts them instead.

use crate::error::{VoiceError, VoiceResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A room that wants an agent.
#[derive(Debug, Clone)]
pub struct JobOffer {
    pub id: String,
    pub room_name: String,
}

/// A pending offer handed to `filter_request`. Consume it with `accept` or
/// `reject`; dropping it without deciding counts as a rejection.
pub struct JobRequest {
    offer: JobOffer,
    decision: oneshot::Sender<bool>,
}

impl JobRequest {
    pub fn offer(&self) -> &JobOffer {
        &self.offer
    }

    pub fn room_name(&self) -> &str {
        &self.offer.room_name
    }

    /// Take the job. The worker will call `run_job` with this offer.
    pub fn accept(self) {
        info!(job = %self.offer.id, room = %self.offer.room_name, "job accepted");
        let _ = self.decision.send(true);
    }

    /// Decline the job.
    pub fn reject(self, reason: &str) {
        info!(job = %self.offer.id, room = %self.offer.room_name, reason, "job rejected");
        let _ = self.decision.send(false);
    }
}

/// Everything `run_job` needs: the offer plus the shared prewarmed state.
pub struct JobContext<P> {
    pub offer: JobOffer,
    pub prewarmed: Arc<P>,
}

/// The agent callbacks driven by the worker.
pub trait VoiceAgent: Send + Sync + 'static {
    /// State built once per process and shared by every job.
    type Prewarmed: Send + Sync + 'static;

    /// One-time blocking initialization. Runs before any job is offered.
    fn prewarm(&self) -> VoiceResult<Self::Prewarmed>;

    /// Decide whether to take the offered room. Must `accept` or `reject`
    /// the request; dropping it declines.
    fn filter_request(&self, request: JobRequest) -> impl Future<Output = ()> + Send;

    /// Drive one accepted session to completion.
    fn run_job(
        &self,
        ctx: JobContext<Self::Prewarmed>,
    ) -> impl Future<Output = VoiceResult<()>> + Send;
}

/// Submits job offers to a running worker. Clone freely; dropping every
/// dispatcher ends the worker's offer loop.
#[derive(Clone)]
pub struct JobDispatcher {
    tx: mpsc::UnboundedSender<JobOffer>,
}

impl JobDispatcher {
    pub fn submit(&self, offer: JobOffer) -> VoiceResult<()> {
        self.tx
            .send(offer)
            .map_err(|_| VoiceError::Worker("worker is no longer accepting offers".to_string()))
    }
}

/// Owns the agent and the offer queue.
pub struct Worker<A: VoiceAgent> {
    agent: Arc<A>,
    offers: mpsc::UnboundedReceiver<JobOffer>,
}

impl<A: VoiceAgent> Worker<A> {
    pub fn new(agent: A) -> (Self, JobDispatcher) {
        let (tx, offers) = mpsc::unbounded_channel();
        (
            Self {
                agent: Arc::new(agent),
                offers,
            },
            JobDispatcher { tx },
        )
    }

    /// Prewarm, then serve offers until every dispatcher is dropped or
    /// Ctrl-C arrives. In-flight jobs are drained before returning.
    pub async fn run(mut self) -> VoiceResult<()> {
        info!("prewarming worker");
        let agent = Arc::clone(&self.agent);
        let prewarmed = tokio::task::spawn_blocking(move || agent.prewarm())
            .await
            .map_err(|e| VoiceError::Worker(e.to_string()))??;
        let prewarmed = Arc::new(prewarmed);
        info!("worker ready, waiting for jobs");

        let mut jobs: JoinSet<VoiceResult<()>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!(active = jobs.len(), "shutdown signal received, aborting jobs");
                    jobs.shutdown().await;
                    info!("worker stopped");
                    return Ok(());
                }
                offer = self.offers.recv() => {
                    let Some(offer) = offer else {
                        debug!("offer queue closed");
                        break;
                    };
                    if let Some(ctx) = self.offer_job(offer, &prewarmed).await {
                        let agent = Arc::clone(&self.agent);
                        jobs.spawn(async move { agent.run_job(ctx).await });
                    }
                }
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                    log_job_result(finished);
                }
            }
        }

        while let Some(finished) = jobs.join_next().await {
            log_job_result(finished);
        }
        info!("worker stopped");
        Ok(())
    }

    /// Offer one job to the agent; `Some` means it was accepted.
    async fn offer_job(
        &self,
        offer: JobOffer,
        prewarmed: &Arc<A::Prewarmed>,
    ) -> Option<JobContext<A::Prewarmed>> {
        debug!(job = %offer.id, room = %offer.room_name, "offering job");
        let (decision_tx, decision_rx) = oneshot::channel();
        self.agent
            .filter_request(JobRequest {
                offer: offer.clone(),
                decision: decision_tx,
            })
            .await;

        match decision_rx.await {
            Ok(true) => Some(JobContext {
                offer,
                prewarmed: Arc::clone(prewarmed),
            }),
            Ok(false) => None,
            Err(_) => {
                // Request dropped without a decision.
                info!(job = %offer.id, "job request dropped, treating as rejection");
                None
            }
        }
    }
}

fn log_job_result(finished: Result<VoiceResult<()>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(())) => debug!("job finished"),
        Ok(Err(e)) => warn!(error = %e, "job failed"),
        Err(e) => error!(error = %e, "job panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingAgent {
        accept_rooms_starting_with: Option<String>,
        drop_requests: bool,
        log: Arc<Mutex<Vec<String>>>,
        runs: Arc<AtomicUsize>,
    }

    impl RecordingAgent {
        fn new() -> Self {
            Self {
                accept_rooms_starting_with: None,
                drop_requests: false,
                log: Arc::new(Mutex::new(Vec::new())),
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl VoiceAgent for RecordingAgent {
        type Prewarmed = u64;

        fn prewarm(&self) -> VoiceResult<u64> {
            self.log.lock().unwrap().push("prewarm".to_string());
            Ok(42)
        }

        fn filter_request(&self, request: JobRequest) -> impl Future<Output = ()> + Send {
            let accept = match &self.accept_rooms_starting_with {
                Some(prefix) => request.room_name().starts_with(prefix.as_str()),
                None => true,
            };
            let drop_requests = self.drop_requests;
            async move {
                if drop_requests {
                    drop(request);
                } else if accept {
                    request.accept();
                } else {
                    request.reject("room does not match");
                }
            }
        }

        fn run_job(
            &self,
            ctx: JobContext<u64>,
        ) -> impl Future<Output = VoiceResult<()>> + Send {
            self.log
                .lock()
                .unwrap()
                .push(format!("run:{}", ctx.offer.room_name));
            self.runs.fetch_add(1, Ordering::SeqCst);
            assert_eq!(*ctx.prewarmed, 42);
            async { Ok(()) }
        }
    }

    fn offer(id: &str, room: &str) -> JobOffer {
        JobOffer {
            id: id.to_string(),
            room_name: room.to_string(),
        }
    }

    #[tokio::test]
    async fn prewarms_once_before_any_job() {
        let agent = RecordingAgent::new();
        let log = Arc::clone(&agent.log);

        let (worker, dispatcher) = Worker::new(agent);
        dispatcher.submit(offer("j1", "room-a")).unwrap();
        dispatcher.submit(offer("j2", "room-b")).unwrap();
        drop(dispatcher);

        worker.run().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|s| *s == "prewarm").count(), 1);
        assert_eq!(log[0], "prewarm");
        assert!(log.contains(&"run:room-a".to_string()));
        assert!(log.contains(&"run:room-b".to_string()));
    }

    #[tokio::test]
    async fn rejected_offers_never_run() {
        let mut agent = RecordingAgent::new();
        agent.accept_rooms_starting_with = Some("sbx-".to_string());
        let runs = Arc::clone(&agent.runs);

        let (worker, dispatcher) = Worker::new(agent);
        dispatcher.submit(offer("j1", "lobby")).unwrap();
        dispatcher.submit(offer("j2", "sbx-demo")).unwrap();
        drop(dispatcher);

        worker.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_request_counts_as_rejection() {
        let mut agent = RecordingAgent::new();
        agent.drop_requests = true;
        let runs = Arc::clone(&agent.runs);

        let (worker, dispatcher) = Worker::new(agent);
        dispatcher.submit(offer("j1", "sbx-demo")).unwrap();
        drop(dispatcher);

        worker.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_after_worker_gone_errors() {
        let agent = RecordingAgent::new();
        let (worker, dispatcher) = Worker::new(agent);
        drop(worker);
        assert!(dispatcher.submit(offer("j1", "sbx-demo")).is_err());
    }
}
