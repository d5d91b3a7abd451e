use std::{path::PathBuf, sync::{atomic::{AtomicBool, Ordering}, Arc}};

#[allow(unused_imports)]
use log::{info,warn,debug,error,trace};
use tokio::{sync::{watch, Semaphore}, task::JoinSet};

use crate::backend::{ComputeGateway, DispatchRequest, FailureReason, GatewayError, JobOutcome, Readiness};
use crate::podchaser::{DiscoveryError, Episode, EpisodeSource};
use crate::selector;
use crate::transcript::{StoreError, TranscriptStore};

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to start backend: {0}")]
    BackendUnavailable(#[from] GatewayError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("failed to save transcript for {episode}: {source}")]
    Store {
        episode: String,
        #[source]
        source: StoreError,
    },
    #[error("run cancelled")]
    Cancelled,
    #[error("Runtime error: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}

/// Cooperative stop signal shared between the caller and the workers of a run.
/// Once cancelled it stays cancelled.
#[derive(Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl Cancellation {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c).await;
    }
}

#[derive(Debug, Clone)]
pub struct ShowRequest {
    pub name: String,
    pub max_episodes: usize,
    pub filter: Option<String>,
    pub language: String,
    pub auto_stop: bool,
}

#[derive(Debug, Clone)]
pub struct EpisodeFailure {
    pub episode: String,
    pub reason: FailureReason,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub podcast_title: String,
    pub selected: usize,
    /// Written transcripts, in selection order.
    pub transcripts: Vec<PathBuf>,
    pub failures: Vec<EpisodeFailure>,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.selected
    }

    pub fn succeeded(&self) -> usize {
        self.transcripts.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

enum Slot {
    Saved(PathBuf),
    Failed(FailureReason),
}

type WorkerResult = Result<(usize, String, Slot), PipelineError>;

/// Show name in, transcript files out: backend readiness, discovery, selection, one
/// dispatch per episode on a bounded pool, persistence and optional teardown.
pub struct Pipeline {
    source: Arc<dyn EpisodeSource>,
    gateway: Arc<ComputeGateway>,
    store: Arc<TranscriptStore>,
    scan_limit: usize,
    cancel: Cancellation,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn EpisodeSource>,
        gateway: Arc<ComputeGateway>,
        store: Arc<TranscriptStore>,
        scan_limit: usize,
    ) -> Self {
        Self {
            source,
            gateway,
            store,
            scan_limit,
            cancel: Cancellation::default(),
        }
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    pub async fn process_show(&self, req: &ShowRequest) -> Result<RunSummary, PipelineError> {
        info!("starting transcription of '{}'", req.name);
        info!("max episodes: {}", req.max_episodes);
        if let Some(f) = &req.filter {
            info!("filter: {}", f);
        }
        info!("language: {}", req.language);

        match self.gateway.ensure_ready().await? {
            Readiness::Ready => {}
            Readiness::Unconfirmed => warn!("backend readiness unconfirmed, dispatching anyway"),
        }

        let podcast = self.source.find_podcast(&req.name).await?;
        let limit = match req.filter {
            Some(_) => self.scan_limit.max(req.max_episodes),
            None => req.max_episodes,
        };
        let raw = self.source.episodes(&podcast, limit).await?;
        info!("found {} episodes", raw.len());

        let episodes = selector::select(raw, req.max_episodes, req.filter.as_deref());
        let mut summary = RunSummary {
            podcast_title: podcast.title.clone(),
            selected: episodes.len(),
            ..Default::default()
        };
        if episodes.is_empty() {
            error!("no valid episodes found");
            return Ok(summary);
        }

        let slots = self.dispatch_all(episodes, &podcast.title, &req.language).await?;
        for (title, slot) in slots.into_iter().flatten() {
            match slot {
                Slot::Saved(path) => summary.transcripts.push(path),
                Slot::Failed(reason) => summary.failures.push(EpisodeFailure { episode: title, reason }),
            }
        }

        info!(
            "pipeline complete, transcribed {}/{} episodes ({} failed)",
            summary.succeeded(),
            summary.attempted(),
            summary.failed(),
        );
        info!("files saved to {}", self.store.output_dir().display());

        if req.auto_stop {
            self.gateway.teardown().await;
        }
        Ok(summary)
    }

    /// Dispatches every episode with at most `concurrency` jobs in flight. Jobs start in
    /// selection order and land in their own slot, whatever order they finish in.
    async fn dispatch_all(&self, episodes: Vec<Episode>, podcast_title: &str, language: &str) -> Result<Vec<Option<(String, Slot)>>, PipelineError> {
        let total = episodes.len();
        let permits = Arc::new(Semaphore::new(self.gateway.config().concurrency.max(1)));
        let podcast_title: Arc<str> = Arc::from(podcast_title);
        let mut slots: Vec<Option<(String, Slot)>> = (0..total).map(|_| None).collect();
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        // raised by a worker before it releases its permit, so no job starts after a fatal error
        let fatal = Arc::new(AtomicBool::new(false));

        for (i, episode) in episodes.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                p = permits.clone().acquire_owned() => p.map_err(|_| PipelineError::Cancelled)?,
            };
            if fatal.load(Ordering::SeqCst) {
                break;
            }
            while let Some(joined) = workers.try_join_next() {
                Self::record(&mut slots, joined)?;
            }

            info!("processing episode {}/{}: {}", i + 1, total, episode);
            let title = episode.title.clone();
            let request = DispatchRequest::new(episode, language, self.gateway.config().job_timeout());
            let gateway = self.gateway.clone();
            let store = self.store.clone();
            let cancel = self.cancel.clone();
            let podcast_title = podcast_title.clone();
            let fatal = fatal.clone();
            workers.spawn(async move {
                let _permit = permit;
                // dropping the dispatch future kills the job's process
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => JobOutcome::Failure(FailureReason::Cancelled),
                    o = gateway.dispatch(&request) => o,
                };
                let slot = match outcome {
                    JobOutcome::Success(t) => {
                        let preview: String = t.text.chars().take(PREVIEW_CHARS).collect();
                        let path = match store.persist(t, request.episode(), &podcast_title) {
                            Ok(path) => path,
                            Err(source) => {
                                fatal.store(true, Ordering::SeqCst);
                                return Err(PipelineError::Store {
                                    episode: request.episode().to_string(),
                                    source,
                                });
                            }
                        };
                        info!("preview: {}...", preview);
                        Slot::Saved(path)
                    }
                    JobOutcome::Failure(reason) => {
                        warn!("skipping failed transcription for episode {}/{} {}: {}", i + 1, total, request.episode(), reason);
                        Slot::Failed(reason)
                    }
                };
                Ok((i, title, slot))
            });
        }

        while let Some(joined) = workers.join_next().await {
            Self::record(&mut slots, joined)?;
        }

        if self.cancel.is_cancelled() {
            warn!("run cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(slots)
    }

    fn record(slots: &mut [Option<(String, Slot)>], joined: Result<WorkerResult, tokio::task::JoinError>) -> Result<(), PipelineError> {
        let (i, title, slot) = joined??;
        slots[i] = Some((title, slot));
        Ok(())
    }
}
