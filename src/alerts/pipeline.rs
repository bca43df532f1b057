use super::AlertJob;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::store::AlertSink;
use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker count and queue bound for an [`AlertPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            capacity: 100,
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            workers: cfg.alert_workers,
            capacity: cfg.alert_queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

/// Counters since the pipeline was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub persisted: u64,
    pub failed: u64,
    pub discarded: u64,
}

#[derive(Default)]
struct StatCounters {
    persisted: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

enum Runtime {
    NotStarted,
    Running {
        cancel: CancellationToken,
        workers: Vec<JoinHandle<()>>,
    },
    Draining,
    Stopped,
}

impl Runtime {
    fn state(&self) -> PipelineState {
        match self {
            Runtime::NotStarted => PipelineState::NotStarted,
            Runtime::Running { .. } => PipelineState::Running,
            Runtime::Draining => PipelineState::Draining,
            Runtime::Stopped => PipelineState::Stopped,
        }
    }
}

/// Cloneable producer side of the alert queue.
#[derive(Clone, Debug)]
pub struct AlertQueue {
    tx: mpsc::Sender<AlertJob>,
}

impl AlertQueue {
    /// Submits a job, waiting for space while the queue is full.
    ///
    /// Returns `QueueClosed` once the pipeline has shut down.
    pub async fn enqueue(&self, job: AlertJob) -> Result<(), ServiceError> {
        let product_id = job.product_id;
        self.tx.send(job).await.map_err(|_| {
            warn!(product_id, "alert queue closed; job not accepted");
            ServiceError::QueueClosed
        })?;

        counter!("inventory.alerts.enqueued", 1);
        Ok(())
    }

    /// Free slots right now
    pub fn available_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Fixed pool of workers draining one bounded queue into an [`AlertSink`].
///
/// Lifecycle: `NotStarted -> Running -> Draining -> Stopped`. Jobs are
/// delivered to exactly one worker; a failed persist is logged and dropped.
pub struct AlertPipeline {
    config: PipelineConfig,
    sink: Arc<dyn AlertSink>,
    tx: mpsc::Sender<AlertJob>,
    rx: Arc<AsyncMutex<mpsc::Receiver<AlertJob>>>,
    runtime: Mutex<Runtime>,
    stats: Arc<StatCounters>,
}

impl AlertPipeline {
    pub fn new(sink: Arc<dyn AlertSink>, config: PipelineConfig) -> Self {
        let config = PipelineConfig {
            workers: config.workers.max(1),
            capacity: config.capacity.max(1),
        };
        let (tx, rx) = mpsc::channel(config.capacity);

        Self {
            config,
            sink,
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            runtime: Mutex::new(Runtime::NotStarted),
            stats: Arc::new(StatCounters::default()),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Producer handle. Jobs submitted before [`start`](Self::start) wait
    /// in the queue.
    pub fn queue(&self) -> AlertQueue {
        AlertQueue {
            tx: self.tx.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.runtime().state()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            persisted: self.stats.persisted.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
        }
    }

    /// Spawns all workers at once. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut runtime = self.runtime();
        if !matches!(*runtime, Runtime::NotStarted) {
            return Err(ServiceError::InternalError(format!(
                "alert pipeline cannot start from state {:?}",
                runtime.state()
            )));
        }

        let cancel = CancellationToken::new();
        let workers = (0..self.config.workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&self.rx),
                    Arc::clone(&self.sink),
                    cancel.clone(),
                    Arc::clone(&self.stats),
                ))
            })
            .collect();

        *runtime = Runtime::Running { cancel, workers };
        info!(
            workers = self.config.workers,
            capacity = self.config.capacity,
            "alert pipeline started"
        );
        Ok(())
    }

    /// Signals cancellation, waits for every worker to finish its current
    /// job, then closes the queue and discards whatever is still buffered.
    pub async fn shutdown(&self) {
        let workers = {
            let mut runtime = self.runtime();
            let previous = std::mem::replace(&mut *runtime, Runtime::Draining);
            match previous {
                Runtime::Running { cancel, workers } => {
                    cancel.cancel();
                    workers
                }
                Runtime::NotStarted => Vec::new(),
                previous @ (Runtime::Draining | Runtime::Stopped) => {
                    *runtime = previous;
                    return;
                }
            }
        };

        info!(workers = workers.len(), "alert pipeline draining");
        for handle in workers {
            if let Err(err) = handle.await {
                error!(error = %err, "alert worker terminated abnormally");
            }
        }

        let discarded = {
            let mut rx = self.rx.lock().await;
            rx.close();
            let mut discarded = 0u64;
            while let Ok(job) = rx.try_recv() {
                debug!(product_id = job.product_id, "discarding queued alert job");
                discarded += 1;
            }
            discarded
        };

        if discarded > 0 {
            self.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
            counter!("inventory.alerts.discarded", discarded);
            warn!(discarded, "alert jobs left in queue at shutdown were discarded");
        }

        *self.runtime() = Runtime::Stopped;
        info!("alert pipeline stopped");
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<AlertJob>>>,
    sink: Arc<dyn AlertSink>,
    cancel: CancellationToken,
    stats: Arc<StatCounters>,
) {
    debug!(worker_id, "alert worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        match sink.persist_alert(job.to_new_alert()).await {
            Ok(alert) => {
                stats.persisted.fetch_add(1, Ordering::Relaxed);
                counter!("inventory.alerts.persisted", 1);
                info!(
                    worker_id,
                    alert_id = alert.id,
                    product_id = alert.product_id,
                    stock = alert.stock,
                    threshold = alert.threshold,
                    "low-stock alert recorded"
                );
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                counter!("inventory.alerts.failed", 1);
                error!(
                    worker_id,
                    product_id = job.product_id,
                    error = %err,
                    "failed to persist low-stock alert; job dropped"
                );
            }
        }
    }

    debug!(worker_id, "alert worker exiting");
}
