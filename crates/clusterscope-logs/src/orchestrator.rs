use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clusterscope_types::{LogRecord, ResourceInfo, ResourceKey, StreamOptions};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::sink::RecordSink;
use crate::source::ResourceDirectory;
use crate::stream::LogStreamer;

/// A running per-pod stream
struct ActiveWorker {
    cancel: CancellationToken,
    /// Distinguishes this worker from a later one for the same pod
    generation: u64,
    task: JoinHandle<()>,
}

/// Sent by a worker task when its stream returns
struct WorkerExit {
    key: ResourceKey,
    generation: u64,
}

/// Keeps one [`LogStreamer`] per scheduled pod of a namespace and merges
/// their records into a single sink
///
/// Records pass through a bounded queue. When the sink is slower than the
/// pods, workers wait on that queue, so a stalled sink stalls every pod.
///
/// Only one [`run`](Self::run) should be active per instance.
pub struct NamespaceStreamer {
    streamer: LogStreamer,
    directory: Arc<dyn ResourceDirectory>,
    namespace: String,
    reconcile_interval: Duration,
    queue_capacity: usize,
    active: Mutex<HashMap<ResourceKey, ActiveWorker>>,
    next_generation: AtomicU64,
}

impl NamespaceStreamer {
    pub fn new(
        streamer: LogStreamer,
        directory: Arc<dyn ResourceDirectory>,
        namespace: impl Into<String>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            streamer,
            directory,
            namespace: namespace.into(),
            reconcile_interval: config.reconcile_interval,
            queue_capacity: config.queue_capacity.max(1),
            active: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pods that currently have a worker, sorted
    pub fn active_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.active.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stream the whole namespace into `sink` until `cancel` fires
    ///
    /// The pod set is reconciled immediately and then every reconcile
    /// interval. Returns `Ok(())` on cancellation and the sink's error if it
    /// refuses a record. Every worker has stopped by the time this returns.
    pub async fn run<S>(
        &self,
        options: StreamOptions,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<(), StreamError>
    where
        S: RecordSink + ?Sized,
    {
        let scope = cancel.child_token();
        let (record_tx, mut record_rx) = mpsc::channel::<LogRecord>(self.queue_capacity);
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<WorkerExit>();

        let mut ticker = tokio::time::interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(namespace = %self.namespace, "Namespace log stream started");

        let result = loop {
            tokio::select! {
                biased;

                _ = scope.cancelled() => break Ok(()),

                _ = ticker.tick() => {
                    let listed = tokio::select! {
                        biased;
                        _ = scope.cancelled() => break Ok(()),
                        listed = self.directory.list(&self.namespace) => listed,
                    };

                    match listed {
                        Ok(resources) => {
                            self.reconcile(resources, options, &scope, &record_tx, &exit_tx);
                        }
                        Err(err) => {
                            warn!(
                                namespace = %self.namespace,
                                error = %format!("{err:#}"),
                                "Failed to list pods, keeping current streams"
                            );
                        }
                    }
                }

                Some(exit) = exit_rx.recv() => self.reap(exit),

                Some(record) = record_rx.recv() => {
                    let delivered = tokio::select! {
                        biased;
                        _ = scope.cancelled() => break Ok(()),
                        delivered = sink.deliver(record) => delivered,
                    };

                    if let Err(err) = delivered {
                        break Err(StreamError::from(err));
                    }
                }
            }
        };

        scope.cancel();
        self.stop_all().await;

        match &result {
            Ok(()) => info!(namespace = %self.namespace, "Namespace log stream stopped"),
            Err(err) => info!(namespace = %self.namespace, error = %err, "Namespace log stream ended"),
        }
        result
    }

    /// Start workers for new scheduled pods and stop workers for vanished ones
    fn reconcile(
        &self,
        resources: Vec<ResourceInfo>,
        options: StreamOptions,
        scope: &CancellationToken,
        record_tx: &mpsc::Sender<LogRecord>,
        exit_tx: &mpsc::UnboundedSender<WorkerExit>,
    ) {
        let listed: HashSet<ResourceKey> = resources
            .iter()
            .filter(|resource| resource.is_scheduled())
            .map(ResourceInfo::key)
            .collect();

        let mut active = self.active.lock();

        active.retain(|key, worker| {
            if listed.contains(key) {
                return true;
            }
            debug!(namespace = %key.namespace, pod = %key.name, "Pod gone, stopping log stream");
            worker.cancel.cancel();
            false
        });

        for key in listed {
            if active.contains_key(&key) {
                continue;
            }
            let worker = self.spawn_worker(key.clone(), options, scope, record_tx.clone(), exit_tx.clone());
            active.insert(key, worker);
        }
    }

    fn spawn_worker(
        &self,
        key: ResourceKey,
        options: StreamOptions,
        scope: &CancellationToken,
        record_tx: mpsc::Sender<LogRecord>,
        exit_tx: mpsc::UnboundedSender<WorkerExit>,
    ) -> ActiveWorker {
        let cancel = scope.child_token();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let streamer = self.streamer.clone();

        debug!(namespace = %key.namespace, pod = %key.name, generation, "Starting log stream");

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let mut sink = record_tx;
                match streamer.stream(&key, options, &cancel, &mut sink).await {
                    Ok(()) => {
                        debug!(namespace = %key.namespace, pod = %key.name, "Log stream stopped");
                    }
                    Err(_) if cancel.is_cancelled() => {}
                    Err(err) => {
                        warn!(namespace = %key.namespace, pod = %key.name, error = %err, "Pod log stream ended");
                    }
                }
                // The receiver only disappears once the orchestrator is done
                let _ = exit_tx.send(WorkerExit { key, generation });
            }
        });

        ActiveWorker {
            cancel,
            generation,
            task,
        }
    }

    /// Forget a worker whose stream returned on its own, so the next
    /// reconcile can start it again
    fn reap(&self, exit: WorkerExit) {
        let mut active = self.active.lock();
        if active
            .get(&exit.key)
            .is_some_and(|worker| worker.generation == exit.generation)
        {
            active.remove(&exit.key);
            debug!(namespace = %exit.key.namespace, pod = %exit.key.name, "Reaped finished log stream");
        }
    }

    async fn stop_all(&self) {
        let workers: Vec<ActiveWorker> = self.active.lock().drain().map(|(_, worker)| worker).collect();

        for worker in &workers {
            worker.cancel.cancel();
        }
        for worker in workers {
            if let Err(err) = worker.task.await {
                if err.is_panic() {
                    warn!(namespace = %self.namespace, "Log stream worker panicked");
                }
            }
        }
    }
}
