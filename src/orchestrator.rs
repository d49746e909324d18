use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::client::MetricsSource;
use crate::storage::buffer::{merge, retain_window, Buffer, Sample, SampleKey};
use crate::storage::SnapshotStore;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing new and nothing expired; the buffer reference was kept.
    Unchanged,
    Updated {
        added: usize,
        expired: usize,
        len: usize,
    },
    /// The fetch failed; treated like `Unchanged`.
    FetchFailed,
}

/// Owns the authoritative buffer and drives merge -> retain -> persist -> publish.
pub struct Orchestrator<P> {
    buffer: Buffer,
    window_secs: i64,
    store: P,
    publisher: watch::Sender<Buffer>,
}

impl<P: SnapshotStore> Orchestrator<P> {
    /// Start from the persisted snapshot, or empty if it cannot be read.
    pub async fn hydrate(store: P, window_secs: i64, now: i64) -> Self {
        let restored = match store.load().await {
            Ok(samples) => retain_window(&merge(&[], &samples), window_secs, now),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot unavailable, starting with an empty buffer");
                Vec::new()
            }
        };
        if !restored.is_empty() {
            tracing::info!(samples = restored.len(), "hydrated buffer from snapshot");
        }
        let buffer = Buffer::from_vec(restored);
        let (publisher, _) = watch::channel(buffer.clone());
        Self {
            buffer,
            window_secs,
            store,
            publisher,
        }
    }

    /// Read-only feed of published buffers.
    pub fn subscribe(&self) -> watch::Receiver<Buffer> {
        self.publisher.subscribe()
    }

    pub fn buffer(&self) -> Buffer {
        self.buffer.clone()
    }

    pub async fn on_tick(&mut self, incoming: &[Sample], now: i64) -> TickOutcome {
        let prev_clean = retain_window(&self.buffer, self.window_secs, now);
        // collapse repeated keys first; only the last one would survive the merge
        let incoming_clean = merge(&[], &retain_window(incoming, self.window_secs, now));

        let expired = self.buffer.len() - prev_clean.len();
        let known: HashMap<SampleKey, &Sample> =
            prev_clean.iter().map(|s| (s.key(), s)).collect();
        // a sample already held with identical content is not news; a corrected value is
        let fresh = incoming_clean
            .iter()
            .filter(|s| known.get(&s.key()).map_or(true, |held| **held != **s))
            .count();

        if fresh == 0 && expired == 0 {
            return TickOutcome::Unchanged;
        }

        let merged = merge(&self.buffer, incoming);
        let cleaned = retain_window(&merged, self.window_secs, now);
        if let Err(e) = self.store.save(&cleaned).await {
            tracing::warn!(error = %e, "failed to persist snapshot, keeping in-memory buffer");
        }

        let len = cleaned.len();
        self.buffer = Buffer::from_vec(cleaned);
        self.publisher.send_replace(self.buffer.clone());
        TickOutcome::Updated {
            added: fresh,
            expired,
            len,
        }
    }
}

/// What the last poll did, for status reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub last_attempt: Option<i64>,
    pub last_success: Option<i64>,
    pub server_time: Option<i64>,
    pub consecutive_failures: u32,
    pub last_outcome: Option<TickOutcome>,
    pub last_error: Option<String>,
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Handle to the running poll task.
///
/// `stop` shuts the task down and hands back the orchestrator. Dropping the
/// handle without stopping aborts the task, so the timer never outlives it.
pub struct PollerHandle<P> {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<Orchestrator<P>>>,
    status: watch::Receiver<PollStatus>,
}

impl<P> PollerHandle<P> {
    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    pub async fn stop(mut self) -> Option<Orchestrator<P>> {
        let _ = self.shutdown.send(());
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl<P> Drop for PollerHandle<P> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run `orchestrator` on a timer. The first tick fires immediately; each
/// fetch completes before the next tick is taken, so responses can never be
/// applied out of order.
pub fn spawn_poller<S, P>(
    mut orchestrator: Orchestrator<P>,
    source: S,
    interval: Duration,
    shutdown: broadcast::Sender<()>,
) -> PollerHandle<P>
where
    S: MetricsSource + Send + Sync + 'static,
    P: SnapshotStore + Send + Sync + 'static,
{
    let (status_tx, status_rx) = watch::channel(PollStatus::default());
    let mut shutdown_sub = shutdown.subscribe();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_sub.recv() => break,
                _ = ticker.tick() => {
                    let started = unix_now();
                    let outcome = match source.fetch().await {
                        Ok(batch) => {
                            let outcome = orchestrator.on_tick(&batch.samples, unix_now()).await;
                            status_tx.send_modify(|st| {
                                st.last_attempt = Some(started);
                                st.last_success = Some(started);
                                st.server_time = batch.server_time.or(st.server_time);
                                st.consecutive_failures = 0;
                                st.last_outcome = Some(outcome);
                                st.last_error = None;
                            });
                            outcome
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "metrics fetch failed, keeping current buffer");
                            status_tx.send_modify(|st| {
                                st.last_attempt = Some(started);
                                st.consecutive_failures += 1;
                                st.last_outcome = Some(TickOutcome::FetchFailed);
                                st.last_error = Some(e.to_string());
                            });
                            TickOutcome::FetchFailed
                        }
                    };
                    if let TickOutcome::Updated { added, expired, len } = outcome {
                        tracing::debug!(added, expired, len, "buffer updated");
                    }
                }
            }
        }
        tracing::info!("poller stopped");
        orchestrator
    });

    PollerHandle {
        shutdown,
        task: Some(task),
        status: status_rx,
    }
}
