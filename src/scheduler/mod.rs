//! The Scheduler (C5): composition root and single-instance owner. Builds
//! C1/C2/C4/C6 with their explicit dependencies, owns the bounded job
//! queue `ingest`/`enrich`/`sync` flow through, and enforces the
//! concurrency contract — `ingest`/`enrich` serialize against each other,
//! `sync` serializes against itself but may run alongside `ingest` — with
//! two named semaphores rather than one global mutex.

pub mod lock;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::enrich::Enricher;
use crate::error::{CoreError, Result};
use crate::ingest::client::TelegramClient;
use crate::ingest::Ingestor;
use crate::metrics::Metrics;
use crate::store::Store;
use crate::sync::{Destination, SyncProjector};
use lock::InstanceLock;

/// Default cadences and offsets.
pub const INGEST_INTERVAL: Duration = Duration::from_secs(3600);
pub const ENRICH_INTERVAL: Duration = Duration::from_secs(3600);
pub const SYNC_INTERVAL: Duration = Duration::from_secs(3600);
pub const ENRICH_OFFSET: Duration = Duration::from_secs(5 * 60);
pub const SYNC_OFFSET: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Ingest,
    Enrich,
    Sync,
    /// Daily full-history bulk ingest driven by `SYNC_TIME`, fanning out to
    /// a full projector sync once the bulk ingest/enrich settle.
    DailyFullSync,
}

/// Parses `SYNC_TIME` ("HH:MM") into a six-field `cron::Schedule` firing
/// once a day at that local wall-clock time.
fn daily_schedule_from_hhmm(hhmm: &str) -> Result<Schedule> {
    let (h, m) = hhmm
        .split_once(':')
        .ok_or_else(|| CoreError::Config(format!("SYNC_TIME must be HH:MM, got '{hhmm}'")))?;
    h.parse::<u32>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| CoreError::Config(format!("SYNC_TIME must be HH:MM, got '{hhmm}'")))?;
    m.parse::<u32>()
        .ok()
        .filter(|m| *m < 60)
        .ok_or_else(|| CoreError::Config(format!("SYNC_TIME must be HH:MM, got '{hhmm}'")))?;
    let expr = format!("0 {m} {h} * * *");
    Schedule::from_str(&expr).map_err(|e| CoreError::Config(format!("invalid SYNC_TIME '{hhmm}': {e}")))
}

pub struct Job {
    pub kind: JobKind,
}

/// Owns the lock file, the job queue, and the serialization semaphores
/// that dispatch the three core job kinds.
pub struct Scheduler<C: TelegramClient, D: Destination> {
    store: Arc<Store>,
    ingestor: Arc<Ingestor<C>>,
    enricher: Arc<Enricher>,
    projector: Arc<SyncProjector<D>>,
    metrics: Arc<Metrics>,
    lock: InstanceLock,
    ingest_enrich_gate: Arc<Mutex<()>>,
    sync_gate: Arc<Mutex<()>>,
    queue_capacity: usize,
    daily_schedule: Schedule,
}

impl<C: TelegramClient + 'static, D: Destination + 'static> Scheduler<C, D> {
    /// `sync_time` is the validated `SYNC_TIME` config value ("HH:MM");
    /// bad cron expressions surface here rather than at first fire.
    pub fn new(
        store: Arc<Store>,
        ingestor: Arc<Ingestor<C>>,
        enricher: Arc<Enricher>,
        projector: Arc<SyncProjector<D>>,
        metrics: Arc<Metrics>,
        lock_path: std::path::PathBuf,
        sync_time: &str,
    ) -> Result<Self> {
        Ok(Self {
            store,
            ingestor,
            enricher,
            projector,
            metrics,
            lock: InstanceLock::new(lock_path),
            ingest_enrich_gate: Arc::new(Mutex::new(())),
            sync_gate: Arc::new(Mutex::new(())),
            queue_capacity: 64,
            daily_schedule: daily_schedule_from_hhmm(sync_time)?,
        })
    }

    /// Acquires the single-instance lock (`ErrAlreadyRunning` unless
    /// `force`), starts the three periodic producers and the worker loop,
    /// and blocks until a cancellation signal fires a graceful drain.
    pub async fn run(&self, force: bool, grace_period: Duration) -> Result<()> {
        self.lock.acquire(force)?;
        let guard = scopeguard(&self.lock);

        let (tx, mut rx) = mpsc::channel::<Job>(self.queue_capacity);
        let cancel = tokio_util_cancel();

        let ingest_tx = tx.clone();
        let ingest_cancel = cancel.clone();
        tokio::spawn(async move {
            periodic_producer(JobKind::Ingest, INGEST_INTERVAL, Duration::ZERO, ingest_tx, ingest_cancel).await;
        });

        let enrich_tx = tx.clone();
        let enrich_cancel = cancel.clone();
        tokio::spawn(async move {
            periodic_producer(JobKind::Enrich, ENRICH_INTERVAL, ENRICH_OFFSET, enrich_tx, enrich_cancel).await;
        });

        let sync_tx = tx.clone();
        let sync_cancel = cancel.clone();
        tokio::spawn(async move {
            periodic_producer(JobKind::Sync, SYNC_INTERVAL, SYNC_OFFSET, sync_tx, sync_cancel).await;
        });

        let daily_tx = tx.clone();
        let daily_cancel = cancel.clone();
        let daily_schedule = self.daily_schedule.clone();
        tokio::spawn(async move {
            daily_ingest_producer(daily_schedule, daily_tx, daily_cancel).await;
        });
        drop(tx);

        let shutdown = signal_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(job) = rx.recv() => {
                    self.dispatch(job).await;
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received; draining in-flight jobs");
                    tokio::time::timeout(grace_period, self.drain(&mut rx)).await.ok();
                    break;
                }
                else => break,
            }
        }

        drop(guard);
        Ok(())
    }

    async fn drain(&self, rx: &mut mpsc::Receiver<Job>) {
        while let Ok(job) = rx.try_recv() {
            self.dispatch(job).await;
        }
    }

    async fn dispatch(&self, job: Job) {
        match job.kind {
            JobKind::Ingest => {
                let _permit = self.ingest_enrich_gate.lock().await;
                match self.ingestor.fetch_all().await {
                    Ok(stats) => {
                        self.metrics.ingest_messages_total.inc_by(stats.messages_ingested as f64);
                        self.metrics.ingest_dialog_failures_total.inc_by(stats.dialogs_failed as f64);
                        self.metrics.ingest_flood_wait_seconds_total.inc_by(stats.flood_wait_seconds as f64);
                    }
                    Err(err) => {
                        self.metrics.ingest_dialog_failures_total.inc();
                        warn!(%err, "ingest job failed; continuing with subsequent jobs");
                    }
                }
            }
            JobKind::Enrich => {
                let _permit = self.ingest_enrich_gate.lock().await;
                match self.enricher.run_pass().await {
                    Ok(stats) => {
                        self.metrics.enrich_decrypt_failures.inc_by(stats.messages_poisoned as f64);
                        self.metrics.leads_created_total.inc_by(stats.leads_upserted as f64);
                        self.metrics.follow_ups_created_total.inc_by(stats.follow_ups_created as f64);
                    }
                    Err(err) => error!(%err, "enrich job failed; continuing with subsequent jobs"),
                }
            }
            JobKind::Sync => {
                let _permit = self.sync_gate.lock().await;
                match self.projector.sync_incremental().await {
                    Ok(outcome) => {
                        self.metrics.sync_tasks_completed_total.inc_by(outcome.completed as f64);
                        self.metrics.sync_tasks_failed_total.inc_by(outcome.failed as f64);
                        self.metrics.sync_tasks_conflict_total.inc_by(outcome.conflicted as f64);
                    }
                    Err(err) => error!(%err, "sync job failed; continuing with subsequent jobs"),
                }
            }
            JobKind::DailyFullSync => {
                {
                    let _permit = self.ingest_enrich_gate.lock().await;
                    match self.ingestor.fetch_all_full_history().await {
                        Ok(stats) => {
                            self.metrics.ingest_messages_total.inc_by(stats.messages_ingested as f64);
                            self.metrics.ingest_dialog_failures_total.inc_by(stats.dialogs_failed as f64);
                            self.metrics.ingest_flood_wait_seconds_total.inc_by(stats.flood_wait_seconds as f64);
                        }
                        Err(err) => warn!(%err, "daily bulk ingest failed; continuing into full sync anyway"),
                    }
                    if let Err(err) = self.enricher.run_pass().await {
                        error!(%err, "daily enrich pass failed; continuing into full sync anyway");
                    }
                }
                let _permit = self.sync_gate.lock().await;
                match self.projector.sync_full().await {
                    Ok(()) => info!("daily full sync completed"),
                    Err(err) => error!(%err, "daily full sync failed"),
                }
            }
        }
    }
}

async fn daily_ingest_producer(schedule: Schedule, tx: mpsc::Sender<Job>, cancel: Arc<tokio::sync::Notify>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            return;
        };
        let now = Utc::now();
        let sleep_for = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {
                if tx.send(Job { kind: JobKind::DailyFullSync }).await.is_err() {
                    return;
                }
            }
            _ = cancel.notified() => return,
        }
    }
}

async fn periodic_producer(
    kind: JobKind,
    period: Duration,
    initial_offset: Duration,
    tx: mpsc::Sender<Job>,
    cancel: Arc<tokio::sync::Notify>,
) {
    if !initial_offset.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(initial_offset) => {}
            _ = cancel.notified() => return,
        }
    }
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tx.send(Job { kind }).await.is_err() {
                    return;
                }
            }
            _ = cancel.notified() => return,
        }
    }
}

fn tokio_util_cancel() -> Arc<tokio::sync::Notify> {
    Arc::new(tokio::sync::Notify::new())
}

async fn signal_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

/// Removes the lock file on drop, covering both the graceful-shutdown path
/// and early returns (`?`) out of `run`.
struct LockGuard<'a>(&'a InstanceLock);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn scopeguard(lock: &InstanceLock) -> LockGuard<'_> {
    LockGuard(lock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_schedule_fires_once_a_day_at_the_configured_minute() {
        let schedule = daily_schedule_from_hhmm("03:15").expect("valid HH:MM");
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().expect("at least one upcoming fire time");
        let second = upcoming.next().expect("a second upcoming fire time");
        assert_eq!(first.format("%H:%M").to_string(), "03:15");
        assert_eq!((second - first).num_hours(), 24);
    }

    #[test]
    fn daily_schedule_rejects_malformed_input() {
        assert!(daily_schedule_from_hhmm("25:99").is_err());
        assert!(daily_schedule_from_hhmm("not-a-time").is_err());
        assert!(daily_schedule_from_hhmm("3:15").is_ok());
    }
}
