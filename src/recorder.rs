//! # Event Recorder
//!
//! Records "launchable used" events into the [`UsageStore`].
//!
//! ## Two Ways In
//!
//! - [`EventRecorder::record_launch`] - synchronous; returns once the
//!   updated record is on disk.
//! - [`spawn_writer`] - a bounded queue drained by a single writer task, so
//!   the UI thread never waits on storage:
//!
//! ```text
//! UI ──try_submit──► [ mpsc, capacity N ] ──► writer task ──spawn_blocking──► UsageStore
//!  ▲                                              │
//!  └──────────── oneshot ack (after fsync) ◄──────┘
//! ```
//!
//! An event counts as acknowledged only when its ack arrives, which happens
//! after the store has made it durable. The writer retries a failed write
//! once, after the store's retry backoff, before handing the error back.
//!
//! Recording an identity that is not currently installed is allowed; the
//! recorder has no notion of installation state.

use crate::error::{Error, RecorderError, Result, StoreError};
use crate::usage::{
    now_millis, validate_timestamp, EpochMillis, LaunchableId, UsageRecord, UsageStore,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A validated launch of one launchable at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEvent {
    pub identity: LaunchableId,
    pub at: EpochMillis,
}

impl LaunchEvent {
    /// Validate an event; a missing timestamp means "now".
    pub fn new(identity: &str, at: Option<EpochMillis>) -> Result<Self> {
        let identity = LaunchableId::new(identity)?;
        let at = validate_timestamp(at.unwrap_or_else(now_millis))?;
        Ok(Self { identity, at })
    }
}

/// Synchronous recorder over a shared store.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    store: Arc<UsageStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<UsageStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<UsageStore> {
        &self.store
    }

    /// Validate and record one launch. Invalid input is rejected before the
    /// store is touched.
    pub fn record_launch(&self, identity: &str, at: Option<EpochMillis>) -> Result<UsageRecord> {
        let event = LaunchEvent::new(identity, at)?;
        self.record(&event)
    }

    /// Record an already validated launch.
    pub fn record(&self, event: &LaunchEvent) -> Result<UsageRecord> {
        let updated = self.store.upsert(&event.identity, |current| {
            Some(match current {
                Some(record) => record.with_launch(event.at),
                None => UsageRecord::first_launch(event.identity.clone(), event.at),
            })
        })?;

        debug!(
            identity = %event.identity,
            at = event.at,
            count = updated.as_ref().map_or(0, |r| r.launch_count),
            "recorded launch"
        );

        // upsert only drops records whose count is zero
        Ok(updated.unwrap_or_else(|| UsageRecord::first_launch(event.identity.clone(), event.at)))
    }
}

enum Command {
    Launch {
        event: LaunchEvent,
        ack: oneshot::Sender<Result<UsageRecord>>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle feeding the writer task.
#[derive(Debug, Clone)]
pub struct LaunchSender {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Launch { event, .. } => f.debug_struct("Launch").field("event", event).finish(),
            Command::Flush { .. } => f.write_str("Flush"),
        }
    }
}

/// Acknowledgement for a queued launch.
#[derive(Debug)]
pub struct PendingLaunch {
    rx: oneshot::Receiver<Result<UsageRecord>>,
}

impl PendingLaunch {
    /// Wait until the launch is durable (or failed for good).
    pub async fn durable(self) -> Result<UsageRecord> {
        self.rx
            .await
            .map_err(|_| Error::from(RecorderError::WriterGone))?
    }
}

impl LaunchSender {
    /// Queue a launch, waiting for room if the queue is full.
    pub async fn submit(&self, identity: &str, at: Option<EpochMillis>) -> Result<PendingLaunch> {
        self.submit_event(LaunchEvent::new(identity, at)?).await
    }

    /// Queue an already validated launch, waiting for room if needed.
    pub async fn submit_event(&self, event: LaunchEvent) -> Result<PendingLaunch> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Launch { event, ack })
            .await
            .map_err(|_| RecorderError::QueueClosed)?;
        Ok(PendingLaunch { rx })
    }

    /// Queue a launch without waiting; fails with
    /// [`RecorderError::QueueFull`] when the writer is behind.
    pub fn try_submit(&self, identity: &str, at: Option<EpochMillis>) -> Result<PendingLaunch> {
        let event = LaunchEvent::new(identity, at)?;
        let (ack, rx) = oneshot::channel();
        self.tx
            .try_send(Command::Launch { event, ack })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RecorderError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => RecorderError::QueueClosed,
            })?;
        Ok(PendingLaunch { rx })
    }

    /// Queue a launch and wait until it is durable.
    pub async fn record_launch(&self, identity: &str, at: Option<EpochMillis>) -> Result<UsageRecord> {
        self.submit(identity, at).await?.durable().await
    }

    /// Wait until every launch queued before this call has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush { ack })
            .await
            .map_err(|_| RecorderError::QueueClosed)?;
        rx.await.map_err(|_| RecorderError::WriterGone)?;
        Ok(())
    }
}

/// Counters reported when the writer task stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub recorded: u64,
    pub failed: u64,
    pub retried: u64,
}

/// The running writer task.
#[derive(Debug)]
pub struct LaunchWriter {
    handle: JoinHandle<WriterStats>,
}

impl LaunchWriter {
    /// Wait for the writer to drain and stop. It stops once every
    /// [`LaunchSender`] has been dropped.
    pub async fn join(self) -> Result<WriterStats> {
        self.handle
            .await
            .map_err(|_| Error::from(RecorderError::WriterGone))
    }
}

/// Start the single writer task on the current Tokio runtime.
pub fn spawn_writer(recorder: EventRecorder, capacity: usize) -> (LaunchSender, LaunchWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_writer(recorder, rx));
    (LaunchSender { tx }, LaunchWriter { handle })
}

async fn run_writer(recorder: EventRecorder, mut rx: mpsc::Receiver<Command>) -> WriterStats {
    let mut stats = WriterStats::default();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Launch { event, ack } => {
                let result = write_event(&recorder, event, &mut stats).await;
                match &result {
                    Ok(_) => stats.recorded += 1,
                    Err(_) => stats.failed += 1,
                }
                // The submitter may have stopped waiting; the write still stands.
                let _ = ack.send(result);
            }
            Command::Flush { ack } => {
                let _ = ack.send(());
            }
        }
    }

    debug!(?stats, "launch writer stopped");
    stats
}

async fn write_event(
    recorder: &EventRecorder,
    event: LaunchEvent,
    stats: &mut WriterStats,
) -> Result<UsageRecord> {
    match write_blocking(recorder, event.clone()).await {
        Err(Error::Storage(e)) if !matches!(e, StoreError::Closed) => {
            warn!(identity = %event.identity, error = %e, "recording launch failed, retrying once");
            stats.retried += 1;
            tokio::time::sleep(recorder.store().options().retry_backoff).await;
            write_blocking(recorder, event).await
        }
        other => other,
    }
}

async fn write_blocking(recorder: &EventRecorder, event: LaunchEvent) -> Result<UsageRecord> {
    let recorder = recorder.clone();
    tokio::task::spawn_blocking(move || recorder.record(&event))
        .await
        .map_err(|_| Error::from(RecorderError::WriterGone))?
}
