use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    client::{ClientError, MessagingClient, TracedClient},
    config::{ConfigError, TrackerConfig},
    core::store::{OperationStore, StoreError},
    operation::{Operation, OperationSummary, TargetSnapshot},
    persist::{OperationArchive, PersistError},
    request::{BoostRequest, ValidationError},
    types::{OperationId, TargetKind, TimestampMs},
};

use super::{
    driver::{DriverMsg, RunPlan, bounded, spawn_driver},
    events::{BoostEvent, ProgressEvent},
};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("messaging client is not connected")]
    NotConnected,
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),
    #[error("group is full ({participants}/{capacity})")]
    TargetFull { participants: u32, capacity: u32 },
    #[error("operation {0} is already processing")]
    AlreadyProcessing(OperationId),
    #[error("operation {0} not found")]
    NotFound(OperationId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tracker runtime is not running")]
    ChannelClosed,
}

impl TrackerError {
    fn from_precondition(err: ClientError) -> Self {
        if err.is_fatal() {
            Self::NotConnected
        } else {
            Self::TargetUnreachable(err.to_string())
        }
    }
}

pub struct TrackerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<BoostEvent>,
    client: Arc<dyn MessagingClient>,
    config: Arc<TrackerConfig>,
}

impl Clone for TrackerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            client: Arc::clone(&self.client),
            config: Arc::clone(&self.config),
        }
    }
}

/// A boost whose preconditions already passed.
struct PreparedRun {
    kind: TargetKind,
    target: String,
    recipients: Vec<String>,
    snapshot: TargetSnapshot,
}

/// Claim on the client held while a start checks its preconditions.
///
/// Dropped without being consumed, it hands the claim back to the loop.
struct Reservation {
    id: OperationId,
    cmd_tx: mpsc::Sender<Command>,
    armed: bool,
}

impl Reservation {
    fn consume(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let release = Command::Release { id: self.id };
        if let Err(mpsc::error::TrySendError::Full(release)) = self.cmd_tx.try_send(release) {
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                let cmd_tx = self.cmd_tx.clone();
                rt.spawn(async move {
                    let _ = cmd_tx.send(release).await;
                });
            }
        }
    }
}

enum Command {
    Reserve {
        resp: oneshot::Sender<Result<OperationId, TrackerError>>,
    },
    Release {
        id: OperationId,
    },
    Begin {
        id: OperationId,
        run: PreparedRun,
        resp: oneshot::Sender<Result<OperationId, TrackerError>>,
    },
    Get {
        id: OperationId,
        resp: oneshot::Sender<Option<Operation>>,
    },
    List {
        resp: oneshot::Sender<Vec<OperationSummary>>,
    },
    Active {
        resp: oneshot::Sender<Option<OperationId>>,
    },
    Cancel {
        id: OperationId,
        resp: oneshot::Sender<Result<bool, TrackerError>>,
    },
    Evict {
        max_age: Duration,
        resp: oneshot::Sender<usize>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct ActiveRun {
    id: OperationId,
    cancel: watch::Sender<bool>,
    driver: JoinHandle<()>,
}

struct LoopState {
    store: OperationStore,
    active: Option<ActiveRun>,
    reserved: Option<OperationId>,
    archive: Option<Arc<Mutex<Box<dyn OperationArchive>>>>,
    client: Arc<dyn MessagingClient>,
    config: Arc<TrackerConfig>,
    events_tx: broadcast::Sender<BoostEvent>,
    driver_tx: mpsc::UnboundedSender<DriverMsg>,
}

/// Starts the tracker loop on the current tokio runtime.
///
/// `client` is wrapped in a [`TracedClient`]; at most one operation drives it
/// at a time. Fails when `config` does not pass [`TrackerConfig::validate`].
pub fn spawn_tracker(
    client: Arc<dyn MessagingClient>,
    archive: Option<Box<dyn OperationArchive>>,
    config: TrackerConfig,
) -> Result<TrackerHandle, ConfigError> {
    config.validate()?;
    let config = Arc::new(config);
    let client: Arc<dyn MessagingClient> = Arc::new(TracedClient::new(client));
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<BoostEvent>(config.event_capacity);
    let (driver_tx, mut driver_rx) = mpsc::unbounded_channel::<DriverMsg>();

    let mut state = LoopState {
        store: OperationStore::new(),
        active: None,
        reserved: None,
        archive: archive.map(|a| Arc::new(Mutex::new(a))),
        client: Arc::clone(&client),
        config: Arc::clone(&config),
        events_tx: events_tx.clone(),
        driver_tx,
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if handle_command(cmd, &mut state, &mut driver_rx).await {
                        break;
                    }
                }
                msg = driver_rx.recv() => {
                    if let Some(msg) = msg {
                        apply_driver_msg(msg, &mut state).await;
                    }
                }
            }
        }
        tracing::debug!("tracker loop exited");
    });

    Ok(TrackerHandle {
        cmd_tx,
        events_tx,
        client,
        config,
    })
}

impl TrackerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<BoostEvent> {
        self.events_tx.subscribe()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Starts following `target` with every recipient, in order.
    pub async fn start_channel_boost(
        &self,
        target: &str,
        recipients: Vec<String>,
    ) -> Result<OperationId, TrackerError> {
        let request = BoostRequest::new(
            TargetKind::Channel,
            target,
            recipients,
            self.config.max_recipients,
        )?;
        let reservation = self.reserve().await?;
        self.ensure_ready().await?;

        let meta = bounded(
            self.config.call_timeout,
            self.client.fetch_channel_metadata(&request.target),
        )
        .await
        .map_err(TrackerError::from_precondition)?;

        self.begin(
            reservation,
            PreparedRun {
                kind: TargetKind::Channel,
                target: request.target,
                recipients: request.recipients,
                snapshot: TargetSnapshot::Channel(meta),
            },
        )
        .await
    }

    /// Starts adding recipients to `target`, truncated to the free slots.
    pub async fn start_group_boost(
        &self,
        target: &str,
        recipients: Vec<String>,
    ) -> Result<OperationId, TrackerError> {
        let request = BoostRequest::new(
            TargetKind::Group,
            target,
            recipients,
            self.config.max_recipients,
        )?;
        let reservation = self.reserve().await?;
        self.ensure_ready().await?;

        let meta = bounded(
            self.config.call_timeout,
            self.client.fetch_group_metadata(&request.target),
        )
        .await
        .map_err(TrackerError::from_precondition)?;

        let capacity = self.config.group_capacity;
        if meta.is_full(capacity) {
            return Err(TrackerError::TargetFull {
                participants: meta.participant_count,
                capacity: meta.ceiling(capacity),
            });
        }

        let mut recipients = request.recipients;
        let open = meta.open_slots(capacity) as usize;
        if recipients.len() > open {
            tracing::info!(
                target_id = %request.target,
                submitted = recipients.len(),
                open,
                "truncating recipients to open group slots"
            );
            recipients.truncate(open);
        }

        self.begin(
            reservation,
            PreparedRun {
                kind: TargetKind::Group,
                target: request.target,
                recipients,
                snapshot: TargetSnapshot::Group(meta),
            },
        )
        .await
    }

    /// Dispatches to the channel or group start by `kind`.
    pub async fn start_boost(
        &self,
        kind: TargetKind,
        target: &str,
        recipients: Vec<String>,
    ) -> Result<OperationId, TrackerError> {
        match kind {
            TargetKind::Channel => self.start_channel_boost(target, recipients).await,
            TargetKind::Group => self.start_group_boost(target, recipients).await,
        }
    }

    pub async fn get_operation(&self, id: OperationId) -> Result<Option<Operation>, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    pub async fn list_operations(&self) -> Result<Vec<OperationSummary>, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::List { resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Id of the operation currently driving the client.
    pub async fn active(&self) -> Result<Option<OperationId>, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Active { resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Asks a running operation to stop at its next recipient or delay.
    ///
    /// Returns false when the operation already finished.
    pub async fn cancel(&self, id: OperationId) -> Result<bool, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Cancel { id, resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)?
    }

    /// Drops terminal operations that ended more than `max_age` ago.
    pub async fn evict_older_than(&self, max_age: Duration) -> Result<usize, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Evict { max_age, resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Cancels the active run, waits for it to settle, and flushes the archive.
    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Claims the client for one start, or names the operation holding it.
    async fn reserve(&self) -> Result<Reservation, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reserve { resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        let id = rx.await.map_err(|_| TrackerError::ChannelClosed)??;
        Ok(Reservation {
            id,
            cmd_tx: self.cmd_tx.clone(),
            armed: true,
        })
    }

    async fn ensure_ready(&self) -> Result<(), TrackerError> {
        match tokio::time::timeout(self.config.call_timeout, self.client.is_ready()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TrackerError::NotConnected),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "readiness check timed out"
                );
                Err(TrackerError::NotConnected)
            }
        }
    }

    async fn begin(
        &self,
        reservation: Reservation,
        run: PreparedRun,
    ) -> Result<OperationId, TrackerError> {
        let (tx, rx) = oneshot::channel();
        let id = reservation.id;
        self.cmd_tx
            .send(Command::Begin { id, run, resp: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        reservation.consume();
        rx.await.map_err(|_| TrackerError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    state: &mut LoopState,
    driver_rx: &mut mpsc::UnboundedReceiver<DriverMsg>,
) -> bool {
    match cmd {
        Command::Reserve { resp } => {
            let out = match (state.active.as_ref(), state.reserved) {
                (Some(active), _) => Err(TrackerError::AlreadyProcessing(active.id)),
                (None, Some(held)) => Err(TrackerError::AlreadyProcessing(held)),
                (None, None) => {
                    let id = OperationId::new();
                    state.reserved = Some(id);
                    Ok(id)
                }
            };
            let _ = resp.send(out);
        }
        Command::Release { id } => {
            if state.reserved == Some(id) {
                state.reserved = None;
            }
        }
        Command::Begin { id, run, resp } => {
            let _ = resp.send(begin_run(id, run, state));
        }
        Command::Get { id, resp } => {
            let _ = resp.send(state.store.get_cloned(id));
        }
        Command::List { resp } => {
            let _ = resp.send(state.store.summaries());
        }
        Command::Active { resp } => {
            let _ = resp.send(state.active.as_ref().map(|a| a.id));
        }
        Command::Cancel { id, resp } => {
            let out = match state.store.get(id) {
                None => Err(TrackerError::NotFound(id)),
                Some(op) if op.is_terminal() => Ok(false),
                Some(_) => {
                    if let Some(active) = state.active.as_ref().filter(|a| a.id == id) {
                        tracing::info!(operation_id = %id, "cancellation requested");
                        let _ = active.cancel.send(true);
                    }
                    Ok(true)
                }
            };
            let _ = resp.send(out);
        }
        Command::Evict { max_age, resp } => {
            let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
            let evicted = state.store.evict_older_than(max_age_ms, now_ms());
            if !evicted.is_empty() {
                tracing::debug!(count = evicted.len(), "evicted finished operations");
            }
            let _ = resp.send(evicted.len());
        }
        Command::Shutdown { resp } => {
            state.reserved = None;
            if let Some(active) = state.active.take() {
                let _ = active.cancel.send(true);
                if let Err(err) = active.driver.await {
                    tracing::error!(operation_id = %active.id, error = %err, "driver task panicked");
                }
                while let Ok(msg) = driver_rx.try_recv() {
                    apply_driver_msg(msg, state).await;
                }
            }
            if let Some(archive) = state.archive.as_ref() {
                if let Err(err) = flush_archive(archive).await {
                    tracing::warn!(error = %err, "archive flush failed");
                }
            }
            let _ = resp.send(());
            return true;
        }
    }

    false
}

fn begin_run(
    id: OperationId,
    run: PreparedRun,
    state: &mut LoopState,
) -> Result<OperationId, TrackerError> {
    if let Some(active) = state.active.as_ref() {
        return Err(TrackerError::AlreadyProcessing(active.id));
    }
    match state.reserved {
        Some(held) if held == id => state.reserved = None,
        Some(held) => return Err(TrackerError::AlreadyProcessing(held)),
        None => {}
    }

    let total = run.recipients.len();
    state
        .store
        .create(id, run.kind, run.target.clone(), total, run.snapshot, now_ms())?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let driver = spawn_driver(
        Arc::clone(&state.client),
        Arc::clone(&state.config),
        RunPlan {
            id,
            kind: run.kind,
            target: run.target.clone(),
            recipients: run.recipients,
        },
        state.driver_tx.clone(),
        cancel_rx,
    );
    state.active = Some(ActiveRun {
        id,
        cancel: cancel_tx,
        driver,
    });

    tracing::info!(
        operation_id = %id,
        kind = run.kind.as_str(),
        target_id = %run.target,
        total,
        "boost started"
    );
    let _ = state.events_tx.send(BoostEvent::Started {
        id,
        kind: run.kind,
        total,
    });
    Ok(id)
}

async fn apply_driver_msg(msg: DriverMsg, state: &mut LoopState) {
    match msg {
        DriverMsg::Dispatched { id } => {
            if let Err(err) = state.store.mark_processing(id) {
                tracing::error!(operation_id = %id, error = %err, "dispatch rejected");
            }
        }
        DriverMsg::Attempted {
            id,
            recipient,
            outcome,
        } => {
            let res = match outcome {
                Ok(()) => state.store.record_success(id, recipient),
                Err(reason) => state.store.record_failure(id, recipient, reason),
            };
            match res {
                Ok(op) => {
                    let _ = state.events_tx.send(BoostEvent::Progress(ProgressEvent {
                        operation_id: id,
                        progress_percent: op.progress_percent(),
                        completed: op.completed_count,
                        total: op.total,
                    }));
                }
                Err(err) => tracing::error!(operation_id = %id, error = %err, "attempt rejected"),
            }
        }
        DriverMsg::Finished {
            id,
            outcome,
            final_snapshot,
        } => {
            if state.active.as_ref().is_some_and(|a| a.id == id) {
                state.active = None;
            }
            let finished = match state.store.finish(id, outcome, final_snapshot, now_ms()) {
                Ok(op) => op.clone(),
                Err(err) => {
                    tracing::error!(operation_id = %id, error = %err, "finish rejected");
                    return;
                }
            };

            match finished.error.as_deref() {
                Some(cause) => tracing::error!(
                    operation_id = %id,
                    completed = finished.completed_count,
                    total = finished.total,
                    cause,
                    "boost failed"
                ),
                None => tracing::info!(
                    operation_id = %id,
                    status = finished.status.as_str(),
                    succeeded = finished.success_list.len(),
                    failed = finished.failure_list.len(),
                    total = finished.total,
                    "boost finished"
                ),
            }

            if let Some(archive) = state.archive.as_ref() {
                if let Err(err) = archive_operation(archive, finished.clone()).await {
                    tracing::warn!(operation_id = %id, error = %err, "archiving operation failed");
                }
            }
            let _ = state.events_tx.send(BoostEvent::Finished {
                id,
                status: finished.status,
            });
        }
    }
}

async fn archive_operation(
    archive: &Arc<Mutex<Box<dyn OperationArchive>>>,
    operation: Operation,
) -> Result<(), PersistError> {
    let archive_ref = Arc::clone(archive);
    tokio::task::spawn_blocking(move || {
        let mut archive = archive_ref.blocking_lock();
        archive.archive(&operation)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}

async fn flush_archive(archive: &Arc<Mutex<Box<dyn OperationArchive>>>) -> Result<(), PersistError> {
    let archive_ref = Arc::clone(archive);
    tokio::task::spawn_blocking(move || {
        let mut archive = archive_ref.blocking_lock();
        archive.flush()
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}

pub(crate) fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
