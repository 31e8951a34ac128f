//! Serial driver loops: one external call at a time, fixed delays between.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    client::{ClientError, MessagingClient},
    config::TrackerConfig,
    operation::{RunOutcome, TargetSnapshot},
    types::{OperationId, StopReason, TargetKind},
};

/// Progress reports sent from a driver back to the runtime loop, in order.
#[derive(Debug)]
pub(crate) enum DriverMsg {
    Dispatched {
        id: OperationId,
    },
    Attempted {
        id: OperationId,
        recipient: String,
        outcome: Result<(), String>,
    },
    Finished {
        id: OperationId,
        outcome: RunOutcome,
        final_snapshot: Option<TargetSnapshot>,
    },
}

/// Everything a driver needs to run one operation.
#[derive(Debug)]
pub(crate) struct RunPlan {
    pub id: OperationId,
    pub kind: TargetKind,
    pub target: String,
    pub recipients: Vec<String>,
}

/// Bounds `fut` by `limit`; expiry becomes [`ClientError::Timeout`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(limit)),
    }
}

pub(crate) fn spawn_driver(
    client: Arc<dyn MessagingClient>,
    config: Arc<TrackerConfig>,
    plan: RunPlan,
    tx: mpsc::UnboundedSender<DriverMsg>,
    cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let recipients = plan.recipients;
    let driver = Driver {
        client,
        config,
        id: plan.id,
        kind: plan.kind,
        target: plan.target,
        tx,
        cancel,
    };
    tokio::spawn(async move {
        let (outcome, final_snapshot) = match driver.kind {
            TargetKind::Channel => driver.run_channel(&recipients).await,
            TargetKind::Group => driver.run_group(&recipients).await,
        };
        driver.send(DriverMsg::Finished {
            id: driver.id,
            outcome,
            final_snapshot,
        });
    })
}

struct Driver {
    client: Arc<dyn MessagingClient>,
    config: Arc<TrackerConfig>,
    id: OperationId,
    kind: TargetKind,
    target: String,
    tx: mpsc::UnboundedSender<DriverMsg>,
    cancel: watch::Receiver<bool>,
}

impl Driver {
    async fn run_channel(&self, recipients: &[String]) -> (RunOutcome, Option<TargetSnapshot>) {
        self.send(DriverMsg::Dispatched { id: self.id });

        let batch_size = self.config.channel_batch_size.max(1);
        for (batch_idx, batch) in recipients.chunks(batch_size).enumerate() {
            if batch_idx > 0 && self.pause(self.config.channel_delay).await {
                return self.stopped(StopReason::Cancelled).await;
            }
            for recipient in batch {
                if self.cancelled() {
                    return self.stopped(StopReason::Cancelled).await;
                }
                let result = bounded(
                    self.config.call_timeout,
                    self.client.follow_channel(&self.target, recipient),
                )
                .await;
                match self.record(recipient, result) {
                    Err(err) if err.is_fatal() => {
                        return (RunOutcome::Failed(err.to_string()), None);
                    }
                    _ => {}
                }
            }
            tracing::debug!(
                operation_id = %self.id,
                batch = batch_idx,
                size = batch.len(),
                "channel batch done"
            );
        }

        (RunOutcome::Completed, self.refresh().await)
    }

    async fn run_group(&self, recipients: &[String]) -> (RunOutcome, Option<TargetSnapshot>) {
        self.send(DriverMsg::Dispatched { id: self.id });

        for (idx, recipient) in recipients.iter().enumerate() {
            if idx > 0 && self.pause(self.config.group_delay).await {
                return self.stopped(StopReason::Cancelled).await;
            }
            if self.cancelled() {
                return self.stopped(StopReason::Cancelled).await;
            }

            // Membership can change under us; check before every addition.
            let check = bounded(
                self.config.call_timeout,
                self.client.fetch_group_metadata(&self.target),
            )
            .await;
            match check {
                Ok(meta) if meta.is_full(self.config.group_capacity) => {
                    tracing::info!(
                        operation_id = %self.id,
                        participants = meta.participant_count,
                        remaining = recipients.len() - idx,
                        "group filled up mid-run"
                    );
                    return (
                        RunOutcome::Stopped(StopReason::TargetFull),
                        Some(TargetSnapshot::Group(meta)),
                    );
                }
                Ok(_) => {}
                Err(err) if err.is_fatal() => {
                    return (RunOutcome::Failed(err.to_string()), None);
                }
                Err(err) => {
                    self.send(DriverMsg::Attempted {
                        id: self.id,
                        recipient: recipient.clone(),
                        outcome: Err(format!("capacity check failed: {err}")),
                    });
                    continue;
                }
            }

            let result = bounded(
                self.config.call_timeout,
                self.client.add_group_participant(&self.target, recipient),
            )
            .await;
            match self.record(recipient, result) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    return (RunOutcome::Failed(err.to_string()), None);
                }
                Err(err) if err.indicates_full() => {
                    return self.stopped(StopReason::TargetFull).await;
                }
                Err(_) => {}
            }
        }

        (RunOutcome::Completed, self.refresh().await)
    }

    /// Reports one attempt and hands back its error for the caller to classify.
    fn record(&self, recipient: &str, result: Result<(), ClientError>) -> Result<(), ClientError> {
        self.send(DriverMsg::Attempted {
            id: self.id,
            recipient: recipient.to_string(),
            outcome: result.as_ref().map(|_| ()).map_err(ToString::to_string),
        });
        result
    }

    async fn stopped(&self, reason: StopReason) -> (RunOutcome, Option<TargetSnapshot>) {
        (RunOutcome::Stopped(reason), self.refresh().await)
    }

    /// Best-effort final metadata; failure leaves the start snapshot in place.
    async fn refresh(&self) -> Option<TargetSnapshot> {
        let limit = self.config.call_timeout;
        let result = match self.kind {
            TargetKind::Channel => bounded(limit, self.client.fetch_channel_metadata(&self.target))
                .await
                .map(TargetSnapshot::Channel),
            TargetKind::Group => bounded(limit, self.client.fetch_group_metadata(&self.target))
                .await
                .map(TargetSnapshot::Group),
        };
        match result {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(operation_id = %self.id, error = %err, "final metadata refresh failed");
                None
            }
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    /// Sleeps for `delay` unless cancelled first; returns true when cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.cancelled();
        }
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.changed() => {}
        }
        self.cancelled()
    }

    fn send(&self, msg: DriverMsg) {
        let _ = self.tx.send(msg);
    }
}
