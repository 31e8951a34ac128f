use hashbrown::HashMap;
use thiserror::Error;

use crate::{
    operation::{FailureEntry, Operation, OperationSummary, RunOutcome, TargetSnapshot},
    types::{OperationId, OperationStatus, StopReason, TargetKind, TimestampMs},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("operation {0} not found")]
    MissingOperation(OperationId),
    #[error("operation {0} already exists")]
    AlreadyExists(OperationId),
    #[error("operation {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },
    #[error("operation {0} has already attempted every accepted recipient")]
    TotalReached(OperationId),
}

/// Operations keyed by id, listed in creation order.
#[derive(Debug, Default)]
pub struct OperationStore {
    records: HashMap<OperationId, Operation>,
    order: Vec<OperationId>,
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn create(
        &mut self,
        id: OperationId,
        kind: TargetKind,
        target: String,
        total: usize,
        snapshot: TargetSnapshot,
        now_ms: TimestampMs,
    ) -> Result<&Operation, StoreError> {
        if self.records.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        self.order.push(id);
        let op = self
            .records
            .entry(id)
            .or_insert_with(|| Operation::new(id, kind, target, total, snapshot, now_ms));
        Ok(&*op)
    }

    pub fn get(&self, id: OperationId) -> Option<&Operation> {
        self.records.get(&id)
    }

    pub fn get_cloned(&self, id: OperationId) -> Option<Operation> {
        self.records.get(&id).cloned()
    }

    pub fn summaries(&self) -> Vec<OperationSummary> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(Operation::summary)
            .collect()
    }

    /// Pending -> Processing, on first dispatch.
    pub fn mark_processing(&mut self, id: OperationId) -> Result<(), StoreError> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id,
                from: op.status,
                to: OperationStatus::Processing,
            });
        }
        op.status = OperationStatus::Processing;
        Ok(())
    }

    pub fn record_success(&mut self, id: OperationId, recipient: String) -> Result<&Operation, StoreError> {
        let op = self.attemptable(id)?;
        op.success_list.push(recipient);
        op.completed_count += 1;
        Ok(&*op)
    }

    pub fn record_failure(
        &mut self,
        id: OperationId,
        recipient: String,
        reason: String,
    ) -> Result<&Operation, StoreError> {
        let op = self.attemptable(id)?;
        op.failure_list.push(FailureEntry { recipient, reason });
        op.completed_count += 1;
        Ok(&*op)
    }

    /// Moves a processing operation to its terminal state.
    ///
    /// A `None` snapshot leaves the previous one in place.
    pub fn finish(
        &mut self,
        id: OperationId,
        outcome: RunOutcome,
        final_snapshot: Option<TargetSnapshot>,
        now_ms: TimestampMs,
    ) -> Result<&Operation, StoreError> {
        let op = self.get_mut(id)?;
        let to = outcome.status();
        if op.status != OperationStatus::Processing {
            return Err(StoreError::InvalidTransition {
                id,
                from: op.status,
                to,
            });
        }
        op.status = to;
        op.ended_at_ms = Some(now_ms);
        if final_snapshot.is_some() {
            op.final_snapshot = final_snapshot;
        }
        match outcome {
            RunOutcome::Completed => {}
            RunOutcome::Stopped(reason) => {
                op.stop_reason = Some(reason);
                op.stopped_due_to_full = reason == StopReason::TargetFull;
            }
            RunOutcome::Failed(cause) => op.error = Some(cause),
        }
        Ok(&*op)
    }

    /// Drops terminal operations that ended more than `max_age_ms` before `now_ms`.
    ///
    /// Non-terminal operations are kept regardless of age.
    pub fn evict_older_than(&mut self, max_age_ms: u64, now_ms: TimestampMs) -> Vec<OperationId> {
        let expired: Vec<OperationId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.records.get(id).is_some_and(|op| {
                    op.is_terminal()
                        && op
                            .ended_at_ms
                            .is_some_and(|ended| now_ms.saturating_sub(ended) > max_age_ms)
                })
            })
            .collect();

        if expired.is_empty() {
            return expired;
        }
        for id in &expired {
            self.records.remove(id);
        }
        self.order.retain(|id| self.records.contains_key(id));
        expired
    }

    fn get_mut(&mut self, id: OperationId) -> Result<&mut Operation, StoreError> {
        self.records
            .get_mut(&id)
            .ok_or(StoreError::MissingOperation(id))
    }

    fn attemptable(&mut self, id: OperationId) -> Result<&mut Operation, StoreError> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::Processing {
            return Err(StoreError::InvalidTransition {
                id,
                from: op.status,
                to: OperationStatus::Processing,
            });
        }
        if op.completed_count >= op.total {
            return Err(StoreError::TotalReached(id));
        }
        Ok(op)
    }
}
