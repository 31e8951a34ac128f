//! Boost operation record, per-recipient outcomes, and summaries.

use serde::{Deserialize, Serialize};

use crate::{
    client::{ChannelMetadata, GroupMetadata},
    types::{OperationId, OperationStatus, StopReason, TargetKind, TimestampMs},
};

/// A recipient the external client rejected, with the reason it gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Recipient identifier as submitted.
    pub recipient: String,
    /// Human-readable reason text.
    pub reason: String,
}

/// Target metadata captured at the start or end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSnapshot {
    /// Channel metadata.
    Channel(ChannelMetadata),
    /// Group metadata.
    Group(GroupMetadata),
}

/// How a driver loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every accepted recipient was attempted.
    Completed,
    /// Halted before the end of the list.
    Stopped(StopReason),
    /// Unrecoverable external failure; carries the cause.
    Failed(String),
}

impl RunOutcome {
    /// Terminal status this outcome maps to.
    pub fn status(&self) -> OperationStatus {
        match self {
            Self::Completed => OperationStatus::Completed,
            Self::Stopped(_) => OperationStatus::Stopped,
            Self::Failed(_) => OperationStatus::Failed,
        }
    }
}

/// Authoritative record of one boost run.
///
/// `completed_count` always equals `success_list.len() + failure_list.len()`
/// and never exceeds `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Stable operation identifier.
    pub id: OperationId,
    /// Channel or group.
    pub kind: TargetKind,
    /// Normalized target identifier.
    pub target: String,
    /// Current lifecycle state.
    pub status: OperationStatus,
    /// Recipients accepted for processing.
    pub total: usize,
    /// Recipients attempted so far.
    pub completed_count: usize,
    /// Recipients that succeeded, in attempt order.
    pub success_list: Vec<String>,
    /// Recipients that failed, in attempt order.
    pub failure_list: Vec<FailureEntry>,
    /// Creation time.
    pub started_at_ms: TimestampMs,
    /// Time the run reached a terminal state.
    pub ended_at_ms: Option<TimestampMs>,
    /// Metadata fetched before the run.
    pub initial_snapshot: TargetSnapshot,
    /// Metadata refreshed after the run, when the refresh succeeded.
    pub final_snapshot: Option<TargetSnapshot>,
    /// Set when a group run halted because the group filled up.
    pub stopped_due_to_full: bool,
    /// Why the run stopped, for [`OperationStatus::Stopped`].
    pub stop_reason: Option<StopReason>,
    /// Cause of an [`OperationStatus::Failed`] run.
    pub error: Option<String>,
}

impl Operation {
    /// Creates a pending operation.
    pub fn new(
        id: OperationId,
        kind: TargetKind,
        target: String,
        total: usize,
        initial_snapshot: TargetSnapshot,
        started_at_ms: TimestampMs,
    ) -> Self {
        Self {
            id,
            kind,
            target,
            status: OperationStatus::Pending,
            total,
            completed_count: 0,
            success_list: Vec::new(),
            failure_list: Vec::new(),
            started_at_ms,
            ended_at_ms: None,
            initial_snapshot,
            final_snapshot: None,
            stopped_due_to_full: false,
            stop_reason: None,
            error: None,
        }
    }

    /// True once the record can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whole-number completion percentage, rounded.
    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.completed_count, self.total)
    }

    /// Latest known metadata: the final snapshot if refreshed, else the initial one.
    pub fn latest_snapshot(&self) -> &TargetSnapshot {
        self.final_snapshot.as_ref().unwrap_or(&self.initial_snapshot)
    }

    /// Dashboard row for this operation.
    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            id: self.id,
            kind: self.kind,
            target: self.target.clone(),
            status: self.status,
            progress_percent: self.progress_percent(),
            completed_count: self.completed_count,
            total: self.total,
            started_at_ms: self.started_at_ms,
            ended_at_ms: self.ended_at_ms,
        }
    }
}

/// Compact listing row for a status dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Operation id.
    pub id: OperationId,
    /// Channel or group.
    pub kind: TargetKind,
    /// Normalized target identifier.
    pub target: String,
    /// Current lifecycle state.
    pub status: OperationStatus,
    /// Whole-number completion percentage.
    pub progress_percent: u8,
    /// Recipients attempted so far.
    pub completed_count: usize,
    /// Recipients accepted for processing.
    pub total: usize,
    /// Creation time.
    pub started_at_ms: TimestampMs,
    /// Terminal time, if reached.
    pub ended_at_ms: Option<TimestampMs>,
}

pub(crate) fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (completed.min(total) * 200 + total) / (total * 2);
    pct as u8
}
