//! Runtime event stream payloads.

use serde::{Deserialize, Serialize};

use crate::types::{OperationId, OperationStatus, TargetKind};

/// Progress after one recipient was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Operation the progress belongs to.
    pub operation_id: OperationId,
    /// Whole-number completion percentage.
    pub progress_percent: u8,
    /// Recipients attempted so far.
    pub completed: usize,
    /// Recipients accepted for processing.
    pub total: usize,
}

/// Events emitted from the runtime loop.
///
/// Delivery is best effort; late subscribers should poll
/// [`crate::runtime::handle::TrackerHandle::get_operation`] for current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BoostEvent {
    /// An operation was accepted and its driver started.
    Started {
        /// New operation id.
        id: OperationId,
        /// Channel or group.
        kind: TargetKind,
        /// Recipients accepted for processing.
        total: usize,
    },
    /// One more recipient was attempted.
    Progress(ProgressEvent),
    /// An operation reached a terminal state.
    Finished {
        /// Finished operation id.
        id: OperationId,
        /// Terminal status.
        status: OperationStatus,
    },
}
