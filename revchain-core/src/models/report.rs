use uuid::Uuid;

use super::{Direction, RevisionId};
use crate::OperationError;

/// Outcome of executing a plan.
///
/// `marker` always equals the persisted marker once the run returns, so
/// re-planning from it reproduces the remaining work.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub direction: Direction,
    pub succeeded: Vec<RevisionId>,
    pub failed: Option<StepFailure>,
    pub not_attempted: Vec<RevisionId>,
    pub cancelled: bool,
    pub marker: Option<RevisionId>,
}

#[derive(Debug)]
pub struct StepFailure {
    pub revision: RevisionId,
    pub error: OperationError,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none() && !self.cancelled
    }

    /// Convert a failed run into its error, keeping successful reports.
    pub fn into_result(self) -> Result<Self, OperationError> {
        match self.failed {
            Some(failure) => Err(failure.error),
            None => Ok(self),
        }
    }
}
