//! Apply/revert engine.
//!
//! Each revision runs inside one store transaction together with its marker
//! update and history row, so the schema and the marker never disagree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{OperationError, StoreError};
use crate::models::{CreateHistoryInput, Direction, Plan, Revision, RunReport, StepFailure};
use crate::store::SchemaStore;

pub struct Executor<'s> {
    store: &'s mut dyn SchemaStore,
    run_id: Uuid,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s mut dyn SchemaStore) -> Self {
        Self {
            store,
            run_id: Uuid::new_v4(),
            cancel: None,
        }
    }

    /// Stop before the next revision once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run `upgrade_ops` and advance the marker to the revision.
    pub fn apply(&mut self, revision: &Revision) -> Result<(), OperationError> {
        self.step(revision, Direction::Upgrade)
    }

    /// Run `downgrade_ops` and move the marker back to the parent.
    pub fn revert(&mut self, revision: &Revision) -> Result<(), OperationError> {
        self.step(revision, Direction::Downgrade)
    }

    fn step(&mut self, revision: &Revision, direction: Direction) -> Result<(), OperationError> {
        let store_err = |source: StoreError| OperationError::Store {
            revision: revision.id.clone(),
            source,
        };

        let mut tx = self.store.begin().map_err(store_err)?;

        let found = tx.marker().map_err(store_err)?;
        let expected = revision.marker_before(direction);
        if found.as_ref() != expected {
            return Err(OperationError::MarkerMismatch {
                revision: revision.id.clone(),
                expected: expected.cloned(),
                found,
            });
        }

        for (i, op) in revision.ops(direction).iter().enumerate() {
            tx.execute(op).map_err(|source| OperationError::Operation {
                revision: revision.id.clone(),
                index: i + 1,
                operation: op.to_string(),
                source,
            })?;
        }

        let after = revision.marker_after(direction);
        tx.set_marker(after).map_err(store_err)?;
        tx.record(CreateHistoryInput {
            run_id: self.run_id,
            revision_id: revision.id.clone(),
            direction,
            marker_before: found,
            marker_after: after.cloned(),
        })
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;

        tracing::info!(
            run_id = %self.run_id,
            revision = %revision.id,
            direction = %direction,
            ops = revision.ops(direction).len(),
            "{} {}",
            if direction == Direction::Upgrade { "applied" } else { "reverted" },
            revision.id
        );
        Ok(())
    }

    /// Execute every step of `plan` in order, stopping at the first failure.
    pub fn run_plan(&mut self, plan: &Plan) -> RunReport {
        let mut report = RunReport {
            run_id: self.run_id,
            direction: plan.direction,
            succeeded: Vec::new(),
            failed: None,
            not_attempted: Vec::new(),
            cancelled: false,
            marker: plan.from.clone(),
        };

        for (i, revision) in plan.steps.iter().enumerate() {
            if self.is_cancelled() {
                tracing::warn!(run_id = %self.run_id, "run cancelled before {}", revision.id);
                report.cancelled = true;
                report.not_attempted = plan.steps[i..].iter().map(|r| r.id.clone()).collect();
                break;
            }

            match self.step(revision, plan.direction) {
                Ok(()) => {
                    report.succeeded.push(revision.id.clone());
                    report.marker = revision.marker_after(plan.direction).cloned();
                }
                Err(error) => {
                    tracing::error!(run_id = %self.run_id, "{}", error);
                    report.failed = Some(StepFailure {
                        revision: revision.id.clone(),
                        error,
                    });
                    report.not_attempted =
                        plan.steps[i + 1..].iter().map(|r| r.id.clone()).collect();
                    break;
                }
            }
        }

        if report.failed.is_some() {
            // The failed step may have been refused because the store moved.
            match self.store.marker() {
                Ok(marker) => report.marker = marker,
                Err(e) => tracing::warn!("could not re-read marker after failure: {}", e),
            }
        }

        report
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
