use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Direction, RevisionId};

/// One committed apply or revert, as recorded by the schema store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub run_id: Uuid,
    pub revision_id: RevisionId,
    pub direction: Direction,
    pub marker_before: Option<RevisionId>,
    pub marker_after: Option<RevisionId>,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHistoryInput {
    pub run_id: Uuid,
    pub revision_id: RevisionId,
    pub direction: Direction,
    pub marker_before: Option<RevisionId>,
    pub marker_after: Option<RevisionId>,
}
