use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::Operation;

/// Opaque, immutable revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RevisionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One atomic schema-change unit.
///
/// `parent_id == None` marks the root of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub parent_id: Option<RevisionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upgrade_ops: Vec<Operation>,
    #[serde(default)]
    pub downgrade_ops: Vec<Operation>,
}

impl Revision {
    pub fn new(id: impl Into<RevisionId>, parent_id: Option<RevisionId>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            message: None,
            created_at: None,
            upgrade_ops: Vec::new(),
            downgrade_ops: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn upgrade(mut self, op: Operation) -> Self {
        self.upgrade_ops.push(op);
        self
    }

    pub fn downgrade(mut self, op: Operation) -> Self {
        self.downgrade_ops.push(op);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Operations for the given direction, in execution order.
    pub fn ops(&self, direction: super::Direction) -> &[Operation] {
        match direction {
            super::Direction::Upgrade => &self.upgrade_ops,
            super::Direction::Downgrade => &self.downgrade_ops,
        }
    }

    /// Marker value after this revision has run in `direction`.
    pub fn marker_after(&self, direction: super::Direction) -> Option<&RevisionId> {
        match direction {
            super::Direction::Upgrade => Some(&self.id),
            super::Direction::Downgrade => self.parent_id.as_ref(),
        }
    }

    /// Marker value required before this revision can run in `direction`.
    pub fn marker_before(&self, direction: super::Direction) -> Option<&RevisionId> {
        self.marker_after(direction.reverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType, Direction};

    #[test]
    fn parses_revision_with_null_parent() {
        let json = r#"{
            "id": "3f1c2a9e0b7d",
            "parent_id": null,
            "message": "add last_seen to users",
            "upgrade_ops": [
                {"op": "add_column", "table": "users", "column": {"name": "last_seen", "type": "date_time"}}
            ],
            "downgrade_ops": [
                {"op": "drop_column", "table": "users", "column": "last_seen"}
            ]
        }"#;

        let revision: Revision = serde_json::from_str(json).unwrap();
        assert_eq!(revision.id.as_str(), "3f1c2a9e0b7d");
        assert!(revision.is_root());
        assert_eq!(revision.upgrade_ops.len(), 1);
        assert_eq!(revision.downgrade_ops.len(), 1);
    }

    #[test]
    fn missing_op_lists_default_to_empty() {
        let revision: Revision =
            serde_json::from_str(r#"{"id": "a", "parent_id": "b"}"#).unwrap();
        assert!(revision.upgrade_ops.is_empty());
        assert!(revision.downgrade_ops.is_empty());
        assert_eq!(revision.parent_id, Some(RevisionId::from("b")));
    }

    #[test]
    fn markers_follow_direction() {
        let revision = Revision::new("r2", Some("r1".into())).upgrade(Operation::AddColumn {
            table: "meetings".into(),
            column: ColumnSpec::new("pautas", ColumnType::Text),
        });

        assert_eq!(revision.marker_before(Direction::Upgrade), Some(&"r1".into()));
        assert_eq!(revision.marker_after(Direction::Upgrade), Some(&"r2".into()));
        assert_eq!(revision.marker_before(Direction::Downgrade), Some(&"r2".into()));
        assert_eq!(revision.marker_after(Direction::Downgrade), Some(&"r1".into()));
        assert_eq!(revision.ops(Direction::Upgrade).len(), 1);
        assert!(revision.ops(Direction::Downgrade).is_empty());
    }
}
