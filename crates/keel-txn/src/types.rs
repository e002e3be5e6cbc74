use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an operation changed, with everything needed to undo it.
///
/// Each variant captures the prior state at record time, so rollback never
/// has to guess what was there before.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackData {
    /// A file was written. `prior` is the previous content, or `None` if
    /// the file did not exist (rollback deletes it).
    FileWrite {
        path: String,
        prior: Option<Vec<u8>>,
    },
    /// A file was deleted; rollback restores its content.
    FileDelete { path: String, prior: Vec<u8> },
    /// A directory was created; rollback removes it.
    DirectoryCreate { path: String },
    /// A directory was removed; rollback recreates it (empty).
    DirectoryDelete { path: String },
    /// A ref file was updated. `prior` is the previous target hash, or
    /// `None` if the ref did not exist.
    RefUpdate {
        path: String,
        prior: Option<String>,
    },
    /// An object was added to the content-addressable store. Objects are
    /// immutable and deduplicated, so rollback leaves them in place for
    /// the garbage collector.
    ObjectStore { id: String },
    /// An operation the journal cannot undo on its own.
    Custom { detail: String },
}

impl RollbackData {
    /// Whether the journal knows how to undo this operation.
    pub fn reversible(&self) -> bool {
        !matches!(self, Self::Custom { .. })
    }
}

/// One journaled step inside a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOperation {
    /// Position within the transaction, starting at 0.
    pub sequence: u32,
    /// Human-readable description for logs and recovery reports.
    pub description: String,
    pub rollback_data: RollbackData,
    pub timestamp: DateTime<Utc>,
}

impl TransactionOperation {
    pub fn new(sequence: u32, description: impl Into<String>, rollback_data: RollbackData) -> Self {
        Self {
            sequence,
            description: description.into(),
            rollback_data,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Completed successfully; operations will not be undone.
    Committed,
    /// Undone (possibly partially, see journal failures).
    RolledBack,
    /// An operation failed mid-flight; awaiting rollback or recovery.
    Failed,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The full journal record for one transaction.
///
/// Serialized as a single JSON file under the journal directory, rewritten
/// whole on every state change. UUIDv7 ids sort chronologically, which keeps
/// journal listings in creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub id: Uuid,
    /// Short description of the high-level operation, e.g. "create-checkpoint".
    pub context: String,
    pub state: TransactionState,
    pub started_at: DateTime<Utc>,
    pub operations: Vec<TransactionOperation>,
}

impl TransactionSnapshot {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            context: context.into(),
            state: TransactionState::Active,
            started_at: Utc::now(),
            operations: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snapshot = TransactionSnapshot::new("create-checkpoint");
        snapshot.operations.push(TransactionOperation::new(
            0,
            "write ref",
            RollbackData::RefUpdate {
                path: "/p/.keel/HEAD".into(),
                prior: Some("a".repeat(64)),
            },
        ));
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: TransactionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn custom_operations_are_not_reversible() {
        assert!(!RollbackData::Custom { detail: "external call".into() }.reversible());
        assert!(RollbackData::DirectoryCreate { path: "/tmp/x".into() }.reversible());
    }

    #[test]
    fn v7_ids_sort_by_creation_order() {
        let a = TransactionSnapshot::new("first");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TransactionSnapshot::new("second");
        assert!(a.id < b.id);
    }

    #[test]
    fn state_display_matches_serde_form() {
        assert_eq!(TransactionState::RolledBack.to_string(), "rolled-back");
        let json = serde_json::to_string(&TransactionState::RolledBack).unwrap();
        assert_eq!(json, "\"rolled-back\"");
    }
}
