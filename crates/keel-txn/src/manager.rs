use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TxnError, TxnResult};
use crate::types::{RollbackData, TransactionOperation, TransactionSnapshot, TransactionState};

/// Tuning for the transaction journal.
#[derive(Clone, Debug)]
pub struct TxnConfig {
    /// How long terminal-state journal entries are kept (default: 24 hours).
    pub retention: Duration,
    /// How often the background sweep runs (default: 1 hour).
    pub cleanup_interval: Duration,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// What `recover` found and did with interrupted transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Transactions rolled back cleanly.
    pub rolled_back: Vec<Uuid>,
    /// Transactions whose rollback left operations unreverted.
    pub incomplete: Vec<Uuid>,
    /// Journal files that could not be parsed.
    pub corrupt: Vec<PathBuf>,
}

/// Journaled multi-step transactions over filesystem state.
///
/// Each transaction is one JSON file under the journal directory, rewritten
/// on every state change so a crash at any point leaves a parseable record.
/// Rollback replays the journal in reverse, restoring the prior state each
/// operation captured when it was recorded. Rollback is best-effort: a
/// failing step is reported, not fatal, and the remaining steps still run.
pub struct TransactionManager {
    journal_dir: PathBuf,
    config: TxnConfig,
    active: Mutex<HashMap<Uuid, TransactionSnapshot>>,
}

impl TransactionManager {
    /// Open a manager over the given journal directory, creating it if
    /// needed.
    pub fn open(journal_dir: impl Into<PathBuf>, config: TxnConfig) -> TxnResult<Self> {
        let journal_dir = journal_dir.into();
        fs::create_dir_all(&journal_dir)?;
        Ok(Self {
            journal_dir,
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn journal_dir(&self) -> &Path {
        &self.journal_dir
    }

    // ---- lifecycle ----

    /// Start a transaction. The journal entry is on disk before this
    /// returns, so even a zero-operation transaction is recoverable.
    pub fn begin(&self, context: &str) -> TxnResult<Uuid> {
        let snapshot = TransactionSnapshot::new(context);
        let id = snapshot.id;
        self.persist(&snapshot)?;
        self.active
            .lock()
            .expect("transaction map poisoned")
            .insert(id, snapshot);
        debug!(%id, context, "transaction started");
        Ok(id)
    }

    /// Record one operation and flush the journal.
    pub fn record(
        &self,
        id: Uuid,
        description: impl Into<String>,
        rollback_data: RollbackData,
    ) -> TxnResult<()> {
        let mut active = self.active.lock().expect("transaction map poisoned");
        let snapshot = active
            .get_mut(&id)
            .ok_or_else(|| self.missing_transaction_error(id))?;
        if !snapshot.is_active() {
            return Err(TxnError::InvalidState {
                id: id.to_string(),
                state: snapshot.state.to_string(),
                expected: TransactionState::Active.to_string(),
            });
        }
        let sequence = snapshot.operations.len() as u32;
        snapshot
            .operations
            .push(TransactionOperation::new(sequence, description, rollback_data));
        self.persist(snapshot)
    }

    /// Mark the transaction committed. Only active transactions commit; in
    /// particular a rolled-back transaction can never be committed.
    pub fn commit(&self, id: Uuid) -> TxnResult<()> {
        let mut active = self.active.lock().expect("transaction map poisoned");
        let snapshot = active
            .get_mut(&id)
            .ok_or_else(|| self.missing_transaction_error(id))?;
        if !snapshot.is_active() {
            return Err(TxnError::InvalidState {
                id: id.to_string(),
                state: snapshot.state.to_string(),
                expected: TransactionState::Active.to_string(),
            });
        }
        snapshot.state = TransactionState::Committed;
        self.persist(snapshot)?;
        let ops = snapshot.operations.len();
        active.remove(&id);
        debug!(%id, operations = ops, "transaction committed");
        Ok(())
    }

    /// Mark the transaction failed without undoing anything yet. A later
    /// `rollback` (or startup `recover`) will revert it.
    pub fn mark_failed(&self, id: Uuid) -> TxnResult<()> {
        let mut active = self.active.lock().expect("transaction map poisoned");
        let snapshot = active
            .get_mut(&id)
            .ok_or_else(|| self.missing_transaction_error(id))?;
        snapshot.state = TransactionState::Failed;
        self.persist(snapshot)
    }

    /// Undo the transaction's operations in reverse order.
    ///
    /// Every reversible operation is attempted even if earlier ones fail;
    /// the transaction always ends up rolled-back on disk. Failures surface
    /// as [`TxnError::RollbackIncomplete`] listing the unreverted steps.
    pub fn rollback(&self, id: Uuid) -> TxnResult<()> {
        let mut active = self.active.lock().expect("transaction map poisoned");
        // Only active or failed transactions live in the map; a terminal
        // one surfaces its journal state through the missing-id error.
        let mut snapshot = active
            .remove(&id)
            .ok_or_else(|| self.missing_transaction_error(id))?;
        drop(active);
        let failures = Self::revert_operations(&snapshot);
        snapshot.state = TransactionState::RolledBack;
        self.persist(&snapshot)?;
        if failures.is_empty() {
            info!(%id, operations = snapshot.operations.len(), "transaction rolled back");
            Ok(())
        } else {
            Err(TxnError::RollbackIncomplete {
                id: id.to_string(),
                failures,
            })
        }
    }

    /// Run one step of an active transaction. On success the step's
    /// rollback data is recorded; on failure the transaction is marked
    /// failed and the error returned, leaving the rollback-or-retry
    /// decision to the caller.
    pub fn execute_in_transaction<T, E, F>(
        &self,
        id: Uuid,
        description: &str,
        body: F,
    ) -> Result<T, E>
    where
        E: From<TxnError> + std::fmt::Display,
        F: FnOnce() -> Result<(T, RollbackData), E>,
    {
        match body() {
            Ok((value, rollback_data)) => {
                self.record(id, description, rollback_data)?;
                Ok(value)
            }
            Err(error) => {
                warn!(%id, description, %error, "transaction step failed");
                if let Err(txn_err) = self.mark_failed(id) {
                    warn!(%id, error = %txn_err, "could not mark transaction failed");
                }
                Err(error)
            }
        }
    }

    /// Run `body` inside a transaction. Commits on success; on failure the
    /// transaction is marked failed, rolled back, and the original error is
    /// returned (rollback problems are logged, not raised over it).
    pub fn execute<T, E, F>(&self, context: &str, body: F) -> Result<T, E>
    where
        E: From<TxnError> + std::fmt::Display,
        F: FnOnce(Uuid) -> Result<T, E>,
    {
        let id = self.begin(context)?;
        match body(id) {
            Ok(value) => {
                self.commit(id)?;
                Ok(value)
            }
            Err(error) => {
                warn!(%id, context, %error, "transaction body failed, rolling back");
                if let Err(txn_err) = self.mark_failed(id).and_then(|()| self.rollback(id)) {
                    warn!(%id, error = %txn_err, "rollback after failure was incomplete");
                }
                Err(error)
            }
        }
    }

    // ---- recovery and retention ----

    /// Roll back transactions left active or failed by a crash.
    ///
    /// Called once at startup, before any new transaction begins. Corrupt
    /// journal files are reported and left in place for inspection.
    pub fn recover(&self) -> TxnResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for path in self.journal_files()? {
            let snapshot = match self.load_file(&path) {
                Ok(s) => s,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping corrupt journal entry");
                    report.corrupt.push(path);
                    continue;
                }
            };
            if !matches!(
                snapshot.state,
                TransactionState::Active | TransactionState::Failed
            ) {
                continue;
            }
            info!(id = %snapshot.id, context = %snapshot.context, state = %snapshot.state,
                  "recovering interrupted transaction");
            let failures = Self::revert_operations(&snapshot);
            let mut snapshot = snapshot;
            snapshot.state = TransactionState::RolledBack;
            self.persist(&snapshot)?;
            if failures.is_empty() {
                report.rolled_back.push(snapshot.id);
            } else {
                warn!(id = %snapshot.id, ?failures, "recovery rollback incomplete");
                report.incomplete.push(snapshot.id);
            }
        }
        Ok(report)
    }

    /// Delete terminal-state journal entries older than the retention
    /// window. Returns the number removed.
    pub fn cleanup_stale(&self) -> TxnResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut removed = 0;
        for path in self.journal_files()? {
            let snapshot = match self.load_file(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let terminal = matches!(
                snapshot.state,
                TransactionState::Committed | TransactionState::RolledBack
            );
            if terminal && snapshot.started_at < cutoff {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept stale journal entries");
        }
        Ok(removed)
    }

    /// Spawn the periodic journal sweep. The returned handle stops it.
    pub fn spawn_cleanup(self: &Arc<Self>) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.config.cleanup_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the sweep runs
            // one interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = manager.cleanup_stale() {
                            warn!(%error, "journal cleanup sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        CleanupHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    // ---- journal I/O ----

    /// Read a transaction's journal entry, from memory if active, else
    /// from disk.
    pub fn load(&self, id: Uuid) -> TxnResult<TransactionSnapshot> {
        if let Some(snapshot) = self
            .active
            .lock()
            .expect("transaction map poisoned")
            .get(&id)
        {
            return Ok(snapshot.clone());
        }
        let path = self.journal_path(id);
        if !path.exists() {
            return Err(TxnError::UnknownTransaction(id.to_string()));
        }
        self.load_file(&path)
    }

    /// Classify an id absent from the active map: a journal entry on disk
    /// means the transaction already reached a terminal state, which is a
    /// state violation rather than an unknown id.
    fn missing_transaction_error(&self, id: Uuid) -> TxnError {
        let path = self.journal_path(id);
        if path.exists() {
            if let Ok(snapshot) = self.load_file(&path) {
                return TxnError::InvalidState {
                    id: id.to_string(),
                    state: snapshot.state.to_string(),
                    expected: TransactionState::Active.to_string(),
                };
            }
        }
        TxnError::UnknownTransaction(id.to_string())
    }

    fn journal_path(&self, id: Uuid) -> PathBuf {
        self.journal_dir.join(format!("{id}.json"))
    }

    fn journal_files(&self) -> TxnResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.journal_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_file(&self, path: &Path) -> TxnResult<TransactionSnapshot> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| TxnError::CorruptJournal {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Rewrite the journal entry atomically (temp file plus rename).
    fn persist(&self, snapshot: &TransactionSnapshot) -> TxnResult<()> {
        let path = self.journal_path(snapshot.id);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let tmp = path.with_extension(format!("tmp.{nanos}"));
        let data = serde_json::to_vec_pretty(snapshot)?;
        if let Err(error) = fs::write(&tmp, &data).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(error.into());
        }
        Ok(())
    }

    // ---- rollback handlers ----

    /// Revert each operation newest-first, collecting failures.
    fn revert_operations(snapshot: &TransactionSnapshot) -> Vec<String> {
        let mut failures = Vec::new();
        for op in snapshot.operations.iter().rev() {
            if !op.rollback_data.reversible() {
                warn!(id = %snapshot.id, sequence = op.sequence, description = %op.description,
                      "operation cannot be rolled back, skipping");
                continue;
            }
            if let Err(error) = Self::revert_one(&op.rollback_data) {
                warn!(id = %snapshot.id, sequence = op.sequence, description = %op.description,
                      %error, "rollback step failed");
                failures.push(format!("#{} {}: {}", op.sequence, op.description, error));
            }
        }
        failures
    }

    fn revert_one(data: &RollbackData) -> std::io::Result<()> {
        match data {
            RollbackData::FileWrite { path, prior } => match prior {
                Some(content) => write_restoring_parent(Path::new(path), content),
                None => remove_file_if_present(Path::new(path)),
            },
            RollbackData::FileDelete { path, prior } => {
                write_restoring_parent(Path::new(path), prior)
            }
            RollbackData::DirectoryCreate { path } => {
                match fs::remove_dir_all(path) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                    _ => Ok(()),
                }
            }
            RollbackData::DirectoryDelete { path } => fs::create_dir_all(path),
            RollbackData::RefUpdate { path, prior } => match prior {
                Some(target) => write_restoring_parent(Path::new(path), target.as_bytes()),
                None => remove_file_if_present(Path::new(path)),
            },
            RollbackData::ObjectStore { id } => {
                // Stored objects are immutable and content-addressed; an
                // unreferenced one is garbage-collector work, not rollback
                // work.
                debug!(object = %id, "leaving stored object for gc");
                Ok(())
            }
            RollbackData::Custom { .. } => Ok(()),
        }
    }
}

fn write_restoring_parent(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Handle to the background journal sweep.
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the sweep to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> TransactionManager {
        TransactionManager::open(dir.path().join("journal"), TxnConfig::default()).unwrap()
    }

    #[test]
    fn begin_persists_journal_entry_immediately() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("test").unwrap();
        assert!(mgr.journal_dir().join(format!("{id}.json")).exists());
        let loaded = mgr.load(id).unwrap();
        assert_eq!(loaded.state, TransactionState::Active);
    }

    #[test]
    fn commit_survives_reload_from_disk() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("commit-me").unwrap();
        mgr.record(
            id,
            "noop",
            RollbackData::ObjectStore { id: "ab".repeat(32) },
        )
        .unwrap();
        mgr.commit(id).unwrap();

        // After commit the entry is only on disk.
        let loaded = mgr.load(id).unwrap();
        assert_eq!(loaded.state, TransactionState::Committed);
        assert_eq!(loaded.operations.len(), 1);
    }

    #[test]
    fn rollback_restores_files_in_reverse_order() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let file = dir.path().join("data.txt");
        fs::write(&file, b"original").unwrap();

        let id = mgr.begin("edit").unwrap();
        mgr.record(
            id,
            "overwrite data.txt",
            RollbackData::FileWrite {
                path: file.display().to_string(),
                prior: Some(b"original".to_vec()),
            },
        )
        .unwrap();
        fs::write(&file, b"modified").unwrap();

        let created = dir.path().join("new.txt");
        mgr.record(
            id,
            "create new.txt",
            RollbackData::FileWrite {
                path: created.display().to_string(),
                prior: None,
            },
        )
        .unwrap();
        fs::write(&created, b"fresh").unwrap();

        mgr.rollback(id).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"original");
        assert!(!created.exists());
        assert_eq!(mgr.load(id).unwrap().state, TransactionState::RolledBack);
    }

    #[test]
    fn committed_transactions_cannot_roll_back() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("done").unwrap();
        mgr.commit(id).unwrap();
        // Rolling back a committed transaction is a state violation; the
        // journal entry names the terminal state it is in.
        match mgr.rollback(id).unwrap_err() {
            TxnError::InvalidState { state, .. } => assert_eq!(state, "committed"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        // And the commit sticks on disk.
        assert_eq!(mgr.load(id).unwrap().state, TransactionState::Committed);
    }

    #[test]
    fn terminal_transactions_report_their_state() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("undone").unwrap();
        mgr.rollback(id).unwrap();

        match mgr.commit(id).unwrap_err() {
            TxnError::InvalidState { state, .. } => assert_eq!(state, "rolled-back"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        match mgr.record(id, "late op", RollbackData::Custom { detail: "x".into() }).unwrap_err() {
            TxnError::InvalidState { state, .. } => assert_eq!(state, "rolled-back"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        // An id with no journal entry at all is still unknown.
        assert!(matches!(
            mgr.commit(Uuid::now_v7()),
            Err(TxnError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn record_after_failure_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("failing").unwrap();
        mgr.mark_failed(id).unwrap();
        assert!(matches!(
            mgr.record(id, "late", RollbackData::Custom { detail: "x".into() }),
            Err(TxnError::InvalidState { .. })
        ));
    }

    #[test]
    fn rollback_restores_deleted_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let gone_file = dir.path().join("gone.txt");
        let gone_dir = dir.path().join("sub");

        let id = mgr.begin("delete-things").unwrap();
        mgr.record(
            id,
            "delete gone.txt",
            RollbackData::FileDelete {
                path: gone_file.display().to_string(),
                prior: b"contents".to_vec(),
            },
        )
        .unwrap();
        mgr.record(
            id,
            "delete sub/",
            RollbackData::DirectoryDelete {
                path: gone_dir.display().to_string(),
            },
        )
        .unwrap();

        mgr.rollback(id).unwrap();
        assert_eq!(fs::read(&gone_file).unwrap(), b"contents");
        assert!(gone_dir.is_dir());
    }

    #[test]
    fn rollback_continues_past_irreversible_operations() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let file = dir.path().join("f.txt");

        let id = mgr.begin("mixed").unwrap();
        mgr.record(
            id,
            "external side effect",
            RollbackData::Custom { detail: "sent a webhook".into() },
        )
        .unwrap();
        mgr.record(
            id,
            "create f.txt",
            RollbackData::FileWrite {
                path: file.display().to_string(),
                prior: None,
            },
        )
        .unwrap();
        fs::write(&file, b"x").unwrap();

        // Irreversible op is skipped, reversible one still runs.
        mgr.rollback(id).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn execute_commits_on_success_and_rolls_back_on_error() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let file = dir.path().join("tracked.txt");

        let value: Result<i32, TxnError> = mgr.execute("ok-path", |_id| Ok(7));
        assert_eq!(value.unwrap(), 7);

        let result: Result<(), TxnError> = mgr.execute("err-path", |id| {
            mgr.record(
                id,
                "create tracked.txt",
                RollbackData::FileWrite {
                    path: file.display().to_string(),
                    prior: None,
                },
            )?;
            fs::write(&file, b"partial")?;
            Err(TxnError::UnknownTransaction("simulated".into()))
        });
        assert!(result.is_err());
        assert!(!file.exists());
    }

    #[test]
    fn failed_step_marks_transaction_without_rolling_back() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let file = dir.path().join("kept.txt");

        let id = mgr.begin("stepwise").unwrap();
        let ok: Result<(), TxnError> = mgr.execute_in_transaction(id, "create kept.txt", || {
            fs::write(&file, b"v1")?;
            Ok((
                (),
                RollbackData::FileWrite {
                    path: file.display().to_string(),
                    prior: None,
                },
            ))
        });
        ok.unwrap();

        let err: Result<(), TxnError> = mgr.execute_in_transaction(id, "explode", || {
            Err(TxnError::UnknownTransaction("boom".into()))
        });
        assert!(err.is_err());

        // Marked failed, but nothing was undone yet.
        assert_eq!(mgr.load(id).unwrap().state, TransactionState::Failed);
        assert!(file.exists());

        // The caller can still roll back explicitly.
        mgr.rollback(id).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn recover_rolls_back_interrupted_transactions() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("orphan.txt");
        let journal = dir.path().join("journal");

        // Simulate a crash: first manager begins work and disappears.
        {
            let mgr = TransactionManager::open(&journal, TxnConfig::default()).unwrap();
            let id = mgr.begin("interrupted").unwrap();
            mgr.record(
                id,
                "create orphan.txt",
                RollbackData::FileWrite {
                    path: file.display().to_string(),
                    prior: None,
                },
            )
            .unwrap();
            fs::write(&file, b"half-done").unwrap();
        }

        let mgr = TransactionManager::open(&journal, TxnConfig::default()).unwrap();
        let report = mgr.recover().unwrap();
        assert_eq!(report.rolled_back.len(), 1);
        assert!(report.incomplete.is_empty());
        assert!(!file.exists());
    }

    #[test]
    fn recover_ignores_terminal_and_corrupt_entries() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let id = mgr.begin("finished").unwrap();
        mgr.commit(id).unwrap();
        fs::write(mgr.journal_dir().join("garbage.json"), b"not json").unwrap();

        let report = mgr.recover().unwrap();
        assert!(report.rolled_back.is_empty());
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(mgr.load(id).unwrap().state, TransactionState::Committed);
    }

    #[test]
    fn cleanup_removes_only_old_terminal_entries() {
        let dir = TempDir::new().unwrap();
        let mgr = TransactionManager::open(
            dir.path().join("journal"),
            TxnConfig {
                retention: Duration::from_secs(0),
                ..TxnConfig::default()
            },
        )
        .unwrap();

        let done = mgr.begin("done").unwrap();
        mgr.commit(done).unwrap();
        let open = mgr.begin("still-open").unwrap();

        std::thread::sleep(Duration::from_millis(10));
        let removed = mgr.cleanup_stale().unwrap();
        assert_eq!(removed, 1);
        assert!(mgr.load(open).is_ok());
        assert!(matches!(
            mgr.load(done),
            Err(TxnError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn cleanup_task_stops_on_signal() {
        let dir = TempDir::new().unwrap();
        let mgr = Arc::new(
            TransactionManager::open(
                dir.path().join("journal"),
                TxnConfig {
                    cleanup_interval: Duration::from_millis(10),
                    ..TxnConfig::default()
                },
            )
            .unwrap(),
        );
        let handle = mgr.spawn_cleanup();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
    }
}
