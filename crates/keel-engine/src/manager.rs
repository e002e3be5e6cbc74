use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use keel_diff::{diff_contents, diff_trees, FileDiff, TreeChange, TreeDiff};
use keel_retry::{RetryManager, RetryOptions};
use keel_snapshot::TreeBuilder;
use keel_store::{Commit, FsObjectStore, ObjectStore, StorageObject, Tree};
use keel_txn::{CleanupHandle, RollbackData, TransactionManager, TxnConfig};
use keel_types::{EntryMode, ObjectId};

use crate::checkpoint::{CheckpointInfo, FileEntry, GcReport, RestoreSummary, StorageReport};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Name of the ref file holding the latest checkpoint's hash.
const HEAD_FILE: &str = "HEAD";

/// The checkpoint engine for one project directory.
///
/// All persistent state lives under `<project>/.keel`: the object store,
/// the transaction journal, and the HEAD ref. Mutating operations run
/// inside a transaction and behind the retry manager; reads go straight to
/// the store. Interrupted transactions from a previous process are rolled
/// back when the manager opens.
pub struct CheckpointManager {
    project_dir: PathBuf,
    base_dir: PathBuf,
    store: Arc<FsObjectStore>,
    builder: TreeBuilder,
    retry: Arc<RetryManager>,
    txn: Arc<TransactionManager>,
    retry_options: RetryOptions,
    /// Scopes circuit-breaker keys to this project so concurrent projects
    /// never trip each other's breakers.
    breaker_context: String,
    author: String,
}

impl CheckpointManager {
    /// Open (or initialize) the checkpoint store for a project directory.
    pub fn open(project_dir: &Path, config: EngineConfig) -> EngineResult<Self> {
        Self::open_with_retry(project_dir, config, Arc::new(RetryManager::new()))
    }

    /// Open with a caller-supplied retry manager, so several projects can
    /// share one metrics surface (breaker keys stay project-scoped).
    pub fn open_with_retry(
        project_dir: &Path,
        config: EngineConfig,
        retry: Arc<RetryManager>,
    ) -> EngineResult<Self> {
        let base_dir = project_dir.join(keel_snapshot::ignore::STORE_DIR_NAME);
        fs::create_dir_all(&base_dir)?;

        let store = Arc::new(FsObjectStore::open(&base_dir)?);
        let txn = Arc::new(TransactionManager::open(
            base_dir.join("journal"),
            TxnConfig::default(),
        )?);

        let report = txn.recover()?;
        if !report.rolled_back.is_empty() || !report.incomplete.is_empty() {
            info!(
                rolled_back = report.rolled_back.len(),
                incomplete = report.incomplete.len(),
                "recovered interrupted transactions"
            );
        }

        let builder = TreeBuilder::new(store.clone() as Arc<dyn ObjectStore>, &config.snapshot);
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            breaker_context: base_dir.display().to_string(),
            base_dir,
            store,
            builder,
            retry,
            txn,
            retry_options: config.retry,
            author: config.author.name,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Start the periodic transaction-journal sweep. The handle stops it;
    /// dropping the manager without stopping leaves the task running until
    /// the runtime shuts down.
    pub fn start_maintenance(&self) -> CleanupHandle {
        self.txn.spawn_cleanup()
    }

    /// Aggregate retry/breaker metrics for this manager's operations.
    pub fn retry_metrics(&self) -> keel_retry::MetricsReport {
        self.retry.metrics_report()
    }

    // ---- checkpoint lifecycle ----

    /// Capture the project directory as a new checkpoint and advance HEAD.
    pub async fn create_checkpoint(&self, message: &str) -> EngineResult<CheckpointInfo> {
        let message = message.to_string();
        self.with_retry("create-checkpoint", || {
            self.txn.execute("create-checkpoint", |txn_id| {
                let summary = self.builder.build_tree(&self.project_dir)?;
                let parent = self.head()?;
                let commit = Commit {
                    tree: summary.root,
                    parent,
                    author: self.author.clone(),
                    timestamp: Utc::now().to_rfc3339(),
                    message: message.clone(),
                };
                let id = self.store.write_commit(commit.clone())?;
                self.txn.record(
                    txn_id,
                    "store checkpoint commit",
                    RollbackData::ObjectStore { id: id.to_hex() },
                )?;
                self.set_head(txn_id, Some(&id))?;
                info!(checkpoint = %id.short_hex(), files = summary.file_count, "created checkpoint");
                Ok(CheckpointInfo::from_commit(id, commit))
            })
        })
        .await
    }

    /// Restore the working directory to a checkpoint's state without
    /// moving HEAD.
    pub async fn checkout(&self, checkpoint: &ObjectId) -> EngineResult<RestoreSummary> {
        let target = self.load_commit(checkpoint)?.tree;
        self.with_retry("checkout", || {
            self.txn
                .execute("checkout", |txn_id| self.restore_tree(txn_id, &target))
        })
        .await
    }

    /// Restore the working directory to a checkpoint and move HEAD to it,
    /// discarding later checkpoints from the history view.
    pub async fn reset_to_checkpoint(&self, checkpoint: &ObjectId) -> EngineResult<RestoreSummary> {
        let target = self.load_commit(checkpoint)?.tree;
        self.with_retry("reset-to-checkpoint", || {
            self.txn.execute("reset-to-checkpoint", |txn_id| {
                let summary = self.restore_tree(txn_id, &target)?;
                self.set_head(txn_id, Some(checkpoint))?;
                Ok(summary)
            })
        })
        .await
    }

    /// Delete the latest checkpoint, moving HEAD back to its parent.
    ///
    /// Only the newest checkpoint can be deleted; anything else would
    /// break the linear parent chain. The commit object is removed at
    /// once; its tree and blobs become garbage for the next collection.
    pub async fn delete_checkpoint(&self, checkpoint: &ObjectId) -> EngineResult<()> {
        let head = self.head()?.ok_or(EngineError::EmptyHistory)?;
        if head != *checkpoint {
            return Err(EngineError::NotLatest(*checkpoint));
        }
        let parent = self.load_commit(checkpoint)?.parent;

        self.with_retry("delete-checkpoint", || {
            self.txn.execute("delete-checkpoint", |txn_id| {
                self.set_head(txn_id, parent.as_ref())?;
                Ok(())
            })
        })
        .await?;

        if let Err(error) = self.store.delete(checkpoint) {
            warn!(checkpoint = %checkpoint.short_hex(), %error,
                  "commit object left behind after delete; gc will remove it");
        }
        info!(checkpoint = %checkpoint.short_hex(), "deleted checkpoint");
        Ok(())
    }

    // ---- queries ----

    /// The latest checkpoint id, if any checkpoints exist.
    pub fn head(&self) -> EngineResult<Option<ObjectId>> {
        let path = self.head_path();
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        ObjectId::from_hex(text).map(Some).map_err(|_| EngineError::InvalidHead(text.to_string()))
    }

    /// Checkpoints from newest to oldest, optionally capped.
    pub fn get_history(&self, limit: Option<usize>) -> EngineResult<Vec<CheckpointInfo>> {
        let mut history = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.head()?;
        while let Some(id) = cursor {
            if history.len() >= limit.unwrap_or(usize::MAX) {
                break;
            }
            // A parent cycle would mean store corruption; stop rather
            // than loop.
            if !seen.insert(id) {
                warn!(checkpoint = %id.short_hex(), "parent cycle in history, stopping walk");
                break;
            }
            let commit = self.load_commit(&id)?;
            cursor = commit.parent;
            history.push(CheckpointInfo::from_commit(id, commit));
        }
        Ok(history)
    }

    pub fn get_checkpoint_info(&self, checkpoint: &ObjectId) -> EngineResult<CheckpointInfo> {
        let commit = self.load_commit(checkpoint)?;
        Ok(CheckpointInfo::from_commit(*checkpoint, commit))
    }

    /// All tracked files in a checkpoint, sorted by path.
    pub fn list_files(&self, checkpoint: &ObjectId) -> EngineResult<Vec<FileEntry>> {
        let tree = self.load_commit(checkpoint)?.tree;
        let mut files = Vec::new();
        self.collect_files(&tree, "", &mut files)?;
        Ok(files)
    }

    /// A file's content as stored in a checkpoint.
    pub fn get_file_content(&self, checkpoint: &ObjectId, path: &str) -> EngineResult<Vec<u8>> {
        let tree = self.load_commit(checkpoint)?.tree;
        let id = self
            .resolve_path(&tree, path)?
            .ok_or_else(|| EngineError::PathNotFound {
                path: path.to_string(),
                checkpoint: *checkpoint,
            })?;
        self.get_file_content_by_hash(&id)
    }

    /// Blob content by hash, regardless of which checkpoint references it.
    pub fn get_file_content_by_hash(&self, hash: &ObjectId) -> EngineResult<Vec<u8>> {
        let object = self
            .store
            .read(hash)?
            .ok_or(EngineError::ObjectNotFound(*hash))?;
        Ok(object.into_blob()?.content)
    }

    /// Line diff of one file between two checkpoints. `None` on either
    /// side means the current working-directory version; a file absent on
    /// a side diffs as empty.
    pub fn get_file_diff(
        &self,
        path: &str,
        from: Option<&ObjectId>,
        to: Option<&ObjectId>,
    ) -> EngineResult<FileDiff> {
        let old = self.file_version(path, from)?;
        let new = self.file_version(path, to)?;
        Ok(diff_contents(&old, &new))
    }

    /// Files added, deleted, or modified by a checkpoint relative to its
    /// parent.
    pub fn get_checkpoint_changes(&self, checkpoint: &ObjectId) -> EngineResult<TreeDiff> {
        let commit = self.load_commit(checkpoint)?;
        let parent_tree = match commit.parent {
            Some(parent) => Some(self.load_commit(&parent)?.tree),
            None => None,
        };
        Ok(diff_trees(
            self.store.as_ref(),
            parent_tree.as_ref(),
            Some(&commit.tree),
        )?)
    }

    pub fn get_storage_stats(&self) -> EngineResult<StorageReport> {
        Ok(StorageReport {
            stats: self.store.stats()?,
            checkpoint_count: self.get_history(None)?.len() as u64,
        })
    }

    // ---- garbage collection ----

    /// Remove objects unreachable from the checkpoint history and audit
    /// the reachable ones for corruption.
    ///
    /// Corrupt live objects are counted but never deleted; they need
    /// manual intervention, and deleting them would silently lose data.
    pub async fn garbage_collect(&self) -> EngineResult<GcReport> {
        let live = self.reachable_objects()?;
        self.with_retry("garbage-collect", || {
            let mut report = GcReport::default();
            for id in self.store.list()? {
                report.scanned += 1;
                if !live.contains(&id) {
                    if self.store.delete(&id)? {
                        report.deleted += 1;
                    }
                    continue;
                }
                report.live += 1;
                match self.store.verify_object(&id) {
                    Ok(_) => {}
                    Err(keel_store::StoreError::HashMismatch { .. }) => {
                        warn!(object = %id.short_hex(), "live object failed hash verification");
                        report.corrupt += 1;
                    }
                    Err(other) => return Err(other.into()),
                }
            }
            info!(scanned = report.scanned, live = report.live,
                  deleted = report.deleted, corrupt = report.corrupt, "garbage collection done");
            Ok(report)
        })
        .await
    }

    /// Every object reachable from HEAD through the commit chain.
    fn reachable_objects(&self) -> EngineResult<HashSet<ObjectId>> {
        let mut live = HashSet::new();
        let mut cursor = self.head()?;
        while let Some(id) = cursor {
            if !live.insert(id) {
                break;
            }
            let commit = self.load_commit(&id)?;
            self.mark_tree(&commit.tree, &mut live)?;
            cursor = commit.parent;
        }
        Ok(live)
    }

    fn mark_tree(&self, tree_id: &ObjectId, live: &mut HashSet<ObjectId>) -> EngineResult<()> {
        if !live.insert(*tree_id) {
            return Ok(());
        }
        let tree = self.load_tree(tree_id)?;
        for entry in &tree.entries {
            if entry.mode.is_directory() {
                self.mark_tree(&entry.id, live)?;
            } else {
                live.insert(entry.id);
            }
        }
        Ok(())
    }

    // ---- internals ----

    async fn with_retry<T, F>(&self, name: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> EngineResult<T>,
    {
        self.retry
            .execute(
                name,
                Some(&self.breaker_context),
                &self.retry_options,
                || {
                    let result = op();
                    async move { result }
                },
            )
            .await
            .map(|outcome| {
                if outcome.had_retries {
                    debug!(operation = name, attempts = outcome.attempts, "succeeded after retries");
                }
                outcome.result
            })
            .map_err(EngineError::from_retry)
    }

    fn head_path(&self) -> PathBuf {
        self.base_dir.join(HEAD_FILE)
    }

    /// Update (or clear) HEAD inside a transaction, capturing the prior
    /// value for rollback.
    fn set_head(&self, txn_id: Uuid, target: Option<&ObjectId>) -> EngineResult<()> {
        let path = self.head_path();
        let prior = match fs::read_to_string(&path) {
            Ok(t) => Some(t),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        self.txn.record(
            txn_id,
            "update HEAD",
            RollbackData::RefUpdate {
                path: path.display().to_string(),
                prior,
            },
        )?;
        match target {
            Some(id) => fs::write(&path, format!("{}\n", id.to_hex()))?,
            None => {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Bring the working directory to `target`'s state, journaling every
    /// file touched.
    ///
    /// The current state is captured first; that both provides the diff
    /// baseline and stores the current file contents as blobs, so a
    /// rollback or a later checkpoint can still reach them.
    fn restore_tree(&self, txn_id: Uuid, target: &ObjectId) -> EngineResult<RestoreSummary> {
        let current = self.builder.build_tree(&self.project_dir)?;
        let diff = diff_trees(self.store.as_ref(), Some(&current.root), Some(target))?;

        let mut summary = RestoreSummary::default();
        for change in &diff.changes {
            match change {
                TreeChange::Added { path, id, mode } | TreeChange::Modified { path, new_id: id, mode, .. } => {
                    self.restore_file(txn_id, path, id, *mode)?;
                    summary.written += 1;
                }
                TreeChange::ModeChanged { path, id, new_mode, .. } => {
                    self.restore_file(txn_id, path, id, *new_mode)?;
                    summary.written += 1;
                }
                TreeChange::Deleted { path, .. } => {
                    self.remove_file(txn_id, path)?;
                    summary.removed += 1;
                }
            }
        }
        debug!(target = %target.short_hex(), written = summary.written,
               removed = summary.removed, "restored working tree");
        Ok(summary)
    }

    fn restore_file(
        &self,
        txn_id: Uuid,
        rel_path: &str,
        blob: &ObjectId,
        mode: EntryMode,
    ) -> EngineResult<()> {
        let abs = self.project_dir.join(rel_path);
        let prior = self.read_prior(&abs)?;
        self.txn.record(
            txn_id,
            format!("write {rel_path}"),
            RollbackData::FileWrite {
                path: abs.display().to_string(),
                prior,
            },
        )?;

        let content = self.get_file_content_by_hash(blob)?;
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        if mode == EntryMode::Symlink {
            let target = String::from_utf8_lossy(&content).into_owned();
            if fs::symlink_metadata(&abs).is_ok() {
                fs::remove_file(&abs)?;
            }
            std::os::unix::fs::symlink(target, &abs)?;
            return Ok(());
        }

        // `fs::write` through an existing symlink would clobber the link's
        // target, which may live outside the project. The link itself is
        // what gets replaced.
        if let Ok(meta) = fs::symlink_metadata(&abs) {
            if meta.file_type().is_symlink() {
                fs::remove_file(&abs)?;
            }
        }
        fs::write(&abs, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bits = if mode == EntryMode::Executable { 0o755 } else { 0o644 };
            fs::set_permissions(&abs, fs::Permissions::from_mode(bits))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    /// Capture a path's current state for rollback. Symlinks are captured
    /// as their target text, never followed.
    fn read_prior(&self, abs: &Path) -> EngineResult<Option<Vec<u8>>> {
        match fs::symlink_metadata(abs) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(abs)?;
                Ok(Some(target.to_string_lossy().into_owned().into_bytes()))
            }
            Ok(_) => Ok(Some(fs::read(abs)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self, txn_id: Uuid, rel_path: &str) -> EngineResult<()> {
        let abs = self.project_dir.join(rel_path);
        let Some(prior) = self.read_prior(&abs)? else {
            return Ok(());
        };
        self.txn.record(
            txn_id,
            format!("delete {rel_path}"),
            RollbackData::FileDelete {
                path: abs.display().to_string(),
                prior,
            },
        )?;
        fs::remove_file(&abs)?;
        Ok(())
    }

    fn file_version(&self, path: &str, checkpoint: Option<&ObjectId>) -> EngineResult<Vec<u8>> {
        match checkpoint {
            Some(id) => {
                let tree = self.load_commit(id)?.tree;
                match self.resolve_path(&tree, path)? {
                    Some(blob) => self.get_file_content_by_hash(&blob),
                    None => Ok(Vec::new()),
                }
            }
            None => match fs::read(self.project_dir.join(path)) {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Walk tree components to find the blob a `/`-separated path names.
    fn resolve_path(&self, root: &ObjectId, path: &str) -> EngineResult<Option<ObjectId>> {
        let mut tree = self.load_tree(root)?;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(component) = components.next() {
            let Some(entry) = tree.get(component) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return if entry.mode.is_directory() {
                    Ok(None)
                } else {
                    Ok(Some(entry.id))
                };
            }
            if !entry.mode.is_directory() {
                return Ok(None);
            }
            tree = self.load_tree(&entry.id)?;
        }
        Ok(None)
    }

    fn collect_files(
        &self,
        tree_id: &ObjectId,
        prefix: &str,
        out: &mut Vec<FileEntry>,
    ) -> EngineResult<()> {
        let tree = self.load_tree(tree_id)?;
        for entry in &tree.entries {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_directory() {
                self.collect_files(&entry.id, &path, out)?;
            } else {
                out.push(FileEntry {
                    path,
                    id: entry.id,
                    mode: entry.mode,
                    size: entry.size,
                });
            }
        }
        Ok(())
    }

    fn load_commit(&self, id: &ObjectId) -> EngineResult<Commit> {
        match self.store.read(id)? {
            Some(StorageObject::Commit(commit)) => Ok(commit),
            Some(_) | None => Err(EngineError::CheckpointNotFound(*id)),
        }
    }

    fn load_tree(&self, id: &ObjectId) -> EngineResult<Tree> {
        let object = self.store.read(id)?.ok_or(EngineError::ObjectNotFound(*id))?;
        Ok(object.into_tree()?)
    }
}
