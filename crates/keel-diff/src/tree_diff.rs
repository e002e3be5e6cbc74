//! Tree-level diff: recursive comparison of two stored trees.
//!
//! Changes are reported with paths relative to the tree root, so callers
//! see `src/main.rs` rather than a nested structure. Rename detection is
//! deliberately absent; a moved file appears as a delete plus an add.

use std::collections::BTreeMap;

use keel_store::{ObjectStore, Tree, TreeEntry};
use keel_types::{EntryMode, ObjectId};

use crate::error::{DiffError, DiffResult};

/// A single change between two checkpoint trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    /// File present only in the new tree.
    Added {
        path: String,
        id: ObjectId,
        mode: EntryMode,
    },
    /// File present only in the old tree.
    Deleted {
        path: String,
        id: ObjectId,
        mode: EntryMode,
    },
    /// File present in both with different content.
    Modified {
        path: String,
        old_id: ObjectId,
        new_id: ObjectId,
        mode: EntryMode,
    },
    /// File present in both with the same content but a different mode
    /// (e.g. the executable bit flipped).
    ModeChanged {
        path: String,
        id: ObjectId,
        old_mode: EntryMode,
        new_mode: EntryMode,
    },
}

impl TreeChange {
    /// The path this change applies to.
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. }
            | Self::Deleted { path, .. }
            | Self::Modified { path, .. }
            | Self::ModeChanged { path, .. } => path,
        }
    }
}

/// The full change set between two trees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub changes: Vec<TreeChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Compare two trees by ID, descending into subtrees.
///
/// `None` on either side stands for an empty tree, so `diff_trees(store,
/// None, Some(id))` lists everything in `id` as added.
pub fn diff_trees(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
) -> DiffResult<TreeDiff> {
    let mut diff = TreeDiff::default();
    walk(store, old, new, "", &mut diff.changes)?;
    Ok(diff)
}

fn walk(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    prefix: &str,
    changes: &mut Vec<TreeChange>,
) -> DiffResult<()> {
    if old == new {
        return Ok(());
    }
    let old_entries = match old {
        Some(id) => entry_map(&load_tree(store, id)?),
        None => BTreeMap::new(),
    };
    let new_entries = match new {
        Some(id) => entry_map(&load_tree(store, id)?),
        None => BTreeMap::new(),
    };

    for (name, old_entry) in &old_entries {
        let path = join(prefix, name);
        match new_entries.get(name) {
            None => record_side(store, old_entry, &path, changes, Side::Deleted)?,
            Some(new_entry) => {
                if old_entry.id == new_entry.id && old_entry.mode == new_entry.mode {
                    continue;
                }
                match (old_entry.mode.is_directory(), new_entry.mode.is_directory()) {
                    (true, true) => {
                        walk(store, Some(&old_entry.id), Some(&new_entry.id), &path, changes)?;
                    }
                    (false, false) => {
                        if old_entry.id != new_entry.id {
                            changes.push(TreeChange::Modified {
                                path,
                                old_id: old_entry.id,
                                new_id: new_entry.id,
                                mode: new_entry.mode,
                            });
                        } else {
                            // Same content, so the earlier equality guard
                            // means the mode differs.
                            changes.push(TreeChange::ModeChanged {
                                path,
                                id: new_entry.id,
                                old_mode: old_entry.mode,
                                new_mode: new_entry.mode,
                            });
                        }
                    }
                    // A path that switched between file and directory is a
                    // delete of one shape and an add of the other.
                    _ => {
                        record_side(store, old_entry, &path, changes, Side::Deleted)?;
                        record_side(store, new_entry, &path, changes, Side::Added)?;
                    }
                }
            }
        }
    }

    for (name, new_entry) in &new_entries {
        if !old_entries.contains_key(name) {
            let path = join(prefix, name);
            record_side(store, new_entry, &path, changes, Side::Added)?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Side {
    Added,
    Deleted,
}

/// Record an entry that exists on only one side. Directories expand to
/// their contained files.
fn record_side(
    store: &dyn ObjectStore,
    entry: &TreeEntry,
    path: &str,
    changes: &mut Vec<TreeChange>,
    side: Side,
) -> DiffResult<()> {
    if entry.mode.is_directory() {
        let tree = load_tree(store, &entry.id)?;
        for child in &tree.entries {
            let child_path = join(path, &child.name);
            record_side(store, child, &child_path, changes, side)?;
        }
        return Ok(());
    }
    changes.push(match side {
        Side::Added => TreeChange::Added {
            path: path.to_string(),
            id: entry.id,
            mode: entry.mode,
        },
        Side::Deleted => TreeChange::Deleted {
            path: path.to_string(),
            id: entry.id,
            mode: entry.mode,
        },
    });
    Ok(())
}

fn entry_map(tree: &Tree) -> BTreeMap<String, TreeEntry> {
    tree.entries
        .iter()
        .map(|e| (e.name.clone(), e.clone()))
        .collect()
}

fn load_tree(store: &dyn ObjectStore, id: &ObjectId) -> DiffResult<Tree> {
    let object = store.read(id)?.ok_or(DiffError::ObjectNotFound(*id))?;
    Ok(object.into_tree()?)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
