use std::fmt;

use keel_types::{EntryMode, ObjectId};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// Checkpoint metadata: root tree, single optional parent, author,
    /// timestamp, message.
    Commit,
}

impl ObjectKind {
    /// The header token for this kind (`"blob"`, `"tree"`, `"commit"`).
    pub fn token(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    /// Parse a header token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object (binary-safe).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub content: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File mode (regular, executable, symlink, directory).
    pub mode: EntryMode,
    /// Entry name (filename or directory name).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub id: ObjectId,
    /// Decompressed size of the referenced object in bytes.
    pub size: u64,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, id: ObjectId, size: u64) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
            size,
        }
    }

    /// The sort key for deterministic tree ordering.
    ///
    /// Directories compare as if their name carried a trailing `/`, so
    /// `foo` (directory) sorts after `foo.txt` the same way the host VCS
    /// orders them. This keeps tree hashes comparable across snapshots.
    fn sort_key(&self) -> String {
        if self.mode.is_directory() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Directory listing object.
///
/// Entries are always held in canonical sorted order; two trees describing
/// the same directory state hash identically regardless of insertion order.
/// Empty trees are never persisted (the builder omits empty directories),
/// but the type permits them for intermediate computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries, sorted canonically.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Checkpoint metadata object.
///
/// History is linear: a commit has at most one parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    /// Previous checkpoint, if any.
    pub parent: Option<ObjectId>,
    /// Author string.
    pub author: String,
    /// Timestamp string (RFC 3339 as written by the engine; preserved
    /// verbatim on read).
    pub timestamp: String,
    /// Checkpoint message. May contain embedded newlines.
    pub message: String,
}

// ---------------------------------------------------------------------------
// StorageObject: the sum over all object kinds, plus the wire codec
// ---------------------------------------------------------------------------

/// A decoded object of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageObject {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl StorageObject {
    /// The kind of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Encode the object body (payload without the header).
    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            Self::Blob(blob) => blob.content.clone(),
            Self::Tree(tree) => encode_tree_body(tree),
            Self::Commit(commit) => encode_commit_body(commit),
        }
    }

    /// Serialize to the full uncompressed wire form:
    /// `"<type> <body-length>\0"` followed by the body.
    ///
    /// This is both the hashed preimage and the bytes that get
    /// gzip-compressed on disk.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut buf = Vec::with_capacity(body.len() + 16);
        buf.extend_from_slice(self.kind().token().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(body.len().to_string().as_bytes());
        buf.push(0);
        buf.extend_from_slice(&body);
        buf
    }

    /// Compute the content-addressed ID: SHA-256 over the serialized form.
    pub fn id(&self) -> ObjectId {
        ObjectId::digest(&self.serialize())
    }

    /// Decompressed body length in bytes.
    pub fn size(&self) -> u64 {
        self.encode_body().len() as u64
    }

    /// Decode from uncompressed wire bytes.
    ///
    /// `id` is the address the bytes were read from; it is only used for
    /// error reporting. Fails with [`StoreError::CorruptObject`] on a
    /// missing NUL delimiter, unknown type token, unparsable length, or a
    /// declared length that does not match the actual body.
    pub fn decode(id: ObjectId, bytes: &[u8]) -> StoreResult<Self> {
        let nul = bytes.iter().position(|&b| b == 0).ok_or_else(|| {
            StoreError::CorruptObject {
                id,
                reason: "missing NUL header delimiter".into(),
            }
        })?;
        let header = std::str::from_utf8(&bytes[..nul]).map_err(|_| StoreError::CorruptObject {
            id,
            reason: "header is not valid UTF-8".into(),
        })?;
        let (token, len_str) = header.split_once(' ').ok_or_else(|| {
            StoreError::CorruptObject {
                id,
                reason: format!("malformed header: {header:?}"),
            }
        })?;
        let kind = ObjectKind::from_token(token).ok_or_else(|| StoreError::CorruptObject {
            id,
            reason: format!("unknown object type: {token:?}"),
        })?;
        let declared: usize = len_str.parse().map_err(|_| StoreError::CorruptObject {
            id,
            reason: format!("unparsable body length: {len_str:?}"),
        })?;

        let body = &bytes[nul + 1..];
        if body.len() != declared {
            return Err(StoreError::CorruptObject {
                id,
                reason: format!(
                    "declared size {declared} does not match actual body length {}",
                    body.len()
                ),
            });
        }

        match kind {
            ObjectKind::Blob => Ok(Self::Blob(Blob::new(body.to_vec()))),
            ObjectKind::Tree => Ok(Self::Tree(decode_tree_body(id, body)?)),
            ObjectKind::Commit => Ok(Self::Commit(decode_commit_body(id, body)?)),
        }
    }

    /// Unwrap as a blob, or fail with a kind mismatch.
    pub fn into_blob(self) -> StoreResult<Blob> {
        match self {
            Self::Blob(b) => Ok(b),
            other => Err(kind_mismatch("blob", &other)),
        }
    }

    /// Unwrap as a tree, or fail with a kind mismatch.
    pub fn into_tree(self) -> StoreResult<Tree> {
        match self {
            Self::Tree(t) => Ok(t),
            other => Err(kind_mismatch("tree", &other)),
        }
    }

    /// Unwrap as a commit, or fail with a kind mismatch.
    pub fn into_commit(self) -> StoreResult<Commit> {
        match self {
            Self::Commit(c) => Ok(c),
            other => Err(kind_mismatch("commit", &other)),
        }
    }
}

impl From<Blob> for StorageObject {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

impl From<Tree> for StorageObject {
    fn from(tree: Tree) -> Self {
        Self::Tree(tree)
    }
}

impl From<Commit> for StorageObject {
    fn from(commit: Commit) -> Self {
        Self::Commit(commit)
    }
}

fn kind_mismatch(expected: &'static str, actual: &StorageObject) -> StoreError {
    StoreError::KindMismatch {
        expected,
        actual: actual.kind().token(),
    }
}

// ---------------------------------------------------------------------------
// Tree body codec
// ---------------------------------------------------------------------------

/// Encode tree entries as repeated
/// `"<mode-octal> <name> <size>\0"` + 32 raw hash bytes records.
fn encode_tree_body(tree: &Tree) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in &tree.entries {
        buf.extend_from_slice(format!("{:o}", entry.mode.mode_bits()).as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(entry.name.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(entry.size.to_string().as_bytes());
        buf.push(0);
        buf.extend_from_slice(entry.id.as_bytes());
    }
    buf
}

/// Decode tree entries, accepting the legacy record form without the size
/// field (`"<mode-octal> <name>\0"` + hash). Legacy entries get size 0.
fn decode_tree_body(id: ObjectId, body: &[u8]) -> StoreResult<Tree> {
    let corrupt = |reason: String| StoreError::CorruptObject { id, reason };

    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let nul = body[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt(format!("tree entry at offset {pos} missing NUL")))?;
        let meta = std::str::from_utf8(&body[pos..pos + nul])
            .map_err(|_| corrupt(format!("tree entry at offset {pos} is not valid UTF-8")))?;

        let (mode_str, rest) = meta
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("malformed tree entry: {meta:?}")))?;
        let mode_bits = u32::from_str_radix(mode_str, 8)
            .map_err(|_| corrupt(format!("bad mode in tree entry: {mode_str:?}")))?;
        let mode = EntryMode::classify(mode_bits);

        // Current records carry a trailing size field after a second space.
        // Legacy records omit it; those decode with size 0 for backward
        // read-compatibility with pre-existing checkpoint stores.
        let (name, size) = match rest.rsplit_once(' ') {
            Some((name, size_str)) => match size_str.parse::<u64>() {
                Ok(size) => (name, size),
                Err(_) => (rest, 0),
            },
            None => (rest, 0),
        };
        if name.is_empty() {
            return Err(corrupt(format!("empty name in tree entry: {meta:?}")));
        }

        let hash_start = pos + nul + 1;
        let hash_end = hash_start + 32;
        if hash_end > body.len() {
            return Err(corrupt(format!(
                "truncated hash in tree entry for {name:?}"
            )));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&body[hash_start..hash_end]);

        entries.push(TreeEntry {
            mode,
            name: name.to_string(),
            id: ObjectId::from_hash(hash),
            size,
        });
        pos = hash_end;
    }

    // Entries were written pre-sorted; preserve their order on read so
    // re-serialization is byte-identical.
    Ok(Tree { entries })
}

// ---------------------------------------------------------------------------
// Commit body codec
// ---------------------------------------------------------------------------

/// Encode a commit as newline-separated header lines, a blank line, then
/// the message verbatim (no escaping; the message is the remainder of the
/// buffer).
fn encode_commit_body(commit: &Commit) -> Vec<u8> {
    let mut text = String::new();
    text.push_str("tree ");
    text.push_str(&commit.tree.to_hex());
    text.push('\n');
    if let Some(parent) = &commit.parent {
        text.push_str("parent ");
        text.push_str(&parent.to_hex());
        text.push('\n');
    }
    text.push_str("author ");
    text.push_str(&commit.author);
    text.push('\n');
    text.push_str("timestamp ");
    text.push_str(&commit.timestamp);
    text.push('\n');
    text.push('\n');
    text.push_str(&commit.message);
    text.into_bytes()
}

fn decode_commit_body(id: ObjectId, body: &[u8]) -> StoreResult<Commit> {
    let corrupt = |reason: String| StoreError::CorruptObject { id, reason };

    let text = std::str::from_utf8(body)
        .map_err(|_| corrupt("commit body is not valid UTF-8".into()))?;
    let (header, message) = text
        .split_once("\n\n")
        .ok_or_else(|| corrupt("commit missing blank-line separator".into()))?;

    let mut tree = None;
    let mut parent = None;
    let mut author = String::new();
    let mut timestamp = String::new();

    for line in header.lines() {
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("malformed commit header line: {line:?}")))?;
        match key {
            "tree" => {
                tree = Some(
                    ObjectId::from_hex(value)
                        .map_err(|e| corrupt(format!("bad tree hash: {e}")))?,
                )
            }
            "parent" => {
                parent = Some(
                    ObjectId::from_hex(value)
                        .map_err(|e| corrupt(format!("bad parent hash: {e}")))?,
                )
            }
            "author" => author = value.to_string(),
            "timestamp" => timestamp = value.to_string(),
            // Unknown header lines are preserved-by-skip: readable stores
            // written by newer versions stay readable.
            _ => {}
        }
    }

    let tree = tree.ok_or_else(|| corrupt("commit missing tree line".into()))?;
    Ok(Commit {
        tree,
        parent,
        author,
        timestamp,
        message: message.to_string(),
    })
}
