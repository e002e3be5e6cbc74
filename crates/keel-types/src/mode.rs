use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
}

impl EntryMode {
    /// Octal mode value (for display/serialization).
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Result<Self, TypeError> {
        match bits {
            0o100644 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o040000 => Ok(Self::Directory),
            other => Err(TypeError::UnknownMode(other)),
        }
    }

    /// Leniently classify arbitrary on-disk mode bits.
    ///
    /// Used when decoding tree records written by older stores that carried
    /// raw POSIX bits rather than the four canonical values. File-type bits
    /// win; any owner-executable regular file maps to `Executable`.
    pub fn classify(bits: u32) -> Self {
        match bits & 0o170000 {
            0o040000 => Self::Directory,
            0o120000 => Self::Symlink,
            _ if bits & 0o100 != 0 => Self::Executable,
            _ => Self::Regular,
        }
    }

    /// Classify a mode from on-disk POSIX permission bits.
    ///
    /// Any owner-executable regular file maps to `Executable`; everything
    /// else that is a regular file maps to `Regular`.
    pub fn from_posix(is_dir: bool, is_symlink: bool, permissions: u32) -> Self {
        if is_dir {
            Self::Directory
        } else if is_symlink {
            Self::Symlink
        } else if permissions & 0o100 != 0 {
            Self::Executable
        } else {
            Self::Regular
        }
    }

    /// Returns `true` for the directory mode.
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}
