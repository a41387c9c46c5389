//! Volume trait for abstracting file system access.
//!
//! The engine never calls `std::fs` directly. Every disk touch goes through a `Volume`, so the
//! same engine runs against the real file system (`LocalVolume`) and against an in-memory tree
//! with injectable failures (`InMemoryVolume`).
//!
//! All paths are absolute. Implementations are synchronous and blocking and report success or
//! failure per call; the engine assumes no atomicity across calls.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of a directory entry as seen by the volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Error type for volume operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// Path not found
    NotFound(String),
    /// Permission denied
    PermissionDenied(String),
    /// Path already exists
    AlreadyExists(String),
    /// Directory still has entries
    NotEmpty(String),
    /// Source and destination are on different file systems, so a plain rename can't do it
    CrossesDevices(String),
    /// Operation not supported by this volume type
    NotSupported,
    /// Generic I/O error
    IoError(String),
}

impl std::fmt::Display for VolumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Path not found: {}", path),
            Self::PermissionDenied(path) => write!(f, "Permission denied: {}", path),
            Self::AlreadyExists(path) => write!(f, "Already exists: {}", path),
            Self::NotEmpty(path) => write!(f, "Directory not empty: {}", path),
            Self::CrossesDevices(path) => write!(f, "Can't rename across file systems: {}", path),
            Self::NotSupported => write!(f, "Operation not supported"),
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for VolumeError {}

impl From<std::io::Error> for VolumeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(err.to_string()),
            std::io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(err.to_string()),
            std::io::ErrorKind::CrossesDevices => Self::CrossesDevices(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Trait for volume file system operations.
///
/// Implementations provide access to different storage backends:
/// - `LocalVolume`: Real local file system
/// - `InMemoryVolume`: In-memory file system for testing
pub trait Volume: Send + Sync {
    /// Returns the display name for this volume.
    fn name(&self) -> &str;

    /// Lists directory contents in listing order: directories first, then files, each group in
    /// natural name order.
    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>, VolumeError>;

    /// Returns the kind of entry at `path`, or `NotFound`.
    fn entry_kind(&self, path: &Path) -> Result<EntryKind, VolumeError>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.entry_kind(path).is_ok()
    }

    /// Checks if a path is a directory.
    fn is_directory(&self, path: &Path) -> bool {
        matches!(self.entry_kind(path), Ok(EntryKind::Directory))
    }

    /// Moves (renames) a file or directory. Fails with `AlreadyExists` if `to` is taken and with
    /// `CrossesDevices` if `from` and `to` are on different file systems; the engine then copies
    /// and deletes instead.
    fn move_entry(&self, from: &Path, to: &Path) -> Result<(), VolumeError>;

    /// Copies a single file. Recursion is the caller's job. Fails with `AlreadyExists` if `to`
    /// is taken.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), VolumeError>;

    /// Creates one directory. The parent must exist.
    fn create_directory(&self, path: &Path) -> Result<(), VolumeError>;

    /// Deletes a file or an empty directory.
    fn delete_entry(&self, path: &Path) -> Result<(), VolumeError>;
}

/// Sorts a listing into the order the mirror uses for children: directories first, then files,
/// natural case-insensitive name order within each group ("track 2" before "track 10").
pub fn sort_listing(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| listing_order(&a.name, a.is_directory(), &b.name, b.is_directory()));
}

/// The comparison behind `sort_listing`, for callers that keep their own sorted sequences.
pub fn listing_order(a_name: &str, a_is_dir: bool, b_name: &str, b_is_dir: bool) -> std::cmp::Ordering {
    match (a_is_dir, b_is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => alphanumeric_sort::compare_str(a_name.to_lowercase(), b_name.to_lowercase()),
    }
}

// Implementations
mod in_memory;
mod local;

pub use in_memory::{InMemoryVolume, VolumeCall, VolumeOp};
pub use local::LocalVolume;
