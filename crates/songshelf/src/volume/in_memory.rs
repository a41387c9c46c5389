//! In-memory volume for tests.
//!
//! Holds a flat map of absolute paths to entries and supports fault injection: any operation on
//! any path can be made to fail with a chosen `VolumeError`. Every mutating call is journaled so
//! tests can assert what the engine did (and did not) attempt.

use super::{DirEntry, EntryKind, Volume, VolumeError, sort_listing};
use crate::ignore_poison::IgnorePoisonRw;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Operation kinds that can be faulted and that show up in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeOp {
    List,
    Move,
    Copy,
    CreateDirectory,
    Delete,
}

/// One journaled mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCall {
    pub op: VolumeOp,
    pub path: PathBuf,
    /// Destination for moves and copies
    pub target: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Fault {
    op: VolumeOp,
    path: PathBuf,
    error: VolumeError,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    content: Vec<u8>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<PathBuf, Entry>,
    faults: Vec<Fault>,
    journal: Vec<VolumeCall>,
}

/// A volume that lives entirely in memory.
pub struct InMemoryVolume {
    name: String,
    state: RwLock<State>,
}

impl InMemoryVolume {
    /// Creates an empty volume containing only the `/` directory.
    pub fn new(name: impl Into<String>) -> Self {
        let mut state = State::default();
        state.entries.insert(
            PathBuf::from("/"),
            Entry {
                kind: EntryKind::Directory,
                content: Vec::new(),
            },
        );
        Self {
            name: name.into(),
            state: RwLock::new(state),
        }
    }

    /// Adds a directory and any missing ancestors. Setup helper, not journaled.
    pub fn add_directory(&self, path: impl AsRef<Path>) -> &Self {
        let mut state = self.state.write_ignore_poison();
        for ancestor in path.as_ref().ancestors() {
            state.entries.entry(ancestor.to_path_buf()).or_insert(Entry {
                kind: EntryKind::Directory,
                content: Vec::new(),
            });
        }
        self
    }

    /// Adds a file (and any missing ancestor directories). Setup helper, not journaled.
    pub fn add_file(&self, path: impl AsRef<Path>, content: &[u8]) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_directory(parent);
        }
        self.state.write_ignore_poison().entries.insert(
            path.to_path_buf(),
            Entry {
                kind: EntryKind::File,
                content: content.to_vec(),
            },
        );
        self
    }

    /// Makes every future `op` on exactly `path` fail with `error`.
    pub fn fail_on(&self, op: VolumeOp, path: impl AsRef<Path>, error: VolumeError) -> &Self {
        self.state.write_ignore_poison().faults.push(Fault {
            op,
            path: path.as_ref().to_path_buf(),
            error,
        });
        self
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.state.write_ignore_poison().faults.clear();
    }

    /// Returns file content, or None if `path` is missing or a directory.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.state.read_ignore_poison();
        match state.entries.get(path.as_ref()) {
            Some(entry) if entry.kind == EntryKind::File => Some(entry.content.clone()),
            _ => None,
        }
    }

    /// All paths at or below `root`, in sorted order.
    pub fn paths_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.state
            .read_ignore_poison()
            .entries
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect()
    }

    /// Mutating calls made so far, in order. Includes calls that failed.
    pub fn journal(&self) -> Vec<VolumeCall> {
        self.state.read_ignore_poison().journal.clone()
    }

    /// Whether a mutating `op` was ever attempted on `path`.
    pub fn was_attempted(&self, op: VolumeOp, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.state
            .read_ignore_poison()
            .journal
            .iter()
            .any(|call| call.op == op && call.path == path)
    }

    fn check_fault(state: &State, op: VolumeOp, path: &Path) -> Result<(), VolumeError> {
        match state.faults.iter().find(|f| f.op == op && f.path == path) {
            Some(fault) => Err(fault.error.clone()),
            None => Ok(()),
        }
    }

    fn record(state: &mut State, op: VolumeOp, path: &Path, target: Option<&Path>) {
        state.journal.push(VolumeCall {
            op,
            path: path.to_path_buf(),
            target: target.map(Path::to_path_buf),
        });
    }

    fn require_parent_dir(state: &State, path: &Path) -> Result<(), VolumeError> {
        let parent = path
            .parent()
            .ok_or_else(|| VolumeError::IoError(format!("{} has no parent", path.display())))?;
        match state.entries.get(parent) {
            Some(entry) if entry.kind == EntryKind::Directory => Ok(()),
            Some(_) => Err(VolumeError::IoError(format!("{} is not a directory", parent.display()))),
            None => Err(VolumeError::NotFound(parent.display().to_string())),
        }
    }
}

impl Volume for InMemoryVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>, VolumeError> {
        let state = self.state.read_ignore_poison();
        Self::check_fault(&state, VolumeOp::List, path)?;
        match state.entries.get(path) {
            Some(entry) if entry.kind == EntryKind::Directory => {}
            Some(_) => return Err(VolumeError::IoError(format!("{} is not a directory", path.display()))),
            None => return Err(VolumeError::NotFound(path.display().to_string())),
        }

        let mut entries: Vec<DirEntry> = state
            .entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, entry)| DirEntry {
                name: p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: p.clone(),
                kind: entry.kind,
            })
            .collect();
        sort_listing(&mut entries);
        Ok(entries)
    }

    fn entry_kind(&self, path: &Path) -> Result<EntryKind, VolumeError> {
        self.state
            .read_ignore_poison()
            .entries
            .get(path)
            .map(|e| e.kind)
            .ok_or_else(|| VolumeError::NotFound(path.display().to_string()))
    }

    fn move_entry(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        let mut state = self.state.write_ignore_poison();
        Self::record(&mut state, VolumeOp::Move, from, Some(to));
        Self::check_fault(&state, VolumeOp::Move, from)?;

        if !state.entries.contains_key(from) {
            return Err(VolumeError::NotFound(from.display().to_string()));
        }
        if state.entries.contains_key(to) {
            return Err(VolumeError::AlreadyExists(to.display().to_string()));
        }
        if to.starts_with(from) {
            return Err(VolumeError::IoError(format!(
                "can't move {} into itself",
                from.display()
            )));
        }
        Self::require_parent_dir(&state, to)?;

        let moved: Vec<PathBuf> = state.entries.keys().filter(|p| p.starts_with(from)).cloned().collect();
        for old_path in moved {
            if let Some(entry) = state.entries.remove(&old_path) {
                let new_path = match old_path.strip_prefix(from) {
                    Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                    Ok(rest) => to.join(rest),
                    Err(_) => continue,
                };
                state.entries.insert(new_path, entry);
            }
        }
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        let mut state = self.state.write_ignore_poison();
        Self::record(&mut state, VolumeOp::Copy, from, Some(to));
        Self::check_fault(&state, VolumeOp::Copy, from)?;

        let content = match state.entries.get(from) {
            Some(entry) if entry.kind == EntryKind::File => entry.content.clone(),
            Some(_) => return Err(VolumeError::IoError(format!("{} is a directory", from.display()))),
            None => return Err(VolumeError::NotFound(from.display().to_string())),
        };
        if state.entries.contains_key(to) {
            return Err(VolumeError::AlreadyExists(to.display().to_string()));
        }
        Self::require_parent_dir(&state, to)?;

        state.entries.insert(
            to.to_path_buf(),
            Entry {
                kind: EntryKind::File,
                content,
            },
        );
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> Result<(), VolumeError> {
        let mut state = self.state.write_ignore_poison();
        Self::record(&mut state, VolumeOp::CreateDirectory, path, None);
        Self::check_fault(&state, VolumeOp::CreateDirectory, path)?;

        if state.entries.contains_key(path) {
            return Err(VolumeError::AlreadyExists(path.display().to_string()));
        }
        Self::require_parent_dir(&state, path)?;
        state.entries.insert(
            path.to_path_buf(),
            Entry {
                kind: EntryKind::Directory,
                content: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_entry(&self, path: &Path) -> Result<(), VolumeError> {
        let mut state = self.state.write_ignore_poison();
        Self::record(&mut state, VolumeOp::Delete, path, None);
        Self::check_fault(&state, VolumeOp::Delete, path)?;

        let kind = state
            .entries
            .get(path)
            .map(|e| e.kind)
            .ok_or_else(|| VolumeError::NotFound(path.display().to_string()))?;
        if kind == EntryKind::Directory && state.entries.keys().any(|p| p.parent() == Some(path)) {
            return Err(VolumeError::NotEmpty(path.display().to_string()));
        }
        state.entries.remove(path);
        Ok(())
    }
}
