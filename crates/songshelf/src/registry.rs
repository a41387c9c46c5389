//! The set of registered libraries.
//!
//! Each library sits behind its own mutex so calls on different libraries run in parallel while
//! calls on the same library queue. Root paths are kept outside those mutexes so routing a path
//! to its library never waits on a running operation.

use crate::config::ShelfConfig;
use crate::tree::{FileTreeMirror, MirrorError, ScanReport};
use crate::validation::{ValidationError, display_name, normalize_path};
use crate::volume::{EntryKind, Volume, VolumeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Identifier of a registered library. Never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryId(u64);

impl std::fmt::Display for LibraryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "library-{}", self.0)
    }
}

/// A registered root folder and its mirror.
#[derive(Debug)]
pub struct Library {
    id: LibraryId,
    name: String,
    pub(crate) mirror: FileTreeMirror,
    pub(crate) last_scan: ScanReport,
}

impl Library {
    pub fn id(&self) -> LibraryId {
        self.id
    }

    /// Display name: the root folder's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        self.mirror.root_path()
    }

    pub fn mirror(&self) -> &FileTreeMirror {
        &self.mirror
    }

    /// Outcome of the scan that built the current mirror. Not updated by mutations.
    pub fn last_scan(&self) -> &ScanReport {
        &self.last_scan
    }
}

/// Maps a failed root scan to the validation error reported by `add_library`.
pub(crate) fn scan_error(root: &Path, err: MirrorError) -> ValidationError {
    match err {
        MirrorError::Scan {
            error: VolumeError::NotFound(_),
            ..
        } => ValidationError::NotFound {
            path: root.display().to_string(),
        },
        other => ValidationError::Unreadable {
            path: root.display().to_string(),
            message: other.to_string(),
        },
    }
}

/// Owns the libraries and enforces that no root equals or contains another.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    roots: BTreeMap<LibraryId, PathBuf>,
    libraries: BTreeMap<LibraryId, Arc<Mutex<Library>>>,
    next_id: u64,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `path` can become a library root. Returns the normalized root.
    pub fn validate_new_root(&self, volume: &dyn Volume, path: &Path) -> Result<PathBuf, ValidationError> {
        let root = normalize_path(path).ok_or_else(|| ValidationError::NotFound {
            path: path.display().to_string(),
        })?;
        match volume.entry_kind(&root) {
            Ok(EntryKind::Directory) => {}
            Ok(EntryKind::File) => {
                return Err(ValidationError::NotADirectory {
                    path: root.display().to_string(),
                });
            }
            Err(_) => {
                return Err(ValidationError::NotFound {
                    path: root.display().to_string(),
                });
            }
        }

        for existing in self.roots.values() {
            if *existing == root {
                return Err(ValidationError::AlreadyRegistered {
                    path: root.display().to_string(),
                });
            }
            // Component-wise, so /music2 doesn't count as being inside /music
            if root.starts_with(existing) || existing.starts_with(&root) {
                return Err(ValidationError::LibraryNesting {
                    path: root.display().to_string(),
                    existing: existing.display().to_string(),
                });
            }
        }
        Ok(root)
    }

    /// Registers an already scanned mirror. The caller must have validated its root.
    pub fn insert(&mut self, mirror: FileTreeMirror, last_scan: ScanReport) -> (LibraryId, Arc<Mutex<Library>>) {
        self.next_id += 1;
        let id = LibraryId(self.next_id);
        let root = mirror.root_path().to_path_buf();
        let library = Arc::new(Mutex::new(Library {
            id,
            name: display_name(&root),
            mirror,
            last_scan,
        }));
        log::info!("Registered {} at {}", id, root.display());
        self.roots.insert(id, root);
        self.libraries.insert(id, library.clone());
        (id, library)
    }

    /// Validates, scans depth-first and registers `path` in one step.
    pub fn add_library(
        &mut self,
        volume: &dyn Volume,
        config: &ShelfConfig,
        path: &Path,
    ) -> Result<LibraryId, ValidationError> {
        let root = self.validate_new_root(volume, path)?;
        let (mirror, report) =
            FileTreeMirror::scan_with_report(volume, &root, config).map_err(|e| scan_error(&root, e))?;
        Ok(self.insert(mirror, report).0)
    }

    /// Forgets a library. Never touches disk.
    pub fn remove_library(&mut self, id: LibraryId) -> Option<Arc<Mutex<Library>>> {
        let root = self.roots.remove(&id)?;
        log::info!("Unregistered {} at {}", id, root.display());
        self.libraries.remove(&id)
    }

    /// The library whose root is `path` or one of its ancestors.
    pub fn find_library_containing(&self, path: &Path) -> Option<LibraryId> {
        let path = normalize_path(path)?;
        self.roots
            .iter()
            .find(|(_, root)| path.starts_with(root))
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: LibraryId) -> Option<Arc<Mutex<Library>>> {
        self.libraries.get(&id).cloned()
    }

    pub fn library_ids(&self) -> Vec<LibraryId> {
        self.roots.keys().copied().collect()
    }

    pub fn library_root(&self, id: LibraryId) -> Option<&Path> {
        self.roots.get(&id).map(PathBuf::as_path)
    }

    pub fn is_library_root(&self, path: &Path) -> bool {
        match normalize_path(path) {
            Some(path) => self.roots.values().any(|root| *root == path),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
