//! Local file system volume implementation.

use super::{DirEntry, EntryKind, Volume, VolumeError, sort_listing};
use std::fs;
use std::path::Path;

/// A volume backed by the local file system.
///
/// Symlinks are reported by their own type (never followed), so a symlinked folder shows up as
/// a file entry and deleting it removes the link, not the target.
pub struct LocalVolume {
    name: String,
}

impl LocalVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LocalVolume {
    fn default() -> Self {
        Self::new("Local")
    }
}

fn kind_of(metadata: &fs::Metadata) -> EntryKind {
    if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

/// Maps an I/O error to a `VolumeError` that names the offending path.
fn io_error(path: &Path, err: std::io::Error) -> VolumeError {
    let path = path.display().to_string();
    match err.kind() {
        std::io::ErrorKind::NotFound => VolumeError::NotFound(path),
        std::io::ErrorKind::PermissionDenied => VolumeError::PermissionDenied(path),
        std::io::ErrorKind::AlreadyExists => VolumeError::AlreadyExists(path),
        std::io::ErrorKind::DirectoryNotEmpty => VolumeError::NotEmpty(path),
        std::io::ErrorKind::CrossesDevices => VolumeError::CrossesDevices(path),
        _ => VolumeError::IoError(format!("{}: {}", path, err)),
    }
}

impl Volume for LocalVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>, VolumeError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| io_error(path, e))? {
            let entry = entry.map_err(|e| io_error(path, e))?;
            // Entries can vanish between readdir and stat; skip those
            let Ok(metadata) = fs::symlink_metadata(entry.path()) else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path(),
                kind: kind_of(&metadata),
            });
        }
        sort_listing(&mut entries);
        Ok(entries)
    }

    fn entry_kind(&self, path: &Path) -> Result<EntryKind, VolumeError> {
        // symlink_metadata so broken symlinks still count as existing
        let metadata = fs::symlink_metadata(path).map_err(|e| io_error(path, e))?;
        Ok(kind_of(&metadata))
    }

    fn move_entry(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        // rename() silently replaces files on POSIX, so guard the destination ourselves
        if fs::symlink_metadata(to).is_ok() {
            return Err(VolumeError::AlreadyExists(to.display().to_string()));
        }
        fs::rename(from, to).map_err(|e| io_error(from, e))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        if fs::symlink_metadata(to).is_ok() {
            return Err(VolumeError::AlreadyExists(to.display().to_string()));
        }
        fs::copy(from, to).map_err(|e| io_error(from, e))?;
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> Result<(), VolumeError> {
        fs::create_dir(path).map_err(|e| io_error(path, e))
    }

    fn delete_entry(&self, path: &Path) -> Result<(), VolumeError> {
        let metadata = fs::symlink_metadata(path).map_err(|e| io_error(path, e))?;
        if metadata.is_dir() {
            fs::remove_dir(path).map_err(|e| io_error(path, e))
        } else {
            fs::remove_file(path).map_err(|e| io_error(path, e))
        }
    }
}
