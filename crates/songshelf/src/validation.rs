//! Name and path validation.
//!
//! Everything in here runs before the first byte on disk changes: a `ValidationError` always
//! means the call had zero side effects.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Maximum file name length in bytes (ext4/APFS limit).
pub const MAX_NAME_BYTES: usize = 255;

/// Characters rejected in item names. The set is the union of what the common desktop
/// filesystems refuse, so a library stays portable between machines.
pub const ILLEGAL_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Validation failures, surfaced synchronously.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationError {
    /// The item already lives in the destination folder.
    SameLocation { path: String },
    /// A folder can't be moved or copied into itself or one of its descendants.
    SelfContainment { source: String, destination: String },
    /// Name contains a disallowed character.
    IllegalName { name: String, character: String },
    /// Name is empty or whitespace-only.
    EmptyName,
    /// Name exceeds the maximum byte length for a single path component.
    NameTooLong { bytes: usize, max: usize },
    /// New library would contain, or be contained by, an existing one.
    LibraryNesting { path: String, existing: String },
    /// The exact same root is already registered.
    AlreadyRegistered { path: String },
    /// Path is not in the mirror or not on disk.
    NotFound { path: String },
    /// Path exists but is not a directory.
    NotADirectory { path: String },
    /// Library roots can't be moved, renamed or deleted through the engine.
    LibraryRoot { path: String },
    /// Path is not inside any registered library.
    OutsideLibrary { path: String },
    /// Tag access on something that isn't a song.
    NotASong { path: String },
    /// A new library root exists but can't be listed.
    Unreadable { path: String, message: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameLocation { path } => write!(f, "\"{}\" is already in this location", path),
            Self::SelfContainment { source, destination } => {
                write!(f, "Can't put \"{}\" inside itself (\"{}\")", source, destination)
            }
            Self::IllegalName { name, character } => {
                write!(f, "\"{}\" contains a disallowed character: {}", name, character)
            }
            Self::EmptyName => write!(f, "Name can't be empty"),
            Self::NameTooLong { bytes, max } => {
                write!(f, "Name is {} bytes, which exceeds the {} byte limit", bytes, max)
            }
            Self::LibraryNesting { path, existing } => {
                write!(f, "\"{}\" overlaps with the existing library \"{}\"", path, existing)
            }
            Self::AlreadyRegistered { path } => write!(f, "\"{}\" is already a library", path),
            Self::NotFound { path } => write!(f, "Can't find \"{}\"", path),
            Self::NotADirectory { path } => write!(f, "\"{}\" is not a folder", path),
            Self::LibraryRoot { path } => write!(f, "\"{}\" is a library root", path),
            Self::OutsideLibrary { path } => write!(f, "\"{}\" is not inside any library", path),
            Self::NotASong { path } => write!(f, "\"{}\" is not a song", path),
            Self::Unreadable { path, message } => write!(f, "Can't read \"{}\": {}", path, message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a new item name (rename target or collision replacement name).
///
/// The input is checked as-is; callers trim if they want to.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    for ch in name.chars() {
        if ILLEGAL_NAME_CHARS.contains(&ch) {
            return Err(ValidationError::IllegalName {
                name: name.to_string(),
                character: ch.to_string(),
            });
        }
        if ch == '\0' {
            return Err(ValidationError::IllegalName {
                name: name.to_string(),
                character: "NUL".to_string(),
            });
        }
    }

    // "." and ".." would resolve to a different directory entirely
    if name == "." || name == ".." {
        return Err(ValidationError::IllegalName {
            name: name.to_string(),
            character: ".".to_string(),
        });
    }

    let byte_len = name.len();
    if byte_len >= MAX_NAME_BYTES {
        return Err(ValidationError::NameTooLong {
            bytes: byte_len,
            max: MAX_NAME_BYTES,
        });
    }

    Ok(())
}

/// Returns true if `name` would pass `validate_name`.
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// Lexically normalizes an absolute path: drops `.` components and folds `..` into the parent.
///
/// Symlinks are not resolved. Returns `None` for relative paths.
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}

/// Display name of a path: its last component, or the full path for a filesystem root.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
