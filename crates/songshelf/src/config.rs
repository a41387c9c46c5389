//! Shelf configuration.
//!
//! Loading settings from disk is the host's job; this is only the typed shape with defaults.

use crate::volume::EntryKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_song_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_max_collision_rounds() -> usize {
    8
}

/// Configuration shared by the registry scan and the mutation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShelfConfig {
    /// File extensions (case-insensitive, no dot) that become songs (default: mp3).
    /// An empty list accepts every regular file.
    #[serde(default = "default_song_extensions")]
    pub song_extensions: Vec<String>,
    /// Whether entries starting with a dot are mirrored (default: false)
    #[serde(default)]
    pub include_hidden: bool,
    /// How many times a resolver may suggest a name that was already found taken before the
    /// call gives up. New names are always tried, however many there are.
    #[serde(default = "default_max_collision_rounds")]
    pub max_collision_rounds: usize,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            song_extensions: default_song_extensions(),
            include_hidden: false,
            max_collision_rounds: default_max_collision_rounds(),
        }
    }
}

impl ShelfConfig {
    /// Whether a directory entry belongs in the mirror.
    ///
    /// Folders are always mirrored (unless hidden), files only when their extension is a song
    /// extension.
    pub fn accepts(&self, path: &Path, kind: EntryKind) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if !self.include_hidden && name.starts_with('.') {
            return false;
        }
        match kind {
            EntryKind::Directory => true,
            EntryKind::File => self.is_song_file(path),
        }
    }

    /// Whether the file name at `path` has a song extension.
    pub fn is_song_file(&self, path: &Path) -> bool {
        if self.song_extensions.is_empty() {
            return true;
        }
        match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            Some(ext) => self.song_extensions.iter().any(|s| s.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}
