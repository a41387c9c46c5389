//! Song metadata collaborator.
//!
//! Tag parsing lives outside this crate. The mirror only needs to read a song's tags once (on
//! first access) and write them through on every edit, so the seam is a small trait.

use crate::ignore_poison::IgnorePoisonRw;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Highest star rating.
pub const MAX_RATING: u8 = 5;

/// Tag fields the library shows for a song.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SongTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    /// Star rating, 0 to 5
    pub rating: u8,
}

/// A partial tag edit. `None` fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TagUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl TagUpdate {
    /// Rejects ratings outside 0..=5.
    pub fn validate(&self) -> Result<(), MetadataError> {
        match self.rating {
            Some(rating) if rating > MAX_RATING => Err(MetadataError::InvalidRating { value: rating }),
            _ => Ok(()),
        }
    }

    /// Returns `tags` with this update applied.
    pub fn apply_to(&self, tags: &SongTags) -> SongTags {
        SongTags {
            title: self.title.clone().unwrap_or_else(|| tags.title.clone()),
            artist: self.artist.clone().unwrap_or_else(|| tags.artist.clone()),
            album: self.album.clone().unwrap_or_else(|| tags.album.clone()),
            genre: self.genre.clone().unwrap_or_else(|| tags.genre.clone()),
            rating: self.rating.unwrap_or(tags.rating),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.genre.is_none()
            && self.rating.is_none()
    }
}

/// Metadata failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataError {
    /// The provider can't read tags for this file.
    Unavailable { path: String },
    /// Rating outside the 0 to 5 star range.
    InvalidRating { value: u8 },
    /// Writing tags back to the file failed.
    WriteFailed { path: String, message: String },
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { path } => write!(f, "No metadata available for {}", path),
            Self::InvalidRating { value } => {
                write!(f, "Rating must be between 0 and {}, got {}", MAX_RATING, value)
            }
            Self::WriteFailed { path, message } => write!(f, "Couldn't write tags to {}: {}", path, message),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Reads and writes song tags.
pub trait MetadataProvider: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<SongTags, MetadataError>;
    fn write_tags(&self, path: &Path, tags: &SongTags) -> Result<(), MetadataError>;
}

/// Provider for hosts without a tag library. Every read and write is `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn read_tags(&self, path: &Path) -> Result<SongTags, MetadataError> {
        Err(MetadataError::Unavailable {
            path: path.display().to_string(),
        })
    }

    fn write_tags(&self, path: &Path, _tags: &SongTags) -> Result<(), MetadataError> {
        Err(MetadataError::Unavailable {
            path: path.display().to_string(),
        })
    }
}

/// Provider keeping tags in a map keyed by path. Files with no entry read as empty tags.
#[derive(Default)]
pub struct InMemoryMetadata {
    tags: RwLock<HashMap<PathBuf, SongTags>>,
    reads: RwLock<usize>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<PathBuf>, tags: SongTags) {
        self.tags.write_ignore_poison().insert(path.into(), tags);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<SongTags> {
        self.tags.read_ignore_poison().get(path.as_ref()).cloned()
    }

    /// Number of `read_tags` calls so far.
    pub fn read_count(&self) -> usize {
        *self.reads.read_ignore_poison()
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn read_tags(&self, path: &Path) -> Result<SongTags, MetadataError> {
        *self.reads.write_ignore_poison() += 1;
        Ok(self.get(path).unwrap_or_default())
    }

    fn write_tags(&self, path: &Path, tags: &SongTags) -> Result<(), MetadataError> {
        if tags.rating > MAX_RATING {
            return Err(MetadataError::InvalidRating { value: tags.rating });
        }
        self.set(path, tags.clone());
        Ok(())
    }
}

/// Converts a 0 to 5 star rating to the 0 to 255 popularimeter scale tag formats store.
pub fn rating_to_popularimeter(stars: u8) -> Result<u8, MetadataError> {
    match stars {
        0 => Ok(0),
        1 => Ok(1),
        2 => Ok(64),
        3 => Ok(128),
        4 => Ok(196),
        5 => Ok(255),
        value => Err(MetadataError::InvalidRating { value }),
    }
}

/// Converts a popularimeter value back to stars.
///
/// Follows the bands media players write, including the low values some players use for
/// one star and the odd 29 that one of them writes for two.
pub fn rating_from_popularimeter(value: u8) -> u8 {
    match value {
        0 => 0,
        1 => 1,
        2..=8 => 0,
        9..=28 => 1,
        29 => 2,
        30..=49 => 1,
        50..=113 => 2,
        114..=167 => 3,
        168..=218 => 4,
        _ => 5,
    }
}
