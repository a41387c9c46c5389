//! Tree node types.

use crate::metadata::SongTags;
use crate::volume::EntryKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Handle of a node in a `FileTreeMirror` arena.
///
/// Valid until the node is removed. Slots are reused afterwards, so don't hold on to an id
/// across a mutation that may have removed it; look the path up again instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// The two node variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Folder,
    Song,
}

impl From<EntryKind> for ItemKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => ItemKind::Folder,
            EntryKind::File => ItemKind::Song,
        }
    }
}

/// Lightweight description of a node, used in events and query results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub path: PathBuf,
    pub kind: ItemKind,
}

#[derive(Debug, Clone)]
pub(crate) enum ItemData {
    Folder { children: Vec<NodeId> },
    /// Tags stay `None` until first asked for
    Song { tags: Option<SongTags> },
}

/// One node of the mirror: a folder with ordered children, or a song leaf.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: ItemData,
}

impl Item {
    pub(crate) fn new(path: PathBuf, name: String, parent: Option<NodeId>, kind: ItemKind) -> Self {
        let data = match kind {
            ItemKind::Folder => ItemData::Folder { children: Vec::new() },
            ItemKind::Song => ItemData::Song { tags: None },
        };
        Self {
            path,
            name,
            parent,
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Back-reference to the parent folder. `None` for the library root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> ItemKind {
        match self.data {
            ItemData::Folder { .. } => ItemKind::Folder,
            ItemData::Song { .. } => ItemKind::Song,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == ItemKind::Folder
    }

    pub fn is_song(&self) -> bool {
        self.kind() == ItemKind::Song
    }

    /// Children in listing order. Always empty for songs.
    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            ItemData::Folder { children } => children,
            ItemData::Song { .. } => &[],
        }
    }

    /// Tags if they were already loaded.
    pub fn cached_tags(&self) -> Option<&SongTags> {
        match &self.data {
            ItemData::Song { tags } => tags.as_ref(),
            ItemData::Folder { .. } => None,
        }
    }

    pub fn to_ref(&self) -> ItemRef {
        ItemRef {
            path: self.path.clone(),
            kind: self.kind(),
        }
    }
}
