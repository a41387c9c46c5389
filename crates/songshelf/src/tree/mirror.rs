//! In-memory mirror of one library's directory tree.
//!
//! Nodes live in an arena (`Vec<Option<Item>>`) addressed by `NodeId`. Folders own their
//! children as id lists, each node keeps a plain back-index to its parent, and a path index
//! gives O(1) lookups. Every traversal uses an explicit stack, so folder depth never turns into
//! call-stack depth.
//!
//! The mirror only does structural edits. It never touches disk except to scan, and it never
//! emits events; the mutation engine decides when an edit is warranted.

use super::item::{Item, ItemData, ItemKind, ItemRef, NodeId};
use crate::config::ShelfConfig;
use crate::metadata::SongTags;
use crate::validation::display_name;
use crate::volume::{EntryKind, Volume, VolumeError, listing_order};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Structural edit failures. These mean the caller asked for something the tree can't do, not
/// that the disk misbehaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// The node id is stale or was never issued by this mirror.
    UnknownNode,
    /// No node at this path.
    NotInMirror { path: PathBuf },
    /// Expected a folder.
    NotAFolder { path: PathBuf },
    /// The new parent is inside the subtree being moved.
    WouldCycle { path: PathBuf },
    /// The root can't be removed, moved or renamed.
    RootNode,
    /// Another node already has this path.
    PathOccupied { path: PathBuf },
    /// Listing a directory failed while scanning.
    Scan { path: PathBuf, error: VolumeError },
}

impl std::fmt::Display for MirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode => write!(f, "Unknown node"),
            Self::NotInMirror { path } => write!(f, "{} is not in the library tree", path.display()),
            Self::NotAFolder { path } => write!(f, "{} is not a folder", path.display()),
            Self::WouldCycle { path } => write!(f, "Can't move a folder into itself: {}", path.display()),
            Self::RootNode => write!(f, "The library root can't be changed"),
            Self::PathOccupied { path } => write!(f, "{} is already in the library tree", path.display()),
            Self::Scan { path, error } => write!(f, "Couldn't scan {}: {}", path.display(), error),
        }
    }
}

impl std::error::Error for MirrorError {}

#[derive(Debug, Clone)]
struct DetachedEntry {
    /// Relative to the subtree root; empty for the root itself
    relative: PathBuf,
    kind: ItemKind,
    tags: Option<SongTags>,
}

/// A subtree cut out of one mirror, ready to be grafted into another. Entries are in pre-order.
#[derive(Debug, Clone)]
pub struct DetachedSubtree {
    entries: Vec<DetachedEntry>,
}

impl DetachedSubtree {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn song_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == ItemKind::Song).count()
    }
}

/// What a full scan found.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub nodes: usize,
    pub songs: usize,
    /// Subfolders that couldn't be listed. They're in the mirror, but empty.
    pub unreadable: Vec<PathBuf>,
}

/// The tree of one library.
#[derive(Debug, Clone)]
pub struct FileTreeMirror {
    root: NodeId,
    nodes: Vec<Option<Item>>,
    free: Vec<usize>,
    index: HashMap<PathBuf, NodeId>,
    songs: usize,
}

impl FileTreeMirror {
    /// A mirror holding only the root folder.
    pub fn new(root_path: PathBuf) -> Self {
        let name = display_name(&root_path);
        let mut mirror = Self {
            root: NodeId(0),
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            songs: 0,
        };
        mirror.root = mirror.alloc(Item::new(root_path, name, None, ItemKind::Folder));
        mirror
    }

    /// Builds a mirror by scanning `root_path` depth-first, pre-order.
    ///
    /// Fails only if the root itself can't be listed. Subfolders that can't be listed are logged
    /// and mirrored as empty.
    pub fn scan(volume: &dyn Volume, root_path: &Path, config: &ShelfConfig) -> Result<Self, MirrorError> {
        Self::scan_with_report(volume, root_path, config).map(|(mirror, _)| mirror)
    }

    /// `scan`, plus which subfolders couldn't be read.
    pub fn scan_with_report(
        volume: &dyn Volume,
        root_path: &Path,
        config: &ShelfConfig,
    ) -> Result<(Self, ScanReport), MirrorError> {
        let mut mirror = Self::new(root_path.to_path_buf());
        let root = mirror.root;
        let unreadable = mirror.fill_from_disk(volume, config, root)?;
        let report = ScanReport {
            nodes: mirror.len(),
            songs: mirror.song_count(),
            unreadable,
        };
        log::debug!(
            "Scanned {}: {} nodes, {} songs",
            root_path.display(),
            report.nodes,
            report.songs
        );
        if !report.unreadable.is_empty() {
            log::warn!(
                "Scanned {} with {} unreadable folders",
                root_path.display(),
                report.unreadable.len()
            );
        }
        Ok((mirror, report))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        self.get(self.root).map(Item::path).unwrap_or_else(|| Path::new("/"))
    }

    pub fn get(&self, id: NodeId) -> Option<&Item> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Exact-path lookup through the path index.
    pub fn search_node(&self, path: &Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Looks up a path and returns the item.
    pub fn item_at(&self, path: &Path) -> Option<&Item> {
        self.search_node(path).and_then(|id| self.get(id))
    }

    /// Children of a folder in listing order. Empty for songs and unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Item::children).unwrap_or(&[])
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Always false: the root is always there.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn song_count(&self) -> usize {
        self.songs
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_same_or_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(Item::parent);
        }
        false
    }

    /// Every song in the library, pre-order. Call again to restart.
    pub fn all_songs(&self) -> Songs<'_> {
        self.songs_under(self.root)
    }

    /// Every song at or below `id`, pre-order.
    pub fn songs_under(&self, id: NodeId) -> Songs<'_> {
        Songs {
            mirror: self,
            stack: vec![id],
        }
    }

    /// Songs shown for a selected folder: its direct songs, or every song below it when
    /// `include_subfolders` is set.
    pub fn songs_in_folder(&self, id: NodeId, include_subfolders: bool) -> Vec<&Item> {
        if include_subfolders {
            return self.songs_under(id).collect();
        }
        self.children(id)
            .iter()
            .filter_map(|&child| self.get(child))
            .filter(|item| item.is_song())
            .collect()
    }

    /// Node ids at or below `id`, pre-order.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(item) = self.get(current) {
                out.push(current);
                stack.extend(item.children().iter().rev().copied());
            }
        }
        out
    }

    /// Pre-order listing of the whole tree. Two mirrors with equal snapshots have the same
    /// nodes in the same child order.
    pub fn snapshot(&self) -> Vec<ItemRef> {
        self.preorder(self.root)
            .into_iter()
            .filter_map(|id| self.get(id))
            .map(Item::to_ref)
            .collect()
    }

    /// Path to kind map of the whole tree, for order-insensitive comparison.
    pub fn shape(&self) -> BTreeMap<PathBuf, ItemKind> {
        self.nodes
            .iter()
            .flatten()
            .map(|item| (item.path.clone(), item.kind()))
            .collect()
    }

    // ========================================================================
    // Structural edits
    // ========================================================================

    /// Adds one node under `parent` at its listing-order position.
    pub fn insert_item(&mut self, parent: NodeId, name: &str, kind: ItemKind) -> Result<NodeId, MirrorError> {
        self.attach(parent, name.to_string(), kind, true)
    }

    /// Scans `filesystem_path` and attaches the resulting subtree under `parent_path`.
    ///
    /// Returns `Ok(None)` when the entry is filtered out by the config (for example a non-song
    /// file). If the scan of a folder fails, nothing is attached.
    pub fn insert_scanned(
        &mut self,
        parent_path: &Path,
        filesystem_path: &Path,
        volume: &dyn Volume,
        config: &ShelfConfig,
    ) -> Result<Option<NodeId>, MirrorError> {
        let parent = self.search_node(parent_path).ok_or_else(|| MirrorError::NotInMirror {
            path: parent_path.to_path_buf(),
        })?;
        let kind = volume.entry_kind(filesystem_path).map_err(|error| MirrorError::Scan {
            path: filesystem_path.to_path_buf(),
            error,
        })?;
        if !config.accepts(filesystem_path, kind) {
            return Ok(None);
        }

        let id = self.attach(parent, display_name(filesystem_path), ItemKind::from(kind), true)?;
        if kind == EntryKind::Directory {
            if let Err(err) = self.fill_from_disk(volume, config, id) {
                self.remove_subtree(id)?;
                return Err(err);
            }
        }
        Ok(Some(id))
    }

    /// Detaches and discards `id` and its descendants. Returns how many nodes were removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize, MirrorError> {
        if id == self.root {
            return Err(MirrorError::RootNode);
        }
        let parent = self.get(id).ok_or(MirrorError::UnknownNode)?.parent;
        let doomed = self.preorder(id);
        if let Some(parent) = parent {
            self.children_mut(parent)?.retain(|&child| child != id);
        }
        for node in &doomed {
            self.release(*node);
        }
        Ok(doomed.len())
    }

    /// Moves `id` under `new_parent` as `new_name`, rewriting the stored path of every node in
    /// the subtree. O(subtree size); nothing is rescanned.
    pub fn relocate_subtree(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> Result<(), MirrorError> {
        if id == self.root {
            return Err(MirrorError::RootNode);
        }
        let item = self.get(id).ok_or(MirrorError::UnknownNode)?;
        let old_parent = item.parent;
        let is_folder = item.is_folder();

        let target = self.get(new_parent).ok_or(MirrorError::UnknownNode)?;
        if !target.is_folder() {
            return Err(MirrorError::NotAFolder {
                path: target.path.clone(),
            });
        }
        let new_path = target.path.join(new_name);
        if self.is_same_or_ancestor(id, new_parent) {
            return Err(MirrorError::WouldCycle { path: new_path });
        }
        self.ensure_free(&new_path, Some(id))?;

        if let Some(old_parent) = old_parent {
            self.children_mut(old_parent)?.retain(|&child| child != id);
        }
        self.rewrite_paths(id, &new_path, new_name)?;
        if let Some(item) = self.get_mut(id) {
            item.parent = Some(new_parent);
        }
        let position = self.sorted_position(new_parent, new_name, is_folder)?;
        self.children_mut(new_parent)?.insert(position, id);
        Ok(())
    }

    /// Renames `id` in place: same parent, same position among its siblings.
    pub fn rename_node(&mut self, id: NodeId, new_name: &str) -> Result<(), MirrorError> {
        if id == self.root {
            return Err(MirrorError::RootNode);
        }
        let parent = self.get(id).ok_or(MirrorError::UnknownNode)?.parent;
        let parent_path = match parent.and_then(|p| self.get(p)) {
            Some(parent) => parent.path.clone(),
            None => return Err(MirrorError::UnknownNode),
        };
        let new_path = parent_path.join(new_name);
        self.ensure_free(&new_path, Some(id))?;
        self.rewrite_paths(id, &new_path, new_name)
    }

    /// Cuts `id` and its descendants out of this mirror, keeping loaded tags.
    pub fn take_subtree(&mut self, id: NodeId) -> Result<DetachedSubtree, MirrorError> {
        if id == self.root {
            return Err(MirrorError::RootNode);
        }
        let top_path = self.get(id).ok_or(MirrorError::UnknownNode)?.path.clone();
        let entries = self
            .preorder(id)
            .into_iter()
            .filter_map(|node| self.get(node))
            .map(|item| DetachedEntry {
                relative: item
                    .path
                    .strip_prefix(&top_path)
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
                kind: item.kind(),
                tags: item.cached_tags().cloned(),
            })
            .collect();
        self.remove_subtree(id)?;
        Ok(DetachedSubtree { entries })
    }

    /// Attaches a subtree cut from another mirror under `parent` as `name`.
    pub fn graft_subtree(
        &mut self,
        parent: NodeId,
        name: &str,
        subtree: DetachedSubtree,
    ) -> Result<NodeId, MirrorError> {
        let mut entries = subtree.entries.into_iter();
        let first = entries.next().ok_or(MirrorError::UnknownNode)?;
        let top = self.attach(parent, name.to_string(), first.kind, true)?;
        self.set_tags(top, first.tags)?;
        let top_path = self.get(top).ok_or(MirrorError::UnknownNode)?.path.clone();

        for entry in entries {
            let path = top_path.join(&entry.relative);
            let parent_path = path.parent().unwrap_or(top_path.as_path());
            let parent_id = self.search_node(parent_path).ok_or_else(|| MirrorError::NotInMirror {
                path: parent_path.to_path_buf(),
            })?;
            // Pre-order keeps each folder's children in listing order, so appending is enough
            let id = self.attach(parent_id, display_name(&path), entry.kind, false)?;
            self.set_tags(id, entry.tags)?;
        }
        Ok(top)
    }

    /// Caches loaded tags on a song node.
    pub fn store_tags(&mut self, id: NodeId, tags: SongTags) -> Result<(), MirrorError> {
        self.set_tags(id, Some(tags))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Item> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, item: Item) -> NodeId {
        let path = item.path.clone();
        if item.is_song() {
            self.songs += 1;
        }
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(item);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(item));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.index.insert(path, id);
        id
    }

    fn release(&mut self, id: NodeId) {
        let Some(item) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        if item.is_song() {
            self.songs -= 1;
        }
        self.index.remove(&item.path);
        self.free.push(id.0);
    }

    fn children_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>, MirrorError> {
        let item = self.get_mut(id).ok_or(MirrorError::UnknownNode)?;
        match &mut item.data {
            ItemData::Folder { children } => Ok(children),
            ItemData::Song { .. } => Err(MirrorError::NotAFolder {
                path: item.path.clone(),
            }),
        }
    }

    fn set_tags(&mut self, id: NodeId, new_tags: Option<SongTags>) -> Result<(), MirrorError> {
        let item = self.get_mut(id).ok_or(MirrorError::UnknownNode)?;
        if let ItemData::Song { tags } = &mut item.data {
            *tags = new_tags;
        }
        Ok(())
    }

    fn ensure_free(&self, path: &Path, allowed: Option<NodeId>) -> Result<(), MirrorError> {
        match self.index.get(path) {
            Some(&occupant) if Some(occupant) != allowed => Err(MirrorError::PathOccupied {
                path: path.to_path_buf(),
            }),
            _ => Ok(()),
        }
    }

    /// Index in `parent`'s children where a node with this name and kind belongs.
    fn sorted_position(&self, parent: NodeId, name: &str, is_folder: bool) -> Result<usize, MirrorError> {
        let item = self.get(parent).ok_or(MirrorError::UnknownNode)?;
        if !item.is_folder() {
            return Err(MirrorError::NotAFolder {
                path: item.path.clone(),
            });
        }
        let children = item.children();
        let position = children.iter().position(|&child| {
            self.get(child)
                .map(|c| listing_order(name, is_folder, &c.name, c.is_folder()) == Ordering::Less)
                .unwrap_or(false)
        });
        Ok(position.unwrap_or(children.len()))
    }

    /// Creates a node under `parent`, either at its sorted position or appended.
    fn attach(&mut self, parent: NodeId, name: String, kind: ItemKind, sorted: bool) -> Result<NodeId, MirrorError> {
        let parent_item = self.get(parent).ok_or(MirrorError::UnknownNode)?;
        if !parent_item.is_folder() {
            return Err(MirrorError::NotAFolder {
                path: parent_item.path.clone(),
            });
        }
        let path = parent_item.path.join(&name);
        self.ensure_free(&path, None)?;

        let position = if sorted {
            Some(self.sorted_position(parent, &name, kind == ItemKind::Folder)?)
        } else {
            None
        };
        let id = self.alloc(Item::new(path, name, Some(parent), kind));
        let children = self.children_mut(parent)?;
        match position {
            Some(position) => children.insert(position, id),
            None => children.push(id),
        }
        Ok(id)
    }

    /// Sets `id`'s name and rewrites the `old prefix -> new_path` for its whole subtree.
    fn rewrite_paths(&mut self, id: NodeId, new_path: &Path, new_name: &str) -> Result<(), MirrorError> {
        let old_path = self.get(id).ok_or(MirrorError::UnknownNode)?.path.clone();
        let subtree = self.preorder(id);

        // Drop every old path before adding new ones so the two sets never clash mid-way
        for &node in &subtree {
            if let Some(item) = self.nodes.get(node.0).and_then(Option::as_ref) {
                self.index.remove(&item.path);
            }
        }
        for &node in &subtree {
            let Some(item) = self.nodes.get_mut(node.0).and_then(Option::as_mut) else {
                continue;
            };
            let updated = match item.path.strip_prefix(&old_path) {
                Ok(rest) if rest.as_os_str().is_empty() => new_path.to_path_buf(),
                Ok(rest) => new_path.join(rest),
                Err(_) => continue,
            };
            item.path = updated.clone();
            self.index.insert(updated, node);
        }
        if let Some(item) = self.get_mut(id) {
            item.name = new_name.to_string();
        }
        Ok(())
    }

    /// Lists `folder` and everything below it from disk, appending accepted entries.
    /// Returns the subfolders that couldn't be listed. Only `folder` itself failing is an error.
    fn fill_from_disk(
        &mut self,
        volume: &dyn Volume,
        config: &ShelfConfig,
        folder: NodeId,
    ) -> Result<Vec<PathBuf>, MirrorError> {
        let mut unreadable = Vec::new();
        let mut stack = vec![folder];
        while let Some(current) = stack.pop() {
            let path = self.get(current).ok_or(MirrorError::UnknownNode)?.path.clone();
            let listing = match volume.list_directory(&path) {
                Ok(listing) => listing,
                Err(error) if current == folder => return Err(MirrorError::Scan { path, error }),
                Err(error) => {
                    log::warn!("Couldn't list {}, mirroring it as empty: {}", path.display(), error);
                    unreadable.push(path);
                    continue;
                }
            };

            let mut subfolders = Vec::new();
            for entry in listing {
                if !config.accepts(&entry.path, entry.kind) {
                    continue;
                }
                let kind = ItemKind::from(entry.kind);
                // Listings come sorted, so appending keeps listing order
                let child = self.attach(current, entry.name, kind, false)?;
                if kind == ItemKind::Folder {
                    subfolders.push(child);
                }
            }
            stack.extend(subfolders.into_iter().rev());
        }
        Ok(unreadable)
    }
}

/// Pre-order iterator over songs. Created by `all_songs` and `songs_under`.
pub struct Songs<'a> {
    mirror: &'a FileTreeMirror,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Songs<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        let mirror = self.mirror;
        while let Some(id) = self.stack.pop() {
            let Some(item) = mirror.get(id) else {
                continue;
            };
            if item.is_song() {
                return Some(item);
            }
            self.stack.extend(item.children().iter().rev().copied());
        }
        None
    }
}
