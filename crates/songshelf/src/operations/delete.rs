//! Delete: children before parents, never a folder whose contents didn't all go.

use super::OperationContext;
use super::helpers::{notify, validate_source};
use super::pending::PendingOperation;
use super::types::{FailureCause, MutationError, OperationKind, OperationSummary};
use crate::events::LibraryEvent;
use crate::registry::Library;
use crate::tree::FileTreeMirror;
use crate::volume::{EntryKind, Volume, VolumeError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Deletes `target` (file or folder tree) from disk and mirror.
///
/// Library roots are refused; unregistering is `remove_library`. `NodeWillBeRemoved` goes out
/// before anything changes. Failed entries stay on disk and in the mirror, and so does every
/// folder above them, which is never even attempted.
pub(crate) fn delete_item(
    ctx: &OperationContext<'_>,
    library: &mut Library,
    target: &Path,
) -> Result<OperationSummary, MutationError> {
    validate_source(library, target)?;

    let mut op = PendingOperation::new(OperationKind::Delete, target, None);
    remove_tree(ctx, library, target, &mut op);
    op.finish(None)
}

/// The delete machinery, shared with `Replace` collision handling. Returns whether `root` is
/// gone from disk. Failures are recorded on `op`.
pub(super) fn remove_tree(
    ctx: &OperationContext<'_>,
    library: &mut Library,
    root: &Path,
    op: &mut PendingOperation,
) -> bool {
    if library.mirror.contains(root) {
        notify(ctx, library, LibraryEvent::NodeWillBeRemoved {
            path: root.to_path_buf(),
        });
    }

    let outcome = delete_from_disk(ctx.volume, root, op);
    for path in apply_deletions(&mut library.mirror, &outcome.deleted) {
        notify(ctx, library, LibraryEvent::NodeRemoved { path });
    }
    outcome.root_deleted
}

pub(super) struct DiskDeletion {
    /// Confirmed gone, children before parents
    pub(super) deleted: Vec<PathBuf>,
    pub(super) root_deleted: bool,
}

/// Collects the tree under `root` in pre-order, then deletes it in reverse so every folder comes
/// after its contents. A failure blocks all ancestors of the failed entry.
pub(super) fn delete_from_disk(volume: &dyn Volume, root: &Path, op: &mut PendingOperation) -> DiskDeletion {
    let root_kind = match volume.entry_kind(root) {
        Ok(kind) => kind,
        Err(VolumeError::NotFound(_)) => {
            // Already gone is as good as deleted
            let index = op.track(root);
            op.succeed(index);
            return DiskDeletion {
                deleted: vec![root.to_path_buf()],
                root_deleted: true,
            };
        }
        Err(err) => {
            let index = op.track(root);
            op.fail(index, FailureCause::from(&err));
            return DiskDeletion {
                deleted: Vec::new(),
                root_deleted: false,
            };
        }
    };

    let mut entries: Vec<PathBuf> = Vec::new();
    let mut unlistable: HashMap<PathBuf, FailureCause> = HashMap::new();
    let mut stack = vec![(root.to_path_buf(), root_kind)];
    while let Some((path, kind)) = stack.pop() {
        if kind == EntryKind::Directory {
            match volume.list_directory(&path) {
                Ok(listing) => stack.extend(listing.into_iter().rev().map(|entry| (entry.path, entry.kind))),
                Err(err) => {
                    unlistable.insert(path.clone(), FailureCause::from(&err));
                }
            }
        }
        entries.push(path);
    }

    let mut blocked: HashSet<PathBuf> = HashSet::new();
    let mut deleted = Vec::new();
    let mut root_deleted = false;
    for path in entries.iter().rev() {
        let index = op.track(path);
        let block_parent = if let Some(cause) = unlistable.remove(path) {
            op.fail(index, cause);
            true
        } else if blocked.contains(path) {
            op.skip(index);
            true
        } else {
            match volume.delete_entry(path) {
                Ok(()) | Err(VolumeError::NotFound(_)) => {
                    op.succeed(index);
                    deleted.push(path.clone());
                    if path == root {
                        root_deleted = true;
                    }
                    false
                }
                Err(err) => {
                    op.fail(index, FailureCause::from(&err));
                    true
                }
            }
        };
        if block_parent && path != root {
            if let Some(parent) = path.parent() {
                blocked.insert(parent.to_path_buf());
            }
        }
    }

    DiskDeletion { deleted, root_deleted }
}

/// Removes confirmed-deleted paths from the mirror. Returns the top of each removed subtree, in
/// pre-order.
fn apply_deletions(mirror: &mut FileTreeMirror, deleted: &[PathBuf]) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    // Parents first: removing a folder takes its (also deleted) children with it
    for path in deleted.iter().rev() {
        let Some(node) = mirror.search_node(path) else {
            continue;
        };
        match mirror.remove_subtree(node) {
            Ok(_) => removed.push(path.clone()),
            Err(err) => log::warn!("Couldn't drop {} from the mirror: {}", path.display(), err),
        }
    }
    removed
}
