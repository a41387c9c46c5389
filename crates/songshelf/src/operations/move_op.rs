//! Move: one rename on disk, one subtree relocation in the mirror.
//!
//! A rename can't cross file systems. Then the subtree is copied over, the source deleted
//! children first, and the mirror edited once the copy is complete on disk.

use super::copy::copy_tree;
use super::delete::delete_from_disk;
use super::helpers::{
    Resolution, notify, replace_existing, resolve_target, validate_dest_folder, validate_destination_not_inside_source,
    validate_not_same_location, validate_source,
};
use super::pending::PendingOperation;
use super::types::{FailureCause, MutationError, OperationKind, OperationSummary};
use super::{LibraryPair, OperationContext};
use crate::conflict::ConflictResolver;
use crate::events::LibraryEvent;
use crate::registry::Library;
use crate::tree::{Item, ItemKind, MirrorError};
use crate::validation::display_name;
use crate::volume::{EntryKind, VolumeError};
use std::path::Path;

/// Moves `source` into `dest_folder`, possibly across libraries.
///
/// Observers see a single `NodeMoved`; loaded tags travel with the nodes. If the disk move
/// fails, nothing in the mirror changes.
pub(crate) fn move_item(
    ctx: &OperationContext<'_>,
    resolver: &dyn ConflictResolver,
    mut libs: LibraryPair<'_>,
    source: &Path,
    dest_folder: &Path,
) -> Result<OperationSummary, MutationError> {
    let node = validate_source(libs.source, source)?;
    validate_not_same_location(source, dest_folder)?;
    validate_destination_not_inside_source(source, dest_folder)?;
    validate_dest_folder(libs.dest(), dest_folder)?;

    let kind = match libs.source.mirror.get(node) {
        Some(item) => item.kind(),
        None => return Err(MutationError::inconsistent(source, MirrorError::UnknownNode)),
    };

    let mut op = PendingOperation::new(OperationKind::Move, source, Some(dest_folder));
    let index = op.track(source);

    let (name, replace) = match resolve_target(ctx, resolver, source, dest_folder, &display_name(source))? {
        Resolution::Skip => {
            op.skip(index);
            return op.finish(None);
        }
        Resolution::Proceed { name, replace } => (name, replace),
    };
    if let Some(existing) = replace {
        if !replace_existing(ctx, libs.dest(), &existing, &mut op) {
            op.fail(index, FailureCause::AlreadyExists);
            return Err(op.into_error());
        }
    }

    let target = dest_folder.join(&name);
    let mut source_left = false;
    match ctx.volume.move_entry(source, &target) {
        Ok(()) => op.succeed(index),
        Err(VolumeError::CrossesDevices(_)) => match move_across_devices(ctx, &mut libs, source, &target, &mut op) {
            CrossDeviceMove::CopyFailed => return Err(op.into_error()),
            CrossDeviceMove::Copied { source_deleted } => {
                op.succeed(index);
                source_left = !source_deleted;
            }
        },
        Err(err) => {
            op.fail(index, FailureCause::from(&err));
            return Err(op.into_error());
        }
    }

    let entry_kind = match kind {
        ItemKind::Folder => EntryKind::Directory,
        ItemKind::Song => EntryKind::File,
    };
    if !ctx.config.accepts(&target, entry_kind) {
        // Renamed to something the library doesn't mirror, like a non-song extension
        notify(ctx, libs.source, LibraryEvent::NodeWillBeRemoved {
            path: source.to_path_buf(),
        });
        drop_node(&mut libs, source)?;
        notify(ctx, libs.source, LibraryEvent::NodeRemoved {
            path: source.to_path_buf(),
        });
    } else {
        relocate(&mut libs, source, dest_folder, &name).map_err(|err| MutationError::inconsistent(&target, err))?;
        notify(ctx, libs.dest(), LibraryEvent::NodeMoved {
            old_path: source.to_path_buf(),
            new_path: target.clone(),
        });
    }
    if source_left {
        mirror_leftovers(ctx, libs.source, source);
    }
    op.finish(Some(target))
}

enum CrossDeviceMove {
    /// Nothing changed at the source; the partial copy was cleaned up
    CopyFailed,
    /// `target` is complete. Failures deleting the source are recorded on the operation.
    Copied { source_deleted: bool },
}

/// Copy then delete, for a move between file systems.
///
/// If the copy fails, whatever it created is deleted again and the source stays untouched.
fn move_across_devices(
    ctx: &OperationContext<'_>,
    libs: &mut LibraryPair<'_>,
    source: &Path,
    target: &Path,
    op: &mut PendingOperation,
) -> CrossDeviceMove {
    log::info!(
        "Operation {}: {} and {} are on different file systems, copying then deleting",
        op.id(),
        source.display(),
        target.display()
    );
    if let Err((path, err)) = copy_tree(ctx.volume, source, target) {
        let index = op.track(&path);
        op.fail(index, FailureCause::from(&err));
        let cleanup = delete_from_disk(ctx.volume, target, op);
        if !cleanup.root_deleted && ctx.volume.exists(target) {
            mirror_leftovers(ctx, libs.dest(), target);
        }
        return CrossDeviceMove::CopyFailed;
    }
    let deletion = delete_from_disk(ctx.volume, source, op);
    CrossDeviceMove::Copied {
        source_deleted: deletion.root_deleted,
    }
}

/// Mirrors what a failed cleanup left on disk at `path`, so the mirror keeps matching the disk.
fn mirror_leftovers(ctx: &OperationContext<'_>, library: &mut Library, path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    match library.mirror.insert_scanned(parent, path, ctx.volume, ctx.config) {
        Ok(Some(id)) => {
            if let Some(node) = library.mirror.get(id).map(Item::to_ref) {
                notify(ctx, library, LibraryEvent::NodeAdded {
                    parent: parent.to_path_buf(),
                    node,
                });
            }
        }
        Ok(None) => {}
        Err(err) => log::warn!("Couldn't mirror what's left at {}: {}", path.display(), err),
    }
}

/// Applies a confirmed disk move to the mirror(s). Ids are looked up again because a `Replace`
/// may have removed nodes since validation.
fn relocate(libs: &mut LibraryPair<'_>, source: &Path, dest_folder: &Path, name: &str) -> Result<(), MirrorError> {
    let node = libs.source.mirror.search_node(source).ok_or_else(|| MirrorError::NotInMirror {
        path: source.to_path_buf(),
    })?;

    if libs.is_cross_library() {
        let subtree = libs.source.mirror.take_subtree(node)?;
        let dest = libs.dest();
        let parent = dest.mirror.search_node(dest_folder).ok_or_else(|| MirrorError::NotInMirror {
            path: dest_folder.to_path_buf(),
        })?;
        dest.mirror.graft_subtree(parent, name, subtree)?;
    } else {
        let mirror = &mut libs.source.mirror;
        let parent = mirror.search_node(dest_folder).ok_or_else(|| MirrorError::NotInMirror {
            path: dest_folder.to_path_buf(),
        })?;
        mirror.relocate_subtree(node, parent, name)?;
    }
    Ok(())
}

fn drop_node(libs: &mut LibraryPair<'_>, source: &Path) -> Result<(), MutationError> {
    let mirror = &mut libs.source.mirror;
    if let Some(node) = mirror.search_node(source) {
        mirror
            .remove_subtree(node)
            .map_err(|err| MutationError::inconsistent(source, err))?;
    }
    Ok(())
}
