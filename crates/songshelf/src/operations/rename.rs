//! Rename within the same folder.

use super::OperationContext;
use super::helpers::{Resolution, notify, replace_existing, resolve_target, validate_source};
use super::pending::PendingOperation;
use super::types::{FailureCause, MutationError, OperationKind, OperationSummary};
use crate::conflict::ConflictResolver;
use crate::events::LibraryEvent;
use crate::registry::Library;
use crate::tree::{ItemKind, MirrorError};
use crate::validation::{ValidationError, validate_name};
use crate::volume::EntryKind;
use std::path::Path;

/// Renames `target` to `new_name` in place. The node keeps its position among its siblings.
pub(crate) fn rename_item(
    ctx: &OperationContext<'_>,
    resolver: &dyn ConflictResolver,
    library: &mut Library,
    target: &Path,
    new_name: &str,
) -> Result<OperationSummary, MutationError> {
    validate_name(new_name)?;
    let node = validate_source(library, target)?;
    let (kind, current_name) = match library.mirror.get(node) {
        Some(item) => (item.kind(), item.name().to_string()),
        None => return Err(MutationError::inconsistent(target, MirrorError::UnknownNode)),
    };
    if current_name == new_name {
        return Err(ValidationError::SameLocation {
            path: target.display().to_string(),
        }
        .into());
    }
    let folder = match target.parent() {
        Some(folder) => folder.to_path_buf(),
        None => {
            return Err(ValidationError::LibraryRoot {
                path: target.display().to_string(),
            }
            .into());
        }
    };

    let mut op = PendingOperation::new(OperationKind::Rename, target, None);
    let index = op.track(target);

    let (name, replace) = match resolve_target(ctx, resolver, target, &folder, new_name)? {
        Resolution::Skip => {
            op.skip(index);
            return op.finish(None);
        }
        Resolution::Proceed { name, replace } => (name, replace),
    };
    if let Some(existing) = replace {
        if !replace_existing(ctx, library, &existing, &mut op) {
            op.fail(index, FailureCause::AlreadyExists);
            return Err(op.into_error());
        }
    }

    let renamed = folder.join(&name);
    if let Err(err) = ctx.volume.move_entry(target, &renamed) {
        op.fail(index, FailureCause::from(&err));
        return Err(op.into_error());
    }
    op.succeed(index);

    let entry_kind = match kind {
        ItemKind::Folder => EntryKind::Directory,
        ItemKind::Song => EntryKind::File,
    };
    let node = library.mirror.search_node(target).ok_or_else(|| MutationError::Inconsistent {
        path: target.display().to_string(),
        message: "node vanished during rename".to_string(),
    })?;

    if ctx.config.accepts(&renamed, entry_kind) {
        library
            .mirror
            .rename_node(node, &name)
            .map_err(|err| MutationError::inconsistent(&renamed, err))?;
        notify(ctx, library, LibraryEvent::NodeMoved {
            old_path: target.to_path_buf(),
            new_path: renamed.clone(),
        });
    } else {
        // "song.mp3" -> "song.txt" takes it out of the library view
        notify(ctx, library, LibraryEvent::NodeWillBeRemoved {
            path: target.to_path_buf(),
        });
        library
            .mirror
            .remove_subtree(node)
            .map_err(|err| MutationError::inconsistent(target, err))?;
        notify(ctx, library, LibraryEvent::NodeRemoved {
            path: target.to_path_buf(),
        });
    }
    op.finish(Some(renamed))
}
