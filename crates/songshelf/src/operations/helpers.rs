//! Validation and collision helpers shared by the mutation operations.

use super::OperationContext;
use super::delete::remove_tree;
use super::pending::PendingOperation;
use super::types::MutationError;
use crate::conflict::{ConflictDecision, ConflictResolver, ExistingEntry};
use crate::events::LibraryEvent;
use crate::registry::Library;
use crate::tree::NodeId;
use crate::validation::{ValidationError, display_name, validate_name};
use crate::volume::Volume;
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// Validation
// ============================================================================

/// Looks up a node that must be in the library's mirror.
pub(super) fn validate_in_mirror(library: &Library, path: &Path) -> Result<NodeId, ValidationError> {
    library.mirror.search_node(path).ok_or_else(|| ValidationError::NotFound {
        path: path.display().to_string(),
    })
}

/// Like `validate_in_mirror`, and additionally refuses the library root.
pub(super) fn validate_source(library: &Library, path: &Path) -> Result<NodeId, ValidationError> {
    let node = validate_in_mirror(library, path)?;
    if node == library.mirror.root() {
        return Err(ValidationError::LibraryRoot {
            path: path.display().to_string(),
        });
    }
    Ok(node)
}

/// Destination must be a folder of the mirror.
pub(super) fn validate_dest_folder(library: &Library, path: &Path) -> Result<NodeId, ValidationError> {
    let node = validate_in_mirror(library, path)?;
    match library.mirror.get(node) {
        Some(item) if item.is_folder() => Ok(node),
        _ => Err(ValidationError::NotADirectory {
            path: path.display().to_string(),
        }),
    }
}

/// Moving an item into the folder it's already in is a no-op we refuse.
pub(super) fn validate_not_same_location(source: &Path, dest_folder: &Path) -> Result<(), ValidationError> {
    if source.parent() == Some(dest_folder) {
        return Err(ValidationError::SameLocation {
            path: source.display().to_string(),
        });
    }
    Ok(())
}

/// A folder can't go into itself or one of its descendants. Component-wise.
pub(super) fn validate_destination_not_inside_source(source: &Path, dest_folder: &Path) -> Result<(), ValidationError> {
    if dest_folder.starts_with(source) {
        return Err(ValidationError::SelfContainment {
            source: source.display().to_string(),
            destination: dest_folder.display().to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Collisions
// ============================================================================

pub(super) fn existing_entry(volume: &dyn Volume, path: &Path) -> Option<ExistingEntry> {
    volume.entry_kind(path).ok().map(|kind| ExistingEntry {
        path: path.to_path_buf(),
        name: display_name(path),
        kind,
    })
}

/// What to do with one node after consulting the resolver.
#[derive(Debug)]
pub(super) enum Resolution {
    /// Go ahead under `name`, replacing `replace` first if set
    Proceed {
        name: String,
        replace: Option<ExistingEntry>,
    },
    Skip,
}

/// Finds the name `source` should land under in `dest_folder`.
///
/// Asks the resolver whenever the wanted name is taken on disk. A `RenameAs` name is validated
/// and checked the same way, as often as the resolver keeps coming up with new names. Only a
/// resolver that suggests already-rejected names more than `max_collision_rounds` times ends
/// the call with `CollisionUnresolved`.
pub(super) fn resolve_target(
    ctx: &OperationContext<'_>,
    resolver: &dyn ConflictResolver,
    source: &Path,
    dest_folder: &Path,
    wanted_name: &str,
) -> Result<Resolution, MutationError> {
    let mut name = wanted_name.to_string();
    let mut rejected: HashSet<String> = HashSet::new();
    let mut repeats = 0;
    loop {
        let target = dest_folder.join(&name);
        let Some(existing) = existing_entry(ctx.volume, &target) else {
            return Ok(Resolution::Proceed { name, replace: None });
        };
        rejected.insert(name.clone());

        match resolver.resolve(wanted_name, dest_folder, &existing) {
            ConflictDecision::Replace => {
                // Replacing an item with itself is a no-op
                if target == source {
                    return Ok(Resolution::Skip);
                }
                // Deleting the target would take the source with it
                if source.starts_with(&target) {
                    return Err(ValidationError::SelfContainment {
                        source: source.display().to_string(),
                        destination: target.display().to_string(),
                    }
                    .into());
                }
                return Ok(Resolution::Proceed {
                    name,
                    replace: Some(existing),
                });
            }
            ConflictDecision::RenameAs(new_name) => {
                validate_name(&new_name)?;
                if rejected.contains(&new_name) {
                    repeats += 1;
                    if repeats > ctx.config.max_collision_rounds {
                        log::warn!(
                            "Resolver keeps suggesting taken names in {}, giving up at {}",
                            dest_folder.display(),
                            new_name
                        );
                        return Err(MutationError::CollisionUnresolved {
                            path: dest_folder.join(&new_name).display().to_string(),
                        });
                    }
                }
                log::debug!("Collision at {}, trying {}", target.display(), new_name);
                name = new_name;
            }
            ConflictDecision::Skip => return Ok(Resolution::Skip),
            ConflictDecision::CancelAll => {
                return Err(MutationError::CollisionUnresolved {
                    path: target.display().to_string(),
                });
            }
        }
    }
}

/// Clears the way for a `Replace` decision by deleting what's at the destination, mirror
/// included. Returns false (with failures recorded on `op`) if it couldn't be removed.
pub(super) fn replace_existing(
    ctx: &OperationContext<'_>,
    library: &mut Library,
    existing: &ExistingEntry,
    op: &mut PendingOperation,
) -> bool {
    log::debug!("Operation {}: replacing {}", op.id(), existing.path.display());
    remove_tree(ctx, library, &existing.path, op)
}

// ============================================================================
// Events
// ============================================================================

/// Publishes an event with the library's current mirror.
pub(super) fn notify(ctx: &OperationContext<'_>, library: &Library, event: LibraryEvent) {
    ctx.bus.publish(&event, Some(&library.mirror));
}
