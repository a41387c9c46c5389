//! Song tag reads (lazy, cached on the node) and edits (written through, then cached).

use super::OperationContext;
use super::helpers::notify;
use super::types::MutationError;
use crate::events::LibraryEvent;
use crate::metadata::{MetadataProvider, SongTags, TagUpdate};
use crate::registry::Library;
use crate::tree::NodeId;
use crate::validation::ValidationError;
use std::path::Path;

fn song_node(library: &Library, path: &Path) -> Result<NodeId, ValidationError> {
    let node = library.mirror.search_node(path).ok_or_else(|| ValidationError::NotFound {
        path: path.display().to_string(),
    })?;
    match library.mirror.get(node) {
        Some(item) if item.is_song() => Ok(node),
        _ => Err(ValidationError::NotASong {
            path: path.display().to_string(),
        }),
    }
}

/// Returns a song's tags, reading them from the file on first access only.
pub(crate) fn song_tags(
    library: &mut Library,
    metadata: &dyn MetadataProvider,
    path: &Path,
) -> Result<SongTags, MutationError> {
    let node = song_node(library, path)?;
    if let Some(tags) = library.mirror.get(node).and_then(|item| item.cached_tags()) {
        return Ok(tags.clone());
    }

    let tags = metadata
        .read_tags(path)
        .map_err(|error| MutationError::Metadata { error })?;
    library
        .mirror
        .store_tags(node, tags.clone())
        .map_err(|err| MutationError::inconsistent(path, err))?;
    Ok(tags)
}

/// Applies `update` to a song's tags, writes them to the file and refreshes the cached copy.
pub(crate) fn update_song_tags(
    ctx: &OperationContext<'_>,
    library: &mut Library,
    metadata: &dyn MetadataProvider,
    path: &Path,
    update: &TagUpdate,
) -> Result<SongTags, MutationError> {
    update.validate()?;
    let current = song_tags(library, metadata, path)?;
    if update.is_empty() {
        return Ok(current);
    }

    let updated = update.apply_to(&current);
    metadata.write_tags(path, &updated)?;
    log::debug!("Updated tags of {}", path.display());

    let node = song_node(library, path)?;
    library
        .mirror
        .store_tags(node, updated.clone())
        .map_err(|err| MutationError::inconsistent(path, err))?;
    notify(ctx, library, LibraryEvent::NodeMetadataChanged {
        path: path.to_path_buf(),
    });
    Ok(updated)
}
