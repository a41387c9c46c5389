//! Mutation engine: move, copy, delete and rename, applied to disk and mirror as one step.
//!
//! Every call walks the same phases: validate (no side effects), resolve collisions, apply on
//! disk, apply to the mirror, notify. Disk work is node by node and not atomic; the mirror is
//! only ever edited for what disk confirmed, so it never runs ahead of the filesystem.
//!
//! The functions here assume the caller holds the affected library locks. `Shelf` does the
//! locking and routing.

mod copy;
mod delete;
mod helpers;
mod move_op;
mod pending;
mod rename;
mod tags;
mod types;

pub(crate) use copy::copy_item;
pub(crate) use delete::delete_item;
pub(crate) use move_op::move_item;
pub(crate) use rename::rename_item;
pub(crate) use tags::{song_tags, update_song_tags};
pub use types::{FailedItem, FailureCause, ItemOutcome, MutationError, OperationKind, OperationSummary};

use crate::config::ShelfConfig;
use crate::events::ObserverBus;
use crate::registry::Library;
use crate::volume::Volume;

/// Collaborators every operation needs.
pub(crate) struct OperationContext<'a> {
    pub volume: &'a dyn Volume,
    pub config: &'a ShelfConfig,
    pub bus: &'a ObserverBus,
}

/// The locked libraries a two-sided operation works on. `dest` is `None` when source and
/// destination live in the same library.
pub(crate) struct LibraryPair<'a> {
    pub source: &'a mut Library,
    pub dest: Option<&'a mut Library>,
}

impl LibraryPair<'_> {
    pub(crate) fn dest(&mut self) -> &mut Library {
        match self.dest.as_deref_mut() {
            Some(dest) => dest,
            None => &mut *self.source,
        }
    }

    pub(crate) fn is_cross_library(&self) -> bool {
        self.dest.is_some()
    }
}

#[cfg(test)]
mod tests;
