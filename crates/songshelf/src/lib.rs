//! songshelf keeps in-memory trees of music library folders in sync with the disk.
//!
//! Register folders as libraries on a [`Shelf`], then move, copy, delete and rename through it.
//! Each call validates first, asks a [`ConflictResolver`] about name collisions, applies the
//! change on disk node by node, edits the library's [`FileTreeMirror`] to match what disk
//! confirmed and finally tells subscribers on the [`ObserverBus`].

// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Warn on unused dependencies
#![warn(unused_crate_dependencies)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

// Dev dependencies used only by tests/
#[cfg(test)]
use env_logger as _;
#[cfg(test)]
use walkdir as _;

pub mod config;
pub mod conflict;
pub mod events;
pub(crate) mod ignore_poison;
pub mod metadata;
pub mod operations;
pub mod registry;
pub mod session;
pub mod shelf;
pub mod tree;
pub mod validation;
pub mod volume;
pub mod worker;

pub use config::ShelfConfig;
pub use conflict::{ConflictDecision, ConflictPolicy, ConflictResolver, ExistingEntry, FixedResolver, next_numbered_name};
pub use events::{EventHandler, EventKind, LibraryEvent, ObserverBus, SubscriptionId};
pub use metadata::{InMemoryMetadata, MetadataError, MetadataProvider, NoMetadata, SongTags, TagUpdate};
pub use operations::{FailedItem, FailureCause, ItemOutcome, MutationError, OperationKind, OperationSummary};
pub use registry::{Library, LibraryId, LibraryRegistry};
pub use session::{Clipboard, ClipboardMode, Playlist, Session};
pub use shelf::Shelf;
pub use tree::{FileTreeMirror, Item, ItemKind, ItemRef, MirrorError, NodeId, ScanReport};
pub use validation::ValidationError;
pub use volume::{DirEntry, EntryKind, InMemoryVolume, LocalVolume, Volume, VolumeError};
pub use worker::{SharedResolver, ShelfWorker};
