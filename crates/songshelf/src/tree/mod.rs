//! The library tree: node model and the per-library mirror.

mod item;
mod mirror;

pub use item::{Item, ItemKind, ItemRef, NodeId};
pub use mirror::{DetachedSubtree, FileTreeMirror, MirrorError, ScanReport, Songs};
