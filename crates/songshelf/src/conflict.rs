//! Name collision handling.
//!
//! When a move, copy or rename would land on a name that's already taken, the engine asks a
//! `ConflictResolver` what to do before touching disk for that node. Interactive hosts implement
//! it with a dialog; `FixedResolver` applies one policy to every conflict.

use crate::volume::EntryKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The entry already sitting at the destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingEntry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

/// What to do about one collision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Remove the existing entry (mirror and disk) and proceed.
    Replace,
    /// Proceed under a different name. If that name is also taken the resolver is asked again.
    RenameAs(String),
    /// Leave this node alone and carry on.
    Skip,
    /// Abort the whole call.
    CancelAll,
}

/// Decides what happens when a destination name is taken.
///
/// Called synchronously on the worker running the operation, before anything changes on disk
/// for the affected node. Any `Fn(&str, &Path, &ExistingEntry) -> ConflictDecision` closure
/// works as a resolver.
pub trait ConflictResolver {
    fn resolve(&self, source_name: &str, dest_folder: &Path, existing: &ExistingEntry) -> ConflictDecision;
}

impl<F> ConflictResolver for F
where
    F: Fn(&str, &Path, &ExistingEntry) -> ConflictDecision,
{
    fn resolve(&self, source_name: &str, dest_folder: &Path, existing: &ExistingEntry) -> ConflictDecision {
        self(source_name, dest_folder, existing)
    }
}

/// Policy for `FixedResolver`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Cancel the operation on the first conflict
    #[default]
    Stop,
    /// Skip conflicting items, continue with others
    Skip,
    /// Replace whatever is in the way
    Overwrite,
    /// Rename the incoming item (append " (1)", " (2)", etc.)
    Rename,
}

/// Resolver answering every conflict the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedResolver {
    policy: ConflictPolicy,
}

impl FixedResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }
}

impl ConflictResolver for FixedResolver {
    fn resolve(&self, _source_name: &str, _dest_folder: &Path, existing: &ExistingEntry) -> ConflictDecision {
        match self.policy {
            ConflictPolicy::Stop => ConflictDecision::CancelAll,
            ConflictPolicy::Skip => ConflictDecision::Skip,
            ConflictPolicy::Overwrite => ConflictDecision::Replace,
            // When the suggestion is taken too, the engine asks again with the entry that
            // blocked it, so numbering from the blocker walks " (1)", " (2)", ... upwards.
            ConflictPolicy::Rename => ConflictDecision::RenameAs(next_numbered_name(
                &existing.name,
                existing.kind == EntryKind::File,
            )),
        }
    }
}

/// Splits a trailing " (n)" counter off a stem.
fn split_counter(stem: &str) -> (&str, u64) {
    let Some(without_paren) = stem.strip_suffix(')') else {
        return (stem, 0);
    };
    let Some(open) = without_paren.rfind(" (") else {
        return (stem, 0);
    };
    let digits = &without_paren[open + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (stem, 0);
    }
    match digits.parse::<u64>() {
        Ok(n) => (&stem[..open], n),
        Err(_) => (stem, 0),
    }
}

/// Next name in the " (n)" sequence: "a.mp3" becomes "a (1).mp3", "a (9).mp3" becomes
/// "a (10).mp3". With `keep_extension` off (folders) the whole name is the stem.
pub fn next_numbered_name(name: &str, keep_extension: bool) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if keep_extension && dot > 0 => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    };
    // A counter at u64::MAX can't go up; it becomes part of the base instead
    let (base, counter) = split_counter(stem);
    let (base, next) = match counter.checked_add(1) {
        Some(next) => (base, next),
        None => (stem, 1),
    };
    match extension {
        Some(ext) => format!("{} ({}).{}", base, next, ext),
        None => format!("{} ({})", base, next),
    }
}
