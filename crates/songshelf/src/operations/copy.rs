//! Copy: walks the source tree top-down, creating folders before their contents.

use super::helpers::{
    Resolution, notify, replace_existing, resolve_target, validate_dest_folder, validate_destination_not_inside_source,
    validate_in_mirror,
};
use super::pending::PendingOperation;
use super::types::{FailureCause, MutationError, OperationKind, OperationSummary};
use super::{LibraryPair, OperationContext};
use crate::conflict::ConflictResolver;
use crate::events::LibraryEvent;
use crate::registry::Library;
use crate::tree::ItemKind;
use crate::validation::display_name;
use crate::volume::{EntryKind, Volume, VolumeError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One entry waiting to be copied into `into`.
struct CopyJob {
    from: PathBuf,
    kind: EntryKind,
    into: PathBuf,
}

/// Copies `source` (file or whole folder) into `dest_folder`, possibly across libraries.
///
/// The walk follows the disk, so files the mirror doesn't show are copied too. Each created
/// entry is added to the destination mirror right after disk confirms it. A failed folder is
/// not descended into; its siblings still go. `NodeAdded` is published once per topmost new
/// node, after the walk.
pub(crate) fn copy_item(
    ctx: &OperationContext<'_>,
    resolver: &dyn ConflictResolver,
    mut libs: LibraryPair<'_>,
    source: &Path,
    dest_folder: &Path,
) -> Result<OperationSummary, MutationError> {
    validate_in_mirror(libs.source, source)?;
    validate_destination_not_inside_source(source, dest_folder)?;
    let dest = libs.dest();
    validate_dest_folder(dest, dest_folder)?;

    let mut op = PendingOperation::new(OperationKind::Copy, source, Some(dest_folder));
    let top_kind = match ctx.volume.entry_kind(source) {
        Ok(kind) => kind,
        Err(err) => {
            let index = op.track(source);
            op.fail(index, FailureCause::from(&err));
            return Err(op.into_error());
        }
    };

    let mut walk = CopyWalk {
        ctx,
        resolver,
        dest: &mut *dest,
        op: &mut op,
        inserted: HashSet::new(),
        tops: Vec::new(),
        result_path: None,
    };
    let outcome = walk.run(CopyJob {
        from: source.to_path_buf(),
        kind: top_kind,
        into: dest_folder.to_path_buf(),
    });
    let CopyWalk { tops, result_path, .. } = walk;

    // Whatever was applied stays applied, even after a cancel
    for (parent, path) in tops {
        let Some(node) = dest.mirror.item_at(&path).map(|item| item.to_ref()) else {
            continue;
        };
        notify(ctx, dest, LibraryEvent::NodeAdded { parent, node });
    }
    outcome?;
    op.finish(result_path)
}

/// Copies `source` to `target` as is: no resolver, no mirror. `target` must not exist yet.
///
/// Moves that cross file systems use this before deleting the source. Stops at the first
/// failure and returns the entry that failed.
pub(super) fn copy_tree(volume: &dyn Volume, source: &Path, target: &Path) -> Result<(), (PathBuf, VolumeError)> {
    let kind = volume.entry_kind(source).map_err(|err| (source.to_path_buf(), err))?;
    let mut stack = vec![(source.to_path_buf(), kind, target.to_path_buf())];
    while let Some((from, kind, to)) = stack.pop() {
        match kind {
            EntryKind::File => volume.copy_file(&from, &to).map_err(|err| (from.clone(), err))?,
            EntryKind::Directory => {
                volume.create_directory(&to).map_err(|err| (from.clone(), err))?;
                let listing = volume.list_directory(&from).map_err(|err| (from.clone(), err))?;
                stack.extend(listing.into_iter().rev().map(|entry| {
                    let into = to.join(&entry.name);
                    (entry.path, entry.kind, into)
                }));
            }
        }
    }
    Ok(())
}

struct CopyWalk<'a, 'b> {
    ctx: &'a OperationContext<'b>,
    resolver: &'a dyn ConflictResolver,
    dest: &'a mut Library,
    op: &'a mut PendingOperation,
    /// Mirror nodes this walk created
    inserted: HashSet<PathBuf>,
    /// Created nodes whose parent existed before: (parent path, node path)
    tops: Vec<(PathBuf, PathBuf)>,
    result_path: Option<PathBuf>,
}

impl CopyWalk<'_, '_> {
    fn run(&mut self, first: CopyJob) -> Result<(), MutationError> {
        let mut stack = vec![first];
        let mut is_top = true;
        while let Some(job) = stack.pop() {
            let created = self.copy_entry(&job)?;
            let Some(target) = created else {
                is_top = false;
                continue;
            };
            if is_top {
                self.result_path = Some(target.clone());
                is_top = false;
            }
            self.mirror_entry(&job, &target);

            if job.kind == EntryKind::Directory {
                match self.ctx.volume.list_directory(&job.from) {
                    Ok(listing) => stack.extend(listing.into_iter().rev().map(|entry| CopyJob {
                        from: entry.path,
                        kind: entry.kind,
                        into: target.clone(),
                    })),
                    Err(err) => {
                        // The folder itself was created; its contents are what failed
                        let index = self.op.track(&job.from);
                        self.op.fail(index, FailureCause::from(&err));
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves and performs the disk side of one job. `Ok(None)` if it was skipped or failed.
    fn copy_entry(&mut self, job: &CopyJob) -> Result<Option<PathBuf>, MutationError> {
        let index = self.op.track(&job.from);
        let resolution = resolve_target(self.ctx, self.resolver, &job.from, &job.into, &display_name(&job.from))?;
        let (name, replace) = match resolution {
            Resolution::Skip => {
                self.op.skip(index);
                return Ok(None);
            }
            Resolution::Proceed { name, replace } => (name, replace),
        };
        if let Some(existing) = replace {
            if !replace_existing(self.ctx, self.dest, &existing, self.op) {
                self.op.fail(index, FailureCause::AlreadyExists);
                return Ok(None);
            }
        }

        let target = job.into.join(&name);
        let result = match job.kind {
            EntryKind::Directory => self.ctx.volume.create_directory(&target),
            EntryKind::File => self.ctx.volume.copy_file(&job.from, &target),
        };
        match result {
            Ok(()) => {
                self.op.succeed(index);
                Ok(Some(target))
            }
            Err(err) => {
                self.op.fail(index, FailureCause::from(&err));
                Ok(None)
            }
        }
    }

    fn mirror_entry(&mut self, job: &CopyJob, target: &Path) {
        if !self.ctx.config.accepts(target, job.kind) {
            return;
        }
        let mirror = &mut self.dest.mirror;
        // Contents of a folder the mirror filtered out stay unmirrored too
        let Some(parent) = mirror.search_node(&job.into) else {
            return;
        };
        match mirror.insert_item(parent, &display_name(target), ItemKind::from(job.kind)) {
            Ok(_) => {
                if !self.inserted.contains(&job.into) {
                    self.tops.push((job.into.clone(), target.to_path_buf()));
                }
                self.inserted.insert(target.to_path_buf());
            }
            Err(err) => log::warn!(
                "Operation {}: copied {} but couldn't mirror it: {}",
                self.op.id(),
                target.display(),
                err
            ),
        }
    }
}
