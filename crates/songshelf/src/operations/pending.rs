//! Bookkeeping for one in-flight mutation.

use super::types::{FailedItem, FailureCause, ItemOutcome, MutationError, OperationKind, OperationSummary};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Record of one mutation call: what it touches and how each sub-item turned out.
///
/// Lives only for the duration of the call and is folded into an `OperationSummary` (or a
/// `PartialFailure`) at the end.
#[derive(Debug)]
pub(crate) struct PendingOperation {
    id: String,
    kind: OperationKind,
    source: PathBuf,
    destination: Option<PathBuf>,
    items: Vec<(PathBuf, ItemOutcome)>,
    failures: Vec<FailedItem>,
}

impl PendingOperation {
    pub(crate) fn new(kind: OperationKind, source: &Path, destination: Option<&Path>) -> Self {
        let id = Uuid::new_v4().to_string();
        log::info!(
            "{:?} start: operation_id={}, source={}, destination={:?}",
            kind,
            id,
            source.display(),
            destination
        );
        Self {
            id,
            kind,
            source: source.to_path_buf(),
            destination: destination.map(Path::to_path_buf),
            items: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Starts tracking a sub-item. Returns its index for the outcome setters.
    pub(crate) fn track(&mut self, path: &Path) -> usize {
        self.items.push((path.to_path_buf(), ItemOutcome::Pending));
        self.items.len() - 1
    }

    pub(crate) fn succeed(&mut self, index: usize) {
        self.set(index, ItemOutcome::Succeeded);
    }

    pub(crate) fn skip(&mut self, index: usize) {
        self.set(index, ItemOutcome::Skipped);
    }

    /// Marks a sub-item failed and records why.
    pub(crate) fn fail(&mut self, index: usize, cause: FailureCause) {
        self.set(index, ItemOutcome::Failed);
        if let Some((path, _)) = self.items.get(index) {
            log::warn!("{:?} {}: {} failed: {}", self.kind, self.id, path.display(), cause);
            self.failures.push(FailedItem::new(path, cause));
        }
    }

    pub(crate) fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|(_, o)| *o == outcome).count()
    }

    #[cfg(test)]
    pub(crate) fn outcome_of(&self, path: &Path) -> Option<ItemOutcome> {
        self.items.iter().rev().find(|(p, _)| p == path).map(|(_, o)| *o)
    }

    pub(crate) fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn set(&mut self, index: usize, outcome: ItemOutcome) {
        if let Some(item) = self.items.get_mut(index) {
            item.1 = outcome;
        }
    }

    /// Ends the operation as a partial failure, whatever was recorded so far.
    pub(crate) fn into_error(self) -> MutationError {
        log::warn!(
            "{:?} {}: finished with {} failures",
            self.kind,
            self.id,
            self.failures.len()
        );
        MutationError::PartialFailure {
            operation_id: self.id,
            failures: self.failures,
        }
    }

    /// Ends the operation: `PartialFailure` if any sub-item failed, the summary otherwise.
    pub(crate) fn finish(self, result_path: Option<PathBuf>) -> Result<OperationSummary, MutationError> {
        if self.has_failures() {
            return Err(self.into_error());
        }
        let summary = OperationSummary {
            succeeded: self.count(ItemOutcome::Succeeded),
            skipped: self.count(ItemOutcome::Skipped),
            operation_id: self.id,
            kind: self.kind,
            source: self.source,
            result_path,
        };
        log::info!(
            "{:?} done: operation_id={}, destination={:?}, succeeded={}, skipped={}",
            summary.kind,
            summary.operation_id,
            self.destination,
            summary.succeeded,
            summary.skipped
        );
        Ok(summary)
    }
}
