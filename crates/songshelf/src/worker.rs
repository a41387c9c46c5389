//! Async façade over `Shelf`.
//!
//! Every call moves the blocking filesystem work onto tokio's blocking pool so an async
//! interface loop never stalls on disk. Calls on the same library still queue on its lock.

use crate::conflict::ConflictResolver;
use crate::metadata::{SongTags, TagUpdate};
use crate::operations::{MutationError, OperationSummary};
use crate::registry::LibraryId;
use crate::shelf::Shelf;
use crate::tree::{ItemRef, ScanReport};
use std::path::PathBuf;
use std::sync::Arc;

/// Resolver that can travel to a worker thread.
pub type SharedResolver = Arc<dyn ConflictResolver + Send + Sync>;

/// Runs shelf calls on the blocking pool. Cheap to clone.
#[derive(Clone)]
pub struct ShelfWorker {
    shelf: Arc<Shelf>,
}

impl ShelfWorker {
    pub fn new(shelf: Arc<Shelf>) -> Self {
        Self { shelf }
    }

    pub fn shelf(&self) -> &Arc<Shelf> {
        &self.shelf
    }

    async fn run<R, F>(&self, task: F) -> Result<R, MutationError>
    where
        F: FnOnce(&Shelf) -> Result<R, MutationError> + Send + 'static,
        R: Send + 'static,
    {
        let shelf = Arc::clone(&self.shelf);
        let result = tokio::task::spawn_blocking(move || task(&shelf)).await;
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Shelf task failed: {}", e);
                Err(MutationError::TaskFailed {
                    message: format!("Task failed: {}", e),
                })
            }
        }
    }

    pub async fn add_library(&self, path: PathBuf) -> Result<LibraryId, MutationError> {
        self.run(move |shelf| Ok(shelf.add_library(&path)?)).await
    }

    pub async fn rescan_library(&self, id: LibraryId) -> Result<ScanReport, MutationError> {
        self.run(move |shelf| Ok(shelf.rescan_library(id)?)).await
    }

    pub async fn songs_in_folder(&self, folder: PathBuf, include_subfolders: bool) -> Result<Vec<ItemRef>, MutationError> {
        self.run(move |shelf| Ok(shelf.songs_in_folder(&folder, include_subfolders)?))
            .await
    }

    pub async fn move_item(
        &self,
        resolver: SharedResolver,
        source: PathBuf,
        dest_folder: PathBuf,
    ) -> Result<OperationSummary, MutationError> {
        self.run(move |shelf| shelf.move_item(resolver.as_ref(), &source, &dest_folder))
            .await
    }

    pub async fn copy_item(
        &self,
        resolver: SharedResolver,
        source: PathBuf,
        dest_folder: PathBuf,
    ) -> Result<OperationSummary, MutationError> {
        self.run(move |shelf| shelf.copy_item(resolver.as_ref(), &source, &dest_folder))
            .await
    }

    pub async fn delete_item(&self, target: PathBuf) -> Result<OperationSummary, MutationError> {
        self.run(move |shelf| shelf.delete_item(&target)).await
    }

    pub async fn rename_item(
        &self,
        resolver: SharedResolver,
        target: PathBuf,
        new_name: String,
    ) -> Result<OperationSummary, MutationError> {
        self.run(move |shelf| shelf.rename_item(resolver.as_ref(), &target, &new_name))
            .await
    }

    pub async fn song_tags(&self, path: PathBuf) -> Result<SongTags, MutationError> {
        self.run(move |shelf| shelf.song_tags(&path)).await
    }

    pub async fn update_song_tags(&self, path: PathBuf, update: TagUpdate) -> Result<SongTags, MutationError> {
        self.run(move |shelf| shelf.update_song_tags(&path, &update)).await
    }
}
