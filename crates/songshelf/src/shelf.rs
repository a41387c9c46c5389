//! The top-level, thread-safe entry point.
//!
//! `Shelf` ties the registry, the volume, the metadata provider and the observer bus together.
//! Every public call normalizes its paths, routes them to the owning library and runs the
//! operation with that library locked. Calls are blocking; use `ShelfWorker` to run them off
//! the interface thread.

use crate::config::ShelfConfig;
use crate::conflict::ConflictResolver;
use crate::events::{EventKind, LibraryEvent, ObserverBus, SubscriptionId};
use crate::ignore_poison::{IgnorePoison, IgnorePoisonRw};
use crate::metadata::{MetadataProvider, NoMetadata, SongTags, TagUpdate};
use crate::operations::{self, LibraryPair, MutationError, OperationContext, OperationSummary};
use crate::registry::{Library, LibraryId, LibraryRegistry, scan_error};
use crate::tree::{FileTreeMirror, ItemRef, ScanReport};
use crate::validation::{ValidationError, normalize_path};
use crate::volume::{LocalVolume, Volume};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Libraries, collaborators and the bus, shareable across threads.
pub struct Shelf {
    volume: Arc<dyn Volume>,
    metadata: Arc<dyn MetadataProvider>,
    config: ShelfConfig,
    bus: ObserverBus,
    registry: RwLock<LibraryRegistry>,
}

impl Shelf {
    /// A shelf without tag support. `song_tags` reports `Unavailable`.
    pub fn new(volume: Arc<dyn Volume>, config: ShelfConfig) -> Self {
        Self::with_metadata(volume, Arc::new(NoMetadata), config)
    }

    pub fn with_metadata(volume: Arc<dyn Volume>, metadata: Arc<dyn MetadataProvider>, config: ShelfConfig) -> Self {
        log::debug!("Shelf created on volume {}", volume.name());
        Self {
            volume,
            metadata,
            config,
            bus: ObserverBus::new(),
            registry: RwLock::new(LibraryRegistry::new()),
        }
    }

    /// A shelf on the local file system.
    pub fn local(config: ShelfConfig) -> Self {
        Self::new(Arc::new(LocalVolume::default()), config)
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn volume(&self) -> &dyn Volume {
        self.volume.as_ref()
    }

    pub fn bus(&self) -> &ObserverBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, kinds: &[EventKind], handler: F) -> SubscriptionId
    where
        F: Fn(&LibraryEvent, Option<&FileTreeMirror>) + Send + Sync + 'static,
    {
        self.bus.subscribe(kinds, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn context(&self) -> OperationContext<'_> {
        OperationContext {
            volume: self.volume.as_ref(),
            config: &self.config,
            bus: &self.bus,
        }
    }

    // ========================================================================
    // Libraries
    // ========================================================================

    /// Registers `path` as a library and scans it.
    ///
    /// The scan runs without holding the registry, so other libraries stay usable meanwhile.
    /// The root is validated again before it's inserted in case another add raced us.
    pub fn add_library(&self, path: &Path) -> Result<LibraryId, ValidationError> {
        let root = self.registry.read_ignore_poison().validate_new_root(self.volume(), path)?;
        let (mirror, report) =
            FileTreeMirror::scan_with_report(self.volume(), &root, &self.config).map_err(|e| scan_error(&root, e))?;

        let (id, library) = {
            let mut registry = self.registry.write_ignore_poison();
            registry.validate_new_root(self.volume(), &root)?;
            registry.insert(mirror, report)
        };
        let library = library.lock_ignore_poison();
        self.bus
            .publish(&LibraryEvent::LibraryAdded { library: id }, Some(library.mirror()));
        Ok(id)
    }

    /// Forgets a library. Disk is untouched. Returns false for an unknown id.
    pub fn remove_library(&self, id: LibraryId) -> bool {
        let Some(removed) = self.registry.write_ignore_poison().remove_library(id) else {
            return false;
        };
        let root = removed.lock_ignore_poison().root().to_path_buf();
        self.bus.publish(&LibraryEvent::LibraryRemoved { library: id, root }, None);
        true
    }

    /// Rebuilds one library's mirror from disk. Observers get `LibraryAdded` again.
    ///
    /// The report lists subfolders that couldn't be read; they're mirrored as empty.
    pub fn rescan_library(&self, id: LibraryId) -> Result<ScanReport, ValidationError> {
        let library = self.registry.read_ignore_poison().get(id).ok_or_else(|| ValidationError::NotFound {
            path: id.to_string(),
        })?;
        let mut library = library.lock_ignore_poison();
        let root = library.root().to_path_buf();
        let (mirror, report) =
            FileTreeMirror::scan_with_report(self.volume(), &root, &self.config).map_err(|e| scan_error(&root, e))?;
        log::info!("Rescanned {} at {}", id, root.display());
        library.mirror = mirror;
        library.last_scan = report.clone();
        self.bus
            .publish(&LibraryEvent::LibraryAdded { library: id }, Some(library.mirror()));
        Ok(report)
    }

    pub fn library_ids(&self) -> Vec<LibraryId> {
        self.registry.read_ignore_poison().library_ids()
    }

    pub fn library_root(&self, id: LibraryId) -> Option<PathBuf> {
        self.registry.read_ignore_poison().library_root(id).map(Path::to_path_buf)
    }

    pub fn is_library_root(&self, path: &Path) -> bool {
        self.registry.read_ignore_poison().is_library_root(path)
    }

    pub fn find_library_containing(&self, path: &Path) -> Option<LibraryId> {
        self.registry.read_ignore_poison().find_library_containing(path)
    }

    /// Runs `f` with the library locked. `None` for an unknown id.
    pub fn with_library<R>(&self, id: LibraryId, f: impl FnOnce(&Library) -> R) -> Option<R> {
        let library = self.registry.read_ignore_poison().get(id)?;
        let library = library.lock_ignore_poison();
        Some(f(&*library))
    }

    /// Runs `f` on the mirror of the library containing `path`.
    pub fn with_mirror_containing<R>(&self, path: &Path, f: impl FnOnce(&FileTreeMirror) -> R) -> Option<R> {
        let (_, _, library) = self.route(path).ok()?;
        let library = library.lock_ignore_poison();
        Some(f(library.mirror()))
    }

    /// Songs directly in `folder`, or in its whole subtree with `include_subfolders`.
    pub fn songs_in_folder(&self, folder: &Path, include_subfolders: bool) -> Result<Vec<ItemRef>, ValidationError> {
        let (folder, _, library) = self.route(folder)?;
        let library = library.lock_ignore_poison();
        let mirror = library.mirror();
        let node = mirror.search_node(&folder).ok_or_else(|| ValidationError::NotFound {
            path: folder.display().to_string(),
        })?;
        if !mirror.get(node).is_some_and(|item| item.is_folder()) {
            return Err(ValidationError::NotADirectory {
                path: folder.display().to_string(),
            });
        }
        Ok(mirror
            .songs_in_folder(node, include_subfolders)
            .into_iter()
            .map(|item| item.to_ref())
            .collect())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn move_item(
        &self,
        resolver: &dyn ConflictResolver,
        source: &Path,
        dest_folder: &Path,
    ) -> Result<OperationSummary, MutationError> {
        self.with_pair(source, dest_folder, |ctx, libs, source, dest_folder| {
            operations::move_item(ctx, resolver, libs, source, dest_folder)
        })
    }

    pub fn copy_item(
        &self,
        resolver: &dyn ConflictResolver,
        source: &Path,
        dest_folder: &Path,
    ) -> Result<OperationSummary, MutationError> {
        self.with_pair(source, dest_folder, |ctx, libs, source, dest_folder| {
            operations::copy_item(ctx, resolver, libs, source, dest_folder)
        })
    }

    pub fn delete_item(&self, target: &Path) -> Result<OperationSummary, MutationError> {
        let (target, _, library) = self.route(target)?;
        let mut library = library.lock_ignore_poison();
        operations::delete_item(&self.context(), &mut library, &target)
    }

    pub fn rename_item(
        &self,
        resolver: &dyn ConflictResolver,
        target: &Path,
        new_name: &str,
    ) -> Result<OperationSummary, MutationError> {
        let (target, _, library) = self.route(target)?;
        let mut library = library.lock_ignore_poison();
        operations::rename_item(&self.context(), resolver, &mut library, &target, new_name)
    }

    /// A song's tags, read from the file on first access and cached afterwards.
    pub fn song_tags(&self, path: &Path) -> Result<SongTags, MutationError> {
        let (path, _, library) = self.route(path)?;
        let mut library = library.lock_ignore_poison();
        operations::song_tags(&mut library, self.metadata.as_ref(), &path)
    }

    pub fn update_song_tags(&self, path: &Path, update: &TagUpdate) -> Result<SongTags, MutationError> {
        let (path, _, library) = self.route(path)?;
        let mut library = library.lock_ignore_poison();
        operations::update_song_tags(&self.context(), &mut library, self.metadata.as_ref(), &path, update)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Normalizes `path` and finds its library. Holds the registry lock only for the lookup.
    fn route(&self, path: &Path) -> Result<(PathBuf, LibraryId, Arc<Mutex<Library>>), ValidationError> {
        let normalized = normalize_path(path).ok_or_else(|| ValidationError::NotFound {
            path: path.display().to_string(),
        })?;
        let registry = self.registry.read_ignore_poison();
        let outside = || ValidationError::OutsideLibrary {
            path: normalized.display().to_string(),
        };
        let id = registry.find_library_containing(&normalized).ok_or_else(outside)?;
        let library = registry.get(id).ok_or_else(outside)?;
        Ok((normalized, id, library))
    }

    /// Locks the libraries of `source` and `dest` (once if they're the same, else in id order
    /// so two opposite cross-library calls can't deadlock) and runs `f`.
    fn with_pair<R>(
        &self,
        source: &Path,
        dest: &Path,
        f: impl FnOnce(&OperationContext<'_>, LibraryPair<'_>, &Path, &Path) -> Result<R, MutationError>,
    ) -> Result<R, MutationError> {
        let (source, source_id, source_library) = self.route(source)?;
        let (dest, dest_id, dest_library) = self.route(dest)?;
        let ctx = self.context();

        if source_id == dest_id {
            let mut library = source_library.lock_ignore_poison();
            let libs = LibraryPair {
                source: &mut *library,
                dest: None,
            };
            return f(&ctx, libs, &source, &dest);
        }

        log::debug!("Cross-library operation: {} -> {}", source_id, dest_id);
        let (mut source_guard, mut dest_guard) = if source_id < dest_id {
            let source_guard = source_library.lock_ignore_poison();
            (source_guard, dest_library.lock_ignore_poison())
        } else {
            let dest_guard = dest_library.lock_ignore_poison();
            (source_library.lock_ignore_poison(), dest_guard)
        };
        let libs = LibraryPair {
            source: &mut *source_guard,
            dest: Some(&mut *dest_guard),
        };
        f(&ctx, libs, &source, &dest)
    }
}
