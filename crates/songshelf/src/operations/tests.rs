//! Tests for the mutation engine, against an in-memory volume with fault injection.

use super::helpers::{Resolution, resolve_target};
use super::pending::PendingOperation;
use super::*;
use crate::conflict::{ConflictDecision, ConflictPolicy, ExistingEntry, FixedResolver};
use crate::events::{EventKind, LibraryEvent};
use crate::ignore_poison::IgnorePoison;
use crate::metadata::{InMemoryMetadata, MetadataError, SongTags, TagUpdate};
use crate::registry::{LibraryId, LibraryRegistry};
use crate::tree::ItemKind;
use crate::validation::ValidationError;
use crate::volume::{InMemoryVolume, Volume, VolumeError, VolumeOp};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// /music
/// ├── rock/
/// │   ├── live/encore.mp3
/// │   ├── notes.txt (not mirrored)
/// │   └── track 10.mp3, track 2.mp3
/// ├── jazz/ (empty)
/// └── a.mp3, b.mp3
/// /other (second library, empty)
fn sample_volume() -> InMemoryVolume {
    let volume = InMemoryVolume::new("Test");
    volume
        .add_file("/music/a.mp3", b"a")
        .add_file("/music/b.mp3", b"b")
        .add_directory("/music/jazz")
        .add_file("/music/rock/track 10.mp3", b"10")
        .add_file("/music/rock/track 2.mp3", b"2")
        .add_file("/music/rock/notes.txt", b"notes")
        .add_file("/music/rock/live/encore.mp3", b"encore")
        .add_directory("/other");
    volume
}

struct Fixture {
    volume: InMemoryVolume,
    config: ShelfConfig,
    bus: ObserverBus,
    registry: LibraryRegistry,
    music: LibraryId,
    other: LibraryId,
    events: Arc<Mutex<Vec<LibraryEvent>>>,
}

impl Fixture {
    fn new(volume: InMemoryVolume) -> Self {
        let config = ShelfConfig::default();
        let mut registry = LibraryRegistry::new();
        let music = registry.add_library(&volume, &config, Path::new("/music")).unwrap();
        let other = registry.add_library(&volume, &config, Path::new("/other")).unwrap();

        let bus = ObserverBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(move |event, _| sink.lock().unwrap().push(event.clone()));

        Self {
            volume,
            config,
            bus,
            registry,
            music,
            other,
            events,
        }
    }

    fn ctx(&self) -> OperationContext<'_> {
        OperationContext {
            volume: &self.volume,
            config: &self.config,
            bus: &self.bus,
        }
    }

    fn library(&self, id: LibraryId) -> Arc<Mutex<Library>> {
        self.registry.get(id).unwrap()
    }

    fn events(&self) -> Vec<LibraryEvent> {
        self.events.lock().unwrap().clone()
    }

    fn event_kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(LibraryEvent::kind).collect()
    }

    fn run_move(&self, policy: ConflictPolicy, source: &str, dest: &str) -> Result<OperationSummary, MutationError> {
        let library = self.library(self.music);
        let mut library = library.lock_ignore_poison();
        let libs = LibraryPair {
            source: &mut *library,
            dest: None,
        };
        move_item(
            &self.ctx(),
            &FixedResolver::new(policy),
            libs,
            Path::new(source),
            Path::new(dest),
        )
    }

    fn run_copy(&self, policy: ConflictPolicy, source: &str, dest: &str) -> Result<OperationSummary, MutationError> {
        let library = self.library(self.music);
        let mut library = library.lock_ignore_poison();
        let libs = LibraryPair {
            source: &mut *library,
            dest: None,
        };
        copy_item(
            &self.ctx(),
            &FixedResolver::new(policy),
            libs,
            Path::new(source),
            Path::new(dest),
        )
    }

    fn run_delete(&self, target: &str) -> Result<OperationSummary, MutationError> {
        let library = self.library(self.music);
        let mut library = library.lock_ignore_poison();
        delete_item(&self.ctx(), &mut library, Path::new(target))
    }

    fn run_rename(&self, target: &str, name: &str) -> Result<OperationSummary, MutationError> {
        let library = self.library(self.music);
        let mut library = library.lock_ignore_poison();
        rename_item(
            &self.ctx(),
            &FixedResolver::new(ConflictPolicy::Stop),
            &mut library,
            Path::new(target),
            name,
        )
    }

    fn in_mirror(&self, path: &str) -> bool {
        let library = self.library(self.music);
        let library = library.lock_ignore_poison();
        library.mirror().contains(Path::new(path))
    }

    fn song_count(&self) -> usize {
        self.library(self.music).lock_ignore_poison().mirror().song_count()
    }

    fn children(&self, folder: &str) -> Vec<String> {
        let library = self.library(self.music);
        let library = library.lock_ignore_poison();
        let mirror = library.mirror();
        let id = mirror.search_node(Path::new(folder)).unwrap();
        mirror
            .children(id)
            .iter()
            .map(|&c| mirror.get(c).unwrap().name().to_string())
            .collect()
    }
}

fn validation_error(result: Result<OperationSummary, MutationError>) -> ValidationError {
    match result {
        Err(MutationError::Validation { error }) => error,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

fn failed_paths(result: Result<OperationSummary, MutationError>) -> Vec<(String, FailureCause)> {
    match result {
        Err(MutationError::PartialFailure { failures, .. }) => {
            failures.into_iter().map(|f| (f.path, f.cause)).collect()
        }
        other => panic!("expected a partial failure, got {:?}", other),
    }
}

// ============================================================================
// PendingOperation
// ============================================================================

#[test]
fn test_pending_operation_counts_outcomes() {
    let mut op = PendingOperation::new(OperationKind::Copy, Path::new("/music/a.mp3"), None);
    let first = op.track(Path::new("/music/a.mp3"));
    let second = op.track(Path::new("/music/b.mp3"));
    op.succeed(first);
    op.skip(second);

    assert_eq!(op.outcome_of(Path::new("/music/b.mp3")), Some(ItemOutcome::Skipped));
    let summary = op.finish(None).unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert!(!summary.was_skipped());
}

#[test]
fn test_pending_operation_with_failure_finishes_as_error() {
    let mut op = PendingOperation::new(OperationKind::Delete, Path::new("/music/rock"), None);
    let index = op.track(Path::new("/music/rock/x.mp3"));
    op.fail(index, FailureCause::PermissionDenied);

    assert!(op.has_failures());
    let id = op.id().to_string();
    match op.finish(None) {
        Err(MutationError::PartialFailure { operation_id, failures }) => {
            assert_eq!(operation_id, id);
            assert_eq!(failures, vec![FailedItem::new(
                Path::new("/music/rock/x.mp3"),
                FailureCause::PermissionDenied
            )]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Collision resolution
// ============================================================================

#[test]
fn test_resolve_target_without_collision_proceeds() {
    let fx = Fixture::new(sample_volume());
    let resolution = resolve_target(
        &fx.ctx(),
        &FixedResolver::new(ConflictPolicy::Stop),
        Path::new("/music/a.mp3"),
        Path::new("/music/jazz"),
        "a.mp3",
    )
    .unwrap();
    assert!(matches!(resolution, Resolution::Proceed { ref name, replace: None } if name == "a.mp3"));
}

#[test]
fn test_resolve_target_walks_numbered_names() {
    let volume = sample_volume();
    volume.add_file("/music/jazz/a.mp3", b"").add_file("/music/jazz/a (1).mp3", b"");
    let fx = Fixture::new(volume);

    let resolution = resolve_target(
        &fx.ctx(),
        &FixedResolver::new(ConflictPolicy::Rename),
        Path::new("/music/a.mp3"),
        Path::new("/music/jazz"),
        "a.mp3",
    )
    .unwrap();
    assert!(matches!(resolution, Resolution::Proceed { ref name, replace: None } if name == "a (2).mp3"));
}

#[test]
fn test_resolve_target_gives_up_when_resolver_repeats_a_taken_name() {
    let volume = sample_volume();
    volume.add_file("/music/jazz/a.mp3", b"");
    let fx = Fixture::new(volume);
    let stubborn = |_: &str, _: &Path, _: &ExistingEntry| ConflictDecision::RenameAs("a.mp3".to_string());

    let result = resolve_target(
        &fx.ctx(),
        &stubborn,
        Path::new("/music/a.mp3"),
        Path::new("/music/jazz"),
        "a.mp3",
    );
    assert!(matches!(result, Err(MutationError::CollisionUnresolved { .. })));
}

#[test]
fn test_resolve_target_rejects_illegal_rename_suggestion() {
    let volume = sample_volume();
    volume.add_file("/music/jazz/a.mp3", b"");
    let fx = Fixture::new(volume);
    let bad = |_: &str, _: &Path, _: &ExistingEntry| ConflictDecision::RenameAs("a/b.mp3".to_string());

    let result = resolve_target(
        &fx.ctx(),
        &bad,
        Path::new("/music/a.mp3"),
        Path::new("/music/jazz"),
        "a.mp3",
    );
    assert!(matches!(
        result,
        Err(MutationError::Validation {
            error: ValidationError::IllegalName { .. }
        })
    ));
}

#[test]
fn test_resolve_target_refuses_replacing_an_ancestor_of_the_source() {
    let fx = Fixture::new(sample_volume());
    let result = resolve_target(
        &fx.ctx(),
        &FixedResolver::new(ConflictPolicy::Overwrite),
        Path::new("/music/rock/live"),
        Path::new("/music"),
        "rock",
    );
    assert!(matches!(
        result,
        Err(MutationError::Validation {
            error: ValidationError::SelfContainment { .. }
        })
    ));
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_delete_file_updates_disk_and_mirror() {
    let fx = Fixture::new(sample_volume());
    let summary = fx.run_delete("/music/a.mp3").unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(!fx.in_mirror("/music/a.mp3"));
    assert!(fx.volume.read_file("/music/a.mp3").is_none());
    assert_eq!(fx.events(), vec![
        LibraryEvent::NodeWillBeRemoved {
            path: PathBuf::from("/music/a.mp3")
        },
        LibraryEvent::NodeRemoved {
            path: PathBuf::from("/music/a.mp3")
        },
    ]);
}

#[test]
fn test_delete_folder_removes_unmirrored_files_too() {
    let fx = Fixture::new(sample_volume());
    fx.run_delete("/music/rock").unwrap();

    assert!(!fx.in_mirror("/music/rock"));
    assert!(fx.volume.paths_under("/music/rock").is_empty());
    assert_eq!(fx.song_count(), 2);
    // One removal event for the whole subtree
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeWillBeRemoved, EventKind::NodeRemoved]);
}

#[test]
fn test_delete_partial_failure_keeps_failed_entry_and_its_folders() {
    let volume = sample_volume();
    volume
        .add_file("/music/sub/song.mp3", b"")
        .add_file("/music/sub/other.mp3", b"")
        .fail_on(
            VolumeOp::Delete,
            "/music/sub/song.mp3",
            VolumeError::PermissionDenied("song.mp3".to_string()),
        );
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_delete("/music/sub"));

    assert_eq!(failures, vec![("/music/sub/song.mp3".to_string(), FailureCause::PermissionDenied)]);
    assert!(fx.in_mirror("/music/sub"));
    assert!(fx.in_mirror("/music/sub/song.mp3"));
    assert!(!fx.in_mirror("/music/sub/other.mp3"));
    assert!(!fx.volume.was_attempted(VolumeOp::Delete, "/music/sub"));
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeWillBeRemoved, EventKind::NodeRemoved]);
}

#[test]
fn test_delete_unlistable_folder_is_not_attempted() {
    let volume = sample_volume();
    volume.fail_on(VolumeOp::List, "/music/rock/live", VolumeError::PermissionDenied("live".to_string()));
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_delete("/music/rock"));

    assert_eq!(failures, vec![("/music/rock/live".to_string(), FailureCause::PermissionDenied)]);
    assert!(!fx.volume.was_attempted(VolumeOp::Delete, "/music/rock/live"));
    assert!(!fx.volume.was_attempted(VolumeOp::Delete, "/music/rock"));
    assert!(fx.in_mirror("/music/rock/live"));
    assert!(!fx.in_mirror("/music/rock/track 2.mp3"));
}

#[test]
fn test_delete_rejects_library_root_and_unknown_paths() {
    let fx = Fixture::new(sample_volume());

    assert!(matches!(validation_error(fx.run_delete("/music")), ValidationError::LibraryRoot { .. }));
    assert!(matches!(
        validation_error(fx.run_delete("/music/nope.mp3")),
        ValidationError::NotFound { .. }
    ));
    assert!(fx.volume.journal().is_empty());
}

#[test]
fn test_delete_of_entry_already_gone_from_disk_cleans_mirror() {
    let fx = Fixture::new(sample_volume());
    // Vanishes behind the mirror's back
    fx.volume.delete_entry(Path::new("/music/b.mp3")).unwrap();

    fx.run_delete("/music/b.mp3").unwrap();
    assert!(!fx.in_mirror("/music/b.mp3"));
}

// ============================================================================
// Move
// ============================================================================

#[test]
fn test_move_song_into_folder() {
    let fx = Fixture::new(sample_volume());
    let summary = fx.run_move(ConflictPolicy::Stop, "/music/a.mp3", "/music/rock").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/rock/a.mp3")));
    assert!(!fx.in_mirror("/music/a.mp3"));
    assert_eq!(fx.children("/music/rock"), vec!["live", "a.mp3", "track 2.mp3", "track 10.mp3"]);
    assert_eq!(fx.song_count(), 5);
    assert_eq!(fx.volume.read_file("/music/rock/a.mp3"), Some(b"a".to_vec()));
    assert_eq!(fx.events(), vec![LibraryEvent::NodeMoved {
        old_path: PathBuf::from("/music/a.mp3"),
        new_path: PathBuf::from("/music/rock/a.mp3"),
    }]);
}

#[test]
fn test_move_folder_rewrites_descendant_paths() {
    let fx = Fixture::new(sample_volume());
    fx.run_move(ConflictPolicy::Stop, "/music/rock", "/music/jazz").unwrap();

    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    assert!(!fx.in_mirror("/music/rock/live/encore.mp3"));
    assert_eq!(fx.volume.read_file("/music/jazz/rock/notes.txt"), Some(b"notes".to_vec()));
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeMoved]);
}

#[test]
fn test_move_into_own_descendant_is_rejected_without_side_effects() {
    let fx = Fixture::new(sample_volume());
    let before = fx.library(fx.music).lock_ignore_poison().mirror().snapshot();

    let error = validation_error(fx.run_move(ConflictPolicy::Stop, "/music/rock", "/music/rock/live"));

    assert!(matches!(error, ValidationError::SelfContainment { .. }));
    assert_eq!(fx.library(fx.music).lock_ignore_poison().mirror().snapshot(), before);
    assert!(fx.volume.journal().is_empty());
    assert!(fx.events().is_empty());
}

#[test]
fn test_move_to_current_folder_is_same_location() {
    let fx = Fixture::new(sample_volume());
    let error = validation_error(fx.run_move(ConflictPolicy::Stop, "/music/a.mp3", "/music"));
    assert!(matches!(error, ValidationError::SameLocation { .. }));
}

#[test]
fn test_move_onto_song_destination_is_not_a_directory() {
    let fx = Fixture::new(sample_volume());
    let error = validation_error(fx.run_move(ConflictPolicy::Stop, "/music/a.mp3", "/music/b.mp3"));
    assert!(matches!(error, ValidationError::NotADirectory { .. }));
}

#[test]
fn test_move_collision_replace_leaves_one_node() {
    let volume = sample_volume();
    volume.add_file("/music/rock/a.mp3", b"old");
    let fx = Fixture::new(volume);

    fx.run_move(ConflictPolicy::Overwrite, "/music/a.mp3", "/music/rock").unwrap();

    assert_eq!(
        fx.children("/music/rock").iter().filter(|n| n.as_str() == "a.mp3").count(),
        1
    );
    assert_eq!(fx.volume.read_file("/music/rock/a.mp3"), Some(b"a".to_vec()));
    assert_eq!(fx.event_kinds(), vec![
        EventKind::NodeWillBeRemoved,
        EventKind::NodeRemoved,
        EventKind::NodeMoved
    ]);
}

#[test]
fn test_move_collision_rename_keeps_both() {
    let volume = sample_volume();
    volume.add_file("/music/rock/a.mp3", b"old");
    let fx = Fixture::new(volume);

    let summary = fx.run_move(ConflictPolicy::Rename, "/music/a.mp3", "/music/rock").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/rock/a (1).mp3")));
    assert!(fx.in_mirror("/music/rock/a.mp3"));
    assert!(fx.in_mirror("/music/rock/a (1).mp3"));
    assert_eq!(fx.volume.read_file("/music/rock/a.mp3"), Some(b"old".to_vec()));
}

#[test]
fn test_move_collision_stop_and_skip_change_nothing() {
    let volume = sample_volume();
    volume.add_file("/music/rock/a.mp3", b"old");
    let fx = Fixture::new(volume);

    let stopped = fx.run_move(ConflictPolicy::Stop, "/music/a.mp3", "/music/rock");
    assert!(matches!(stopped, Err(MutationError::CollisionUnresolved { .. })));

    let skipped = fx.run_move(ConflictPolicy::Skip, "/music/a.mp3", "/music/rock").unwrap();
    assert!(skipped.was_skipped());
    assert_eq!(skipped.result_path, None);

    assert!(fx.in_mirror("/music/a.mp3"));
    assert!(fx.volume.journal().is_empty());
    assert!(fx.events().is_empty());
}

#[test]
fn test_move_disk_failure_leaves_mirror_untouched() {
    let volume = sample_volume();
    volume.fail_on(VolumeOp::Move, "/music/a.mp3", VolumeError::PermissionDenied("a.mp3".to_string()));
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_move(ConflictPolicy::Stop, "/music/a.mp3", "/music/jazz"));

    assert_eq!(failures, vec![("/music/a.mp3".to_string(), FailureCause::PermissionDenied)]);
    assert!(fx.in_mirror("/music/a.mp3"));
    assert!(!fx.in_mirror("/music/jazz/a.mp3"));
    assert!(fx.events().is_empty());
}

#[test]
fn test_move_across_libraries_keeps_loaded_tags() {
    let fx = Fixture::new(sample_volume());
    let music = fx.library(fx.music);
    let other = fx.library(fx.other);
    let tags = SongTags {
        title: "Encore".to_string(),
        rating: 4,
        ..SongTags::default()
    };

    {
        let mut music = music.lock_ignore_poison();
        let node = music.mirror().search_node(Path::new("/music/rock/live/encore.mp3")).unwrap();
        music.mirror.store_tags(node, tags.clone()).unwrap();
    }

    {
        let mut music = music.lock_ignore_poison();
        let mut other = other.lock_ignore_poison();
        move_item(
            &fx.ctx(),
            &FixedResolver::default(),
            LibraryPair {
                source: &mut *music,
                dest: Some(&mut *other),
            },
            Path::new("/music/rock"),
            Path::new("/other"),
        )
        .unwrap();
    }

    let music = music.lock_ignore_poison();
    let other = other.lock_ignore_poison();
    assert!(!music.mirror().contains(Path::new("/music/rock")));
    assert_eq!(music.mirror().song_count(), 2);
    assert_eq!(other.mirror().song_count(), 3);
    let moved = other.mirror().item_at(Path::new("/other/rock/live/encore.mp3")).unwrap();
    assert_eq!(moved.cached_tags(), Some(&tags));
}

#[test]
fn test_move_across_devices_copies_then_deletes() {
    let volume = sample_volume();
    volume.fail_on(VolumeOp::Move, "/music/rock", VolumeError::CrossesDevices("rock".to_string()));
    let fx = Fixture::new(volume);

    let summary = fx.run_move(ConflictPolicy::Stop, "/music/rock", "/music/jazz").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/jazz/rock")));
    assert!(fx.volume.paths_under("/music/rock").is_empty());
    assert_eq!(fx.volume.read_file("/music/jazz/rock/notes.txt"), Some(b"notes".to_vec()));
    assert_eq!(fx.volume.read_file("/music/jazz/rock/live/encore.mp3"), Some(b"encore".to_vec()));
    assert!(!fx.in_mirror("/music/rock"));
    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    assert_eq!(fx.song_count(), 5);
    assert_eq!(fx.events(), vec![LibraryEvent::NodeMoved {
        old_path: PathBuf::from("/music/rock"),
        new_path: PathBuf::from("/music/jazz/rock"),
    }]);
}

#[test]
fn test_move_across_devices_failed_copy_leaves_source_alone() {
    let volume = sample_volume();
    volume
        .fail_on(VolumeOp::Move, "/music/rock", VolumeError::CrossesDevices("rock".to_string()))
        .fail_on(
            VolumeOp::Copy,
            "/music/rock/track 2.mp3",
            VolumeError::PermissionDenied("track 2.mp3".to_string()),
        );
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_move(ConflictPolicy::Stop, "/music/rock", "/music/jazz"));

    assert_eq!(failures, vec![("/music/rock/track 2.mp3".to_string(), FailureCause::PermissionDenied)]);
    // The half-made copy is cleaned up again
    assert_eq!(fx.volume.paths_under("/music/jazz"), vec![PathBuf::from("/music/jazz")]);
    assert_eq!(fx.volume.read_file("/music/rock/track 2.mp3"), Some(b"2".to_vec()));
    assert!(fx.in_mirror("/music/rock/live/encore.mp3"));
    assert!(!fx.in_mirror("/music/jazz/rock"));
    assert!(fx.events().is_empty());
}

#[test]
fn test_move_across_devices_mirrors_what_could_not_be_deleted() {
    let volume = sample_volume();
    volume
        .fail_on(VolumeOp::Move, "/music/rock", VolumeError::CrossesDevices("rock".to_string()))
        .fail_on(
            VolumeOp::Delete,
            "/music/rock/live/encore.mp3",
            VolumeError::PermissionDenied("encore.mp3".to_string()),
        );
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_move(ConflictPolicy::Stop, "/music/rock", "/music/jazz"));

    assert!(failures.contains(&("/music/rock/live/encore.mp3".to_string(), FailureCause::PermissionDenied)));
    // The copy is complete, and the leftover source is still shown where it is on disk
    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    assert!(fx.in_mirror("/music/jazz/rock/track 2.mp3"));
    assert!(fx.in_mirror("/music/rock/live/encore.mp3"));
    assert!(!fx.in_mirror("/music/rock/track 2.mp3"));
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeMoved, EventKind::NodeAdded]);
}

// ============================================================================
// Copy
// ============================================================================

#[test]
fn test_copy_folder_adds_one_top_node_event() {
    let fx = Fixture::new(sample_volume());
    let summary = fx.run_copy(ConflictPolicy::Stop, "/music/rock", "/music/jazz").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/jazz/rock")));
    assert_eq!(fx.song_count(), 8);
    assert!(fx.in_mirror("/music/rock/live/encore.mp3"));
    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    // Unmirrored files are copied on disk anyway
    assert_eq!(fx.volume.read_file("/music/jazz/rock/notes.txt"), Some(b"notes".to_vec()));
    assert!(!fx.in_mirror("/music/jazz/rock/notes.txt"));
    assert_eq!(fx.events(), vec![LibraryEvent::NodeAdded {
        parent: PathBuf::from("/music/jazz"),
        node: crate::tree::ItemRef {
            path: PathBuf::from("/music/jazz/rock"),
            kind: ItemKind::Folder,
        },
    }]);
}

#[test]
fn test_copy_into_same_folder_with_rename() {
    let fx = Fixture::new(sample_volume());
    let summary = fx.run_copy(ConflictPolicy::Rename, "/music/a.mp3", "/music").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/a (1).mp3")));
    assert!(fx.in_mirror("/music/a.mp3"));
    assert!(fx.in_mirror("/music/a (1).mp3"));
    assert_eq!(fx.song_count(), 6);
}

#[test]
fn test_copy_onto_itself_with_replace_is_skipped() {
    let fx = Fixture::new(sample_volume());
    let summary = fx.run_copy(ConflictPolicy::Overwrite, "/music/a.mp3", "/music").unwrap();

    assert!(summary.was_skipped());
    assert!(fx.in_mirror("/music/a.mp3"));
    assert!(!fx.volume.was_attempted(VolumeOp::Delete, "/music/a.mp3"));
}

#[test]
fn test_copy_partial_failure_keeps_what_was_copied() {
    let volume = sample_volume();
    volume.fail_on(
        VolumeOp::Copy,
        "/music/rock/track 2.mp3",
        VolumeError::IoError("disk full".to_string()),
    );
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_copy(ConflictPolicy::Stop, "/music/rock", "/music/jazz"));

    assert_eq!(failures, vec![(
        "/music/rock/track 2.mp3".to_string(),
        FailureCause::Io {
            message: "disk full".to_string()
        }
    )]);
    assert!(fx.in_mirror("/music/jazz/rock/track 10.mp3"));
    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    assert!(!fx.in_mirror("/music/jazz/rock/track 2.mp3"));
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeAdded]);
}

#[test]
fn test_copy_failed_folder_is_not_descended() {
    let volume = sample_volume();
    volume.fail_on(
        VolumeOp::CreateDirectory,
        "/music/jazz/rock/live",
        VolumeError::PermissionDenied("live".to_string()),
    );
    let fx = Fixture::new(volume);

    let failures = failed_paths(fx.run_copy(ConflictPolicy::Stop, "/music/rock", "/music/jazz"));

    assert_eq!(failures.len(), 1);
    assert!(!fx.volume.was_attempted(VolumeOp::Copy, "/music/rock/live/encore.mp3"));
    assert!(fx.in_mirror("/music/jazz/rock/track 2.mp3"));
}

#[test]
fn test_copy_into_itself_is_rejected() {
    let fx = Fixture::new(sample_volume());
    let error = validation_error(fx.run_copy(ConflictPolicy::Stop, "/music/rock", "/music/rock/live"));
    assert!(matches!(error, ValidationError::SelfContainment { .. }));
    assert!(fx.volume.journal().is_empty());
}

#[test]
fn test_copy_cancel_on_collision_adds_nothing() {
    let volume = sample_volume();
    volume.add_file("/music/jazz/a.mp3", b"old");
    let fx = Fixture::new(volume);

    let result = fx.run_copy(ConflictPolicy::Stop, "/music/a.mp3", "/music/jazz");

    assert!(matches!(result, Err(MutationError::CollisionUnresolved { .. })));
    assert_eq!(fx.volume.read_file("/music/jazz/a.mp3"), Some(b"old".to_vec()));
    assert!(fx.events().is_empty());
}

#[test]
fn test_copy_with_rename_numbers_past_many_existing_copies() {
    let volume = sample_volume();
    volume.add_file("/music/jazz/a.mp3", b"old");
    for n in 1..=8 {
        volume.add_file(format!("/music/jazz/a ({}).mp3", n), b"old");
    }
    let fx = Fixture::new(volume);

    let summary = fx.run_copy(ConflictPolicy::Rename, "/music/a.mp3", "/music/jazz").unwrap();

    assert_eq!(summary.result_path, Some(PathBuf::from("/music/jazz/a (9).mp3")));
    assert_eq!(fx.volume.read_file("/music/jazz/a (9).mp3"), Some(b"a".to_vec()));
    assert!(fx.in_mirror("/music/jazz/a (9).mp3"));
}

#[test]
fn test_copy_with_rename_past_the_largest_counter() {
    let volume = sample_volume();
    volume
        .add_file("/music/x (18446744073709551615).mp3", b"x")
        .add_file("/music/jazz/x (18446744073709551615).mp3", b"old");
    let fx = Fixture::new(volume);

    let summary = fx
        .run_copy(ConflictPolicy::Rename, "/music/x (18446744073709551615).mp3", "/music/jazz")
        .unwrap();

    assert_eq!(
        summary.result_path,
        Some(PathBuf::from("/music/jazz/x (18446744073709551615) (1).mp3"))
    );
}

/// Drops a file into one folder right after the engine creates it, like another program would.
struct RacingVolume<'a> {
    inner: &'a InMemoryVolume,
    folder: PathBuf,
    intruder: PathBuf,
}

impl Volume for RacingVolume<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<crate::volume::DirEntry>, VolumeError> {
        self.inner.list_directory(path)
    }

    fn entry_kind(&self, path: &Path) -> Result<crate::volume::EntryKind, VolumeError> {
        self.inner.entry_kind(path)
    }

    fn move_entry(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        self.inner.move_entry(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), VolumeError> {
        self.inner.copy_file(from, to)
    }

    fn create_directory(&self, path: &Path) -> Result<(), VolumeError> {
        self.inner.create_directory(path)?;
        if path == self.folder {
            self.inner.add_file(&self.intruder, b"intruder");
        }
        Ok(())
    }

    fn delete_entry(&self, path: &Path) -> Result<(), VolumeError> {
        self.inner.delete_entry(path)
    }
}

#[test]
fn test_copy_cancel_partway_keeps_earlier_entries() {
    let fx = Fixture::new(sample_volume());
    let volume = RacingVolume {
        inner: &fx.volume,
        folder: PathBuf::from("/music/jazz/rock"),
        intruder: PathBuf::from("/music/jazz/rock/track 2.mp3"),
    };
    let ctx = OperationContext {
        volume: &volume,
        config: &fx.config,
        bus: &fx.bus,
    };
    let cancel_on_track_2 = |name: &str, _: &Path, _: &ExistingEntry| {
        if name == "track 2.mp3" {
            ConflictDecision::CancelAll
        } else {
            ConflictDecision::Skip
        }
    };

    let library = fx.library(fx.music);
    let result = {
        let mut library = library.lock_ignore_poison();
        copy_item(
            &ctx,
            &cancel_on_track_2,
            LibraryPair {
                source: &mut *library,
                dest: None,
            },
            Path::new("/music/rock"),
            Path::new("/music/jazz"),
        )
    };

    assert!(matches!(
        result,
        Err(MutationError::CollisionUnresolved { ref path }) if path == "/music/jazz/rock/track 2.mp3"
    ));
    // Walk order is live/, encore.mp3, notes.txt, then track 2.mp3
    assert!(fx.in_mirror("/music/jazz/rock"));
    assert!(fx.in_mirror("/music/jazz/rock/live/encore.mp3"));
    assert_eq!(fx.volume.read_file("/music/jazz/rock/notes.txt"), Some(b"notes".to_vec()));
    assert_eq!(fx.volume.read_file("/music/jazz/rock/track 2.mp3"), Some(b"intruder".to_vec()));
    assert!(!fx.volume.was_attempted(VolumeOp::Copy, "/music/rock/track 10.mp3"));
    assert_eq!(fx.events(), vec![LibraryEvent::NodeAdded {
        parent: PathBuf::from("/music/jazz"),
        node: crate::tree::ItemRef {
            path: PathBuf::from("/music/jazz/rock"),
            kind: ItemKind::Folder,
        },
    }]);
}

// ============================================================================
// Rename
// ============================================================================

#[test]
fn test_rename_keeps_sibling_position() {
    let fx = Fixture::new(sample_volume());
    fx.run_rename("/music/a.mp3", "zz.mp3").unwrap();

    // Stays where it was until the next rescan
    assert_eq!(fx.children("/music"), vec!["jazz", "rock", "zz.mp3", "b.mp3"]);
    assert_eq!(fx.events(), vec![LibraryEvent::NodeMoved {
        old_path: PathBuf::from("/music/a.mp3"),
        new_path: PathBuf::from("/music/zz.mp3"),
    }]);
}

#[test]
fn test_rename_folder_rewrites_descendants() {
    let fx = Fixture::new(sample_volume());
    fx.run_rename("/music/rock", "metal").unwrap();

    assert!(fx.in_mirror("/music/metal/live/encore.mp3"));
    assert!(!fx.in_mirror("/music/rock"));
}

#[test]
fn test_rename_validation() {
    let fx = Fixture::new(sample_volume());

    assert!(matches!(
        validation_error(fx.run_rename("/music/a.mp3", "a?.mp3")),
        ValidationError::IllegalName { .. }
    ));
    assert!(matches!(
        validation_error(fx.run_rename("/music/a.mp3", "  ")),
        ValidationError::EmptyName
    ));
    assert!(matches!(
        validation_error(fx.run_rename("/music/a.mp3", "a.mp3")),
        ValidationError::SameLocation { .. }
    ));
    assert!(matches!(
        validation_error(fx.run_rename("/music", "tunes")),
        ValidationError::LibraryRoot { .. }
    ));
    assert!(fx.volume.journal().is_empty());
}

#[test]
fn test_rename_onto_existing_name_with_stop_cancels() {
    let fx = Fixture::new(sample_volume());
    let result = fx.run_rename("/music/a.mp3", "b.mp3");
    assert!(matches!(result, Err(MutationError::CollisionUnresolved { .. })));
    assert!(fx.in_mirror("/music/a.mp3"));
}

#[test]
fn test_rename_to_non_song_extension_drops_node() {
    let fx = Fixture::new(sample_volume());
    fx.run_rename("/music/a.mp3", "a.txt").unwrap();

    assert!(!fx.in_mirror("/music/a.mp3"));
    assert!(!fx.in_mirror("/music/a.txt"));
    assert_eq!(fx.volume.read_file("/music/a.txt"), Some(b"a".to_vec()));
    assert_eq!(fx.event_kinds(), vec![EventKind::NodeWillBeRemoved, EventKind::NodeRemoved]);
}

// ============================================================================
// Tags
// ============================================================================

#[test]
fn test_song_tags_are_read_once_then_cached() {
    let fx = Fixture::new(sample_volume());
    let metadata = InMemoryMetadata::new();
    metadata.set("/music/a.mp3", SongTags {
        title: "A".to_string(),
        ..SongTags::default()
    });
    let library = fx.library(fx.music);
    let mut library = library.lock_ignore_poison();

    let first = song_tags(&mut library, &metadata, Path::new("/music/a.mp3")).unwrap();
    let second = song_tags(&mut library, &metadata, Path::new("/music/a.mp3")).unwrap();

    assert_eq!(first.title, "A");
    assert_eq!(first, second);
    assert_eq!(metadata.read_count(), 1);
}

#[test]
fn test_song_tags_rejects_folders() {
    let fx = Fixture::new(sample_volume());
    let library = fx.library(fx.music);
    let mut library = library.lock_ignore_poison();

    let result = song_tags(&mut library, &InMemoryMetadata::new(), Path::new("/music/rock"));
    assert!(matches!(
        result,
        Err(MutationError::Validation {
            error: ValidationError::NotASong { .. }
        })
    ));
}

#[test]
fn test_update_song_tags_writes_through_and_notifies() {
    let fx = Fixture::new(sample_volume());
    let metadata = InMemoryMetadata::new();
    let library = fx.library(fx.music);
    let mut library = library.lock_ignore_poison();
    let update = TagUpdate {
        rating: Some(5),
        genre: Some("Rock".to_string()),
        ..TagUpdate::default()
    };

    let tags = update_song_tags(&fx.ctx(), &mut library, &metadata, Path::new("/music/b.mp3"), &update).unwrap();

    assert_eq!(tags.rating, 5);
    assert_eq!(metadata.get("/music/b.mp3").unwrap().genre, "Rock");
    let node = library.mirror().item_at(Path::new("/music/b.mp3")).unwrap();
    assert_eq!(node.cached_tags(), Some(&tags));
    assert_eq!(fx.events(), vec![LibraryEvent::NodeMetadataChanged {
        path: PathBuf::from("/music/b.mp3")
    }]);
}

#[test]
fn test_update_song_tags_rejects_bad_rating() {
    let fx = Fixture::new(sample_volume());
    let metadata = InMemoryMetadata::new();
    let library = fx.library(fx.music);
    let mut library = library.lock_ignore_poison();
    let update = TagUpdate {
        rating: Some(6),
        ..TagUpdate::default()
    };

    let result = update_song_tags(&fx.ctx(), &mut library, &metadata, Path::new("/music/b.mp3"), &update);

    assert_eq!(
        result,
        Err(MutationError::Metadata {
            error: MetadataError::InvalidRating { value: 6 }
        })
    );
    assert_eq!(metadata.read_count(), 0);
}
