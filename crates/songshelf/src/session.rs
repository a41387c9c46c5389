//! Per-application view state: which folders the panels show, the clipboard, what's playing.
//!
//! A `Session` listens on the shelf's bus so its paths stay valid: a move or rename rewrites
//! them, a delete or a removed library clears them. Playlists are kept here too and follow the
//! same rules, song by song.

use crate::conflict::ConflictResolver;
use crate::events::{EventKind, LibraryEvent, SubscriptionId};
use crate::ignore_poison::IgnorePoison;
use crate::operations::{MutationError, OperationSummary};
use crate::shelf::Shelf;
use crate::tree::{ItemKind, ItemRef};
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Whether pasting copies or moves the clipboard item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardMode {
    Copy,
    Cut,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Clipboard {
    pub path: PathBuf,
    pub mode: ClipboardMode,
}

/// A named, ordered list of songs. The same song may appear more than once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub name: String,
    pub songs: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct SessionState {
    selected_folder: Option<PathBuf>,
    right_panel_folder: Option<PathBuf>,
    clipboard: Option<Clipboard>,
    show_subfolder_songs: bool,
    now_playing: Option<PathBuf>,
    playlists: Vec<Playlist>,
}

impl SessionState {
    fn paths_mut(&mut self) -> [&mut Option<PathBuf>; 3] {
        [&mut self.selected_folder, &mut self.right_panel_folder, &mut self.now_playing]
    }

    fn on_removed(&mut self, removed: &Path) {
        for slot in self.paths_mut() {
            if slot.as_deref().is_some_and(|path| path.starts_with(removed)) {
                log::debug!("Session: clearing {:?}, it's being removed", slot);
                *slot = None;
            }
        }
        if self.clipboard.as_ref().is_some_and(|clip| clip.path.starts_with(removed)) {
            self.clipboard = None;
        }
        for playlist in &mut self.playlists {
            playlist.songs.retain(|song| !song.starts_with(removed));
        }
    }

    fn on_moved(&mut self, old_path: &Path, new_path: &Path) {
        for slot in self.paths_mut() {
            if let Some(path) = slot.as_mut() {
                follow(path, old_path, new_path);
            }
        }
        if let Some(clip) = self.clipboard.as_mut() {
            follow(&mut clip.path, old_path, new_path);
        }
        for song in self.playlists.iter_mut().flat_map(|playlist| playlist.songs.iter_mut()) {
            follow(song, old_path, new_path);
        }
    }

    fn playlist_mut(&mut self, name: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|playlist| playlist.name == name)
    }
}

/// Rewrites `path` if it's `old_path` or below it.
fn follow(path: &mut PathBuf, old_path: &Path, new_path: &Path) {
    if let Ok(rest) = path.strip_prefix(old_path) {
        *path = if rest.as_os_str().is_empty() {
            new_path.to_path_buf()
        } else {
            new_path.join(rest)
        };
    }
}

/// View state bound to one shelf. Unsubscribes from the bus when dropped.
pub struct Session {
    shelf: Arc<Shelf>,
    state: Arc<Mutex<SessionState>>,
    subscription: SubscriptionId,
}

impl Session {
    pub fn new(shelf: Arc<Shelf>) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));
        let handler_state = state.clone();
        let subscription = shelf.subscribe(
            &[EventKind::NodeWillBeRemoved, EventKind::NodeMoved, EventKind::LibraryRemoved],
            move |event, _| {
                let mut state = handler_state.lock_ignore_poison();
                match event {
                    LibraryEvent::NodeWillBeRemoved { path } => state.on_removed(path),
                    LibraryEvent::LibraryRemoved { root, .. } => state.on_removed(root),
                    LibraryEvent::NodeMoved { old_path, new_path } => state.on_moved(old_path, new_path),
                    _ => {}
                }
            },
        );
        Self {
            shelf,
            state,
            subscription,
        }
    }

    pub fn shelf(&self) -> &Arc<Shelf> {
        &self.shelf
    }

    pub fn select_folder(&self, folder: Option<PathBuf>) {
        self.state.lock_ignore_poison().selected_folder = folder;
    }

    pub fn selected_folder(&self) -> Option<PathBuf> {
        self.state.lock_ignore_poison().selected_folder.clone()
    }

    pub fn set_right_panel_folder(&self, folder: Option<PathBuf>) {
        self.state.lock_ignore_poison().right_panel_folder = folder;
    }

    pub fn right_panel_folder(&self) -> Option<PathBuf> {
        self.state.lock_ignore_poison().right_panel_folder.clone()
    }

    pub fn set_show_subfolder_songs(&self, show: bool) {
        self.state.lock_ignore_poison().show_subfolder_songs = show;
    }

    pub fn show_subfolder_songs(&self) -> bool {
        self.state.lock_ignore_poison().show_subfolder_songs
    }

    pub fn set_now_playing(&self, song: Option<PathBuf>) {
        self.state.lock_ignore_poison().now_playing = song;
    }

    pub fn now_playing(&self) -> Option<PathBuf> {
        self.state.lock_ignore_poison().now_playing.clone()
    }

    pub fn copy_to_clipboard(&self, path: PathBuf) {
        self.state.lock_ignore_poison().clipboard = Some(Clipboard {
            path,
            mode: ClipboardMode::Copy,
        });
    }

    pub fn cut_to_clipboard(&self, path: PathBuf) {
        self.state.lock_ignore_poison().clipboard = Some(Clipboard {
            path,
            mode: ClipboardMode::Cut,
        });
    }

    pub fn clipboard(&self) -> Option<Clipboard> {
        self.state.lock_ignore_poison().clipboard.clone()
    }

    pub fn clear_clipboard(&self) {
        self.state.lock_ignore_poison().clipboard = None;
    }

    /// Adds an empty playlist. False if one with that name exists already.
    pub fn add_playlist(&self, name: &str) -> bool {
        let mut state = self.state.lock_ignore_poison();
        if state.playlists.iter().any(|playlist| playlist.name == name) {
            return false;
        }
        state.playlists.push(Playlist {
            name: name.to_string(),
            songs: Vec::new(),
        });
        true
    }

    pub fn remove_playlist(&self, name: &str) -> bool {
        let mut state = self.state.lock_ignore_poison();
        let before = state.playlists.len();
        state.playlists.retain(|playlist| playlist.name != name);
        state.playlists.len() != before
    }

    /// Appends `song` to the playlist called `name`. False if there's no such playlist or
    /// `song` isn't a song in one of the shelf's libraries.
    pub fn add_to_playlist(&self, name: &str, song: &Path) -> bool {
        // Checked before locking the state: the bus handler takes the two locks the other way
        let is_song = self
            .shelf
            .with_mirror_containing(song, |mirror| mirror.item_at(song).map(|item| item.kind()))
            .flatten()
            == Some(ItemKind::Song);
        if !is_song {
            log::debug!("Session: {} isn't a song, not adding it to {}", song.display(), name);
            return false;
        }
        match self.state.lock_ignore_poison().playlist_mut(name) {
            Some(playlist) => {
                playlist.songs.push(song.to_path_buf());
                true
            }
            None => false,
        }
    }

    pub fn playlist(&self, name: &str) -> Option<Playlist> {
        self.state
            .lock_ignore_poison()
            .playlists
            .iter()
            .find(|playlist| playlist.name == name)
            .cloned()
    }

    /// All playlists, in the order they were added.
    pub fn playlists(&self) -> Vec<Playlist> {
        self.state.lock_ignore_poison().playlists.clone()
    }

    /// Pastes the clipboard into `dest_folder`. `Ok(None)` when the clipboard is empty.
    ///
    /// A copy leaves the clipboard as it is, so it can be pasted again. A cut is cleared once the
    /// move went through.
    pub fn paste_into(
        &self,
        resolver: &dyn ConflictResolver,
        dest_folder: &Path,
    ) -> Result<Option<OperationSummary>, MutationError> {
        // Released before the call: the bus handler locks the same state
        let Some(clip) = self.clipboard() else {
            return Ok(None);
        };
        let summary = match clip.mode {
            ClipboardMode::Copy => self.shelf.copy_item(resolver, &clip.path, dest_folder)?,
            ClipboardMode::Cut => {
                let summary = self.shelf.move_item(resolver, &clip.path, dest_folder)?;
                if !summary.was_skipped() {
                    self.clear_clipboard();
                }
                summary
            }
        };
        Ok(Some(summary))
    }

    /// Songs for the center panel: the selected folder's songs, including subfolders when
    /// `show_subfolder_songs` is on. Empty when nothing is selected.
    pub fn center_panel_songs(&self) -> Result<Vec<ItemRef>, ValidationError> {
        let (folder, include_subfolders) = {
            let state = self.state.lock_ignore_poison();
            (state.selected_folder.clone(), state.show_subfolder_songs)
        };
        match folder {
            Some(folder) => self.shelf.songs_in_folder(&folder, include_subfolders),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shelf.unsubscribe(self.subscription);
    }
}
