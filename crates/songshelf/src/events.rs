//! Library change events and the observer bus.
//!
//! Events form a closed enum. Subscribers register for one or more `EventKind`s and get called
//! synchronously, in registration order, right after the mirror edit that caused the event. The
//! handler receives a read-only view of the affected mirror, which already reflects the event.
//!
//! Handlers run while the library is locked: they must not call back into mutations of the
//! same library.

use crate::ignore_poison::IgnorePoison;
use crate::registry::LibraryId;
use crate::tree::{FileTreeMirror, ItemRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A change to the set of libraries or to one library's tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    LibraryAdded { library: LibraryId },
    /// `root` is where the library was, so holders of paths under it can let go.
    LibraryRemoved { library: LibraryId, root: PathBuf },
    /// A node appeared under `parent`. For a copied folder this is sent once, for its top node.
    NodeAdded { parent: PathBuf, node: ItemRef },
    /// Sent before a delete touches disk or mirror.
    NodeWillBeRemoved { path: PathBuf },
    NodeRemoved { path: PathBuf },
    /// Move or rename.
    NodeMoved { old_path: PathBuf, new_path: PathBuf },
    NodeMetadataChanged { path: PathBuf },
}

/// Discriminant of `LibraryEvent`, used to filter subscriptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LibraryAdded,
    LibraryRemoved,
    NodeAdded,
    NodeWillBeRemoved,
    NodeRemoved,
    NodeMoved,
    NodeMetadataChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::LibraryAdded,
        EventKind::LibraryRemoved,
        EventKind::NodeAdded,
        EventKind::NodeWillBeRemoved,
        EventKind::NodeRemoved,
        EventKind::NodeMoved,
        EventKind::NodeMetadataChanged,
    ];
}

impl LibraryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LibraryAdded { .. } => EventKind::LibraryAdded,
            Self::LibraryRemoved { .. } => EventKind::LibraryRemoved,
            Self::NodeAdded { .. } => EventKind::NodeAdded,
            Self::NodeWillBeRemoved { .. } => EventKind::NodeWillBeRemoved,
            Self::NodeRemoved { .. } => EventKind::NodeRemoved,
            Self::NodeMoved { .. } => EventKind::NodeMoved,
            Self::NodeMetadataChanged { .. } => EventKind::NodeMetadataChanged,
        }
    }
}

/// Handle returned by `subscribe`, needed to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Subscriber callback. The mirror is `None` for `LibraryRemoved`.
pub type EventHandler = Arc<dyn Fn(&LibraryEvent, Option<&FileTreeMirror>) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>,
}

/// Fan-out of library events to subscribers.
#[derive(Default)]
pub struct ObserverBus {
    subscribers: Mutex<Subscribers>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every kind in `kinds`. One id covers all of them.
    pub fn subscribe<F>(&self, kinds: &[EventKind], handler: F) -> SubscriptionId
    where
        F: Fn(&LibraryEvent, Option<&FileTreeMirror>) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let mut subscribers = self.subscribers.lock_ignore_poison();
        subscribers.next_id += 1;
        let id = SubscriptionId(subscribers.next_id);
        for kind in kinds {
            let list = subscribers.by_kind.entry(*kind).or_default();
            // Listing a kind twice shouldn't double-deliver
            if !list.iter().any(|(existing, _)| *existing == id) {
                list.push((id, handler.clone()));
            }
        }
        log::debug!("Subscriber {:?} registered for {:?}", id, kinds);
        id
    }

    /// Registers `handler` for every event kind.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LibraryEvent, Option<&FileTreeMirror>) + Send + Sync + 'static,
    {
        self.subscribe(&EventKind::ALL, handler)
    }

    /// Removes a subscription. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock_ignore_poison();
        let mut found = false;
        for list in subscribers.by_kind.values_mut() {
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            found |= list.len() != before;
        }
        found
    }

    /// Number of handlers that would receive an event of `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .lock_ignore_poison()
            .by_kind
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers `event` to its subscribers in registration order.
    ///
    /// The handler list is copied before dispatch, so handlers may subscribe or unsubscribe
    /// without deadlocking; such changes apply from the next event on.
    pub fn publish(&self, event: &LibraryEvent, mirror: Option<&FileTreeMirror>) {
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.lock_ignore_poison();
            match subscribers.by_kind.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
                None => return,
            }
        };
        log::trace!("Publishing {:?} to {} subscribers", event, handlers.len());
        for handler in handlers {
            handler(event, mirror);
        }
    }
}
