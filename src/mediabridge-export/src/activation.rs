//! Reference counting of extension activation by bus peers.
//!
//! Every peer that sets `activate = true` on an extension holds one
//! reference until it sets `activate = false` or leaves the bus. Peers are
//! watched for disappearance only while they hold at least one reference.

use crate::registry::ExportId;
use mediabridge_bus::{BusConnection, MatchRule};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First reference of this peer on the object.
    Added {
        /// The peer held nothing before and must now be watched.
        watch_peer: bool,
    },
    AlreadyRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Release {
    pub was_registered: bool,
    /// The object lost its last reference.
    pub object_released: bool,
    /// The peer holds nothing anymore and no longer needs watching.
    pub unwatch_peer: bool,
}

/// Peer → objects and object → count, always updated together.
#[derive(Debug, Default)]
pub struct ActivationIndex {
    by_peer: HashMap<String, BTreeSet<ExportId>>,
    counts: HashMap<ExportId, usize>,
}

impl ActivationIndex {
    pub fn register(&mut self, peer: &str, object: ExportId) -> Registration {
        let objects = self.by_peer.entry(peer.to_owned()).or_default();
        let watch_peer = objects.is_empty();
        if !objects.insert(object) {
            return Registration::AlreadyRequested;
        }
        *self.counts.entry(object).or_insert(0) += 1;
        Registration::Added { watch_peer }
    }

    pub fn unregister(&mut self, peer: &str, object: ExportId) -> Release {
        let Some(objects) = self.by_peer.get_mut(peer) else {
            return Release::default();
        };
        if !objects.remove(&object) {
            return Release::default();
        }
        let unwatch_peer = objects.is_empty();
        if unwatch_peer {
            self.by_peer.remove(peer);
        }

        let object_released = match self.counts.get_mut(&object) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                self.counts.remove(&object);
                true
            }
        };
        Release {
            was_registered: true,
            object_released,
            unwatch_peer,
        }
    }

    /// Drops every reference held by `peer`; returns the objects that lost
    /// their last reference.
    pub fn forget_peer(&mut self, peer: &str) -> Vec<ExportId> {
        let objects: Vec<ExportId> = match self.by_peer.get(peer) {
            Some(objects) => objects.iter().copied().collect(),
            None => return Vec::new(),
        };
        objects
            .into_iter()
            .filter(|object| self.unregister(peer, *object).object_released)
            .collect()
    }

    /// Drops every reference to `object`; returns peers that hold nothing
    /// anymore.
    pub fn forget_object(&mut self, object: ExportId) -> Vec<String> {
        self.counts.remove(&object);
        let mut emptied = Vec::new();
        self.by_peer.retain(|peer, objects| {
            if objects.remove(&object) && objects.is_empty() {
                emptied.push(peer.clone());
                return false;
            }
            true
        });
        emptied.sort();
        emptied
    }

    pub fn count(&self, object: ExportId) -> usize {
        self.counts.get(&object).copied().unwrap_or(0)
    }

    pub fn holds(&self, peer: &str) -> bool {
        self.by_peer.contains_key(peer)
    }
}

/// [`ActivationIndex`] plus the bus presence watches it implies.
pub(crate) struct ActivationTracker {
    index: RefCell<ActivationIndex>,
    bus: Rc<dyn BusConnection>,
}

impl ActivationTracker {
    pub fn new(bus: Rc<dyn BusConnection>) -> Self {
        Self {
            index: RefCell::new(ActivationIndex::default()),
            bus,
        }
    }

    pub fn activate(&self, peer: &str, object: ExportId) -> Registration {
        let registration = self.index.borrow_mut().register(peer, object);
        match registration {
            Registration::Added { watch_peer } => {
                tracing::debug!(%peer, object = object.0, "activation registered");
                if watch_peer {
                    self.watch(peer);
                }
            }
            Registration::AlreadyRequested => {
                tracing::debug!(%peer, object = object.0, "activation already requested");
            }
        }
        registration
    }

    /// Returns true if the object lost its last reference.
    pub fn deactivate(&self, peer: &str, object: ExportId) -> bool {
        let release = self.index.borrow_mut().unregister(peer, object);
        if !release.was_registered {
            tracing::debug!(%peer, object = object.0, "deactivation without activation");
            return false;
        }
        if release.unwatch_peer {
            self.unwatch(peer);
        }
        release.object_released
    }

    /// Releases everything a vanished peer held; returns the objects that
    /// lost their last reference, or `None` if the peer held nothing.
    pub fn peer_vanished(&self, peer: &str) -> Option<Vec<ExportId>> {
        if !self.index.borrow().holds(peer) {
            return None;
        }
        let released = self.index.borrow_mut().forget_peer(peer);
        tracing::info!(%peer, released = released.len(), "activating peer left the bus");
        self.unwatch(peer);
        Some(released)
    }

    pub fn purge_object(&self, object: ExportId) {
        let emptied = self.index.borrow_mut().forget_object(object);
        for peer in emptied {
            self.unwatch(&peer);
        }
    }

    pub fn count(&self, object: ExportId) -> usize {
        self.index.borrow().count(object)
    }

    fn watch(&self, peer: &str) {
        if let Err(err) = self.bus.add_match(&MatchRule::name_owner_changed(peer)) {
            tracing::warn!(%peer, error = %err, "failed to watch peer");
        }
    }

    fn unwatch(&self, peer: &str) {
        if let Err(err) = self.bus.remove_match(&MatchRule::name_owner_changed(peer)) {
            tracing::warn!(%peer, error = %err, "failed to unwatch peer");
        }
    }
}
