use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::slots::{LocalSlot, SlotKind};

/// Bidirectional map between local slots and one peer namespace (the kernel
/// or a single remote), plus the counters used to allocate peer-side slots.
///
/// `from_peer` and `to_peer` normally mirror each other. They diverge only
/// while a remote promise ID is awaiting acknowledged retirement: the
/// outbound direction is dropped first so later references get fresh IDs,
/// and the inbound direction stays until the peer acknowledges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CList<R: Ord> {
    from_peer: BTreeMap<R, LocalSlot>,
    to_peer: BTreeMap<LocalSlot, R>,
    next_object: u64,
    next_promise: u64,
}

impl<R: Ord> Default for CList<R> {
    fn default() -> Self {
        Self {
            from_peer: BTreeMap::new(),
            to_peer: BTreeMap::new(),
            next_object: 1,
            next_promise: 1,
        }
    }
}

impl<R: Ord + Copy> CList<R> {
    pub fn local_for(&self, peer: &R) -> Option<LocalSlot> {
        self.from_peer.get(peer).copied()
    }

    pub fn peer_for(&self, local: &LocalSlot) -> Option<R> {
        self.to_peer.get(local).copied()
    }

    pub fn insert(&mut self, local: LocalSlot, peer: R) {
        self.from_peer.insert(peer, local);
        self.to_peer.insert(local, peer);
    }

    /// Hands out the next peer-side index for `kind`.
    pub fn next_index(&mut self, kind: SlotKind) -> u64 {
        let counter = match kind {
            SlotKind::Object => &mut self.next_object,
            SlotKind::Promise => &mut self.next_promise,
        };
        let index = *counter;
        *counter += 1;
        index
    }

    /// Keeps the allocator clear of an index chosen out of band.
    pub fn reserve_index(&mut self, kind: SlotKind, index: u64) {
        let counter = match kind {
            SlotKind::Object => &mut self.next_object,
            SlotKind::Promise => &mut self.next_promise,
        };
        *counter = (*counter).max(index + 1);
    }

    /// Removes the outbound direction only, if it still points at `peer`.
    pub fn forget_outbound(&mut self, local: &LocalSlot, peer: &R) {
        if self.to_peer.get(local) == Some(peer) {
            self.to_peer.remove(local);
        }
    }

    /// Removes `peer` in both directions, returning the local slot it named.
    pub fn remove(&mut self, peer: &R) -> Option<LocalSlot> {
        let local = self.from_peer.remove(peer)?;
        self.forget_outbound(&local, peer);
        Some(local)
    }

    pub fn len(&self) -> usize {
        self.from_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_peer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::RemoteSlot;

    fn rp(index: u64) -> RemoteSlot {
        RemoteSlot::new(SlotKind::Promise, true, index)
    }

    #[test]
    fn forget_outbound_keeps_inbound_lookup() {
        let mut clist = CList::default();
        clist.insert(LocalSlot::promise(1), rp(1));
        clist.forget_outbound(&LocalSlot::promise(1), &rp(1));
        assert_eq!(clist.peer_for(&LocalSlot::promise(1)), None);
        assert_eq!(clist.local_for(&rp(1)), Some(LocalSlot::promise(1)));

        assert_eq!(clist.remove(&rp(1)), Some(LocalSlot::promise(1)));
        assert!(clist.is_empty());
    }

    #[test]
    fn forget_outbound_ignores_stale_pairs() {
        let mut clist = CList::default();
        clist.insert(LocalSlot::promise(1), rp(1));
        clist.insert(LocalSlot::promise(1), rp(2));
        clist.forget_outbound(&LocalSlot::promise(1), &rp(1));
        assert_eq!(clist.peer_for(&LocalSlot::promise(1)), Some(rp(2)));
    }

    #[test]
    fn reserved_indices_are_skipped() {
        let mut clist: CList<RemoteSlot> = CList::default();
        assert_eq!(clist.next_index(SlotKind::Object), 1);
        clist.reserve_index(SlotKind::Object, 7);
        assert_eq!(clist.next_index(SlotKind::Object), 8);
        assert_eq!(clist.next_index(SlotKind::Promise), 1);
    }
}
