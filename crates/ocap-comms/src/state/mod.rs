//! Per-instance protocol state: object ownership, the promise ledger, the
//! kernel CList, and one link record per remote.

mod promise;
mod remote;

pub use promise::{Decider, PromiseRecord, PromiseTable, Settlement, Subscribers};
pub use remote::{PendingRetirement, RemoteId, RemoteState};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clist::CList;
use crate::error::CommsError;
use crate::slots::{KernelSlot, LocalSlot, SlotKind};

/// Home of a local object. Fixed at allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOwner {
    Kernel,
    Remote(RemoteId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommsState {
    pub(crate) objects: BTreeMap<LocalSlot, ObjectOwner>,
    pub(crate) promises: PromiseTable,
    pub(crate) kernel: CList<KernelSlot>,
    pub(crate) remotes: BTreeMap<RemoteId, RemoteState>,
    next_local_object: u64,
    next_local_promise: u64,
}

impl Default for CommsState {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            promises: PromiseTable::default(),
            kernel: CList::default(),
            remotes: BTreeMap::new(),
            next_local_object: 1,
            next_local_promise: 1,
        }
    }
}

impl CommsState {
    pub fn object_owner(&self, lobj: &LocalSlot) -> Option<&ObjectOwner> {
        self.objects.get(lobj)
    }

    pub fn promises(&self) -> &PromiseTable {
        &self.promises
    }

    pub fn promise(&self, lpid: &LocalSlot) -> Option<&PromiseRecord> {
        self.promises.get(lpid)
    }

    pub fn kernel_clist(&self) -> &CList<KernelSlot> {
        &self.kernel
    }

    pub fn remote(&self, id: &RemoteId) -> Option<&RemoteState> {
        self.remotes.get(id)
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &RemoteId> {
        self.remotes.keys()
    }

    /// Whether `slot` names anything this process knows about.
    pub fn knows(&self, slot: &LocalSlot) -> bool {
        self.objects.contains_key(slot) || self.promises.contains(slot)
    }

    pub(crate) fn remote_mut(&mut self, id: &RemoteId) -> Result<&mut RemoteState, CommsError> {
        self.remotes
            .get_mut(id)
            .ok_or_else(|| CommsError::UnknownRemote(id.to_string()))
    }

    pub(crate) fn insist_remote(&self, id: &RemoteId) -> Result<&RemoteState, CommsError> {
        self.remotes
            .get(id)
            .ok_or_else(|| CommsError::UnknownRemote(id.to_string()))
    }

    pub(crate) fn allocate_object(&mut self, owner: ObjectOwner) -> LocalSlot {
        let slot = LocalSlot::object(self.next_local_object);
        self.next_local_object += 1;
        self.objects.insert(slot, owner);
        log::trace!("allocated {slot}");
        slot
    }

    pub(crate) fn allocate_promise(&mut self, decider: Decider) -> LocalSlot {
        let slot = LocalSlot::promise(self.next_local_promise);
        self.next_local_promise += 1;
        log::trace!("allocated {slot} decided by {decider}");
        self.promises.insert(slot, decider);
        slot
    }

    pub(crate) fn allocate(&mut self, kind: SlotKind, home: ObjectOwner) -> LocalSlot {
        match kind {
            SlotKind::Object => self.allocate_object(home),
            SlotKind::Promise => self.allocate_promise(match home {
                ObjectOwner::Kernel => Decider::Kernel,
                ObjectOwner::Remote(id) => Decider::Remote(id),
            }),
        }
    }
}
