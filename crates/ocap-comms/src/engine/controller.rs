//! Setup operations issued by the host before traffic flows.

use crate::error::CommsError;
use crate::slots::{KernelSlot, LocalSlot, RemoteSlot, SlotKind};
use crate::state::{RemoteId, RemoteState};
use crate::syscall::{KernelSyscalls, Transmitter};

use super::Comms;

impl<K: KernelSyscalls, T: Transmitter> Comms<K, T> {
    /// Registers a new peer link with fresh counters and an empty table.
    pub fn add_remote(&mut self, name: &str) -> Result<RemoteId, CommsError> {
        let id = RemoteId::new(name);
        if self.state.remotes.contains_key(&id) {
            return Err(CommsError::DuplicateRemote(name.to_string()));
        }
        self.state.remotes.insert(id.clone(), RemoteState::default());
        log::debug!("added remote {id}");
        Ok(id)
    }

    /// Exposes a kernel object to `remote` under the well-known index
    /// `index`. The peer addresses it as `o+<index>` from its side.
    pub fn add_egress(
        &mut self,
        remote: &RemoteId,
        index: u64,
        kernel_object: KernelSlot,
    ) -> Result<LocalSlot, CommsError> {
        if kernel_object.kind() != SlotKind::Object {
            return Err(CommsError::WrongSlotKind {
                slot: kernel_object.to_string(),
                expected: SlotKind::Object,
            });
        }
        let rslot = RemoteSlot::new(SlotKind::Object, true, index);
        if self.state.insist_remote(remote)?.clist.local_for(&rslot).is_some() {
            return Err(CommsError::IdentifierInUse {
                space: "remote",
                id: rslot.to_string(),
            });
        }
        let lobj = self.provide_local_for_kernel(&kernel_object, &[])?;
        let link = self.state.remote_mut(remote)?;
        link.clist.reserve_index(SlotKind::Object, index);
        link.clist.insert(lobj, rslot);
        log::debug!("egress {kernel_object} to {remote} as {rslot}");
        Ok(lobj)
    }

    /// Imports the peer's well-known object `index` and returns the kernel
    /// slot through which local vats can reach it.
    pub fn add_ingress(&mut self, remote: &RemoteId, index: u64) -> Result<KernelSlot, CommsError> {
        let rslot = RemoteSlot::new(SlotKind::Object, false, index);
        if self.state.insist_remote(remote)?.clist.local_for(&rslot).is_some() {
            return Err(CommsError::IdentifierInUse {
                space: "remote",
                id: rslot.to_string(),
            });
        }
        let lobj = self.provide_local_for_remote(remote, &rslot)?;
        let kobj = self.provide_kernel_for_local(&lobj)?;
        log::debug!("ingress {rslot} from {remote} as kernel {kobj}");
        Ok(kobj)
    }
}
