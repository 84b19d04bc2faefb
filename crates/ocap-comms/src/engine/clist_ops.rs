//! Translation between local slots and the two peer namespaces.
//!
//! `get_*` lookups fail when no mapping exists. `provide_*` lookups create
//! one: toward a peer by allocating a fresh peer-side index, from a peer by
//! allocating a local entity homed at that peer. Promise lookups also keep
//! the subscription flags current.

use crate::capdata::CapData;
use crate::error::CommsError;
use crate::slots::{KernelSlot, LocalSlot, RemoteSlot, SlotKind};
use crate::state::{Decider, ObjectOwner, RemoteId};
use crate::syscall::{KernelSyscalls, Transmitter};

use super::Comms;

fn unknown(space: &'static str, id: impl ToString) -> CommsError {
    CommsError::UnknownIdentifier {
        space,
        id: id.to_string(),
    }
}

fn insist_promise(slot: impl ToString, kind: SlotKind) -> Result<(), CommsError> {
    if kind != SlotKind::Promise {
        return Err(CommsError::WrongSlotKind {
            slot: slot.to_string(),
            expected: SlotKind::Promise,
        });
    }
    Ok(())
}

impl<K: KernelSyscalls, T: Transmitter> Comms<K, T> {
    // ---- kernel side ----

    pub(crate) fn get_kernel_for_local(&self, lslot: &LocalSlot) -> Result<KernelSlot, CommsError> {
        self.state
            .kernel
            .peer_for(lslot)
            .ok_or_else(|| unknown("kernel-facing", lslot))
    }

    pub(crate) fn provide_kernel_for_local(
        &mut self,
        lslot: &LocalSlot,
    ) -> Result<KernelSlot, CommsError> {
        let kslot = match self.state.kernel.peer_for(lslot) {
            Some(kslot) => kslot,
            None => {
                match lslot.kind() {
                    // kernel objects always arrive from the kernel, mapped
                    SlotKind::Object => match self.state.objects.get(lslot) {
                        Some(ObjectOwner::Remote(_)) => {}
                        Some(ObjectOwner::Kernel) => return Err(unknown("kernel-facing", lslot)),
                        None => return Err(unknown("local", lslot)),
                    },
                    SlotKind::Promise => {
                        if !self.state.promises.contains(lslot) {
                            return Err(unknown("local", lslot));
                        }
                    }
                }
                let index = self.state.kernel.next_index(lslot.kind());
                let kslot = KernelSlot::exported(lslot.kind(), index);
                self.state.kernel.insert(*lslot, kslot);
                log::trace!("exported {lslot} to kernel as {kslot}");
                kslot
            }
        };
        if lslot.is_promise() {
            let record = self
                .state
                .promises
                .get(lslot)
                .ok_or_else(|| unknown("promise", lslot))?;
            if !record.is_resolved() && record.decider() != &Decider::Kernel {
                self.state.promises.subscribe_kernel(lslot)?;
            }
        }
        Ok(kslot)
    }

    /// Hands a result promise to the kernel, which becomes its decider.
    pub(crate) fn provide_kernel_for_local_result(
        &mut self,
        lresult: Option<&LocalSlot>,
    ) -> Result<Option<KernelSlot>, CommsError> {
        let Some(lpid) = lresult else {
            return Ok(None);
        };
        self.state.promises.delegate_result(lpid, Decider::Kernel)?;
        self.provide_kernel_for_local(lpid).map(Some)
    }

    pub(crate) fn get_local_for_kernel(&self, kslot: &KernelSlot) -> Result<LocalSlot, CommsError> {
        self.state
            .kernel
            .local_for(kslot)
            .ok_or_else(|| unknown("kernel", kslot))
    }

    /// Kernel promises listed in `do_not_subscribe` are being resolved in
    /// the same batch, so the kernel is not asked to report on them.
    pub(crate) fn provide_local_for_kernel(
        &mut self,
        kslot: &KernelSlot,
        do_not_subscribe: &[KernelSlot],
    ) -> Result<LocalSlot, CommsError> {
        if let Some(lslot) = self.state.kernel.local_for(kslot) {
            return Ok(lslot);
        }
        if kslot.allocated_here() {
            return Err(unknown("kernel", kslot));
        }
        let lslot = self.state.allocate(kslot.kind(), ObjectOwner::Kernel);
        self.state.kernel.insert(lslot, *kslot);
        log::trace!("imported kernel {kslot} as {lslot}");
        if kslot.kind() == SlotKind::Promise && !do_not_subscribe.contains(kslot) {
            self.kernel.subscribe(*kslot);
        }
        Ok(lslot)
    }

    /// Takes over a result promise from the kernel. Comms decides it until
    /// the call is routed, and the kernel wants the answer.
    pub(crate) fn provide_local_for_kernel_result(
        &mut self,
        kresult: Option<&KernelSlot>,
    ) -> Result<Option<LocalSlot>, CommsError> {
        let Some(kpid) = kresult else {
            return Ok(None);
        };
        insist_promise(kpid, kpid.kind())?;
        let lpid = match self.state.kernel.local_for(kpid) {
            Some(lpid) => {
                self.state.promises.change_decider_from_kernel_to_comms(&lpid)?;
                lpid
            }
            None => {
                if kpid.allocated_here() {
                    return Err(unknown("kernel", kpid));
                }
                let lpid = self.state.allocate_promise(Decider::Comms);
                self.state.kernel.insert(lpid, *kpid);
                lpid
            }
        };
        self.state.promises.subscribe_kernel(&lpid)?;
        Ok(Some(lpid))
    }

    pub(crate) fn retire_kernel_promise_id(&mut self, kpid: &KernelSlot) -> Result<(), CommsError> {
        let lpid = self.get_local_for_kernel(kpid)?;
        if !self.state.promises.is_resolved(&lpid)? {
            return Err(CommsError::NotResolved(lpid));
        }
        self.state.kernel.remove(kpid);
        log::trace!("retired kernel {kpid} ({lpid})");
        Ok(())
    }

    // ---- remote side ----

    pub(crate) fn get_remote_for_local(
        &self,
        remote: &RemoteId,
        lslot: &LocalSlot,
    ) -> Result<RemoteSlot, CommsError> {
        self.state
            .insist_remote(remote)?
            .clist
            .peer_for(lslot)
            .ok_or_else(|| unknown("remote-facing", lslot))
    }

    pub(crate) fn provide_remote_for_local(
        &mut self,
        remote: &RemoteId,
        lslot: &LocalSlot,
    ) -> Result<RemoteSlot, CommsError> {
        let existing = self.state.insist_remote(remote)?.clist.peer_for(lslot);
        let rslot = match existing {
            Some(rslot) => rslot,
            None => {
                match lslot.kind() {
                    // a remote's own objects are mapped when they first arrive
                    SlotKind::Object => match self.state.objects.get(lslot) {
                        Some(ObjectOwner::Remote(owner)) if owner == remote => {
                            return Err(unknown("remote-facing", lslot));
                        }
                        Some(_) => {}
                        None => return Err(unknown("local", lslot)),
                    },
                    SlotKind::Promise => {
                        if !self.state.promises.contains(lslot) {
                            return Err(unknown("local", lslot));
                        }
                    }
                }
                let link = self.state.remote_mut(remote)?;
                let index = link.clist.next_index(lslot.kind());
                let rslot = RemoteSlot::new(lslot.kind(), true, index);
                link.clist.insert(*lslot, rslot);
                log::trace!("exported {lslot} to {remote} as {rslot}");
                rslot
            }
        };
        if lslot.is_promise() {
            let record = self
                .state
                .promises
                .get(lslot)
                .ok_or_else(|| unknown("promise", lslot))?;
            if !record.is_resolved() && record.decider() != &Decider::Remote(remote.clone()) {
                self.state.promises.subscribe_remote(lslot, remote)?;
            }
        }
        Ok(rslot)
    }

    /// Hands a result promise to `remote`, which becomes its decider.
    pub(crate) fn provide_remote_for_local_result(
        &mut self,
        remote: &RemoteId,
        lpid: &LocalSlot,
    ) -> Result<RemoteSlot, CommsError> {
        self.state
            .promises
            .delegate_result(lpid, Decider::Remote(remote.clone()))?;
        self.provide_remote_for_local(remote, lpid)
    }

    pub(crate) fn get_local_for_remote(
        &self,
        remote: &RemoteId,
        rslot: &RemoteSlot,
    ) -> Result<LocalSlot, CommsError> {
        self.state
            .insist_remote(remote)?
            .clist
            .local_for(rslot)
            .ok_or_else(|| unknown("remote", rslot))
    }

    pub(crate) fn provide_local_for_remote(
        &mut self,
        remote: &RemoteId,
        rslot: &RemoteSlot,
    ) -> Result<LocalSlot, CommsError> {
        if let Some(lslot) = self.state.insist_remote(remote)?.clist.local_for(rslot) {
            return Ok(lslot);
        }
        if rslot.allocated_here() {
            return Err(unknown("remote", rslot));
        }
        let lslot = self
            .state
            .allocate(rslot.kind(), ObjectOwner::Remote(remote.clone()));
        self.state.remote_mut(remote)?.clist.insert(lslot, *rslot);
        log::trace!("imported {rslot} from {remote} as {lslot}");
        Ok(lslot)
    }

    /// Takes over a result promise named by `remote` in a delivery. The
    /// sender hears about the answer.
    pub(crate) fn provide_local_for_remote_result(
        &mut self,
        remote: &RemoteId,
        rpid: &RemoteSlot,
    ) -> Result<LocalSlot, CommsError> {
        insist_promise(rpid, rpid.kind())?;
        let known = self.state.insist_remote(remote)?.clist.local_for(rpid);
        let lpid = match known {
            Some(lpid) => {
                self.state
                    .promises
                    .change_decider_from_remote_to_comms(&lpid, remote)?;
                lpid
            }
            None => {
                let lpid = self.state.allocate_promise(Decider::Comms);
                let link = self.state.remote_mut(remote)?;
                // the peer may name a result in our half of the namespace
                if rpid.allocated_here() {
                    link.clist.reserve_index(SlotKind::Promise, rpid.index());
                }
                link.clist.insert(lpid, *rpid);
                lpid
            }
        };
        self.state.promises.subscribe_remote(&lpid, remote)?;
        Ok(lpid)
    }

    pub(crate) fn retire_remote_promise_id(
        &mut self,
        remote: &RemoteId,
        rpid: &RemoteSlot,
    ) -> Result<(), CommsError> {
        let lpid = self.get_local_for_remote(remote, rpid)?;
        if !self.state.promises.is_resolved(&lpid)? {
            return Err(CommsError::NotResolved(lpid));
        }
        self.state.remote_mut(remote)?.clist.remove(rpid);
        log::trace!("retired {rpid} on {remote} ({lpid})");
        Ok(())
    }

    /// First half of retiring an ID we resolved toward `remote`: later
    /// references get a fresh ID, while inbound uses of the old one stay
    /// valid until the peer acknowledges unit `sent_seq`.
    pub(crate) fn begin_remote_promise_retirement(
        &mut self,
        remote: &RemoteId,
        rpid: &RemoteSlot,
        sent_seq: u64,
    ) -> Result<(), CommsError> {
        let link = self.state.remote_mut(remote)?;
        if let Some(lpid) = link.clist.local_for(rpid) {
            link.clist.forget_outbound(&lpid, rpid);
        }
        link.queue_retirement(sent_seq, *rpid);
        Ok(())
    }

    // ---- data mapping ----

    pub(crate) fn map_data_to_kernel(
        &mut self,
        data: &CapData<LocalSlot>,
    ) -> Result<CapData<KernelSlot>, CommsError> {
        data.try_map_slots(|slot| self.provide_kernel_for_local(slot))
    }

    pub(crate) fn map_data_from_kernel(
        &mut self,
        data: &CapData<KernelSlot>,
        do_not_subscribe: &[KernelSlot],
    ) -> Result<CapData<LocalSlot>, CommsError> {
        data.try_map_slots(|slot| self.provide_local_for_kernel(slot, do_not_subscribe))
    }

    /// Slots come back in the recipient's perspective, ready for the wire.
    pub(crate) fn map_data_to_remote(
        &mut self,
        remote: &RemoteId,
        data: &CapData<LocalSlot>,
    ) -> Result<CapData<RemoteSlot>, CommsError> {
        data.try_map_slots(|slot| {
            self.provide_remote_for_local(remote, slot)
                .map(|rslot| rslot.flipped())
        })
    }

    pub(crate) fn map_data_from_remote(
        &mut self,
        remote: &RemoteId,
        data: &CapData<RemoteSlot>,
    ) -> Result<CapData<LocalSlot>, CommsError> {
        data.try_map_slots(|slot| self.provide_local_for_remote(remote, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{comms, remote};
    use super::*;

    fn ko(index: u64) -> KernelSlot {
        KernelSlot::imported(SlotKind::Object, index)
    }

    fn kp(index: u64) -> KernelSlot {
        KernelSlot::imported(SlotKind::Promise, index)
    }

    #[test]
    fn kernel_imports_are_stable_and_subscribe_promises() {
        let mut comms = comms();
        let obj = comms.provide_local_for_kernel(&ko(1), &[]).unwrap();
        assert_eq!(comms.provide_local_for_kernel(&ko(1), &[]).unwrap(), obj);
        assert_eq!(comms.get_kernel_for_local(&obj).unwrap(), ko(1));

        let promise = comms.provide_local_for_kernel(&kp(3), &[]).unwrap();
        assert_eq!(
            comms.state.promise(&promise).unwrap().decider(),
            &Decider::Kernel
        );
        comms.provide_local_for_kernel(&kp(4), &[kp(4)]).unwrap();
        assert_eq!(comms.kernel().subscribed(), vec![kp(3)]);
    }

    #[test]
    fn kernel_cannot_name_unknown_comms_allocations() {
        let mut comms = comms();
        let err = comms
            .provide_local_for_kernel(&KernelSlot::exported(SlotKind::Object, 9), &[])
            .unwrap_err();
        assert!(matches!(err, CommsError::UnknownIdentifier { .. }));
    }

    #[test]
    fn kernel_objects_without_mapping_are_not_exported_back() {
        let mut comms = comms();
        let obj = comms.state.allocate_object(ObjectOwner::Kernel);
        assert!(matches!(
            comms.provide_kernel_for_local(&obj),
            Err(CommsError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn remote_objects_are_exported_to_kernel_with_fresh_indices() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let a = comms
            .provide_local_for_remote(&alice, &RemoteSlot::new(SlotKind::Object, false, 1))
            .unwrap();
        let b = comms
            .provide_local_for_remote(&alice, &RemoteSlot::new(SlotKind::Object, false, 2))
            .unwrap();
        assert_eq!(
            comms.provide_kernel_for_local(&a).unwrap(),
            KernelSlot::exported(SlotKind::Object, 1)
        );
        assert_eq!(
            comms.provide_kernel_for_local(&b).unwrap(),
            KernelSlot::exported(SlotKind::Object, 2)
        );
        assert_eq!(
            comms.provide_kernel_for_local(&a).unwrap(),
            KernelSlot::exported(SlotKind::Object, 1)
        );
    }

    #[test]
    fn remote_cannot_name_our_unknown_allocations() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let err = comms
            .provide_local_for_remote(&alice, &RemoteSlot::new(SlotKind::Object, true, 4))
            .unwrap_err();
        assert!(matches!(err, CommsError::UnknownIdentifier { .. }));
    }

    #[test]
    fn remote_promises_are_decided_by_their_sender() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let rp = RemoteSlot::new(SlotKind::Promise, false, 7);
        let lpid = comms.provide_local_for_remote(&alice, &rp).unwrap();
        assert_eq!(
            comms.state.promise(&lpid).unwrap().decider(),
            &Decider::Remote(alice.clone())
        );
        // exporting back to its decider does not subscribe the decider
        assert_eq!(comms.provide_remote_for_local(&alice, &lpid).unwrap(), rp);
        assert!(comms.state.promises.subscribers(&lpid).unwrap().remotes.is_empty());
    }

    #[test]
    fn exporting_a_promise_subscribes_the_destination() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let lpid = comms.provide_local_for_kernel(&kp(1), &[]).unwrap();
        let rpid = comms.provide_remote_for_local(&alice, &lpid).unwrap();
        assert_eq!(rpid, RemoteSlot::new(SlotKind::Promise, true, 1));
        assert_eq!(
            comms.state.promises.subscribers(&lpid).unwrap().remotes,
            vec![alice]
        );
    }

    #[test]
    fn known_result_promise_must_be_decided_by_the_sender() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let rp = RemoteSlot::new(SlotKind::Promise, false, 2);
        let lpid = comms.provide_local_for_remote(&alice, &rp).unwrap();
        comms.state.promises.change_decider_from_remote_to_comms(&lpid, &alice).unwrap();

        assert!(matches!(
            comms.provide_local_for_remote_result(&alice, &rp),
            Err(CommsError::WrongDecider { .. })
        ));
        let fresh = comms
            .provide_local_for_remote_result(&alice, &RemoteSlot::new(SlotKind::Promise, true, 2))
            .unwrap();
        let record = comms.state.promise(&fresh).unwrap();
        assert_eq!(record.decider(), &Decider::Comms);
        assert_eq!(record.subscribers().cloned().collect::<Vec<_>>(), vec![alice]);
    }

    #[test]
    fn retirement_requires_resolution() {
        let mut comms = comms();
        let lpid = comms.provide_local_for_kernel(&kp(1), &[]).unwrap();
        assert!(matches!(
            comms.retire_kernel_promise_id(&kp(1)),
            Err(CommsError::NotResolved(p)) if p == lpid
        ));
        comms
            .state
            .promises
            .mark_resolved(&lpid, false, CapData::new("1", vec![]))
            .unwrap();
        comms.retire_kernel_promise_id(&kp(1)).unwrap();
        assert!(comms.get_local_for_kernel(&kp(1)).is_err());
        assert!(comms.get_kernel_for_local(&lpid).is_err());
    }

    #[test]
    fn staged_retirement_keeps_inbound_direction() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let lpid = comms.provide_local_for_kernel(&kp(1), &[]).unwrap();
        let rpid = comms.provide_remote_for_local(&alice, &lpid).unwrap();
        comms
            .state
            .promises
            .mark_resolved(&lpid, false, CapData::new("1", vec![]))
            .unwrap();

        comms.begin_remote_promise_retirement(&alice, &rpid, 3).unwrap();
        assert!(comms.get_remote_for_local(&alice, &lpid).is_err());
        assert_eq!(comms.get_local_for_remote(&alice, &rpid).unwrap(), lpid);

        let fresh = comms.provide_remote_for_local(&alice, &lpid).unwrap();
        assert_ne!(fresh, rpid);

        comms.retire_remote_promise_id(&alice, &rpid).unwrap();
        assert!(comms.get_local_for_remote(&alice, &rpid).is_err());
        assert_eq!(comms.get_local_for_remote(&alice, &fresh).unwrap(), lpid);
    }

    #[test]
    fn wire_mapping_flips_perspective() {
        let mut comms = comms();
        let alice = remote(&mut comms, "alice");
        let obj = comms.provide_local_for_kernel(&ko(1), &[]).unwrap();
        let data = CapData::new("[]", vec![obj]);
        let wire = comms.map_data_to_remote(&alice, &data).unwrap();
        assert_eq!(wire.slots, vec![RemoteSlot::new(SlotKind::Object, false, 1)]);
        assert_eq!(
            comms.get_remote_for_local(&alice, &obj).unwrap(),
            RemoteSlot::new(SlotKind::Object, true, 1)
        );
    }
}
