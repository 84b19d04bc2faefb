//! Call routing and resolution propagation.
//!
//! Kernel events enter through [`Comms::send_from_kernel`] and
//! [`Comms::resolve_from_kernel`]; wire units enter through
//! [`Comms::message_from_remote`]. Both sides are translated into local
//! slots and funnelled into `handle_send` / `handle_resolutions`, which pick
//! destinations and translate back out.

use std::collections::HashSet;

use crate::capdata::{CapData, Resolution};
use crate::error::CommsError;
use crate::slots::{KernelSlot, LocalSlot, RemoteSlot, SlotKind};
use crate::state::{ObjectOwner, PromiseTable, RemoteId};
use crate::syscall::{KernelSyscalls, Transmitter};
use crate::wire::{self, WireDelivery, WireMessage};

use super::Comms;

pub type LocalResolution = Resolution<LocalSlot>;

/// A call expressed in local slots, ready for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDelivery {
    pub target: LocalSlot,
    pub method: String,
    pub result: Option<LocalSlot>,
    pub args: CapData<LocalSlot>,
}

/// Where a call addressed to some local slot ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Kernel(LocalSlot),
    Remote { target: LocalSlot, remote: RemoteId },
    /// The target can never accept the call; the payload is the rejection.
    Reject(CapData<LocalSlot>),
}

/// Depth-first walk over resolved promises reachable from a set of slots.
/// Each promise is reported once, before the promises its own data names.
struct ResolutionCollector<'a> {
    promises: &'a PromiseTable,
    limit: usize,
    seen: HashSet<LocalSlot>,
    found: Vec<LocalResolution>,
}

impl<'a> ResolutionCollector<'a> {
    fn new(
        promises: &'a PromiseTable,
        limit: usize,
        exclude: impl IntoIterator<Item = LocalSlot>,
    ) -> Self {
        Self {
            promises,
            limit,
            seen: exclude.into_iter().collect(),
            found: Vec::new(),
        }
    }

    fn scan(&mut self, slots: &[LocalSlot], depth: usize) -> Result<(), CommsError> {
        let promises = self.promises;
        for slot in slots.iter().filter(|slot| slot.is_promise()) {
            let record = promises
                .get(slot)
                .ok_or_else(|| CommsError::UnknownIdentifier {
                    space: "promise",
                    id: slot.to_string(),
                })?;
            let Some(settlement) = record.settlement() else {
                continue;
            };
            if !self.seen.insert(*slot) {
                continue;
            }
            if depth >= self.limit {
                return Err(CommsError::ResolutionTooDeep(self.limit));
            }
            self.found.push(Resolution {
                promise: *slot,
                rejected: settlement.rejected,
                data: settlement.data.clone(),
            });
            self.scan(&settlement.data.slots, depth + 1)?;
        }
        Ok(())
    }
}

impl<K: KernelSyscalls, T: Transmitter> Comms<K, T> {
    /// A vat asked the kernel to deliver `method` to something this process
    /// exported to it.
    pub fn send_from_kernel(
        &mut self,
        target: KernelSlot,
        method: &str,
        args: CapData<KernelSlot>,
        result: Option<KernelSlot>,
    ) -> Result<(), CommsError> {
        if !wire::is_legal_method(method) {
            return Err(CommsError::IllegalMethodName(method.to_string()));
        }
        let ltarget = self.get_local_for_kernel(&target)?;
        let largs = self.map_data_from_kernel(&args, &[])?;
        let lresult = self.provide_local_for_kernel_result(result.as_ref())?;
        log::debug!("kernel send {method} to {target} ({ltarget})");
        self.handle_send(LocalDelivery {
            target: ltarget,
            method: method.to_string(),
            result: lresult,
            args: largs,
        })
    }

    /// The kernel settled promises it was deciding. The first entry is the
    /// primary; its subscribers hear about the whole batch.
    pub fn resolve_from_kernel(
        &mut self,
        resolutions: Vec<Resolution<KernelSlot>>,
    ) -> Result<(), CommsError> {
        if resolutions.is_empty() {
            return Err(CommsError::EmptyResolutionBatch);
        }
        let resolved: Vec<KernelSlot> = resolutions.iter().map(|r| r.promise).collect();
        let mut local = Vec::with_capacity(resolutions.len());
        for resolution in &resolutions {
            if resolution.promise.kind() != SlotKind::Promise {
                return Err(CommsError::WrongSlotKind {
                    slot: resolution.promise.to_string(),
                    expected: SlotKind::Promise,
                });
            }
            let lpid = self.get_local_for_kernel(&resolution.promise)?;
            self.state.promises.change_decider_from_kernel_to_comms(&lpid)?;
            let data = self.map_data_from_kernel(&resolution.data, &resolved)?;
            local.push(Resolution {
                promise: lpid,
                rejected: resolution.rejected,
                data,
            });
        }
        self.handle_resolutions(local)?;
        for kpid in &resolved {
            self.retire_kernel_promise_id(kpid)?;
        }
        Ok(())
    }

    /// Processes one unit received from `remote`. A `legacy_result` slot is
    /// answered with `undefined` before anything else happens.
    pub fn message_from_remote(
        &mut self,
        remote: &RemoteId,
        message: &str,
        legacy_result: Option<KernelSlot>,
    ) -> Result<(), CommsError> {
        if let Some(result) = legacy_result {
            self.kernel
                .resolve(vec![Resolution::fulfilled(result, CapData::undefined())]);
        }
        let envelope = wire::parse_envelope(message)?;
        self.accept_sequence(remote, &envelope)?;
        if let Some(ack) = envelope.ack {
            self.handle_ack(remote, ack)?;
        }
        log::debug!("received from {remote}: {}", envelope.body);
        match WireMessage::parse(envelope.body)? {
            WireMessage::Deliver(delivery) => self.send_from_remote(remote, delivery),
            WireMessage::Resolve(resolutions) => self.resolve_from_remote(remote, resolutions),
        }
    }

    fn send_from_remote(&mut self, remote: &RemoteId, delivery: WireDelivery) -> Result<(), CommsError> {
        let WireDelivery {
            target,
            method,
            result,
            args,
        } = delivery;
        let ltarget = self.get_local_for_remote(remote, &target)?;
        let lresult = match result {
            Some(rpid) => Some(self.provide_local_for_remote_result(remote, &rpid)?),
            None => None,
        };
        let largs = self.map_data_from_remote(remote, &args)?;
        log::debug!("{remote} send {method} to {target} ({ltarget})");
        self.handle_send(LocalDelivery {
            target: ltarget,
            method,
            result: lresult,
            args: largs,
        })
    }

    fn resolve_from_remote(
        &mut self,
        remote: &RemoteId,
        resolutions: Vec<Resolution<RemoteSlot>>,
    ) -> Result<(), CommsError> {
        if resolutions.is_empty() {
            return Err(CommsError::EmptyResolutionBatch);
        }
        let mut local = Vec::with_capacity(resolutions.len());
        for resolution in &resolutions {
            let lpid = self.get_local_for_remote(remote, &resolution.promise)?;
            self.state
                .promises
                .change_decider_from_remote_to_comms(&lpid, remote)?;
            let data = self.map_data_from_remote(remote, &resolution.data)?;
            local.push(Resolution {
                promise: lpid,
                rejected: resolution.rejected,
                data,
            });
        }
        self.handle_resolutions(local)?;
        for resolution in &resolutions {
            self.retire_remote_promise_id(remote, &resolution.promise)?;
        }
        Ok(())
    }

    /// Follows `target` to the party that can act on a call to it. Resolved
    /// promises are looked through: a presence forwards to its object, any
    /// other settlement turns the call into a rejection.
    pub fn resolve_target(&self, target: &LocalSlot, method: &str) -> Result<Route, CommsError> {
        match target.kind() {
            SlotKind::Object => match self.state.objects.get(target) {
                Some(ObjectOwner::Kernel) => Ok(Route::Kernel(*target)),
                Some(ObjectOwner::Remote(remote)) => Ok(Route::Remote {
                    target: *target,
                    remote: remote.clone(),
                }),
                None => Err(CommsError::UnknownTarget(*target)),
            },
            SlotKind::Promise => {
                let record = self
                    .state
                    .promises
                    .get(target)
                    .ok_or(CommsError::UnknownTarget(*target))?;
                if let Some(settlement) = record.settlement() {
                    if settlement.rejected {
                        return Ok(Route::Reject(settlement.data.clone()));
                    }
                    // a presence is always an object, so this recurses at most once
                    return match settlement.data.presence() {
                        Some(presence) => self.resolve_target(&presence, method),
                        None => Ok(Route::Reject(CapData::undeliverable(method))),
                    };
                }
                if let Some(remote) = self.state.promises.decider_is_remote(target)? {
                    return Ok(Route::Remote {
                        target: *target,
                        remote,
                    });
                }
                self.state.promises.insist_decider_is_kernel(target)?;
                Ok(Route::Kernel(*target))
            }
        }
    }

    fn collect_resolutions<'s>(
        &self,
        slots: impl IntoIterator<Item = &'s [LocalSlot]>,
        exclude: impl IntoIterator<Item = LocalSlot>,
    ) -> Result<Vec<LocalResolution>, CommsError> {
        let mut collector = ResolutionCollector::new(
            &self.state.promises,
            self.config.max_resolution_depth,
            exclude,
        );
        for group in slots {
            collector.scan(group, 0)?;
        }
        Ok(collector.found)
    }

    /// Routes one call. Resolved promises named by the arguments follow the
    /// call to the same destination.
    pub(crate) fn handle_send(&mut self, delivery: LocalDelivery) -> Result<(), CommsError> {
        let aux = self.collect_resolutions([delivery.args.slots.as_slice()], [])?;
        match self.resolve_target(&delivery.target, &delivery.method)? {
            Route::Kernel(target) => {
                self.send_to_kernel(target, delivery)?;
                if !aux.is_empty() {
                    self.resolve_to_kernel(&aux)?;
                }
            }
            Route::Remote { target, remote } => {
                self.send_to_remote(&remote, target, delivery)?;
                if !aux.is_empty() {
                    self.resolve_to_remote(&remote, &aux)?;
                }
            }
            Route::Reject(data) => match delivery.result {
                Some(result) => {
                    log::debug!("rejecting {} sent to {}", delivery.method, delivery.target);
                    self.handle_resolutions(vec![Resolution::rejected(result, data)])?;
                }
                None => {
                    log::warn!(
                        "dropping send-only {} to undeliverable {}",
                        delivery.method,
                        delivery.target
                    );
                }
            },
        }
        Ok(())
    }

    fn send_to_kernel(&mut self, target: LocalSlot, delivery: LocalDelivery) -> Result<(), CommsError> {
        let ktarget = self.get_kernel_for_local(&target)?;
        let kargs = self.map_data_to_kernel(&delivery.args)?;
        let kresult = self.provide_kernel_for_local_result(delivery.result.as_ref())?;
        log::debug!("deliver {} to kernel {ktarget}", delivery.method);
        self.kernel.send(ktarget, &delivery.method, kargs, kresult);
        if let Some(kresult) = kresult {
            self.kernel.subscribe(kresult);
        }
        Ok(())
    }

    fn send_to_remote(
        &mut self,
        remote: &RemoteId,
        target: LocalSlot,
        delivery: LocalDelivery,
    ) -> Result<(), CommsError> {
        let rtarget = self.get_remote_for_local(remote, &target)?;
        let rresult = match delivery.result {
            Some(lpid) => Some(self.provide_remote_for_local_result(remote, &lpid)?),
            None => None,
        };
        let rargs = self.map_data_to_remote(remote, &delivery.args)?;
        let message = WireMessage::Deliver(WireDelivery {
            target: rtarget.flipped(),
            method: delivery.method,
            result: rresult.map(|rpid| rpid.flipped()),
            args: rargs,
        });
        self.transmit(remote, message.render())?;
        Ok(())
    }

    /// Settles a batch of promises this process decides and tells every
    /// subscriber of the primary (first) entry, including resolved promises
    /// reachable from the settlement data.
    pub(crate) fn handle_resolutions(
        &mut self,
        resolutions: Vec<LocalResolution>,
    ) -> Result<(), CommsError> {
        let Some(primary) = resolutions.first().map(|r| r.promise) else {
            return Err(CommsError::EmptyResolutionBatch);
        };
        let subscribers = self.state.promises.subscribers(&primary)?;
        let aux = self.collect_resolutions(
            resolutions.iter().map(|r| r.data.slots.as_slice()),
            resolutions.iter().map(|r| r.promise),
        )?;

        for resolution in &resolutions {
            if resolution.promise.kind() != SlotKind::Promise {
                return Err(CommsError::WrongSlotKind {
                    slot: resolution.promise.to_string(),
                    expected: SlotKind::Promise,
                });
            }
            self.state.promises.insist_unresolved(&resolution.promise)?;
            self.state.promises.insist_decider_is_comms(&resolution.promise)?;
        }
        for resolution in &resolutions {
            self.state.promises.mark_resolved(
                &resolution.promise,
                resolution.rejected,
                resolution.data.clone(),
            )?;
        }

        let mut batch = resolutions;
        batch.extend(aux);
        log::debug!(
            "resolved {primary} (+{} more) for {} remote(s), kernel: {}",
            batch.len() - 1,
            subscribers.remotes.len(),
            subscribers.kernel
        );
        for remote in &subscribers.remotes {
            self.resolve_to_remote(remote, &batch)?;
        }
        if subscribers.kernel {
            self.resolve_to_kernel(&batch)?;
        }
        Ok(())
    }

    /// Picks the entries of `batch` the destination already knows and maps
    /// their payloads, in batch order. Payloads of skipped entries are never
    /// mapped, so the destination is not handed IDs nobody will resolve.
    /// Mapping one payload can introduce a later entry, so the scan repeats
    /// until nothing new is picked.
    fn known_entries<P>(
        &mut self,
        batch: &[LocalResolution],
        mut peer_id: impl FnMut(&Self, &LocalSlot) -> Result<Option<P>, CommsError>,
        mut map_data: impl FnMut(&mut Self, &CapData<LocalSlot>) -> Result<CapData<P>, CommsError>,
    ) -> Result<Vec<Resolution<P>>, CommsError> {
        let mut picked: Vec<Option<Resolution<P>>> = batch.iter().map(|_| None).collect();
        loop {
            let mut progressed = false;
            for (resolution, slot) in batch.iter().zip(picked.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                let Some(promise) = peer_id(&*self, &resolution.promise)? else {
                    continue;
                };
                let data = map_data(&mut *self, &resolution.data)?;
                *slot = Some(Resolution {
                    promise,
                    rejected: resolution.rejected,
                    data,
                });
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        let mut entries = Vec::with_capacity(picked.len());
        for (resolution, slot) in batch.iter().zip(picked) {
            match slot {
                Some(entry) => entries.push(entry),
                None => log::trace!("destination never saw {}, left out", resolution.promise),
            }
        }
        Ok(entries)
    }

    /// Sends `batch` to `remote` as one unit. The first entry must already be
    /// known to the peer; later entries it has never been shown are left out.
    fn resolve_to_remote(&mut self, remote: &RemoteId, batch: &[LocalResolution]) -> Result<(), CommsError> {
        let Some(primary) = batch.first() else {
            return Err(CommsError::EmptyResolutionBatch);
        };
        self.get_remote_for_local(remote, &primary.promise)?;
        let entries = self.known_entries(
            batch,
            |comms, lpid| Ok(comms.state.insist_remote(remote)?.clist.peer_for(lpid)),
            |comms, data| comms.map_data_to_remote(remote, data),
        )?;
        let used: Vec<RemoteSlot> = entries.iter().map(|r| r.promise).collect();
        let units = entries
            .into_iter()
            .map(|r| Resolution {
                promise: r.promise.flipped(),
                ..r
            })
            .collect();
        let seq = self.transmit(remote, WireMessage::Resolve(units).render())?;
        for rpid in &used {
            self.begin_remote_promise_retirement(remote, rpid, seq)?;
        }
        Ok(())
    }

    /// Kernel counterpart of `resolve_to_remote`. The kernel IDs are retired
    /// as soon as the kernel has been told.
    fn resolve_to_kernel(&mut self, batch: &[LocalResolution]) -> Result<(), CommsError> {
        let Some(primary) = batch.first() else {
            return Err(CommsError::EmptyResolutionBatch);
        };
        self.get_kernel_for_local(&primary.promise)?;
        let kernel_batch = self.known_entries(
            batch,
            |comms, lpid| Ok(comms.state.kernel.peer_for(lpid)),
            |comms, data| comms.map_data_to_kernel(data),
        )?;
        let retiring: Vec<KernelSlot> = kernel_batch.iter().map(|r| r.promise).collect();
        self.kernel.resolve(kernel_batch);
        for kpid in &retiring {
            self.retire_kernel_promise_id(kpid)?;
        }
        Ok(())
    }
}
