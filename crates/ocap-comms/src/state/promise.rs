use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::remote::RemoteId;
use crate::capdata::CapData;
use crate::error::CommsError;
use crate::slots::LocalSlot;

/// Party currently holding authority to resolve a promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decider {
    Kernel,
    Comms,
    Remote(RemoteId),
}

impl fmt::Display for Decider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decider::Kernel => f.write_str("kernel"),
            Decider::Comms => f.write_str("comms"),
            Decider::Remote(id) => write!(f, "remote {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub rejected: bool,
    pub data: CapData<LocalSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromiseRecord {
    decider: Decider,
    settlement: Option<Settlement>,
    kernel_subscribed: bool,
    subscribers: IndexSet<RemoteId>,
}

impl PromiseRecord {
    fn new(decider: Decider) -> Self {
        Self {
            decider,
            settlement: None,
            kernel_subscribed: false,
            subscribers: IndexSet::new(),
        }
    }

    pub fn decider(&self) -> &Decider {
        &self.decider
    }

    pub fn is_resolved(&self) -> bool {
        self.settlement.is_some()
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn kernel_subscribed(&self) -> bool {
        self.kernel_subscribed
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &RemoteId> {
        self.subscribers.iter()
    }
}

/// Who must hear about a resolution, captured when it is propagated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscribers {
    pub remotes: Vec<RemoteId>,
    pub kernel: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromiseTable {
    promises: BTreeMap<LocalSlot, PromiseRecord>,
}

impl PromiseTable {
    pub fn contains(&self, lpid: &LocalSlot) -> bool {
        self.promises.contains_key(lpid)
    }

    pub fn get(&self, lpid: &LocalSlot) -> Option<&PromiseRecord> {
        self.promises.get(lpid)
    }

    pub(crate) fn insert(&mut self, lpid: LocalSlot, decider: Decider) {
        self.promises.insert(lpid, PromiseRecord::new(decider));
    }

    fn record(&self, lpid: &LocalSlot) -> Result<&PromiseRecord, CommsError> {
        self.promises
            .get(lpid)
            .ok_or_else(|| CommsError::UnknownIdentifier {
                space: "promise",
                id: lpid.to_string(),
            })
    }

    fn record_mut(&mut self, lpid: &LocalSlot) -> Result<&mut PromiseRecord, CommsError> {
        self.promises
            .get_mut(lpid)
            .ok_or_else(|| CommsError::UnknownIdentifier {
                space: "promise",
                id: lpid.to_string(),
            })
    }

    pub fn is_resolved(&self, lpid: &LocalSlot) -> Result<bool, CommsError> {
        Ok(self.record(lpid)?.is_resolved())
    }

    pub fn insist_unresolved(&self, lpid: &LocalSlot) -> Result<(), CommsError> {
        if self.record(lpid)?.is_resolved() {
            return Err(CommsError::AlreadyResolved(*lpid));
        }
        Ok(())
    }

    /// The remote deciding this promise, if a remote is the decider.
    pub fn decider_is_remote(&self, lpid: &LocalSlot) -> Result<Option<RemoteId>, CommsError> {
        Ok(match &self.record(lpid)?.decider {
            Decider::Remote(id) => Some(id.clone()),
            _ => None,
        })
    }

    fn insist_decider(&self, lpid: &LocalSlot, expected: &Decider) -> Result<(), CommsError> {
        let found = &self.record(lpid)?.decider;
        if found != expected {
            return Err(CommsError::WrongDecider {
                promise: *lpid,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    pub fn insist_decider_is_kernel(&self, lpid: &LocalSlot) -> Result<(), CommsError> {
        self.insist_decider(lpid, &Decider::Kernel)
    }

    pub fn insist_decider_is_comms(&self, lpid: &LocalSlot) -> Result<(), CommsError> {
        self.insist_decider(lpid, &Decider::Comms)
    }

    pub fn insist_decider_is_remote(
        &self,
        lpid: &LocalSlot,
        remote: &RemoteId,
    ) -> Result<(), CommsError> {
        self.insist_decider(lpid, &Decider::Remote(remote.clone()))
    }

    pub fn change_decider_from_kernel_to_comms(
        &mut self,
        lpid: &LocalSlot,
    ) -> Result<(), CommsError> {
        self.insist_unresolved(lpid)?;
        self.insist_decider_is_kernel(lpid)?;
        self.record_mut(lpid)?.decider = Decider::Comms;
        Ok(())
    }

    pub fn change_decider_from_remote_to_comms(
        &mut self,
        lpid: &LocalSlot,
        remote: &RemoteId,
    ) -> Result<(), CommsError> {
        self.insist_unresolved(lpid)?;
        self.insist_decider_is_remote(lpid, remote)?;
        self.record_mut(lpid)?.decider = Decider::Comms;
        Ok(())
    }

    /// Places a result promise held by this process with the party that
    /// will answer the call. The new decider stops being a subscriber.
    pub(crate) fn delegate_result(
        &mut self,
        lpid: &LocalSlot,
        to: Decider,
    ) -> Result<(), CommsError> {
        self.insist_unresolved(lpid)?;
        self.insist_decider_is_comms(lpid)?;
        let record = self.record_mut(lpid)?;
        match &to {
            Decider::Kernel => record.kernel_subscribed = false,
            Decider::Remote(id) => {
                record.subscribers.shift_remove(id);
            }
            Decider::Comms => {}
        }
        record.decider = to;
        Ok(())
    }

    pub(crate) fn subscribe_kernel(&mut self, lpid: &LocalSlot) -> Result<(), CommsError> {
        self.record_mut(lpid)?.kernel_subscribed = true;
        Ok(())
    }

    pub(crate) fn subscribe_remote(
        &mut self,
        lpid: &LocalSlot,
        remote: &RemoteId,
    ) -> Result<(), CommsError> {
        self.record_mut(lpid)?.subscribers.insert(remote.clone());
        Ok(())
    }

    /// Snapshot of the subscriber set; later subscriptions do not affect it.
    pub fn subscribers(&self, lpid: &LocalSlot) -> Result<Subscribers, CommsError> {
        let record = self.record(lpid)?;
        Ok(Subscribers {
            remotes: record.subscribers.iter().cloned().collect(),
            kernel: record.kernel_subscribed,
        })
    }

    /// Terminal transition to resolved.
    pub fn mark_resolved(
        &mut self,
        lpid: &LocalSlot,
        rejected: bool,
        data: CapData<LocalSlot>,
    ) -> Result<(), CommsError> {
        let record = self.record_mut(lpid)?;
        if record.is_resolved() {
            return Err(CommsError::AlreadyResolved(*lpid));
        }
        record.settlement = Some(Settlement { rejected, data });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.promises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.promises.is_empty()
    }
}
