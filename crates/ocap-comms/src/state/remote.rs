use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clist::CList;
use crate::slots::RemoteSlot;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote promise ID whose resolve went out in unit `sent_seq` and which
/// may be forgotten once the peer acknowledges that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRetirement {
    pub sent_seq: u64,
    pub promise: RemoteSlot,
}

/// Per-peer link state: identifier table, sequence counters, and the
/// retirement queue (ordered by `sent_seq`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteState {
    pub(crate) clist: CList<RemoteSlot>,
    last_received_seq: u64,
    next_send_seq: u64,
    last_acked_seq: Option<u64>,
    retirement_queue: VecDeque<PendingRetirement>,
}

impl Default for RemoteState {
    fn default() -> Self {
        Self {
            clist: CList::default(),
            last_received_seq: 0,
            next_send_seq: 1,
            last_acked_seq: None,
            retirement_queue: VecDeque::new(),
        }
    }
}

impl RemoteState {
    pub fn clist(&self) -> &CList<RemoteSlot> {
        &self.clist
    }

    pub fn last_received_seq(&self) -> u64 {
        self.last_received_seq
    }

    pub fn next_send_seq(&self) -> u64 {
        self.next_send_seq
    }

    /// Highest acknowledgment the peer has sent, if any.
    pub fn last_acked_seq(&self) -> Option<u64> {
        self.last_acked_seq
    }

    pub fn pending_retirements(&self) -> impl Iterator<Item = &PendingRetirement> {
        self.retirement_queue.iter()
    }

    /// Advances the inbound counter and returns the number this message is
    /// expected to carry.
    pub(crate) fn advance_received(&mut self) -> u64 {
        self.last_received_seq += 1;
        self.last_received_seq
    }

    /// Claims the next outbound sequence number, returning `(seq, ack)`.
    pub(crate) fn claim_send_seq(&mut self) -> (u64, u64) {
        let seq = self.next_send_seq;
        self.next_send_seq += 1;
        (seq, self.last_received_seq)
    }

    pub(crate) fn queue_retirement(&mut self, sent_seq: u64, promise: RemoteSlot) {
        self.retirement_queue.push_back(PendingRetirement { sent_seq, promise });
    }

    /// Records an acknowledgment and pops every retirement it covers.
    pub(crate) fn take_acknowledged(&mut self, ack: u64) -> Vec<RemoteSlot> {
        self.last_acked_seq = Some(self.last_acked_seq.map_or(ack, |prev| prev.max(ack)));
        let mut done = Vec::new();
        while let Some(front) = self.retirement_queue.front() {
            if front.sent_seq > ack {
                break;
            }
            done.push(front.promise);
            self.retirement_queue.pop_front();
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotKind;

    #[test]
    fn acknowledgments_release_covered_retirements_in_order() {
        let mut remote = RemoteState::default();
        let rp = |i| RemoteSlot::new(SlotKind::Promise, false, i);
        remote.queue_retirement(1, rp(1));
        remote.queue_retirement(2, rp(2));
        remote.queue_retirement(4, rp(3));

        assert!(remote.take_acknowledged(0).is_empty());
        assert_eq!(remote.take_acknowledged(2), vec![rp(1), rp(2)]);
        assert_eq!(remote.take_acknowledged(3), Vec::<RemoteSlot>::new());
        assert_eq!(remote.pending_retirements().count(), 1);
        assert_eq!(remote.take_acknowledged(9), vec![rp(3)]);
        assert_eq!(remote.last_acked_seq(), Some(9));
    }

    #[test]
    fn send_sequence_starts_at_one_and_carries_ack() {
        let mut remote = RemoteState::default();
        assert_eq!(remote.advance_received(), 1);
        assert_eq!(remote.claim_send_seq(), (1, 1));
        assert_eq!(remote.claim_send_seq(), (2, 1));
    }
}
