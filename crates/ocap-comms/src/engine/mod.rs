//! The protocol engine. One `Comms` owns one state context and its two
//! collaborators; every public entry point runs to completion before
//! returning.

mod clist_ops;
mod controller;
mod delivery;
#[cfg(test)]
mod test_support;

pub use delivery::{LocalDelivery, LocalResolution, Route};

use crate::config::CommsConfig;
use crate::error::CommsError;
use crate::state::{CommsState, RemoteId};
use crate::syscall::{KernelSyscalls, Transmitter};
use crate::wire::{self, Envelope, SeqNum};

pub struct Comms<K, T> {
    config: CommsConfig,
    state: CommsState,
    kernel: K,
    transport: T,
}

impl<K: KernelSyscalls, T: Transmitter> Comms<K, T> {
    pub fn new(config: CommsConfig, kernel: K, transport: T) -> Self {
        Self::with_state(config, CommsState::default(), kernel, transport)
    }

    pub fn with_state(config: CommsConfig, state: CommsState, kernel: K, transport: T) -> Self {
        Self {
            config,
            state,
            kernel,
            transport,
        }
    }

    /// Rebuilds an engine from bytes produced by [`Comms::snapshot`].
    pub fn restore(
        config: CommsConfig,
        kernel: K,
        transport: T,
        snapshot: &[u8],
    ) -> Result<Self, CommsError> {
        let state: CommsState = serde_cbor::from_slice(snapshot)?;
        Ok(Self::with_state(config, state, kernel, transport))
    }

    /// CBOR encoding of the full protocol state. Maps are ordered, so equal
    /// states encode identically.
    pub fn snapshot(&self) -> Result<Vec<u8>, CommsError> {
        Ok(serde_cbor::to_vec(&self.state)?)
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    pub fn state(&self) -> &CommsState {
        &self.state
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Wraps `body` in the link envelope and hands it to the transport.
    /// Returns the sequence number the unit was sent under.
    fn transmit(&mut self, remote: &RemoteId, body: String) -> Result<u64, CommsError> {
        let (seq, ack) = self.state.remote_mut(remote)?.claim_send_seq();
        log::debug!("transmit #{seq} to {remote}: {body}");
        self.transport
            .transmit(remote, wire::render_envelope(seq, ack, &body));
        Ok(seq)
    }

    /// Every inbound unit advances the counter, whatever it claims.
    fn accept_sequence(&mut self, remote: &RemoteId, envelope: &Envelope<'_>) -> Result<(), CommsError> {
        let accept_unordered = self.config.accept_unordered;
        let expected = self.state.remote_mut(remote)?.advance_received();
        match envelope.seq_num() {
            Some(SeqNum::Ordered(seq)) if seq == expected => Ok(()),
            Some(SeqNum::Unordered) if accept_unordered => Ok(()),
            Some(SeqNum::Unordered) => Err(CommsError::UnorderedRejected(remote.to_string())),
            _ => Err(CommsError::SequenceError {
                remote: remote.to_string(),
                expected,
                found: envelope.seq.to_string(),
            }),
        }
    }

    fn handle_ack(&mut self, remote: &RemoteId, ack: u64) -> Result<(), CommsError> {
        let acknowledged = self.state.remote_mut(remote)?.take_acknowledged(ack);
        for rpid in acknowledged {
            self.retire_remote_promise_id(remote, &rpid)?;
        }
        Ok(())
    }
}
