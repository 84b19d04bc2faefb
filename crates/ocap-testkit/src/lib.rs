//! Test utilities for exercising the comms engine with deterministic,
//! recording collaborators.
//!
//! - [`TestComms`]: one engine wired to a [`RecordingKernel`] and a
//!   [`RecordingTransport`], with handles kept for inspection.
//! - [`Loopback`]: two engines whose transports feed each other.
//! - [`fixtures`]: slot and payload builders.

pub mod fixtures;
mod loopback;
mod recording;

pub use loopback::Loopback;
pub use recording::{KernelCall, RecordingKernel, RecordingTransport};

use ocap_comms::{Comms, CommsConfig, CommsError, RemoteId};

pub type RecordingComms = Comms<RecordingKernel, RecordingTransport>;

/// An engine plus shared handles onto everything it emitted.
pub struct TestComms {
    pub comms: RecordingComms,
    pub kernel: RecordingKernel,
    pub transport: RecordingTransport,
}

impl Default for TestComms {
    fn default() -> Self {
        Self::new()
    }
}

impl TestComms {
    pub fn new() -> Self {
        Self::with_config(CommsConfig::default())
    }

    pub fn with_config(config: CommsConfig) -> Self {
        let kernel = RecordingKernel::new();
        let transport = RecordingTransport::new();
        let comms = Comms::new(config, kernel.clone(), transport.clone());
        Self {
            comms,
            kernel,
            transport,
        }
    }

    /// Restores a snapshot behind fresh recorders.
    pub fn restore(config: CommsConfig, snapshot: &[u8]) -> Result<Self, CommsError> {
        let kernel = RecordingKernel::new();
        let transport = RecordingTransport::new();
        let comms = Comms::restore(config, kernel.clone(), transport.clone(), snapshot)?;
        Ok(Self {
            comms,
            kernel,
            transport,
        })
    }

    pub fn add_remote(&mut self, name: &str) -> Result<RemoteId, CommsError> {
        self.comms.add_remote(name)
    }

    /// Feeds one raw wire unit from `remote`.
    pub fn receive(&mut self, remote: &RemoteId, message: &str) -> Result<(), CommsError> {
        self.comms.message_from_remote(remote, message, None)
    }

    pub fn drain_kernel(&self) -> Vec<KernelCall> {
        self.kernel.drain()
    }

    /// Wire units sent since the last drain, without the remote names.
    pub fn drain_wire(&self) -> Vec<String> {
        self.transport
            .drain()
            .into_iter()
            .map(|(_, message)| message)
            .collect()
    }
}
