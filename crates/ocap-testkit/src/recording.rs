use std::sync::{Arc, Mutex};

use ocap_comms::{CapData, KernelSlot, KernelSyscalls, RemoteId, Resolution, Transmitter};

/// One call the engine made into the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCall {
    Send {
        target: KernelSlot,
        method: String,
        args: CapData<KernelSlot>,
        result: Option<KernelSlot>,
    },
    Resolve(Vec<Resolution<KernelSlot>>),
    Subscribe(KernelSlot),
}

/// In-memory kernel that records every syscall. Clones share one log, so a
/// test can keep a handle while the engine owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingKernel {
    calls: Arc<Mutex<Vec<KernelCall>>>,
}

impl RecordingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<KernelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn drain(&self) -> Vec<KernelCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn subscribed(&self) -> Vec<KernelSlot> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                KernelCall::Subscribe(promise) => Some(promise),
                _ => None,
            })
            .collect()
    }
}

impl KernelSyscalls for RecordingKernel {
    fn send(
        &mut self,
        target: KernelSlot,
        method: &str,
        args: CapData<KernelSlot>,
        result: Option<KernelSlot>,
    ) {
        self.calls.lock().unwrap().push(KernelCall::Send {
            target,
            method: method.to_string(),
            args,
            result,
        });
    }

    fn resolve(&mut self, resolutions: Vec<Resolution<KernelSlot>>) {
        self.calls
            .lock()
            .unwrap()
            .push(KernelCall::Resolve(resolutions));
    }

    fn subscribe(&mut self, promise: KernelSlot) {
        self.calls.lock().unwrap().push(KernelCall::Subscribe(promise));
    }
}

/// Transport that keeps every transmitted unit, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(RemoteId, String)>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(RemoteId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn drain(&self) -> Vec<(RemoteId, String)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Units sent to `remote`, without draining.
    pub fn sent_to(&self, remote: &RemoteId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == remote)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Transmitter for RecordingTransport {
    fn transmit(&mut self, remote: &RemoteId, message: String) {
        self.sent.lock().unwrap().push((remote.clone(), message));
    }
}
