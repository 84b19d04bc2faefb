use crate::capdata::{CapData, Resolution};
use crate::config::CommsConfig;
use crate::slots::KernelSlot;
use crate::state::RemoteId;
use crate::syscall::{KernelSyscalls, Transmitter};

use super::Comms;

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

#[derive(Debug, Default)]
pub struct RecordingKernel {
    pub calls: Vec<KernelCall>,
}

impl RecordingKernel {
    pub fn subscribed(&self) -> Vec<KernelSlot> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::Subscribe(slot) => Some(*slot),
                _ => None,
            })
            .collect()
    }

    pub fn take(&mut self) -> Vec<KernelCall> {
        std::mem::take(&mut self.calls)
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
        self.calls.push(KernelCall::Send {
            target,
            method: method.to_string(),
            args,
            result,
        });
    }

    fn resolve(&mut self, resolutions: Vec<Resolution<KernelSlot>>) {
        self.calls.push(KernelCall::Resolve(resolutions));
    }

    fn subscribe(&mut self, promise: KernelSlot) {
        self.calls.push(KernelCall::Subscribe(promise));
    }
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<(RemoteId, String)>,
}

impl RecordingTransport {
    pub fn take(&mut self) -> Vec<(RemoteId, String)> {
        std::mem::take(&mut self.sent)
    }
}

impl Transmitter for RecordingTransport {
    fn transmit(&mut self, remote: &RemoteId, message: String) {
        self.sent.push((remote.clone(), message));
    }
}

pub type TestComms = Comms<RecordingKernel, RecordingTransport>;

pub fn comms() -> TestComms {
    Comms::new(
        CommsConfig::default(),
        RecordingKernel::default(),
        RecordingTransport::default(),
    )
}

pub fn remote(comms: &mut TestComms, name: &str) -> RemoteId {
    comms.add_remote(name).unwrap()
}
