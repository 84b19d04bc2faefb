use crate::capdata::{CapData, Resolution};
use crate::slots::KernelSlot;
use crate::state::RemoteId;

/// Calls this process makes into the kernel. All are one-way; answers come
/// back later as new inbound events.
pub trait KernelSyscalls {
    fn send(
        &mut self,
        target: KernelSlot,
        method: &str,
        args: CapData<KernelSlot>,
        result: Option<KernelSlot>,
    );
    fn resolve(&mut self, resolutions: Vec<Resolution<KernelSlot>>);
    fn subscribe(&mut self, promise: KernelSlot);
}

/// Outbound transport toward remote peers. Delivery guarantees (ordering,
/// retries) belong to the implementation.
pub trait Transmitter {
    fn transmit(&mut self, remote: &RemoteId, message: String);
}
