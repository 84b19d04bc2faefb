//! Shared setup for the integration tests.
//!
//! Each integration test compiles this module separately, so some helpers may
//! appear unused in certain test files.

#![allow(dead_code)]

use ocap_comms::{CommsError, KernelSlot, RemoteId, RemoteSlot, SlotKind};
use ocap_testkit::TestComms;
use ocap_testkit::fixtures::kernel_object;

/// One machine with a remote `alice` that can reach kernel object `o-1`
/// under the well-known index 5.
pub fn alice_with_egress() -> Result<(TestComms, RemoteId), CommsError> {
    let mut tc = TestComms::new();
    let alice = tc.add_remote("alice")?;
    tc.comms.add_egress(&alice, 5, kernel_object(1))?;
    Ok((tc, alice))
}

/// Remote slot as stored in this machine's tables.
pub fn rslot(s: &str) -> RemoteSlot {
    s.parse().expect("valid remote slot")
}

pub fn exported_promise(index: u64) -> KernelSlot {
    KernelSlot::exported(SlotKind::Promise, index)
}

pub fn exported_object(index: u64) -> KernelSlot {
    KernelSlot::exported(SlotKind::Object, index)
}

pub fn slot_body(count: usize) -> String {
    ocap_testkit::fixtures::args::<KernelSlot>(
        (0..count as u64).map(kernel_object).collect(),
    )
    .body
}
