//! Slot and payload builders shared by the integration tests.

use ocap_comms::{CapData, KernelSlot, SlotKind};
use serde_json::{Value, json};

pub fn kernel_object(index: u64) -> KernelSlot {
    KernelSlot::imported(SlotKind::Object, index)
}

pub fn kernel_promise(index: u64) -> KernelSlot {
    KernelSlot::imported(SlotKind::Promise, index)
}

/// Body reference to slot `index`.
pub fn slot_ref(index: usize) -> Value {
    json!({ "@qclass": "slot", "index": index })
}

/// A bare presence: the whole value is slot 0.
pub fn presence<S>(slot: S) -> CapData<S> {
    CapData::new(slot_ref(0).to_string(), vec![slot])
}

/// An argument list referencing each slot once, in order.
pub fn args<S>(slots: Vec<S>) -> CapData<S> {
    let body: Vec<Value> = (0..slots.len()).map(slot_ref).collect();
    CapData::new(Value::Array(body).to_string(), slots)
}

pub fn no_args<S>() -> CapData<S> {
    CapData::new("[]", Vec::new())
}

/// Plain JSON data without slots.
pub fn data<S>(value: Value) -> CapData<S> {
    CapData::new(value.to_string(), Vec::new())
}
