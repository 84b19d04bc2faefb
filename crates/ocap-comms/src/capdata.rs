use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::slots::{LocalSlot, SlotKind};

/// Serialized payload plus the slots it references, in body order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapData<S> {
    pub body: String,
    pub slots: Vec<S>,
}

impl<S> CapData<S> {
    pub fn new(body: impl Into<String>, slots: Vec<S>) -> Self {
        Self {
            body: body.into(),
            slots,
        }
    }

    /// Rewrites every slot in place order; the body is carried unchanged.
    pub fn try_map_slots<T, E>(
        &self,
        mut f: impl FnMut(&S) -> Result<T, E>,
    ) -> Result<CapData<T>, E> {
        let mut slots = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            slots.push(f(slot)?);
        }
        Ok(CapData {
            body: self.body.clone(),
            slots,
        })
    }

    /// The `undefined` value, used to answer legacy result slots.
    pub fn undefined() -> Self {
        Self::new(json!({ "@qclass": "undefined" }).to_string(), Vec::new())
    }

    /// Rejection payload for a call addressed to something that is not callable.
    pub fn undeliverable(method: &str) -> Self {
        let body = json!({
            "@qclass": "error",
            "name": "TypeError",
            "message": format!("data is not callable, has no method {method}"),
        });
        Self::new(body.to_string(), Vec::new())
    }
}

/// One promise settlement: which promise, how it settled, and with what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution<S> {
    pub promise: S,
    pub rejected: bool,
    pub data: CapData<S>,
}

impl<S> Resolution<S> {
    pub fn fulfilled(promise: S, data: CapData<S>) -> Self {
        Self {
            promise,
            rejected: false,
            data,
        }
    }

    pub fn rejected(promise: S, data: CapData<S>) -> Self {
        Self {
            promise,
            rejected: true,
            data,
        }
    }
}

impl CapData<LocalSlot> {
    /// Returns the single object slot when the body is a bare presence
    /// (`{"@qclass":"slot","index":0}`, optionally with an `iface` label).
    pub fn presence(&self) -> Option<LocalSlot> {
        let [slot] = self.slots.as_slice() else {
            return None;
        };
        if slot.kind() != SlotKind::Object {
            return None;
        }
        let body: JsonValue = serde_json::from_str(&self.body).ok()?;
        let map = body.as_object()?;
        let is_slot = map.get("@qclass").and_then(JsonValue::as_str) == Some("slot");
        let is_first = map.get("index").and_then(JsonValue::as_u64) == Some(0);
        let only_known_keys = map
            .keys()
            .all(|key| matches!(key.as_str(), "@qclass" | "index" | "iface"));
        (is_slot && is_first && only_known_keys).then_some(*slot)
    }
}
