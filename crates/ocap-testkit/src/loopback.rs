use ocap_comms::{CommsError, KernelSlot, RemoteId};

use crate::TestComms;

/// Two machines, `left` and `right`, linked to each other. Nothing moves
/// between them until [`Loopback::pump`] is called.
pub struct Loopback {
    pub left: TestComms,
    pub right: TestComms,
    /// How `left` names `right`.
    to_right: RemoteId,
    /// How `right` names `left`.
    to_left: RemoteId,
}

impl Loopback {
    pub fn new() -> Result<Self, CommsError> {
        let mut left = TestComms::new();
        let mut right = TestComms::new();
        let to_right = left.add_remote("right")?;
        let to_left = right.add_remote("left")?;
        Ok(Self {
            left,
            right,
            to_right,
            to_left,
        })
    }

    pub fn to_right(&self) -> &RemoteId {
        &self.to_right
    }

    pub fn to_left(&self) -> &RemoteId {
        &self.to_left
    }

    /// Makes `left`'s kernel object reachable from `right`'s kernel under
    /// the well-known `index`. Returns the slot `right`'s kernel uses.
    pub fn export_left(&mut self, index: u64, kernel_object: KernelSlot) -> Result<KernelSlot, CommsError> {
        self.left.comms.add_egress(&self.to_right, index, kernel_object)?;
        self.right.comms.add_ingress(&self.to_left, index)
    }

    pub fn export_right(&mut self, index: u64, kernel_object: KernelSlot) -> Result<KernelSlot, CommsError> {
        self.right.comms.add_egress(&self.to_left, index, kernel_object)?;
        self.left.comms.add_ingress(&self.to_right, index)
    }

    /// Delivers pending units in both directions until neither side has
    /// anything left to send. Returns how many units moved.
    pub fn pump(&mut self) -> Result<usize, CommsError> {
        let mut moved = 0;
        loop {
            let from_left = self.left.drain_wire();
            let from_right = self.right.drain_wire();
            if from_left.is_empty() && from_right.is_empty() {
                return Ok(moved);
            }
            for message in &from_left {
                log::debug!("left -> right: {message}");
                self.right.receive(&self.to_left, message)?;
            }
            for message in &from_right {
                log::debug!("right -> left: {message}");
                self.left.receive(&self.to_right, message)?;
            }
            moved += from_left.len() + from_right.len();
        }
    }
}
