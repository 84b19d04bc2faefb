//! Inter-machine object-capability delivery.
//!
//! A [`Comms`] instance sits between a local kernel and any number of remote
//! machines. It translates slots across three identifier spaces (local,
//! kernel, and one per remote), keeps the single-decider ledger for
//! unresolved promises, routes calls (pipelining through resolved promises),
//! and broadcasts resolutions to their subscribers over a sequenced,
//! acknowledged line protocol.

pub mod capdata;
pub mod clist;
pub mod config;
pub mod engine;
pub mod error;
pub mod slots;
pub mod state;
pub mod syscall;
pub mod wire;

pub use capdata::{CapData, Resolution};
pub use clist::CList;
pub use config::CommsConfig;
pub use engine::{Comms, LocalDelivery, LocalResolution, Route};
pub use error::CommsError;
pub use slots::{KernelSlot, LocalSlot, RemoteSlot, SlotKind, SlotParseError};
pub use state::{CommsState, Decider, ObjectOwner, PromiseRecord, RemoteId, RemoteState};
pub use syscall::{KernelSyscalls, Transmitter};
