//! Line-oriented wire format exchanged with remote peers.
//!
//! ```text
//! unit         := seqNum ':' ackSeqNum ':' body
//! deliver-body := 'deliver' ':' target ':' method ':' result (':' slot)* ';' capBody
//! resolve-body := 'resolve' ':' ('fulfill'|'reject') ':' rpid (':' slot)* ';' capBody
//! body         := deliver-body | resolve-body ('\n' resolve-body)*
//! ```
//!
//! The codec is perspective-agnostic: it renders and parses slots exactly as
//! given. Sign flipping between link ends happens in the engine.

use crate::capdata::{CapData, Resolution};
use crate::error::CommsError;
use crate::slots::{RemoteSlot, SlotKind};

pub const DELIVER: &str = "deliver";
pub const RESOLVE: &str = "resolve";
const FULFILL: &str = "fulfill";
const REJECT: &str = "reject";

/// Inbound ordering claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqNum {
    Ordered(u64),
    /// Empty seqNum: ordering is guaranteed outside this protocol.
    Unordered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Raw seqNum field, validated by the caller against the link counter.
    pub seq: &'a str,
    /// `None` when the ack field is empty.
    pub ack: Option<u64>,
    pub body: &'a str,
}

impl Envelope<'_> {
    pub fn seq_num(&self) -> Option<SeqNum> {
        if self.seq.is_empty() {
            return Some(SeqNum::Unordered);
        }
        parse_number(self.seq).map(SeqNum::Ordered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireDelivery {
    pub target: RemoteSlot,
    pub method: String,
    pub result: Option<RemoteSlot>,
    pub args: CapData<RemoteSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Deliver(WireDelivery),
    Resolve(Vec<Resolution<RemoteSlot>>),
}

/// Splits `seq:ack:body` at the first two colons.
pub fn parse_envelope(raw: &str) -> Result<Envelope<'_>, CommsError> {
    let (seq, rest) = raw.split_once(':').ok_or_else(|| {
        CommsError::MalformedMessage(format!("received message {raw:?} lacks seqNum delimiter"))
    })?;
    let (ack, body) = rest.split_once(':').ok_or_else(|| {
        CommsError::MalformedMessage(format!(
            "received message {raw:?} lacks ackSeqNum delimiter"
        ))
    })?;
    let ack = if ack.is_empty() {
        None
    } else {
        Some(parse_number(ack).ok_or_else(|| {
            CommsError::MalformedMessage(format!("ackSeqNum {ack:?} is not a decimal number"))
        })?)
    };
    Ok(Envelope { seq, ack, body })
}

fn parse_number(raw: &str) -> Option<u64> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) || (raw.len() > 1 && raw.starts_with('0')) {
        return None;
    }
    raw.parse().ok()
}

pub fn render_envelope(seq: u64, ack: u64, body: &str) -> String {
    format!("{seq}:{ack}:{body}")
}

/// Method names travel as a bare field and may not contain delimiters.
pub fn is_legal_method(method: &str) -> bool {
    !method.contains([':', ';'])
}

impl WireMessage {
    pub fn parse(body: &str) -> Result<Self, CommsError> {
        let command = body.split(':').next().unwrap_or_default();
        match command {
            DELIVER => parse_deliver(body).map(WireMessage::Deliver),
            RESOLVE => body
                .split('\n')
                .map(parse_resolve)
                .collect::<Result<Vec<_>, _>>()
                .map(WireMessage::Resolve),
            other => Err(CommsError::UnknownCommand(other.to_string())),
        }
    }

    pub fn render(&self) -> String {
        match self {
            WireMessage::Deliver(delivery) => {
                let result = delivery
                    .result
                    .map(|slot| slot.to_string())
                    .unwrap_or_default();
                format!(
                    "{DELIVER}:{}:{}:{result}{};{}",
                    delivery.target,
                    delivery.method,
                    render_slots(&delivery.args.slots),
                    delivery.args.body
                )
            }
            WireMessage::Resolve(resolutions) => resolutions
                .iter()
                .map(|resolution| {
                    let tag = if resolution.rejected { REJECT } else { FULFILL };
                    format!(
                        "{RESOLVE}:{tag}:{}{};{}",
                        resolution.promise,
                        render_slots(&resolution.data.slots),
                        resolution.data.body
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn render_slots(slots: &[RemoteSlot]) -> String {
    slots.iter().map(|slot| format!(":{slot}")).collect()
}

/// Splits `header;body` at the first semicolon.
fn split_body<'a>(message: &'a str, what: &str) -> Result<(&'a str, &'a str), CommsError> {
    message
        .split_once(';')
        .ok_or_else(|| CommsError::MalformedMessage(format!("missing semicolon in {what} {message:?}")))
}

fn parse_slots(fields: &[&str]) -> Result<Vec<RemoteSlot>, CommsError> {
    fields
        .iter()
        .map(|field| field.parse().map_err(CommsError::from))
        .collect()
}

fn parse_deliver(message: &str) -> Result<WireDelivery, CommsError> {
    let (header, body) = split_body(message, DELIVER)?;
    let fields: Vec<&str> = header.split(':').skip(1).collect();
    let [target, method, result, slots @ ..] = fields.as_slice() else {
        return Err(CommsError::MalformedMessage(format!(
            "deliver needs target, method and result fields: {message:?}"
        )));
    };
    let result = if result.is_empty() {
        None
    } else {
        Some(result.parse::<RemoteSlot>()?)
    };
    Ok(WireDelivery {
        target: target.parse()?,
        method: (*method).to_string(),
        result,
        args: CapData::new(body, parse_slots(slots)?),
    })
}

fn parse_resolve(message: &str) -> Result<Resolution<RemoteSlot>, CommsError> {
    let (header, body) = split_body(message, RESOLVE)?;
    let fields: Vec<&str> = header.split(':').collect();
    let [command, tag, rpid, slots @ ..] = fields.as_slice() else {
        return Err(CommsError::MalformedMessage(format!(
            "resolve needs a tag and a promise: {message:?}"
        )));
    };
    if *command != RESOLVE {
        return Err(CommsError::UnknownCommand((*command).to_string()));
    }
    let rejected = match *tag {
        FULFILL => false,
        REJECT => true,
        other => {
            return Err(CommsError::MalformedMessage(format!(
                "resolve tag must be fulfill or reject, got {other:?}"
            )));
        }
    };
    let promise: RemoteSlot = rpid.parse()?;
    if promise.kind() != SlotKind::Promise {
        return Err(CommsError::WrongSlotKind {
            slot: promise.to_string(),
            expected: SlotKind::Promise,
        });
    }
    Ok(Resolution {
        promise,
        rejected,
        data: CapData::new(body, parse_slots(slots)?),
    })
}
