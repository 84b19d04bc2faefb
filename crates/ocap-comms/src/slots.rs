//! Identifier spaces: local, kernel-facing, and remote-facing slot references.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotParseError {
    #[error("invalid local slot '{0}': expected lo<N> or lp<N>")]
    Local(String),
    #[error("invalid kernel slot '{0}': expected o±N or p±N")]
    Kernel(String),
    #[error("invalid remote slot '{0}': expected ro±N or rp±N")]
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Object,
    Promise,
}

impl SlotKind {
    fn letter(self) -> char {
        match self {
            SlotKind::Object => 'o',
            SlotKind::Promise => 'p',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'o' => Some(SlotKind::Object),
            'p' => Some(SlotKind::Promise),
            _ => None,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Object => f.write_str("object"),
            SlotKind::Promise => f.write_str("promise"),
        }
    }
}

/// Identifier in this process's own namespace. Always allocated here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSlot {
    kind: SlotKind,
    index: u64,
}

impl LocalSlot {
    pub fn new(kind: SlotKind, index: u64) -> Self {
        Self { kind, index }
    }

    pub fn object(index: u64) -> Self {
        Self::new(SlotKind::Object, index)
    }

    pub fn promise(index: u64) -> Self {
        Self::new(SlotKind::Promise, index)
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn is_promise(&self) -> bool {
        self.kind == SlotKind::Promise
    }
}

/// Identifier in the kernel's view of this process. `+` means allocated by
/// this process, `-` means allocated by the kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelSlot {
    kind: SlotKind,
    allocated_here: bool,
    index: u64,
}

impl KernelSlot {
    pub fn new(kind: SlotKind, allocated_here: bool, index: u64) -> Self {
        Self {
            kind,
            allocated_here,
            index,
        }
    }

    /// Slot the kernel allocated (`o-N` / `p-N`).
    pub fn imported(kind: SlotKind, index: u64) -> Self {
        Self::new(kind, false, index)
    }

    /// Slot this process allocated (`o+N` / `p+N`).
    pub fn exported(kind: SlotKind, index: u64) -> Self {
        Self::new(kind, true, index)
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn allocated_here(&self) -> bool {
        self.allocated_here
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

/// Identifier in one peer's namespace, stored from this process's
/// perspective: `+` allocated here, `-` allocated by the peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteSlot {
    kind: SlotKind,
    allocated_here: bool,
    index: u64,
}

impl RemoteSlot {
    pub fn new(kind: SlotKind, allocated_here: bool, index: u64) -> Self {
        Self {
            kind,
            allocated_here,
            index,
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn allocated_here(&self) -> bool {
        self.allocated_here
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// The same identifier as seen from the other end of the link.
    pub fn flipped(&self) -> Self {
        Self {
            allocated_here: !self.allocated_here,
            ..*self
        }
    }
}

fn sign(allocated_here: bool) -> char {
    if allocated_here { '+' } else { '-' }
}

/// Parses `<kind><sign><digits>`.
fn parse_signed(s: &str) -> Option<(SlotKind, bool, u64)> {
    let mut chars = s.chars();
    let kind = SlotKind::from_letter(chars.next()?)?;
    let allocated_here = match chars.next()? {
        '+' => true,
        '-' => false,
        _ => return None,
    };
    let digits = chars.as_str();
    parse_index(digits).map(|index| (kind, allocated_here, index))
}

/// Canonical decimal only: no sign, no leading zeros.
fn parse_index(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

impl FromStr for LocalSlot {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SlotParseError::Local(s.to_string());
        let rest = s.strip_prefix('l').ok_or_else(err)?;
        let mut chars = rest.chars();
        let kind = chars.next().and_then(SlotKind::from_letter).ok_or_else(err)?;
        let index = parse_index(chars.as_str()).ok_or_else(err)?;
        Ok(LocalSlot::new(kind, index))
    }
}

impl FromStr for KernelSlot {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_signed(s)
            .map(|(kind, here, index)| KernelSlot::new(kind, here, index))
            .ok_or_else(|| SlotParseError::Kernel(s.to_string()))
    }
}

impl FromStr for RemoteSlot {
    type Err = SlotParseError;

    /// Accepts `ro±N` / `rp±N` and the legacy bare `o±N` / `p±N` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix('r').unwrap_or(s);
        parse_signed(body)
            .map(|(kind, here, index)| RemoteSlot::new(kind, here, index))
            .ok_or_else(|| SlotParseError::Remote(s.to_string()))
    }
}

impl fmt::Display for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}{}", self.kind.letter(), self.index)
    }
}

impl fmt::Display for KernelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.kind.letter(),
            sign(self.allocated_here),
            self.index
        )
    }
}

impl fmt::Display for RemoteSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}{}{}",
            self.kind.letter(),
            sign(self.allocated_here),
            self.index
        )
    }
}

macro_rules! string_slot_impls {
    ($ty:ty) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_slot_impls!(LocalSlot);
string_slot_impls!(KernelSlot);
string_slot_impls!(RemoteSlot);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_slots_render_and_parse() {
        let slot: LocalSlot = "lp12".parse().unwrap();
        assert_eq!(slot, LocalSlot::promise(12));
        assert_eq!(LocalSlot::object(3).to_string(), "lo3");
        assert!("lx1".parse::<LocalSlot>().is_err());
        assert!("lo".parse::<LocalSlot>().is_err());
        assert!("lo+1".parse::<LocalSlot>().is_err());
    }

    #[test]
    fn kernel_slot_sign_tracks_allocator() {
        let ours: KernelSlot = "o+4".parse().unwrap();
        assert!(ours.allocated_here());
        let theirs: KernelSlot = "p-9".parse().unwrap();
        assert!(!theirs.allocated_here());
        assert_eq!(theirs.kind(), SlotKind::Promise);
        assert_eq!(theirs.to_string(), "p-9");
        assert!("o++4".parse::<KernelSlot>().is_err());
        assert!("o4".parse::<KernelSlot>().is_err());
    }

    #[test]
    fn remote_slot_accepts_legacy_bare_form() {
        let canonical: RemoteSlot = "ro+5".parse().unwrap();
        let bare: RemoteSlot = "o+5".parse().unwrap();
        assert_eq!(canonical, bare);
        assert_eq!(bare.to_string(), "ro+5");
        assert_eq!(canonical.flipped().to_string(), "ro-5");
        assert!("rq+1".parse::<RemoteSlot>().is_err());
        assert!("".parse::<RemoteSlot>().is_err());
    }

    #[test]
    fn indices_must_be_canonical() {
        assert!("rp+01".parse::<RemoteSlot>().is_err());
        assert!("o-00".parse::<KernelSlot>().is_err());
        assert!("lp007".parse::<LocalSlot>().is_err());
        assert_eq!("rp+0".parse::<RemoteSlot>().unwrap().to_string(), "rp+0");
        assert_eq!("lo10".parse::<LocalSlot>().unwrap(), LocalSlot::object(10));
    }

    #[test]
    fn slots_serialize_as_strings() {
        let json = serde_json::to_string(&RemoteSlot::new(SlotKind::Promise, false, 7)).unwrap();
        assert_eq!(json, "\"rp-7\"");
        let back: LocalSlot = serde_json::from_str("\"lo2\"").unwrap();
        assert_eq!(back, LocalSlot::object(2));
    }
}
