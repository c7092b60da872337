//! Fixed-size digests and account names.

use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de::Error as _,
};
use std::{
    fmt,
    str::FromStr,
};

/// A 32-byte digest.
///
/// Binary formats encode it as 32 raw bytes, human-readable formats as a
/// `0x`-prefixed lowercase hex string.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Deref,
    derive_more::DerefMut,
)]
pub struct Bytes32([u8; 32]);

/// Identifier of a block: the header digest with the block number in the first four bytes.
pub type BlockId = Bytes32;
/// Identifier of a transaction.
pub type TransactionId = Bytes32;
/// The host chain name for a SHA-256 digest.
pub type Checksum256 = Bytes32;

impl Bytes32 {
    /// Size of the digest in bytes.
    pub const LEN: usize = 32;

    /// The all-zero digest.
    pub const fn zeroed() -> Self {
        Self([0u8; 32])
    }

    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the digest as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copies the digest from a slice, if it has the right length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl AsRef<[u8]> for Bytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::LowerHex for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self)
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self)
    }
}

impl FromStr for Bytes32 {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| "invalid 32 byte hex string")?;
        Ok(Self(bytes))
    }
}

impl Serialize for Bytes32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_str(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Serde helpers for opaque byte strings: hex text in human-readable formats,
/// plain bytes otherwise.
pub mod hex_bytes {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error as _,
    };

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let s = s.strip_prefix("0x").unwrap_or(&s);
            hex::decode(s).map_err(D::Error::custom)
        } else {
            <Vec<u8>>::deserialize(deserializer)
        }
    }
}

const NAME_CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const NAME_MAX_LEN: usize = 13;

/// An account, action or permission name of the host chain.
///
/// Names are up to 13 characters long and pack into a `u64`: the first twelve
/// characters take five bits each from the most significant end, the
/// thirteenth takes the remaining four bits.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
)]
pub struct Name(u64);

impl Name {
    /// Wraps an already packed value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The packed value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some(u64::from(c - b'a') + 6),
        b'1'..=b'5' => Some(u64::from(c - b'1') + 1),
        b'.' => Some(0),
        _ => None,
    }
}

/// The error returned when a string is not a valid [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum InvalidName {
    /// The name is longer than 13 characters.
    #[display(fmt = "name `{_0}` is longer than 13 characters")]
    TooLong(String),
    /// The name contains a character outside of `.1-5a-z`.
    #[display(fmt = "name `{_0}` contains an invalid character")]
    InvalidCharacter(String),
    /// The thirteenth character is outside of `.1-5a-j`.
    #[display(fmt = "the thirteenth character of `{_0}` must be in `.1-5a-j`")]
    InvalidLastCharacter(String),
}

impl core::error::Error for InvalidName {}

impl FromStr for Name {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() > NAME_MAX_LEN {
            return Err(InvalidName::TooLong(s.to_owned()))
        }

        let mut value = 0u64;
        let mut shift = 64u32;
        for c in bytes.iter().take(12) {
            let symbol = char_to_symbol(*c)
                .ok_or_else(|| InvalidName::InvalidCharacter(s.to_owned()))?;
            shift = shift.saturating_sub(5);
            value |= (symbol & 0x1f) << shift;
        }

        if let Some(c) = bytes.get(12) {
            let symbol = char_to_symbol(*c)
                .ok_or_else(|| InvalidName::InvalidCharacter(s.to_owned()))?;
            if symbol > 0x0f {
                return Err(InvalidName::InvalidLastCharacter(s.to_owned()))
            }
            value |= symbol;
        }

        Ok(Self(value))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; NAME_MAX_LEN];
        let mut rest = self.0;
        for (i, slot) in chars.iter_mut().rev().enumerate() {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            let symbol = usize::try_from(rest & mask).map_err(|_| fmt::Error)?;
            *slot = NAME_CHARMAP[symbol];
            rest >>= shift;
        }
        let len = chars
            .iter()
            .rposition(|c| *c != b'.')
            .map(|pos| pos.saturating_add(1))
            .unwrap_or(0);
        let text = core::str::from_utf8(&chars[..len]).map_err(|_| fmt::Error)?;
        f.write_str(text)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_str(&s).map_err(D::Error::custom)
        } else {
            u64::deserialize(deserializer).map(Self)
        }
    }
}
