/// Byte-level reader
pub mod cursor;
/// Object graph loader and the `ResData` capability
pub mod loader;
/// Shared winnow glue and small decoders
pub mod parser_utils;
/// Relocation table decoding
pub mod relocation;
/// Keyed dictionary (`ResDict`)
pub mod res_dict;
/// String pool block and per-session string cache
pub mod string_table;
/// Memory-mapped file access
pub mod wrappers;
/// Byte-level writer
pub mod writer;

use std::fmt;

use winnow::binary::Endianness;

use crate::error::{ErrorKind, IResult};

/// Padding pattern at offset 4 that only the 64-bit generation's header carries.
const OFFSET64_HEADER_PATTERN: u32 = 0x2020_2020;

/// The two on-disk schema generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Generation {
    /// 32-bit self-relative offsets, values inlined in dictionaries (Wii U).
    #[default]
    Offset32,
    /// 64-bit pre-resolved offsets, split dictionaries, relocation table (Switch).
    Offset64,
}

impl Generation {
    /// Pick the generation from the fixed header bytes.
    pub fn detect(data: &[u8]) -> IResult<Generation> {
        let pattern = data.get(4..8).ok_or(ErrorKind::TruncatedData {
            offset: 4,
            needed: 4,
            available: data.len().saturating_sub(4),
        })?;
        let pattern = u32::from_le_bytes([pattern[0], pattern[1], pattern[2], pattern[3]]);
        Ok(if pattern == OFFSET64_HEADER_PATTERN {
            Generation::Offset64
        } else {
            Generation::Offset32
        })
    }

    /// Width in bytes of an offset field (and of a relocated pointer slot).
    pub fn offset_size(self) -> u64 {
        match self {
            Generation::Offset32 => 4,
            Generation::Offset64 => 8,
        }
    }

    /// Byte order files of this generation are usually written in.
    pub fn default_endian(self) -> Endianness {
        match self {
            Generation::Offset32 => Endianness::Big,
            Generation::Offset64 => Endianness::Little,
        }
    }

    /// Where the file header stores the version word.
    pub fn version_position(self) -> u64 {
        match self {
            Generation::Offset32 => 4,
            Generation::Offset64 => 8,
        }
    }

    /// Where the file header stores the byte-order mark.
    pub fn byte_order_position(self) -> u64 {
        match self {
            Generation::Offset32 => 8,
            Generation::Offset64 => 12,
        }
    }

    /// Whether dictionary nodes carry their value offset inline.
    pub fn inlines_dict_values(self) -> bool {
        self == Generation::Offset32
    }
}

/// Byte order as recorded by a file's byte-order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    /// Decode a byte-order mark read as big-endian.
    pub fn from_mark(mark: u16) -> IResult<ByteOrder> {
        match mark {
            0xFEFF => Ok(ByteOrder::Big),
            0xFFFE => Ok(ByteOrder::Little),
            other => Err(ErrorKind::UnsupportedVariant {
                what: "byte order mark",
                value: u32::from(other),
            }
            .into()),
        }
    }

    pub fn endian(self) -> Endianness {
        match self {
            ByteOrder::Big => Endianness::Big,
            ByteOrder::Little => Endianness::Little,
        }
    }
}

/// The format version word, split into its four byte fields.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Version {
    pub major: u8,
    pub major2: u8,
    pub minor: u8,
    pub minor2: u8,
}

impl Version {
    pub const fn new(major: u8, major2: u8, minor: u8, minor2: u8) -> Version {
        Version {
            major,
            major2,
            minor,
            minor2,
        }
    }

    pub const fn from_raw(raw: u32) -> Version {
        let [major, major2, minor, minor2] = raw.to_be_bytes();
        Version::new(major, major2, minor, minor2)
    }

    pub const fn raw(self) -> u32 {
        u32::from_be_bytes([self.major, self.major2, self.minor, self.minor2])
    }

    pub fn is_at_least(&self, other: &Version) -> bool {
        self >= other
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.major2, self.minor, self.minor2
        )
    }
}

/// The versions in which an optional or relocated field is present:
/// `since <= version < until`.
///
/// Record shapes list their gates together in one table so the whole layout
/// matrix can be read in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGate {
    pub since: Version,
    pub until: Option<Version>,
}

impl FieldGate {
    /// Present from `since` onwards.
    pub const fn since(since: Version) -> FieldGate {
        FieldGate { since, until: None }
    }

    /// Present in every version before `until`.
    pub const fn before(until: Version) -> FieldGate {
        FieldGate {
            since: Version::new(0, 0, 0, 0),
            until: Some(until),
        }
    }

    /// Present in `[since, until)`.
    pub const fn between(since: Version, until: Version) -> FieldGate {
        FieldGate {
            since,
            until: Some(until),
        }
    }

    pub fn applies(&self, version: Version) -> bool {
        version.is_at_least(&self.since)
            && self.until.is_none_or(|until| !version.is_at_least(&until))
    }
}
