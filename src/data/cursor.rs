//! Positionable, byte-order-aware reader over an in-memory buffer.
//!
//! Every scalar read is a `winnow::binary` parser run against the slice that
//! starts at the current position; the cursor only owns the bookkeeping
//! (bounds, position, byte order) around it.

use winnow::Parser;
use winnow::binary::{self, Endianness};

use crate::data::parser_utils::{
    Decimal10x5, Matrix3x4, Vector3F, Vector4F, WError, bit32_word_count, unpack_bit32_bools,
};
use crate::error::{ErrorKind, IResult};

/// Text encodings strings can be decoded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// 7-bit ASCII; any byte above 0x7F is rejected.
    Ascii,
    /// UTF-16 code units in the cursor's byte order.
    Utf16,
}

impl TextEncoding {
    fn decode(self, bytes: &[u8], endian: Endianness, offset: u64) -> IResult<String> {
        let failure = || ErrorKind::TextDecode {
            offset,
            encoding: self,
        };
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| failure().into()),
            TextEncoding::Ascii => {
                if bytes.is_ascii() {
                    // ASCII is a strict subset of UTF-8.
                    Ok(bytes.iter().map(|&b| b as char).collect())
                } else {
                    Err(failure().into())
                }
            }
            TextEncoding::Utf16 => {
                if bytes.len() % 2 != 0 {
                    return Err(failure().into());
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match endian {
                        Endianness::Big => u16::from_be_bytes([pair[0], pair[1]]),
                        Endianness::Little => u16::from_le_bytes([pair[0], pair[1]]),
                        Endianness::Native => u16::from_ne_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                String::from_utf16(&units).map_err(|_| failure().into())
            }
        }
    }

    /// Width in bytes of one code unit (and of the terminator).
    pub fn unit_size(self) -> usize {
        match self {
            TextEncoding::Utf8 | TextEncoding::Ascii => 1,
            TextEncoding::Utf16 => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endianness,
}

macro_rules! endian_reads {
    ($($(#[$meta:meta])* $name:ident => $parser:ident: $ty:ty, $width:expr;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self) -> IResult<$ty> {
                let endian = self.endian;
                self.parse_with($width, binary::$parser::<_, WError>(endian))
            }
        )*
    };
}

macro_rules! array_reads {
    ($($name:ident => $single:ident: $ty:ty;)*) => {
        $(
            pub fn $name(&mut self, count: usize) -> IResult<Vec<$ty>> {
                self.ensure_available(count.saturating_mul(size_of::<$ty>()))?;
                (0..count).map(|_| self.$single()).collect()
            }
        )*
    };
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8], endian: Endianness) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    /// The whole underlying buffer, independent of the current position.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endianness) {
        self.endian = endian;
    }

    /// Move to an absolute position. Seeking to exactly the end is allowed.
    pub fn seek(&mut self, pos: u64) -> IResult<()> {
        match usize::try_from(pos) {
            Ok(pos) if pos <= self.data.len() => {
                self.pos = pos;
                Ok(())
            }
            _ => Err(ErrorKind::OffsetOutOfRange {
                offset: pos,
                len: self.data.len(),
            }
            .into()),
        }
    }

    pub fn skip(&mut self, count: u64) -> IResult<()> {
        self.seek(self.position().saturating_add(count))
    }

    /// Advance to the next multiple of `alignment`. Never moves backwards.
    pub fn align(&mut self, alignment: u64) -> IResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let pos = self.position();
        let padding = (alignment - pos % alignment) % alignment;
        self.skip(padding)
    }

    /// Run `f` with the cursor moved to `pos`, then put the cursor back where
    /// it was, whether `f` succeeded or not.
    pub fn temporary_seek<R>(
        &mut self,
        pos: u64,
        f: impl FnOnce(&mut Self) -> IResult<R>,
    ) -> IResult<R> {
        let saved = self.pos;
        self.seek(pos)?;
        let result = f(self);
        self.pos = saved;
        result
    }

    fn ensure_available(&self, needed: usize) -> IResult<()> {
        let available = self.remaining();
        if available < needed {
            return Err(ErrorKind::TruncatedData {
                offset: self.position(),
                needed,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn parse_with<O>(
        &mut self,
        width: usize,
        mut parser: impl Parser<&'a [u8], O, WError>,
    ) -> IResult<O> {
        self.ensure_available(width)?;
        let start = self.pos;
        let mut input = &self.data[start..];
        let value = parser
            .parse_next(&mut input)
            .map_err(|e| ErrorKind::ParseError {
                offset: start as u64,
                detail: format!("{e}"),
            })?;
        self.pos = self.data.len() - input.len();
        Ok(value)
    }

    pub fn read_u8(&mut self) -> IResult<u8> {
        self.parse_with(1, binary::u8::<_, WError>)
    }

    pub fn read_i8(&mut self) -> IResult<i8> {
        self.parse_with(1, binary::i8::<_, WError>)
    }

    pub fn read_bool(&mut self) -> IResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    endian_reads! {
        read_u16 => u16: u16, 2;
        read_i16 => i16: i16, 2;
        read_u32 => u32: u32, 4;
        read_i32 => i32: i32, 4;
        read_u64 => u64: u64, 8;
        read_i64 => i64: i64, 8;
        /// IEEE-754 single precision.
        read_f32 => f32: f32, 4;
    }

    pub fn read_decimal10x5(&mut self) -> IResult<Decimal10x5> {
        Ok(Decimal10x5::from_raw(self.read_u16()?))
    }

    array_reads! {
        read_i8s => read_i8: i8;
        read_u16s => read_u16: u16;
        read_i16s => read_i16: i16;
        read_u32s => read_u32: u32;
        read_i32s => read_i32: i32;
        read_f32s => read_f32: f32;
    }

    pub fn read_vector3f(&mut self) -> IResult<Vector3F> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    pub fn read_vector4f(&mut self) -> IResult<Vector4F> {
        Ok([
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ])
    }

    pub fn read_matrix3x4(&mut self) -> IResult<Matrix3x4> {
        Ok([
            self.read_vector4f()?,
            self.read_vector4f()?,
            self.read_vector4f()?,
        ])
    }

    pub fn read_matrix3x4s(&mut self, count: usize) -> IResult<Vec<Matrix3x4>> {
        self.ensure_available(count.saturating_mul(size_of::<Matrix3x4>()))?;
        (0..count).map(|_| self.read_matrix3x4()).collect()
    }

    pub fn read_bytes(&mut self, count: usize) -> IResult<&'a [u8]> {
        self.ensure_available(count)?;
        let start = self.pos;
        self.pos += count;
        Ok(&self.data[start..self.pos])
    }

    /// A `u32` byte length followed by that many bytes.
    pub fn read_u32_prefixed_bytes(&mut self) -> IResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// `count` booleans packed LSB-first into as many 32-bit words as needed.
    pub fn read_bit32_bools(&mut self, count: usize) -> IResult<Vec<bool>> {
        let words = self.read_u32s(bit32_word_count(count))?;
        Ok(unpack_bit32_bools(&words, count))
    }

    /// Decode text up to (and consuming) a null terminator.
    pub fn read_null_string(&mut self, encoding: TextEncoding) -> IResult<String> {
        let start = self.pos;
        let unit = encoding.unit_size();
        let tail = &self.data[start..];
        let len = tail
            .chunks_exact(unit)
            .position(|chunk| chunk.iter().all(|&b| b == 0))
            .map(|units| units * unit)
            .ok_or(ErrorKind::TruncatedData {
                offset: start as u64,
                needed: tail.len() + unit,
                available: tail.len(),
            })?;
        let text = encoding.decode(&tail[..len], self.endian, start as u64)?;
        self.pos = start + len + unit;
        Ok(text)
    }

    /// Decode exactly `len` bytes of text.
    pub fn read_raw_string(&mut self, len: usize, encoding: TextEncoding) -> IResult<String> {
        let start = self.position();
        let bytes = self.read_bytes(len)?;
        encoding.decode(bytes, self.endian, start).inspect_err(|_| {
            self.pos = start as usize;
        })
    }
}
