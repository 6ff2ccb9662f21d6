//! Byte-order-aware writer, the mirror image of [`BinaryCursor`](crate::data::cursor::BinaryCursor).
//!
//! Only the primitives are provided; record shapes do not know how to save
//! themselves.

use winnow::binary::Endianness;

use crate::data::Generation;
use crate::data::cursor::TextEncoding;

/// A placeholder for an offset field whose target is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSlot {
    pub position: u64,
    pub generation: Generation,
}

#[derive(Debug, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    pos: usize,
    endian: Endianness,
}

macro_rules! endian_writes {
    ($($name:ident: $ty:ty;)*) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                let bytes = match self.endian {
                    Endianness::Big => value.to_be_bytes(),
                    Endianness::Little => value.to_le_bytes(),
                    Endianness::Native => value.to_ne_bytes(),
                };
                self.write_bytes(&bytes);
            }
        )*
    };
}

impl BinaryWriter {
    pub fn new(endian: Endianness) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            endian,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endianness) {
        self.endian = endian;
    }

    /// Move to an absolute position; the buffer is zero-extended on the next
    /// write if the position lies past its end.
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos as usize;
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    endian_writes! {
        write_u16: u16;
        write_i16: i16;
        write_u32: u32;
        write_i32: i32;
        write_u64: u64;
        write_i64: i64;
        write_f32: f32;
    }

    /// Zero-fill up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) {
        if alignment <= 1 {
            return;
        }
        let pos = self.position();
        let padding = (alignment - pos % alignment) % alignment;
        self.write_bytes(&vec![0; padding as usize]);
    }

    /// Write `text` in `encoding` without a terminator.
    pub fn write_raw_string(&mut self, text: &str, encoding: TextEncoding) {
        match encoding {
            TextEncoding::Utf8 | TextEncoding::Ascii => self.write_bytes(text.as_bytes()),
            TextEncoding::Utf16 => {
                for unit in text.encode_utf16() {
                    self.write_u16(unit);
                }
            }
        }
    }

    /// Write `text` followed by a null terminator of the encoding's unit width.
    pub fn write_null_string(&mut self, text: &str, encoding: TextEncoding) {
        self.write_raw_string(text, encoding);
        self.write_bytes(&vec![0; encoding.unit_size()]);
    }

    /// Write a zeroed offset field of the generation's width and remember where it is.
    pub fn reserve_offset(&mut self, generation: Generation) -> OffsetSlot {
        let slot = OffsetSlot {
            position: self.position(),
            generation,
        };
        self.write_bytes(&vec![0; generation.offset_size() as usize]);
        slot
    }

    /// Point a reserved offset field at `target`, leaving the write position untouched.
    ///
    /// The 32-bit generation stores the distance from the field itself; the
    /// 64-bit generation stores `target` as-is.
    pub fn satisfy_offset(&mut self, slot: OffsetSlot, target: u64) {
        let current = self.pos;
        self.seek(slot.position);
        match slot.generation {
            Generation::Offset32 => {
                debug_assert!(
                    target >= slot.position,
                    "relative offset target 0x{target:X} lies before its field at 0x{:X}",
                    slot.position
                );
                self.write_u32(target.saturating_sub(slot.position) as u32)
            }
            Generation::Offset64 => self.write_u64(target),
        }
        self.pos = current;
    }

    /// Point a reserved offset field at the current write position.
    pub fn satisfy_offset_here(&mut self, slot: OffsetSlot) {
        let target = self.position();
        self.satisfy_offset(slot, target);
    }
}

/// Synthetic archives for unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// String as the given generation stores it at the target of a key/name offset.
    pub fn write_res_string(w: &mut BinaryWriter, generation: Generation, text: &str) {
        if generation == Generation::Offset64 {
            w.write_u16(text.len() as u16);
        }
        w.write_null_string(text, TextEncoding::Utf8);
    }

    /// Write a dictionary node array at the current position.
    ///
    /// On the 32-bit generation each node's value offset is pointed at the
    /// record `write_value` emits after the node array; on the 64-bit
    /// generation values are left to the caller.
    pub fn write_dict<V>(
        w: &mut BinaryWriter,
        generation: Generation,
        entries: &[(&str, V)],
        mut write_value: impl FnMut(&mut BinaryWriter, &V),
    ) {
        let start = w.position();
        w.write_u32(0);
        w.write_u32(entries.len() as u32);

        let mut key_slots = Vec::with_capacity(entries.len() + 1);
        let mut value_slots = Vec::with_capacity(entries.len());
        for i in 0..=entries.len() {
            w.write_u32(if i == 0 { 0xFFFF_FFFF } else { i as u32 });
            w.write_u16(0);
            w.write_u16(0);
            key_slots.push(w.reserve_offset(generation));
            if generation == Generation::Offset32 {
                let slot = w.reserve_offset(generation);
                if i > 0 {
                    value_slots.push(slot);
                }
            }
        }
        if generation == Generation::Offset32 {
            let size = (w.position() - start) as u32;
            let end = w.position();
            w.seek(start);
            w.write_u32(size);
            w.seek(end);
        }

        for (slot, (_, value)) in value_slots.iter().zip(entries) {
            w.align(4);
            w.satisfy_offset_here(*slot);
            write_value(w, value);
        }

        for (i, slot) in key_slots.iter().enumerate() {
            w.align(2);
            w.satisfy_offset_here(*slot);
            let key = if i == 0 { "" } else { entries[i - 1].0 };
            write_res_string(w, generation, key);
        }
    }
}
