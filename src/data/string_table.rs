use std::collections::HashMap;

use crate::data::Generation;
use crate::data::loader::{ResData, ResFileLoader};
use crate::error::{ErrorKind, IResult};

/// Size of the `_STR` block header that precedes the first pooled string.
const STRING_TABLE_HEADER_SIZE: u64 = 0x14;

/// Strings decoded during one loading session, keyed by the absolute offset
/// (or external string ID) they were referenced through. The key carries no
/// encoding: an offset decodes to one string per session.
#[derive(Debug, Clone, Default)]
pub struct StringCache {
    strings: HashMap<u64, String>,
}

impl StringCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, offset: u64) -> Option<&str> {
        self.strings.get(&offset).map(String::as_str)
    }

    pub fn insert(&mut self, offset: u64, text: String) {
        self.strings.insert(offset, text);
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn clear(&mut self) {
        self.strings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.strings.iter().map(|(offset, text)| (*offset, text.as_str()))
    }
}

/// The `_STR` string pool of a 64-bit archive.
///
/// The archive header points just past the block header, at the first
/// length-prefixed entry.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl ResData for StringTable {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.strings.clear();
        if loader.generation() != Generation::Offset64 {
            return Ok(());
        }

        let block_start = loader
            .position()
            .checked_sub(STRING_TABLE_HEADER_SIZE)
            .ok_or(ErrorKind::OffsetOutOfRange {
                offset: loader.position(),
                len: loader.len(),
            })?;
        loader.seek(block_start)?;
        loader.check_signature(b"_STR")?;
        let _block = loader.load_header_block()?;
        let count = loader.read_u32()?;

        let encoding = loader.options().text_encoding;
        for _ in 0..count {
            let _len = loader.read_u16()?;
            self.strings.push(loader.read_null_string(encoding)?);
            loader.align(2)?;
        }
        Ok(())
    }
}
