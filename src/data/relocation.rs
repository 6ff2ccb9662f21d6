//! The `_RLT` relocation table of 64-bit archives.
//!
//! It lists every pointer slot in the file so a runtime can patch them after
//! mapping; here it is decoded into a per-section map of slot offset to the
//! pointer value the slot resolves to.

use std::collections::BTreeMap;

use crate::data::loader::{ResData, ResFileLoader};
use crate::error::IResult;

/// Pointer slots are always 8 bytes wide.
pub const RELOCATION_WORD: u64 = 8;

const TABLE_HEADER_SIZE: u64 = 0x10;
const SECTION_SIZE: u64 = 0x18;
const ENTRY_SIZE: u64 = 0x8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RelocationEntry {
    pub region_offset: u32,
    pub array_count: u16,
    pub reloc_count: u8,
    pub array_stride: u8,
}

impl ResData for RelocationEntry {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.region_offset = loader.read_u32()?;
        self.array_count = loader.read_u16()?;
        self.reloc_count = loader.read_u8()?;
        self.array_stride = loader.read_u8()?;
        Ok(())
    }
}

impl RelocationEntry {
    /// Region offsets of every slot this entry covers, in table order.
    pub fn slot_offsets(&self) -> impl Iterator<Item = u64> {
        let first = u64::from(self.region_offset);
        let reloc_count = u64::from(self.reloc_count);
        let run = (reloc_count + u64::from(self.array_stride)) * RELOCATION_WORD;
        (0..u64::from(self.array_count)).flat_map(move |array| {
            let base = first + array * run;
            (0..reloc_count).map(move |slot| base + slot * RELOCATION_WORD)
        })
    }
}

/// One slot: where it lives and what it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RelocatedSlot {
    pub region_offset: u64,
    pub pointer: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RelocationSection {
    pub base_pointer: u64,
    pub region_offset: u32,
    pub region_size: u32,
    pub base_entry_index: u32,
    pub entry_count: u32,
    entries: Vec<RelocationEntry>,
    slots: Vec<RelocatedSlot>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pointers: BTreeMap<u64, u64>,
}

impl ResData for RelocationSection {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.base_pointer = loader.read_u64()?;
        self.region_offset = loader.read_u32()?;
        self.region_size = loader.read_u32()?;
        self.base_entry_index = loader.read_u32()?;
        self.entry_count = loader.read_u32()?;
        Ok(())
    }
}

impl RelocationSection {
    /// Start of the file as seen by this section's base pointer.
    pub fn file_base(&self) -> u64 {
        if self.base_pointer == 0 {
            0
        } else {
            self.base_pointer
                .wrapping_sub(u64::from(self.region_offset))
        }
    }

    /// Entries belonging to this section, in table order.
    pub fn entries(&self) -> &[RelocationEntry] {
        &self.entries
    }

    /// Every slot in the order the entries describe them.
    pub fn slots(&self) -> &[RelocatedSlot] {
        &self.slots
    }

    /// Pointer value for the slot at `region_offset`, if it is a slot.
    pub fn pointer_at(&self, region_offset: u64) -> Option<u64> {
        self.pointers.get(&region_offset).copied()
    }

    pub fn is_pointer(&self, region_offset: u64) -> bool {
        self.pointers.contains_key(&region_offset)
    }

    fn relocate(&mut self, entries: Vec<RelocationEntry>) {
        let file_base = self.file_base();
        for entry in &entries {
            for region_offset in entry.slot_offsets() {
                let pointer = if region_offset == 0 {
                    0
                } else {
                    file_base.wrapping_add(region_offset)
                };
                if self.pointers.insert(region_offset, pointer).is_some() {
                    tracing::warn!(region_offset, "relocation slot listed twice");
                }
                self.slots.push(RelocatedSlot {
                    region_offset,
                    pointer,
                });
            }
        }
        self.entries = entries;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RelocationTable {
    pub this_table_offset: u32,
    pub reserved: u32,
    sections: Vec<RelocationSection>,
}

impl ResData for RelocationTable {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"_RLT")?;
        self.this_table_offset = loader.read_u32()?;
        let section_count = loader.read_u32()?;
        self.reserved = loader.read_u32()?;

        let headers = (0..section_count)
            .map(|_| loader.load_inline::<RelocationSection>())
            .collect::<IResult<Vec<_>>>()?;

        // Entries of all sections follow the section headers back to back.
        self.sections = Vec::with_capacity(headers.len());
        for mut section in headers {
            let entries = (0..section.entry_count)
                .map(|_| loader.load_inline::<RelocationEntry>())
                .collect::<IResult<Vec<_>>>()?;
            section.relocate(entries);
            self.sections.push(section);
        }
        Ok(())
    }
}

impl RelocationTable {
    pub fn sections(&self) -> &[RelocationSection] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Total slot count over all sections.
    pub fn slot_count(&self) -> usize {
        self.sections.iter().map(|s| s.slots.len()).sum()
    }

    /// Pointer value for `region_offset` in the first section that lists it.
    pub fn pointer_at(&self, region_offset: u64) -> Option<u64> {
        self.sections
            .iter()
            .find_map(|s| s.pointer_at(region_offset))
    }

    pub fn is_pointer(&self, region_offset: u64) -> bool {
        self.sections.iter().any(|s| s.is_pointer(region_offset))
    }

    /// Encoded size of a table with the given number of sections and entries.
    pub fn table_size(sections: u64, entries: u64) -> u64 {
        sections * SECTION_SIZE + entries * ENTRY_SIZE + TABLE_HEADER_SIZE
    }

    /// Absolute position of section header `index`.
    pub fn section_offset(&self, index: u64) -> u64 {
        u64::from(self.this_table_offset) + TABLE_HEADER_SIZE + index * SECTION_SIZE
    }

    /// Absolute position of entry `index`, counted over all sections.
    pub fn base_entry_offset(&self, index: u64) -> u64 {
        u64::from(self.this_table_offset)
            + TABLE_HEADER_SIZE
            + SECTION_SIZE * self.sections.len() as u64
            + index * ENTRY_SIZE
    }
}

#[cfg(test)]
mod test {
    use winnow::binary::Endianness;

    use super::*;
    use crate::data::loader::LoaderOptions;
    use crate::data::writer::BinaryWriter;
    use crate::data::{Generation, Version};

    /// `(base_pointer, region_offset, entries)` per section.
    type SectionSpec<'a> = (u64, u32, &'a [RelocationEntry]);

    fn write_table(sections: &[SectionSpec<'_>]) -> Vec<u8> {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_bytes(b"_RLT");
        w.write_u32(0);
        w.write_u32(sections.len() as u32);
        w.write_u32(0);
        let mut base_entry = 0;
        for (base_pointer, region_offset, entries) in sections {
            w.write_u64(*base_pointer);
            w.write_u32(*region_offset);
            w.write_u32(0x1000);
            w.write_u32(base_entry);
            w.write_u32(entries.len() as u32);
            base_entry += entries.len() as u32;
        }
        for (_, _, entries) in sections {
            for entry in entries.iter() {
                w.write_u32(entry.region_offset);
                w.write_u16(entry.array_count);
                w.write_u8(entry.reloc_count);
                w.write_u8(entry.array_stride);
            }
        }
        w.into_inner()
    }

    fn read_table(data: &[u8]) -> RelocationTable {
        let mut loader = ResFileLoader::from_parts(
            data,
            Generation::Offset64,
            Endianness::Little,
            Version::new(0, 8, 0, 0),
            LoaderOptions::default(),
        );
        loader.load_relocation_table(0).unwrap()
    }

    fn entry(region_offset: u32, array_count: u16, reloc_count: u8, array_stride: u8) -> RelocationEntry {
        RelocationEntry {
            region_offset,
            array_count,
            reloc_count,
            array_stride,
        }
    }

    #[test]
    fn slots_walk_arrays_with_stride() {
        let entries = [entry(0x10, 2, 2, 1)];
        let data = write_table(&[(0x2000, 0, &entries)]);
        let table = read_table(&data);
        let offsets: Vec<_> = table.sections()[0]
            .slots()
            .iter()
            .map(|s| s.region_offset)
            .collect();
        // Two runs of two slots; the second run starts (2 + 1) words later.
        assert_eq!(offsets, [0x10, 0x18, 0x28, 0x30]);
        assert_eq!(table.pointer_at(0x28), Some(0x2028));
        assert!(table.is_pointer(0x30));
        assert!(!table.is_pointer(0x20));
    }

    #[test]
    fn slot_count_is_sum_of_array_times_reloc_counts() {
        let first = [entry(0x08, 3, 1, 0), entry(0x100, 1, 4, 0)];
        let second = [entry(0x400, 2, 2, 2)];
        let data = write_table(&[(0, 0, &first), (0x8000, 0x400, &second)]);
        let table = read_table(&data);
        assert_eq!(table.section_count(), 2);
        assert_eq!(table.slot_count(), 3 + 4 + 4);
        assert_eq!(table.sections()[1].base_entry_index, 2);
        assert_eq!(table.sections()[1].entries(), &second);
    }

    #[test]
    fn decoding_is_deterministic() {
        let entries = [entry(0x20, 4, 3, 5), entry(0x300, 1, 1, 0)];
        let data = write_table(&[(0x1_0000, 0x20, &entries)]);
        let first = read_table(&data);
        let second = read_table(&data);
        assert_eq!(first, second);
        assert_eq!(first.sections()[0].slots(), second.sections()[0].slots());
    }

    #[test]
    fn zero_base_pointer_means_no_adjustment() {
        let entries = [entry(0, 1, 2, 0)];
        let data = write_table(&[(0, 0x40, &entries)]);
        let table = read_table(&data);
        let section = &table.sections()[0];
        assert_eq!(section.file_base(), 0);
        // A zero base leaves region offsets unshifted; it does not zero every pointer.
        assert_eq!(section.pointer_at(0), Some(0));
        assert_eq!(section.pointer_at(8), Some(8));
    }

    #[test]
    fn layout_helpers() {
        assert_eq!(RelocationTable::table_size(2, 3), 2 * 0x18 + 3 * 8 + 0x10);
        let entries = [entry(0x08, 1, 1, 0)];
        let data = write_table(&[(0, 0, &entries), (0, 0, &entries)]);
        let table = read_table(&data);
        assert_eq!(table.section_offset(1), 0x10 + 0x18);
        assert_eq!(table.base_entry_offset(1), 0x10 + 2 * 0x18 + 8);
    }
}
