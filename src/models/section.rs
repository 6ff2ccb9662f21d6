use crate::data::loader::ResFileLoader;
use crate::error::IResult;

/// A dictionary-indexed section whose records this crate does not decode.
///
/// Only the entry names and the raw offsets are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnparsedSection {
    pub names: Vec<String>,
    pub dict: Option<u64>,
    pub values: Option<u64>,
}

impl UnparsedSection {
    /// Values offset followed by dictionary offset, as the 64-bit generation stores them.
    pub(crate) fn read_split(loader: &mut ResFileLoader<'_>) -> IResult<Self> {
        let values = loader.read_offset()?;
        let dict = loader.read_offset()?;
        Self::from_offsets(loader, dict, values)
    }

    /// A single dictionary offset whose nodes hold the values.
    pub(crate) fn read_dict(loader: &mut ResFileLoader<'_>) -> IResult<Self> {
        let dict = loader.read_offset()?;
        Self::from_offsets(loader, dict, None)
    }

    pub(crate) fn from_offsets(
        loader: &mut ResFileLoader<'_>,
        dict: Option<u64>,
        values: Option<u64>,
    ) -> IResult<Self> {
        Ok(UnparsedSection {
            names: loader.load_dict_keys_at(dict)?,
            dict,
            values,
        })
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod test {
    use winnow::binary::Endianness;

    use super::*;
    use crate::data::loader::LoaderOptions;
    use crate::data::writer::BinaryWriter;
    use crate::data::writer::fixtures::write_dict;
    use crate::data::{Generation, Version};

    #[test]
    fn split_section_keeps_names_and_offsets() {
        let g = Generation::Offset64;
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(0x100);
        let dict = w.reserve_offset(g);
        w.satisfy_offset_here(dict);
        write_dict(&mut w, g, &[("walk", ()), ("run", ())], |_, _| {});
        let data = w.into_inner();

        let mut loader = ResFileLoader::from_parts(
            &data,
            g,
            Endianness::Little,
            Version::new(0, 8, 0, 0),
            LoaderOptions::default(),
        );
        let section = UnparsedSection::read_split(&mut loader).unwrap();
        assert_eq!(section.names, ["walk", "run"]);
        assert_eq!(section.values, Some(0x100));
        assert_eq!(section.dict, Some(16));
        assert_eq!(section.count(), 2);
        assert_eq!(loader.position(), 16);
    }

    #[test]
    fn null_dictionary_is_empty() {
        let data = [0u8; 4];
        let mut loader = ResFileLoader::from_parts(
            &data,
            Generation::Offset32,
            Endianness::Big,
            Version::new(3, 4, 0, 0),
            LoaderOptions::default(),
        );
        let section = UnparsedSection::read_dict(&mut loader).unwrap();
        assert!(section.is_empty());
        assert_eq!(section.dict, None);
    }
}
