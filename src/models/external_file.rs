use crate::data::Generation;
use crate::data::loader::{ResData, ResFileLoader};
use crate::error::IResult;

/// An arbitrary file embedded in the archive, such as a shader binary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExternalFile {
    /// Absolute position of the payload; `None` for an empty file.
    pub offset: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Vec<u8>,
}

impl ResData for ExternalFile {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.offset = loader.read_offset()?;
        let size = loader.read_u32()?;
        if loader.generation() == Generation::Offset64 {
            loader.skip(4)?;
        }
        self.data = loader.load_custom_at(self.offset, |l| {
            Ok(l.read_bytes(size as usize)?.to_vec())
        })?;
        Ok(())
    }
}

impl ExternalFile {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
