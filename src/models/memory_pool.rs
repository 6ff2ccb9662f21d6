use crate::data::loader::{ResData, ResFileLoader};
use crate::error::IResult;

/// Size of the GPU memory pool descriptor that precedes an external GPU section.
pub const MEMORY_POOL_SIZE: u64 = 288;

/// GPU memory pool descriptor. The contents are driver-private; only the
/// position is recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryPool {
    pub offset: u64,
}

impl ResData for MemoryPool {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.offset = loader.position();
        Ok(())
    }
}

/// Location of the vertex and index buffer region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BufferInfo {
    pub unk: u32,
    pub buffer_size: u32,
    pub buffer_offset: i64,
}

impl ResData for BufferInfo {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.unk = loader.read_u32()?;
        self.buffer_size = loader.read_u32()?;
        self.buffer_offset = loader.read_i64()?;
        loader.skip(16)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use winnow::binary::Endianness;

    use super::*;
    use crate::data::loader::LoaderOptions;
    use crate::data::writer::BinaryWriter;
    use crate::data::{Generation, Version};

    #[test]
    fn buffer_info_and_pool() {
        let mut w = BinaryWriter::new(Endianness::Little);
        // Both descriptors start at 0x10; the cache keys them by type.
        w.write_u64(0x10);
        w.write_u64(0x10);
        w.write_u32(0);
        w.write_u32(0x400);
        w.write_i64(0x2000);
        w.write_bytes(&[0; 16]);
        let data = w.into_inner();

        let mut loader = ResFileLoader::from_parts(
            &data,
            Generation::Offset64,
            Endianness::Little,
            Version::new(0, 8, 0, 0),
            LoaderOptions::default(),
        );
        let pool = loader.load::<MemoryPool>().unwrap();
        let info = loader.load::<BufferInfo>().unwrap();
        assert_eq!(pool.offset, 0x10);
        assert_eq!(info.buffer_size, 0x400);
        assert_eq!(info.buffer_offset, 0x2000);
        assert_eq!(loader.position(), 16);
    }
}
