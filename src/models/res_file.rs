//! `FRES`: the archive root.
//!
//! Both generations share this record shape; the header layouts differ
//! enough that each has its own reader. Sections this crate does not model
//! are kept as [`UnparsedSection`]s.

use std::path::Path;

use rootcause::Report;
use tracing::debug;

use crate::Rc;
use crate::data::loader::{LoaderOptions, ResData, ResFileLoader};
use crate::data::relocation::RelocationTable;
use crate::data::res_dict::ResDict;
use crate::data::string_table::StringTable;
use crate::data::wrappers::mmap::MappedFile;
use crate::data::{ByteOrder, FieldGate, Generation, Version};
use crate::error::{Error, ErrorKind, IResult};
use crate::models::external_file::ExternalFile;
use crate::models::memory_pool::{BufferInfo, MEMORY_POOL_SIZE, MemoryPool};
use crate::models::model::Model;
use crate::models::section::UnparsedSection;
use crate::models::skeletal_anim::SkeletalAnim;

mod gates {
    use super::*;

    /// 64-bit: 32 reserved bytes after the model offsets and two extra section counts.
    pub const RESERVED_SECTIONS: FieldGate = FieldGate::since(Version::new(0, 9, 0, 0));
    /// 64-bit: external string tables and external GPU sections exist.
    pub const EXTERNAL_FLAGS: FieldGate = FieldGate::since(Version::new(0, 10, 0, 0));
}

/// Absolute position of the external flags byte in 64-bit headers.
const EXTERNAL_FLAGS_POSITION: u64 = 0xEE;

/// Alignment forced on the data region of files with external content.
const EXTERNAL_DATA_ALIGNMENT: u32 = 0x1000;

/// Bits of the 64-bit external flags byte.
pub mod external_flags {
    pub const IS_EXTERNAL_MODEL_UNINITIALIZED: u8 = 1 << 0;
    pub const HAS_EXTERNAL_STRING: u8 = 1 << 1;
    pub const HOLDS_EXTERNAL_STRINGS: u8 = 1 << 2;
    pub const HAS_EXTERNAL_GPU: u8 = 1 << 3;
    pub const MESH_CODEC_RESAVE: u8 = 1 << 7;
}

/// A string published by an external string file, keyed by its ID.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExternalString {
    pub id: u64,
    pub text: String,
}

/// GPU data stored after the end of the archive proper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExternalGpuSection {
    pub data_offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResFile {
    pub generation: Generation,
    pub version: Version,
    pub byte_order: ByteOrder,
    pub name: String,
    /// Raw alignment field: a power-of-two exponent on 64-bit, a byte count on 32-bit.
    pub alignment: u32,
    pub target_addr_size: u8,
    pub flags: u16,
    pub block_offset: u16,
    pub file_size: u32,
    pub external_flags: u8,
    pub data_alignment_override: u32,

    pub models: ResDict<Rc<Model>>,
    pub skeletal_anims: ResDict<Rc<SkeletalAnim>>,
    pub external_files: ResDict<Rc<ExternalFile>>,

    pub textures: UnparsedSection,
    /// 64-bit files store every material animation kind in one section.
    pub material_anims: UnparsedSection,
    pub shader_param_anims: UnparsedSection,
    pub color_anims: UnparsedSection,
    pub tex_srt_anims: UnparsedSection,
    pub tex_pattern_anims: UnparsedSection,
    pub bone_visibility_anims: UnparsedSection,
    pub mat_visibility_anims: UnparsedSection,
    pub shape_anims: UnparsedSection,
    pub scene_anims: UnparsedSection,

    pub memory_pool: Rc<MemoryPool>,
    pub buffer_info: Rc<BufferInfo>,
    pub external_gpu: Option<ExternalGpuSection>,
    pub string_table: Rc<StringTable>,
    /// 32-bit only: where the string pool starts.
    pub string_pool: Option<u64>,
    pub string_pool_size: u32,
    /// Populated instead of every other section when this is an external string file.
    pub external_strings: Vec<ExternalString>,
    pub relocation_table: Option<RelocationTable>,
}

impl ResFile {
    /// Load an archive of either generation from memory.
    pub fn from_bytes(data: &[u8]) -> Result<ResFile, Report<Error>> {
        Self::from_bytes_with(data, LoaderOptions::default())
    }

    pub fn from_bytes_with(data: &[u8], options: LoaderOptions) -> Result<ResFile, Report<Error>> {
        let mut loader = ResFileLoader::with_options(data, options)?;
        Ok(Self::from_loader(&mut loader)?)
    }

    /// Memory-map and load the archive at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ResFile, Report<Error>> {
        let file = MappedFile::open(path)?;
        Self::from_bytes(file.as_ref())
    }

    /// Load the root record from the start of the loader's buffer.
    pub fn from_loader(loader: &mut ResFileLoader<'_>) -> IResult<ResFile> {
        loader.seek(0)?;
        let file = loader.load_inline::<ResFile>()?;
        debug!(
            name = %file.name,
            models = file.models.len(),
            skeletal_anims = file.skeletal_anims.len(),
            external_files = file.external_files.len(),
            "loaded archive"
        );
        Ok(file)
    }

    /// Alignment of the data region in bytes.
    pub fn data_alignment(&self) -> u64 {
        match self.generation {
            Generation::Offset64 => 1u64 << self.alignment.min(63),
            Generation::Offset32 => u64::from(self.alignment),
        }
    }

    /// The four version fields run together, e.g. `"0900"`.
    pub fn version_full(&self) -> String {
        let v = self.version;
        format!("{}{}{}{}", v.major, v.major2, v.minor, v.minor2)
    }

    pub fn has_external_flag(&self, flag: u8) -> bool {
        self.external_flags & flag == flag
    }

    fn load_switch(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"FRES")?;
        loader.skip(4)?;
        self.version = Version::from_raw(loader.read_u32()?);
        self.byte_order = loader.read_byte_order()?;
        self.alignment = u32::from(loader.read_u8()?);
        self.target_addr_size = loader.read_u8()?;
        let _file_name = loader.read_u32()?;
        self.flags = loader.read_u16()?;
        self.block_offset = loader.read_u16()?;
        let relocation_table = loader.read_u32()?;
        self.file_size = loader.read_u32()?;

        self.name = loader.load_string(None)?;
        let model_values = loader.read_offset()?;
        let model_dict = loader.read_offset()?;
        let reserved_sections = gates::RESERVED_SECTIONS.applies(self.version);
        if reserved_sections {
            loader.skip(32)?;
        }
        self.skeletal_anims = loader.load_dict_values()?;
        self.material_anims = UnparsedSection::read_split(loader)?;
        self.bone_visibility_anims = UnparsedSection::read_split(loader)?;
        self.shape_anims = UnparsedSection::read_split(loader)?;
        self.scene_anims = UnparsedSection::read_split(loader)?;
        self.memory_pool = loader.load()?;
        self.buffer_info = loader.load()?;

        if gates::EXTERNAL_FLAGS.applies(self.version) {
            let flags = loader.temporary_seek(EXTERNAL_FLAGS_POSITION, |l| l.read_u8())?;
            if flags & external_flags::HOLDS_EXTERNAL_STRINGS != 0 {
                self.external_flags = flags;
                return self.load_external_strings(loader);
            }
            if flags & external_flags::HAS_EXTERNAL_GPU != 0 {
                let (data_offset, size) = loader.temporary_seek(u64::from(self.file_size), |l| {
                    Ok((l.read_u32()?, l.read_u32()?))
                })?;
                self.external_gpu = Some(ExternalGpuSection { data_offset, size });
                self.buffer_info = Rc::new(BufferInfo {
                    buffer_offset: i64::from(self.file_size) + MEMORY_POOL_SIZE as i64,
                    ..(*self.buffer_info).clone()
                });
            }
        }

        self.external_files = loader.load_dict_values()?;
        loader.skip(8)?;
        self.string_table = loader.load()?;
        self.string_pool_size = loader.read_u32()?;
        let _num_model = loader.read_u16()?;
        self.models = loader.load_dict_values_at(model_dict, model_values)?;

        if reserved_sections {
            let unknown = [loader.read_u16()?, loader.read_u16()?];
            if let Some(&count) = unknown.iter().find(|&&count| count != 0) {
                return Err(ErrorKind::UnsupportedVariant {
                    what: "unknown section count",
                    value: u32::from(count),
                }
                .into());
            }
        }
        let _section_counts = loader.read_u16s(6)?;
        self.external_flags = loader.read_u8()?;
        let reserve = loader.read_u8()?;
        loader.skip(4)?;
        if reserve == 1 || self.external_flags != 0 {
            self.data_alignment_override = EXTERNAL_DATA_ALIGNMENT;
        }

        if relocation_table != 0 {
            self.relocation_table = Some(loader.load_relocation_table(u64::from(relocation_table))?);
        }
        Ok(())
    }

    /// An external string file: a dictionary of strings, then one ID per key at
    /// the external offset. The IDs are published through the string cache.
    fn load_external_strings(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let ids = loader.read_offset()?;
        let dict = loader.read_offset()?;
        let keys = loader.load_dict_keys_at(dict)?;
        let ids = loader.load_custom_at(ids, |l| {
            (0..keys.len()).map(|_| l.read_i64()).collect::<IResult<Vec<_>>>()
        })?;

        for (id, text) in ids.into_iter().zip(keys) {
            let id = id as u64;
            loader.strings_mut().insert(id, text.clone());
            self.external_strings.push(ExternalString { id, text });
        }
        debug!(count = self.external_strings.len(), "loaded external strings");
        Ok(())
    }

    fn load_cafe(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"FRES")?;
        self.version = Version::from_raw(loader.read_u32()?);
        self.byte_order = loader.read_byte_order()?;
        let _header_size = loader.read_u16()?;
        self.file_size = loader.read_u32()?;
        self.alignment = loader.read_u32()?;
        self.name = loader.load_string(None)?;
        self.string_pool_size = loader.read_u32()?;
        self.string_pool = loader.read_offset()?;

        self.models = loader.load_dict()?;
        self.textures = UnparsedSection::read_dict(loader)?;
        self.skeletal_anims = loader.load_dict()?;
        self.shader_param_anims = UnparsedSection::read_dict(loader)?;
        self.color_anims = UnparsedSection::read_dict(loader)?;
        self.tex_srt_anims = UnparsedSection::read_dict(loader)?;
        self.tex_pattern_anims = UnparsedSection::read_dict(loader)?;
        self.bone_visibility_anims = UnparsedSection::read_dict(loader)?;
        self.mat_visibility_anims = UnparsedSection::read_dict(loader)?;
        self.shape_anims = UnparsedSection::read_dict(loader)?;
        self.scene_anims = UnparsedSection::read_dict(loader)?;
        self.external_files = loader.load_dict()?;
        let _section_counts = loader.read_u16s(12)?;
        let _user_pointer = loader.read_u32()?;
        Ok(())
    }
}

impl ResData for ResFile {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.generation = loader.generation();
        match self.generation {
            Generation::Offset64 => self.load_switch(loader),
            Generation::Offset32 => self.load_cafe(loader),
        }
    }
}
