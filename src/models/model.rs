use crate::Rc;
use crate::data::loader::{ResData, ResFileLoader};
use crate::data::res_dict::ResDict;
use crate::data::{FieldGate, Generation, Version};
use crate::error::IResult;
use crate::models::section::UnparsedSection;
use crate::models::skeleton::Skeleton;
use crate::models::user_data::UserData;

mod gates {
    use super::*;

    /// 64-bit: a flags word replaces the block header.
    pub const FLAGS: FieldGate = FieldGate::since(Version::new(0, 9, 0, 0));
    /// 64-bit: an extra offset sits between the material values and dictionary.
    pub const MATERIAL_SPLIT_OFFSET: FieldGate =
        FieldGate::between(Version::new(0, 9, 0, 0), Version::new(0, 10, 0, 0));
    pub const SHADER_ASSIGN: FieldGate = FieldGate::since(Version::new(0, 10, 0, 0));
    pub const CAFE_USER_POINTER: FieldGate = FieldGate::since(Version::new(3, 3, 0, 0));
}

/// `FMDL`: a model with its skeleton, shapes, materials and vertex buffers.
///
/// Shapes, materials and vertex buffers are kept as raw sections.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Model {
    pub flags: u32,
    pub name: String,
    pub path: String,
    pub skeleton: Rc<Skeleton>,
    pub vertex_buffers: Option<u64>,
    pub num_vertex_buffer: u16,
    pub shapes: UnparsedSection,
    pub materials: UnparsedSection,
    pub shader_assign: Option<u64>,
    pub user_data: ResDict<Rc<UserData>>,
    /// Only stored by 64-bit files before 0.9 and by 32-bit files.
    pub total_vertex_count: u32,
}

impl Model {
    fn load_switch(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let version = loader.version();
        let flags_first = gates::FLAGS.applies(version);
        if flags_first {
            self.flags = loader.read_u32()?;
        } else {
            loader.load_header_block()?;
        }
        self.name = loader.load_string(None)?;
        self.path = loader.load_string(None)?;
        self.skeleton = loader.load()?;
        self.vertex_buffers = loader.read_offset()?;
        self.shapes = UnparsedSection::read_split(loader)?;
        if gates::MATERIAL_SPLIT_OFFSET.applies(version) {
            let values = loader.read_offset()?;
            let fallback = loader.read_offset()?;
            let dict = loader.read_offset()?;
            self.materials = UnparsedSection::from_offsets(loader, dict.or(fallback), values)?;
        } else {
            self.materials = UnparsedSection::read_split(loader)?;
            if gates::SHADER_ASSIGN.applies(version) {
                self.shader_assign = loader.read_offset()?;
            }
        }
        self.user_data = loader.load_dict_values()?;
        let _user_pointer = loader.read_offset()?;
        self.num_vertex_buffer = loader.read_u16()?;
        let _num_shape = loader.read_u16()?;
        let _num_material = loader.read_u16()?;
        if flags_first {
            let _num_shader_assign = loader.read_u16()?;
            let _num_user_data = loader.read_u16()?;
            loader.skip(2 + 4)?;
        } else {
            let _num_user_data = loader.read_u16()?;
            self.total_vertex_count = loader.read_u32()?;
            loader.skip(4)?;
        }
        Ok(())
    }

    fn load_cafe(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.name = loader.load_string(None)?;
        self.path = loader.load_string(None)?;
        self.skeleton = loader.load()?;
        self.vertex_buffers = loader.read_offset()?;
        self.shapes = UnparsedSection::read_dict(loader)?;
        self.materials = UnparsedSection::read_dict(loader)?;
        self.user_data = loader.load_dict()?;
        self.num_vertex_buffer = loader.read_u16()?;
        let _num_shape = loader.read_u16()?;
        let _num_material = loader.read_u16()?;
        let _num_user_data = loader.read_u16()?;
        self.total_vertex_count = loader.read_u32()?;
        if gates::CAFE_USER_POINTER.applies(loader.version()) {
            let _user_pointer = loader.read_u32()?;
        }
        Ok(())
    }
}

impl ResData for Model {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"FMDL")?;
        match loader.generation() {
            Generation::Offset64 => self.load_switch(loader),
            Generation::Offset32 => self.load_cafe(loader),
        }
    }
}
