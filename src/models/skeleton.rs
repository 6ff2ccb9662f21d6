use crate::Rc;
use crate::data::loader::{ResData, ResFileLoader};
use crate::data::parser_utils::{Matrix3x4, Vector3F, Vector4F};
use crate::data::res_dict::ResDict;
use crate::data::{FieldGate, Generation, Version};
use crate::error::IResult;
use crate::models::user_data::UserData;
use crate::recognized::Recognized;

/// Version-dependent fields of `FSKL` and its bones.
mod gates {
    use super::*;

    /// 64-bit: a flags word replaces the block header, and the bone and skeleton
    /// flags move in front of the offsets.
    pub const FLAGS_FIRST: FieldGate = FieldGate::since(Version::new(0, 9, 0, 0));
    /// 64-bit: reserved bytes in front of the user pointer.
    pub const WIDE_RESERVED: FieldGate = FieldGate::between(Version::new(0, 8, 0, 0), Version::new(0, 9, 0, 0));
    /// 64-bit: reserved bytes after a bone's user data, 16 wide until 0.10.
    pub const BONE_WIDE_RESERVED: FieldGate =
        FieldGate::between(Version::new(0, 8, 0, 0), Version::new(0, 10, 0, 0));
    pub const BONE_NARROW_RESERVED: FieldGate = FieldGate::since(Version::new(0, 10, 0, 0));
    /// 32-bit: inverse model matrices live in the skeleton rather than in each bone.
    pub const SKELETON_INVERSE_MATRICES: FieldGate = FieldGate::since(Version::new(3, 4, 0, 0));
}

const SCALING_SHIFT: u32 = 8;
const ROTATION_SHIFT: u32 = 12;
const BILLBOARD_SHIFT: u32 = 16;
const BONE_VISIBLE: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ScalingMode {
    None,
    Standard,
    Maya,
    Softimage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RotationMode {
    Quaternion,
    EulerXyz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum BillboardMode {
    None,
    Child,
    WorldViewVector,
    WorldViewPoint,
    ScreenViewVector,
    ScreenViewPoint,
    YAxisViewVector,
    YAxisViewPoint,
}

pub(crate) fn scaling_mode(flags: u32) -> ScalingMode {
    match (flags >> SCALING_SHIFT) & 0b11 {
        0 => ScalingMode::None,
        1 => ScalingMode::Standard,
        2 => ScalingMode::Maya,
        _ => ScalingMode::Softimage,
    }
}

pub(crate) fn rotation_mode(flags: u32) -> Recognized<RotationMode, u8> {
    match (flags >> ROTATION_SHIFT) & 0b111 {
        0 => Recognized::Known(RotationMode::Quaternion),
        1 => Recognized::Known(RotationMode::EulerXyz),
        other => Recognized::Unknown(other as u8),
    }
}

/// A single joint: its bind transform, matrix palette indices and user data.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bone {
    pub name: String,
    pub index: u16,
    pub parent_index: i16,
    pub smooth_matrix_index: i16,
    pub rigid_matrix_index: i16,
    pub billboard_index: i16,
    pub flags: u32,
    pub scale: Vector3F,
    pub rotation: Vector4F,
    pub position: Vector3F,
    pub user_data: ResDict<Rc<UserData>>,
    /// Only stored per bone by 32-bit files older than 3.4.
    pub inverse_matrix: Option<Matrix3x4>,
}

impl Default for Bone {
    fn default() -> Self {
        Bone {
            name: String::new(),
            index: 0,
            parent_index: -1,
            smooth_matrix_index: -1,
            rigid_matrix_index: -1,
            billboard_index: -1,
            flags: BONE_VISIBLE,
            scale: [1.0, 1.0, 1.0],
            rotation: [0.0; 4],
            position: [0.0; 3],
            user_data: ResDict::new(),
            inverse_matrix: None,
        }
    }
}

impl Bone {
    pub fn is_visible(&self) -> bool {
        self.flags & BONE_VISIBLE != 0
    }

    pub fn rotation_mode(&self) -> Recognized<RotationMode, u8> {
        rotation_mode(self.flags)
    }

    pub fn billboard(&self) -> BillboardMode {
        match (self.flags >> BILLBOARD_SHIFT) & 0b111 {
            0 => BillboardMode::None,
            1 => BillboardMode::Child,
            2 => BillboardMode::WorldViewVector,
            3 => BillboardMode::WorldViewPoint,
            4 => BillboardMode::ScreenViewVector,
            5 => BillboardMode::ScreenViewPoint,
            6 => BillboardMode::YAxisViewVector,
            _ => BillboardMode::YAxisViewPoint,
        }
    }

    fn read_indices(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.parent_index = loader.read_i16()?;
        self.smooth_matrix_index = loader.read_i16()?;
        self.rigid_matrix_index = loader.read_i16()?;
        self.billboard_index = loader.read_i16()?;
        let _num_user_data = loader.read_u16()?;
        self.flags = loader.read_u32()?;
        Ok(())
    }

    fn read_transform(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.scale = loader.read_vector3f()?;
        self.rotation = loader.read_vector4f()?;
        self.position = loader.read_vector3f()?;
        Ok(())
    }
}

impl ResData for Bone {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.name = loader.load_string(None)?;
        match loader.generation() {
            Generation::Offset64 => {
                self.user_data = loader.load_dict_values()?;
                let version = loader.version();
                if gates::BONE_NARROW_RESERVED.applies(version) {
                    loader.skip(8)?;
                } else if gates::BONE_WIDE_RESERVED.applies(version) {
                    loader.skip(16)?;
                }
                self.index = loader.read_i16()? as u16;
                self.read_indices(loader)?;
                self.read_transform(loader)?;
            }
            Generation::Offset32 => {
                self.index = loader.read_u16()?;
                self.read_indices(loader)?;
                self.read_transform(loader)?;
                self.user_data = loader.load_dict()?;
                if !gates::SKELETON_INVERSE_MATRICES.applies(loader.version()) {
                    self.inverse_matrix = Some(loader.read_matrix3x4()?);
                }
            }
        }
        Ok(())
    }
}

/// `FSKL`: the bone hierarchy of a model and its skinning matrix palette.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Skeleton {
    pub flags: u32,
    pub num_smooth_matrices: u16,
    pub num_rigid_matrices: u16,
    pub bones: ResDict<Rc<Bone>>,
    /// Bone index for every smooth matrix, then every rigid matrix.
    pub matrix_to_bone: Vec<u16>,
    /// One inverse bind matrix per smooth matrix.
    pub inverse_model_matrices: Vec<Matrix3x4>,
    pub user_indices: Vec<u16>,
}

impl Skeleton {
    pub fn scaling_mode(&self) -> ScalingMode {
        scaling_mode(self.flags)
    }

    pub fn rotation_mode(&self) -> Recognized<RotationMode, u8> {
        rotation_mode(self.flags)
    }

    /// Smooth matrix indices of every bone that has one, in bone order.
    pub fn smooth_indices(&self) -> Vec<i16> {
        self.bones
            .values()
            .map(|bone| bone.smooth_matrix_index)
            .filter(|&index| index >= 0)
            .collect()
    }

    /// Rigid matrix indices of every bone that has one, in bone order.
    pub fn rigid_indices(&self) -> Vec<i16> {
        self.bones
            .values()
            .map(|bone| bone.rigid_matrix_index)
            .filter(|&index| index >= 0)
            .collect()
    }

    fn load_switch(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let version = loader.version();
        let flags_first = gates::FLAGS_FIRST.applies(version);
        if flags_first {
            self.flags = loader.read_u32()?;
        } else {
            loader.load_header_block()?;
        }

        let dict = loader.read_offset()?;
        let values = loader.read_offset()?;
        self.bones = loader.load_dict_values_at(dict, values)?;
        let matrix_to_bone = loader.read_offset()?;
        let inverse_matrices = loader.read_offset()?;
        if gates::WIDE_RESERVED.applies(version) {
            loader.skip(16)?;
        } else if flags_first {
            loader.skip(8)?;
        }
        let user_pointer = loader.read_offset()?;
        if !flags_first {
            self.flags = loader.read_u32()?;
        }
        let num_bone = usize::from(loader.read_u16()?);
        self.num_smooth_matrices = loader.read_u16()?;
        self.num_rigid_matrices = loader.read_u16()?;
        loader.skip(6)?;

        let smooth = usize::from(self.num_smooth_matrices);
        let palette = smooth + usize::from(self.num_rigid_matrices);
        self.user_indices = loader.load_custom_at(user_pointer, |l| l.read_u16s(num_bone))?;
        self.matrix_to_bone = loader.load_custom_at(matrix_to_bone, |l| l.read_u16s(palette))?;
        self.inverse_model_matrices =
            loader.load_custom_at(inverse_matrices, |l| l.read_matrix3x4s(smooth))?;
        Ok(())
    }

    fn load_cafe(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.flags = loader.read_u32()?;
        let _num_bone = loader.read_u16()?;
        self.num_smooth_matrices = loader.read_u16()?;
        self.num_rigid_matrices = loader.read_u16()?;
        loader.skip(2)?;
        self.bones = loader.load_dict()?;
        // The flat bone list duplicates the dictionary values.
        let _bone_list = loader.read_offset()?;

        let smooth = usize::from(self.num_smooth_matrices);
        let palette = smooth + usize::from(self.num_rigid_matrices);
        self.matrix_to_bone = loader.load_custom(|l| l.read_u16s(palette))?;
        if gates::SKELETON_INVERSE_MATRICES.applies(loader.version()) {
            self.inverse_model_matrices = loader.load_custom(|l| l.read_matrix3x4s(smooth))?;
        }
        let _user_pointer = loader.read_u32()?;
        Ok(())
    }
}

impl ResData for Skeleton {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"FSKL")?;
        match loader.generation() {
            Generation::Offset64 => self.load_switch(loader),
            Generation::Offset32 => self.load_cafe(loader),
        }
    }
}
