use crate::Rc;
use crate::data::loader::{ResData, ResFileLoader};
use crate::data::parser_utils::{Vector3F, Vector4F};
use crate::data::res_dict::ResDict;
use crate::data::{FieldGate, Generation, Version};
use crate::error::IResult;
use crate::models::anim_curve::AnimCurve;
use crate::models::skeleton::{RotationMode, ScalingMode, Skeleton, rotation_mode, scaling_mode};
use crate::models::user_data::UserData;
use crate::recognized::Recognized;

mod gates {
    use super::*;

    /// 64-bit: a flags word replaces the block header; bone animations gain
    /// two reserved words.
    pub const FLAGS_FIRST: FieldGate = FieldGate::since(Version::new(0, 9, 0, 0));
    /// 32-bit: name, path and flags come first.
    pub const CAFE_NAMED_HEADER: FieldGate = FieldGate::since(Version::new(2, 4, 0, 0));
    /// 32-bit: frame and curve counts widen to 32 bits.
    pub const CAFE_WIDE_COUNTS: FieldGate = FieldGate::since(Version::new(3, 4, 0, 0));
}

const BAKED: u32 = 1 << 0;
const LOOPING: u32 = 1 << 2;

const BASE_SCALE: u32 = 1 << 3;
const BASE_ROTATE: u32 = 1 << 4;
const BASE_TRANSLATE: u32 = 1 << 5;
const BASE_MASK: u32 = BASE_SCALE | BASE_ROTATE | BASE_TRANSLATE;
const CURVE_MASK: u32 = 0x0000_FFC0;

/// Initial transform of an animated bone; components absent from the file
/// keep their identity values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoneAnimData {
    pub scale: Vector3F,
    pub rotate: Vector4F,
    pub translate: Vector3F,
}

impl Default for BoneAnimData {
    fn default() -> Self {
        BoneAnimData {
            scale: [1.0, 1.0, 1.0],
            rotate: [1.0, 0.0, 0.0, 0.0],
            translate: [0.0; 3],
        }
    }
}

impl BoneAnimData {
    fn read(loader: &mut ResFileLoader<'_>, flags: u32) -> IResult<Self> {
        let mut data = BoneAnimData::default();
        if flags & BASE_SCALE != 0 {
            data.scale = loader.read_vector3f()?;
        }
        if flags & BASE_ROTATE != 0 {
            data.rotate = loader.read_vector4f()?;
        }
        if flags & BASE_TRANSLATE != 0 {
            data.translate = loader.read_vector3f()?;
        }
        Ok(data)
    }
}

/// Animation of a single bone.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoneAnim {
    pub name: String,
    pub flags: u32,
    pub begin_rotate: u8,
    pub begin_translate: u8,
    pub begin_base_translate: u8,
    /// Index of this bone's first curve in the whole animation.
    pub begin_curve: i32,
    pub curves: Vec<AnimCurve>,
    pub base_data: BoneAnimData,
}

impl BoneAnim {
    /// Which base transform components are stored.
    pub fn base_flags(&self) -> u32 {
        self.flags & BASE_MASK
    }

    /// Which transform components are driven by curves.
    pub fn curve_flags(&self) -> u32 {
        self.flags & CURVE_MASK
    }
}

impl ResData for BoneAnim {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        match loader.generation() {
            Generation::Offset64 => {
                self.name = loader.load_string(None)?;
                let curves = loader.read_offset()?;
                let base = loader.read_offset()?;
                if gates::FLAGS_FIRST.applies(loader.version()) {
                    loader.skip(16)?;
                }
                self.flags = loader.read_u32()?;
                self.begin_rotate = loader.read_u8()?;
                self.begin_translate = loader.read_u8()?;
                let num_curve = loader.read_u8()?;
                self.begin_base_translate = loader.read_u8()?;
                self.begin_curve = loader.read_i32()?;
                loader.skip(4)?;

                let flags = self.flags;
                self.base_data = loader.load_custom_at(base, |l| BoneAnimData::read(l, flags))?;
                self.curves = loader.load_list_at(usize::from(num_curve), curves)?;
            }
            Generation::Offset32 => {
                self.flags = loader.read_u32()?;
                self.name = loader.load_string(None)?;
                self.begin_rotate = loader.read_u8()?;
                self.begin_translate = loader.read_u8()?;
                let num_curve = loader.read_u8()?;
                self.begin_base_translate = loader.read_u8()?;
                self.begin_curve = i32::from(loader.read_u8()?);
                loader.skip(3)?;

                let flags = self.flags;
                self.curves = loader.load_list(usize::from(num_curve))?;
                self.base_data = loader.load_custom(|l| BoneAnimData::read(l, flags))?;
            }
        }
        Ok(())
    }
}

/// `FSKA`: a skeletal animation.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SkeletalAnim {
    pub flags: u32,
    pub name: String,
    pub path: String,
    pub frame_count: i32,
    pub curve_count: i32,
    pub baked_size: u32,
    pub bind_skeleton: Rc<Skeleton>,
    pub bone_anims: Vec<BoneAnim>,
    /// Bone index in `bind_skeleton` for every bone animation.
    pub bind_indices: Vec<i16>,
    pub user_data: ResDict<Rc<UserData>>,
}

impl SkeletalAnim {
    pub fn is_baked(&self) -> bool {
        self.flags & BAKED != 0
    }

    pub fn is_looping(&self) -> bool {
        self.flags & LOOPING != 0
    }

    pub fn scaling_mode(&self) -> ScalingMode {
        scaling_mode(self.flags)
    }

    pub fn rotation_mode(&self) -> Recognized<RotationMode, u8> {
        rotation_mode(self.flags)
    }

    fn load_switch(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let flags_first = gates::FLAGS_FIRST.applies(loader.version());
        if flags_first {
            self.flags = loader.read_u32()?;
        } else {
            loader.load_header_block()?;
        }
        self.name = loader.load_string(None)?;
        self.path = loader.load_string(None)?;
        self.bind_skeleton = loader.load()?;
        let bind_indices = loader.read_offset()?;
        let bone_anims = loader.read_offset()?;
        self.user_data = loader.load_dict_values()?;
        if !flags_first {
            self.flags = loader.read_u32()?;
        }
        self.frame_count = loader.read_i32()?;
        self.curve_count = loader.read_i32()?;
        self.baked_size = loader.read_u32()?;
        let num_bone_anim = usize::from(loader.read_u16()?);
        let _num_user_data = loader.read_u16()?;
        if !flags_first {
            loader.skip(4)?;
        }

        self.bone_anims = loader.load_list_at(num_bone_anim, bone_anims)?;
        self.bind_indices = loader.load_custom_at(bind_indices, |l| l.read_i16s(num_bone_anim))?;
        Ok(())
    }

    fn load_cafe(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let version = loader.version();
        let num_bone_anim;
        if gates::CAFE_NAMED_HEADER.applies(version) {
            self.name = loader.load_string(None)?;
            self.path = loader.load_string(None)?;
            self.flags = loader.read_u32()?;
            if gates::CAFE_WIDE_COUNTS.applies(version) {
                self.frame_count = loader.read_i32()?;
                num_bone_anim = usize::from(loader.read_u16()?);
                let _num_user_data = loader.read_u16()?;
                self.curve_count = loader.read_i32()?;
                self.baked_size = loader.read_u32()?;
            } else {
                self.frame_count = i32::from(loader.read_u16()?);
                num_bone_anim = usize::from(loader.read_u16()?);
                let _num_user_data = loader.read_u16()?;
                self.curve_count = i32::from(loader.read_u16()?);
                self.baked_size = loader.read_u32()?;
                loader.skip(4)?;
            }
        } else {
            self.flags = loader.read_u32()?;
            self.frame_count = i32::from(loader.read_u16()?);
            num_bone_anim = usize::from(loader.read_u16()?);
            let _num_user_data = loader.read_u16()?;
            self.curve_count = i32::from(loader.read_u16()?);
            self.name = loader.load_string(None)?;
            self.path = loader.load_string(None)?;
        }

        self.bone_anims = loader.load_list(num_bone_anim)?;
        self.bind_skeleton = loader.load()?;
        self.bind_indices = loader.load_custom(|l| l.read_i16s(num_bone_anim))?;
        if gates::CAFE_NAMED_HEADER.applies(version) {
            self.user_data = loader.load_dict()?;
        }
        Ok(())
    }
}

impl ResData for SkeletalAnim {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        loader.check_signature(b"FSKA")?;
        match loader.generation() {
            Generation::Offset64 => self.load_switch(loader),
            Generation::Offset32 => self.load_cafe(loader),
        }
    }
}

#[cfg(test)]
mod test {
    use winnow::binary::Endianness;

    use super::*;
    use crate::data::loader::LoaderOptions;
    use crate::data::writer::BinaryWriter;
    use crate::data::writer::fixtures::write_res_string;

    fn loader_for(data: &[u8], generation: Generation, version: Version) -> ResFileLoader<'_> {
        ResFileLoader::from_parts(
            data,
            generation,
            generation.default_endian(),
            version,
            LoaderOptions::default(),
        )
    }

    #[test]
    fn switch_animation_with_one_bone() {
        let g = Generation::Offset64;
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_bytes(b"FSKA");
        w.write_u32(LOOPING | 2 << 8);
        let name = w.reserve_offset(g);
        w.write_u64(0);
        w.write_u64(0);
        let bind = w.reserve_offset(g);
        let bones = w.reserve_offset(g);
        w.write_u64(0);
        w.write_u64(0);
        w.write_i32(60);
        w.write_i32(0);
        w.write_u32(0);
        w.write_u16(1);
        w.write_u16(0);
        assert_eq!(w.position(), 80);

        // Bone animation with a base rotation only and no curves.
        w.satisfy_offset_here(bones);
        let bone_name = w.reserve_offset(g);
        w.write_u64(0);
        let base = w.reserve_offset(g);
        w.write_bytes(&[0; 16]);
        w.write_u32(BASE_ROTATE);
        w.write_bytes(&[1, 2, 0, 3]);
        w.write_i32(5);
        w.write_i32(0);

        w.satisfy_offset_here(base);
        for v in [0.0f32, 0.0, 0.0, 1.0] {
            w.write_f32(v);
        }
        w.satisfy_offset_here(bind);
        w.write_i16(4);
        w.satisfy_offset_here(name);
        write_res_string(&mut w, g, "idle");
        w.align(2);
        w.satisfy_offset_here(bone_name);
        write_res_string(&mut w, g, "spine");
        let data = w.into_inner();

        let mut loader = loader_for(&data, g, Version::new(0, 9, 0, 0));
        let anim = loader.load_inline::<SkeletalAnim>().unwrap();
        assert_eq!(loader.position(), 80);
        assert_eq!(anim.name, "idle");
        assert!(anim.is_looping());
        assert!(!anim.is_baked());
        assert_eq!(anim.scaling_mode(), ScalingMode::Maya);
        assert_eq!(anim.frame_count, 60);
        assert_eq!(anim.bind_indices, [4]);
        assert!(anim.bind_skeleton.bones.is_empty());

        let bone = &anim.bone_anims[0];
        assert_eq!(bone.name, "spine");
        assert_eq!(bone.begin_rotate, 1);
        assert_eq!(bone.begin_base_translate, 3);
        assert_eq!(bone.begin_curve, 5);
        assert_eq!(bone.base_flags(), BASE_ROTATE);
        assert_eq!(bone.base_data.rotate, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(bone.base_data.scale, [1.0, 1.0, 1.0]);
        assert!(bone.curves.is_empty());
    }

    #[test]
    fn cafe_bone_anim_reads_curves() {
        let g = Generation::Offset32;
        let mut w = BinaryWriter::new(Endianness::Big);
        w.write_u32(BASE_TRANSLATE | 1 << 13);
        let name = w.reserve_offset(g);
        w.write_bytes(&[0, 0, 1, 0, 2, 0, 0, 0]);
        let curves = w.reserve_offset(g);
        let base = w.reserve_offset(g);
        assert_eq!(w.position(), 24);

        w.satisfy_offset_here(curves);
        // Baked float curve with one Single frame and key.
        w.write_u16(2 << 4);
        w.write_u16(1);
        w.write_u32(0x24);
        for v in [0.0f32, 0.0, 1.0, 0.0, 0.0] {
            w.write_f32(v);
        }
        let frames = w.reserve_offset(g);
        let keys = w.reserve_offset(g);
        w.satisfy_offset_here(frames);
        w.write_f32(0.0);
        w.satisfy_offset_here(keys);
        w.write_f32(3.5);

        w.satisfy_offset_here(base);
        for v in [1.0f32, 2.0, 3.0] {
            w.write_f32(v);
        }
        w.satisfy_offset_here(name);
        write_res_string(&mut w, g, "hip");
        let data = w.into_inner();

        let mut loader = loader_for(&data, g, Version::new(3, 4, 0, 0));
        let bone = loader.load_inline::<BoneAnim>().unwrap();
        assert_eq!(loader.position(), 24);
        assert_eq!(bone.name, "hip");
        assert_eq!(bone.begin_curve, 2);
        assert_eq!(bone.curve_flags(), 1 << 13);
        assert_eq!(bone.curves.len(), 1);
        assert_eq!(bone.curves[0].keys.single_ref().unwrap(), &[3.5]);
        assert_eq!(bone.base_data.translate, [1.0, 2.0, 3.0]);
        assert_eq!(bone.base_data.rotate, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn cafe_header_before_2_4() {
        let g = Generation::Offset32;
        let mut w = BinaryWriter::new(Endianness::Big);
        w.write_bytes(b"FSKA");
        w.write_u32(BAKED);
        w.write_u16(12);
        w.write_u16(0);
        w.write_u16(0);
        w.write_u16(3);
        let name = w.reserve_offset(g);
        for _ in 0..4 {
            w.write_u32(0);
        }
        w.satisfy_offset_here(name);
        write_res_string(&mut w, g, "old");
        let data = w.into_inner();

        let mut loader = loader_for(&data, g, Version::new(2, 3, 0, 0));
        let anim = loader.load_inline::<SkeletalAnim>().unwrap();
        assert_eq!(loader.position(), 36);
        assert_eq!(anim.name, "old");
        assert_eq!(anim.frame_count, 12);
        assert_eq!(anim.curve_count, 3);
        assert!(anim.is_baked());
        assert!(anim.bone_anims.is_empty());
    }
}
