//! Animation curves shared by every animation section.
//!
//! A curve stores `num_key` frames plus `num_key` keys of
//! [`CurveType::elements_per_key`] elements each. The on-disk element types
//! are picked by the low bits of `flags` and kept as stored; interpolating
//! them is left to the caller.

use variantly::Variantly;

use crate::data::loader::{ResData, ResFileLoader};
use crate::data::parser_utils::{Decimal10x5, unpack_bit32_bools};
use crate::data::{FieldGate, Generation, Version};
use crate::error::{ErrorKind, IResult};
use crate::recognized::Recognized;

mod gates {
    use super::*;

    pub const DELTA: FieldGate = FieldGate::since(Version::new(3, 4, 0, 0));
}

const FRAME_TYPE_MASK: u16 = 0b11;
const KEY_TYPE_SHIFT: u16 = 2;
const CURVE_TYPE_SHIFT: u16 = 4;
const PRE_WRAP_SHIFT: u16 = 8;
const POST_WRAP_SHIFT: u16 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FrameType {
    Single,
    Decimal10x5,
    Byte,
}

impl FrameType {
    fn from_flags(flags: u16) -> IResult<Self> {
        match flags & FRAME_TYPE_MASK {
            0 => Ok(FrameType::Single),
            1 => Ok(FrameType::Decimal10x5),
            2 => Ok(FrameType::Byte),
            other => Err(ErrorKind::UnsupportedVariant {
                what: "curve frame type",
                value: u32::from(other),
            }
            .into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum KeyType {
    Single,
    Int16,
    SByte,
}

impl KeyType {
    fn from_flags(flags: u16) -> IResult<Self> {
        match (flags >> KEY_TYPE_SHIFT) & 0b11 {
            0 => Ok(KeyType::Single),
            1 => Ok(KeyType::Int16),
            2 => Ok(KeyType::SByte),
            other => Err(ErrorKind::UnsupportedVariant {
                what: "curve key type",
                value: u32::from(other),
            }
            .into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CurveType {
    Cubic,
    Linear,
    BakedFloat,
    StepInt,
    BakedInt,
    StepBool,
    BakedBool,
}

impl CurveType {
    pub fn from_flags(flags: u16) -> Recognized<CurveType, u8> {
        let raw = ((flags >> CURVE_TYPE_SHIFT) & 0b111) as u8;
        match raw {
            0 => Recognized::Known(CurveType::Cubic),
            1 => Recognized::Known(CurveType::Linear),
            2 => Recognized::Known(CurveType::BakedFloat),
            4 => Recognized::Known(CurveType::StepInt),
            5 => Recognized::Known(CurveType::BakedInt),
            6 => Recognized::Known(CurveType::StepBool),
            7 => Recognized::Known(CurveType::BakedBool),
            _ => Recognized::Unknown(raw),
        }
    }

    pub fn elements_per_key(self) -> usize {
        match self {
            CurveType::Cubic => 4,
            CurveType::Linear => 2,
            _ => 1,
        }
    }

    /// Curves whose 32-bit keys are integers rather than floats.
    fn has_integer_keys(self) -> bool {
        matches!(self, CurveType::StepInt | CurveType::StepBool)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WrapMode {
    Clamp,
    Repeat,
    Mirror,
}

impl WrapMode {
    fn from_bits(bits: u16) -> Recognized<WrapMode, u8> {
        match bits & 0b11 {
            0 => Recognized::Known(WrapMode::Clamp),
            1 => Recognized::Known(WrapMode::Repeat),
            2 => Recognized::Known(WrapMode::Mirror),
            other => Recognized::Unknown(other as u8),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CurveFrames {
    Single(Vec<f32>),
    Decimal10x5(Vec<Decimal10x5>),
    Byte(Vec<u8>),
}

impl Default for CurveFrames {
    fn default() -> Self {
        CurveFrames::Single(Vec::new())
    }
}

impl CurveFrames {
    pub fn len(&self) -> usize {
        match self {
            CurveFrames::Single(v) => v.len(),
            CurveFrames::Decimal10x5(v) => v.len(),
            CurveFrames::Byte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame numbers converted to floats.
    pub fn to_f32s(&self) -> Vec<f32> {
        match self {
            CurveFrames::Single(v) => v.clone(),
            CurveFrames::Decimal10x5(v) => v.iter().map(|d| d.to_f32()).collect(),
            CurveFrames::Byte(v) => v.iter().map(|&b| f32::from(b)).collect(),
        }
    }
}

/// Key elements in storage order, `elements_per_key` per key.
#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CurveKeys {
    Single(Vec<f32>),
    Integer(Vec<u32>),
    Int16(Vec<i16>),
    SByte(Vec<i8>),
}

impl Default for CurveKeys {
    fn default() -> Self {
        CurveKeys::Single(Vec::new())
    }
}

impl CurveKeys {
    pub fn len(&self) -> usize {
        match self {
            CurveKeys::Single(v) => v.len(),
            CurveKeys::Integer(v) => v.len(),
            CurveKeys::Int16(v) => v.len(),
            CurveKeys::SByte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` as a raw 32-bit word, the way step-bool curves pack their bits.
    fn word(&self, index: usize) -> Option<u32> {
        match self {
            CurveKeys::Single(v) => v.get(index).map(|f| f.to_bits()),
            CurveKeys::Integer(v) => v.get(index).copied(),
            CurveKeys::Int16(v) => v.get(index).map(|&i| i as u16 as u32),
            CurveKeys::SByte(v) => v.get(index).map(|&i| i as u8 as u32),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AnimCurve {
    pub flags: u16,
    pub num_key: u16,
    /// Byte offset into the animated structure this curve drives.
    pub anim_data_offset: u32,
    pub start_frame: f32,
    pub end_frame: f32,
    pub scale: f32,
    pub offset: f32,
    pub delta: f32,
    pub frames: CurveFrames,
    pub keys: CurveKeys,
    /// One flag per key; only filled for step-bool curves.
    pub step_bools: Vec<bool>,
}

impl AnimCurve {
    pub fn frame_type(&self) -> IResult<FrameType> {
        FrameType::from_flags(self.flags)
    }

    pub fn key_type(&self) -> IResult<KeyType> {
        KeyType::from_flags(self.flags)
    }

    pub fn curve_type(&self) -> Recognized<CurveType, u8> {
        CurveType::from_flags(self.flags)
    }

    pub fn pre_wrap(&self) -> Recognized<WrapMode, u8> {
        WrapMode::from_bits(self.flags >> PRE_WRAP_SHIFT)
    }

    pub fn post_wrap(&self) -> Recognized<WrapMode, u8> {
        WrapMode::from_bits(self.flags >> POST_WRAP_SHIFT)
    }

    pub fn elements_per_key(&self) -> usize {
        self.curve_type()
            .known()
            .map_or(1, |curve| curve.elements_per_key())
    }

    fn read_frames(&self, loader: &mut ResFileLoader<'_>) -> IResult<CurveFrames> {
        let count = usize::from(self.num_key);
        Ok(match self.frame_type()? {
            FrameType::Single => CurveFrames::Single(loader.read_f32s(count)?),
            FrameType::Decimal10x5 => CurveFrames::Decimal10x5(
                (0..count)
                    .map(|_| loader.read_decimal10x5())
                    .collect::<IResult<_>>()?,
            ),
            FrameType::Byte => CurveFrames::Byte(loader.read_bytes(count)?.to_vec()),
        })
    }

    fn read_keys(&self, loader: &mut ResFileLoader<'_>) -> IResult<CurveKeys> {
        let count = usize::from(self.num_key) * self.elements_per_key();
        let integer = self
            .curve_type()
            .known()
            .is_some_and(|curve| curve.has_integer_keys());
        Ok(match self.key_type()? {
            KeyType::Single if integer => CurveKeys::Integer(loader.read_u32s(count)?),
            KeyType::Single => CurveKeys::Single(loader.read_f32s(count)?),
            KeyType::Int16 => CurveKeys::Int16(loader.read_i16s(count)?),
            KeyType::SByte => CurveKeys::SByte(loader.read_i8s(count)?),
        })
    }

    fn unpack_step_bools(&mut self) {
        let stride = self.elements_per_key();
        let words: Vec<u32> = (0..usize::from(self.num_key))
            .map_while(|key| self.keys.word(key * stride))
            .collect();
        self.step_bools = unpack_bit32_bools(&words, usize::from(self.num_key));
    }
}

impl ResData for AnimCurve {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        let (frames, keys) = match loader.generation() {
            Generation::Offset64 => {
                let frames = loader.read_offset()?;
                let keys = loader.read_offset()?;
                self.flags = loader.read_u16()?;
                self.num_key = loader.read_u16()?;
                self.anim_data_offset = loader.read_u32()?;
                self.start_frame = loader.read_f32()?;
                self.end_frame = loader.read_f32()?;
                self.scale = loader.read_f32()?;
                self.offset = loader.read_f32()?;
                self.delta = loader.read_f32()?;
                loader.skip(4)?;
                (frames, keys)
            }
            Generation::Offset32 => {
                self.flags = loader.read_u16()?;
                self.num_key = loader.read_u16()?;
                self.anim_data_offset = loader.read_u32()?;
                self.start_frame = loader.read_f32()?;
                self.end_frame = loader.read_f32()?;
                self.scale = loader.read_f32()?;
                self.offset = loader.read_f32()?;
                if gates::DELTA.applies(loader.version()) {
                    self.delta = loader.read_f32()?;
                }
                (loader.read_offset()?, loader.read_offset()?)
            }
        };

        // Validate both encodings even when an array is absent.
        self.frame_type()?;
        self.key_type()?;

        self.frames = loader.load_custom_at(frames, |l| self.read_frames(l))?;
        self.keys = loader.load_custom_at(keys, |l| self.read_keys(l))?;
        if self.curve_type() == Recognized::Known(CurveType::StepBool) {
            self.unpack_step_bools();
        }
        Ok(())
    }
}
