use variantly::Variantly;

use crate::data::cursor::TextEncoding;
use crate::data::loader::{ResData, ResFileLoader};
use crate::data::{FieldGate, Generation, Version};
use crate::error::{ErrorKind, IResult};

/// Version-dependent layout of the 64-bit user data header.
mod gates {
    use super::*;

    /// The earliest 64-bit files keep 8 reserved bytes and a `u32` type before the payload.
    pub const LEGACY_HEADER: FieldGate = FieldGate::before(Version::new(0, 1, 0, 0));
}

#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum UserDataValue {
    Int32(Vec<i32>),
    Single(Vec<f32>),
    /// Strings stored in the archive's default encoding.
    String(Vec<String>),
    /// UTF-16 strings.
    WString(Vec<String>),
    Byte(Vec<i8>),
}

impl Default for UserDataValue {
    fn default() -> Self {
        UserDataValue::Int32(Vec::new())
    }
}

impl UserDataValue {
    /// On-disk type tag.
    pub fn type_id(&self) -> u8 {
        match self {
            UserDataValue::Int32(_) => 0,
            UserDataValue::Single(_) => 1,
            UserDataValue::String(_) => 2,
            UserDataValue::WString(_) => 3,
            UserDataValue::Byte(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UserDataValue::Int32(v) => v.len(),
            UserDataValue::Single(v) => v.len(),
            UserDataValue::String(v) | UserDataValue::WString(v) => v.len(),
            UserDataValue::Byte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `count` values of type `tag` at the loader's position.
    fn read(loader: &mut ResFileLoader<'_>, tag: u32, count: usize) -> IResult<Self> {
        Ok(match tag {
            0 => UserDataValue::Int32(loader.read_i32s(count)?),
            1 => UserDataValue::Single(loader.read_f32s(count)?),
            2 => UserDataValue::String(loader.load_strings(count, None)?),
            3 => UserDataValue::WString(loader.load_strings(count, Some(TextEncoding::Utf16))?),
            4 => UserDataValue::Byte(loader.read_i8s(count)?),
            other => {
                return Err(ErrorKind::UnsupportedVariant {
                    what: "user data type",
                    value: other,
                }
                .into());
            }
        })
    }
}

/// A named array of custom values attached to many sections.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UserData {
    pub name: String,
    pub value: UserDataValue,
}

impl ResData for UserData {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        self.name = loader.load_string(None)?;
        match loader.generation() {
            Generation::Offset64 => {
                let data = loader.read_offset()?;
                let (count, tag) = if gates::LEGACY_HEADER.applies(loader.version()) {
                    loader.skip(8)?;
                    let count = loader.read_u32()?;
                    (count, loader.read_u32()?)
                } else {
                    let count = loader.read_u32()?;
                    let tag = u32::from(loader.read_u8()?);
                    loader.skip(43)?;
                    (count, tag)
                };
                if data.is_none() {
                    // Still reject unknown tags for empty payloads.
                    Self::check_tag(tag)?;
                }
                self.value = loader.load_custom_at(data, |l| {
                    UserDataValue::read(l, tag, count as usize)
                })?;
            }
            Generation::Offset32 => {
                let count = loader.read_u16()?;
                let tag = u32::from(loader.read_u8()?);
                loader.skip(1)?;
                self.value = UserDataValue::read(loader, tag, usize::from(count))?;
            }
        }
        Ok(())
    }
}

impl UserData {
    fn check_tag(tag: u32) -> IResult<()> {
        if tag > 4 {
            return Err(ErrorKind::UnsupportedVariant {
                what: "user data type",
                value: tag,
            }
            .into());
        }
        Ok(())
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

    fn write_switch_entry(tag: u8, payload: impl FnOnce(&mut BinaryWriter)) -> Vec<u8> {
        let g = Generation::Offset64;
        let mut w = BinaryWriter::new(Endianness::Little);
        let name = w.reserve_offset(g);
        let data = w.reserve_offset(g);
        w.write_u32(2);
        w.write_u8(tag);
        w.write_bytes(&[0; 43]);
        w.align(8);
        w.satisfy_offset_here(data);
        payload(&mut w);
        w.align(2);
        w.satisfy_offset_here(name);
        write_res_string(&mut w, g, "scale");
        w.into_inner()
    }

    #[test]
    fn switch_float_values() {
        let data = write_switch_entry(1, |w| {
            w.write_f32(0.5);
            w.write_f32(2.0);
        });
        let mut loader = loader_for(&data, Generation::Offset64, Version::new(0, 8, 0, 0));
        let user = loader.load_inline::<UserData>().unwrap();
        assert_eq!(user.name, "scale");
        assert_eq!(user.value, UserDataValue::Single(vec![0.5, 2.0]));
        assert_eq!(user.value.type_id(), 1);
        assert_eq!(loader.position(), 0x40);
    }

    #[test]
    fn switch_string_values() {
        let g = Generation::Offset64;
        let data = write_switch_entry(2, |w| {
            let first = w.reserve_offset(g);
            let second = w.reserve_offset(g);
            w.satisfy_offset_here(first);
            write_res_string(w, g, "on");
            w.align(2);
            w.satisfy_offset_here(second);
            write_res_string(w, g, "off");
        });
        let mut loader = loader_for(&data, g, Version::new(0, 8, 0, 0));
        let user = loader.load_inline::<UserData>().unwrap();
        assert_eq!(user.value.string_ref().unwrap(), &["on", "off"]);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let data = write_switch_entry(9, |_| {});
        let mut loader = loader_for(&data, Generation::Offset64, Version::new(0, 8, 0, 0));
        let err = loader.load_inline::<UserData>().unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::UnsupportedVariant {
                what: "user data type",
                value: 9
            }
        ));
        assert_eq!(err.record.unwrap().name, "UserData");
    }

    #[test]
    fn cafe_values_are_inline() {
        let g = Generation::Offset32;
        let mut w = BinaryWriter::new(Endianness::Big);
        let name = w.reserve_offset(g);
        w.write_u16(3);
        w.write_u8(4);
        w.write_u8(0);
        w.write_i8(-1);
        w.write_i8(0);
        w.write_i8(1);
        w.satisfy_offset_here(name);
        write_res_string(&mut w, g, "tags");
        let data = w.into_inner();

        let mut loader = loader_for(&data, g, Version::new(3, 4, 0, 0));
        let user = loader.load_inline::<UserData>().unwrap();
        assert_eq!(user.name, "tags");
        assert_eq!(user.value.byte_ref().unwrap(), &[-1, 0, 1]);
        assert_eq!(loader.position(), 11);
    }
}
