//! Loading sessions: turns a byte buffer into a graph of shared records.
//!
//! A [`ResFileLoader`] owns the cursor, the generation and version detected
//! from the header, the identity cache that makes every `(offset, type)` pair
//! load exactly once, and the per-session [`StringCache`].

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use bon::Builder;
use tracing::{debug, trace, warn};
use winnow::binary::Endianness;

use crate::Rc;
use crate::data::cursor::{BinaryCursor, TextEncoding};
use crate::data::parser_utils::resolve_relative_offset;
use crate::data::relocation::RelocationTable;
use crate::data::res_dict::{DictNode, ResDict, read_raw_nodes};
use crate::data::string_table::StringCache;
use crate::data::{ByteOrder, Generation, Version};
use crate::error::{ErrorKind, IResult};

/// Implemented by every record shape: populate `self` from a loader that is
/// positioned at the record's first byte.
///
/// `load` must consume exactly the record's inline bytes; anything reached
/// through an offset is read under a scoped seek.
pub trait ResData: Default + 'static {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()>;
}

/// What to do when a block signature does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Fail with [`ErrorKind::SignatureMismatch`].
    #[default]
    Strict,
    /// Log the mismatch and keep going.
    Warn,
}

#[derive(Debug, Clone, Builder)]
pub struct LoaderOptions {
    #[builder(default)]
    pub signature_policy: SignaturePolicy,
    /// Encoding used when a string read does not name one.
    #[builder(default)]
    pub text_encoding: TextEncoding,
    /// Remember every decoded string by offset and reuse it.
    #[builder(default = true)]
    pub intern_strings: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions::builder().build()
    }
}

/// A 64-bit block header: offset to the next block and this block's size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderBlock {
    pub offset: u32,
    pub size: u64,
}

type InstanceKey = (u64, TypeId);

pub struct ResFileLoader<'a> {
    cursor: BinaryCursor<'a>,
    generation: Generation,
    version: Version,
    byte_order: ByteOrder,
    options: LoaderOptions,
    /// Holds an `Rc<T>` for every `(offset, TypeId::of::<T>())` loaded so far.
    instances: HashMap<InstanceKey, Box<dyn Any>>,
    loading: HashSet<InstanceKey>,
    strings: StringCache,
}

impl<'a> Deref for ResFileLoader<'a> {
    type Target = BinaryCursor<'a>;

    fn deref(&self) -> &Self::Target {
        &self.cursor
    }
}

impl DerefMut for ResFileLoader<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cursor
    }
}

/// Short type name used to attribute errors to a record shape.
fn record_name<T: 'static>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn mark_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl<'a> ResFileLoader<'a> {
    pub fn new(data: &'a [u8]) -> IResult<Self> {
        Self::with_options(data, LoaderOptions::default())
    }

    /// Detect the generation, byte order and version from the file header.
    pub fn with_options(data: &'a [u8], options: LoaderOptions) -> IResult<Self> {
        let generation = Generation::detect(data)?;
        let mut cursor = BinaryCursor::new(data, Endianness::Big);
        let mark = cursor.temporary_seek(generation.byte_order_position(), |c| c.read_u16())?;
        let byte_order = ByteOrder::from_mark(mark)?;
        cursor.set_endian(byte_order.endian());
        let version = Version::from_raw(
            cursor.temporary_seek(generation.version_position(), |c| c.read_u32())?,
        );

        debug!(?generation, %version, ?byte_order, len = data.len(), "opened archive");

        let mut loader = Self::from_parts(data, generation, byte_order.endian(), version, options);
        loader.byte_order = byte_order;
        Ok(loader)
    }

    /// Build a session without looking at any header.
    pub fn from_parts(
        data: &'a [u8],
        generation: Generation,
        endian: Endianness,
        version: Version,
        options: LoaderOptions,
    ) -> Self {
        let byte_order = match endian {
            Endianness::Little => ByteOrder::Little,
            Endianness::Big => ByteOrder::Big,
            Endianness::Native if cfg!(target_endian = "little") => ByteOrder::Little,
            Endianness::Native => ByteOrder::Big,
        };
        Self {
            cursor: BinaryCursor::new(data, endian),
            generation,
            version,
            byte_order,
            options,
            instances: HashMap::new(),
            loading: HashSet::new(),
            strings: StringCache::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn strings(&self) -> &StringCache {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringCache {
        &mut self.strings
    }

    /// Number of distinct `(offset, type)` instances loaded so far.
    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }

    /// Run `f` with the loader moved to `pos`, restoring the position afterwards
    /// on every path.
    pub fn temporary_seek<R>(
        &mut self,
        pos: u64,
        f: impl FnOnce(&mut Self) -> IResult<R>,
    ) -> IResult<R> {
        let saved = self.cursor.position();
        self.cursor.seek(pos)?;
        let result = f(self);
        // `saved` was a valid position a moment ago.
        let _ = self.cursor.seek(saved);
        result
    }

    /// Like [`ResFileLoader::temporary_seek`], for a position reached through an
    /// offset field. Nothing can start at the end of the buffer, so `offset`
    /// must lie strictly inside it.
    fn follow_offset<R>(
        &mut self,
        offset: u64,
        f: impl FnOnce(&mut Self) -> IResult<R>,
    ) -> IResult<R> {
        let len = self.cursor.len();
        if !usize::try_from(offset).is_ok_and(|pos| pos < len) {
            return Err(ErrorKind::OffsetOutOfRange { offset, len }.into());
        }
        self.temporary_seek(offset, f)
    }

    /// Read an offset field and resolve it to an absolute position; `None` for null.
    pub fn read_offset(&mut self) -> IResult<Option<u64>> {
        match self.generation {
            Generation::Offset32 => {
                let field_start = self.position();
                let raw = self.read_u32()?;
                Ok((raw != 0).then(|| resolve_relative_offset(field_start, raw)))
            }
            Generation::Offset64 => {
                let raw = self.read_u64()?;
                Ok((raw != 0).then_some(raw))
            }
        }
    }

    pub fn read_offsets(&mut self, count: usize) -> IResult<Vec<Option<u64>>> {
        (0..count).map(|_| self.read_offset()).collect()
    }

    /// Read a byte-order mark (always stored big-endian) and switch to it.
    pub fn read_byte_order(&mut self) -> IResult<ByteOrder> {
        let previous = self.endian();
        self.set_endian(Endianness::Big);
        let mark = self.read_u16();
        let order = mark.and_then(ByteOrder::from_mark);
        match order {
            Ok(order) => {
                self.set_endian(order.endian());
                self.byte_order = order;
                Ok(order)
            }
            Err(e) => {
                self.set_endian(previous);
                Err(e)
            }
        }
    }

    /// Read a 4-byte block signature and compare it with `expected`.
    pub fn check_signature(&mut self, expected: &[u8; 4]) -> IResult<()> {
        let offset = self.position();
        let found = self.read_bytes(4)?;
        if found == expected {
            return Ok(());
        }
        match self.options.signature_policy {
            SignaturePolicy::Strict => Err(ErrorKind::SignatureMismatch {
                offset,
                expected: mark_name(expected),
                found: mark_name(found),
            }
            .into()),
            SignaturePolicy::Warn => {
                warn!(
                    offset,
                    expected = %mark_name(expected),
                    found = %mark_name(found),
                    "invalid signature"
                );
                Ok(())
            }
        }
    }

    pub fn load_header_block(&mut self) -> IResult<HeaderBlock> {
        Ok(HeaderBlock {
            offset: self.read_u32()?,
            size: self.read_u64()?,
        })
    }

    /// Populate a fresh `T` from the current position, attributing any failure to `T`.
    fn read_record<T: ResData>(&mut self) -> IResult<T> {
        let start = self.position();
        let mut instance = T::default();
        instance
            .load(self)
            .map_err(|e| e.in_record(record_name::<T>(), start))?;
        Ok(instance)
    }

    /// Read a `T` stored inline at the current position. Not identity-cached.
    pub fn load_inline<T: ResData>(&mut self) -> IResult<T> {
        self.read_record()
    }

    /// Follow the next offset to a shared `T`; a null offset yields a default `T`.
    pub fn load<T: ResData>(&mut self) -> IResult<Rc<T>> {
        match self.read_offset()? {
            Some(offset) => self.load_at(offset),
            None => Ok(Rc::new(T::default())),
        }
    }

    /// The shared `T` at `offset`, loading it on first request.
    pub fn load_at<T: ResData>(&mut self, offset: u64) -> IResult<Rc<T>> {
        let key = (offset, TypeId::of::<T>());
        if let Some(existing) = self
            .instances
            .get(&key)
            .and_then(|instance| instance.downcast_ref::<Rc<T>>())
        {
            trace!(offset, record = record_name::<T>(), "identity cache hit");
            return Ok(Rc::clone(existing));
        }
        if !self.loading.insert(key) {
            return Err(ErrorKind::CyclicReference {
                record: record_name::<T>(),
                offset,
            }
            .into());
        }

        let result = self.follow_offset(offset, |loader| loader.read_record::<T>());
        self.loading.remove(&key);
        let instance = Rc::new(result?);
        self.instances.insert(key, Box::new(Rc::clone(&instance)));
        Ok(instance)
    }

    /// Follow the next offset to `count` consecutive `T`s.
    pub fn load_list<T: ResData>(&mut self, count: usize) -> IResult<Vec<T>> {
        let offset = self.read_offset()?;
        self.load_list_at(count, offset)
    }

    /// `count` consecutive `T`s at `offset`, in file order. Never identity-cached.
    pub fn load_list_at<T: ResData>(&mut self, count: usize, offset: Option<u64>) -> IResult<Vec<T>> {
        let Some(offset) = offset.filter(|_| count > 0) else {
            return Ok(Vec::new());
        };
        self.follow_offset(offset, |loader| {
            (0..count).map(|_| loader.read_record::<T>()).collect()
        })
    }

    /// Follow the next offset and run `f` there; a null offset yields `R::default()`.
    pub fn load_custom<R: Default>(&mut self, f: impl FnOnce(&mut Self) -> IResult<R>) -> IResult<R> {
        let offset = self.read_offset()?;
        self.load_custom_at(offset, f)
    }

    pub fn load_custom_at<R: Default>(
        &mut self,
        offset: Option<u64>,
        f: impl FnOnce(&mut Self) -> IResult<R>,
    ) -> IResult<R> {
        match offset {
            Some(offset) => self.follow_offset(offset, f),
            None => Ok(R::default()),
        }
    }

    /// Read a string stored at the current position.
    ///
    /// 64-bit strings carry a `u16` length before their null-terminated bytes.
    pub fn read_string(&mut self, encoding: Option<TextEncoding>) -> IResult<String> {
        let encoding = encoding.unwrap_or(self.options.text_encoding);
        if self.generation == Generation::Offset64 {
            let _len = self.read_u16()?;
        }
        self.read_null_string(encoding)
    }

    /// Follow the next offset to a string; empty for a null offset.
    pub fn load_string(&mut self, encoding: Option<TextEncoding>) -> IResult<String> {
        match self.read_offset()? {
            Some(offset) => self.load_string_at(offset, encoding),
            None => Ok(String::new()),
        }
    }

    /// The string at `offset`. With interning on, the first decode at an offset
    /// is reused for every later request, whatever encoding those ask for.
    pub fn load_string_at(&mut self, offset: u64, encoding: Option<TextEncoding>) -> IResult<String> {
        if let Some(text) = self.strings.get(offset) {
            return Ok(text.to_owned());
        }
        let text = self.follow_offset(offset, |loader| loader.read_string(encoding))?;
        if self.options.intern_strings {
            self.strings.insert(offset, text.clone());
        }
        Ok(text)
    }

    /// Read `count` offsets and the strings they point at.
    pub fn load_strings(&mut self, count: usize, encoding: Option<TextEncoding>) -> IResult<Vec<String>> {
        let offsets = self.read_offsets(count)?;
        offsets
            .into_iter()
            .map(|offset| match offset {
                Some(offset) => self.load_string_at(offset, encoding),
                None => Ok(String::new()),
            })
            .collect()
    }

    /// Follow the next offset to a dictionary whose values are stored in its nodes.
    ///
    /// On the 64-bit generation nodes have no value field and every value is a
    /// default `T`; use [`ResFileLoader::load_dict_values`] for those files.
    pub fn load_dict<T: ResData>(&mut self) -> IResult<ResDict<Rc<T>>> {
        match self.read_offset()? {
            Some(offset) => self.load_dict_at(offset),
            None => Ok(ResDict::new()),
        }
    }

    pub fn load_dict_at<T: ResData>(&mut self, offset: u64) -> IResult<ResDict<Rc<T>>> {
        self.follow_offset(offset, |loader| {
            let mut raw = read_raw_nodes(loader)?.into_iter();
            let root = raw.next().map(|node| node.links).unwrap_or_default();
            let mut dict = ResDict::with_root(root);
            for node in raw {
                let value = match node.value {
                    Some(value) => loader.load_at::<T>(value)?,
                    None => Rc::new(T::default()),
                };
                dict.push_node(DictNode {
                    links: node.links,
                    key: node.key,
                    value,
                })?;
            }
            Ok(dict)
        })
        .map_err(|e| e.in_record("ResDict", offset))
    }

    /// Read a values offset, then a dictionary offset, and zip the dictionary's
    /// keys with the flat value array.
    pub fn load_dict_values<T: ResData>(&mut self) -> IResult<ResDict<Rc<T>>> {
        let values = self.read_offset()?;
        let dict = self.read_offset()?;
        self.load_dict_values_at(dict, values)
    }

    pub fn load_dict_values_at<T: ResData>(
        &mut self,
        dict: Option<u64>,
        values: Option<u64>,
    ) -> IResult<ResDict<Rc<T>>> {
        let Some(dict_offset) = dict else {
            return Ok(ResDict::new());
        };
        let mut raw = self
            .follow_offset(dict_offset, read_raw_nodes)
            .map_err(|e| e.in_record("ResDict", dict_offset))?
            .into_iter();
        let root = raw.next().map(|node| node.links).unwrap_or_default();
        let count = raw.len();
        if count > 0 && values.is_none() {
            return Err(ErrorKind::DictionaryValuesMissing {
                count: count as u32,
            }
            .into());
        }

        let items = self.load_list_at::<T>(count, values)?;
        let mut result = ResDict::with_root(root);
        for (node, value) in raw.zip(items) {
            result.push_node(DictNode {
                links: node.links,
                key: node.key,
                value: Rc::new(value),
            })?;
        }
        Ok(result)
    }

    /// Keys of the dictionary at `dict`, ignoring any values.
    pub fn load_dict_keys_at(&mut self, dict: Option<u64>) -> IResult<Vec<String>> {
        let Some(offset) = dict else {
            return Ok(Vec::new());
        };
        let raw = self
            .follow_offset(offset, read_raw_nodes)
            .map_err(|e| e.in_record("ResDict", offset))?;
        Ok(raw.into_iter().skip(1).map(|node| node.key).collect())
    }

    pub fn load_relocation_table(&mut self, offset: u64) -> IResult<RelocationTable> {
        self.follow_offset(offset, |loader| loader.read_record::<RelocationTable>())
    }
}

macro_rules! scalar_res_data {
    ($($ty:ty => $read:ident;)*) => {
        $(
            impl ResData for $ty {
                fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
                    *self = loader.$read()?;
                    Ok(())
                }
            }
        )*
    };
}

scalar_res_data! {
    u8 => read_u8;
    i8 => read_i8;
    u16 => read_u16;
    i16 => read_i16;
    u32 => read_u32;
    i32 => read_i32;
    u64 => read_u64;
    i64 => read_i64;
    f32 => read_f32;
}

/// A string stored in place, as dictionary values of string tables are.
impl ResData for String {
    fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
        *self = loader.read_string(None)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::writer::BinaryWriter;
    use crate::data::writer::fixtures::write_dict;

    fn loader_for(data: &[u8], generation: Generation) -> ResFileLoader<'_> {
        ResFileLoader::from_parts(
            data,
            generation,
            generation.default_endian(),
            Version::new(0, 8, 0, 0),
            LoaderOptions::default(),
        )
    }

    #[derive(Debug, Default)]
    struct Pair {
        first: u32,
        second: Rc<u32>,
    }

    impl ResData for Pair {
        fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
            self.first = loader.read_u32()?;
            self.second = loader.load()?;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Node {
        next: Option<Rc<Node>>,
    }

    impl ResData for Node {
        fn load(&mut self, loader: &mut ResFileLoader<'_>) -> IResult<()> {
            self.next = Some(loader.load()?);
            Ok(())
        }
    }

    #[test]
    fn relative_offsets_resolve_from_field_start() {
        for (field_start, target) in [(0u64, 0x20u64), (8, 0x10), (0x14, 0x18), (4, 0x3C)] {
            let mut w = BinaryWriter::new(Endianness::Big);
            w.seek(field_start);
            let slot = w.reserve_offset(Generation::Offset32);
            w.seek(0x40);
            w.write_u8(0);
            w.satisfy_offset(slot, target);
            let data = w.into_inner();

            let mut loader = loader_for(&data, Generation::Offset32);
            loader.seek(field_start).unwrap();
            assert_eq!(loader.read_offset().unwrap(), Some(target));
            assert_eq!(loader.position(), field_start + 4);
        }
    }

    #[test]
    fn absolute_offsets_are_taken_as_is() {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(0x1234);
        w.write_u64(0);
        let data = w.into_inner();
        let mut loader = loader_for(&data, Generation::Offset64);
        assert_eq!(loader.read_offsets(2).unwrap(), [Some(0x1234), None]);
        assert_eq!(loader.position(), 16);
    }

    #[test]
    fn null_offset_yields_default_record() {
        let data = [0u8; 8];
        let mut loader = loader_for(&data, Generation::Offset32);
        let pair = loader.load::<Pair>().unwrap();
        assert_eq!(pair.first, 0);
        assert_eq!(loader.position(), 4);
        assert_eq!(loader.load_string(None).unwrap(), "");
        assert_eq!(loader.cached_instances(), 0);
    }

    #[test]
    fn same_offset_loads_one_shared_instance() {
        // Two `Pair`s at 0x10 and 0x18 both point at the u32 at 0x20.
        let mut w = BinaryWriter::new(Endianness::Big);
        let a = w.reserve_offset(Generation::Offset32);
        let b = w.reserve_offset(Generation::Offset32);
        let c = w.reserve_offset(Generation::Offset32);
        w.satisfy_offset(a, 0x10);
        w.satisfy_offset(b, 0x18);
        w.satisfy_offset(c, 0x10);
        for pair_start in [0x10u64, 0x18] {
            w.seek(pair_start);
            w.write_u32(pair_start as u32);
            let shared = w.reserve_offset(Generation::Offset32);
            w.satisfy_offset(shared, 0x20);
        }
        w.seek(0x20);
        w.write_u32(99);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset32);
        let first = loader.load::<Pair>().unwrap();
        let second = loader.load::<Pair>().unwrap();
        let again = loader.load::<Pair>().unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&first, &again));
        assert!(Rc::ptr_eq(&first.second, &second.second));
        assert_eq!(*first.second, 99);
        assert_eq!(second.first, 0x18);
        assert_eq!(loader.cached_instances(), 3);
    }

    #[test]
    fn lists_are_not_cached() {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(0x10);
        w.write_u64(0x10);
        w.write_u32(1);
        w.write_u32(2);
        w.write_u32(3);
        let data = w.into_inner();
        let mut loader = loader_for(&data, Generation::Offset64);
        assert_eq!(loader.load_list::<u32>(3).unwrap(), [1, 2, 3]);
        assert_eq!(loader.load_list::<u32>(0).unwrap(), Vec::<u32>::new());
        assert_eq!(loader.cached_instances(), 0);
        assert_eq!(loader.position(), 16);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        // Only absolute offsets can point a record back at itself.
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(8);
        w.write_u64(8);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset64);
        let err = loader.load::<Node>().unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::CyclicReference {
                record: "Node",
                offset: 8
            }
        ));
        assert_eq!(err.record.as_ref().map(|r| r.offset), Some(8));
        assert_eq!(loader.position(), 8);
        assert_eq!(loader.cached_instances(), 0);
    }

    #[test]
    fn out_of_range_offset_propagates_with_record() {
        let mut w = BinaryWriter::new(Endianness::Big);
        let slot = w.reserve_offset(Generation::Offset32);
        w.satisfy_offset(slot, 4);
        w.write_u32(1);
        // `Pair.second` points far past the end of the buffer.
        w.write_u32(0x1000);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset32);
        let err = loader.load::<Pair>().unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::OffsetOutOfRange { offset: 0x1008, len: 12 }
        ));
        let frame = err.record.unwrap();
        assert_eq!(frame.name, "Pair");
        assert_eq!(frame.offset, 4);
        assert_eq!(loader.position(), 4);
    }

    #[test]
    fn offset_to_buffer_end_is_out_of_range() {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(8);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset64);
        let err = loader.load::<u32>().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::OffsetOutOfRange { offset: 8, len: 8 }));
        assert!(matches!(
            loader.load_string_at(8, None).unwrap_err().kind,
            ErrorKind::OffsetOutOfRange { offset: 8, len: 8 }
        ));
        assert!(matches!(
            loader.load_custom_at(Some(8), |l| l.read_u8()).unwrap_err().kind,
            ErrorKind::OffsetOutOfRange { .. }
        ));
        assert!(matches!(
            loader.load_list_at::<u8>(1, Some(8)).unwrap_err().kind,
            ErrorKind::OffsetOutOfRange { .. }
        ));
        // A plain cursor move to the end stays legal.
        loader.seek(8).unwrap();
        assert_eq!(loader.remaining(), 0);
    }

    #[test]
    fn alpha_beta_dictionary() {
        let entries = [("alpha", 1u32), ("beta", 2)];

        let mut w = BinaryWriter::new(Endianness::Big);
        let slot = w.reserve_offset(Generation::Offset32);
        w.satisfy_offset_here(slot);
        write_dict(&mut w, Generation::Offset32, &entries, |w, v| w.write_u32(*v));
        let data = w.into_inner();
        let dict = loader_for(&data, Generation::Offset32)
            .load_dict::<u32>()
            .unwrap();

        let mut w = BinaryWriter::new(Endianness::Little);
        let values = w.reserve_offset(Generation::Offset64);
        let dict_slot = w.reserve_offset(Generation::Offset64);
        w.satisfy_offset_here(values);
        w.write_u32(1);
        w.write_u32(2);
        w.satisfy_offset_here(dict_slot);
        write_dict(&mut w, Generation::Offset64, &entries, |_, _| {});
        let data = w.into_inner();
        let split = loader_for(&data, Generation::Offset64)
            .load_dict_values::<u32>()
            .unwrap();

        for dict in [dict, split] {
            assert_eq!(dict.len(), 2);
            assert_eq!(**dict.lookup("beta").unwrap(), 2);
            assert_eq!(**dict.at(0).unwrap(), 1);
            assert!(matches!(
                dict.lookup("gamma").unwrap_err().kind,
                ErrorKind::KeyNotFound { .. }
            ));
        }
    }

    #[test]
    fn strings_are_interned_by_offset() {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u64(0x10);
        w.write_u64(0x10);
        w.write_u16(4);
        w.write_null_string("bone", TextEncoding::Utf8);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset64);
        assert_eq!(loader.load_strings(2, None).unwrap(), ["bone", "bone"]);
        assert_eq!(loader.strings().get(0x10), Some("bone"));

        // The cached text wins over a request for another encoding.
        assert_eq!(
            loader.load_string_at(0x10, Some(TextEncoding::Utf16)).unwrap(),
            "bone"
        );

        loader.strings_mut().insert(0x10, "external".to_owned());
        loader.seek(0).unwrap();
        assert_eq!(loader.load_string(None).unwrap(), "external");
    }

    #[test]
    fn custom_payloads_and_header_blocks() {
        let mut w = BinaryWriter::new(Endianness::Little);
        w.write_u32(0x40);
        w.write_u64(0x120);
        w.write_u32(0);
        w.write_u64(0x20);
        w.write_u64(0);
        w.write_i16(-1);
        w.write_i16(7);
        let data = w.into_inner();

        let mut loader = loader_for(&data, Generation::Offset64);
        let block = loader.load_header_block().unwrap();
        assert_eq!(block, HeaderBlock { offset: 0x40, size: 0x120 });
        assert_eq!(loader.position(), 12);

        loader.seek(16).unwrap();
        let values = loader.load_custom(|l| l.read_i16s(2)).unwrap();
        assert_eq!(values, [-1, 7]);
        let empty: Vec<i16> = loader.load_custom(|l| l.read_i16s(2)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(loader.position(), 32);
    }

    #[test]
    fn signature_policy() {
        let data = b"FMDLXXXX";
        let mut strict = loader_for(data, Generation::Offset32);
        strict.check_signature(b"FMDL").unwrap();
        let err = strict.check_signature(b"FSKL").unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::SignatureMismatch { offset: 4, ref found, .. } if found == "XXXX"
        ));

        let options = LoaderOptions::builder()
            .signature_policy(SignaturePolicy::Warn)
            .build();
        let mut lenient = ResFileLoader::from_parts(
            data,
            Generation::Offset32,
            Endianness::Big,
            Version::default(),
            options,
        );
        lenient.seek(4).unwrap();
        lenient.check_signature(b"FSKL").unwrap();
        assert_eq!(lenient.position(), 8);
    }

    #[test]
    fn header_detection() {
        let mut switch = b"FRES    ".to_vec();
        switch.extend_from_slice(&[0x00, 0x00, 0x08, 0x00, 0xFF, 0xFE]);
        let loader = ResFileLoader::new(&switch).unwrap();
        assert_eq!(loader.generation(), Generation::Offset64);
        assert_eq!(loader.byte_order(), ByteOrder::Little);
        assert_eq!(loader.version(), Version::new(0, 8, 0, 0));

        let mut wiiu = b"FRES".to_vec();
        wiiu.extend_from_slice(&[0x03, 0x04, 0x00, 0x04, 0xFE, 0xFF]);
        let loader = ResFileLoader::new(&wiiu).unwrap();
        assert_eq!(loader.generation(), Generation::Offset32);
        assert_eq!(loader.byte_order(), ByteOrder::Big);
        assert_eq!(loader.version(), Version::new(3, 4, 0, 4));
    }

    #[test]
    fn byte_order_mark_switches_cursor() {
        let data = [0xFF, 0xFE, 0x01, 0x00, 0x12, 0x34];
        let mut loader = loader_for(&data, Generation::Offset32);
        assert_eq!(loader.read_byte_order().unwrap(), ByteOrder::Little);
        assert_eq!(loader.read_u16().unwrap(), 1);
        assert!(loader.read_byte_order().is_err());
        assert_eq!(loader.endian(), Endianness::Little);
    }

    #[test]
    fn record_names_are_short() {
        assert_eq!(record_name::<Pair>(), "Pair");
        assert_eq!(record_name::<ResDict<Rc<u32>>>(), "ResDict");
    }
}
