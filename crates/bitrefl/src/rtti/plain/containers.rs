// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Container codecs. Every container is dynamic: a size header, an element
//! count, then the elements back to back.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use super::{
    count_len, framed_len, read_count, read_with_size_header, type_ids, write_count,
    write_with_size_header, PlainType,
};
use crate::bitstream::{BitLength, Bitstream};
use crate::error::Result;
use crate::rtti::field::FieldInfo;

fn write_items<'v, T, I>(stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool, items: I) -> Result<BitLength>
where
    T: PlainType + 'v,
    I: ExactSizeIterator<Item = &'v T>,
{
    write_with_size_header(stream, compress, |s| {
        write_count(s, items.len(), compress)?;
        for item in items {
            item.to_stream(s, info, compress)?;
        }
        Ok(())
    })
}

fn write_pairs<'v, K, V, I>(stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool, pairs: I) -> Result<BitLength>
where
    K: PlainType + 'v,
    V: PlainType + 'v,
    I: ExactSizeIterator<Item = (&'v K, &'v V)>,
{
    write_with_size_header(stream, compress, |s| {
        write_count(s, pairs.len(), compress)?;
        for (key, value) in pairs {
            key.to_stream(s, info, compress)?;
            value.to_stream(s, info, compress)?;
        }
        Ok(())
    })
}

fn read_items<F>(stream: &mut Bitstream<'_>, compress: bool, mut each: F) -> Result<BitLength>
where
    F: FnMut(&mut Bitstream<'_>) -> Result<()>,
{
    read_with_size_header(stream, compress, |s, _| {
        let count = read_count(s, compress)?;
        for _ in 0..count {
            each(s)?;
        }
        Ok(())
    })
}

fn read_one<T: PlainType>(stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<T> {
    let mut value = T::default();
    value.from_stream(stream, info, compress)?;
    Ok(value)
}

fn framed(count: usize, items: BitLength, compress: bool) -> BitLength {
    let payload = count_len(count, compress) + items;
    framed_len(payload, compress)
}

impl<T: PlainType> PlainType for Vec<T> {
    const TYPE_ID: u32 = type_ids::VEC;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_items(stream, info, compress, self.iter())
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut items = Vec::new();
        let total = read_items(stream, compress, |s| {
            items.push(read_one(s, info, compress)?);
            Ok(())
        })?;
        *self = items;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let items = self
            .iter()
            .fold(BitLength::ZERO, |acc, item| acc + item.encoded_size(compress));
        framed(self.len(), items, compress)
    }
}

impl<K, V, S> PlainType for HashMap<K, V, S>
where
    K: PlainType + Eq + Hash,
    V: PlainType,
    S: std::hash::BuildHasher + Default + 'static,
{
    const TYPE_ID: u32 = type_ids::HASH_MAP;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_pairs(stream, info, compress, self.iter())
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut map = HashMap::default();
        let total = read_items(stream, compress, |s| {
            let key: K = read_one(s, info, compress)?;
            let value: V = read_one(s, info, compress)?;
            map.insert(key, value);
            Ok(())
        })?;
        *self = map;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let items = self.iter().fold(BitLength::ZERO, |acc, (k, v)| {
            acc + k.encoded_size(compress) + v.encoded_size(compress)
        });
        framed(self.len(), items, compress)
    }
}

impl<K, V> PlainType for BTreeMap<K, V>
where
    K: PlainType + Ord,
    V: PlainType,
{
    const TYPE_ID: u32 = type_ids::BTREE_MAP;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_pairs(stream, info, compress, self.iter())
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut map = BTreeMap::new();
        let total = read_items(stream, compress, |s| {
            let key: K = read_one(s, info, compress)?;
            let value: V = read_one(s, info, compress)?;
            map.insert(key, value);
            Ok(())
        })?;
        *self = map;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let items = self.iter().fold(BitLength::ZERO, |acc, (k, v)| {
            acc + k.encoded_size(compress) + v.encoded_size(compress)
        });
        framed(self.len(), items, compress)
    }
}

impl<T, S> PlainType for HashSet<T, S>
where
    T: PlainType + Eq + Hash,
    S: std::hash::BuildHasher + Default + 'static,
{
    const TYPE_ID: u32 = type_ids::HASH_SET;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_items(stream, info, compress, self.iter())
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut set = HashSet::default();
        let total = read_items(stream, compress, |s| {
            set.insert(read_one(s, info, compress)?);
            Ok(())
        })?;
        *self = set;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let items = self
            .iter()
            .fold(BitLength::ZERO, |acc, item| acc + item.encoded_size(compress));
        framed(self.len(), items, compress)
    }
}

impl<T: PlainType + Ord> PlainType for BTreeSet<T> {
    const TYPE_ID: u32 = type_ids::BTREE_SET;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_items(stream, info, compress, self.iter())
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut set = BTreeSet::new();
        let total = read_items(stream, compress, |s| {
            set.insert(read_one(s, info, compress)?);
            Ok(())
        })?;
        *self = set;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let items = self
            .iter()
            .fold(BitLength::ZERO, |acc, item| acc + item.encoded_size(compress));
        framed(self.len(), items, compress)
    }
}

impl<A: PlainType, B: PlainType> PlainType for (A, B) {
    const TYPE_ID: u32 = type_ids::PAIR;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_with_size_header(stream, compress, |s| {
            self.0.to_stream(s, info, compress)?;
            self.1.to_stream(s, info, compress)?;
            Ok(())
        })
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let mut pair = (A::default(), B::default());
        let total = read_with_size_header(stream, compress, |s, _| {
            pair.0 = read_one(s, info, compress)?;
            pair.1 = read_one(s, info, compress)?;
            Ok(())
        })?;
        *self = pair;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let payload = self.0.encoded_size(compress) + self.1.encoded_size(compress);
        framed_len(payload, compress)
    }
}

impl<T: PlainType> PlainType for Option<T> {
    const TYPE_ID: u32 = type_ids::OPTION;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_with_size_header(stream, compress, |s| {
            self.is_some().to_stream(s, info, compress)?;
            if let Some(value) = self {
                value.to_stream(s, info, compress)?;
            }
            Ok(())
        })
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        read_with_size_header(stream, compress, |s, _| {
            let mut present = false;
            present.from_stream(s, info, compress)?;
            *self = if present {
                Some(read_one(s, info, compress)?)
            } else {
                None
            };
            Ok(())
        })
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        let mut payload = self.is_some().encoded_size(compress);
        if let Some(value) = self {
            payload += value.encoded_size(compress);
        }
        framed_len(payload, compress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: PlainType + PartialEq + std::fmt::Debug>(value: T) {
        let info = FieldInfo::default();
        for compress in [false, true] {
            let mut bs = Bitstream::new();
            bs.write(&7u8).unwrap();
            let written = value.to_stream(&mut bs, &info, compress).unwrap();
            assert_eq!(written, value.encoded_size(compress), "compress={compress}");
            bs.write(&0xEEu8).unwrap();

            bs.seek(8);
            let mut back = T::default();
            assert_eq!(back.from_stream(&mut bs, &info, compress).unwrap(), written);
            assert_eq!(back, value);
            assert_eq!(bs.read::<u8>().unwrap(), 0xEE);
        }
    }

    #[test]
    fn test_vec_of_scalars_and_strings() {
        roundtrip(vec![1u32, 300, 70_000]);
        roundtrip(vec![String::from("a"), String::new(), String::from("long enough")]);
        roundtrip(Vec::<i64>::new());
        roundtrip(vec![true, false, true]);
    }

    #[test]
    fn test_maps_and_sets() {
        let mut map = HashMap::new();
        map.insert(String::from("lod0"), 1.0f32);
        map.insert(String::from("lod1"), 0.5f32);
        roundtrip(map);

        let mut tree = BTreeMap::new();
        tree.insert(3u16, vec![1u8, 2, 3]);
        tree.insert(9u16, vec![]);
        roundtrip(tree);

        roundtrip([1i32, -2, 3].into_iter().collect::<HashSet<_>>());
        roundtrip([5u64, 1].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_pairs_and_options() {
        roundtrip((String::from("key"), 42u32));
        roundtrip(Some(vec![1.5f64]));
        roundtrip(None::<String>);
    }

    #[test]
    fn test_failed_element_leaves_container_untouched() {
        let info = FieldInfo::default();
        let mut bs = Bitstream::new();
        vec![String::from("ok"), String::from("bad")].to_stream(&mut bs, &info, false).unwrap();
        // Corrupt the second string's UTF-8 payload.
        let len = bs.size() / 8;
        let mut bytes = bs.into_vec();
        bytes[len as usize - 1] = 0xFF;

        let mut stream = Bitstream::view(&bytes);
        let mut back = vec![String::from("keep")];
        assert!(back.from_stream(&mut stream, &info, false).is_err());
        assert_eq!(back, vec![String::from("keep")]);
    }

    #[test]
    fn test_compressed_vec_is_smaller() {
        let info = FieldInfo::default();
        let value: Vec<u32> = (0..100).collect();
        let mut plain = Bitstream::new();
        let mut packed = Bitstream::new();
        value.to_stream(&mut plain, &info, false).unwrap();
        value.to_stream(&mut packed, &info, true).unwrap();
        assert!(packed.size() * 3 < plain.size());
    }
}
