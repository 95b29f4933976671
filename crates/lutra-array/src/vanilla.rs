//! Vanilla array storage and operations
//!
//! Varrays and vecs store a dense list. Darrays, dicts and keysets store an
//! insertion-ordered map; removal shifts later entries down so iterator
//! positions are always `0..size`.
//!
//! Mutations validate their arguments first, then take unique access to the
//! array (copying it if it is shared or not counted) and change it in place.
//! A no-op never copies.

use std::{iter, mem};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tracing::warn;

use crate::array::{ArrayData, ArrayRef, Body, Header, RefCountMode};
use crate::error::{ArrayError, Result};
use crate::kind::{ArrayKind, DataType};
use crate::value::{ArrayKey, Value};

type Entries = IndexMap<ArrayKey, Value, FxBuildHasher>;

/// Keyed storage with the next integer key to append at
#[derive(Debug, Clone, Default)]
pub(crate) struct MapStore {
    entries: Entries,
    next_ki: i64,
}

impl MapStore {
    fn insert(&mut self, key: ArrayKey, value: Value) {
        if let ArrayKey::Int(i) = key
            && i >= self.next_ki
        {
            self.next_ki = i.saturating_add(1);
        }
        self.entries.insert(key, value);
    }

    /// How many appends fit before the integer keys run out
    ///
    /// `next_ki` saturates at `i64::MAX`, so the last key is free only while
    /// nothing occupies it.
    fn append_room(&self) -> u64 {
        if self.entries.contains_key(&ArrayKey::Int(self.next_ki)) {
            0
        } else {
            self.next_ki.abs_diff(i64::MAX).saturating_add(1)
        }
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (ArrayKey, Value)>) -> Self {
        let mut map = Self::default();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    fn renumbered(entries: impl IntoIterator<Item = (ArrayKey, Value)>) -> Self {
        let mut map = Self::default();
        for (k, v) in entries {
            match k {
                ArrayKey::Int(_) => {
                    let next = map.next_ki;
                    map.insert(ArrayKey::Int(next), v);
                }
                key => map.insert(key, v),
            }
        }
        map
    }

    fn is_numbered(&self) -> bool {
        let mut expected = 0i64;
        for k in self.entries.keys() {
            if let ArrayKey::Int(i) = k {
                if *i != expected {
                    return false;
                }
                expected += 1;
            }
        }
        self.next_ki == expected
    }
}

/// Vanilla storage
#[derive(Debug, Clone)]
pub(crate) enum Store {
    List(Vec<Value>),
    Map(MapStore),
}

fn notice(from: ArrayKind, to: ArrayKind, reason: &str) {
    warn!(target: "lutra_array::notice", ?from, ?to, "{reason}");
}

fn make(kind: ArrayKind, legacy: bool, store: Store) -> ArrayRef {
    debug_assert!(kind.is_vanilla());
    debug_assert_eq!(kind.is_list(), matches!(store, Store::List(_)));
    ArrayRef::from_data(ArrayData::new(
        Header {
            kind,
            legacy,
            mode: RefCountMode::Counted,
            layout: None,
        },
        Body::Vanilla(store),
    ))
}

pub(crate) fn empty(kind: ArrayKind) -> ArrayRef {
    if kind.is_list() {
        make(kind, false, Store::List(Vec::new()))
    } else {
        make(kind, false, Store::Map(MapStore::default()))
    }
}

pub(crate) fn from_list(kind: ArrayKind, values: Vec<Value>) -> ArrayRef {
    make(kind, false, Store::List(values))
}

pub(crate) fn from_pairs(
    kind: ArrayKind,
    pairs: impl IntoIterator<Item = (ArrayKey, Value)>,
) -> ArrayRef {
    make(kind, false, Store::Map(MapStore::from_pairs(pairs)))
}

fn store(ad: &ArrayData) -> &Store {
    match &ad.body {
        Body::Vanilla(store) => store,
        _ => panic!("{:?} array is not vanilla", ad.kind()),
    }
}

/// Unique access to the storage of `slot`, copying it first if needed
fn unique(slot: &mut ArrayRef) -> &mut Store {
    if slot.cow_check() {
        *slot = copy(slot.data());
    }
    match &mut slot.data_mut().body {
        Body::Vanilla(store) => store,
        _ => panic!("vanilla operation on a bespoke array"),
    }
}

fn list_index(values: &[Value], key: i64) -> Option<usize> {
    usize::try_from(key).ok().filter(|&i| i < values.len())
}

/// Replace a varray with a darray holding the same elements
fn promote(slot: &mut ArrayRef, reason: &str) {
    let Store::List(values) = store(slot.data()) else {
        return;
    };
    notice(slot.kind(), ArrayKind::Mixed, reason);
    let pairs = values
        .iter()
        .enumerate()
        .map(|(i, v)| (ArrayKey::Int(i as i64), v.clone()));
    *slot = make(
        ArrayKind::Mixed,
        slot.is_legacy(),
        Store::Map(MapStore::from_pairs(pairs)),
    );
}

// ==================== Reads ====================

pub(crate) fn size(ad: &ArrayData) -> usize {
    match store(ad) {
        Store::List(v) => v.len(),
        Store::Map(m) => m.entries.len(),
    }
}

pub(crate) fn is_vector_data(ad: &ArrayData) -> bool {
    match store(ad) {
        Store::List(_) => true,
        Store::Map(m) => m
            .entries
            .keys()
            .enumerate()
            .all(|(i, k)| *k == ArrayKey::Int(i as i64)),
    }
}

pub(crate) fn get_int(ad: &ArrayData, key: i64) -> Option<Value> {
    match store(ad) {
        Store::List(v) => list_index(v, key).map(|i| v[i].clone()),
        Store::Map(m) => m.entries.get(&ArrayKey::Int(key)).cloned(),
    }
}

pub(crate) fn get_str(ad: &ArrayData, key: &str) -> Option<Value> {
    match store(ad) {
        Store::List(_) => None,
        Store::Map(m) => m.entries.get(&ArrayKey::from(key)).cloned(),
    }
}

pub(crate) fn get_key(ad: &ArrayData, pos: usize) -> Option<ArrayKey> {
    match store(ad) {
        Store::List(v) => (pos < v.len()).then_some(ArrayKey::Int(pos as i64)),
        Store::Map(m) => m.entries.get_index(pos).map(|(k, _)| k.clone()),
    }
}

pub(crate) fn get_val(ad: &ArrayData, pos: usize) -> Option<Value> {
    match store(ad) {
        Store::List(v) => v.get(pos).cloned(),
        Store::Map(m) => m.entries.get_index(pos).map(|(_, v)| v.clone()),
    }
}

pub(crate) fn get_int_pos(ad: &ArrayData, key: i64) -> Option<usize> {
    match store(ad) {
        Store::List(v) => list_index(v, key),
        Store::Map(m) => m.entries.get_index_of(&ArrayKey::Int(key)),
    }
}

pub(crate) fn get_str_pos(ad: &ArrayData, key: &str) -> Option<usize> {
    match store(ad) {
        Store::List(_) => None,
        Store::Map(m) => m.entries.get_index_of(&ArrayKey::from(key)),
    }
}

pub(crate) fn iter_begin(_ad: &ArrayData) -> usize {
    0
}

pub(crate) fn iter_end(ad: &ArrayData) -> usize {
    size(ad)
}

pub(crate) fn iter_last(ad: &ArrayData) -> usize {
    match size(ad) {
        0 => 0,
        n => n - 1,
    }
}

pub(crate) fn iter_advance(ad: &ArrayData, pos: usize) -> usize {
    (pos + 1).min(size(ad))
}

pub(crate) fn iter_rewind(ad: &ArrayData, pos: usize) -> usize {
    match pos {
        0 => size(ad),
        p => (p - 1).min(size(ad)),
    }
}

// ==================== Mutation ====================

pub(crate) fn set_int(slot: &mut ArrayRef, key: i64, value: Value) -> Result<()> {
    let kind = slot.kind();
    match kind {
        ArrayKind::Keyset => return Err(ArrayError::KeysetSet),
        ArrayKind::Vec => {
            let len = size(slot.data());
            if usize::try_from(key).map_or(true, |i| i >= len) {
                return Err(ArrayError::OutOfBounds {
                    kind,
                    index: key,
                    size: len,
                });
            }
        }
        ArrayKind::Packed => {
            let len = size(slot.data());
            if usize::try_from(key).map_or(true, |i| i > len) {
                promote(slot, "varray assignment out of sequence");
            }
        }
        _ => {}
    }
    match unique(slot) {
        Store::List(values) => match list_index(values, key) {
            Some(i) => values[i] = value,
            None => values.push(value),
        },
        Store::Map(map) => map.insert(ArrayKey::Int(key), value),
    }
    Ok(())
}

pub(crate) fn set_str(slot: &mut ArrayRef, key: &str, value: Value) -> Result<()> {
    let kind = slot.kind();
    match kind {
        ArrayKind::Keyset => return Err(ArrayError::KeysetSet),
        ArrayKind::Vec => {
            return Err(ArrayError::InvalidKey {
                kind,
                key: ArrayKey::from(key).to_string(),
            });
        }
        ArrayKind::Packed => promote(slot, "varray assignment with a string key"),
        _ => {}
    }
    match unique(slot) {
        Store::Map(map) => map.insert(ArrayKey::from(key), value),
        Store::List(_) => unreachable!("string key on list storage"),
    }
    Ok(())
}

/// Mutable access to the value at `key`
///
/// Vecs and dicts require the key to exist. Varrays and darrays insert a
/// null first, the same way `set_int` would.
pub(crate) fn lval_int(slot: &mut ArrayRef, key: i64) -> Result<&mut Value> {
    let kind = slot.kind();
    let present = get_int_pos(slot.data(), key).is_some();
    match kind {
        ArrayKind::Keyset => return Err(ArrayError::KeysetSet),
        ArrayKind::Vec if !present => {
            return Err(ArrayError::OutOfBounds {
                kind,
                index: key,
                size: size(slot.data()),
            });
        }
        ArrayKind::Dict if !present => {
            return Err(ArrayError::MissingKey(ArrayKey::Int(key).to_string()));
        }
        _ if !present => set_int(slot, key, Value::Null)?,
        _ => {}
    }
    let found = match unique(slot) {
        Store::List(values) => match list_index(values, key) {
            Some(i) => values.get_mut(i),
            None => None,
        },
        Store::Map(map) => map.entries.get_mut(&ArrayKey::Int(key)),
    };
    match found {
        Some(value) => Ok(value),
        None => unreachable!("lval key {key} missing after insertion"),
    }
}

/// Mutable access to the value at a string key; see [`lval_int`]
pub(crate) fn lval_str<'a>(slot: &'a mut ArrayRef, key: &str) -> Result<&'a mut Value> {
    let kind = slot.kind();
    let present = get_str_pos(slot.data(), key).is_some();
    match kind {
        ArrayKind::Keyset => return Err(ArrayError::KeysetSet),
        ArrayKind::Vec => {
            return Err(ArrayError::InvalidKey {
                kind,
                key: ArrayKey::from(key).to_string(),
            });
        }
        ArrayKind::Dict if !present => {
            return Err(ArrayError::MissingKey(ArrayKey::from(key).to_string()));
        }
        _ if !present => set_str(slot, key, Value::Null)?,
        _ => {}
    }
    let found = match unique(slot) {
        Store::Map(map) => map.entries.get_mut(&ArrayKey::from(key)),
        Store::List(_) => None,
    };
    match found {
        Some(value) => Ok(value),
        None => unreachable!("lval key {key:?} missing after insertion"),
    }
}

pub(crate) fn remove_int(slot: &mut ArrayRef, key: i64) -> Result<()> {
    match store(slot.data()) {
        Store::List(values) => {
            let Some(index) = list_index(values, key) else {
                return Ok(());
            };
            if index + 1 != values.len() {
                if slot.kind() == ArrayKind::Vec {
                    return Err(ArrayError::NonEndRemoval(key));
                }
                promote(slot, "varray unset of a non-end element");
                return remove_int(slot, key);
            }
            if let Store::List(values) = unique(slot) {
                values.pop();
            }
        }
        Store::Map(map) => {
            if !map.entries.contains_key(&ArrayKey::Int(key)) {
                return Ok(());
            }
            if let Store::Map(map) = unique(slot) {
                map.entries.shift_remove(&ArrayKey::Int(key));
            }
        }
    }
    Ok(())
}

pub(crate) fn remove_str(slot: &mut ArrayRef, key: &str) -> Result<()> {
    let key = ArrayKey::from(key);
    let present = match store(slot.data()) {
        Store::List(_) => false,
        Store::Map(map) => map.entries.contains_key(&key),
    };
    if present && let Store::Map(map) = unique(slot) {
        map.entries.shift_remove(&key);
    }
    Ok(())
}

fn keyset_key(value: &Value) -> Result<ArrayKey> {
    value
        .as_key()
        .ok_or(ArrayError::InvalidKeysetValue(value.type_name()))
}

pub(crate) fn append(slot: &mut ArrayRef, value: Value) -> Result<()> {
    if slot.kind() == ArrayKind::Keyset {
        let key = keyset_key(&value)?;
        if let Store::Map(map) = unique(slot) {
            map.insert(key, value);
        }
        return Ok(());
    }
    if let Store::Map(map) = store(slot.data())
        && map.append_room() == 0
    {
        return Err(ArrayError::NextKeyOccupied);
    }
    match unique(slot) {
        Store::List(values) => values.push(value),
        Store::Map(map) => {
            let key = ArrayKey::Int(map.next_ki);
            map.insert(key, value);
        }
    }
    Ok(())
}

pub(crate) fn prepend(slot: &mut ArrayRef, value: Value) -> Result<()> {
    if slot.kind() == ArrayKind::Keyset {
        let key = keyset_key(&value)?;
        if let Store::Map(map) = unique(slot) {
            map.entries.shift_remove(&key);
            map.entries.shift_insert(0, key, value);
        }
        return Ok(());
    }
    match unique(slot) {
        Store::List(values) => values.insert(0, value),
        Store::Map(map) => {
            let old = mem::take(&mut map.entries);
            *map = MapStore::renumbered(iter::once((ArrayKey::Int(0), value)).chain(old));
        }
    }
    Ok(())
}

pub(crate) fn merge(slot: &mut ArrayRef, other: &ArrayRef) -> Result<()> {
    let incoming = other.entries();
    if incoming.is_empty() {
        return Ok(());
    }
    match slot.kind() {
        ArrayKind::Keyset => {
            let keys = incoming
                .iter()
                .map(|(_, v)| keyset_key(v))
                .collect::<Result<Vec<_>>>()?;
            if let Store::Map(map) = unique(slot) {
                for key in keys {
                    map.insert(key.clone(), Value::from(key));
                }
            }
            return Ok(());
        }
        ArrayKind::Packed if incoming.iter().any(|(k, _)| matches!(k, ArrayKey::Str(_))) => {
            promote(slot, "varray merged with string keys");
        }
        _ => {}
    }
    if let Store::Map(map) = store(slot.data()) {
        let appends = incoming
            .iter()
            .filter(|(k, _)| matches!(k, ArrayKey::Int(_)))
            .count() as u64;
        if appends > map.append_room() {
            return Err(ArrayError::NextKeyOccupied);
        }
    }
    match unique(slot) {
        Store::List(values) => values.extend(incoming.into_iter().map(|(_, v)| v)),
        Store::Map(map) => {
            for (k, v) in incoming {
                match k {
                    ArrayKey::Int(_) => {
                        let next = ArrayKey::Int(map.next_ki);
                        map.insert(next, v);
                    }
                    key => map.insert(key, v),
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn pop(slot: &mut ArrayRef) -> Value {
    if size(slot.data()) == 0 {
        return Value::Null;
    }
    match unique(slot) {
        Store::List(values) => values.pop().unwrap_or(Value::Null),
        Store::Map(map) => match map.entries.pop() {
            Some((key, value)) => {
                if key == ArrayKey::Int(map.next_ki - 1) {
                    map.next_ki -= 1;
                }
                value
            }
            None => Value::Null,
        },
    }
}

pub(crate) fn dequeue(slot: &mut ArrayRef) -> Value {
    if size(slot.data()) == 0 {
        return Value::Null;
    }
    let renumber = slot.kind() != ArrayKind::Keyset;
    match unique(slot) {
        Store::List(values) => values.remove(0),
        Store::Map(map) => {
            let value = map
                .entries
                .shift_remove_index(0)
                .map_or(Value::Null, |(_, v)| v);
            if renumber {
                *map = MapStore::renumbered(mem::take(&mut map.entries));
            }
            value
        }
    }
}

pub(crate) fn renumber(slot: &mut ArrayRef) {
    if slot.kind() == ArrayKind::Keyset {
        return;
    }
    let numbered = match store(slot.data()) {
        Store::List(_) => true,
        Store::Map(map) => map.is_numbered(),
    };
    if !numbered && let Store::Map(map) = unique(slot) {
        *map = MapStore::renumbered(mem::take(&mut map.entries));
    }
}

// ==================== Conversion ====================

/// Whether converting between two kinds only changes the header
const fn is_relabel(from: ArrayKind, to: ArrayKind) -> bool {
    matches!(
        (from, to),
        (ArrayKind::Packed, ArrayKind::Vec)
            | (ArrayKind::Vec, ArrayKind::Packed)
            | (ArrayKind::Mixed, ArrayKind::Dict)
            | (ArrayKind::Dict, ArrayKind::Mixed)
    )
}

pub(crate) fn convert(slot: &mut ArrayRef, target: DataType, copy_first: bool) -> Result<()> {
    let from = slot.kind();
    let to = ArrayKind::vanilla_for(target);
    if from == to {
        return Ok(());
    }

    if is_relabel(from, to) {
        if copy_first || slot.cow_check() {
            *slot = copy(slot.data());
        }
        slot.data_mut().header.kind = to;
        return Ok(());
    }

    let entries = slot.entries();
    let store = match to {
        ArrayKind::Packed | ArrayKind::Vec => {
            Store::List(entries.into_iter().map(|(_, v)| v).collect())
        }
        ArrayKind::Keyset => {
            let keys = entries
                .iter()
                .map(|(_, v)| keyset_key(v))
                .collect::<Result<Vec<_>>>()?;
            Store::Map(MapStore::from_pairs(
                keys.into_iter().map(|k| (k.clone(), Value::from(k))),
            ))
        }
        _ => Store::Map(MapStore::from_pairs(entries)),
    };
    *slot = make(to, false, store);
    Ok(())
}

/// A counted copy of a vanilla array
pub(crate) fn copy(ad: &ArrayData) -> ArrayRef {
    ArrayRef::from_data(ArrayData::new(
        Header {
            mode: RefCountMode::Counted,
            ..ad.header
        },
        Body::Vanilla(store(ad).clone()),
    ))
}

// ==================== Memory ====================

pub(crate) fn heap_size(ad: &ArrayData) -> usize {
    let storage = match store(ad) {
        Store::List(v) => v.capacity() * mem::size_of::<Value>(),
        Store::Map(m) => {
            m.entries.capacity()
                * (mem::size_of::<ArrayKey>() + mem::size_of::<Value>() + mem::size_of::<u64>())
        }
    };
    mem::size_of::<ArrayData>() + storage
}

fn values(store: &Store) -> Box<dyn Iterator<Item = &Value> + '_> {
    match store {
        Store::List(v) => Box::new(v.iter()),
        Store::Map(m) => Box::new(m.entries.values()),
    }
}

pub(crate) fn scan(ad: &ArrayData, visit: &mut dyn FnMut(&ArrayRef)) {
    for value in values(store(ad)) {
        if let Value::Array(inner) = value {
            visit(inner);
        }
    }
}

pub(crate) fn to_uncounted(ad: &ArrayData) -> ArrayRef {
    let uncounted = |v: &Value| match v {
        Value::Array(inner) => Value::Array(inner.to_uncounted()),
        other => other.clone(),
    };
    let store = match store(ad) {
        Store::List(v) => Store::List(v.iter().map(uncounted).collect()),
        Store::Map(m) => Store::Map(MapStore {
            entries: m
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), uncounted(v)))
                .collect(),
            next_ki: m.next_ki,
        }),
    };
    ArrayRef::from_data(ArrayData::new(
        Header {
            mode: RefCountMode::Uncounted,
            ..ad.header
        },
        Body::Vanilla(store),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    fn keys(arr: &ArrayRef) -> Vec<ArrayKey> {
        arr.entries().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_varray_out_of_sequence_promotes() {
        let mut a = ArrayRef::varray(ints(&[1, 2]));
        a.set_int(2, Value::Int(3)).unwrap();
        assert_eq!(a.kind(), ArrayKind::Packed);

        a.set_int(10, Value::Int(4)).unwrap();
        assert_eq!(a.kind(), ArrayKind::Mixed);
        assert_eq!(a.get_int(10), Some(Value::Int(4)));
        assert_eq!(a.size(), 4);
    }

    #[test]
    fn test_vec_bounds() {
        let mut a = ArrayRef::vec(ints(&[1]));
        assert!(matches!(
            a.set_int(1, Value::Null),
            Err(ArrayError::OutOfBounds { index: 1, size: 1, .. })
        ));
        assert!(matches!(
            a.set_str("x", Value::Null),
            Err(ArrayError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_keyset_rules() {
        let mut a = ArrayRef::keyset([ArrayKey::Int(1)]);
        assert_eq!(a.set_int(1, Value::Int(1)), Err(ArrayError::KeysetSet));
        assert_eq!(
            a.append(Value::Bool(true)),
            Err(ArrayError::InvalidKeysetValue("bool"))
        );
        a.append(Value::from("k")).unwrap();
        a.prepend(Value::Int(7)).unwrap();
        assert_eq!(
            keys(&a),
            [ArrayKey::Int(7), ArrayKey::Int(1), ArrayKey::from("k")]
        );
    }

    #[test]
    fn test_remove_missing_does_not_copy() {
        let mut a = ArrayRef::dict([(ArrayKey::from("a"), Value::Int(1))]);
        let b = a.clone();
        a.remove_str("missing").unwrap();
        a.remove_int(3).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_vec_non_end_removal() {
        let mut a = ArrayRef::vec(ints(&[1, 2, 3]));
        assert_eq!(a.remove_int(0), Err(ArrayError::NonEndRemoval(0)));
        a.remove_int(2).unwrap();
        assert_eq!(a.size(), 2);
    }

    #[test]
    fn test_varray_middle_removal_promotes() {
        let mut a = ArrayRef::varray(ints(&[1, 2, 3]));
        a.remove_int(1).unwrap();
        assert_eq!(a.kind(), ArrayKind::Mixed);
        assert_eq!(keys(&a), [ArrayKey::Int(0), ArrayKey::Int(2)]);
        assert!(!a.is_vector_data());
    }

    #[test]
    fn test_dict_append_and_pop() {
        let mut a = ArrayRef::dict([(ArrayKey::Int(5), Value::Int(0))]);
        a.append(Value::Int(1)).unwrap();
        assert_eq!(a.get_int(6), Some(Value::Int(1)));
        assert_eq!(a.pop(), Value::Int(1));
        a.append(Value::Int(2)).unwrap();
        assert_eq!(a.get_int(6), Some(Value::Int(2)));
    }

    #[test]
    fn test_prepend_and_dequeue_renumber() {
        let mut a = ArrayRef::darray([
            (ArrayKey::Int(3), Value::Int(30)),
            (ArrayKey::from("s"), Value::Int(0)),
            (ArrayKey::Int(9), Value::Int(90)),
        ]);
        a.prepend(Value::Int(-1)).unwrap();
        assert_eq!(
            keys(&a),
            [
                ArrayKey::Int(0),
                ArrayKey::Int(1),
                ArrayKey::from("s"),
                ArrayKey::Int(2)
            ]
        );
        assert_eq!(a.dequeue(), Value::Int(-1));
        assert_eq!(a.get_int(0), Some(Value::Int(30)));
        assert_eq!(a.get_int(1), Some(Value::Int(90)));
    }

    #[test]
    fn test_renumber_noop_keeps_identity() {
        let mut a = ArrayRef::dict([(ArrayKey::Int(0), Value::Null)]);
        let b = a.clone();
        a.renumber();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_merge() {
        let mut a = ArrayRef::dict([(ArrayKey::from("x"), Value::Int(1))]);
        let other = ArrayRef::darray([
            (ArrayKey::Int(7), Value::Int(2)),
            (ArrayKey::from("x"), Value::Int(3)),
        ]);
        a.merge(&other).unwrap();
        assert_eq!(a.get_str("x"), Some(Value::Int(3)));
        assert_eq!(a.get_int(0), Some(Value::Int(2)));

        let mut v = ArrayRef::varray(ints(&[1]));
        v.merge(&other).unwrap();
        assert_eq!(v.kind(), ArrayKind::Mixed);
        assert_eq!(v.size(), 3);
    }

    #[test]
    fn test_relabel_in_place() {
        let mut a = ArrayRef::varray(ints(&[1]));
        let before = a.as_ptr();
        a.to_vec(false).unwrap();
        assert_eq!(a.kind(), ArrayKind::Vec);
        assert_eq!(a.as_ptr(), before);

        a.to_varray(true).unwrap();
        assert_eq!(a.kind(), ArrayKind::Packed);
        assert_ne!(a.as_ptr(), before);
    }

    #[test]
    fn test_to_keyset_rejects_non_keys() {
        let mut a = ArrayRef::vec([Value::Int(1), Value::Double(2.0)]);
        assert_eq!(
            a.to_keyset(false),
            Err(ArrayError::InvalidKeysetValue("float"))
        );
        assert_eq!(a.kind(), ArrayKind::Vec);
    }

    #[test]
    fn test_iteration_positions() {
        let a = ArrayRef::vec(ints(&[1, 2]));
        assert_eq!(a.iter_begin(), 0);
        assert_eq!(a.iter_last(), 1);
        assert_eq!(a.iter_advance(1), a.iter_end());
        assert_eq!(a.iter_rewind(0), a.iter_end());
        assert_eq!(a.iter_rewind(1), 0);

        let empty = ArrayRef::empty(DataType::Dict);
        assert_eq!(empty.iter_begin(), empty.iter_end());
        assert_eq!(empty.iter_last(), empty.iter_end());
    }

    #[test]
    fn test_lval_rules() {
        let mut v = ArrayRef::vec(ints(&[1, 2]));
        assert!(matches!(
            v.lval_int(2),
            Err(ArrayError::OutOfBounds { index: 2, size: 2, .. })
        ));
        *v.lval_int(1).unwrap() = Value::Int(9);
        assert_eq!(v.get_int(1), Some(Value::Int(9)));

        let mut d = ArrayRef::dict([(ArrayKey::from("a"), Value::Int(1))]);
        assert_eq!(
            d.lval_str("b").cloned(),
            Err(ArrayError::MissingKey("\"b\"".to_string()))
        );
        assert_eq!(
            d.lval_int(0).cloned(),
            Err(ArrayError::MissingKey("0".to_string()))
        );

        let mut k = ArrayRef::keyset([ArrayKey::Int(1)]);
        assert_eq!(k.lval_int(1).cloned(), Err(ArrayError::KeysetSet));

        let mut va = ArrayRef::varray(ints(&[1]));
        assert_eq!(*va.lval_int(1).unwrap(), Value::Null);
        assert_eq!(va.kind(), ArrayKind::Packed);
        *va.lval_str("s").unwrap() = Value::Int(3);
        assert_eq!(va.kind(), ArrayKind::Mixed);
        assert_eq!(va.get_str("s"), Some(Value::Int(3)));
    }

    #[test]
    fn test_lval_copies_shared() {
        let mut a = ArrayRef::vec(ints(&[1]));
        let b = a.clone();
        *a.lval_int(0).unwrap() = Value::Int(2);
        assert!(!a.ptr_eq(&b));
        assert_eq!(b.get_int(0), Some(Value::Int(1)));

        let before = a.as_ptr();
        *a.lval_int(0).unwrap() = Value::Int(3);
        assert_eq!(a.as_ptr(), before);
        assert_eq!(a.get_int(0), Some(Value::Int(3)));
    }

    #[test]
    fn test_append_after_last_int_key() {
        let mut a = ArrayRef::dict([(ArrayKey::Int(i64::MAX), Value::Int(1))]);
        assert_eq!(a.append(Value::Int(2)), Err(ArrayError::NextKeyOccupied));
        assert_eq!(a.size(), 1);
        assert_eq!(a.get_int(i64::MAX), Some(Value::Int(1)));

        let other = ArrayRef::vec(ints(&[3]));
        assert_eq!(a.merge(&other), Err(ArrayError::NextKeyOccupied));
        assert_eq!(a.size(), 1);

        let mut b = ArrayRef::dict([(ArrayKey::Int(i64::MAX - 1), Value::Int(1))]);
        b.append(Value::Int(2)).unwrap();
        assert_eq!(b.get_int(i64::MAX), Some(Value::Int(2)));
        assert_eq!(b.append(Value::Int(3)), Err(ArrayError::NextKeyOccupied));
        assert_eq!(b.size(), 2);
    }
}
