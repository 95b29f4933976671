//! Reference-counted array handles
//!
//! An [`ArrayRef`] is one counted reference to an [`ArrayData`]. Cloning a
//! handle takes a reference and dropping it releases one; the array is freed
//! with its last reference.
//!
//! Mutating operations take the handle by `&mut` and may leave it pointing
//! at a different array: an array that is shared, static or uncounted is
//! copied first ("copy on write") and only a uniquely referenced counted
//! array is changed in place. Other handles never observe a mutation.
//!
//! Every operation dispatches on the header: vanilla arrays go to
//! [`crate::vanilla`], bespoke arrays to the concrete layout registered for
//! their layout index.

use std::sync::Arc;

use serde::Serialize;

use crate::bespoke::logging::LoggingArray;
use crate::bespoke::{ConcreteLayout, LayoutIndex, concrete_layout};
use crate::error::Result;
use crate::kind::{ArrayKind, DataType};
use crate::value::{ArrayKey, Value};
use crate::vanilla::{self, Store};

/// How an array participates in reference counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefCountMode {
    /// Ordinary counted array
    Counted,
    /// Lives for the whole process; never mutated
    Static,
    /// Shared across requests; never mutated
    Uncounted,
}

/// Array header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Storage kind
    pub kind: ArrayKind,
    /// Legacy array bit
    pub legacy: bool,
    /// Reference counting mode
    pub mode: RefCountMode,
    /// Bespoke layout (`None` for vanilla arrays)
    pub layout: Option<LayoutIndex>,
}

#[derive(Debug, Clone)]
pub(crate) enum Body {
    Vanilla(Store),
    Logging(LoggingArray),
}

/// Array header plus storage
#[derive(Debug, Clone)]
pub struct ArrayData {
    pub(crate) header: Header,
    pub(crate) body: Body,
}

impl ArrayData {
    pub(crate) fn new(header: Header, body: Body) -> Self {
        Self { header, body }
    }

    /// Array header
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Storage kind
    #[inline]
    pub fn kind(&self) -> ArrayKind {
        self.header.kind
    }

    /// Whether this array uses a vanilla representation
    #[inline]
    pub fn is_vanilla(&self) -> bool {
        self.header.kind.is_vanilla()
    }
}

/// Counted reference to an array
#[derive(Debug, Clone)]
pub struct ArrayRef(pub(crate) Arc<ArrayData>);

/// Handles compare by identity
impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl ArrayRef {
    pub(crate) fn from_data(data: ArrayData) -> Self {
        Self(Arc::new(data))
    }

    // ==================== Construction ====================

    /// Empty array of the given data type
    pub fn empty(ty: DataType) -> Self {
        vanilla::empty(ArrayKind::vanilla_for(ty))
    }

    /// Vec from values
    pub fn vec(values: impl IntoIterator<Item = Value>) -> Self {
        vanilla::from_list(ArrayKind::Vec, values.into_iter().collect())
    }

    /// Varray from values
    pub fn varray(values: impl IntoIterator<Item = Value>) -> Self {
        vanilla::from_list(ArrayKind::Packed, values.into_iter().collect())
    }

    /// Dict from key-value pairs; later duplicates overwrite earlier ones
    pub fn dict(pairs: impl IntoIterator<Item = (ArrayKey, Value)>) -> Self {
        vanilla::from_pairs(ArrayKind::Dict, pairs)
    }

    /// Darray from key-value pairs
    pub fn darray(pairs: impl IntoIterator<Item = (ArrayKey, Value)>) -> Self {
        vanilla::from_pairs(ArrayKind::Mixed, pairs)
    }

    /// Keyset from keys
    pub fn keyset(keys: impl IntoIterator<Item = ArrayKey>) -> Self {
        vanilla::from_pairs(
            ArrayKind::Keyset,
            keys.into_iter().map(|k| (k.clone(), Value::from(k))),
        )
    }

    /// Turn this array into a static one
    ///
    /// Static arrays are never mutated: every mutation works on a copy.
    pub fn into_static(mut self) -> Self {
        Arc::make_mut(&mut self.0).header.mode = RefCountMode::Static;
        self
    }

    // ==================== Reference counting ====================

    /// Number of counted references
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether this handle is the only reference
    #[inline]
    pub fn has_exactly_one_ref(&self) -> bool {
        self.ref_count() == 1
    }

    /// Whether a mutation must copy first
    #[inline]
    pub fn cow_check(&self) -> bool {
        self.0.header.mode != RefCountMode::Counted || !self.has_exactly_one_ref()
    }

    /// Whether both handles refer to the same array
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the array, for identity checks
    #[inline]
    pub fn as_ptr(&self) -> *const ArrayData {
        Arc::as_ptr(&self.0)
    }

    /// Array header and storage
    #[inline]
    pub fn data(&self) -> &ArrayData {
        &self.0
    }

    /// Unique access to the array; the caller must have ruled out COW
    pub(crate) fn data_mut(&mut self) -> &mut ArrayData {
        debug_assert!(!self.cow_check());
        Arc::make_mut(&mut self.0)
    }

    // ==================== Header ====================

    /// Storage kind
    #[inline]
    pub fn kind(&self) -> ArrayKind {
        self.0.header.kind
    }

    /// User-visible data type
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.kind().data_type()
    }

    /// Whether this array uses a vanilla representation
    #[inline]
    pub fn is_vanilla(&self) -> bool {
        self.0.is_vanilla()
    }

    /// Legacy array bit
    #[inline]
    pub fn is_legacy(&self) -> bool {
        self.0.header.legacy
    }

    /// Reference counting mode
    #[inline]
    pub fn mode(&self) -> RefCountMode {
        self.0.header.mode
    }

    /// Bespoke layout index (`None` for vanilla arrays)
    #[inline]
    pub fn layout(&self) -> Option<LayoutIndex> {
        self.0.header.layout
    }

    fn concrete(&self) -> &'static dyn ConcreteLayout {
        match self.layout() {
            Some(index) => concrete_layout(index),
            None => panic!("{:?} array has no bespoke layout", self.kind()),
        }
    }

    // ==================== Reads ====================

    /// Number of elements
    pub fn size(&self) -> usize {
        if self.is_vanilla() {
            vanilla::size(self.data())
        } else {
            self.concrete().size(self.data())
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether keys are exactly `0..size` in order
    pub fn is_vector_data(&self) -> bool {
        if self.is_vanilla() {
            vanilla::is_vector_data(self.data())
        } else {
            self.concrete().is_vector_data(self.data())
        }
    }

    /// Look up an integer key
    pub fn get_int(&self, key: i64) -> Option<Value> {
        if self.is_vanilla() {
            vanilla::get_int(self.data(), key)
        } else {
            self.concrete().get_int(self.data(), key)
        }
    }

    /// Look up a string key
    pub fn get_str(&self, key: &str) -> Option<Value> {
        if self.is_vanilla() {
            vanilla::get_str(self.data(), key)
        } else {
            self.concrete().get_str(self.data(), key)
        }
    }

    /// Look up a key
    pub fn get(&self, key: &ArrayKey) -> Option<Value> {
        match key {
            ArrayKey::Int(i) => self.get_int(*i),
            ArrayKey::Str(s) => self.get_str(s),
        }
    }

    /// Key at an iterator position
    pub fn get_key(&self, pos: usize) -> Option<ArrayKey> {
        if self.is_vanilla() {
            vanilla::get_key(self.data(), pos)
        } else {
            self.concrete().get_key(self.data(), pos)
        }
    }

    /// Value at an iterator position
    pub fn get_val(&self, pos: usize) -> Option<Value> {
        if self.is_vanilla() {
            vanilla::get_val(self.data(), pos)
        } else {
            self.concrete().get_val(self.data(), pos)
        }
    }

    /// Position of an integer key
    pub fn get_int_pos(&self, key: i64) -> Option<usize> {
        if self.is_vanilla() {
            vanilla::get_int_pos(self.data(), key)
        } else {
            self.concrete().get_int_pos(self.data(), key)
        }
    }

    /// Position of a string key
    pub fn get_str_pos(&self, key: &str) -> Option<usize> {
        if self.is_vanilla() {
            vanilla::get_str_pos(self.data(), key)
        } else {
            self.concrete().get_str_pos(self.data(), key)
        }
    }

    // ==================== Iteration ====================

    /// First iterator position (`iter_end` if empty)
    pub fn iter_begin(&self) -> usize {
        if self.is_vanilla() {
            vanilla::iter_begin(self.data())
        } else {
            self.concrete().iter_begin(self.data())
        }
    }

    /// Last iterator position (`iter_end` if empty)
    pub fn iter_last(&self) -> usize {
        if self.is_vanilla() {
            vanilla::iter_last(self.data())
        } else {
            self.concrete().iter_last(self.data())
        }
    }

    /// One-past-the-end iterator position
    pub fn iter_end(&self) -> usize {
        if self.is_vanilla() {
            vanilla::iter_end(self.data())
        } else {
            self.concrete().iter_end(self.data())
        }
    }

    /// Position after `pos` (`iter_end` past the last element)
    pub fn iter_advance(&self, pos: usize) -> usize {
        if self.is_vanilla() {
            vanilla::iter_advance(self.data(), pos)
        } else {
            self.concrete().iter_advance(self.data(), pos)
        }
    }

    /// Position before `pos` (`iter_end` before the first element)
    pub fn iter_rewind(&self, pos: usize) -> usize {
        if self.is_vanilla() {
            vanilla::iter_rewind(self.data(), pos)
        } else {
            self.concrete().iter_rewind(self.data(), pos)
        }
    }

    /// All entries in iteration order
    pub fn entries(&self) -> Vec<(ArrayKey, Value)> {
        let mut out = Vec::with_capacity(self.size());
        let end = self.iter_end();
        let mut pos = self.iter_begin();
        while pos != end {
            if let (Some(k), Some(v)) = (self.get_key(pos), self.get_val(pos)) {
                out.push((k, v));
            }
            pos = self.iter_advance(pos);
        }
        out
    }

    // ==================== Mutation ====================

    /// Assign an integer key
    pub fn set_int(&mut self, key: i64, value: Value) -> Result<()> {
        if self.is_vanilla() {
            vanilla::set_int(self, key, value)
        } else {
            self.concrete().set_int(self, key, value)
        }
    }

    /// Assign a string key
    pub fn set_str(&mut self, key: &str, value: Value) -> Result<()> {
        if self.is_vanilla() {
            vanilla::set_str(self, key, value)
        } else {
            self.concrete().set_str(self, key, value)
        }
    }

    /// Assign a key
    pub fn set(&mut self, key: &ArrayKey, value: Value) -> Result<()> {
        match key {
            ArrayKey::Int(i) => self.set_int(*i, value),
            ArrayKey::Str(s) => self.set_str(s, value),
        }
    }

    /// Mutable access to the value at an integer key
    ///
    /// Copies first if the array is shared, so `self` may point at a new
    /// array afterwards. Vecs and dicts require the key to exist; varrays and
    /// darrays insert a null.
    pub fn lval_int(&mut self, key: i64) -> Result<&mut Value> {
        if self.is_vanilla() {
            vanilla::lval_int(self, key)
        } else {
            self.concrete().lval_int(self, key)
        }
    }

    /// Mutable access to the value at a string key
    pub fn lval_str(&mut self, key: &str) -> Result<&mut Value> {
        if self.is_vanilla() {
            vanilla::lval_str(self, key)
        } else {
            self.concrete().lval_str(self, key)
        }
    }

    /// Mutable access to the value at a key
    pub fn lval(&mut self, key: &ArrayKey) -> Result<&mut Value> {
        match key {
            ArrayKey::Int(i) => self.lval_int(*i),
            ArrayKey::Str(s) => self.lval_str(s),
        }
    }

    /// Remove an integer key; removing a missing key does nothing
    pub fn remove_int(&mut self, key: i64) -> Result<()> {
        if self.is_vanilla() {
            vanilla::remove_int(self, key)
        } else {
            self.concrete().remove_int(self, key)
        }
    }

    /// Remove a string key; removing a missing key does nothing
    pub fn remove_str(&mut self, key: &str) -> Result<()> {
        if self.is_vanilla() {
            vanilla::remove_str(self, key)
        } else {
            self.concrete().remove_str(self, key)
        }
    }

    /// Remove a key
    pub fn remove(&mut self, key: &ArrayKey) -> Result<()> {
        match key {
            ArrayKey::Int(i) => self.remove_int(*i),
            ArrayKey::Str(s) => self.remove_str(s),
        }
    }

    /// Append a value at the next integer key
    pub fn append(&mut self, value: Value) -> Result<()> {
        if self.is_vanilla() {
            vanilla::append(self, value)
        } else {
            self.concrete().append(self, value)
        }
    }

    /// Insert a value at the front, renumbering integer keys
    pub fn prepend(&mut self, value: Value) -> Result<()> {
        if self.is_vanilla() {
            vanilla::prepend(self, value)
        } else {
            self.concrete().prepend(self, value)
        }
    }

    /// Merge another array into this one
    ///
    /// Integer keys of `other` are appended, string keys overwrite.
    pub fn merge(&mut self, other: &ArrayRef) -> Result<()> {
        if self.is_vanilla() {
            vanilla::merge(self, other)
        } else {
            self.concrete().merge(self, other)
        }
    }

    /// Remove and return the last value (`Null` if empty)
    pub fn pop(&mut self) -> Value {
        if self.is_vanilla() {
            vanilla::pop(self)
        } else {
            self.concrete().pop(self)
        }
    }

    /// Remove and return the first value (`Null` if empty)
    pub fn dequeue(&mut self) -> Value {
        if self.is_vanilla() {
            vanilla::dequeue(self)
        } else {
            self.concrete().dequeue(self)
        }
    }

    /// Renumber integer keys from zero
    pub fn renumber(&mut self) {
        if self.is_vanilla() {
            vanilla::renumber(self)
        } else {
            self.concrete().renumber(self)
        }
    }

    // ==================== Conversion ====================

    pub(crate) fn convert(&mut self, target: DataType, copy: bool) -> Result<()> {
        if self.is_vanilla() {
            vanilla::convert(self, target, copy)
        } else {
            self.concrete().convert(self, target, copy)
        }
    }

    /// Convert to a varray
    pub fn to_varray(&mut self, copy: bool) -> Result<()> {
        self.convert(DataType::VArray, copy)
    }

    /// Convert to a darray
    pub fn to_darray(&mut self, copy: bool) -> Result<()> {
        self.convert(DataType::DArray, copy)
    }

    /// Convert to a vec
    pub fn to_vec(&mut self, copy: bool) -> Result<()> {
        self.convert(DataType::Vec, copy)
    }

    /// Convert to a dict
    pub fn to_dict(&mut self, copy: bool) -> Result<()> {
        self.convert(DataType::Dict, copy)
    }

    /// Convert to a keyset; every value must be an int or a string
    pub fn to_keyset(&mut self, copy: bool) -> Result<()> {
        self.convert(DataType::Keyset, copy)
    }

    /// A fresh counted copy with its own storage
    pub fn copy(&self) -> ArrayRef {
        if self.is_vanilla() {
            vanilla::copy(self.data())
        } else {
            self.concrete().copy(self.data())
        }
    }

    /// Set the legacy bit without copying
    ///
    /// # Panics
    ///
    /// Panics unless this handle is the only reference to a counted array.
    pub fn set_legacy_array_in_place(&mut self, legacy: bool) {
        assert!(
            !self.cow_check(),
            "set_legacy_array_in_place on a shared or static array"
        );
        if self.is_vanilla() {
            self.data_mut().header.legacy = legacy;
        } else {
            self.concrete().set_legacy_array_in_place(self, legacy);
        }
    }

    /// A vanilla array with the same contents
    ///
    /// Vanilla arrays return another reference to themselves.
    pub fn escalate_to_vanilla(&self, reason: &str) -> ArrayRef {
        if self.is_vanilla() {
            self.clone()
        } else {
            self.concrete().escalate_to_vanilla(self.data(), reason)
        }
    }

    // ==================== Memory ====================

    /// Bytes owned by this array (not counting nested arrays)
    pub fn heap_size(&self) -> usize {
        if self.is_vanilla() {
            vanilla::heap_size(self.data())
        } else {
            self.concrete().heap_size(self.data())
        }
    }

    /// Visit every array this one holds a reference to
    pub fn scan(&self, visit: &mut dyn FnMut(&ArrayRef)) {
        if self.is_vanilla() {
            vanilla::scan(self.data(), visit)
        } else {
            self.concrete().scan(self.data(), visit)
        }
    }

    /// An uncounted deep copy
    pub fn to_uncounted(&self) -> ArrayRef {
        if self.mode() == RefCountMode::Uncounted {
            return self.clone();
        }
        if self.is_vanilla() {
            vanilla::to_uncounted(self.data())
        } else {
            self.concrete().to_uncounted(self.data())
        }
    }
}
