//! Bespoke array layouts
//!
//! A bespoke array keeps a vanilla-equivalent kind in its header but stores
//! its elements however its layout likes. Layouts are registered once in a
//! process-wide table and referred to by [`LayoutIndex`]; the header of every
//! bespoke array carries the index of the concrete layout that owns it.
//!
//! The table starts with two entries: [`BespokeTop`] (abstract, matches every
//! bespoke array) and [`LoggingLayout`], the profiling wrapper.

pub mod logging;
pub mod profile;
pub mod top;

use std::sync::LazyLock;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::array::{ArrayData, ArrayRef};
use crate::error::Result;
use crate::kind::DataType;
use crate::value::{ArrayKey, Value};

pub use logging::{LoggingArray, LoggingLayout};
pub use top::BespokeTop;

/// Index of a registered layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayoutIndex(pub u16);

/// A registered layout
pub trait Layout: Send + Sync {
    /// Human-readable name
    fn describe(&self) -> &str;

    /// The operations of this layout, if arrays can actually have it
    fn as_concrete(&self) -> Option<&dyn ConcreteLayout>;

    /// Whether arrays can have exactly this layout
    fn is_concrete(&self) -> bool {
        self.as_concrete().is_some()
    }
}

/// The full array surface for one storage strategy
///
/// Reads take the array data. Mutations take the caller's handle and may
/// replace it, following the same copy-on-write rules as vanilla arrays.
pub trait ConcreteLayout: Layout {
    // ==================== Memory ====================

    /// Bytes owned by the array itself
    fn heap_size(&self, ad: &ArrayData) -> usize;
    /// Visit every array referenced by `ad`
    fn scan(&self, ad: &ArrayData, visit: &mut dyn FnMut(&ArrayRef));
    /// A vanilla array with the same contents
    fn escalate_to_vanilla(&self, ad: &ArrayData, reason: &str) -> ArrayRef;
    /// An uncounted deep copy
    fn to_uncounted(&self, ad: &ArrayData) -> ArrayRef;
    /// A fresh counted copy
    fn copy(&self, ad: &ArrayData) -> ArrayRef;

    // ==================== Reads ====================

    /// Number of elements
    fn size(&self, ad: &ArrayData) -> usize;
    /// Whether keys are exactly `0..size` in order
    fn is_vector_data(&self, ad: &ArrayData) -> bool;
    /// Look up an integer key
    fn get_int(&self, ad: &ArrayData, key: i64) -> Option<Value>;
    /// Look up a string key
    fn get_str(&self, ad: &ArrayData, key: &str) -> Option<Value>;
    /// Key at an iterator position
    fn get_key(&self, ad: &ArrayData, pos: usize) -> Option<ArrayKey>;
    /// Value at an iterator position
    fn get_val(&self, ad: &ArrayData, pos: usize) -> Option<Value>;
    /// Position of an integer key
    fn get_int_pos(&self, ad: &ArrayData, key: i64) -> Option<usize>;
    /// Position of a string key
    fn get_str_pos(&self, ad: &ArrayData, key: &str) -> Option<usize>;

    // ==================== Iteration ====================

    /// First position
    fn iter_begin(&self, ad: &ArrayData) -> usize;
    /// Last position
    fn iter_last(&self, ad: &ArrayData) -> usize;
    /// One-past-the-end position
    fn iter_end(&self, ad: &ArrayData) -> usize;
    /// Next position
    fn iter_advance(&self, ad: &ArrayData, pos: usize) -> usize;
    /// Previous position
    fn iter_rewind(&self, ad: &ArrayData, pos: usize) -> usize;

    // ==================== Mutation ====================

    /// Assign an integer key
    fn set_int(&self, slot: &mut ArrayRef, key: i64, value: Value) -> Result<()>;
    /// Assign a string key
    fn set_str(&self, slot: &mut ArrayRef, key: &str, value: Value) -> Result<()>;
    /// Mutable access to the value at an integer key, making `slot` unique first
    fn lval_int<'a>(&self, slot: &'a mut ArrayRef, key: i64) -> Result<&'a mut Value>;
    /// Mutable access to the value at a string key, making `slot` unique first
    fn lval_str<'a>(&self, slot: &'a mut ArrayRef, key: &str) -> Result<&'a mut Value>;
    /// Remove an integer key
    fn remove_int(&self, slot: &mut ArrayRef, key: i64) -> Result<()>;
    /// Remove a string key
    fn remove_str(&self, slot: &mut ArrayRef, key: &str) -> Result<()>;
    /// Append at the next integer key
    fn append(&self, slot: &mut ArrayRef, value: Value) -> Result<()>;
    /// Insert at the front
    fn prepend(&self, slot: &mut ArrayRef, value: Value) -> Result<()>;
    /// Merge `other` into the array
    fn merge(&self, slot: &mut ArrayRef, other: &ArrayRef) -> Result<()>;
    /// Remove the last value
    fn pop(&self, slot: &mut ArrayRef) -> Value;
    /// Remove the first value
    fn dequeue(&self, slot: &mut ArrayRef) -> Value;
    /// Renumber integer keys from zero
    fn renumber(&self, slot: &mut ArrayRef);
    /// Convert to another data type
    fn convert(&self, slot: &mut ArrayRef, target: DataType, copy: bool) -> Result<()>;
    /// Set the legacy bit; `slot` is the only reference
    fn set_legacy_array_in_place(&self, slot: &mut ArrayRef, legacy: bool);
}

// ==================== Registry ====================

static LAYOUTS: LazyLock<RwLock<Vec<&'static dyn Layout>>> = LazyLock::new(|| {
    RwLock::new(vec![
        &BespokeTop as &'static dyn Layout,
        &LoggingLayout as &'static dyn Layout,
    ])
});

/// Register a layout and return its index
///
/// # Panics
///
/// Panics if the index space is exhausted.
pub fn register(layout: &'static dyn Layout) -> LayoutIndex {
    let mut layouts = LAYOUTS.write();
    let index = u16::try_from(layouts.len())
        .unwrap_or_else(|_| panic!("too many bespoke layouts registering {}", layout.describe()));
    layouts.push(layout);
    debug!(index, name = layout.describe(), "registered bespoke layout");
    LayoutIndex(index)
}

/// Layout registered at `index`
pub fn layout(index: LayoutIndex) -> Option<&'static dyn Layout> {
    LAYOUTS.read().get(usize::from(index.0)).copied()
}

/// Concrete layout registered at `index`
///
/// # Panics
///
/// Panics if no concrete layout is registered there.
pub fn concrete_layout(index: LayoutIndex) -> &'static dyn ConcreteLayout {
    let Some(layout) = layout(index) else {
        panic!("no bespoke layout registered at {}", index.0);
    };
    match layout.as_concrete() {
        Some(concrete) => concrete,
        None => panic!("bespoke layout {} is not concrete", layout.describe()),
    }
}
