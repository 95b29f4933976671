//! Logging layout: a bespoke wrapper around a vanilla array
//!
//! A [`LoggingArray`] holds one counted reference to a vanilla array and the
//! profile of the call site that created it. Reads delegate to the wrapped
//! array. Mutations run the vanilla operation on the wrapped array and then
//! either keep the wrapper (same wrapped instance, kind refreshed) or rewrap
//! whatever array the operation produced.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use super::profile::LoggingProfile;
use super::{ConcreteLayout, Layout, LayoutIndex};
use crate::array::{ArrayData, ArrayRef, Body, Header, RefCountMode};
use crate::error::Result;
use crate::kind::{DataType, bespoke_kind};
use crate::value::{ArrayKey, Value};

/// Wrapper state of a logging array
#[derive(Debug, Clone)]
pub struct LoggingArray {
    wrapped: ArrayRef,
    profile: Arc<LoggingProfile>,
}

impl LoggingArray {
    /// Wrap a vanilla array in a new counted logging array
    ///
    /// # Panics
    ///
    /// Panics if `ad` is not vanilla.
    pub fn make_with_profile(ad: ArrayRef, profile: Arc<LoggingProfile>) -> ArrayRef {
        Self::make(ad, profile, RefCountMode::Counted)
    }

    pub(crate) fn make_static(ad: ArrayRef, profile: Arc<LoggingProfile>) -> ArrayRef {
        Self::make(ad, profile, RefCountMode::Static)
    }

    fn make(ad: ArrayRef, profile: Arc<LoggingProfile>, mode: RefCountMode) -> ArrayRef {
        assert!(ad.is_vanilla(), "cannot wrap bespoke {:?} array", ad.kind());
        let header = Header {
            kind: bespoke_kind(ad.kind()),
            legacy: ad.is_legacy(),
            mode,
            layout: Some(LoggingLayout::INDEX),
        };
        let lad = Self {
            wrapped: ad,
            profile,
        };
        ArrayRef::from_data(ArrayData::new(header, Body::Logging(lad)))
    }

    /// Wrapper state of a logging array, with its invariants checked
    ///
    /// # Panics
    ///
    /// Panics if `ad` is not a well-formed logging array.
    pub fn as_logging(ad: &ArrayData) -> &LoggingArray {
        let Body::Logging(lad) = &ad.body else {
            panic!("{:?} array is not a logging array", ad.kind());
        };
        lad.check_invariants(&ad.header);
        lad
    }

    fn check_invariants(&self, header: &Header) {
        let wrapped = self.wrapped.data().header();
        assert!(!header.kind.is_vanilla());
        assert!(wrapped.kind.is_vanilla());
        assert_eq!(header.kind, bespoke_kind(wrapped.kind));
        assert_eq!(header.kind.data_type(), wrapped.kind.data_type());
        assert_eq!(header.legacy, wrapped.legacy);
        assert_eq!(header.layout, Some(LoggingLayout::INDEX));
    }

    /// The wrapped vanilla array
    pub fn wrapped(&self) -> &ArrayRef {
        &self.wrapped
    }

    /// Profile of the creating call site
    pub fn profile(&self) -> &Arc<LoggingProfile> {
        &self.profile
    }
}

fn wrapped(ad: &ArrayData) -> &ArrayRef {
    &LoggingArray::as_logging(ad).wrapped
}

/// Run a vanilla mutation on the wrapped array of `slot`
///
/// A shared wrapper lends the operation a temporary extra reference to the
/// wrapped array, so the operation copies and neither the wrapper nor the
/// wrapped array change. A unique wrapper lends its own reference and the
/// operation may mutate in place. If the operation leaves a different array
/// behind, `slot` gets a new wrapper around it.
fn mutate<R>(slot: &mut ArrayRef, op: impl FnOnce(&mut ArrayRef) -> R) -> R {
    let lad = LoggingArray::as_logging(slot.data());

    if slot.cow_check() {
        let mut bumped = lad.wrapped.clone();
        let profile = lad.profile.clone();
        let before = bumped.as_ptr();
        let result = op(&mut bumped);
        if bumped.as_ptr() != before {
            *slot = LoggingArray::make_with_profile(bumped, profile);
        }
        return result;
    }

    let ad = slot.data_mut();
    let Body::Logging(lad) = &mut ad.body else {
        unreachable!("checked above");
    };
    let before = lad.wrapped.as_ptr();
    let result = op(&mut lad.wrapped);
    if lad.wrapped.as_ptr() == before {
        ad.header.kind = bespoke_kind(lad.wrapped.kind());
        return result;
    }
    let rewrapped = LoggingArray::make_with_profile(lad.wrapped.clone(), lad.profile.clone());
    *slot = rewrapped;
    result
}

/// The wrapped array of a logging array that is not shared
fn wrapped_mut(slot: &mut ArrayRef) -> &mut ArrayRef {
    match &mut slot.data_mut().body {
        Body::Logging(lad) => &mut lad.wrapped,
        _ => unreachable!("logging layout on a foreign array"),
    }
}

/// Layout of [`LoggingArray`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayout;

impl LoggingLayout {
    /// Registry index
    pub const INDEX: LayoutIndex = LayoutIndex(1);
}

impl Layout for LoggingLayout {
    fn describe(&self) -> &str {
        "LoggingLayout"
    }

    fn as_concrete(&self) -> Option<&dyn ConcreteLayout> {
        Some(self)
    }
}

impl ConcreteLayout for LoggingLayout {
    fn heap_size(&self, ad: &ArrayData) -> usize {
        LoggingArray::as_logging(ad);
        mem::size_of::<ArrayData>()
    }

    fn scan(&self, ad: &ArrayData, visit: &mut dyn FnMut(&ArrayRef)) {
        visit(wrapped(ad));
    }

    fn escalate_to_vanilla(&self, ad: &ArrayData, reason: &str) -> ArrayRef {
        debug!(layout = self.describe(), reason, "escalating to vanilla");
        wrapped(ad).clone()
    }

    fn to_uncounted(&self, ad: &ArrayData) -> ArrayRef {
        let lad = LoggingArray::as_logging(ad);
        LoggingArray::make(
            lad.wrapped.to_uncounted(),
            lad.profile.clone(),
            RefCountMode::Uncounted,
        )
    }

    fn copy(&self, ad: &ArrayData) -> ArrayRef {
        let lad = LoggingArray::as_logging(ad);
        LoggingArray::make_with_profile(lad.wrapped.copy(), lad.profile.clone())
    }

    fn size(&self, ad: &ArrayData) -> usize {
        wrapped(ad).size()
    }

    fn is_vector_data(&self, ad: &ArrayData) -> bool {
        wrapped(ad).is_vector_data()
    }

    fn get_int(&self, ad: &ArrayData, key: i64) -> Option<Value> {
        wrapped(ad).get_int(key)
    }

    fn get_str(&self, ad: &ArrayData, key: &str) -> Option<Value> {
        wrapped(ad).get_str(key)
    }

    fn get_key(&self, ad: &ArrayData, pos: usize) -> Option<ArrayKey> {
        wrapped(ad).get_key(pos)
    }

    fn get_val(&self, ad: &ArrayData, pos: usize) -> Option<Value> {
        wrapped(ad).get_val(pos)
    }

    fn get_int_pos(&self, ad: &ArrayData, key: i64) -> Option<usize> {
        wrapped(ad).get_int_pos(key)
    }

    fn get_str_pos(&self, ad: &ArrayData, key: &str) -> Option<usize> {
        wrapped(ad).get_str_pos(key)
    }

    fn iter_begin(&self, ad: &ArrayData) -> usize {
        wrapped(ad).iter_begin()
    }

    fn iter_last(&self, ad: &ArrayData) -> usize {
        wrapped(ad).iter_last()
    }

    fn iter_end(&self, ad: &ArrayData) -> usize {
        wrapped(ad).iter_end()
    }

    fn iter_advance(&self, ad: &ArrayData, pos: usize) -> usize {
        wrapped(ad).iter_advance(pos)
    }

    fn iter_rewind(&self, ad: &ArrayData, pos: usize) -> usize {
        wrapped(ad).iter_rewind(pos)
    }

    fn set_int(&self, slot: &mut ArrayRef, key: i64, value: Value) -> Result<()> {
        mutate(slot, |w| w.set_int(key, value))
    }

    fn set_str(&self, slot: &mut ArrayRef, key: &str, value: Value) -> Result<()> {
        mutate(slot, |w| w.set_str(key, value))
    }

    // The first pass goes through `mutate` so that the wrapper and the
    // wrapped array are both unique and the key exists; the second borrows
    // the value out of the settled wrapped array without copying.
    fn lval_int<'a>(&self, slot: &'a mut ArrayRef, key: i64) -> Result<&'a mut Value> {
        mutate(slot, |w| w.lval_int(key).map(drop))?;
        wrapped_mut(slot).lval_int(key)
    }

    fn lval_str<'a>(&self, slot: &'a mut ArrayRef, key: &str) -> Result<&'a mut Value> {
        mutate(slot, |w| w.lval_str(key).map(drop))?;
        wrapped_mut(slot).lval_str(key)
    }

    fn remove_int(&self, slot: &mut ArrayRef, key: i64) -> Result<()> {
        mutate(slot, |w| w.remove_int(key))
    }

    fn remove_str(&self, slot: &mut ArrayRef, key: &str) -> Result<()> {
        mutate(slot, |w| w.remove_str(key))
    }

    fn append(&self, slot: &mut ArrayRef, value: Value) -> Result<()> {
        mutate(slot, |w| w.append(value))
    }

    fn prepend(&self, slot: &mut ArrayRef, value: Value) -> Result<()> {
        mutate(slot, |w| w.prepend(value))
    }

    fn merge(&self, slot: &mut ArrayRef, other: &ArrayRef) -> Result<()> {
        mutate(slot, |w| w.merge(other))
    }

    fn pop(&self, slot: &mut ArrayRef) -> Value {
        mutate(slot, ArrayRef::pop)
    }

    fn dequeue(&self, slot: &mut ArrayRef) -> Value {
        mutate(slot, ArrayRef::dequeue)
    }

    fn renumber(&self, slot: &mut ArrayRef) {
        mutate(slot, ArrayRef::renumber)
    }

    fn convert(&self, slot: &mut ArrayRef, target: DataType, copy: bool) -> Result<()> {
        mutate(slot, |w| w.convert(target, copy))
    }

    fn set_legacy_array_in_place(&self, slot: &mut ArrayRef, legacy: bool) {
        LoggingArray::as_logging(slot.data());
        let ad = slot.data_mut();
        let Body::Logging(lad) = &mut ad.body else {
            unreachable!("checked above");
        };
        if lad.wrapped.cow_check() {
            lad.wrapped = lad.wrapped.copy();
        }
        lad.wrapped.set_legacy_array_in_place(legacy);
        ad.header.legacy = legacy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bespoke::profile::{ResumeMode, SrcKey};
    use crate::kind::ArrayKind;

    fn profile() -> Arc<LoggingProfile> {
        Arc::new(LoggingProfile::new(SrcKey::new(1, 0, ResumeMode::None)))
    }

    #[test]
    fn test_wrapper_header() {
        let arr = LoggingArray::make_with_profile(ArrayRef::varray([Value::Int(1)]), profile());
        assert_eq!(arr.kind(), ArrayKind::BespokeVArray);
        assert_eq!(arr.layout(), Some(LoggingLayout::INDEX));
        assert_eq!(arr.mode(), RefCountMode::Counted);
        assert_eq!(arr.get_int(0), Some(Value::Int(1)));
    }

    #[test]
    #[should_panic(expected = "cannot wrap bespoke")]
    fn test_wrapping_twice_panics() {
        let inner = LoggingArray::make_with_profile(ArrayRef::vec([]), profile());
        LoggingArray::make_with_profile(inner, profile());
    }

    #[test]
    fn test_unique_wrapper_with_shared_wrapped_rewraps() {
        let inner = ArrayRef::vec([Value::Int(1)]);
        let mut arr = LoggingArray::make_with_profile(inner.clone(), profile());
        let before = arr.as_ptr();

        arr.append(Value::Int(2)).unwrap();

        assert_ne!(arr.as_ptr(), before);
        assert_eq!(inner.size(), 1);
        assert_eq!(arr.size(), 2);
        let lad = LoggingArray::as_logging(arr.data());
        assert!(lad.wrapped().has_exactly_one_ref());
    }

    #[test]
    fn test_set_legacy_copies_shared_wrapped() {
        let inner = ArrayRef::varray([]);
        let mut arr = LoggingArray::make_with_profile(inner.clone(), profile());
        arr.set_legacy_array_in_place(true);

        assert!(arr.is_legacy());
        assert!(!inner.is_legacy());
        let lad = LoggingArray::as_logging(arr.data());
        assert!(lad.wrapped().is_legacy());
    }

    #[test]
    fn test_to_uncounted() {
        let arr = LoggingArray::make_with_profile(ArrayRef::dict([]), profile());
        let uncounted = arr.to_uncounted();
        assert_eq!(uncounted.mode(), RefCountMode::Uncounted);
        assert_eq!(uncounted.kind(), ArrayKind::BespokeDict);
        let mut seen = Vec::new();
        uncounted.scan(&mut |a| seen.push(a.mode()));
        assert_eq!(seen, [RefCountMode::Uncounted]);
    }
}
