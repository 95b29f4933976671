//! Layout descriptors for code that specializes on a bespoke layout
//!
//! A [`BespokeLayout`] names a registered layout. Its operations assume the
//! array passed in has that layout: for a concrete layout a mismatch is an
//! internal error and panics; the abstract top layout accepts any array.

use crate::array::ArrayRef;
use crate::bespoke::{self, BespokeTop, Layout, LayoutIndex, LoggingLayout};
use crate::error::{ArrayError, Result};
use crate::value::{ArrayKey, Value};

/// Descriptor of a registered layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BespokeLayout(LayoutIndex);

impl BespokeLayout {
    /// Descriptor for a registered layout index
    pub fn from_index(index: u16) -> Option<Self> {
        let index = LayoutIndex(index);
        bespoke::layout(index).map(|_| Self(index))
    }

    /// The logging layout
    pub fn logging() -> Self {
        Self(LoggingLayout::INDEX)
    }

    /// The top layout
    pub fn top() -> Self {
        Self(BespokeTop::INDEX)
    }

    /// Raw layout index
    pub fn index(self) -> u16 {
        self.0.0
    }

    fn layout(self) -> &'static dyn Layout {
        match bespoke::layout(self.0) {
            Some(layout) => layout,
            None => panic!("no bespoke layout registered at {}", self.0.0),
        }
    }

    /// Layout name
    pub fn describe(self) -> &'static str {
        self.layout().describe()
    }

    /// Whether arrays can have exactly this layout
    pub fn is_concrete(self) -> bool {
        self.layout().is_concrete()
    }

    fn check_layout_matches(self, arr: &ArrayRef) {
        assert!(
            !self.is_concrete() || arr.layout() == Some(self.0),
            "{:?} array does not have layout {}",
            arr.kind(),
            self.describe()
        );
    }

    /// Look up a key
    pub fn get(self, arr: &ArrayRef, key: &ArrayKey) -> Option<Value> {
        self.check_layout_matches(arr);
        arr.get(key)
    }

    /// Look up a key for an element read
    ///
    /// A missing key is `Ok(None)`, or an error when `throw_on_missing`.
    pub fn elem(
        self,
        arr: &ArrayRef,
        key: &ArrayKey,
        throw_on_missing: bool,
    ) -> Result<Option<Value>> {
        self.check_layout_matches(arr);
        match arr.get(key) {
            None if throw_on_missing => Err(ArrayError::MissingKey(key.to_string())),
            found => Ok(found),
        }
    }

    /// Assign a key
    pub fn set(self, arr: &mut ArrayRef, key: &ArrayKey, value: Value) -> Result<()> {
        self.check_layout_matches(arr);
        arr.set(key, value)
    }

    /// Mutable access to the value at a key
    pub fn lval<'a>(self, arr: &'a mut ArrayRef, key: &ArrayKey) -> Result<&'a mut Value> {
        self.check_layout_matches(arr);
        arr.lval(key)
    }

    /// Append a value
    pub fn append(self, arr: &mut ArrayRef, value: Value) -> Result<()> {
        self.check_layout_matches(arr);
        arr.append(value)
    }

    /// A vanilla array with the same contents
    pub fn escalate_to_vanilla(self, arr: &ArrayRef, reason: &str) -> ArrayRef {
        self.check_layout_matches(arr);
        arr.escalate_to_vanilla(reason)
    }

    /// First iterator position
    pub fn iter_first_pos(self, arr: &ArrayRef) -> usize {
        self.check_layout_matches(arr);
        arr.iter_begin()
    }

    /// Last iterator position
    pub fn iter_last_pos(self, arr: &ArrayRef) -> usize {
        self.check_layout_matches(arr);
        arr.iter_last()
    }

    /// Position of the `idx`-th element (`iter_end` past the last)
    pub fn iter_pos(self, arr: &ArrayRef, idx: usize) -> usize {
        self.check_layout_matches(arr);
        let end = arr.iter_end();
        let mut pos = arr.iter_begin();
        for _ in 0..idx {
            if pos == end {
                break;
            }
            pos = arr.iter_advance(pos);
        }
        pos
    }

    /// Element handle for an iterator position
    pub fn iter_elm(self, arr: &ArrayRef, pos: usize) -> usize {
        self.check_layout_matches(arr);
        pos.min(arr.iter_end())
    }

    /// Key of an element
    pub fn iter_get_key(self, arr: &ArrayRef, elm: usize) -> Option<ArrayKey> {
        self.check_layout_matches(arr);
        arr.get_key(elm)
    }

    /// Value of an element
    pub fn iter_get_val(self, arr: &ArrayRef, elm: usize) -> Option<Value> {
        self.check_layout_matches(arr);
        arr.get_val(elm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_descriptors() {
        assert_eq!(BespokeLayout::top().describe(), "BespokeTop");
        assert!(!BespokeLayout::top().is_concrete());
        assert_eq!(BespokeLayout::logging().describe(), "LoggingLayout");
        assert!(BespokeLayout::logging().is_concrete());
        assert_eq!(BespokeLayout::from_index(1), Some(BespokeLayout::logging()));
        assert_eq!(BespokeLayout::from_index(u16::MAX), None);
    }

    #[test]
    fn test_top_accepts_vanilla() {
        let arr = ArrayRef::vec([Value::Int(1), Value::Int(2)]);
        let top = BespokeLayout::top();
        assert_eq!(top.get(&arr, &ArrayKey::Int(1)), Some(Value::Int(2)));
        assert_eq!(top.iter_pos(&arr, 1), 1);
        assert_eq!(top.iter_pos(&arr, 9), arr.iter_end());
    }

    #[test]
    fn test_elem_missing() {
        let arr = ArrayRef::dict([]);
        let top = BespokeLayout::top();
        let key = ArrayKey::from("k");
        assert_eq!(top.elem(&arr, &key, false), Ok(None));
        assert_eq!(
            top.elem(&arr, &key, true),
            Err(ArrayError::MissingKey("\"k\"".to_string()))
        );
    }

    #[test]
    #[should_panic(expected = "does not have layout LoggingLayout")]
    fn test_concrete_mismatch_panics() {
        let arr = ArrayRef::vec([]);
        BespokeLayout::logging().get(&arr, &ArrayKey::Int(0));
    }
}
