//! The abstract top layout

use super::{ConcreteLayout, Layout, LayoutIndex};

/// Layout that every bespoke array satisfies
///
/// No array has this layout; it only describes "some bespoke array".
#[derive(Debug, Clone, Copy, Default)]
pub struct BespokeTop;

impl BespokeTop {
    /// Registry index
    pub const INDEX: LayoutIndex = LayoutIndex(0);
}

impl Layout for BespokeTop {
    fn describe(&self) -> &str {
        "BespokeTop"
    }

    fn as_concrete(&self) -> Option<&dyn ConcreteLayout> {
        None
    }
}
