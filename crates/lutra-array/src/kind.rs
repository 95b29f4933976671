//! Array kinds and user-visible data types

use serde::Serialize;

/// User-visible array type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    /// Legacy list-like array
    VArray,
    /// Legacy map-like array
    DArray,
    /// Vector
    Vec,
    /// Dictionary
    Dict,
    /// Set of ints and strings
    Keyset,
}

/// Storage kind of an array header
///
/// Vanilla kinds have a fixed in-memory representation. Bespoke kinds mirror
/// them one to one and say nothing about storage: the layout does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArrayKind {
    /// Vanilla varray
    Packed,
    /// Vanilla darray
    Mixed,
    /// Vanilla vec
    Vec,
    /// Vanilla dict
    Dict,
    /// Vanilla keyset
    Keyset,
    /// Bespoke varray
    BespokeVArray,
    /// Bespoke darray
    BespokeDArray,
    /// Bespoke vec
    BespokeVec,
    /// Bespoke dict
    BespokeDict,
    /// Bespoke keyset
    BespokeKeyset,
}

impl ArrayKind {
    /// Whether this kind has a vanilla representation
    pub const fn is_vanilla(self) -> bool {
        matches!(
            self,
            Self::Packed | Self::Mixed | Self::Vec | Self::Dict | Self::Keyset
        )
    }

    /// Data type seen by user code
    pub const fn data_type(self) -> DataType {
        match self {
            Self::Packed | Self::BespokeVArray => DataType::VArray,
            Self::Mixed | Self::BespokeDArray => DataType::DArray,
            Self::Vec | Self::BespokeVec => DataType::Vec,
            Self::Dict | Self::BespokeDict => DataType::Dict,
            Self::Keyset | Self::BespokeKeyset => DataType::Keyset,
        }
    }

    /// Whether elements are stored as a dense list
    pub(crate) const fn is_list(self) -> bool {
        matches!(self, Self::Packed | Self::Vec)
    }

    /// Vanilla kind for a data type
    pub const fn vanilla_for(ty: DataType) -> Self {
        match ty {
            DataType::VArray => Self::Packed,
            DataType::DArray => Self::Mixed,
            DataType::Vec => Self::Vec,
            DataType::Dict => Self::Dict,
            DataType::Keyset => Self::Keyset,
        }
    }
}

/// Bespoke kind for a vanilla kind
///
/// # Panics
///
/// Panics if `kind` is already bespoke.
pub fn bespoke_kind(kind: ArrayKind) -> ArrayKind {
    match kind {
        ArrayKind::Packed => ArrayKind::BespokeVArray,
        ArrayKind::Mixed => ArrayKind::BespokeDArray,
        ArrayKind::Vec => ArrayKind::BespokeVec,
        ArrayKind::Dict => ArrayKind::BespokeDict,
        ArrayKind::Keyset => ArrayKind::BespokeKeyset,
        bespoke => panic!("bespoke_kind called on bespoke kind {bespoke:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VANILLA: [ArrayKind; 5] = [
        ArrayKind::Packed,
        ArrayKind::Mixed,
        ArrayKind::Vec,
        ArrayKind::Dict,
        ArrayKind::Keyset,
    ];

    #[test]
    fn test_bespoke_kind_preserves_data_type() {
        for kind in VANILLA {
            let bespoke = bespoke_kind(kind);
            assert!(!bespoke.is_vanilla());
            assert_eq!(bespoke.data_type(), kind.data_type());
            assert_eq!(ArrayKind::vanilla_for(kind.data_type()), kind);
        }
    }

    #[test]
    #[should_panic(expected = "bespoke kind")]
    fn test_bespoke_kind_of_bespoke() {
        bespoke_kind(ArrayKind::BespokeDict);
    }
}
