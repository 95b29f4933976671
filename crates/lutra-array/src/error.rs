//! Array operation errors

use thiserror::Error;

use crate::kind::ArrayKind;

/// Errors raised by array operations on user-visible misuse
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArrayError {
    /// Integer key outside the bounds of a vec
    #[error("Out of bounds index {index} for {kind:?} of size {size}")]
    OutOfBounds {
        /// Kind of the array
        kind: ArrayKind,
        /// Offending index
        index: i64,
        /// Array size
        size: usize,
    },

    /// Key type not accepted by the array kind
    #[error("Invalid key for {kind:?}: {key}")]
    InvalidKey {
        /// Kind of the array
        kind: ArrayKind,
        /// Rendered key
        key: String,
    },

    /// Keysets cannot be assigned by key
    #[error("Keysets do not support element assignment")]
    KeysetSet,

    /// Only ints and strings can be stored in a keyset
    #[error("Invalid keyset value of type {0}")]
    InvalidKeysetValue(&'static str),

    /// Vecs only support removing their last element
    #[error("Vecs do not support unsetting non-end elements (index {0})")]
    NonEndRemoval(i64),

    /// Integer keys are exhausted: the next key to append at is already taken
    #[error("Cannot add element to the array as the next element is already occupied")]
    NextKeyOccupied,

    /// Element lookup with throw-on-missing found nothing
    #[error("Undefined index: {0}")]
    MissingKey(String),
}

/// Result type for array operations
pub type Result<T> = std::result::Result<T, ArrayError>;
