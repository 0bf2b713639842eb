//! Error taxonomy for construction-time validation and operation-time failures.

use thiserror::Error;

/// All ways a [`crate::CuckooTable`] construction or operation can fail.
///
/// Variant messages double as the public contract strings a host-language
/// binding might match on.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("keySize out of range")]
    KeySizeOutOfRange,

    #[error("keySize must be a multiple of 4")]
    KeySizeNotMultipleOfFour,

    #[error("valueSize out of range")]
    ValueSizeOutOfRange,

    #[error("elementsMin out of range")]
    ElementsMinOutOfRange,

    #[error("elementsMax out of range")]
    ElementsMaxOutOfRange,

    #[error("maximum capacity exceeded")]
    MaximumCapacityExceeded,

    #[error("cache() and set() methods are mutually exclusive")]
    ModeConflict,

    #[error("set() failed despite multiple resize attempts")]
    SetExhausted,

    #[error("key length does not match configured keySize")]
    KeyLengthMismatch,

    #[error("value length does not match configured valueSize")]
    ValueLengthMismatch,
}
