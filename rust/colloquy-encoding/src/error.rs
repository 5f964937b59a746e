use thiserror::Error;

/// Errors that can occur when encoding or decoding alphadecimal integers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlphadecimalError {
    /// Only non-negative integers have an alphadecimal representation.
    #[error("Cannot encode a negative integer: {0}")]
    InvalidArgument(i64),

    /// The input is not a well-formed alphadecimal string.
    ///
    /// The encoding is canonical: any string that would not be produced by
    /// [`crate::encode`] for some integer is rejected here.
    #[error("Malformed alphadecimal {input:?}: {reason}")]
    MalformedKey {
        /// The rejected input
        input: String,
        /// Why the input was rejected
        reason: MalformedReason,
    },
}

/// The specific defect found in a malformed alphadecimal string.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Nothing to decode
    #[error("input is empty")]
    Empty,

    /// A byte outside of `0-9a-z`
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),

    /// The input ended inside the length marker
    #[error("length marker is not terminated")]
    UnterminatedMarker,

    /// The marker declares a different number of digits than are present
    #[error("length marker declares {declared} digits but {actual} follow")]
    LengthMismatch {
        /// Digits declared by the marker
        declared: usize,
        /// Digits actually present
        actual: usize,
    },

    /// A multi-digit run starting with `0`
    #[error("digit run has a leading zero")]
    LeadingZero,

    /// The value does not fit in 64 bits
    #[error("value overflows a 64-bit integer")]
    Overflow,
}

impl AlphadecimalError {
    pub(crate) fn malformed(input: &str, reason: MalformedReason) -> Self {
        AlphadecimalError::MalformedKey {
            input: input.to_owned(),
            reason,
        }
    }
}
