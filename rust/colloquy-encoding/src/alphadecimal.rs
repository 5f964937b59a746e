//! Alphadecimal integer layout.
//!
//! An encoded integer is a *length marker* followed by a *digit run*:
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────┐
//! │ Length marker            │ Digit run                    │
//! │ k × 'z', then one symbol │ base-36 digits, most         │
//! │ r from [0-9a-y]          │ significant first, L digits  │
//! └──────────────────────────┴──────────────────────────────┘
//!
//!             L - 1 = 35 × k + r        (0 <= r < 35)
//! ```
//!
//! Both parts draw from the same 36-symbol alphabet `0-9a-z`, which is in
//! ascending ASCII order. A longer digit run always carries either more
//! leading `z` symbols or a greater final marker symbol than a shorter one, so
//! it sorts after every shorter run. Runs of equal length sort by their
//! digits. Together this makes byte-wise comparison of encoded strings agree
//! with numeric comparison of the integers.
//!
//! Every `u64` fits in at most 13 digits, so in practice the marker is a single
//! symbol:
//!
//! | Value  | Digits | Encoded  |
//! |--------|--------|----------|
//! | 0      | `0`    | `00`     |
//! | 1      | `1`    | `01`     |
//! | 35     | `z`    | `0z`     |
//! | 36     | `10`   | `110`    |
//! | 1295   | `zz`   | `1zz`    |
//! | 1296   | `100`  | `2100`   |

use std::{fmt::Display, str::FromStr};

use crate::{AlphadecimalError, MalformedReason};

/// The symbols used for both the length marker and the digit run.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Marker symbol meaning "35 more digits than the rest of the marker says".
pub const CONTINUATION: u8 = b'z';

const RADIX: u64 = 36;
const MARKER_SPAN: usize = 35;

/// Encode `value` as an alphadecimal string.
pub fn encode(value: u64) -> String {
    let mut output = String::new();
    encode_into(value, &mut output);
    output
}

/// Append the alphadecimal encoding of `value` to `output`.
pub fn encode_into(value: u64, output: &mut String) {
    let mut digits = [0u8; 13];
    let mut start = digits.len();
    let mut remaining = value;

    loop {
        start -= 1;
        digits[start] = ALPHABET[(remaining % RADIX) as usize];
        remaining /= RADIX;
        if remaining == 0 {
            break;
        }
    }

    let digits = &digits[start..];
    let continuations = (digits.len() - 1) / MARKER_SPAN;
    let terminal = (digits.len() - 1) % MARKER_SPAN;

    output.reserve(continuations + 1 + digits.len());
    output.extend(std::iter::repeat_n(CONTINUATION as char, continuations));
    output.push(ALPHABET[terminal] as char);
    output.extend(digits.iter().map(|digit| *digit as char));
}

/// Decode an alphadecimal string produced by [`encode`].
///
/// Only the canonical encoding of an integer is accepted: an empty string,
/// symbols outside of `0-9a-z`, a marker that disagrees with the length of the
/// digit run, and leading zeros are all rejected as
/// [`AlphadecimalError::MalformedKey`].
pub fn decode(input: &str) -> Result<u64, AlphadecimalError> {
    let bytes = input.as_bytes();

    if bytes.is_empty() {
        return Err(AlphadecimalError::malformed(input, MalformedReason::Empty));
    }

    let continuations = bytes
        .iter()
        .take_while(|byte| **byte == CONTINUATION)
        .count();

    let Some(terminal) = bytes.get(continuations) else {
        return Err(AlphadecimalError::malformed(
            input,
            MalformedReason::UnterminatedMarker,
        ));
    };

    let terminal = symbol_value(*terminal).ok_or_else(|| {
        AlphadecimalError::malformed(input, MalformedReason::InvalidCharacter(*terminal as char))
    })?;

    let declared = continuations
        .checked_mul(MARKER_SPAN)
        .and_then(|length| length.checked_add(terminal as usize + 1))
        .ok_or_else(|| AlphadecimalError::malformed(input, MalformedReason::Overflow))?;

    let digits = &bytes[continuations + 1..];

    if let Some(invalid) = digits.iter().find(|byte| symbol_value(**byte).is_none()) {
        return Err(AlphadecimalError::malformed(
            input,
            MalformedReason::InvalidCharacter(*invalid as char),
        ));
    }

    if digits.len() != declared {
        return Err(AlphadecimalError::malformed(
            input,
            MalformedReason::LengthMismatch {
                declared,
                actual: digits.len(),
            },
        ));
    }

    if digits.len() > 1 && digits[0] == b'0' {
        return Err(AlphadecimalError::malformed(
            input,
            MalformedReason::LeadingZero,
        ));
    }

    digits.iter().try_fold(0u64, |value, digit| {
        // Validated above
        let digit = symbol_value(*digit).unwrap_or_default() as u64;
        value
            .checked_mul(RADIX)
            .and_then(|value| value.checked_add(digit))
            .ok_or_else(|| AlphadecimalError::malformed(input, MalformedReason::Overflow))
    })
}

fn symbol_value(symbol: u8) -> Option<u8> {
    match symbol {
        b'0'..=b'9' => Some(symbol - b'0'),
        b'a'..=b'z' => Some(symbol - b'a' + 10),
        _ => None,
    }
}

/// A non-negative integer that renders as (and parses from) its alphadecimal
/// encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alphadecimal(pub u64);

impl Alphadecimal {
    /// The integer value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for Alphadecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&encode(self.0))
    }
}

impl FromStr for Alphadecimal {
    type Err = AlphadecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(Alphadecimal)
    }
}

impl From<u64> for Alphadecimal {
    fn from(value: u64) -> Self {
        Alphadecimal(value)
    }
}

impl TryFrom<i64> for Alphadecimal {
    type Error = AlphadecimalError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map(Alphadecimal)
            .map_err(|_| AlphadecimalError::InvalidArgument(value))
    }
}
