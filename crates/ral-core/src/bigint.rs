//! Arbitrary-precision integer helpers shared by the resolver and field codec.
//!
//! Arithmetic itself comes from [`num_bigint`]; this module adds the
//! base-prefixed text parser, bit-slicing helpers, and two's-complement
//! conversions used throughout the crate.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use thiserror::Error;

/// Failure to read an unsigned integer from text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ParseIntError {
    /// Nothing left to parse after trimming and prefix removal.
    #[error("empty integer literal")]
    Empty,
    /// A character is not a digit of the selected radix.
    #[error("invalid digit '{digit}' for base {radix}")]
    InvalidDigit {
        /// Offending character.
        digit: char,
        /// Radix selected by the prefix.
        radix: u32,
    },
}

/// Splits an optional `0x`/`0o`/`0b` prefix (case-insensitive) from `text`.
///
/// Returns the radix it selects (10 when absent) and the remaining digits.
#[must_use]
pub fn split_radix_prefix(text: &str) -> (u32, &str) {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'0' {
        match bytes[1] {
            b'x' | b'X' => return (16, &text[2..]),
            b'o' | b'O' => return (8, &text[2..]),
            b'b' | b'B' => return (2, &text[2..]),
            _ => {}
        }
    }
    (10, text)
}

/// Parses digits of a fixed radix. No prefix, sign, or separator is accepted.
///
/// # Errors
///
/// Returns [`ParseIntError`] for an empty string or a non-digit character.
pub fn parse_digits(digits: &str, radix: u32) -> Result<BigUint, ParseIntError> {
    if digits.is_empty() {
        return Err(ParseIntError::Empty);
    }
    // `from_str_radix` tolerates `_` and a leading `+`, so validate first.
    if let Some(digit) = digits.chars().find(|c| !c.is_digit(radix)) {
        return Err(ParseIntError::InvalidDigit { digit, radix });
    }
    BigUint::parse_bytes(digits.as_bytes(), radix).ok_or(ParseIntError::Empty)
}

/// Parses an unsigned integer with optional base prefix.
///
/// Surrounding whitespace is ignored. `0x`, `0o` and `0b` select base 16, 8
/// and 2; anything else is read as decimal. Signs are rejected.
///
/// # Errors
///
/// Returns [`ParseIntError`] when the text is not a valid literal.
pub fn parse_uint(text: &str) -> Result<BigUint, ParseIntError> {
    let (radix, digits) = split_radix_prefix(text.trim());
    parse_digits(digits, radix)
}

/// Parses the base-16 text used for numeric attributes in descriptions.
///
/// A `0x` prefix is optional.
///
/// # Errors
///
/// Returns [`ParseIntError`] when the text is not hexadecimal.
pub fn parse_hex(text: &str) -> Result<BigUint, ParseIntError> {
    parse_digits(strip_hex_prefix(text), 16)
}

/// Removes an optional `0x`/`0X` prefix.
#[must_use]
pub fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// Formats `value` as lowercase hex with a `0x` prefix.
#[must_use]
pub fn format_hex(value: &BigUint) -> String {
    format!("0x{value:x}")
}

/// All-ones mask of `width` bits.
#[must_use]
pub fn mask(width: u32) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

/// Extracts `width` bits of `value` starting at bit `lsb`.
#[must_use]
pub fn extract_bits(value: &BigUint, lsb: u32, width: u32) -> BigUint {
    (value >> lsb) & mask(width)
}

/// Reinterprets a `width`-bit raw value as two's complement.
#[must_use]
pub fn to_signed(value: &BigUint, width: u32) -> BigInt {
    let signed = BigInt::from_biguint(Sign::Plus, value.clone());
    if width > 0 && value.bit(u64::from(width - 1)) {
        signed - (BigInt::one() << width)
    } else {
        signed
    }
}

/// Converts a signed value into its `width`-bit two's-complement raw form.
///
/// Non-negative values pass through unchanged; the caller range-checks first.
#[must_use]
pub fn from_signed(value: &BigInt, width: u32) -> BigUint {
    if value.sign() == Sign::Minus {
        let wrapped = value + (BigInt::one() << width);
        wrapped.to_biguint().unwrap_or_default()
    } else {
        value.magnitude().clone()
    }
}

/// Lowest value representable by a field of `width` bits.
#[must_use]
pub fn min_value(width: u32, signed: bool) -> BigInt {
    if signed && width > 0 {
        -(BigInt::one() << (width - 1))
    } else {
        BigInt::zero()
    }
}

/// Highest value representable by a field of `width` bits.
#[must_use]
pub fn max_value(width: u32, signed: bool) -> BigInt {
    if signed && width > 0 {
        (BigInt::one() << (width - 1)) - BigInt::one()
    } else {
        BigInt::from_biguint(Sign::Plus, mask(width))
    }
}

/// Serde adapter storing a [`BigUint`] as `0x`-prefixed hex text.
pub mod hex_serde {
    use num_bigint::BigUint;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Serializes `value` as `0x…` text.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hex(value))
    }

    /// Reads any literal accepted by [`super::parse_uint`].
    ///
    /// # Errors
    ///
    /// Fails when the text is not an unsigned integer literal.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_uint(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        extract_bits, format_hex, from_signed, max_value, min_value, parse_hex, parse_uint,
        to_signed, ParseIntError,
    };
    use num_bigint::{BigInt, BigUint};
    use rstest::rstest;

    #[rstest]
    #[case("0x1F", 31)]
    #[case("0X1f", 31)]
    #[case("0o17", 15)]
    #[case("0b101", 5)]
    #[case("0B11", 3)]
    #[case("42", 42)]
    #[case("  7 ", 7)]
    #[case("0", 0)]
    #[case("007", 7)]
    fn parses_prefixed_literals(#[case] text: &str, #[case] expected: u64) {
        assert_eq!(parse_uint(text), Ok(BigUint::from(expected)));
    }

    #[rstest]
    #[case("")]
    #[case("0x")]
    #[case("-1")]
    #[case("+1")]
    #[case("1_000")]
    #[case("0b102")]
    #[case("12a")]
    #[case("1 2")]
    fn rejects_malformed_literals(#[case] text: &str) {
        assert!(parse_uint(text).is_err());
    }

    #[test]
    fn reports_offending_digit() {
        assert_eq!(
            parse_uint("0o78"),
            Err(ParseIntError::InvalidDigit {
                digit: '8',
                radix: 8
            })
        );
    }

    #[test]
    fn parses_values_beyond_64_bits() {
        let value = parse_uint("0x10000000000000000").expect("wide literal");
        assert_eq!(value, BigUint::from(u64::MAX) + 1u32);
        assert_eq!(format_hex(&value), "0x10000000000000000");
    }

    #[test]
    fn description_hex_accepts_optional_prefix() {
        assert_eq!(parse_hex("1c"), Ok(BigUint::from(0x1c_u32)));
        assert_eq!(parse_hex("0x1c"), Ok(BigUint::from(0x1c_u32)));
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0xg").is_err());
    }

    #[test]
    fn extracts_bit_slices() {
        let value = BigUint::from(0xABCD_u32);
        assert_eq!(extract_bits(&value, 4, 4), BigUint::from(0xC_u32));
        assert_eq!(extract_bits(&value, 12, 8), BigUint::from(0xA_u32));
    }

    #[test]
    fn twos_complement_conversions_are_inverse() {
        for raw in 0_u32..16 {
            let raw = BigUint::from(raw);
            let signed = to_signed(&raw, 4);
            assert!(signed >= min_value(4, true) && signed <= max_value(4, true));
            assert_eq!(from_signed(&signed, 4), raw);
        }
        assert_eq!(to_signed(&BigUint::from(8_u32), 4), BigInt::from(-8));
        assert_eq!(to_signed(&BigUint::from(7_u32), 4), BigInt::from(7));
    }

    #[test]
    fn unsigned_bounds_cover_full_width() {
        assert_eq!(min_value(8, false), BigInt::from(0));
        assert_eq!(max_value(8, false), BigInt::from(255));
        assert_eq!(min_value(8, true), BigInt::from(-128));
        assert_eq!(max_value(8, true), BigInt::from(127));
    }
}
