//! Conversion between raw register values and per-field display text.

use std::fmt::Write as _;

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use thiserror::Error;

use crate::bigint::{
    extract_bits, format_hex, from_signed, mask, max_value, min_value, parse_digits, parse_uint,
    split_radix_prefix, to_signed,
};
use crate::index::{DisplayMode, Field};

/// Largest decimal exponent accepted in real-mode text.
pub const MAX_REAL_EXPONENT: u32 = 4096;

/// Rejected field text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum FieldError {
    /// Text is not a number in the field's display mode.
    #[error("not a valid number: {text:?}")]
    Syntax {
        /// Text as entered.
        text: String,
    },
    /// Number does not fit the field.
    #[error("value out of range, nearest valid raw value is {}", format_hex(.clamped))]
    OutOfRange {
        /// Nearest in-range value in raw two's-complement form.
        clamped: BigUint,
    },
}

/// Result of recomposing a register from its field texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedValue {
    /// Composed raw register value.
    pub value: BigUint,
    /// Fields whose text was rejected, by field index.
    pub issues: Vec<(usize, FieldError)>,
}

const fn is_signed_view(field: &Field, disp: DisplayMode) -> bool {
    field.is_signed && matches!(disp, DisplayMode::Decimal | DisplayMode::Real)
}

/// Right-aligned bits of `field` within a register value.
#[must_use]
pub fn field_value(field: &Field, raw: &BigUint) -> BigUint {
    extract_bits(raw, field.lsb, field.width())
}

/// Formats a right-aligned field value in `disp`.
#[must_use]
pub fn format_field_value(field: &Field, disp: DisplayMode, value: &BigUint) -> String {
    let width = field.width();
    let value = value & mask(width);
    match disp {
        DisplayMode::Hex | DisplayMode::Enumerated => format_hex(&value),
        DisplayMode::Decimal if field.is_signed => to_signed(&value, width).to_string(),
        DisplayMode::Decimal => value.to_string(),
        DisplayMode::Real => {
            let signed = if field.is_signed {
                to_signed(&value, width)
            } else {
                BigInt::from_biguint(Sign::Plus, value)
            };
            format_fixed(&signed, field.fracwidth.unwrap_or(0))
        }
    }
}

/// Exact decimal text of `value / 2^fracwidth` with at least one fractional
/// digit.
fn format_fixed(value: &BigInt, fracwidth: u32) -> String {
    let magnitude = value.magnitude();
    let integer = magnitude >> fracwidth;
    let fraction = magnitude & mask(fracwidth);

    let mut text = String::new();
    if value.is_negative() {
        text.push('-');
    }
    let _ = write!(text, "{integer}.");
    if fraction.is_zero() {
        text.push('0');
    } else {
        // fraction / 2^f == fraction * 5^f / 10^f, so exactly f digits.
        let scaled = fraction * BigUint::from(5_u32).pow(fracwidth);
        let digits = format!("{scaled:0>width$}", width = fracwidth as usize);
        text.push_str(digits.trim_end_matches('0'));
    }
    text
}

/// Formats the bits of `field` taken from register value `raw`.
#[must_use]
pub fn decode_field(field: &Field, disp: DisplayMode, raw: &BigUint) -> String {
    format_field_value(field, disp, &field_value(field, raw))
}

/// Reads decimal real text (`-1.25`, `3e-2`, `.5`) as a fraction
/// `numerator / 10^scale`. Integer literals with a base prefix are accepted
/// too.
fn parse_real(text: &str) -> Option<(BigInt, BigUint)> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let sign = if negative { Sign::Minus } else { Sign::Plus };

    let (radix, digits) = split_radix_prefix(body);
    if radix != 10 {
        let value = parse_digits(digits, radix).ok()?;
        return Some((BigInt::from_biguint(sign, value), BigUint::one()));
    }

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(at) => (&body[..at], Some(&body[at + 1..])),
        None => (body, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let all_digits = format!("{whole}{fraction}");
    let magnitude = parse_digits(&all_digits, 10).ok()?;

    let mut scale = i64::try_from(fraction.len()).ok()?;
    if let Some(exponent) = exponent {
        let (exp_negative, exp_digits) = match exponent.as_bytes().first() {
            Some(b'-') => (true, &exponent[1..]),
            Some(b'+') => (false, &exponent[1..]),
            _ => (false, exponent),
        };
        if exp_digits.is_empty() || !exp_digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let exp: u32 = exp_digits.parse().ok().filter(|&e| e <= MAX_REAL_EXPONENT)?;
        if exp_negative {
            scale += i64::from(exp);
        } else {
            scale -= i64::from(exp);
        }
    }

    let ten = BigUint::from(10_u32);
    let (numerator, denominator) = if scale >= 0 {
        (magnitude, ten.pow(u32::try_from(scale).ok()?))
    } else {
        (magnitude * ten.pow(u32::try_from(-scale).ok()?), BigUint::one())
    };
    Some((BigInt::from_biguint(sign, numerator), denominator))
}

/// Rounds `numerator / denominator * 2^fracwidth` to the nearest integer,
/// ties toward positive infinity.
fn scale_real(numerator: &BigInt, denominator: &BigUint, fracwidth: u32) -> BigInt {
    let denominator = BigInt::from_biguint(Sign::Plus, denominator.clone());
    let twice = (numerator << (fracwidth + 1)) + &denominator;
    twice.div_floor(&(denominator << 1_u32))
}

fn parse_number(field: &Field, disp: DisplayMode, text: &str) -> Option<BigInt> {
    let text = text.trim();
    if disp == DisplayMode::Real {
        let (numerator, denominator) = parse_real(text)?;
        return Some(scale_real(&numerator, &denominator, field.fracwidth.unwrap_or(0)));
    }
    let (sign, body) = match text.strip_prefix('-') {
        Some(body) => (Sign::Minus, body),
        None => (Sign::Plus, text),
    };
    // A second sign or inner whitespace is rejected by the digit parser.
    if body.starts_with(char::is_whitespace) {
        return None;
    }
    parse_uint(body)
        .ok()
        .map(|value| BigInt::from_biguint(sign, value))
}

/// Parses field text entered in `disp` into the right-aligned raw value.
///
/// # Errors
///
/// Returns [`FieldError::Syntax`] for text that is not a number, and
/// [`FieldError::OutOfRange`] with the nearest valid raw value when the
/// number does not fit the field.
pub fn encode_field(field: &Field, disp: DisplayMode, text: &str) -> Result<BigUint, FieldError> {
    let value = parse_number(field, disp, text).ok_or_else(|| FieldError::Syntax {
        text: text.to_string(),
    })?;

    let width = field.width();
    let signed = is_signed_view(field, disp);
    let min = min_value(width, signed);
    let max = max_value(width, signed);
    if value < min {
        return Err(FieldError::OutOfRange {
            clamped: from_signed(&min, width),
        });
    }
    if value > max {
        return Err(FieldError::OutOfRange {
            clamped: from_signed(&max, width),
        });
    }
    Ok(from_signed(&value, width))
}

/// Builds a register value from one text per field.
///
/// Out-of-range text contributes its clamped value. Text that is not a
/// number keeps that field's bits from `previous`. Contributions are ORed,
/// so overlapping fields yield the union of their bits.
#[must_use]
pub fn compose_register_value<S: AsRef<str>>(
    fields: &[Field],
    modes: &[DisplayMode],
    texts: &[S],
    previous: &BigUint,
) -> ComposedValue {
    let mut value = BigUint::zero();
    let mut issues = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let disp = modes.get(index).copied().unwrap_or(field.default_disp);
        let raw = match texts.get(index) {
            Some(text) => match encode_field(field, disp, text.as_ref()) {
                Ok(raw) => raw,
                Err(FieldError::OutOfRange { clamped }) => {
                    let raw = clamped.clone();
                    issues.push((index, FieldError::OutOfRange { clamped }));
                    raw
                }
                Err(error) => {
                    issues.push((index, error));
                    field_value(field, previous)
                }
            },
            None => field_value(field, previous),
        };
        value |= (raw & mask(field.width())) << field.lsb;
    }
    ComposedValue { value, issues }
}

/// Formats every field of a register value.
#[must_use]
pub fn decompose_register_value(
    fields: &[Field],
    modes: &[DisplayMode],
    raw: &BigUint,
) -> Vec<String> {
    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let disp = modes.get(index).copied().unwrap_or(field.default_disp);
            decode_field(field, disp, raw)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        compose_register_value, decode_field, decompose_register_value, encode_field,
        FieldError,
    };
    use crate::index::{DisplayMode, Field, HexCell};
    use num_bigint::BigUint;
    use rstest::rstest;

    fn field(msb: u32, lsb: u32, is_signed: bool, fracwidth: Option<u32>) -> Field {
        Field {
            name: "f".to_string(),
            msb,
            lsb,
            reset: HexCell::from_value(BigUint::from(0_u32)),
            is_signed,
            fracwidth,
            encode: false,
            default_disp: DisplayMode::Hex,
        }
    }

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    #[rstest]
    #[case(DisplayMode::Hex, 0x80, "0x8")]
    #[case(DisplayMode::Enumerated, 0xa0, "0xa")]
    #[case(DisplayMode::Decimal, 0x80, "-8")]
    #[case(DisplayMode::Decimal, 0x70, "7")]
    #[case(DisplayMode::Real, 0x80, "-2.0")]
    #[case(DisplayMode::Real, 0x50, "1.25")]
    #[case(DisplayMode::Real, 0xf0, "-0.25")]
    fn decodes_signed_nibble(#[case] disp: DisplayMode, #[case] raw: u64, #[case] text: &str) {
        let nibble = field(7, 4, true, Some(2));
        assert_eq!(decode_field(&nibble, disp, &big(raw)), text);
    }

    #[test]
    fn real_prints_exact_fraction() {
        let fixed = field(15, 0, false, Some(8));
        assert_eq!(decode_field(&fixed, DisplayMode::Real, &big(0x0401)), "4.00390625");
        assert_eq!(decode_field(&fixed, DisplayMode::Real, &big(0x0400)), "4.0");
        let integral = field(7, 0, false, None);
        assert_eq!(decode_field(&integral, DisplayMode::Real, &big(4)), "4.0");
    }

    #[rstest]
    #[case(DisplayMode::Decimal, "-8", 8)]
    #[case(DisplayMode::Decimal, "7", 7)]
    #[case(DisplayMode::Decimal, "0x7", 7)]
    #[case(DisplayMode::Hex, "0xf", 0xf)]
    #[case(DisplayMode::Hex, " 0b11 ", 3)]
    #[case(DisplayMode::Real, "-0.25", 0xf)]
    #[case(DisplayMode::Real, "1.3", 5)]
    #[case(DisplayMode::Real, "0.125", 1)]
    #[case(DisplayMode::Real, "-0.125", 0)]
    #[case(DisplayMode::Real, "25e-2", 1)]
    #[case(DisplayMode::Real, "0x1", 4)]
    fn encodes_signed_nibble(#[case] disp: DisplayMode, #[case] text: &str, #[case] raw: u64) {
        let nibble = field(7, 4, true, Some(2));
        assert_eq!(encode_field(&nibble, disp, text), Ok(big(raw)));
    }

    #[rstest]
    #[case(DisplayMode::Decimal, "")]
    #[case(DisplayMode::Decimal, "abc")]
    #[case(DisplayMode::Decimal, "--1")]
    #[case(DisplayMode::Decimal, "- 1")]
    #[case(DisplayMode::Decimal, "1.5")]
    #[case(DisplayMode::Hex, "0x")]
    #[case(DisplayMode::Real, ".")]
    #[case(DisplayMode::Real, "1e")]
    #[case(DisplayMode::Real, "1e99999")]
    #[case(DisplayMode::Real, "nan")]
    fn rejects_non_numbers(#[case] disp: DisplayMode, #[case] text: &str) {
        let nibble = field(7, 4, true, Some(2));
        assert_eq!(
            encode_field(&nibble, disp, text),
            Err(FieldError::Syntax {
                text: text.to_string()
            })
        );
    }

    #[rstest]
    #[case(DisplayMode::Decimal, "-9", 8)]
    #[case(DisplayMode::Decimal, "8", 7)]
    #[case(DisplayMode::Hex, "0x10", 0xf)]
    #[case(DisplayMode::Hex, "-1", 0)]
    #[case(DisplayMode::Real, "2.0", 7)]
    #[case(DisplayMode::Real, "-5", 8)]
    fn clamps_out_of_range(#[case] disp: DisplayMode, #[case] text: &str, #[case] clamped: u64) {
        let nibble = field(7, 4, true, Some(2));
        let error = encode_field(&nibble, disp, text);
        assert_eq!(
            error,
            Err(FieldError::OutOfRange {
                clamped: big(clamped)
            })
        );
        // Formatting the clamp and encoding it again is accepted unchanged.
        let text = decode_field(&nibble, disp, &(big(clamped) << 4_u32));
        assert_eq!(encode_field(&nibble, disp, &text), Ok(big(clamped)));
    }

    #[test]
    fn compose_keeps_previous_bits_for_bad_text() {
        let fields = [field(3, 0, false, None), field(7, 4, false, None)];
        let modes = [DisplayMode::Hex, DisplayMode::Decimal];
        let composed = compose_register_value(&fields, &modes, &["0x5", "junk"], &big(0xa0));
        assert_eq!(composed.value, big(0xa5));
        assert_eq!(
            composed.issues,
            vec![(
                1,
                FieldError::Syntax {
                    text: "junk".to_string()
                }
            )]
        );

        let clamped = compose_register_value(&fields, &modes, &["0x5", "99"], &big(0));
        assert_eq!(clamped.value, big(0xf5));
        assert_eq!(clamped.issues.len(), 1);
    }

    #[test]
    fn overlapping_fields_or_together() {
        let fields = [field(7, 0, false, None), field(11, 4, false, None)];
        let modes = [DisplayMode::Hex, DisplayMode::Hex];
        let composed = compose_register_value(&fields, &modes, &["0x0f", "0x11"], &big(0));
        assert_eq!(composed.value, big(0x11f));
        assert_eq!(
            decompose_register_value(&fields, &modes, &composed.value),
            vec!["0x1f".to_string(), "0x11".to_string()]
        );
    }
}
