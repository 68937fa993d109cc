//! Node and field records of the address-map tree.

use std::cell::OnceCell;
use std::fmt;

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::bigint::{parse_hex, strip_hex_prefix, ParseIntError};

/// Stable node identity: the node's position in the description.
pub type NodeId = usize;

/// Base-16 numeric attribute decoded on first access.
///
/// Descriptions carry offsets, sizes, strides, and reset values as hex text.
/// The text is validated when the cell is built, so decoding cannot fail
/// later and repeated expansion is a no-op.
#[derive(Clone)]
pub struct HexCell {
    text: Box<str>,
    value: OnceCell<BigUint>,
}

impl HexCell {
    /// Validates `text` as hex (optional `0x`) without decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIntError`] when the text is empty or not hexadecimal.
    pub fn parse(text: &str) -> Result<Self, ParseIntError> {
        let digits = strip_hex_prefix(text);
        if digits.is_empty() {
            return Err(ParseIntError::Empty);
        }
        if let Some(digit) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ParseIntError::InvalidDigit { digit, radix: 16 });
        }
        Ok(Self {
            text: digits.into(),
            value: OnceCell::new(),
        })
    }

    /// Builds an already-decoded cell.
    #[must_use]
    pub fn from_value(value: BigUint) -> Self {
        let text = format!("{value:x}").into_boxed_str();
        let cell = OnceCell::new();
        let _ = cell.set(value);
        Self { text, value: cell }
    }

    /// Decoded value, decoding it now if needed.
    pub fn get(&self) -> &BigUint {
        self.value
            .get_or_init(|| parse_hex(&self.text).unwrap_or_default())
    }

    /// Forces decoding. Returns `true` when this call did the work.
    pub fn expand(&self) -> bool {
        if self.is_expanded() {
            return false;
        }
        let _ = self.get();
        true
    }

    /// Whether the value has been decoded.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.value.get().is_some()
    }

    /// Whether the value is zero, answered from the text alone.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.text.bytes().all(|b| b == b'0')
    }

    /// Source hex digits without prefix.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for HexCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.text)
    }
}

impl PartialEq for HexCell {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for HexCell {}

/// How a field's value is shown and entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum DisplayMode {
    /// Unsigned hexadecimal (`0x…`).
    #[default]
    #[serde(rename = "H")]
    Hex,
    /// Decimal; two's-complement signed when the field is signed.
    #[serde(rename = "D")]
    Decimal,
    /// Enumerated; the label lookup is external, the raw value shows as hex.
    #[serde(rename = "E")]
    Enumerated,
    /// Fixed-point real scaled by `2^-fracwidth`.
    #[serde(rename = "R")]
    Real,
}

impl DisplayMode {
    /// Single-letter code used in descriptions and on radix buttons.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Hex => 'H',
            Self::Decimal => 'D',
            Self::Enumerated => 'E',
            Self::Real => 'R',
        }
    }

    /// Converts a single-letter code back into a mode.
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'H' => Some(Self::Hex),
            'D' => Some(Self::Decimal),
            'E' => Some(Self::Enumerated),
            'R' => Some(Self::Real),
            _ => None,
        }
    }

    /// Mode reached by pressing the radix button once.
    ///
    /// Hex goes to decimal; decimal goes to enumerated when the field has an
    /// encoding; decimal or enumerated go to real when the field is
    /// fixed-point; everything else wraps back to hex.
    #[must_use]
    pub const fn next(self, field: &Field) -> Self {
        match self {
            Self::Hex => Self::Decimal,
            Self::Decimal if field.encode => Self::Enumerated,
            Self::Decimal | Self::Enumerated if field.fracwidth.is_some() => Self::Real,
            _ => Self::Hex,
        }
    }

    /// Modes offered for `field`, in cycling order.
    #[must_use]
    pub fn available(field: &Field) -> Vec<Self> {
        let mut modes = vec![Self::Hex, Self::Decimal];
        if field.encode {
            modes.push(Self::Enumerated);
        }
        if field.fracwidth.is_some() {
            modes.push(Self::Real);
        }
        modes
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One bit range of a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Name, unique within the register.
    pub name: String,
    /// Inclusive most significant bit.
    pub msb: u32,
    /// Inclusive least significant bit.
    pub lsb: u32,
    /// Reset value of the field, right-aligned.
    pub reset: HexCell,
    /// Whether decimal and real views use two's complement.
    pub is_signed: bool,
    /// Fractional bits of a fixed-point field.
    pub fracwidth: Option<u32>,
    /// Whether the field has a named enumeration.
    pub encode: bool,
    /// Display mode the session starts in.
    pub default_disp: DisplayMode,
}

impl Field {
    /// Bit width, `msb - lsb + 1`.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }

    /// Decoded reset value.
    pub fn reset(&self) -> &BigUint {
        self.reset.get()
    }
}

/// Array replication of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayShape {
    /// Extents, outermost first; the last dimension varies fastest.
    pub dims: Vec<u64>,
    /// Distance between consecutive elements of the flattened array.
    pub stride: HexCell,
    /// Indices selected when a session starts.
    pub initial_idxs: Vec<u64>,
}

impl ArrayShape {
    /// Number of replicated elements.
    #[must_use]
    pub fn element_count(&self) -> BigUint {
        self.dims
            .iter()
            .fold(BigUint::one(), |count, dim| count * BigUint::from(*dim))
    }
}

/// Node variants: a container of child nodes, or a register with fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Address block or register file.
    Block {
        /// Child ids in ascending address order.
        children: Vec<NodeId>,
    },
    /// Register; has no addressable children.
    Register {
        /// Bit fields in description order.
        fields: Vec<Field>,
    },
}

/// One element of the address-map tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Stable identity.
    pub id: NodeId,
    /// Owning node, `None` for roots.
    pub parent: Option<NodeId>,
    /// Name, unique among siblings.
    pub name: String,
    /// Offset within the parent's frame.
    pub offset: HexCell,
    /// Footprint of a single instance.
    pub size: HexCell,
    /// Replication, when the node is an array.
    pub array: Option<ArrayShape>,
    /// Block or register payload.
    pub kind: NodeKind,
}

impl Node {
    /// Child ids; empty for registers.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Block { children } => children,
            NodeKind::Register { .. } => &[],
        }
    }

    /// Fields when the node is a register.
    #[must_use]
    pub fn fields(&self) -> Option<&[Field]> {
        match &self.kind {
            NodeKind::Register { fields } => Some(fields),
            NodeKind::Block { .. } => None,
        }
    }

    /// Whether the node is a register.
    #[must_use]
    pub const fn is_register(&self) -> bool {
        matches!(self.kind, NodeKind::Register { .. })
    }

    /// Array extents, `None` for scalars.
    #[must_use]
    pub fn dims(&self) -> Option<&[u64]> {
        self.array.as_ref().map(|shape| shape.dims.as_slice())
    }

    /// Decoded offset.
    pub fn offset(&self) -> &BigUint {
        self.offset.get()
    }

    /// Decoded single-instance size.
    pub fn size(&self) -> &BigUint {
        self.size.get()
    }

    /// Decoded array stride.
    pub fn stride(&self) -> Option<&BigUint> {
        self.array.as_ref().map(|shape| shape.stride.get())
    }

    /// Total span of every element: `stride * (elements - 1) + size`.
    #[must_use]
    pub fn footprint(&self) -> BigUint {
        match &self.array {
            Some(shape) => {
                shape.stride.get() * (shape.element_count() - BigUint::one()) + self.size()
            }
            None => self.size().clone(),
        }
    }

    /// Decodes every numeric attribute. Returns `true` if anything was
    /// decoded by this call.
    pub fn expand(&self) -> bool {
        let mut expanded = self.offset.expand();
        expanded |= self.size.expand();
        if let Some(shape) = &self.array {
            expanded |= shape.stride.expand();
        }
        if let Some(fields) = self.fields() {
            for field in fields {
                expanded |= field.reset.expand();
            }
        }
        expanded
    }

    /// Whether every numeric attribute is decoded.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.offset.is_expanded()
            && self.size.is_expanded()
            && self
                .array
                .as_ref()
                .is_none_or(|shape| shape.stride.is_expanded())
            && self
                .fields()
                .is_none_or(|fields| fields.iter().all(|field| field.reset.is_expanded()))
    }
}

#[cfg(test)]
mod tests {
    use super::{ArrayShape, DisplayMode, Field, HexCell, Node, NodeKind};
    use num_bigint::BigUint;

    fn field(encode: bool, fracwidth: Option<u32>) -> Field {
        Field {
            name: "f".to_string(),
            msb: 7,
            lsb: 0,
            reset: HexCell::from_value(BigUint::from(0_u32)),
            is_signed: false,
            fracwidth,
            encode,
            default_disp: DisplayMode::Hex,
        }
    }

    #[test]
    fn hex_cell_decodes_lazily_once() {
        let cell = HexCell::parse("0x1c").expect("valid hex");
        assert!(!cell.is_expanded());
        assert!(cell.expand());
        assert!(cell.is_expanded());
        assert!(!cell.expand());
        assert_eq!(cell.get(), &BigUint::from(0x1c_u32));
    }

    #[test]
    fn hex_cell_rejects_non_hex_text() {
        assert!(HexCell::parse("").is_err());
        assert!(HexCell::parse("0x").is_err());
        assert!(HexCell::parse("12z").is_err());
        assert!(HexCell::parse("000").expect("zero").is_zero());
    }

    #[test]
    fn radix_cycle_follows_field_capabilities() {
        let plain = field(false, None);
        assert_eq!(DisplayMode::Hex.next(&plain), DisplayMode::Decimal);
        assert_eq!(DisplayMode::Decimal.next(&plain), DisplayMode::Hex);

        let enumerated = field(true, None);
        assert_eq!(DisplayMode::Decimal.next(&enumerated), DisplayMode::Enumerated);
        assert_eq!(DisplayMode::Enumerated.next(&enumerated), DisplayMode::Hex);

        let fixed = field(false, Some(4));
        assert_eq!(DisplayMode::Decimal.next(&fixed), DisplayMode::Real);
        assert_eq!(DisplayMode::Real.next(&fixed), DisplayMode::Hex);

        let both = field(true, Some(4));
        assert_eq!(DisplayMode::Enumerated.next(&both), DisplayMode::Real);
        assert_eq!(
            DisplayMode::available(&both),
            vec![
                DisplayMode::Hex,
                DisplayMode::Decimal,
                DisplayMode::Enumerated,
                DisplayMode::Real
            ]
        );
    }

    #[test]
    fn display_codes_roundtrip() {
        for mode in [
            DisplayMode::Hex,
            DisplayMode::Decimal,
            DisplayMode::Enumerated,
            DisplayMode::Real,
        ] {
            assert_eq!(DisplayMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(DisplayMode::from_code('X'), None);
    }

    #[test]
    fn footprint_spans_all_elements() {
        let node = Node {
            id: 0,
            parent: None,
            name: "PORT".to_string(),
            offset: HexCell::from_value(BigUint::from(0x100_u32)),
            size: HexCell::from_value(BigUint::from(0x20_u32)),
            array: Some(ArrayShape {
                dims: vec![5],
                stride: HexCell::from_value(BigUint::from(0x80_u32)),
                initial_idxs: vec![0],
            }),
            kind: NodeKind::Block {
                children: Vec::new(),
            },
        };
        assert_eq!(node.footprint(), BigUint::from(0x80_u32 * 4 + 0x20));
    }
}
