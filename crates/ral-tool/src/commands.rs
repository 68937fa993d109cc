use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

use log::{debug, info};
use num_bigint::BigUint;
use ral_core::{
    absolute_address, absolute_address_with, decode_field, encode_path, format_hex,
    load_description, parse_path, parse_uint, resolve_address, AddressMap, FieldError,
    MemoryRegStore, NodeId, RegisterTester, Session,
};
use serde::Serialize;

use crate::error::ToolError;

/// Reads and loads a description file (JSON or `var X = ...;` script).
///
/// # Errors
///
/// Fails when the file cannot be read or the description is rejected.
pub fn load_map(path: &Path) -> Result<AddressMap, ToolError> {
    let text = fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let map = load_description(&text)?;
    info!("loaded {} nodes from {}", map.len(), path.display());
    Ok(map)
}

/// Session with `text` decoded, its indices applied, and its node active.
///
/// Unlike [`Session::open_path`], an invalid path is an error here.
///
/// # Errors
///
/// Fails when the path is malformed or names no node.
pub fn open_path(map: &AddressMap, text: &str) -> Result<Session, ToolError> {
    let decoded = parse_path(map, text).map_err(|source| ToolError::Path {
        text: text.to_string(),
        source,
    })?;
    let mut session = Session::new(map);
    session.navigate_to(map, decoded.id)?;
    session.apply_index_stack(map, decoded.id, &decoded.stack)?;
    Ok(session)
}

fn number(text: &str) -> Result<BigUint, ToolError> {
    parse_uint(text).map_err(|source| ToolError::Number {
        text: text.to_string(),
        source,
    })
}

fn current_path(map: &AddressMap, session: &Session) -> Result<String, ToolError> {
    Ok(encode_path(map, session, session.current(), None)?)
}

/// Canonical path and absolute address of a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
    /// Canonical path with clamped indices.
    pub path: String,
    /// Absolute address as `0x…` text.
    pub address: String,
}

impl fmt::Display for Located {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.path)
    }
}

/// `addr`: absolute address of the node named by `path`.
///
/// # Errors
///
/// Fails when the path does not decode.
pub fn address_of(map: &AddressMap, path: &str) -> Result<Located, ToolError> {
    let session = open_path(map, path)?;
    let address = absolute_address(map, &session, session.current())?;
    Ok(Located {
        path: current_path(map, &session)?,
        address: format_hex(&address),
    })
}

/// `lookup`: deepest node containing `address`, searching `root` or every
/// root in order.
///
/// # Errors
///
/// Fails when the address does not parse, no root contains it, or the map is
/// corrupt.
pub fn lookup(map: &AddressMap, address: &str, root: Option<&str>) -> Result<Located, ToolError> {
    let value = number(address)?;
    let roots = match root {
        Some(name) => vec![map.root_by_name(name).ok_or_else(|| ToolError::UnknownRoot {
            name: name.to_string(),
        })?],
        None => map.roots().to_vec(),
    };

    let session = Session::new(map);
    for root in roots {
        debug!("searching root {root} for {}", format_hex(&value));
        if let Some(found) = resolve_address(map, &session, &value, root)? {
            return Ok(Located {
                path: encode_path(map, &session, found.id, Some(&found.stack))?,
                address: format_hex(&value),
            });
        }
    }
    Err(ToolError::Unmapped {
        address: format_hex(&value),
    })
}

/// One formatted field of a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLine {
    /// Field name.
    pub name: String,
    /// Inclusive most significant bit.
    pub msb: u32,
    /// Inclusive least significant bit.
    pub lsb: u32,
    /// Display mode code.
    pub disp: char,
    /// Formatted value.
    pub text: String,
}

impl fmt::Display for FieldLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msb == self.lsb {
            write!(f, "{}[{}] = {} ({})", self.name, self.lsb, self.text, self.disp)
        } else {
            write!(
                f,
                "{}[{}:{}] = {} ({})",
                self.name, self.msb, self.lsb, self.text, self.disp
            )
        }
    }
}

/// A register value broken into fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterReport {
    /// Canonical register path.
    pub path: String,
    /// Raw register value as `0x…` text.
    pub value: String,
    /// Per-field formatted values.
    pub fields: Vec<FieldLine>,
    /// Per-field rejections, already formatted.
    pub warnings: Vec<String>,
}

impl fmt::Display for RegisterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} = {}", self.path, self.value)?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

fn register_report(
    map: &AddressMap,
    session: &Session,
    value: &BigUint,
    warnings: Vec<String>,
) -> Result<RegisterReport, ToolError> {
    let id = session.current();
    let path = current_path(map, session)?;
    let fields = map
        .node(id)?
        .fields()
        .ok_or_else(|| ToolError::NotARegister { path: path.clone() })?;
    let lines = fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let disp = session.display_mode(id, index)?;
            Ok(FieldLine {
                name: field.name.clone(),
                msb: field.msb,
                lsb: field.lsb,
                disp: disp.code(),
                text: decode_field(field, disp, value),
            })
        })
        .collect::<Result<Vec<_>, ToolError>>()?;
    Ok(RegisterReport {
        path,
        value: format_hex(value),
        fields: lines,
        warnings,
    })
}

/// `decode`: formats every field of `value` for the register at `path`.
///
/// # Errors
///
/// Fails when the path does not decode, names a block, or the value does not
/// parse.
pub fn decode(map: &AddressMap, path: &str, value: &str) -> Result<RegisterReport, ToolError> {
    let session = open_path(map, path)?;
    let value = number(value)?;
    register_report(map, &session, &value, Vec::new())
}

fn field_position(
    map: &AddressMap,
    id: NodeId,
    register: &str,
    name: &str,
) -> Result<usize, ToolError> {
    map.field_index(id, name)?.ok_or_else(|| ToolError::UnknownField {
        register: register.to_string(),
        name: name.to_string(),
    })
}

/// `encode`: composes a register value from reset plus `name=text`
/// assignments, in each field's default display mode.
///
/// Rejected or clamped field text is reported as a warning rather than an
/// error.
///
/// # Errors
///
/// Fails when the path does not decode, names a block, or an assignment is
/// malformed or names an unknown field.
pub fn encode<S: AsRef<str>>(
    map: &AddressMap,
    path: &str,
    assignments: &[S],
) -> Result<RegisterReport, ToolError> {
    let session = open_path(map, path)?;
    let register = current_path(map, &session)?;
    if !map.node(session.current())?.is_register() {
        return Err(ToolError::NotARegister { path: register });
    }

    let store = MemoryRegStore::new();
    let mut tester = RegisterTester::open(map, &session, &store)?;
    let mut warnings = Vec::new();
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let (name, text) = assignment
            .split_once('=')
            .ok_or_else(|| ToolError::Assignment {
                text: assignment.to_string(),
            })?;
        let index = field_position(map, session.current(), &register, name)?;
        match tester.set_field_text(map, &session, index, text)? {
            None => {}
            Some(FieldError::OutOfRange { clamped }) => warnings.push(format!(
                "field {name}: {text:?} out of range, clamped to {}",
                format_hex(&clamped)
            )),
            Some(error) => warnings.push(format!("field {name}: {error}")),
        }
    }
    register_report(map, &session, tester.value(), warnings)
}

/// One node of the `tree` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRow {
    /// Nesting level, 0 for roots.
    pub depth: usize,
    /// Node name with `[extent]` suffixes for arrays.
    pub name: String,
    /// Absolute address of element 0 as `0x…` text.
    pub address: String,
    /// Total span of all elements as `0x…` text.
    pub footprint: String,
    /// Whether the node is a register.
    pub register: bool,
}

impl fmt::Display for TreeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} @ {} +{}",
            "",
            self.name,
            self.address,
            self.footprint,
            indent = self.depth * 2
        )
    }
}

/// `tree`: every node in depth-first order with element-0 addresses.
///
/// # Errors
///
/// Fails only for an internally inconsistent map.
pub fn tree(map: &AddressMap) -> Result<Vec<TreeRow>, ToolError> {
    let session = Session::new(map);
    let mut rows = Vec::with_capacity(map.len());
    let mut pending: Vec<(NodeId, usize)> = map.roots().iter().rev().map(|&id| (id, 0)).collect();
    while let Some((id, depth)) = pending.pop() {
        let node = map.node(id)?;
        let stack: Vec<Vec<u64>> = map
            .path_ids(id)?
            .into_iter()
            .map(|ancestor| {
                map.nodes()[ancestor]
                    .dims()
                    .map_or_else(Vec::new, |dims| vec![0; dims.len()])
            })
            .collect();
        let address = absolute_address_with(map, &session, id, &stack)?;
        let mut name = node.name.clone();
        for extent in node.dims().unwrap_or_default() {
            let _ = write!(name, "[{extent}]");
        }
        rows.push(TreeRow {
            depth,
            name,
            address: format_hex(&address),
            footprint: format_hex(&node.footprint()),
            register: node.is_register(),
        });
        pending.extend(node.children().iter().rev().map(|&child| (child, depth + 1)));
    }
    Ok(rows)
}

/// Renders rows as pretty JSON.
///
/// # Errors
///
/// Propagates serializer failures.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, ToolError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::{address_of, decode, encode, lookup, tree};
    use crate::error::ToolError;
    use ral_core::{load_description, AddressMap};

    const MAP: &str = r#"{"RALIndex": [
        {"parent": null, "children": [1], "name": "PORT", "offset": "100", "size": "20",
         "dims": [5], "stride": "80"},
        {"parent": 0, "children": [], "name": "TFD", "offset": "1c", "size": "4",
         "fields": [{"name": "lo", "lsb": 0, "msb": 3, "reset": "5"},
                    {"name": "hi", "lsb": 4, "msb": 7, "reset": "a", "is_signed": true, "disp": "D"}]}
    ], "RootNodeIds": [0]}"#;

    const NESTED: &str = r#"{"RALIndex": [
        {"parent": null, "children": [1], "name": "soc", "offset": "0", "size": "10000"},
        {"parent": 0, "children": [2], "name": "uart", "offset": "1000", "size": "100",
         "dims": [4], "stride": "100"},
        {"parent": 1, "children": [], "name": "ctrl", "offset": "8", "size": "4",
         "fields": [{"name": "en", "lsb": 0, "msb": 0, "reset": "1"}]},
        {"parent": null, "children": [4], "name": "aux", "offset": "40000000", "size": "1000"},
        {"parent": 3, "children": [5], "name": "ch", "offset": "0", "size": "40",
         "dims": [2, 4], "stride": "100"},
        {"parent": 4, "children": [], "name": "CFG", "offset": "8", "size": "4",
         "fields": [{"name": "lvl", "lsb": 4, "msb": 7, "reset": "3"}]}
    ], "RootNodeIds": [0, 3]}"#;

    fn map() -> AddressMap {
        load_description(MAP).expect("valid description")
    }

    fn nested() -> AddressMap {
        load_description(NESTED).expect("valid description")
    }

    #[test]
    fn address_of_clamps_and_locates() {
        let located = address_of(&map(), "PORT[9].TFD").expect("valid path");
        assert_eq!(located.path, "PORT[4].TFD");
        assert_eq!(located.address, "0x31c");
        assert_eq!(located.to_string(), "0x31c PORT[4].TFD");
    }

    #[test]
    fn address_of_keeps_indices_below_scalar_root() {
        let located = address_of(&nested(), "soc.uart[2].ctrl").expect("valid path");
        assert_eq!(located.path, "soc.uart[2].ctrl");
        assert_eq!(located.address, "0x1208");

        let report = decode(&nested(), "soc.uart[3].ctrl", "1").expect("register");
        assert_eq!(report.path, "soc.uart[3].ctrl");
    }

    #[test]
    fn address_of_keeps_indices_under_second_root() {
        let located = address_of(&nested(), "aux.ch[1][3].CFG").expect("valid path");
        assert_eq!(located.path, "aux.ch[1][3].CFG");
        assert_eq!(located.address, "0x40000708");

        let report = encode(&nested(), "aux.ch[1][2].CFG", &["lvl=5"]).expect("register");
        assert_eq!(report.path, "aux.ch[1][2].CFG");
        assert_eq!(report.value, "0x50");
    }

    #[test]
    fn lookup_reports_instance_path() {
        let located = lookup(&map(), "0x29c", None).expect("mapped");
        assert_eq!(located.path, "PORT[3].TFD");
        assert!(matches!(
            lookup(&map(), "0x130", None),
            Err(ToolError::Unmapped { .. })
        ));
        assert!(matches!(
            lookup(&map(), "0x29c", Some("SOC")),
            Err(ToolError::UnknownRoot { .. })
        ));
    }

    #[test]
    fn decode_lists_fields() {
        let report = decode(&map(), "PORT[1].TFD", "0x8c").expect("register");
        assert_eq!(
            report.to_string(),
            "PORT[1].TFD = 0x8c\n  lo[3:0] = 0xc (H)\n  hi[7:4] = -8 (D)\n"
        );
        assert!(matches!(
            decode(&map(), "PORT", "0"),
            Err(ToolError::NotARegister { .. })
        ));
    }

    #[test]
    fn encode_starts_from_reset_and_warns() {
        let report = encode(&map(), "PORT.TFD", &["hi=3"]).expect("register");
        assert_eq!(report.value, "0x35");
        assert!(report.warnings.is_empty());

        let clamped = encode(&map(), "PORT.TFD", &["lo=0x20", "hi=x"]).expect("register");
        assert_eq!(clamped.value, "0xaf");
        assert_eq!(clamped.warnings.len(), 2);

        assert!(matches!(
            encode(&map(), "PORT.TFD", &["nope=1"]),
            Err(ToolError::UnknownField { .. })
        ));
        assert!(matches!(
            encode(&map(), "PORT.TFD", &["lo"]),
            Err(ToolError::Assignment { .. })
        ));
    }

    #[test]
    fn tree_lists_nodes_depth_first() {
        let rows = tree(&map()).expect("consistent map");
        let lines: Vec<String> = rows.iter().map(ToString::to_string).collect();
        assert_eq!(lines, ["PORT[5] @ 0x100 +0x220", "  TFD @ 0x11c +0x4"]);
    }
}
