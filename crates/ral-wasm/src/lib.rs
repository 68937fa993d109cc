use ral_core::{
    absolute_address, encode_path, format_hex, load_description, parse_uint, resolve_address,
    AddressMap, DisplayMode, MemoryRegStore, NodeId, RegisterTester, Session,
};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

macro_rules! console_log {
    ($($t:tt)*) => (web_sys::console::log_1(&format!($($t)*).into()))
}

/// JS-compatible result of opening a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmOpened {
    pub id: NodeId,
    pub path: String,
    pub discarded: bool,
}

/// JS-compatible node instance found by address lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmLocated {
    pub id: NodeId,
    pub path: String,
    pub stack: Vec<Vec<u64>>,
}

/// JS-compatible view of one field of the register tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmFieldView {
    pub name: String,
    pub msb: u32,
    pub lsb: u32,
    pub disp: String,
    pub modes: Vec<String>,
    pub text: String,
    pub valid: bool,
}

/// JS-compatible view of the register tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmRegisterView {
    pub id: NodeId,
    pub key: String,
    pub value: String,
    pub value_valid: bool,
    pub fields: Vec<WasmFieldView>,
}

/// Builds the tester snapshot handed to the page.
///
/// # Errors
///
/// Fails when the tester's register is not part of `map`.
pub fn register_view(
    map: &AddressMap,
    session: &Session,
    tester: &RegisterTester,
) -> Result<WasmRegisterView, ral_core::RalError> {
    let id = tester.id();
    let fields = map
        .node(id)?
        .fields()
        .ok_or(ral_core::RalError::NotARegister { id })?;
    let mut views = Vec::with_capacity(fields.len());
    for (index, (field, text)) in fields.iter().zip(tester.field_texts()).enumerate() {
        let disp = session.display_mode(id, index)?;
        views.push(WasmFieldView {
            name: field.name.clone(),
            msb: field.msb,
            lsb: field.lsb,
            disp: disp.to_string(),
            modes: DisplayMode::available(field)
                .iter()
                .map(ToString::to_string)
                .collect(),
            text: text.clone(),
            valid: tester.is_field_valid(index),
        });
    }
    Ok(WasmRegisterView {
        id,
        key: tester.key().to_string(),
        value: tester.value_text().to_string(),
        value_valid: tester.is_value_valid(),
        fields: views,
    })
}

#[wasm_bindgen]
pub struct WasmRal {
    map: AddressMap,
    session: Session,
    store: MemoryRegStore,
    tester: Option<RegisterTester>,
}

#[wasm_bindgen]
impl WasmRal {
    /// Loads a JSON or `data.js`-style description.
    #[wasm_bindgen(constructor)]
    pub fn new(description: &str) -> Result<Self, JsError> {
        console_error_panic_hook::set_once();
        let map = load_description(description)?;
        let session = Session::new(&map);
        console_log!("Loaded {} RAL nodes", map.len());
        Ok(Self {
            map,
            session,
            store: MemoryRegStore::new(),
            tester: None,
        })
    }

    /// Page title from the description.
    pub fn title(&self) -> Option<String> {
        self.map.title().map(str::to_string)
    }

    /// Names of every root, in description order.
    pub fn root_names(&self) -> js_sys::Array {
        self.map
            .roots()
            .iter()
            .map(|&id| JsValue::from_str(&self.map.nodes()[id].name))
            .collect()
    }

    /// Active node id.
    pub fn current(&self) -> NodeId {
        self.session.current()
    }

    /// Decodes every node attribute not yet decoded. Returns how many nodes
    /// this call touched.
    pub fn expand_all(&self) -> usize {
        self.map.expand_all()
    }

    /// Opens a path, falling back to the first root when it is invalid.
    /// Returns `{ id, path, discarded }`.
    pub fn open_path(&mut self, path: &str) -> Result<JsValue, JsError> {
        self.close_register();
        let opened = self.session.open_path(&self.map, path)?;
        if opened.discarded {
            console_log!("Discarded invalid path {path:?}");
        }
        let opened = WasmOpened {
            id: opened.id,
            path: opened.path,
            discarded: opened.discarded,
        };
        Ok(serde_wasm_bindgen::to_value(&opened)?)
    }

    /// Makes `id` active, restarting indices entered below the common
    /// ancestor with the previous node.
    pub fn navigate_to(&mut self, id: NodeId) -> Result<(), JsError> {
        self.close_register();
        self.session.navigate_to(&self.map, id)?;
        Ok(())
    }

    /// Sets one array index of `id`, clamped. Returns the stored value.
    pub fn set_index(&mut self, id: NodeId, dim: usize, value: u64) -> Result<u64, JsError> {
        self.close_register();
        Ok(self.session.set_index(&self.map, id, dim, value)?)
    }

    /// Canonical path of the active node.
    pub fn current_path(&self) -> Result<String, JsError> {
        Ok(encode_path(
            &self.map,
            &self.session,
            self.session.current(),
            None,
        )?)
    }

    /// Absolute address of `id` as `0x…` text.
    pub fn absolute_address(&self, id: NodeId) -> Result<String, JsError> {
        Ok(format_hex(&absolute_address(&self.map, &self.session, id)?))
    }

    /// Deepest node under root `root` containing `address`, or `null`.
    pub fn lookup(&self, address: &str, root: NodeId) -> Result<JsValue, JsError> {
        let address = parse_uint(address)?;
        let Some(found) = resolve_address(&self.map, &self.session, &address, root)? else {
            return Ok(JsValue::NULL);
        };
        let path = encode_path(&self.map, &self.session, found.id, Some(&found.stack))?;
        let located = WasmLocated {
            id: found.id,
            path,
            stack: found.stack,
        };
        Ok(serde_wasm_bindgen::to_value(&located)?)
    }

    /// Opens the register tester on the active register, restoring any
    /// saved value. Returns the tester view.
    pub fn open_register(&mut self) -> Result<JsValue, JsError> {
        let tester = RegisterTester::open(&self.map, &self.session, &self.store)?;
        self.tester = Some(tester);
        self.register_view()
    }

    /// Current tester view, or `null` when no register is open.
    pub fn register_view(&self) -> Result<JsValue, JsError> {
        let Some(tester) = &self.tester else {
            return Ok(JsValue::NULL);
        };
        let view = register_view(&self.map, &self.session, tester)?;
        Ok(serde_wasm_bindgen::to_value(&view)?)
    }

    /// Replaces the register value from text. Returns whether it parsed.
    pub fn set_register_text(&mut self, text: &str) -> Result<bool, JsError> {
        let tester = open_tester(&mut self.tester)?;
        let accepted = tester.set_register_text(&self.map, &self.session, text)?;
        if accepted {
            tester.save(&mut self.store);
        }
        Ok(accepted)
    }

    /// Replaces one field's text. Returns the rejection message, if any.
    pub fn set_field_text(&mut self, index: usize, text: &str) -> Result<Option<String>, JsError> {
        let tester = open_tester(&mut self.tester)?;
        let issue = tester.set_field_text(&self.map, &self.session, index, text)?;
        tester.save(&mut self.store);
        Ok(issue.map(|issue| issue.to_string()))
    }

    /// Advances one field's display mode. Returns the new mode code.
    pub fn cycle_display_mode(&mut self, index: usize) -> Result<String, JsError> {
        let tester = open_tester(&mut self.tester)?;
        let disp = tester.cycle_display_mode(&self.map, &mut self.session, index)?;
        Ok(disp.to_string())
    }

    /// Restores every field to its reset value.
    pub fn reset_register(&mut self) -> Result<(), JsError> {
        let tester = open_tester(&mut self.tester)?;
        tester.reset(&self.map, &self.session)?;
        tester.save(&mut self.store);
        Ok(())
    }
}

fn open_tester(tester: &mut Option<RegisterTester>) -> Result<&mut RegisterTester, JsError> {
    tester
        .as_mut()
        .ok_or_else(|| JsError::new("no register is open"))
}

impl WasmRal {
    fn close_register(&mut self) {
        self.tester = None;
    }
}

#[cfg(test)]
mod tests {
    use super::register_view;
    use ral_core::{load_description, MemoryRegStore, RegisterTester, Session};

    const MAP: &str = r#"{"RALIndex": [
        {"parent": null, "children": [1], "name": "PORT", "offset": "100", "size": "20",
         "dims": [5], "stride": "80"},
        {"parent": 0, "children": [], "name": "TFD", "offset": "1c", "size": "4",
         "fields": [{"name": "lo", "lsb": 0, "msb": 3, "reset": "5"},
                    {"name": "gain", "lsb": 4, "msb": 7, "reset": "8", "fracwidth": 2,
                     "is_signed": true, "disp": "R"}]}
    ], "RootNodeIds": [0]}"#;

    #[test]
    fn register_view_reports_modes_and_texts() {
        let map = load_description(MAP).expect("valid description");
        let mut session = Session::new(&map);
        session.open_path(&map, "PORT[2].TFD").expect("opens");
        let tester =
            RegisterTester::open(&map, &session, &MemoryRegStore::new()).expect("register");

        let view = register_view(&map, &session, &tester).expect("register view");
        assert_eq!(view.key, "21c");
        assert_eq!(view.value, "0x85");
        assert_eq!(view.fields[0].text, "0x5");
        assert_eq!(view.fields[1].text, "-2.0");
        assert_eq!(view.fields[1].disp, "R");
        assert_eq!(view.fields[1].modes, ["H", "D", "R"]);

        let json = serde_json::to_value(&view).expect("serializes");
        assert_eq!(json["fields"][0]["name"], "lo");
    }
}
