//! Register value editor for the active register.
//!
//! The tester keeps one raw register value and one text per field in sync:
//! editing the register text re-renders every field, editing a field
//! recomposes the register. Values can be stashed per absolute address
//! through a [`RegStateStore`].

use std::collections::HashMap;

use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::bigint::{format_hex, parse_uint};
use crate::field::{compose_register_value, decode_field, format_field_value, FieldError};
use crate::index::{AddressMap, DisplayMode, Field, NodeId};
use crate::resolve::absolute_address;
use crate::session::Session;
use crate::RalError;

/// Saved editor state of one register instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegState {
    /// Raw register value.
    #[serde(with = "crate::bigint::hex_serde")]
    pub value: BigUint,
}

/// Key-value hook for per-address register state.
pub trait RegStateStore {
    /// Stores `state` under `key`, replacing any previous entry.
    fn save(&mut self, key: &str, state: RegState);

    /// State previously saved under `key`.
    fn load(&self, key: &str) -> Option<RegState>;
}

/// In-memory [`RegStateStore`] that lives as long as the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegStore {
    entries: HashMap<String, RegState>,
}

impl MemoryRegStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegStateStore for MemoryRegStore {
    fn save(&mut self, key: &str, state: RegState) {
        self.entries.insert(key.to_string(), state);
    }

    fn load(&self, key: &str) -> Option<RegState> {
        self.entries.get(key).cloned()
    }
}

/// Store key for a register at `address`: lowercase hex, no prefix.
#[must_use]
pub fn state_key(address: &BigUint) -> String {
    format!("{address:x}")
}

/// Editor state for one register instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTester {
    id: NodeId,
    key: String,
    value: BigUint,
    value_text: String,
    value_valid: bool,
    field_texts: Vec<String>,
    field_valid: Vec<bool>,
}

fn register_fields(map: &AddressMap, id: NodeId) -> Result<&[Field], RalError> {
    map.node(id)?.fields().ok_or(RalError::NotARegister { id })
}

impl RegisterTester {
    /// Opens the session's active register, restoring saved state when the
    /// store has an entry for its address.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::NotARegister`] when the active node is a block.
    pub fn open(
        map: &AddressMap,
        session: &Session,
        store: &dyn RegStateStore,
    ) -> Result<Self, RalError> {
        let id = session.current();
        let fields = register_fields(map, id)?;
        let key = state_key(&absolute_address(map, session, id)?);
        let mut tester = Self {
            id,
            key,
            value: BigUint::default(),
            value_text: String::new(),
            value_valid: true,
            field_texts: vec![String::new(); fields.len()],
            field_valid: vec![true; fields.len()],
        };
        tester.restore(map, session, store)?;
        Ok(tester)
    }

    /// Reloads saved state for this register, or resets when there is none.
    ///
    /// # Errors
    ///
    /// Fails when the register no longer exists in `map`.
    pub fn restore(
        &mut self,
        map: &AddressMap,
        session: &Session,
        store: &dyn RegStateStore,
    ) -> Result<(), RalError> {
        match store.load(&self.key) {
            Some(state) => {
                debug!("restoring register {} from key {}", self.id, self.key);
                self.set_value(map, session, state.value)
            }
            None => self.reset(map, session),
        }
    }

    /// Loads every field's reset value and recomposes the register.
    ///
    /// # Errors
    ///
    /// Fails when the register no longer exists in `map`.
    pub fn reset(&mut self, map: &AddressMap, session: &Session) -> Result<(), RalError> {
        let fields = register_fields(map, self.id)?;
        let modes = session.register_modes(self.id)?;
        for (index, field) in fields.iter().enumerate() {
            let disp = modes.get(index).copied().unwrap_or(field.default_disp);
            self.field_texts[index] = format_field_value(field, disp, field.reset());
        }
        self.recompose(map, session)
    }

    /// Replaces the register value from text and re-renders every field.
    ///
    /// Returns `false` and leaves the fields alone when the text is not an
    /// unsigned integer.
    ///
    /// # Errors
    ///
    /// Fails when the register no longer exists in `map`.
    pub fn set_register_text(
        &mut self,
        map: &AddressMap,
        session: &Session,
        text: &str,
    ) -> Result<bool, RalError> {
        if let Ok(value) = parse_uint(text) {
            self.set_value(map, session, value)?;
            Ok(true)
        } else {
            self.value_text = text.to_string();
            self.value_valid = false;
            Ok(false)
        }
    }

    /// Replaces one field's text and recomposes the register.
    ///
    /// A syntax error marks the field invalid and leaves the register value
    /// unchanged. A range error marks it invalid and uses the clamped value.
    ///
    /// # Errors
    ///
    /// Fails for a missing field.
    pub fn set_field_text(
        &mut self,
        map: &AddressMap,
        session: &Session,
        index: usize,
        text: &str,
    ) -> Result<Option<FieldError>, RalError> {
        if index >= self.field_texts.len() {
            return Err(RalError::UnknownField { id: self.id, index });
        }
        self.field_texts[index] = text.to_string();
        self.recompose(map, session)?;
        self.field_issue(map, session, index)
    }

    /// Advances one field's display mode and re-renders it from the register
    /// value.
    ///
    /// # Errors
    ///
    /// Fails for a missing field.
    pub fn cycle_display_mode(
        &mut self,
        map: &AddressMap,
        session: &mut Session,
        index: usize,
    ) -> Result<DisplayMode, RalError> {
        let disp = session.cycle_display_mode(map, self.id, index)?;
        self.render_field(map, session, index)?;
        Ok(disp)
    }

    /// Saves the register value under this register's address key.
    pub fn save(&self, store: &mut dyn RegStateStore) {
        store.save(
            &self.key,
            RegState {
                value: self.value.clone(),
            },
        );
    }

    /// Register being edited.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Store key of this register instance.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last valid register value.
    #[must_use]
    pub const fn value(&self) -> &BigUint {
        &self.value
    }

    /// Register text as shown.
    #[must_use]
    pub fn value_text(&self) -> &str {
        &self.value_text
    }

    /// Whether the register text parsed.
    #[must_use]
    pub const fn is_value_valid(&self) -> bool {
        self.value_valid
    }

    /// Field texts as shown.
    #[must_use]
    pub fn field_texts(&self) -> &[String] {
        &self.field_texts
    }

    /// Whether field `index` holds acceptable text.
    #[must_use]
    pub fn is_field_valid(&self, index: usize) -> bool {
        self.field_valid.get(index).copied().unwrap_or(false)
    }

    fn set_value(
        &mut self,
        map: &AddressMap,
        session: &Session,
        value: BigUint,
    ) -> Result<(), RalError> {
        self.value_text = format_hex(&value);
        self.value_valid = true;
        self.value = value;
        for index in 0..self.field_texts.len() {
            self.render_field(map, session, index)?;
        }
        Ok(())
    }

    fn render_field(
        &mut self,
        map: &AddressMap,
        session: &Session,
        index: usize,
    ) -> Result<(), RalError> {
        let fields = register_fields(map, self.id)?;
        let field = fields
            .get(index)
            .ok_or(RalError::UnknownField { id: self.id, index })?;
        let disp = session.display_mode(self.id, index)?;
        self.field_texts[index] = decode_field(field, disp, &self.value);
        self.field_valid[index] = true;
        Ok(())
    }

    fn field_issue(
        &self,
        map: &AddressMap,
        session: &Session,
        index: usize,
    ) -> Result<Option<FieldError>, RalError> {
        let field = register_fields(map, self.id)?
            .get(index)
            .ok_or(RalError::UnknownField { id: self.id, index })?;
        let disp = session.display_mode(self.id, index)?;
        Ok(crate::field::encode_field(field, disp, &self.field_texts[index]).err())
    }

    fn recompose(&mut self, map: &AddressMap, session: &Session) -> Result<(), RalError> {
        let fields = register_fields(map, self.id)?;
        let modes = session.register_modes(self.id)?;
        let composed = compose_register_value(fields, modes, &self.field_texts, &self.value);
        self.field_valid.iter_mut().for_each(|valid| *valid = true);
        for (index, _) in &composed.issues {
            self.field_valid[*index] = false;
        }
        self.value_text = format_hex(&composed.value);
        self.value_valid = true;
        self.value = composed.value;
        Ok(())
    }
}
