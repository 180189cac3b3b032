//! The symbol-table contract (`spec.md` §6) and a default implementation.
//!
//! Grounded in `rpmspec-rs/src/rpmio/macros.rs`'s `MacroContext { table:
//! BTreeMap<String, Entry>, … }` and `Entry { prev, name, opts, body, func,
//! nargs, flags, level, arena }`: that `Entry` bundles a macro's value with
//! its call-time metadata (arity, tracing) the same way `SymtabEntry` does
//! here, minus the `prev` redefinition-shadow chain, which this crate has no
//! use for since `SymbolValue` already self-describes procedure flags.

use std::collections::HashMap;
use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::value::SymbolValue;

/// One symbol's stored value plus the call-time metadata that lives beside
/// it rather than inside `SymbolValue` (§6: "traced flag", "parameter
/// signature").
#[derive(Clone)]
pub struct SymtabEntry {
	pub value: Rc<SymbolValue>,
	/// §6 "m4trace": whether calls to this symbol print trace lines.
	pub traced: bool,
	/// §4.4 named-parameter fallback: parameter name → 1-based argument
	/// index, consulted when `$name` doesn't parse as `$0`-`$N`.
	pub params: Vec<SmartString>,
}

impl SymtabEntry {
	#[must_use]
	pub fn new(value: SymbolValue) -> Self {
		Self { value: Rc::new(value), traced: false, params: Vec::new() }
	}

	#[must_use]
	pub fn param_index(&self, name: &str) -> Option<usize> {
		self.params.iter().position(|p| p.as_str() == name).map(|i| i + 1)
	}
}

/// §6 symbol-table contract.
pub trait SymbolTable {
	fn lookup(&self, name: &str) -> Option<&SymtabEntry>;
	fn define(&mut self, name: impl Into<SmartString>, value: SymbolValue) -> &mut SymtabEntry;
	fn undefine(&mut self, name: &str) -> bool;
	fn is_traced(&self, name: &str) -> bool;
	fn set_traced(&mut self, name: &str, traced: bool);
	fn set_params(&mut self, name: &str, params: Vec<SmartString>);
}

/// `HashMap`-backed default [`SymbolTable`].
#[derive(Default)]
pub struct DefaultSymbolTable {
	entries: HashMap<SmartString, SymtabEntry>,
}

impl DefaultSymbolTable {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl SymbolTable for DefaultSymbolTable {
	fn lookup(&self, name: &str) -> Option<&SymtabEntry> {
		self.entries.get(name)
	}

	fn define(&mut self, name: impl Into<SmartString>, value: SymbolValue) -> &mut SymtabEntry {
		let name: SmartString = name.into();
		let traced = self.entries.get(name.as_str()).is_some_and(|e| e.traced);
		let entry = self.entries.entry(name).or_insert_with(|| SymtabEntry::new(SymbolValue::Empty));
		entry.value = Rc::new(value);
		entry.traced = traced;
		entry.params.clear();
		entry
	}

	fn undefine(&mut self, name: &str) -> bool {
		self.entries.remove(name).is_some()
	}

	fn is_traced(&self, name: &str) -> bool {
		self.entries.get(name).is_some_and(|e| e.traced)
	}

	fn set_traced(&mut self, name: &str, traced: bool) {
		if let Some(e) = self.entries.get_mut(name) {
			e.traced = traced;
		}
	}

	fn set_params(&mut self, name: &str, params: Vec<SmartString>) {
		if let Some(e) = self.entries.get_mut(name) {
			e.params = params;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn define_then_lookup_round_trips() {
		let mut t = DefaultSymbolTable::new();
		t.define("foo", SymbolValue::text("bar", 1));
		let entry = t.lookup("foo").unwrap();
		match entry.value.as_ref() {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "bar"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn undefine_removes_entry() {
		let mut t = DefaultSymbolTable::new();
		t.define("foo", SymbolValue::text("bar", 1));
		assert!(t.undefine("foo"));
		assert!(t.lookup("foo").is_none());
		assert!(!t.undefine("foo"));
	}

	#[test]
	fn traced_flag_survives_redefinition() {
		let mut t = DefaultSymbolTable::new();
		t.define("foo", SymbolValue::text("1", 1));
		t.set_traced("foo", true);
		t.define("foo", SymbolValue::text("2", 1));
		assert!(t.is_traced("foo"));
	}

	#[test]
	fn param_signature_resolves_name_to_index() {
		let mut t = DefaultSymbolTable::new();
		t.define("foo", SymbolValue::text("body", 1));
		t.set_params("foo", vec!["first".into(), "second".into()]);
		let entry = t.lookup("foo").unwrap();
		assert_eq!(entry.param_index("second"), Some(2));
		assert_eq!(entry.param_index("missing"), None);
	}
}
