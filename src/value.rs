//! The argument-value model: `SymbolValue`, `ChainLink`, `Argv` (`spec.md`
//! §3, §4.5). Accessors that need the per-level arena or the input stack
//! (`arg_text`, `push_arg`, `make_argv_ref`, …) live on [`crate::context::Engine`]
//! instead of here, since they reach outside a single value.

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::arena::SENTINEL_LEVEL;

/// Flags and arity on a `Procedure` value (§3 `SymbolValue::Procedure`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcedureFlags {
	/// "accepts-macro-args": if unset, a procedure argument passed to this
	/// macro is silently coerced to empty text (§7 "Silent coercion").
	pub accepts_macro_args: bool,
	/// "blind-args": a bare word with this symbol, not followed by `(`, is
	/// emitted as literal text instead of being invoked (§4.1, Glossary).
	pub blind_args: bool,
	/// "side-effect-args": if set, argc-violating calls still invoke instead
	/// of being skipped (§4.3 step 9).
	pub side_effect_args: bool,
	pub min_args: usize,
	/// `None` means unbounded.
	pub max_args: Option<usize>,
}

/// A primitive procedure body. Takes the engine (so primitives like
/// `define`/`undefine` can reach the symbol table) and the argv built for
/// its own call, and returns the value to ship to the output.
pub type Builtin = fn(&mut crate::context::Engine, &Argv) -> SymbolValue;

/// `SymbolValue` (§3): the tagged variant an `Argv` slot, or a symbol-table
/// entry, holds.
#[derive(Clone)]
pub enum SymbolValue {
	/// Sentinel for a missing/empty argument.
	Empty,
	/// A literal byte string. May contain embedded NULs; `quote_age` records
	/// the lexer's quote-delimiter generation when this text was produced.
	Text { bytes: SmartString, quote_age: u32 },
	/// A primitive callable.
	Procedure { func: Builtin, name: SmartString, flags: ProcedureFlags },
	/// An ordered chain of `Str`/`ArgvRef` links (§3 `Composite`).
	Composite(Composite),
	/// An unknown primitive referenced by a serialized state file (§9: kept
	/// only for that interop case; this crate never constructs one outside
	/// of its own unit tests, since it has no state serialization).
	Placeholder { name: SmartString },
}

impl SymbolValue {
	#[must_use]
	pub fn text(s: impl Into<SmartString>, quote_age: u32) -> Self {
		Self::Text { bytes: s.into(), quote_age }
	}

	#[must_use]
	pub fn is_empty_value(&self) -> bool {
		match self {
			Self::Empty => true,
			Self::Text { bytes, .. } => bytes.is_empty(),
			Self::Procedure { .. } | Self::Composite(_) | Self::Placeholder { .. } => false,
		}
	}

	#[must_use]
	pub fn is_procedure(&self) -> bool {
		matches!(self, Self::Procedure { .. })
	}

	/// §4.3 step 9 / §7: a procedure value handed to a macro lacking
	/// `accepts-macro-args` is replaced by the empty string.
	#[must_use]
	pub fn coerce_if_blind_to_macro_args(self, groks_macro_args: bool) -> Self {
		if !groks_macro_args && self.is_procedure() {
			Self::Text { bytes: SmartString::new(), quote_age: 0 }
		} else {
			self
		}
	}
}

/// An element of a `Composite` chain (§3 `ChainLink`).
///
/// The C original links these with head/tail pointers to avoid reallocating
/// on append; a `Vec` gives the identical amortized-append behavior in Rust
/// with none of the pointer-chasing, so `Composite` below is a `Vec`, not a
/// linked list (random access during construction is never needed — §9
/// "Composite chain representation").
#[derive(Clone)]
pub enum ChainLink {
	/// A slice owned by the arena at `level`. `level == SENTINEL_LEVEL` means
	/// "not arena-owned, do not adjust refcount" (string literals baked into
	/// a macro body, for instance).
	Str { level: usize, offset: usize, len: usize, quote_age: u32 },
	/// A `$@`/`$*`-style back-reference into an earlier Argv.
	ArgvRef { argv: Rc<Argv>, start_index: usize, flatten: bool, quote_age: u32 },
}

impl ChainLink {
	#[must_use]
	pub fn quote_age(&self) -> u32 {
		match self {
			Self::Str { quote_age, .. } | Self::ArgvRef { quote_age, .. } => *quote_age,
		}
	}
}

#[derive(Clone, Default)]
pub struct Composite(pub Vec<ChainLink>);

impl Composite {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, link: ChainLink) {
		self.0.push(link);
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// `Argv` (§3): one macro call's collected arguments.
pub struct Argv {
	/// One greater than the user-visible argument count; slot 0 is the
	/// macro name.
	pub argc: usize,
	/// The macro name at call time (§3 invariant: independent of later
	/// symbol redefinition).
	pub argv0: SmartString,
	/// Physical argument slots. May number fewer than `argc - 1` when a slot
	/// is an `ArgvRef` expanding into many user-visible arguments.
	pub array: Vec<Rc<SymbolValue>>,
	/// 0 if any contained argument has heterogeneous quoting; otherwise a
	/// cache key meaning "no delimiter-dependent reparsing needed".
	pub quote_age: u32,
	/// Set when any argument has been re-pushed into the input (§4.5
	/// `push_arg`).
	pub in_use: std::cell::Cell<bool>,
	/// Contains at least one `Composite` value.
	pub has_ref: bool,
	/// True when this Argv is a thin redirection built by `make_argv_ref`;
	/// if so, `array.len() == 1` and `array[0]` is a `Composite` whose single
	/// link is an `ArgvRef` (§3 invariant).
	pub wrapper: bool,
}

impl Argv {
	#[must_use]
	pub fn new(argv0: impl Into<SmartString>) -> Self {
		Self { argc: 1, argv0: argv0.into(), array: Vec::new(), quote_age: 0, in_use: std::cell::Cell::new(false), has_ref: false, wrapper: false }
	}

	#[must_use]
	pub fn argc(&self) -> usize {
		self.argc
	}

	/// §4.5 `arg_symbol`: resolve user-visible argument `i` (1-based; `i==0`
	/// is the macro name) to the `SymbolValue` that provides it.
	///
	/// For non-wrappers this is direct indexing; for a wrapper, this walks
	/// its single `ArgvRef` chain link, recursing into the referenced Argv.
	/// Arena-backed `Str` materialization (turning a `ChainLink` into actual
	/// bytes) needs the arena table and lives on `Engine::arg_text` instead.
	#[must_use]
	pub fn arg_symbol(&self, i: usize) -> Option<Rc<SymbolValue>> {
		if i == 0 {
			return Some(Rc::new(SymbolValue::text(self.argv0.clone(), 0)));
		}
		if !self.wrapper {
			return self.array.get(i - 1).cloned();
		}
		let Some(slot) = self.array.first() else { return None };
		let SymbolValue::Composite(chain) = slot.as_ref() else {
			return self.array.get(i - 1).cloned();
		};
		let mut consumed = 0usize;
		for link in &chain.0 {
			let ChainLink::ArgvRef { argv, start_index, flatten, .. } = link else {
				// A wrapper's sole link must be an ArgvRef per the invariant;
				// tolerate a stray Str link defensively by treating it as a
				// single consumed slot.
				consumed += 1;
				if i - 1 < consumed {
					return Some(slot.clone());
				}
				continue;
			};
			let referenced_len = argv.argc().saturating_sub(*start_index);
			if i - 1 < consumed + referenced_len {
				let inner_index = (i - 1 - consumed) + start_index;
				let resolved = argv.arg_symbol(inner_index)?;
				if *flatten && resolved.is_procedure() {
					return Some(Rc::new(SymbolValue::Empty));
				}
				return Some(resolved);
			}
			consumed += referenced_len;
		}
		None
	}

	#[must_use]
	pub fn arg_func(&self, i: usize) -> Option<Rc<SymbolValue>> {
		self.arg_symbol(i).filter(|v| v.is_procedure())
	}

	#[must_use]
	pub fn arg_empty(&self, i: usize) -> bool {
		self.arg_symbol(i).map_or(true, |v| v.is_empty_value())
	}
}

#[must_use]
pub fn sentinel_level() -> usize {
	SENTINEL_LEVEL
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn argv_slot_zero_is_always_the_macro_name() {
		let argv = Argv::new("foo");
		let v = argv.arg_symbol(0).unwrap();
		match v.as_ref() {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "foo"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn wrapper_resolves_through_argvref() {
		let mut inner = Argv::new("q");
		inner.argc = 3;
		inner.array.push(Rc::new(SymbolValue::text("a", 1)));
		inner.array.push(Rc::new(SymbolValue::text("b", 1)));
		let inner = Rc::new(inner);

		let mut wrapper = Argv::new("pass");
		wrapper.wrapper = true;
		wrapper.argc = 3;
		let mut chain = Composite::new();
		chain.push(ChainLink::ArgvRef { argv: inner.clone(), start_index: 1, flatten: false, quote_age: 1 });
		wrapper.array.push(Rc::new(SymbolValue::Composite(chain)));

		let first = wrapper.arg_symbol(1).unwrap();
		match first.as_ref() {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "a"),
			_ => panic!("expected text"),
		}
		let second = wrapper.arg_symbol(2).unwrap();
		match second.as_ref() {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "b"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn flatten_turns_procedure_into_empty() {
		let func: Builtin = |_engine, _argv| SymbolValue::Empty;
		let mut inner = Argv::new("q");
		inner.argc = 2;
		inner.array.push(Rc::new(SymbolValue::Procedure { func, name: "p".into(), flags: ProcedureFlags::default() }));
		let inner = Rc::new(inner);

		let mut wrapper = Argv::new("pass");
		wrapper.wrapper = true;
		wrapper.argc = 2;
		let mut chain = Composite::new();
		chain.push(ChainLink::ArgvRef { argv: inner, start_index: 1, flatten: true, quote_age: 1 });
		wrapper.array.push(Rc::new(SymbolValue::Composite(chain)));

		let v = wrapper.arg_symbol(1).unwrap();
		assert!(v.is_empty_value());
	}
}
