//! The engine context: owns the arena table, symbol table, lexer and input
//! stack, and the handful of accessors in `spec.md` §4.5 that need more than
//! one of those pieces at once.
//!
//! Grounded in `rpmspec-rs/src/rpmio/macros.rs`'s `MacroContext`, which plays
//! the same "everything a call needs to reach" role; unlike that struct this
//! one is not wrapped in `Arc<Mutex<_>>` (§5: the engine is single-threaded
//! cooperative, and the teacher's locking existed only to satisfy an `rlua`
//! callback trait bound that has no counterpart here).

use std::rc::Rc;

use smartstring::alias::String as SmartString;
use tracing::warn;

use crate::arena::{ArenaTable, SENTINEL_LEVEL};
use crate::config::EngineOptions;
use crate::error::{EngineError, Result};
use crate::input_stack::{DefaultInputStack, InputStack};
use crate::lexer::{DefaultLexer, Lexer};
use crate::symtab::{DefaultSymbolTable, SymbolTable};
use crate::trace::TraceFormatter;
use crate::value::{Argv, ChainLink, Composite, ProcedureFlags, SymbolValue};

pub struct Engine {
	pub options: EngineOptions,
	pub lexer: DefaultLexer,
	pub input: DefaultInputStack,
	pub symtab: DefaultSymbolTable,
	pub arena: ArenaTable,
	/// §3/§9: the per-depth arena index; also checked against
	/// `options.nesting_limit` at §4.3 step 4.
	pub expansion_level: usize,
	pub trace: TraceFormatter,
	/// Monotonic id handed out to each traced call, matching GNU m4's trace
	/// output numbering the driver reproduces (`spec.md` §7, `trace.rs`).
	next_call_id: usize,
	/// Formatted `m4trace:` lines emitted so far, in emission order. Plain
	/// accumulation buffer: nothing reads it back mid-run, only a caller
	/// inspecting trace output after the fact (or a test).
	pub trace_log: Vec<String>,
}

impl Engine {
	#[must_use]
	pub fn new(initial_input: &str, options: EngineOptions) -> Self {
		let trace = TraceFormatter::new(&options);
		let mut engine = Self {
			options,
			lexer: DefaultLexer::new(),
			input: DefaultInputStack::new(initial_input),
			symtab: DefaultSymbolTable::new(),
			arena: ArenaTable::new(),
			expansion_level: 0,
			trace,
			next_call_id: 0,
			trace_log: Vec::new(),
		};
		engine.register_builtins();
		engine
	}

	/// §B.7: a minimal primitive set, just enough to exercise `spec.md` §8's
	/// scenarios end to end. Real primitive procedures are out of this
	/// crate's scope (§1); these exist only so the engine is runnable.
	fn register_builtins(&mut self) {
		let define_flags = ProcedureFlags { accepts_macro_args: false, blind_args: false, side_effect_args: true, min_args: 2, max_args: Some(2) };
		self.symtab.define("define", SymbolValue::Procedure { func: builtin_define, name: "define".into(), flags: define_flags });

		let undefine_flags = ProcedureFlags { accepts_macro_args: false, blind_args: false, side_effect_args: true, min_args: 1, max_args: Some(1) };
		self.symtab.define("undefine", SymbolValue::Procedure { func: builtin_undefine, name: "undefine".into(), flags: undefine_flags });

		// Not blind-args: unlike `spec.md` §8 scenario 5's `blind` example,
		// `dnl` must fire on a bare word with no following `(` (scenario 1).
		let dnl_flags = ProcedureFlags { accepts_macro_args: false, blind_args: false, side_effect_args: true, min_args: 0, max_args: Some(0) };
		self.symtab.define("dnl", SymbolValue::Procedure { func: builtin_dnl, name: "dnl".into(), flags: dnl_flags });

		let ifelse_flags = ProcedureFlags { accepts_macro_args: false, blind_args: false, side_effect_args: true, min_args: 0, max_args: None };
		self.symtab.define("ifelse", SymbolValue::Procedure { func: builtin_ifelse, name: "ifelse".into(), flags: ifelse_flags });

		// `defn` hands back a symbol's raw stored value, Procedure-ness and
		// all -- unlike a plain `$1` substitution, which always goes through
		// text. Needed to hand a `Procedure` value to `shift` below.
		let defn_flags = ProcedureFlags { accepts_macro_args: false, blind_args: false, side_effect_args: true, min_args: 1, max_args: Some(1) };
		self.symtab.define("defn", SymbolValue::Procedure { func: builtin_defn, name: "defn".into(), flags: defn_flags });

		// `shift` drops its first argument and pushes the rest back,
		// comma-joined, for rescanning. `accepts_macro_args` is load-bearing:
		// without it, a `Procedure`-valued argument (from `defn`) would be
		// silently coerced to empty text during collection (§7) before
		// `shift` ever saw it.
		let shift_flags = ProcedureFlags { accepts_macro_args: true, blind_args: false, side_effect_args: true, min_args: 0, max_args: None };
		self.symtab.define("shift", SymbolValue::Procedure { func: builtin_shift, name: "shift".into(), flags: shift_flags });
	}

	/// Turn a `SymbolValue` into its textual rendering, recursively resolving
	/// `Composite` chains through the arena and through referenced argvs.
	/// §4.5: "composite chains are materialized on demand into the current
	/// level's scratch arena for `arg_text`" — here the "scratch arena" is
	/// just a local `String`, since Rust ownership makes the bump-arena
	/// detour unnecessary once the bytes are going straight into an owned
	/// buffer the caller already owns (see `DESIGN.md` "Text ownership").
	#[must_use]
	pub fn materialize(&self, value: &SymbolValue) -> SmartString {
		match value {
			SymbolValue::Empty => SmartString::new(),
			SymbolValue::Text { bytes, .. } => bytes.clone(),
			SymbolValue::Procedure { .. } | SymbolValue::Placeholder { .. } => SmartString::new(),
			SymbolValue::Composite(chain) => {
				let mut out = SmartString::new();
				for link in &chain.0 {
					match link {
						ChainLink::Str { level, offset, len, .. } => {
							out.push_str(&String::from_utf8_lossy(self.arena.slice(*level, *offset, *len)));
						}
						ChainLink::ArgvRef { argv, start_index, flatten, .. } => {
							// §4.4 "joined by `,`": `push_composite`'s ArgvRef branch
							// below inserts the same separator between resolved
							// elements; the two flattening paths must agree on
							// comma-joining regardless of which one resolves a
							// given `$@`/argv-wrapper composite.
							let mut emitted = false;
							for i in *start_index..argv.argc() {
								let Some(resolved) = argv.arg_symbol(i) else { continue };
								if *flatten && resolved.is_procedure() {
									continue;
								}
								if emitted {
									out.push(',');
								}
								out.push_str(&self.materialize(&resolved));
								emitted = true;
							}
						}
					}
				}
				out
			}
		}
	}

	/// §4.5 `arg_text`.
	#[must_use]
	pub fn arg_text(&self, argv: &Argv, i: usize) -> SmartString {
		argv.arg_symbol(i).map_or_else(SmartString::new, |v| self.materialize(&v))
	}

	#[must_use]
	pub fn arg_len(&self, argv: &Argv, i: usize) -> usize {
		self.arg_text(argv, i).len()
	}

	#[must_use]
	pub fn arg_equal(&self, a: &Argv, ai: usize, b: &Argv, bi: usize) -> bool {
		self.arg_text(a, ai) == self.arg_text(b, bi)
	}

	#[must_use]
	pub fn arg_argc(argv: &Argv) -> usize {
		argv.argc()
	}

	/// §4.5 `make_argv_ref`: build a thin wrapper Argv whose sole slot
	/// back-references `argv` starting at user-visible index `skip + 1`.
	#[must_use]
	pub fn make_argv_ref(argv: &Rc<Argv>, name: impl Into<SmartString>, skip: usize, flatten: bool) -> Argv {
		let mut wrapper = Argv::new(name);
		wrapper.wrapper = true;
		wrapper.has_ref = true;
		wrapper.quote_age = argv.quote_age;
		let remaining = argv.argc().saturating_sub(skip + 1);
		wrapper.argc = 1 + remaining;
		let mut chain = Composite::new();
		chain.push(ChainLink::ArgvRef { argv: Rc::clone(argv), start_index: skip + 1, flatten, quote_age: argv.quote_age });
		wrapper.array.push(Rc::new(SymbolValue::Composite(chain)));
		wrapper
	}

	/// §4.5 `push_arg`: push argument `i` back onto the input stack so it
	/// re-enters the dispatcher. Plain text is spliced into the pending
	/// input buffer; a `Procedure` or `Composite` value is pushed whole (via
	/// [`InputStack::push_value`]) so a later rescan still observes it as a
	/// `MacDef` token rather than flattened text (§8 property 7).
	pub fn push_arg(&mut self, argv: &Argv, i: usize) {
		let Some(v) = argv.arg_symbol(i) else { return };
		match v.as_ref() {
			SymbolValue::Empty => {}
			SymbolValue::Text { bytes, .. } => {
				let buf = self.input.push_string_init();
				buf.push_str(bytes);
				self.input.push_string_finish();
			}
			SymbolValue::Composite(chain) => {
				self.push_composite(chain);
				argv.in_use.set(true);
			}
			SymbolValue::Procedure { .. } | SymbolValue::Placeholder { .. } => {
				self.input.push_value(v);
				argv.in_use.set(true);
			}
		}
	}

	/// Push a composite chain link-by-link, preserving `ArgvRef`-referenced
	/// procedure values as whole tokens instead of stringifying them.
	fn push_composite(&mut self, chain: &Composite) {
		// Buffer consecutive text fragments; flush before/after a value push
		// so ordering in the rescanned stream matches source order. Since
		// the input stack is a LIFO, links must be pushed in reverse.
		let mut pending_text: Vec<SmartString> = Vec::new();
		let mut units: Vec<PushUnit> = Vec::new();
		for link in &chain.0 {
			match link {
				ChainLink::Str { level, offset, len, .. } => {
					let lossy = String::from_utf8_lossy(self.arena.slice(*level, *offset, *len));
					pending_text.push(SmartString::from(lossy.as_ref()));
				}
				ChainLink::ArgvRef { argv, start_index, flatten, .. } => {
					let (quote_open, quote_close) = self.lexer.syntax_quotes();
					let mut emitted = false;
					for i in *start_index..argv.argc() {
						let Some(resolved) = argv.arg_symbol(i) else { continue };
						if *flatten && resolved.is_procedure() {
							continue;
						}
						if emitted {
							pending_text.push(",".into());
						}
						emitted = true;
						match resolved.as_ref() {
							SymbolValue::Procedure { .. } | SymbolValue::Placeholder { .. } if !*flatten => {
								if !pending_text.is_empty() {
									units.push(PushUnit::Text(pending_text.concat()));
									pending_text.clear();
								}
								units.push(PushUnit::Value(resolved));
							}
							// §4.4 "$@": each materialized argument is wrapped in the
							// lexer's current quote pair before rescan, the same way
							// `push_args` below wraps with `quote: true` — matching
							// GNU m4's "each wrapped, then unwrapped on rescan"
							// (SPEC_FULL.md scenario 4).
							_ => {
								let mut wrapped = SmartString::new();
								wrapped.push_str(&quote_open);
								wrapped.push_str(&self.materialize(&resolved));
								wrapped.push_str(&quote_close);
								pending_text.push(wrapped);
							}
						}
					}
				}
			}
		}
		if !pending_text.is_empty() {
			units.push(PushUnit::Text(pending_text.concat()));
		}
		for unit in units.into_iter().rev() {
			match unit {
				PushUnit::Text(t) => {
					let buf = self.input.push_string_init();
					buf.push_str(&t);
					self.input.push_string_finish();
				}
				PushUnit::Value(v) => self.input.push_value(v),
			}
		}
	}

	/// §4.5 `push_args`: push arguments `skip+1..argc`, comma-separated,
	/// each optionally wrapped in the lexer's current quote pair.
	///
	/// `quote: true` joins materialized text the way `$@` does (see
	/// `push_composite`'s `ArgvRef` branch above). `quote: false` pushes each
	/// argument through [`Self::push_arg`] instead of stringifying it, so a
	/// `Procedure`/`Composite`-valued argument (e.g. one obtained via `defn`)
	/// keeps its identity across the rescan rather than being flattened to
	/// text — this is the path GNU m4's `shift` exercises.
	pub fn push_args(&mut self, argv: &Argv, skip: usize, quote: bool) {
		let count = argv.argc().saturating_sub(skip + 1);
		if count == 0 {
			return;
		}
		if quote {
			let (open, close) = self.lexer.syntax_quotes();
			let mut pieces = Vec::with_capacity(count);
			for i in (skip + 1)..argv.argc() {
				let text = self.arg_text(argv, i);
				let mut wrapped = SmartString::new();
				wrapped.push_str(&open);
				wrapped.push_str(&text);
				wrapped.push_str(&close);
				pieces.push(wrapped);
			}
			let joined = pieces.join(",");
			let buf = self.input.push_string_init();
			buf.push_str(&joined);
			self.input.push_string_finish();
			return;
		}
		// Push in reverse (LIFO input stack) so the rescan reads the
		// arguments back in source order, with a literal "," source between
		// each pair — mirroring `push_composite`'s text/value interleaving.
		for offset in (0..count).rev() {
			let i = skip + 1 + offset;
			if offset + 1 < count {
				let buf = self.input.push_string_init();
				buf.push(',');
				self.input.push_string_finish();
			}
			self.push_arg(argv, i);
		}
	}

	/// §4.5 `arg_scratch`: the bytes arena one level below the current one.
	/// Contract: must be empty on entry.
	pub fn arg_scratch_mark(&mut self) -> usize {
		let level = self.expansion_level.saturating_sub(1);
		self.arena.mark(level)
	}

	/// §4.3 step 4: bump `expansion_level`, failing fatally past the
	/// configured nesting limit.
	pub fn enter_level(&mut self) -> Result<usize> {
		self.expansion_level += 1;
		if self.expansion_level > self.options.nesting_limit {
			self.expansion_level -= 1;
			return Err(EngineError::RecursionLimitExceeded { limit: self.options.nesting_limit }.into());
		}
		Ok(self.expansion_level)
	}

	pub fn exit_level(&mut self) {
		self.expansion_level = self.expansion_level.saturating_sub(1);
	}

	/// Hand out the next trace call id (`spec.md` §7).
	pub fn next_call_id(&mut self) -> usize {
		self.next_call_id += 1;
		self.next_call_id
	}

	/// §4.3 step 6: peek whether the next token is an unconsumed `(`, without
	/// consuming it, to decide whether a call actually collects arguments.
	pub fn peek_open(&mut self) -> bool {
		self.lexer.next_token_is_open(&mut self.input)
	}

	/// §4.3 step 10/11: install a macro's result as a new input source, the
	/// same way `push_arg` installs one of a call's own arguments — reused
	/// here since the rules for each `SymbolValue` variant are identical.
	pub fn push_result(&mut self, value: &SymbolValue) {
		match value {
			SymbolValue::Empty => {}
			SymbolValue::Text { bytes, .. } => {
				let buf = self.input.push_string_init();
				buf.push_str(bytes);
				self.input.push_string_finish();
			}
			SymbolValue::Composite(chain) => self.push_composite(chain),
			SymbolValue::Procedure { .. } | SymbolValue::Placeholder { .. } => {
				self.input.push_value(Rc::new(value.clone()));
			}
		}
	}
}

enum PushUnit {
	Text(SmartString),
	Value(Rc<SymbolValue>),
}

fn builtin_define(engine: &mut Engine, argv: &Argv) -> SymbolValue {
	let name = engine.arg_text(argv, 1);
	let body = if argv.argc() > 2 { engine.arg_text(argv, 2) } else { SmartString::new() };
	engine.symtab.define(name, SymbolValue::text(body, 0));
	SymbolValue::Empty
}

fn builtin_undefine(engine: &mut Engine, argv: &Argv) -> SymbolValue {
	let name = engine.arg_text(argv, 1);
	engine.symtab.undefine(&name);
	SymbolValue::Empty
}

fn builtin_dnl(engine: &mut Engine, _argv: &Argv) -> SymbolValue {
	while !matches!(engine.input.next_char(), Some('\n') | None) {}
	SymbolValue::Empty
}

fn builtin_ifelse(engine: &mut Engine, argv: &Argv) -> SymbolValue {
	let argc = argv.argc();
	if argc < 4 {
		return if argc == 3 { SymbolValue::text(engine.arg_text(argv, 2), 0) } else { SymbolValue::Empty };
	}
	let mut i = 1;
	while i + 2 < argc {
		if engine.arg_equal(argv, i, argv, i + 1) {
			return SymbolValue::text(engine.arg_text(argv, i + 2), 0);
		}
		i += 3;
	}
	if i < argc {
		SymbolValue::text(engine.arg_text(argv, i), 0)
	} else {
		SymbolValue::Empty
	}
}

/// `defn(name)`: the symbol table's raw stored value for `name`, returned
/// verbatim -- a `Procedure` stays a `Procedure` rather than being
/// stringified, unlike every other substitution path in this engine.
fn builtin_defn(engine: &mut Engine, argv: &Argv) -> SymbolValue {
	let name = engine.arg_text(argv, 1);
	engine.symtab.lookup(&name).map_or(SymbolValue::Empty, |entry| entry.value.as_ref().clone())
}

/// `shift(a,b,c,...)`: drop `a`, push the rest back comma-joined for
/// rescanning, unquoted -- so a `Procedure` argument obtained via `defn`
/// keeps its identity through the shift instead of being flattened to text.
fn builtin_shift(engine: &mut Engine, argv: &Argv) -> SymbolValue {
	engine.push_args(argv, 1, false);
	SymbolValue::Empty
}

pub(crate) fn warn_placeholder(name: &str) {
	warn!(name, "invoked a Placeholder primitive with no real implementation");
}

#[must_use]
pub fn sentinel_level() -> usize {
	SENTINEL_LEVEL
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text_argv(name: &str, args: &[&str]) -> Argv {
		let mut argv = Argv::new(name);
		argv.argc = 1 + args.len();
		for a in args {
			argv.array.push(Rc::new(SymbolValue::text(*a, 1)));
		}
		argv
	}

	#[test]
	fn define_then_lookup() {
		let mut engine = Engine::new("", EngineOptions::default());
		let argv = text_argv("define", &["greeting", "hi"]);
		builtin_define(&mut engine, &argv);
		let entry = engine.symtab.lookup("greeting").unwrap();
		match entry.value.as_ref() {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "hi"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn ifelse_picks_matching_branch() {
		let mut engine = Engine::new("", EngineOptions::default());
		let argv = text_argv("ifelse", &["a", "a", "yes", "no"]);
		let result = builtin_ifelse(&mut engine, &argv);
		match result {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "yes"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn ifelse_falls_through_to_default() {
		let mut engine = Engine::new("", EngineOptions::default());
		let argv = text_argv("ifelse", &["a", "b", "yes", "no"]);
		let result = builtin_ifelse(&mut engine, &argv);
		match result {
			SymbolValue::Text { bytes, .. } => assert_eq!(bytes.as_str(), "no"),
			_ => panic!("expected text"),
		}
	}

	#[test]
	fn nesting_limit_is_enforced() {
		let mut engine = Engine::new("", EngineOptions { nesting_limit: 2, ..EngineOptions::default() });
		assert!(engine.enter_level().is_ok());
		assert!(engine.enter_level().is_ok());
		assert!(engine.enter_level().is_err());
	}

	#[test]
	fn make_argv_ref_wraps_remaining_args() {
		let mut inner = Argv::new("q");
		inner.argc = 3;
		inner.array.push(Rc::new(SymbolValue::text("a", 1)));
		inner.array.push(Rc::new(SymbolValue::text("b", 1)));
		let inner = Rc::new(inner);
		let wrapper = Engine::make_argv_ref(&inner, "pass", 0, false);
		assert_eq!(wrapper.argc(), 3);
		assert!(wrapper.wrapper);
	}
}
