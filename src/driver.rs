//! The expansion driver (`spec.md` §4.3): orchestrates one macro call end to
//! end — enters the per-level arena, collects arguments, invokes the body
//! (textual or primitive), pushes the result back for rescanning, and tears
//! the call down.
//!
//! Grounded directly against `examples/original_source/m4/macro.c`'s
//! `expand_macro`/`collect_arguments`/`m4_process_macro` for control-flow
//! fidelity (the numbered steps below mirror `spec.md` §4.3's numbering).

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::arena::SENTINEL_LEVEL;
use crate::body;
use crate::collector;
use crate::context::{warn_placeholder, Engine};
use crate::error::Result;
use crate::symtab::SymtabEntry;
use crate::value::{Argv, ChainLink, SymbolValue};

/// Run one call of `name`, whose symbol-table snapshot is `entry` (already
/// looked up by the caller, satisfying §4.3 step 3: the symbol must be
/// snapshotted *before* argument collection, since a macro's own body can
/// redefine itself while its later arguments are still being read).
pub fn expand_macro(engine: &mut Engine, name: &str, entry: SymtabEntry) -> Result<()> {
	// Steps 1-2: this call's own arena level is the current expansion depth;
	// nested calls made while collecting arguments will run one level deeper.
	let level = engine.expansion_level;
	let call_bytes_base = engine.arena.enter(level);

	// Step 4: bump expansion_level for the nested calls about to happen
	// during argument collection, failing fatally past the nesting limit.
	if let Err(err) = engine.enter_level() {
		// No outgoing refs, not in use: this call never got off the ground.
		engine.arena.exit(level, call_bytes_base, false, false);
		return Err(err);
	}

	// Step 5: capture *open-loc* for diagnostics raised during collection.
	let open_file = engine.input.current_file();
	let open_line = engine.input.current_line();

	let traced = entry.traced;
	let call_id = engine.next_call_id();

	if traced && engine.options.trace_call {
		let value_print = engine.materialize(&entry.value);
		let line = engine.trace.prepre(Some(&open_file), Some(open_line), level, Some(call_id), name, &value_print);
		engine.trace_log.push(line);
	}

	let groks_macro_args = matches!(entry.value.as_ref(), SymbolValue::Procedure { flags, .. } if flags.accepts_macro_args);

	// §4.3 step 6 / original `collect_arguments`: only collect at all if an
	// open-paren actually follows; a bare macro word has argc == 1 (just the
	// name) and never touches the argument collector.
	let mut args: Vec<Rc<SymbolValue>> = Vec::new();
	let mut added_outgoing_refs = false;
	if engine.peek_open() {
		engine.lexer.next_token(&mut engine.input); // gobble the '('
		collector::collect_arguments(engine, level, name, &mut args, &mut added_outgoing_refs)?;
		// §9 / original `collect_arguments`: a procedure-valued argument
		// passed to a macro that doesn't accept macro args is silently
		// coerced to empty text (§7 "Silent coercion").
		for arg in &mut args {
			if !groks_macro_args && arg.is_procedure() {
				*arg = Rc::new(SymbolValue::Empty);
			}
		}
	}

	// Step 7: capture *close-loc*; the body/procedure sees *open-loc* again
	// for any diagnostics it raises (matching `error_at_line`'s use of the
	// call-site location captured before `expand_argument` started).
	let _close_file = engine.input.current_file();
	let _close_line = engine.input.current_line();

	let has_ref = args.iter().any(|a| matches!(a.as_ref(), SymbolValue::Composite(_)));
	let quote_age = argv_quote_age(&args);
	let argv = Rc::new(Argv { argc: 1 + args.len(), argv0: name.into(), array: args, quote_age, in_use: std::cell::Cell::new(false), has_ref, wrapper: false });

	let pending_trace = if traced {
		let quote_open_close = engine.lexer.syntax_quotes();
		let arg_texts: Vec<SmartString> = (1..argv.argc()).map(|i| engine.arg_text(&argv, i)).collect();
		Some(engine.trace.begin(name, &arg_texts, &quote_open_close.0, &quote_open_close.1))
	} else {
		None
	};

	// Step 9: dispatch on the snapshotted value.
	let argc_user = argv.argc().saturating_sub(1);
	let result = match entry.value.as_ref() {
		SymbolValue::Text { bytes, .. } => body::run_body(engine, bytes, &argv, level, &entry.params),
		SymbolValue::Procedure { func, flags, .. } => {
			let bad_argc = argc_user < flags.min_args || flags.max_args.is_some_and(|max| argc_user > max);
			if bad_argc && !flags.side_effect_args {
				tracing::warn!(name, argc_user, min = flags.min_args, max = ?flags.max_args, "wrong argument count");
				SymbolValue::Empty
			} else {
				func(engine, &argv)
			}
		}
		SymbolValue::Placeholder { name: placeholder_name } => {
			warn_placeholder(placeholder_name);
			SymbolValue::Empty
		}
		SymbolValue::Empty | SymbolValue::Composite(_) => SymbolValue::Empty,
	};

	// Step 10/11: install the result as a new input source for rescanning.
	engine.push_result(&result);

	if let Some(pending) = pending_trace {
		let expansion_print = engine.materialize(&result);
		let line = engine.trace.finish(pending, Some(&open_file), Some(open_line), level, Some(call_id), None, engine.options.trace_expansion.then_some(expansion_print.as_str()));
		engine.trace_log.push(line);
	}

	engine.exit_level();

	// Step 12: the snapshotted value, if it was the last reference to a
	// definition the symbol table has since replaced, is simply dropped here
	// by Rust's ownership once `entry` goes out of scope — no explicit
	// "deleted" bookkeeping is needed the way the C original needs one.

	// Step 13: release the arena refs this call's own argument collection
	// added when it spliced a deeper level's Str link into one of its args.
	for arg in &argv.array {
		if let SymbolValue::Composite(chain) = arg.as_ref() {
			for link in &chain.0 {
				if let ChainLink::Str { level: referenced, .. } = link {
					if *referenced != SENTINEL_LEVEL {
						engine.arena.release_ref(*referenced);
					}
				}
			}
		}
	}

	// Step 14.
	engine.arena.exit(level, call_bytes_base, added_outgoing_refs, argv.in_use.get());

	Ok(())
}

/// §3 `Argv::quote_age`: 0 if any contained argument has heterogeneous
/// quoting, else the shared value (a cache key meaning "no delimiter-
/// dependent reparsing needed").
fn argv_quote_age(args: &[Rc<SymbolValue>]) -> u32 {
	let mut common: Option<u32> = None;
	for arg in args {
		let age = match arg.as_ref() {
			SymbolValue::Text { quote_age, .. } => *quote_age,
			SymbolValue::Composite(chain) => {
				let mut chain_age: Option<u32> = None;
				for link in &chain.0 {
					let a = link.quote_age();
					match chain_age {
						None => chain_age = Some(a),
						Some(c) if c == a => {}
						_ => return 0,
					}
					if a == 0 {
						return 0;
					}
				}
				chain_age.unwrap_or(0)
			}
			SymbolValue::Empty | SymbolValue::Procedure { .. } | SymbolValue::Placeholder { .. } => 0,
		};
		if age == 0 {
			return 0;
		}
		match common {
			None => common = Some(age),
			Some(c) if c == age => {}
			_ => return 0,
		}
	}
	common.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::EngineOptions;

	#[test]
	fn bare_macro_word_gets_empty_argv() {
		let mut engine = Engine::new("", EngineOptions::default());
		engine.symtab.define("greeting", SymbolValue::text("hi", 1));
		let entry = engine.symtab.lookup("greeting").unwrap().clone();
		expand_macro(&mut engine, "greeting", entry).unwrap();
		assert_eq!(engine.input.next_char(), Some('h'));
		assert_eq!(engine.input.next_char(), Some('i'));
	}

	#[test]
	fn nesting_limit_violation_is_propagated() {
		let mut engine = Engine::new("", EngineOptions { nesting_limit: 0, ..EngineOptions::default() });
		engine.symtab.define("x", SymbolValue::text("body", 1));
		let entry = engine.symtab.lookup("x").unwrap().clone();
		assert!(expand_macro(&mut engine, "x", entry).is_err());
	}

	#[test]
	fn argv_quote_age_is_zero_for_empty_args() {
		assert_eq!(argv_quote_age(&[]), 0);
	}
}
