//! The token dispatcher (`spec.md` §4.1).
//!
//! Classifies each token pulled from the lexer and either emits it (plain
//! text) or hands it to the expansion driver. Used both by the top-level
//! loop in `lib.rs` and, recursively, by the argument collector for tokens
//! nested inside a call's parentheses (`spec.md` §4.2: "other tokens: emit
//! through dispatcher").

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::context::Engine;
use crate::driver;
use crate::error::Result;
use crate::lexer::Token;
use crate::symtab::SymtabEntry;
use crate::value::SymbolValue;

/// The result of dispatching one token. `Emit` carries the text to append to
/// whatever buffer the caller is accumulating plus the §4.1 "safe to rescan
/// without re-lexing" flag; `Value` is a value that arrived as a single
/// lexeme (a `MacDef` token) and should be kept structured rather than
/// stringified — this is the path §4.2 describes as "the dispatcher ...
/// returns an ArgvRef composite as its token value".
pub enum DispatchOutcome {
	Eof,
	Emit(SmartString, bool),
	Value(Rc<SymbolValue>),
}

/// Dispatch one already-lexed token. `first_in_output` is true when nothing
/// yet precedes this token in the buffer the caller is building — used by
/// the `String` safety rule in §4.1.
pub fn dispatch_lexed(engine: &mut Engine, token: Token, _token_quote_age: u32, first_in_output: bool) -> Result<DispatchOutcome> {
	match token {
		Token::Eof => Ok(DispatchOutcome::Eof),
		// §4.1: "EOF, MacDef: always safe (no textual output)". A MacDef
		// token already carries a resolved value (typically a $@ composite
		// or bare Procedure bounced back through the input stack, §4.2).
		// If it's a Procedure/Placeholder immediately followed by `(`, it's
		// a genuine call (the token plays the role GNU m4's BUILTIN token
		// plays when rescanned ahead of an open-paren) rather than a value
		// to be materialized in place -- `defn`/`shift` rely on this to let
		// a procedure argument survive a rescan and still be invocable.
		Token::MacDef(v) => {
			let name = match v.as_ref() {
				SymbolValue::Procedure { name, .. } | SymbolValue::Placeholder { name } => Some(name.clone()),
				_ => None,
			};
			if let Some(name) = name {
				if engine.peek_open() {
					let entry = SymtabEntry { value: Rc::clone(&v), traced: false, params: Vec::new() };
					driver::expand_macro(engine, name.as_str(), entry)?;
					return Ok(DispatchOutcome::Emit(SmartString::new(), true));
				}
			}
			Ok(DispatchOutcome::Value(v))
		}
		Token::Str(s) => {
			let safe = first_in_output || engine.lexer.safe_quotes();
			Ok(DispatchOutcome::Emit(s, safe))
		}
		Token::Open => Ok(DispatchOutcome::Emit("(".into(), engine.lexer.safe_quotes())),
		Token::Close => Ok(DispatchOutcome::Emit(")".into(), engine.lexer.safe_quotes())),
		Token::Comma => Ok(DispatchOutcome::Emit(",".into(), engine.lexer.safe_quotes())),
		Token::Space(s) => {
			let safe = engine.lexer.safe_quotes();
			Ok(DispatchOutcome::Emit(s, safe))
		}
		// §4.1: "Simple: never safe".
		Token::Simple(c) => {
			let mut s = SmartString::new();
			s.push(c);
			Ok(DispatchOutcome::Emit(s, false))
		}
		Token::Word(word) => dispatch_word(engine, word),
	}
}

/// The top-level expansion loop: pull tokens until `Eof`, dispatching each
/// one and accumulating its output. This is the entry point an embedder
/// drives directly; the argument collector runs the same dispatch per-token
/// but stops early on an unescaped `)`/`,` at its own paren depth instead of
/// running to `Eof` (`spec.md` §4.2).
pub fn expand_all(engine: &mut Engine) -> Result<SmartString> {
	let mut out = SmartString::new();
	loop {
		let lexed = engine.lexer.next_token(&mut engine.input);
		match dispatch_lexed(engine, lexed.token, lexed.quote_age, out.is_empty())? {
			DispatchOutcome::Eof => return Ok(out),
			DispatchOutcome::Emit(text, _safe) => out.push_str(&text),
			DispatchOutcome::Value(v) => {
				let text = engine.materialize(&v);
				out.push_str(&text);
			}
		}
	}
}

fn dispatch_word(engine: &mut Engine, word: SmartString) -> Result<DispatchOutcome> {
	// §4.1: "strip a leading escape char if present". `DefaultLexer` has no
	// configurable escape character, so there is nothing to strip here; a
	// lexer that adds one would strip it before handing the word over.
	let entry = engine.symtab.lookup(word.as_str()).cloned();

	let Some(entry) = entry else {
		// Not found: emit literal text.
		let safe = engine.lexer.safe_quotes();
		return Ok(DispatchOutcome::Emit(word, safe));
	};

	let is_blind = matches!(entry.value.as_ref(), SymbolValue::Procedure { flags, .. } if flags.blind_args);
	if is_blind && !engine.peek_open() {
		// Blind macro named without a following `(`: literal text.
		let safe = engine.lexer.safe_quotes();
		return Ok(DispatchOutcome::Emit(word, safe));
	}

	driver::expand_macro(engine, word.as_str(), entry)?;
	// §4.1: "Word (macro): always safe (output is pushed through input
	// stack, not appended)". Nothing to emit here — the driver has already
	// pushed the macro's expansion as a new input source for rescanning.
	Ok(DispatchOutcome::Emit(SmartString::new(), true))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::EngineOptions;
	use crate::value::{ProcedureFlags, SymbolValue};

	#[test]
	fn undefined_word_emits_literal_text() {
		let mut engine = Engine::new("", EngineOptions::default());
		let lexed_word: SmartString = "nope".into();
		match dispatch_word(&mut engine, lexed_word).unwrap() {
			DispatchOutcome::Emit(text, _) => assert_eq!(text.as_str(), "nope"),
			_ => panic!("expected literal emit"),
		}
	}

	#[test]
	fn blind_macro_without_parens_is_literal() {
		let mut engine = Engine::new("blind", EngineOptions::default());
		let noop: crate::value::Builtin = |_e, _a| SymbolValue::text("x", 0);
		engine.symtab.define("blind", SymbolValue::Procedure { func: noop, name: "blind".into(), flags: ProcedureFlags { blind_args: true, ..ProcedureFlags::default() } });
		match dispatch_word(&mut engine, "blind".into()).unwrap() {
			DispatchOutcome::Emit(text, _) => assert_eq!(text.as_str(), "blind"),
			_ => panic!("expected literal emit"),
		}
	}

	#[test]
	fn blind_macro_with_parens_invokes() {
		let mut engine = Engine::new("blind()", EngineOptions::default());
		let noop: crate::value::Builtin = |_e, _a| SymbolValue::text("x", 0);
		engine.symtab.define("blind", SymbolValue::Procedure { func: noop, name: "blind".into(), flags: ProcedureFlags { blind_args: true, side_effect_args: true, ..ProcedureFlags::default() } });
		match dispatch_word(&mut engine, "blind".into()).unwrap() {
			DispatchOutcome::Emit(text, safe) => {
				assert!(text.is_empty());
				assert!(safe);
			}
			DispatchOutcome::Value(_) => panic!("expected emit"),
		}
	}

	#[test]
	fn expand_all_runs_a_define_then_call() {
		let mut engine = Engine::new("define(greet,hi $1)greet(world)", EngineOptions::default());
		let out = expand_all(&mut engine).unwrap();
		assert_eq!(out.as_str(), "hi world");
	}
}
