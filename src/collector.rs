//! The argument collector (`spec.md` §4.2, §4.6).
//!
//! Reads tokens directly from the lexer so it can intercept `Open`/`Close`/
//! `Comma`/`Eof` for paren-depth bookkeeping; any other token kind is handed
//! to [`crate::dispatch::dispatch_lexed`], exactly as the top-level
//! dispatcher would treat it, so a nested macro call inside an argument
//! still expands in place.

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::arena::SENTINEL_LEVEL;
use crate::context::Engine;
use crate::dispatch::{dispatch_lexed, DispatchOutcome};
use crate::error::{EngineError, Result};
use crate::lexer::Token;
use crate::value::{ChainLink, Composite, SymbolValue};

/// §4.6: the collector's only state variable besides per-argument
/// accumulation.
struct ParenDepth(usize);

/// Collect every argument of a call into `args`, appending one `SymbolValue`
/// per user-visible argument. `level` is this call's arena level (§4.3 step
/// 1). Sets `*added_outgoing_refs` if any argument ends up holding an
/// arena-backed `Str` link spliced in from a deeper level (so the driver
/// knows not to optimistically rewind this call's own bytes, §4.3 step 14).
pub fn collect_arguments(engine: &mut Engine, level: usize, macro_name: &str, args: &mut Vec<Rc<SymbolValue>>, added_outgoing_refs: &mut bool) -> Result<()> {
	let mut depth = ParenDepth(0);
	loop {
		let (value, more) = collect_one_argument(engine, level, macro_name, &mut depth, added_outgoing_refs)?;
		args.push(Rc::new(value));
		if !more {
			return Ok(());
		}
	}
}

fn collect_one_argument(engine: &mut Engine, level: usize, macro_name: &str, depth: &mut ParenDepth, added_outgoing_refs: &mut bool) -> Result<(SymbolValue, bool)> {
	let mut bytes = SmartString::new();
	let mut chain: Option<Composite> = None;
	let mut single_procedure: Option<Rc<SymbolValue>> = None;
	let mut quote_age = engine.lexer.quote_age();
	let mut skipping_leading_space = true;

	loop {
		let lexed = engine.lexer.next_token(&mut engine.input);

		if skipping_leading_space && bytes.is_empty() && chain.is_none() && single_procedure.is_none() {
			if matches!(lexed.token, Token::Space(_)) {
				continue;
			}
			skipping_leading_space = false;
		}

		match lexed.token {
			Token::Close if depth.0 == 0 => {
				let value = finalize(engine, level, bytes, chain, single_procedure, quote_age);
				return Ok((value, false));
			}
			Token::Comma if depth.0 == 0 => {
				let value = finalize(engine, level, bytes, chain, single_procedure, quote_age);
				return Ok((value, true));
			}
			Token::Eof => {
				return Err(EngineError::EofInArgumentList { macro_name: macro_name.into() }.into());
			}
			Token::Open => {
				depth.0 += 1;
				bytes.push('(');
				single_procedure = None;
			}
			Token::Close => {
				depth.0 -= 1;
				bytes.push(')');
				single_procedure = None;
			}
			other => {
				let first_in_buffer = bytes.is_empty() && chain.is_none() && single_procedure.is_none();
				let outcome = dispatch_lexed(engine, other, lexed.quote_age, first_in_buffer)?;
				match outcome {
					DispatchOutcome::Eof => {
						return Err(EngineError::EofInArgumentList { macro_name: macro_name.into() }.into());
					}
					DispatchOutcome::Emit(text, safe) => {
						if !safe {
							quote_age = 0;
						}
						if !text.is_empty() {
							bytes.push_str(&text);
						}
						single_procedure = None;
					}
					DispatchOutcome::Value(v) => match v.as_ref() {
						SymbolValue::Procedure { .. } if bytes.is_empty() && chain.is_none() => {
							single_procedure = Some(v);
						}
						SymbolValue::Composite(inner) => {
							splice_composite(engine, level, &mut bytes, &mut chain, inner, &mut quote_age, added_outgoing_refs);
							single_procedure = None;
						}
						// §9: a procedure value concatenated with other material is
						// silently coerced to text, matching the source's
						// unwarned FIXME behavior rather than erroring.
						_ => {
							let text = engine.materialize(&v);
							bytes.push_str(&text);
							single_procedure = None;
						}
					},
				}
			}
		}
	}
}

/// Append an already-resolved composite chain (typically a rescanned `$@`)
/// onto the argument being accumulated, promoting it to `Composite` form.
fn splice_composite(engine: &mut Engine, level: usize, bytes: &mut SmartString, chain: &mut Option<Composite>, inner: &Composite, quote_age: &mut u32, added_outgoing_refs: &mut bool) {
	let target = chain.get_or_insert_with(Composite::new);
	if !bytes.is_empty() {
		let (offset, len) = engine.arena.push_bytes(level, bytes.as_bytes());
		target.push(ChainLink::Str { level, offset, len, quote_age: *quote_age });
		bytes.clear();
	}
	for link in &inner.0 {
		if let ChainLink::Str { level: referenced, .. } = link {
			if *referenced != SENTINEL_LEVEL {
				engine.arena.add_ref(*referenced);
				*added_outgoing_refs = true;
			}
		}
		*quote_age = if *quote_age == 0 || link.quote_age() == 0 { 0 } else { *quote_age };
		target.push(link.clone());
	}
}

fn finalize(engine: &mut Engine, level: usize, bytes: SmartString, chain: Option<Composite>, single_procedure: Option<Rc<SymbolValue>>, quote_age: u32) -> SymbolValue {
	if let Some(v) = single_procedure {
		return v.as_ref().clone();
	}
	if let Some(mut chain) = chain {
		if !bytes.is_empty() {
			let (offset, len) = engine.arena.push_bytes(level, bytes.as_bytes());
			chain.push(ChainLink::Str { level, offset, len, quote_age });
		}
		return SymbolValue::Composite(chain);
	}
	SymbolValue::text(bytes, quote_age)
}
