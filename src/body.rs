//! The body processor (`spec.md` §4.4): walks a macro's textual body byte by
//! byte, copying ordinary characters verbatim and substituting `$`-syntax
//! against the call's `Argv`.
//!
//! Grounded against `examples/original_source/m4/macro.c`'s
//! `m4_process_macro`, generalized so that `$@`/`$*` — which that C function
//! renders as *text* via `m4_dump_args` — instead builds an `ArgvRef`
//! composite link (`spec.md` §4.4: "Crucially, `$@` is emitted as an ArgvRef
//! composite, not as materialized text"), reusing the same `Str`/`ArgvRef`
//! chain representation the argument collector uses.

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::context::Engine;
use crate::value::{Argv, ChainLink, Composite, SymbolValue};

/// Run `body` against `argv`, producing the value to push back for
/// rescanning (§4.3 step 10). `level` is this call's own arena level, used
/// to own any `Str` link bytes the way the argument collector does.
/// `params` is the symbol's named-parameter signature (§4.4's `$name`
/// fallback), empty when the macro has none.
pub fn run_body(engine: &mut Engine, body: &str, argv: &Rc<Argv>, level: usize, params: &[SmartString]) -> SymbolValue {
	let chars: Vec<char> = body.chars().collect();
	let mut bytes = SmartString::new();
	let mut chain: Option<Composite> = None;
	let mut i = 0usize;

	while i < chars.len() {
		let c = chars[i];
		if c != '$' {
			bytes.push(c);
			i += 1;
			continue;
		}
		if i + 1 >= chars.len() {
			// Trailing lone `$`: nothing follows to substitute.
			bytes.push('$');
			i += 1;
			continue;
		}
		let next = chars[i + 1];
		if next.is_ascii_digit() {
			let (index, consumed) = parse_digit_index(&chars, i + 1, engine.options.gnu_extensions);
			let text = engine.arg_text(argv, index);
			bytes.push_str(&text);
			i += 1 + consumed;
			continue;
		}
		match next {
			'#' => {
				push_decimal(&mut bytes, argv.argc().saturating_sub(1));
				i += 2;
			}
			'*' => {
				push_joined_args(engine, &mut bytes, argv);
				i += 2;
			}
			'@' => {
				flush_pending_text(engine, level, &mut bytes, &mut chain);
				chain.get_or_insert_with(Composite::new).push(ChainLink::ArgvRef { argv: Rc::clone(argv), start_index: 1, flatten: false, quote_age: argv.quote_age });
				i += 2;
			}
			_ => {
				if engine.options.posix_mode || params.is_empty() {
					bytes.push('$');
					i += 1;
				} else {
					i = substitute_named_parameter(engine, &chars, i, argv, params, &mut bytes);
				}
			}
		}
	}

	finalize(engine, level, bytes, chain)
}

/// §4.4: `$0`-`$9`, or (GNU-extensions) the maximal decimal run after `$`.
/// Returns the parsed index and how many body characters (after the `$`)
/// were consumed.
fn parse_digit_index(chars: &[char], start: usize, gnu_extensions: bool) -> (usize, usize) {
	if !gnu_extensions {
		#[allow(clippy::indexing_slicing)] // caller guarantees chars[start] is ascii_digit
		let digit = chars[start].to_digit(10).unwrap_or(0) as usize;
		return (digit, 1);
	}
	let mut end = start;
	while end < chars.len() && chars[end].is_ascii_digit() {
		end += 1;
	}
	let value: String = chars[start..end].iter().collect();
	(value.parse().unwrap_or(0), end - start)
}

/// §4.4 `$name`: read a maximal `[alnum_]+` key and, if another character
/// follows it, substitute by the parameter signature's index; if the body
/// ends with no terminator, that's an unterminated reference. Returns the
/// index to resume scanning from.
fn substitute_named_parameter(engine: &mut Engine, chars: &[char], dollar_index: usize, argv: &Argv, params: &[SmartString], bytes: &mut SmartString) -> usize {
	let start = dollar_index + 1;
	let mut end = start;
	while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
		end += 1;
	}
	if end >= chars.len() {
		let key: String = chars[start..end].iter().collect();
		tracing::warn!(key, "unterminated parameter reference");
		return end;
	}
	let key: String = chars[start..end].iter().collect();
	if let Some(index) = params.iter().position(|p| p.as_str() == key).map(|pos| pos + 1) {
		let text = engine.arg_text(argv, index);
		bytes.push_str(&text);
	}
	end
}

fn push_decimal(bytes: &mut SmartString, n: usize) {
	bytes.push_str(n.to_string().as_str());
}

/// §4.4 `$*`: all user arguments, joined by `,`, materialized to text.
fn push_joined_args(engine: &mut Engine, bytes: &mut SmartString, argv: &Argv) {
	for i in 1..argv.argc() {
		if i > 1 {
			bytes.push(',');
		}
		bytes.push_str(&engine.arg_text(argv, i));
	}
}

fn flush_pending_text(engine: &mut Engine, level: usize, bytes: &mut SmartString, chain: &mut Option<Composite>) {
	if chain.is_some() && !bytes.is_empty() {
		let (offset, len) = engine.arena.push_bytes(level, bytes.as_bytes());
		if let Some(chain) = chain.as_mut() {
			chain.push(ChainLink::Str { level, offset, len, quote_age: 0 });
		}
		bytes.clear();
	}
}

fn finalize(engine: &mut Engine, level: usize, bytes: SmartString, chain: Option<Composite>) -> SymbolValue {
	if let Some(mut chain) = chain {
		if !bytes.is_empty() {
			let (offset, len) = engine.arena.push_bytes(level, bytes.as_bytes());
			chain.push(ChainLink::Str { level, offset, len, quote_age: 0 });
		}
		return SymbolValue::Composite(chain);
	}
	// Body output is freshly produced text, always subject to full rescan.
	SymbolValue::Text { bytes, quote_age: 0 }
}
