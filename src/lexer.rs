//! The lexer contract (`spec.md` §6) and a default implementation for the
//! classic m4 syntax table (word/open/close/comma/quote/comment characters).
//!
//! Grounded in `rpmspec-rs/src/util.rs`'s `Consumer` helper macros
//! (`exit_chk!`, `back!`, `chk_ps!`, `next!`) for the read-a-char/push-a-char
//! shape, generalized into the token classification `spec.md` §4.1 dispatches
//! on.

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::input_stack::InputStack;
use crate::value::SymbolValue;

/// One lexical token (§4.1's "Open/Close/Comma/String/Word/Simple/EOF", plus
/// `MacDef` for a token that carries an already-resolved value instead of
/// text — the rescan-time counterpart of `spec.md` §4.5 `push_arg` pushing a
/// `Procedure` or `Composite` value).
#[derive(Clone)]
pub enum Token {
	Eof,
	MacDef(Rc<SymbolValue>),
	Str(SmartString),
	Open,
	Close,
	Comma,
	Space(SmartString),
	Simple(char),
	Word(SmartString),
}

/// A token plus the quote-delimiter generation it was read under.
pub struct LexedToken {
	pub token: Token,
	pub quote_age: u32,
	pub line: usize,
}

/// §6 lexer contract.
pub trait Lexer {
	/// Read the next token from `input`.
	fn next_token(&mut self, input: &mut dyn InputStack) -> LexedToken;

	/// Peek (without consuming) whether the next token would be `Open`; used
	/// by the dispatcher to decide whether a traced/blind macro name is
	/// actually being called (§4.1).
	fn next_token_is_open(&mut self, input: &mut dyn InputStack) -> bool;

	/// The generation counter bumped by [`Lexer::set_quotes`]; 0 is reserved
	/// to mean "unknown/unsafe" and is never returned by a live lexer.
	fn quote_age(&self) -> u32;

	/// §9 "safe rescan": true when the current quote and comment delimiters
	/// are each a single non-alphanumeric, non-whitespace character, so that
	/// concatenating already-scanned text back into the input cannot change
	/// how it tokenizes.
	fn safe_quotes(&self) -> bool;

	fn syntax_quotes(&self) -> (SmartString, SmartString);

	fn set_quotes(&mut self, open: impl Into<SmartString>, close: impl Into<SmartString>);

	fn set_comment_delims(&mut self, open: impl Into<SmartString>, close: impl Into<SmartString>);
}

/// Default [`Lexer`] for the classic m4 default syntax table: words are
/// `[A-Za-z_][A-Za-z0-9_]*`, `(` `)` `,` are structural, `` ` `` `'` quote,
/// `#` comments to end of line, everything else is `Simple`.
pub struct DefaultLexer {
	quote_open: SmartString,
	quote_close: SmartString,
	comment_open: SmartString,
	comment_close: SmartString,
	quote_age: u32,
}

impl Default for DefaultLexer {
	fn default() -> Self {
		Self { quote_open: "`".into(), quote_close: "'".into(), comment_open: "#".into(), comment_close: "\n".into(), quote_age: 1 }
	}
}

impl DefaultLexer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn is_word_start(c: char) -> bool {
		c.is_ascii_alphabetic() || c == '_'
	}

	fn is_word_continue(c: char) -> bool {
		c.is_ascii_alphanumeric() || c == '_'
	}

	fn starts_with(input: &mut dyn InputStack, delim: &str) -> Option<Vec<char>> {
		let mut consumed = Vec::with_capacity(delim.len());
		for want in delim.chars() {
			match input.next_char() {
				Some(c) if c == want => consumed.push(c),
				Some(c) => {
					consumed.push(c);
					for back in consumed.into_iter().rev() {
						input.push_char(back);
					}
					return None;
				}
				None => {
					for back in consumed.into_iter().rev() {
						input.push_char(back);
					}
					return None;
				}
			}
		}
		Some(consumed)
	}

	fn read_quoted(&self, input: &mut dyn InputStack) -> SmartString {
		let mut depth = 1usize;
		let mut out = SmartString::new();
		loop {
			if Self::starts_with(input, &self.quote_open).is_some() {
				depth += 1;
				out.push_str(&self.quote_open);
				continue;
			}
			if Self::starts_with(input, &self.quote_close).is_some() {
				depth -= 1;
				if depth == 0 {
					return out;
				}
				out.push_str(&self.quote_close);
				continue;
			}
			match input.next_char() {
				Some(c) => out.push(c),
				None => return out, // unterminated quote: return what we have
			}
		}
	}

	fn read_comment(&self, input: &mut dyn InputStack) -> SmartString {
		let mut out = SmartString::new();
		out.push_str(&self.comment_open);
		loop {
			if Self::starts_with(input, &self.comment_close).is_some() {
				out.push_str(&self.comment_close);
				return out;
			}
			match input.next_char() {
				Some(c) => out.push(c),
				None => return out,
			}
		}
	}
}

impl Lexer for DefaultLexer {
	fn next_token(&mut self, input: &mut dyn InputStack) -> LexedToken {
		let line = input.current_line();
		let c = match input.next_lexeme() {
			crate::input_stack::Lexeme::Eof => {
				return LexedToken { token: Token::Eof, quote_age: self.quote_age, line };
			}
			crate::input_stack::Lexeme::Value(v) => {
				return LexedToken { token: Token::MacDef(v), quote_age: self.quote_age, line };
			}
			crate::input_stack::Lexeme::Char(c) => c,
		};

		if Self::is_word_start(c) {
			let mut word = SmartString::new();
			word.push(c);
			while let Some(next) = input.next_char() {
				if Self::is_word_continue(next) {
					word.push(next);
				} else {
					input.push_char(next);
					break;
				}
			}
			return LexedToken { token: Token::Word(word), quote_age: self.quote_age, line };
		}

		if c == '(' {
			return LexedToken { token: Token::Open, quote_age: self.quote_age, line };
		}
		if c == ')' {
			return LexedToken { token: Token::Close, quote_age: self.quote_age, line };
		}
		if c == ',' {
			return LexedToken { token: Token::Comma, quote_age: self.quote_age, line };
		}
		if c.is_whitespace() {
			let mut space = SmartString::new();
			space.push(c);
			while let Some(next) = input.next_char() {
				if next.is_whitespace() {
					space.push(next);
				} else {
					input.push_char(next);
					break;
				}
			}
			return LexedToken { token: Token::Space(space), quote_age: self.quote_age, line };
		}

		let first = self.quote_open.chars().next();
		if Some(c) == first {
			input.push_char(c);
			if Self::starts_with(input, &self.quote_open).is_some() {
				let text = self.read_quoted(input);
				return LexedToken { token: Token::Str(text), quote_age: self.quote_age, line };
			}
		}

		let comment_first = self.comment_open.chars().next();
		if Some(c) == comment_first {
			input.push_char(c);
			if Self::starts_with(input, &self.comment_open).is_some() {
				let text = self.read_comment(input);
				return LexedToken { token: Token::Str(text), quote_age: self.quote_age, line };
			}
		}

		LexedToken { token: Token::Simple(c), quote_age: self.quote_age, line }
	}

	fn next_token_is_open(&mut self, input: &mut dyn InputStack) -> bool {
		match input.next_char() {
			Some('(') => {
				input.push_char('(');
				true
			}
			Some(c) => {
				input.push_char(c);
				false
			}
			None => false,
		}
	}

	fn quote_age(&self) -> u32 {
		self.quote_age
	}

	fn safe_quotes(&self) -> bool {
		let single_special = |s: &SmartString| s.chars().count() == 1 && !s.chars().next().is_some_and(|c| c.is_alphanumeric() || c.is_whitespace());
		single_special(&self.quote_open) && single_special(&self.quote_close) && single_special(&self.comment_open)
	}

	fn syntax_quotes(&self) -> (SmartString, SmartString) {
		(self.quote_open.clone(), self.quote_close.clone())
	}

	fn set_quotes(&mut self, open: impl Into<SmartString>, close: impl Into<SmartString>) {
		self.quote_open = open.into();
		self.quote_close = close.into();
		self.quote_age += 1;
	}

	fn set_comment_delims(&mut self, open: impl Into<SmartString>, close: impl Into<SmartString>) {
		self.comment_open = open.into();
		self.comment_close = close.into();
		self.quote_age += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::input_stack::DefaultInputStack;

	#[test]
	fn scans_word_open_close() {
		let mut lx = DefaultLexer::new();
		let mut inp = DefaultInputStack::new("foo(a,b)");
		let t1 = lx.next_token(&mut inp);
		assert!(matches!(t1.token, Token::Word(ref w) if w.as_str() == "foo"));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Open));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Word(ref w) if w.as_str() == "a"));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Comma));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Word(ref w) if w.as_str() == "b"));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Close));
		assert!(matches!(lx.next_token(&mut inp).token, Token::Eof));
	}

	#[test]
	fn scans_quoted_string_stripping_delimiters() {
		let mut lx = DefaultLexer::new();
		let mut inp = DefaultInputStack::new("`hello'");
		let t = lx.next_token(&mut inp);
		assert!(matches!(t.token, Token::Str(ref s) if s.as_str() == "hello"));
	}

	#[test]
	fn nested_quotes_preserve_inner_delimiters() {
		let mut lx = DefaultLexer::new();
		let mut inp = DefaultInputStack::new("`a`b'c'");
		let t = lx.next_token(&mut inp);
		assert!(matches!(t.token, Token::Str(ref s) if s.as_str() == "a`b'c"));
	}

	#[test]
	fn default_quotes_and_comment_are_safe() {
		let lx = DefaultLexer::new();
		assert!(lx.safe_quotes());
	}

	#[test]
	fn set_quotes_bumps_quote_age() {
		let mut lx = DefaultLexer::new();
		let before = lx.quote_age();
		lx.set_quotes("[", "]");
		assert!(lx.quote_age() > before);
	}
}
