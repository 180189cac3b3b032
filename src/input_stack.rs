//! The input-stack contract (`spec.md` §6) and a default implementation.
//!
//! `spec.md` puts the input-stack engine out of scope, describing only its
//! contract. `DefaultInputStack` supplements it so the crate is runnable
//! end to end; it is grounded in `rpmspec-rs/src/util.rs`'s `Consumer` — a
//! reversed-`String` pull-reader that supports pushing a character back for
//! reprocessing — generalized from "push back one character" to "push an
//! entire string (or a single already-resolved value) to be rescanned",
//! which is the mechanism `spec.md` §1 calls rescanning: macro-expansion
//! output re-enters the dispatcher by going through this same stack.

use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::value::SymbolValue;

/// A handle returned by [`InputStack::push_string_finish`], opaque to
/// callers except for tracing (§6: "returns a handle for tracing").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBlockId(pub usize);

/// One pull from the stack: either a character from a text source, a
/// pre-resolved value pushed by `push_value` (the `$@` round-trip path,
/// §8 property 7), or end of all sources.
pub enum Lexeme {
	Char(char),
	Value(Rc<SymbolValue>),
	Eof,
}

/// §6 input-stack contract.
pub trait InputStack {
	/// Pull the next character from whatever source is currently on top of
	/// the stack. Never consumes a pending [`Lexeme::Value`] source — use
	/// [`InputStack::next_lexeme`] at token boundaries for that.
	fn next_char(&mut self) -> Option<char>;

	/// Push a single character back onto the top source, to be read again by
	/// the next `next_char()` call.
	fn push_char(&mut self, c: char);

	/// Pull the next lexeme, popping a pending value source whole.
	fn next_lexeme(&mut self) -> Lexeme;

	/// Begin a new output buffer for a macro body to write into.
	fn push_string_init(&mut self) -> &mut String;

	/// Install the buffer started by `push_string_init` as a new input
	/// source (on top of the stack, so it is read before anything beneath
	/// it), returning a handle for tracing.
	fn push_string_finish(&mut self) -> InputBlockId;

	/// Push a value directly, to be read back as a single [`Lexeme::Value`]
	/// rather than re-lexed from text (preserves a `Procedure`/`Composite`
	/// argument's identity across a rescan, §4.5 `push_arg`).
	fn push_value(&mut self, value: Rc<SymbolValue>);

	/// Render the current input stack for diagnostics (file/line chain).
	fn input_print(&self) -> SmartString;

	fn current_line(&self) -> usize;
	fn current_file(&self) -> SmartString;
}

enum SourceKind {
	/// Characters not yet consumed, stored reversed so pop-from-back is the
	/// cheap "next character" operation — the same trick `Consumer` uses in
	/// `rpmspec-rs/src/util.rs`.
	Text(Vec<char>),
	Value(Rc<SymbolValue>),
}

struct Source {
	kind: SourceKind,
	file: SmartString,
	line: usize,
}

impl Source {
	fn text(s: &str, file: impl Into<SmartString>, line: usize) -> Self {
		Self { kind: SourceKind::Text(s.chars().rev().collect()), file: file.into(), line }
	}

	fn value(v: Rc<SymbolValue>, file: impl Into<SmartString>, line: usize) -> Self {
		Self { kind: SourceKind::Value(v), file: file.into(), line }
	}
}

/// Default [`InputStack`]: a stack of in-memory string/value sources.
pub struct DefaultInputStack {
	stack: Vec<Source>,
	pending_push: Option<String>,
	next_block_id: usize,
}

impl DefaultInputStack {
	#[must_use]
	pub fn new(initial: &str) -> Self {
		Self { stack: vec![Source::text(initial, "<input>", 1)], pending_push: None, next_block_id: 0 }
	}
}

impl InputStack for DefaultInputStack {
	fn next_char(&mut self) -> Option<char> {
		loop {
			let top = self.stack.last_mut()?;
			let SourceKind::Text(chars) = &mut top.kind else {
				// A Value source sits at a token boundary; leave it for
				// next_lexeme rather than consuming or skipping it here.
				return None;
			};
			if let Some(c) = chars.pop() {
				if c == '\n' {
					top.line += 1;
				}
				return Some(c);
			}
			if self.stack.len() == 1 {
				return None;
			}
			self.stack.pop();
		}
	}

	fn push_char(&mut self, c: char) {
		if let Some(top) = self.stack.last_mut() {
			if let SourceKind::Text(chars) = &mut top.kind {
				if c == '\n' {
					top.line = top.line.saturating_sub(1);
				}
				chars.push(c);
				return;
			}
		}
		self.stack.push(Source::text(&c.to_string(), "<input>", 1));
	}

	fn next_lexeme(&mut self) -> Lexeme {
		loop {
			let top_is_value = matches!(self.stack.last(), Some(s) if matches!(s.kind, SourceKind::Value(_)));
			if top_is_value {
				if let Some(Source { kind: SourceKind::Value(v), .. }) = self.stack.pop() {
					return Lexeme::Value(v);
				}
				continue;
			}
			match self.next_char() {
				Some(c) => return Lexeme::Char(c),
				None => {
					if self.stack.len() <= 1 {
						return Lexeme::Eof;
					}
					self.stack.pop();
				}
			}
		}
	}

	fn push_string_init(&mut self) -> &mut String {
		self.pending_push.get_or_insert_with(String::new)
	}

	fn push_string_finish(&mut self) -> InputBlockId {
		let text = self.pending_push.take().unwrap_or_default();
		let id = InputBlockId(self.next_block_id);
		self.next_block_id += 1;
		let line = self.stack.last().map_or(1, |s| s.line);
		self.stack.push(Source::text(&text, "<expansion>", line));
		id
	}

	fn push_value(&mut self, value: Rc<SymbolValue>) {
		let line = self.stack.last().map_or(1, |s| s.line);
		self.stack.push(Source::value(value, "<expansion>", line));
	}

	fn input_print(&self) -> SmartString {
		let mut out = SmartString::new();
		for src in self.stack.iter().rev() {
			out.push_str(&src.file);
			out.push(':');
			out.push_str(itoa(src.line).as_str());
			out.push(' ');
		}
		out
	}

	fn current_line(&self) -> usize {
		self.stack.last().map_or(1, |s| s.line)
	}

	fn current_file(&self) -> SmartString {
		self.stack.last().map_or_else(|| "<input>".into(), |s| s.file.clone())
	}
}

fn itoa(n: usize) -> SmartString {
	let mut s = SmartString::new();
	s.push_str(n.to_string().as_str());
	s
}
