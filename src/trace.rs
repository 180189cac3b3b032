//! `m4trace:` output formatting (`spec.md` §6, §4.3 step 8).
//!
//! This is a dedicated formatter, independent of the ambient `tracing`
//! crate used elsewhere in this crate for operational logs — the two serve
//! different readers (a developer tailing `RUST_LOG`, versus a macro author
//! debugging their own expansion with `traceon`). Grounded in
//! `rpmspec-rs/src/rpmio/macros.rs`'s `print_macro`/`print_expansion`, which
//! draw the same distinction against that crate's `tracing::debug!` calls.

use smartstring::alias::String as SmartString;

use crate::config::EngineOptions;

/// An in-progress *pre* line, not yet flushed; `finish` appends the *post*
/// segment and returns the single combined line (§6: "buffers one trace
/// line per call, flushes atomically").
pub struct PendingTrace {
	buffer: SmartString,
}

pub struct TraceFormatter {
	trace_quote: bool,
	trace_module: bool,
	max_debug_arg_length: usize,
}

impl TraceFormatter {
	#[must_use]
	pub fn new(options: &EngineOptions) -> Self {
		Self { trace_quote: options.trace_quote, trace_module: options.trace_module, max_debug_arg_length: options.max_debug_arg_length }
	}

	fn truncate<'a>(&self, s: &'a str) -> &'a str {
		if self.max_debug_arg_length == 0 || s.len() <= self.max_debug_arg_length {
			s
		} else {
			// char_indices avoids splitting a multi-byte UTF-8 sequence.
			let cut = s.char_indices().map(|(i, _)| i).take_while(|&i| i <= self.max_debug_arg_length).last().unwrap_or(0);
			&s[..cut]
		}
	}

	fn wrap(&self, quote_open: &str, quote_close: &str, s: &str) -> SmartString {
		let mut out = SmartString::new();
		if self.trace_quote {
			out.push_str(quote_open);
		}
		out.push_str(self.truncate(s));
		if self.trace_quote {
			out.push_str(quote_close);
		}
		out
	}

	fn location_prefix(&self, file: Option<&str>, line: Option<usize>) -> SmartString {
		let mut out = SmartString::new();
		if let Some(f) = file {
			out.push_str(f);
			out.push(':');
		}
		if let Some(l) = line {
			out.push_str(l.to_string().as_str());
			out.push(':');
		}
		out
	}

	/// §4.3 step 8 "prepre": printed before argument collection, gated by
	/// `M4_DEBUG_TRACE_CALL` at the call site.
	#[must_use]
	pub fn prepre(&self, file: Option<&str>, line: Option<usize>, level: usize, id: Option<usize>, name: &str, value_print: &str) -> String {
		let mut message = SmartString::new();
		message.push_str(name);
		message.push_str(" ... = ");
		message.push_str(self.truncate(value_print));
		self.format_line(file, line, level, id, &message)
	}

	/// Begin the *pre* buffer: `<name>[(arg1, arg2, …)]`.
	#[must_use]
	pub fn begin(&self, name: &str, args: &[SmartString], quote_open: &str, quote_close: &str) -> PendingTrace {
		let mut buffer = SmartString::new();
		buffer.push_str(name);
		if !args.is_empty() {
			buffer.push('(');
			for (i, a) in args.iter().enumerate() {
				if i > 0 {
					buffer.push_str(", ");
				}
				buffer.push_str(&self.wrap(quote_open, quote_close, a));
			}
			buffer.push(')');
		}
		PendingTrace { buffer }
	}

	/// Append the *post* segment and flush as a single combined line.
	#[must_use]
	pub fn finish(&self, mut pending: PendingTrace, file: Option<&str>, line: Option<usize>, level: usize, id: Option<usize>, module: Option<&str>, expansion: Option<&str>) -> String {
		if self.trace_module {
			if let Some(m) = module {
				pending.buffer.push_str(" [");
				pending.buffer.push_str(m);
				pending.buffer.push(']');
			}
		}
		if let Some(expansion) = expansion {
			pending.buffer.push_str(" -> ");
			pending.buffer.push_str(self.truncate(expansion));
		}
		self.format_line(file, line, level, id, &pending.buffer)
	}

	fn format_line(&self, file: Option<&str>, line: Option<usize>, level: usize, id: Option<usize>, message: &str) -> String {
		let loc = self.location_prefix(file, line);
		let id_part = id.map_or_else(SmartString::new, |n| {
			let mut s = SmartString::new();
			s.push_str("id ");
			s.push_str(n.to_string().as_str());
			s.push_str(": ");
			s
		});
		format!("m4trace:{loc} -{level}- {id_part}{message}\n")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn opts(trace_quote: bool, trace_module: bool, max_len: usize) -> EngineOptions {
		EngineOptions { trace_quote, trace_module, max_debug_arg_length: max_len, ..EngineOptions::default() }
	}

	#[test]
	fn pre_post_combine_into_one_line() {
		let o = opts(false, false, 0);
		let f = TraceFormatter::new(&o);
		let args: Vec<SmartString> = vec!["a".into(), "b".into()];
		let pending = f.begin("foo", &args, "`", "'");
		let line = f.finish(pending, Some("in"), Some(3), 1, None, None, Some("AB"));
		assert_eq!(line, "m4trace:in:3: -1- foo(a, b) -> AB\n");
	}

	#[test]
	fn trace_quote_wraps_each_argument() {
		let o = opts(true, false, 0);
		let f = TraceFormatter::new(&o);
		let args: Vec<SmartString> = vec!["a".into()];
		let pending = f.begin("foo", &args, "`", "'");
		let line = f.finish(pending, None, None, 0, None, None, None);
		assert_eq!(line, "m4trace: -0- foo(`a')\n");
	}

	#[test]
	fn truncates_long_arguments() {
		let o = opts(false, false, 3);
		let f = TraceFormatter::new(&o);
		let args: Vec<SmartString> = vec!["abcdef".into()];
		let pending = f.begin("foo", &args, "", "");
		let line = f.finish(pending, None, None, 0, None, None, None);
		assert_eq!(line, "m4trace: -0- foo(abc)\n");
	}

	#[test]
	fn id_segment_is_included_when_present() {
		let o = opts(false, false, 0);
		let f = TraceFormatter::new(&o);
		let pending = f.begin("foo", &[], "", "");
		let line = f.finish(pending, None, None, 2, Some(7), None, None);
		assert_eq!(line, "m4trace: -2- id 7: foo\n");
	}
}
