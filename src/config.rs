//! Engine-wide options.
//!
//! The Rust-idiomatic counterpart of `rpmio/macros.rs`'s `MacroContext`
//! scalar fields (`depth`, `level`) and its file-local consts
//! (`MAX_MACRO_DEPTH`, `PRINT_MACRO_TRACE`, `PRINT_EXPAND_TRACE`). There is
//! no config *file* format here (unlike `anda-config`'s HCL manifests) —
//! an embedder constructs this programmatically.

/// Bits of the debug variable described in `spec.md` §6.
pub mod debug_bits {
	/// Print argument-count changes for a level's arena.
	pub const ARGCOUNT: u8 = 1 << 0;
	/// Print refcount increases.
	pub const REFCOUNT_UP: u8 = 1 << 1;
	/// Print refcount decreases.
	pub const REFCOUNT_DOWN: u8 = 1 << 2;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
	/// §4.3 step 4. GNU m4's own default is 250.
	pub nesting_limit: usize,
	/// §4.4: when set, `$12` parses as argument 12, not `$1` followed by a
	/// literal `2`.
	pub gnu_extensions: bool,
	/// §4.4: in POSIX mode, an unrecognized `$name` is copied literally
	/// instead of consulting a parameter signature.
	pub posix_mode: bool,
	/// §6 debug variable; OR of `debug_bits::*`.
	pub debug_bits: u8,
	/// §4.3 step 8 "prepre" trace line, gated on `M4_DEBUG_TRACE_CALL`.
	pub trace_call: bool,
	/// §4.3 step 8 "post" trace line (expansion rendered).
	pub trace_expansion: bool,
	/// §6: include quote wrappers around traced args.
	pub trace_quote: bool,
	/// §6: include module annotations in trace lines.
	pub trace_module: bool,
	/// §6: truncate traced argument text to this many bytes.
	pub max_debug_arg_length: usize,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			nesting_limit: 250,
			gnu_extensions: true,
			posix_mode: false,
			debug_bits: 0,
			trace_call: false,
			trace_expansion: false,
			trace_quote: false,
			trace_module: false,
			max_debug_arg_length: 0, // 0 => unlimited
		}
	}
}

impl EngineOptions {
	#[must_use]
	pub fn posix() -> Self {
		Self { gnu_extensions: false, posix_mode: true, ..Self::default() }
	}
}
