//! Error taxonomy for the expansion engine.
//!
//! See `spec.md` §7. Fatal errors are returned as `Err` and are expected to
//! propagate all the way out of the engine (a caller embedding this crate in
//! a CLI should treat them as exit-worthy); recoverable errors are logged
//! via `tracing::warn!` at their call site and do not stop expansion.

use std::fmt;

/// Fatal conditions: expansion of the whole input cannot continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
	/// §4.2: `EOF` encountered while still inside a macro's argument list.
	EofInArgumentList { macro_name: smartstring::alias::String },
	/// §4.3 step 4: `expansion_level` exceeded the configured nesting limit.
	RecursionLimitExceeded { limit: usize },
	/// An internal invariant (§8) was violated; this should never happen in
	/// correctly-driven code and indicates a bug in the engine itself.
	InvariantViolation(&'static str),
}

impl fmt::Display for EngineError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::EofInArgumentList { macro_name } => {
				write!(f, "end of file in argument list for `{macro_name}'")
			}
			Self::RecursionLimitExceeded { limit } => {
				write!(f, "recursion limit of {limit} exceeded, change it with a higher nesting limit")
			}
			Self::InvariantViolation(what) => write!(f, "internal error: {what}"),
		}
	}
}

impl std::error::Error for EngineError {}

pub type Result<T> = color_eyre::Result<T>;
