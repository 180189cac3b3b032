//! # m4engine
//!
//! Core argument-collection and macro-expansion engine for a textual,
//! m4-family macro processor: token dispatcher, argument collector,
//! per-level arena with refcounting, argument-value model, expansion
//! driver, body processor, and trace formatter.
//!
//! The lexer, input stack, and symbol table are described by this crate as
//! traits (`Lexer`, `InputStack`, `SymbolTable`) with one default
//! implementation each, so the engine is runnable end to end; an embedder
//! is free to swap any of the three in for its own.

mod arena;
mod body;
mod collector;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod input_stack;
pub mod lexer;
pub mod symtab;
pub mod trace;
pub mod value;

pub use config::EngineOptions;
pub use context::Engine;
pub use dispatch::expand_all;
pub use error::{EngineError, Result};

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn define_and_recursive_call_expand_end_to_end() -> Result<()> {
		let mut engine = Engine::new("define(double,$1$1)double(ab)", EngineOptions::default());
		let out = expand_all(&mut engine)?;
		assert_eq!(out.as_str(), "abab");
		Ok(())
	}

	#[test]
	fn dnl_consumes_through_end_of_line() -> Result<()> {
		let mut engine = Engine::new("one dnl trailing junk\ntwo", EngineOptions::default());
		let out = expand_all(&mut engine)?;
		assert_eq!(out.as_str(), "one two");
		Ok(())
	}

	#[test]
	fn undefine_removes_a_macro() -> Result<()> {
		let mut engine = Engine::new("define(x,y)undefine(x)x", EngineOptions::default());
		let out = expand_all(&mut engine)?;
		assert_eq!(out.as_str(), "x");
		Ok(())
	}
}
