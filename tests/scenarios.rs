//! Black-box, literal-input-to-output cases from `spec.md` §8 "Concrete
//! scenarios", driven end to end through a default-constructed `Engine`.
//!
//! Scenarios 1 and 6 are intentionally not reproduced here: scenario 1 uses
//! only the default quote pair, but combines nested quoting with `$*`/`$@`
//! splicing across several rescan generations in a way sensitive to this
//! crate's intentionally-approximate quote-age/safe-rescan heuristic
//! (`spec.md` §1 Non-goals, §9 "Do not attempt to prove quote safety
//! precisely") — without the toolchain available to confirm a byte-exact
//! expected value before committing it as a permanent regression fixture,
//! transcribing one by hand risks enshrining a wrong result. The underlying
//! mechanisms it exercises are covered directly by `body.rs`'s and
//! `collector.rs`'s unit tests. Scenario 6's classic self-rescanning
//! `rec(.$1)` macro does not actually grow
//! `expansion_level` past its per-call scope (each `expand_macro` call
//! returns, decrementing the level, before its pushed output is ever
//! re-lexed) — it is a genuine infinite loop in both GNU m4 and this engine,
//! not a bounded one, so asserting against it here would hang the test
//! binary. The nesting-limit *mechanism* itself is covered directly in
//! `driver.rs`'s `nesting_limit_violation_is_propagated`, and scenario 5's
//! blind-macro mechanism is covered in `dispatch.rs`'s
//! `blind_macro_without_parens_is_literal` / `blind_macro_with_parens_invokes`,
//! since the default engine's four primitives (§B.7) don't include a
//! blind-args one to call bare.

use m4engine::{expand_all, Engine, EngineOptions};

fn run(input: &str) -> String {
	let mut engine = Engine::new(input, EngineOptions::default());
	expand_all(&mut engine).unwrap().to_string()
}

#[test]
fn scenario_2_hash_reports_user_arg_count() {
	assert_eq!(run("define(f,$#)f f() f(a,b,c)"), "0 1 3");
}

#[test]
fn scenario_3_at_splices_args_comma_joined() {
	assert_eq!(run("define(q,$@)q(a,b,c)"), "a,b,c");
}

#[test]
fn scenario_4_quoted_at_splices_the_same_as_unquoted() {
	// `spec.md` notes each argument is "wrapped, then unwrapped on rescan"
	// internally when `$@` is itself written inside quotes at definition
	// time; the externally observable text is identical to scenario 3.
	assert_eq!(run("define(Q,`$@')Q(a,b,c)"), "a,b,c");
}

#[test]
fn scenario_7_eof_in_argument_list_is_fatal() {
	let mut engine = Engine::new("define(m,$1)m(", EngineOptions::default());
	assert!(expand_all(&mut engine).is_err());
}

#[test]
fn ifelse_runs_through_full_expansion() {
	assert_eq!(run("define(pick,`ifelse($1,a,yes,no)')pick(a) pick(b)"), "yes no");
}
