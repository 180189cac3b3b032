//! Per-level bump arena and refcount table (`spec.md` §3 `PerLevelArena`,
//! §4.6 arena state machine).
//!
//! The C original bumps two obstacks (`bytes` for argument content, `ptrs`
//! for argv pointer arrays) and rewinds them to a saved base pointer as a
//! bulk free. Rust has no stable-pointer-into-a-growing-buffer story, so
//! this module keeps only the `bytes` arena as a real bump buffer (indexed
//! by `(level, offset, len)`, never by live reference — see the "Arena
//! reallocation hazard" design note). The `ptrs` arena collapses into each
//! [`crate::value::Argv`] owning its own `Vec`: Rust's allocator already
//! amortizes that allocation, and there is no pointer-stability hazard left
//! to dodge once indices replace pointers.

/// Sentinel level meaning "this `Str` link is not arena-owned, do not touch
/// any refcount for it" (§3 `ChainLink::Str`).
pub const SENTINEL_LEVEL: usize = usize::MAX;

#[derive(Debug, Default)]
struct PerLevelArena {
	bytes: Vec<u8>,
	refcount: usize,
	/// Consecutive calls that reused this arena while it stayed live.
	argcount: usize,
	/// Captured on the Idle→Live transition; the bulk-rewind target once
	/// `refcount` returns to zero.
	base_len: usize,
}

impl PerLevelArena {
	fn is_live(&self) -> bool {
		self.refcount > 0
	}
}

/// `stacks[level]` from `spec.md` §3/§4.3, indexed by expansion level.
#[derive(Debug, Default)]
pub struct ArenaTable {
	levels: Vec<PerLevelArena>,
}

impl ArenaTable {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn ensure(&mut self, level: usize) -> &mut PerLevelArena {
		if self.levels.len() <= level {
			self.levels.resize_with(level + 1, PerLevelArena::default);
		}
		#[allow(clippy::indexing_slicing)] // just grew to at least level+1
		&mut self.levels[level]
	}

	/// §4.3 steps 1-2: lazily materialize `stacks[level]`, bump its refcount
	/// and argcount, and return this call's own entry-time byte position (the
	/// local `bytes_base` used later for the optimistic partial rewind in
	/// [`Self::exit`]).
	pub fn enter(&mut self, level: usize) -> usize {
		let arena = self.ensure(level);
		if !arena.is_live() {
			arena.base_len = arena.bytes.len();
		}
		arena.refcount += 1;
		arena.argcount += 1;
		arena.bytes.len()
	}

	/// §4.3 step 14. `call_bytes_base` is the value this same call got back
	/// from [`Self::enter`]. `added_outgoing_refs` is true if any argument of
	/// this call escaped as a `Composite`/`ArgvRef` that an enclosing Argv may
	/// still be holding after this call returns. `in_use` is true if some
	/// argument of this call was pushed back into the input stack.
	pub fn exit(&mut self, level: usize, call_bytes_base: usize, added_outgoing_refs: bool, in_use: bool) {
		let arena = self.ensure(level);
		debug_assert!(arena.refcount > 0, "arena refcount underflow at level {level}");
		arena.refcount -= 1;
		if !arena.is_live() {
			arena.bytes.truncate(arena.base_len);
			return;
		}
		if in_use {
			return;
		}
		if !added_outgoing_refs {
			arena.bytes.truncate(call_bytes_base);
		}
	}

	/// An extra refcount paid by a `Composite`/`ArgvRef` chain link that
	/// reaches back into `level` from a still-live, enclosing Argv (§3
	/// invariant: "any Str link with `level != SENTINEL` is paid-for by
	/// exactly one refcount").
	pub fn add_ref(&mut self, level: usize) {
		if level == SENTINEL_LEVEL {
			return;
		}
		self.ensure(level).refcount += 1;
	}

	/// Released when the owning Argv is torn down (§4.3 step 13). Bulk-frees
	/// the arena if this was the last outstanding reference.
	pub fn release_ref(&mut self, level: usize) {
		if level == SENTINEL_LEVEL {
			return;
		}
		let arena = self.ensure(level);
		debug_assert!(arena.refcount > 0, "arena refcount underflow at level {level}");
		arena.refcount -= 1;
		if !arena.is_live() {
			arena.bytes.truncate(arena.base_len);
		}
	}

	/// Appends `bytes` to the level's bump arena, returning the
	/// `(offset, len)` a `ChainLink::Str` should record.
	pub fn push_bytes(&mut self, level: usize, bytes: &[u8]) -> (usize, usize) {
		let arena = self.ensure(level);
		let offset = arena.bytes.len();
		arena.bytes.extend_from_slice(bytes);
		(offset, bytes.len())
	}

	/// Current write position, for callers that need their own local
	/// `bytes_base`/`bytes_scratch` snapshot outside of `enter`/`exit` (the
	/// body processor's composite-materialization scratch use, §4.5
	/// `arg_scratch`).
	pub fn mark(&mut self, level: usize) -> usize {
		self.ensure(level).bytes.len()
	}

	pub fn rewind_to(&mut self, level: usize, pos: usize) {
		self.ensure(level).bytes.truncate(pos);
	}

	#[must_use]
	pub fn slice(&self, level: usize, offset: usize, len: usize) -> &[u8] {
		self.levels.get(level).map_or(&[][..], |a| &a.bytes[offset..offset + len])
	}

	#[must_use]
	pub fn refcount(&self, level: usize) -> usize {
		self.levels.get(level).map_or(0, |a| a.refcount)
	}

	#[must_use]
	pub fn argcount(&self, level: usize) -> usize {
		self.levels.get(level).map_or(0, |a| a.argcount)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enter_exit_balances_refcount() {
		let mut t = ArenaTable::new();
		let base = t.enter(0);
		assert_eq!(t.refcount(0), 1);
		t.exit(0, base, false, false);
		assert_eq!(t.refcount(0), 0);
	}

	#[test]
	fn nested_calls_reuse_live_arena() {
		let mut t = ArenaTable::new();
		let outer_base = t.enter(1);
		t.push_bytes(1, b"outer");
		let inner_base = t.enter(1);
		assert_eq!(t.refcount(1), 2);
		t.push_bytes(1, b"inner");
		// inner call added no outgoing refs: its own bytes are reclaimed,
		// but the outer call's bytes (still live) must survive.
		t.exit(1, inner_base, false, false);
		assert_eq!(t.refcount(1), 1);
		assert_eq!(t.slice(1, 0, 5), b"outer");
		t.exit(1, outer_base, false, false);
		assert_eq!(t.refcount(1), 0);
	}

	#[test]
	fn in_use_argument_keeps_bytes_past_call_exit() {
		let mut t = ArenaTable::new();
		let outer_base = t.enter(2);
		let inner_base = t.enter(2);
		t.push_bytes(2, b"pushed-back");
		t.exit(2, inner_base, false, true); // in_use: must not rewind
		assert_eq!(t.slice(2, 0, 11), b"pushed-back");
		t.exit(2, outer_base, false, false);
	}

	#[test]
	fn cross_level_ref_outlives_owning_calls_exit() {
		let mut t = ArenaTable::new();
		let base = t.enter(3);
		let (off, len) = t.push_bytes(3, b"shared");
		t.add_ref(3); // a Composite elsewhere references level 3
		t.exit(3, base, true, false); // this call added an outgoing ref
		assert_eq!(t.refcount(3), 1);
		assert_eq!(t.slice(3, off, len), b"shared");
		t.release_ref(3); // owning Argv torn down later
		assert_eq!(t.refcount(3), 0);
	}
}
