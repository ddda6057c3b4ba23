//! Stack growth for the recursive passes.
//!
//! Parsing, translation, collapse and evaluation all recurse once per tree
//! level. Wrapping each level in [`ensure_sufficient_stack`] lets the deepest
//! tree the parser accepts run on a default-sized thread.

/// Grow the stack when less than this remains
const RED_ZONE: usize = 100 * 1024;

/// Size of each newly allocated stack segment
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
