//! Native stack headroom for recursive script calls.
//!
//! Every Flare call level nests several Rust frames (block executor,
//! evaluator, invoke), so a deep but legal recursion can exhaust a small
//! thread stack long before `max_call_depth` is reached. `stacker` moves
//! the continuation onto a fresh segment when headroom runs low.

/// Runs `f`, growing the stack first when less than the red zone is left.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (256KB red zone).
    const RED_ZONE: usize = 256 * 1024;

    /// Stack space to allocate when growing (2MB).
    const STACK_PER_SEGMENT: usize = 2 * 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_SEGMENT, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
