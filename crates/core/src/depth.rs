//! Reentrancy depth tracking
//!
//! Counts nested native -> script transitions. Depth 0 means we are at
//! native top level; depth > 0 means some script is on the call stack and a
//! native binding may be running on its behalf.
//!
//! The counter is only ever changed through [`CallDepth::enter`], which
//! returns a guard that restores the previous depth when dropped. That way
//! an early return, a `?`, or a panic unwinding through the call site all
//! leave the counter balanced.
//!
//! ```rust
//! use lunabridge_core::CallDepth;
//!
//! let depth = CallDepth::new();
//! {
//!     let _guard = depth.enter();
//!     assert!(depth.in_script());
//! }
//! assert_eq!(depth.current(), 0);
//! ```

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct CallDepth {
    depth: Cell<usize>,
}

impl CallDepth {
    pub fn new() -> Self {
        Self {
            depth: Cell::new(0),
        }
    }

    /// Enter the engine: increments now, decrements when the guard drops
    #[must_use = "dropping the guard immediately leaves the engine again"]
    pub fn enter(&self) -> DepthGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        DepthGuard { depth: self }
    }

    pub fn current(&self) -> usize {
        self.depth.get()
    }

    /// True when at least one native -> script call is in progress
    pub fn in_script(&self) -> bool {
        self.depth.get() > 0
    }

    fn leave(&self) {
        match self.depth.get().checked_sub(1) {
            Some(depth) => self.depth.set(depth),
            None => reentrancy_violation("call depth decremented below zero"),
        }
    }
}

/// Scoped engine entry; see [`CallDepth::enter`]
#[derive(Debug)]
pub struct DepthGuard<'a> {
    depth: &'a CallDepth,
}

impl DepthGuard<'_> {
    /// Depth while this guard is held
    pub fn depth(&self) -> usize {
        self.depth.current()
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.leave();
    }
}

/// Report a broken call-depth invariant and terminate the process
///
/// Once the native and script call stacks disagree nothing downstream can
/// be trusted, so there is no recovery path.
pub fn reentrancy_violation(detail: &str) -> ! {
    tracing::error!("[LUA FATAL] reentrancy violation: {}", detail);
    eprintln!("[LUA FATAL] reentrancy violation: {}", detail);
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let depth = CallDepth::new();
        assert_eq!(depth.current(), 0);
        assert!(!depth.in_script());
    }

    #[test]
    fn test_guard_restores_depth() {
        let depth = CallDepth::new();
        {
            let guard = depth.enter();
            assert_eq!(guard.depth(), 1);
            {
                let inner = depth.enter();
                assert_eq!(inner.depth(), 2);
            }
            assert_eq!(depth.current(), 1);
        }
        assert_eq!(depth.current(), 0);
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn fails(depth: &CallDepth) -> Result<(), String> {
            let _guard = depth.enter();
            Err("script failed".to_string())
        }

        let depth = CallDepth::new();
        assert!(fails(&depth).is_err());
        assert_eq!(depth.current(), 0);
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let depth = CallDepth::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = depth.enter();
            panic!("binding blew up");
        }));
        assert!(result.is_err());
        assert_eq!(depth.current(), 0);
    }
}
