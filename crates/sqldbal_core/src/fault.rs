//! A single, narrow fault-injection seam.
//!
//! Rust's global allocator aborts the process on real allocation failure,
//! so the out-of-memory sentinel path (§4.2, §8 "Sentinel safety") can't be
//! exercised by actually starving the allocator. This thread-local flag
//! lets a test force the next `Connection::open` to take that path instead.

use std::cell::Cell;

thread_local! {
    static FORCE_NEXT_OPEN_OOM: Cell<bool> = const { Cell::new(false) };
}

/// Arranges for the next `Connection::open` call on this thread to behave
/// as though connection-value allocation failed.
pub fn force_next_open_oom() {
    FORCE_NEXT_OPEN_OOM.with(|f| f.set(true));
}

/// Consumes (clears) the forced-failure flag, returning whether it was set.
pub fn take_forced_open_oom() -> bool {
    FORCE_NEXT_OPEN_OOM.with(|f| f.replace(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_one_shot() {
        assert!(!take_forced_open_oom());
        force_next_open_oom();
        assert!(take_forced_open_oom());
        assert!(!take_forced_open_oom());
    }
}
