//! Non-reentrant section guard
//!
//! Held for the whole of a mint or redeem. A nested entry attempt (from a
//! venue callback, say) fails immediately instead of interleaving.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FundError, Result};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

/// Scoped hold on a [`ReentrancyGuard`]; released on drop, error paths included.
#[must_use = "the guard is released as soon as the lock is dropped"]
#[derive(Debug)]
pub struct GuardLock<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Result<GuardLock<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FundError::Reentrancy)?;
        Ok(GuardLock { guard: self })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

impl Drop for GuardLock<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_entry_rejected() {
        let guard = ReentrancyGuard::new();
        let lock = guard.enter().unwrap();
        assert!(guard.is_entered());
        assert_eq!(guard.enter().unwrap_err(), FundError::Reentrancy);
        drop(lock);
        assert!(!guard.is_entered());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(guard: &ReentrancyGuard) -> Result<()> {
            let _lock = guard.enter()?;
            Err(FundError::ZeroAmount("deposit"))
        }

        let guard = ReentrancyGuard::new();
        assert!(failing(&guard).is_err());
        assert!(!guard.is_entered());
    }
}
