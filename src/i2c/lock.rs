// Licensed under the Apache-2.0 license

//! Per-port claim token serializing master transactions.

use core::sync::atomic::{AtomicBool, Ordering};

/// Single-holder ownership flag for a port's master path
///
/// `claim` never blocks: a caller that loses the race gets `false` and must
/// report the port as busy.
#[derive(Debug, Default)]
pub struct ClaimToken {
    held: AtomicBool,
}

impl ClaimToken {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn claim(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releasing a free token is a no-op
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn second_claim_fails_until_release() {
        let token = ClaimToken::new();
        assert!(token.claim());
        assert!(!token.claim());
        token.release();
        assert!(token.claim());
    }

    #[test]
    fn double_release_is_noop() {
        let token = ClaimToken::new();
        assert!(token.claim());
        token.release();
        token.release();
        assert!(!token.is_held());
        assert!(token.claim());
        assert!(!token.claim());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        for _ in 0..200 {
            let token = ClaimToken::new();
            let winners = AtomicUsize::new(0);
            let barrier = Barrier::new(2);
            std::thread::scope(|s| {
                for _ in 0..2 {
                    s.spawn(|| {
                        barrier.wait();
                        if token.claim() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });
            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert!(token.is_held());
        }
    }
}
