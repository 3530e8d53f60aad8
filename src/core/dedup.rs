//! Exact-URL deduplication for one manifest lifetime.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Set of URLs already submitted for processing
///
/// The membership check and the insert happen under one lock with no
/// suspension point in between, so of two attempts on the same URL exactly
/// one wins. Distinct URLs that later collide on a key are not covered.
#[derive(Debug, Default)]
pub struct DedupTracker {
    claimed: Mutex<HashSet<String>>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `url`; `false` if it was already claimed
    pub fn claim(&self, url: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string())
    }

    pub fn is_claimed(&self, url: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    /// Forget all claims. Only a full rebuild does this.
    pub fn reset(&self) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_once() {
        let tracker = DedupTracker::new();

        assert!(tracker.claim("https://example.com/a.js"));
        assert!(!tracker.claim("https://example.com/a.js"));
        assert!(tracker.is_claimed("https://example.com/a.js"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_exact_string_equality_only() {
        let tracker = DedupTracker::new();

        assert!(tracker.claim("https://example.com/a.js"));
        assert!(tracker.claim("https://example.com/a.js?"));
        assert!(tracker.claim("https://example.com/a.js#top"));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_reset() {
        let tracker = DedupTracker::new();
        tracker.claim("https://example.com/a.js");
        tracker.reset();

        assert!(tracker.is_empty());
        assert!(tracker.claim("https://example.com/a.js"));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let tracker = Arc::new(DedupTracker::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.claim("https://example.com/race.js"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
