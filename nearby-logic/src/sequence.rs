use std::sync::atomic::{AtomicU64, Ordering};

/// Token attached to a single outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Monotonic request counter used for last-request-wins ordering.
///
/// Every request of a kind takes a token with [RequestSequence::issue], when its response
/// arrives it's only applied if [RequestSequence::is_latest] still holds for that token.
#[derive(Debug, Default)]
pub struct RequestSequence(AtomicU64);

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestToken {
        RequestToken(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, token: RequestToken) -> bool {
        self.0.load(Ordering::SeqCst) == token.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_token_supersedes() {
        let seq = RequestSequence::new();
        let first = seq.issue();
        assert!(seq.is_latest(first));
        let second = seq.issue();
        assert!(!seq.is_latest(first));
        assert!(seq.is_latest(second));
        assert!(second > first);
    }
}
