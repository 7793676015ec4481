//! Anti-forgery state parameters.
//!
//! Every `/install` visit issues a fresh random state. The callback redeems
//! it exactly once; a state older than the TTL is refused even though it is
//! still removed.

use std::collections::HashMap;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tokio::time::Instant;

use crate::error::{OAuthError, Result};

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Pending states and when they were issued.
#[derive(Debug)]
pub struct ChallengeRegistry {
    ttl: Duration,
    pending: HashMap<String, Instant>,
}

impl ChallengeRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new state now.
    pub fn issue(&mut self) -> String {
        self.issue_at(Instant::now())
    }

    pub fn issue_at(&mut self, now: Instant) -> String {
        let state = generate_state();
        self.pending.insert(state.clone(), now);
        state
    }

    /// Redeem `state` now.
    pub fn consume(&mut self, state: &str) -> Result<()> {
        self.consume_at(state, Instant::now())
    }

    /// Redeem `state` as of `now`. The state is gone afterwards whatever the outcome.
    pub fn consume_at(&mut self, state: &str, now: Instant) -> Result<()> {
        let issued_at = self.pending.remove(state).ok_or(OAuthError::InvalidState)?;
        if now.saturating_duration_since(issued_at) > self.ttl {
            return Err(OAuthError::ExpiredState);
        }
        Ok(())
    }

    /// Drop states that expired more than one TTL ago. Returns how many were
    /// dropped. States inside that grace window still report
    /// [`OAuthError::ExpiredState`] when redeemed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let retain_for = self.ttl.saturating_mul(2);
        self.pending
            .retain(|_, issued_at| now.saturating_duration_since(*issued_at) <= retain_for);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn test_generate_state_is_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_consume_once() {
        let mut registry = ChallengeRegistry::new(TTL);
        let state = registry.issue();

        assert!(registry.consume(&state).is_ok());
        assert!(matches!(
            registry.consume(&state),
            Err(OAuthError::InvalidState)
        ));
    }

    #[test]
    fn test_unknown_state() {
        let mut registry = ChallengeRegistry::new(TTL);
        registry.issue();
        assert!(matches!(
            registry.consume("forged"),
            Err(OAuthError::InvalidState)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_expired_state_is_removed() {
        let mut registry = ChallengeRegistry::new(TTL);
        let issued = Instant::now();
        let state = registry.issue_at(issued);

        let later = issued + TTL + Duration::from_secs(1);
        assert!(matches!(
            registry.consume_at(&state, later),
            Err(OAuthError::ExpiredState)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_state_at_exact_ttl_is_accepted() {
        let mut registry = ChallengeRegistry::new(TTL);
        let issued = Instant::now();
        let state = registry.issue_at(issued);
        assert!(registry.consume_at(&state, issued + TTL).is_ok());
    }

    #[test]
    fn test_purge_keeps_recently_expired_states() {
        let mut registry = ChallengeRegistry::new(TTL);
        let start = Instant::now();
        let state = registry.issue_at(start);

        let later = start + TTL + Duration::from_secs(1);
        assert_eq!(registry.purge_expired(later), 0);
        assert!(matches!(
            registry.consume_at(&state, later),
            Err(OAuthError::ExpiredState)
        ));
    }

    #[test]
    fn test_purge_expired() {
        let mut registry = ChallengeRegistry::new(TTL);
        let start = Instant::now();
        registry.issue_at(start);
        let fresh = registry.issue_at(start + Duration::from_secs(900));

        let now = start + Duration::from_secs(1201);
        let purged = registry.purge_expired(now);
        assert_eq!(purged, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.consume_at(&fresh, now).is_ok());
    }
}
