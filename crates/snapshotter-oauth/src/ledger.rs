//! Collected tokens and the member quota.

use snapshotter_slack::{AccessToken, TokenSet};

/// Collection progress as published by the completion watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// No token collected yet.
    Waiting,
    Collecting { collected: usize, expected: usize },
    /// Every eligible member authorized and the tokens are saved.
    Complete,
}

/// Tokens keyed by member, plus how many members are expected to authorize.
#[derive(Debug, Default)]
pub struct TokenLedger {
    tokens: TokenSet,
    expected_total: Option<usize>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_total(&self) -> Option<usize> {
        self.expected_total
    }

    /// Whether the quota still has to be counted. A count of zero does not
    /// stick; the next handshake counts again.
    pub fn needs_quota(&self) -> bool {
        !matches!(self.expected_total, Some(expected) if expected > 0)
    }

    /// Set the quota unless a nonzero one is already set. Returns `true` if
    /// this call set it.
    pub fn set_expected_total(&mut self, total: usize) -> bool {
        if !self.needs_quota() {
            return false;
        }
        self.expected_total = Some(total);
        true
    }

    /// Record a member's token, replacing an earlier one from the same member.
    ///
    /// Returns `true` if the member was not recorded before.
    pub fn record(&mut self, token: AccessToken) -> bool {
        self.tokens.insert(token)
    }

    pub fn collected(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Whether exactly the expected number of members have authorized.
    pub fn is_complete(&self) -> bool {
        matches!(self.expected_total, Some(expected) if expected > 0 && self.collected() == expected)
    }

    /// Progress as of now. Never reports [`Progress::Complete`]; the watcher
    /// does that once the tokens are saved.
    pub fn progress(&self) -> Progress {
        match self.collected() {
            0 => Progress::Waiting,
            collected => Progress::Collecting {
                collected,
                expected: self.expected_total.unwrap_or(0),
            },
        }
    }
}
