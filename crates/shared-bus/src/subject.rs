//! # Subject Matching
//!
//! Subjects are `.`-separated tokens. Subscription patterns may use two
//! wildcards:
//!
//! - `*` matches exactly one token (`orders.*.created`)
//! - `>` matches one or more trailing tokens and must be last (`orders.>`)

/// Single-token wildcard.
pub const WILDCARD_ONE: &str = "*";

/// Tail wildcard.
pub const WILDCARD_TAIL: &str = ">";

/// Returns true if `subject` is a concrete subject that can be published to.
#[must_use]
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject.split('.').all(|token| {
            !token.is_empty()
                && token != WILDCARD_ONE
                && token != WILDCARD_TAIL
                && !token.chars().any(char::is_whitespace)
        })
}

/// Returns true if `pattern` can be subscribed to.
#[must_use]
pub fn is_valid_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    tokens.iter().enumerate().all(|(i, token)| {
        !token.is_empty()
            && !token.chars().any(char::is_whitespace)
            && (*token != WILDCARD_TAIL || i == last)
    })
}

/// Returns true if the concrete `subject` is matched by `pattern`.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(WILDCARD_TAIL), Some(_)) => return true,
            (Some(WILDCARD_ONE), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
