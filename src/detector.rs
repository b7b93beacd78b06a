//! Payload change detection.

use sha2::{Digest, Sha256};

/// Remembers the fingerprint of the last payload that was acted upon.
///
/// Takes `&mut self`, so a single owner serialises all calls. Sharing a
/// detector between concurrent cycles would need a lock around it.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the payload if it differs from the last one.
    ///
    /// The first payload ever seen always counts as a change.
    pub fn should_proceed(&mut self, payload: &[u8]) -> bool {
        let current = fingerprint(payload);
        if self.last.as_deref() == Some(current.as_str()) {
            return false;
        }
        self.last = Some(current);
        true
    }

    /// Fingerprint of the last recorded payload, if any.
    #[cfg(test)]
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Lowercase hex SHA-256 of `payload`.
pub fn fingerprint(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
