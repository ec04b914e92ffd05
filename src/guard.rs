use crate::fingerprint::{fingerprint, Fingerprint};
use colored::*;
use log::{debug, error};
use std::collections::HashMap;
use std::sync::Mutex;

/// Remembers the first response shape seen per endpoint and flags drift.
///
/// One guard lives for the whole process and is shared by every account's
/// client. Entries are only ever added.
pub struct EndpointGuard {
    enabled: bool,
    signatures: Mutex<HashMap<String, Fingerprint>>,
}

impl EndpointGuard {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            signatures: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `false` when the response no longer matches the first
    /// observation for `endpoint`. The stored signature is left untouched.
    pub fn check(&self, endpoint: &str, status: u16, body: &[u8]) -> bool {
        if !self.enabled {
            return true;
        }

        let observed = fingerprint(status, body);
        let mut signatures = self.signatures.lock().unwrap_or_else(|e| e.into_inner());

        match signatures.get(endpoint) {
            None => {
                debug!("Recorded signature {} for {}", observed, endpoint);
                signatures.insert(endpoint.to_string(), observed);
                true
            }
            Some(known) if *known == observed => true,
            Some(known) => {
                error!(
                    "{}",
                    format!(
                        "🚨 Endpoint drift on {}: expected {}, got {} (status {})",
                        endpoint, known, observed, status
                    )
                    .red()
                    .bold()
                );
                false
            }
        }
    }

    pub fn signature(&self, endpoint: &str) -> Option<Fingerprint> {
        self.signatures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.signatures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EndpointGuard {
    fn default() -> Self {
        Self::new(true)
    }
}
