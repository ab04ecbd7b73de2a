//! Process-wide "credential invalid" flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Sticky flag tripped by the first credential rejection.
///
/// While tripped every scheduler call fails fast. Only [`reset`](Self::reset)
/// clears it.
#[derive(Debug, Default)]
pub struct CredentialGate {
    invalid: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CredentialGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the gate. Returns `true` only for the call that tripped it.
    pub fn invalidate(&self, reason: impl Into<String>) -> bool {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        let newly = !self.invalid.swap(true, Ordering::SeqCst);
        if newly {
            *slot = Some(reason.into());
        }
        newly
    }

    pub fn reset(&self) {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        self.invalid.store(false, Ordering::SeqCst);
        *slot = None;
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
