use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::domain::catalog::PlatformId;

/// Counts live platform sessions for one client.
#[derive(Clone, Debug)]
pub struct SessionTracker {
    platform: PlatformId,
    active: Arc<AtomicUsize>,
    opened: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            active: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn open(&self, operation: &'static str) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        let session_number = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(
            event_name = "platform.session_opened",
            platform = %self.platform,
            operation,
            session_number,
            "platform session opened"
        );
        SessionGuard {
            platform: self.platform.clone(),
            operation,
            session_number,
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }
}

/// Scoped session; closing happens in `Drop` so cancelled futures release it too.
#[derive(Debug)]
pub struct SessionGuard {
    platform: PlatformId,
    operation: &'static str,
    session_number: u64,
    active: Arc<AtomicUsize>,
}

impl SessionGuard {
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(
            event_name = "platform.session_closed",
            platform = %self.platform,
            operation = self.operation,
            session_number = self.session_number,
            "platform session closed"
        );
    }
}
