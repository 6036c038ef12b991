// snapshot.rs — Policy bytes shared between the reloader and request path.
//
// The remote backend never sees policy text on the request path; the
// reloader does. After each successful upload the reloader stores the bytes
// it pushed here, and the backend reads them to stamp the config hash on
// every decision. Cloning shares the same handle.

use std::sync::{Arc, RwLock};

/// A synchronized, cloneable handle to the most recently published policy.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    inner: Arc<RwLock<Option<Arc<[u8]>>>>,
}

impl PolicySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last published policy bytes, if any.
    pub fn current(&self) -> Option<Arc<[u8]>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Replace the published policy bytes.
    pub fn publish(&self, bytes: impl Into<Arc<[u8]>>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(bytes.into());
    }
}
