//! Process-wide record of which physical devices are bound to a running
//! stream.
//!
//! A claim is an RAII guard: the identifier is inserted atomically when the
//! guard is created and removed when it is dropped, so a stream that fails
//! half-way through start-up can never leave a dangling claim.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of currently bound device identifiers
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    claimed: Mutex<BTreeSet<String>>,
}

impl ClaimRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `uid` for exclusive use. Returns `None` if it is already bound.
    pub fn try_claim(self: &Arc<Self>, uid: &str) -> Option<DeviceClaim> {
        let mut claimed = self.claimed.lock();
        if !claimed.insert(uid.to_string()) {
            return None;
        }
        log::debug!("Claimed device {}", uid);
        Some(DeviceClaim {
            registry: Arc::clone(self),
            uid: uid.to_string(),
        })
    }

    pub fn is_claimed(&self, uid: &str) -> bool {
        self.claimed.lock().contains(uid)
    }

    /// Sorted copy of the bound identifiers
    pub fn snapshot(&self) -> Vec<String> {
        self.claimed.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.lock().is_empty()
    }

    fn release(&self, uid: &str) {
        if self.claimed.lock().remove(uid) {
            log::debug!("Released device {}", uid);
        }
    }
}

/// Exclusive binding of one device identifier, released on drop
#[derive(Debug)]
pub struct DeviceClaim {
    registry: Arc<ClaimRegistry>,
    uid: String,
}

impl DeviceClaim {
    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.registry.release(&self.uid);
    }
}
