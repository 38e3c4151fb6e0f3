//! `StaticPermissions`: scripted permission backend.
//!
//! Stands in for the OS dialogs on hosts that have none (desktop console,
//! tests). Each kind has a status reported by `check()` and a status that
//! `request()` moves to; prompts are counted so callers can assert the OS
//! was (or was not) asked.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Platform, PermissionBackend, PermissionKind, PermissionStatus};

#[derive(Debug, Clone, Copy)]
struct Script {
    current: PermissionStatus,
    on_request: PermissionStatus,
    prompts: u32,
}

pub struct StaticPermissions {
    platform: Platform,
    scripts: Mutex<HashMap<PermissionKind, Script>>,
}

impl StaticPermissions {
    /// Every kind starts `Undetermined` and is granted when requested.
    pub fn new(platform: Platform) -> Self {
        let scripts = PermissionKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    Script {
                        current: PermissionStatus::Undetermined,
                        on_request: PermissionStatus::Granted,
                        prompts: 0,
                    },
                )
            })
            .collect();
        Self {
            platform,
            scripts: Mutex::new(scripts),
        }
    }

    /// Every kind already granted.
    pub fn granting_all(platform: Platform) -> Self {
        let this = Self::new(platform);
        for kind in PermissionKind::ALL {
            this.set_status(kind, PermissionStatus::Granted);
        }
        this
    }

    /// Status `check()` reports (simulates the user changing OS settings).
    pub fn set_status(&self, kind: PermissionKind, status: PermissionStatus) {
        if let Some(script) = self.scripts.lock().get_mut(&kind) {
            script.current = status;
        }
    }

    /// Status the next `request()` resolves to.
    pub fn set_request_result(&self, kind: PermissionKind, status: PermissionStatus) {
        if let Some(script) = self.scripts.lock().get_mut(&kind) {
            script.on_request = status;
        }
    }

    /// How many times the "dialog" was shown for `kind`.
    pub fn prompts(&self, kind: PermissionKind) -> u32 {
        self.scripts.lock().get(&kind).map_or(0, |s| s.prompts)
    }
}

#[async_trait]
impl PermissionBackend for StaticPermissions {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn check(&self, kind: PermissionKind) -> PermissionStatus {
        self.scripts
            .lock()
            .get(&kind)
            .map_or(PermissionStatus::Unavailable, |s| s.current)
    }

    async fn request(&self, kind: PermissionKind) -> PermissionStatus {
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(&kind) else {
            return PermissionStatus::Unavailable;
        };
        script.prompts += 1;
        script.current = script.on_request;
        debug!(%kind, status = %script.current, "StaticPermissions::request");
        script.current
    }
}
