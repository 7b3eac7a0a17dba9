//! Backend contract, selection result and the scoped backend lock.

use crate::context::{BindContext, ResultHandlers};
use crate::errors::Result;
use crate::types::{BindOutcome, Referral};
use dirsrv_types::Dn;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Storage backend that owns part of the namespace.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend implements [`Backend::bind`].
    fn supports_bind(&self) -> bool;

    /// Authenticate the identity and credentials held by `ctx`.
    fn bind(&self, ctx: &mut BindContext) -> BindOutcome;

    /// Result-reporting path installed on the context before `bind` runs.
    fn result_handlers(&self) -> ResultHandlers {
        ResultHandlers::database_default()
    }
}

/// Hold on a selected backend. Released exactly once: explicitly through
/// [`BackendLock::release`], or on drop.
pub struct BackendLock {
    backend: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl BackendLock {
    pub fn new(backend: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            backend: backend.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            trace!("released backend lock on {}", self.backend);
        }
    }
}

impl Drop for BackendLock {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for BackendLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendLock")
            .field("backend", &self.backend)
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Outcome of a successful router selection.
///
/// The lock is held even when `referral` is set.
pub struct Selection {
    pub backend: Arc<dyn Backend>,
    pub referral: Option<Referral>,
    pub lock: BackendLock,
}

/// Maps a target DN to the backend that owns it.
pub trait BackendRouter: Send + Sync {
    fn select(&self, target: &Dn) -> Result<Selection>;
}
