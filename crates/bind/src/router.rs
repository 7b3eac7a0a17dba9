//! Suffix-based backend router.

use crate::backend::{Backend, BackendLock, BackendRouter, Selection};
use crate::errors::*;
use crate::types::Referral;
use dirsrv_types::Dn;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

struct BackendSlot {
    backend: Arc<dyn Backend>,
    holders: AtomicUsize,
    online: AtomicBool,
}

struct MountPoint {
    suffix: Dn,
    slot: Arc<BackendSlot>,
    referral: Option<Referral>,
}

/// Routes a DN to the backend mounted at its longest matching suffix.
///
/// Every selection takes a hold on the backend that lasts until the returned
/// [`BackendLock`] is released.
#[derive(Default)]
pub struct SuffixRouter {
    mounts: RwLock<Vec<MountPoint>>,
    slots: RwLock<HashMap<String, Arc<BackendSlot>>>,
}

impl SuffixRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `backend` at `suffix`. A backend may serve several suffixes.
    ///
    /// Backends are identified by name: mounting a different backend under a
    /// name that is already registered fails with
    /// [`RouterError::BackendNameInUse`].
    pub fn mount(&self, suffix: Dn, backend: Arc<dyn Backend>) -> Result<()> {
        let mut mounts = self.mounts.write();
        if mounts.iter().any(|m| m.suffix == suffix) {
            return Err(RouterError::DuplicateSuffix {
                suffix: suffix.to_string(),
            });
        }

        let name = backend.name().to_string();
        let mut slots = self.slots.write();
        let slot = match slots.get(&name) {
            Some(slot) if same_backend(&slot.backend, &backend) => Arc::clone(slot),
            Some(_) => return Err(RouterError::BackendNameInUse { backend: name }),
            None => {
                let slot = Arc::new(BackendSlot {
                    backend,
                    holders: AtomicUsize::new(0),
                    online: AtomicBool::new(true),
                });
                slots.insert(name, Arc::clone(&slot));
                slot
            }
        };

        debug!("mounted backend {} at {}", slot.backend.name(), suffix);
        mounts.push(MountPoint {
            suffix,
            slot,
            referral: None,
        });
        Ok(())
    }

    /// Turn a mounted suffix into a referral, or back with `None`.
    pub fn set_referral(&self, suffix: &Dn, referral: Option<Referral>) -> Result<()> {
        let mut mounts = self.mounts.write();
        let mount = mounts
            .iter_mut()
            .find(|m| m.suffix == *suffix)
            .ok_or_else(|| RouterError::NoSuchSuffix {
                dn: suffix.to_string(),
            })?;
        mount.referral = referral;
        Ok(())
    }

    pub fn set_online(&self, backend: &str, online: bool) -> Result<()> {
        let slots = self.slots.read();
        let slot = slots.get(backend).ok_or_else(|| RouterError::UnknownBackend {
            backend: backend.to_string(),
        })?;
        slot.online.store(online, Ordering::SeqCst);
        Ok(())
    }

    /// Number of outstanding locks on `backend`.
    pub fn holders(&self, backend: &str) -> usize {
        self.slots
            .read()
            .get(backend)
            .map(|slot| slot.holders.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

fn same_backend(a: &Arc<dyn Backend>, b: &Arc<dyn Backend>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl BackendRouter for SuffixRouter {
    fn select(&self, target: &Dn) -> Result<Selection> {
        let mounts = self.mounts.read();
        let mount = mounts
            .iter()
            .filter(|m| target.ends_with(&m.suffix))
            .max_by_key(|m| m.suffix.depth())
            .ok_or_else(|| RouterError::NoSuchSuffix {
                dn: target.to_string(),
            })?;

        let slot = Arc::clone(&mount.slot);
        if !slot.online.load(Ordering::SeqCst) {
            return Err(RouterError::BackendOffline {
                backend: slot.backend.name().to_string(),
            });
        }

        slot.holders.fetch_add(1, Ordering::SeqCst);
        debug!(
            "selected backend {} for {} via {}",
            slot.backend.name(),
            target,
            mount.suffix
        );

        let backend = Arc::clone(&slot.backend);
        let name = backend.name().to_string();
        let lock = BackendLock::new(name, move || {
            slot.holders.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(Selection {
            backend,
            referral: mount.referral.clone(),
            lock,
        })
    }
}
