//! Credential comparison and root identity configuration.

use crate::types::BindOutcome;
use dirsrv_types::Dn;
use parking_lot::RwLock;
use std::fmt;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

/// Stored credential value, zeroed on drop.
#[derive(Clone)]
pub struct CredentialValue(Zeroizing<Vec<u8>>);

impl CredentialValue {
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(bytes.as_ref().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialValue(<redacted>)")
    }
}

/// Compares a provided credential against the stored values of an identity.
pub trait CredentialComparator: Send + Sync {
    /// `Success` when any stored value matches, `InvalidCredentials` otherwise.
    fn find_match(&self, stored: &[CredentialValue], provided: &[u8]) -> BindOutcome;
}

/// Constant-time comparison of clear-text values.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextComparator;

impl CredentialComparator for PlaintextComparator {
    fn find_match(&self, stored: &[CredentialValue], provided: &[u8]) -> BindOutcome {
        if provided.is_empty() {
            return BindOutcome::InvalidCredentials;
        }

        // Every stored value is compared so timing does not reveal which matched.
        let matched = stored
            .iter()
            .fold(Choice::from(0), |acc, value| {
                acc | value.as_bytes().ct_eq(provided)
            });

        if bool::from(matched) {
            BindOutcome::Success
        } else {
            BindOutcome::InvalidCredentials
        }
    }
}

/// Root identity and its optional secret.
#[derive(Clone)]
pub struct RootDnConfig {
    pub root_dn: Dn,
    pub root_pw: Option<Zeroizing<String>>,
}

impl RootDnConfig {
    pub fn new(root_dn: Dn, root_pw: Option<String>) -> Self {
        Self {
            root_dn,
            root_pw: root_pw.map(Zeroizing::new),
        }
    }
}

impl fmt::Debug for RootDnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootDnConfig")
            .field("root_dn", &self.root_dn)
            .field("root_pw", &self.root_pw.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Supplies root identity snapshots to the resolver.
pub trait RootDnSource: Send + Sync {
    fn root_dn(&self) -> Dn;

    /// Copy of the current configuration, secret included. The caller drops
    /// it as soon as the comparison is done.
    fn snapshot(&self) -> RootDnConfig;

    fn is_root(&self, dn: &Dn) -> bool {
        let root = self.root_dn();
        !root.is_empty() && root == *dn
    }
}

impl RootDnSource for RootDnConfig {
    fn root_dn(&self) -> Dn {
        self.root_dn.clone()
    }

    fn snapshot(&self) -> RootDnConfig {
        self.clone()
    }
}

/// Root configuration that can be replaced while the server runs.
#[derive(Debug)]
pub struct SharedRootDn {
    inner: RwLock<RootDnConfig>,
}

impl SharedRootDn {
    pub fn new(config: RootDnConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn replace(&self, config: RootDnConfig) {
        *self.inner.write() = config;
    }
}

impl RootDnSource for SharedRootDn {
    fn root_dn(&self) -> Dn {
        self.inner.read().root_dn.clone()
    }

    fn snapshot(&self) -> RootDnConfig {
        self.inner.read().clone()
    }
}
