//! Bind resolver
//!
//! Evaluates a bind in strict priority order and stops at the first check
//! that determines an outcome:
//! 1. Root identity (compared against the configured root secret)
//! 2. Anonymous simple bind
//! 3. Backend selection, which may end in a referral
//! 4. The selected backend's own bind

use crate::backend::{BackendLock, BackendRouter, Selection};
use crate::context::BindContext;
use crate::credentials::{CredentialComparator, CredentialValue, RootDnSource};
use crate::types::{BindMethod, BindOutcome, BindRequest};
use dirsrv_types::Dn;
use std::sync::Arc;
use tracing::debug;

pub struct BindResolver {
    router: Arc<dyn BackendRouter>,
    comparator: Arc<dyn CredentialComparator>,
    root: Arc<dyn RootDnSource>,
}

impl BindResolver {
    pub fn new(
        router: Arc<dyn BackendRouter>,
        comparator: Arc<dyn CredentialComparator>,
        root: Arc<dyn RootDnSource>,
    ) -> Self {
        Self {
            router,
            comparator,
            root,
        }
    }

    /// Check `credentials` against the configured root secret.
    ///
    /// Returns `OperationsError` when no comparison is possible: no secret
    /// is configured or `target` is not the root DN. The secret copy is
    /// zeroed before returning.
    pub fn verify_root_identity(&self, target: &Dn, credentials: &[u8]) -> BindOutcome {
        let snapshot = self.root.snapshot();
        match &snapshot.root_pw {
            Some(root_pw) if !snapshot.root_dn.is_empty() && snapshot.root_dn == *target => {
                let stored = [CredentialValue::from_bytes(root_pw.as_bytes())];
                self.comparator.find_match(&stored, credentials)
            }
            _ => BindOutcome::OperationsError,
        }
    }

    /// Route the identity held by `ctx` to its backend and run the backend bind.
    ///
    /// `ctx` must already carry the target DN and credentials. The backend
    /// lock is released before this returns, whatever the outcome.
    pub fn resolve_and_bind(&self, ctx: &mut BindContext) -> BindOutcome {
        let target = match (ctx.target(), ctx.credentials()) {
            (Some(target), Some(_)) => target.clone(),
            _ => return BindOutcome::OperationsError,
        };

        let lock = match self.select_backend(&target, ctx) {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        let outcome = match ctx.backend().cloned() {
            Some(backend) => backend.bind(ctx),
            None => BindOutcome::OperationsError,
        };
        lock.release();

        debug!("backend bind for {target}: {outcome}");
        outcome
    }

    /// Check that `request` names an identity that can be bound, without
    /// binding it. Used by SASL auto-binds before the identity is set.
    ///
    /// `ctx` must not carry a target or credentials yet; a context that does
    /// has already been resolved and yields `OperationsError`. A referral
    /// already on `ctx` is returned as `Referral`. No backend lock is held
    /// once this returns.
    pub fn validate_identity_has_backend(
        &self,
        request: &BindRequest,
        ctx: &mut BindContext,
    ) -> BindOutcome {
        if ctx.is_populated() {
            return BindOutcome::OperationsError;
        }

        if ctx.referral().is_some() {
            return BindOutcome::Referral;
        }

        if request.is_simple_without_credentials() {
            return BindOutcome::Anonymous;
        }

        if self.root.is_root(&request.target) {
            return BindOutcome::Success;
        }

        match self.select_backend(&request.target, ctx) {
            Ok(lock) => {
                lock.release();
                BindOutcome::Success
            }
            Err(outcome) => outcome,
        }
    }

    /// Full bind: root check, anonymous check, then backend routing.
    ///
    /// A root DN with no configured secret is not decided by the root check
    /// and goes on to backend routing.
    pub fn bind(&self, request: &BindRequest, ctx: &mut BindContext) -> BindOutcome {
        if ctx.is_populated() {
            return BindOutcome::OperationsError;
        }

        if self.root.is_root(&request.target) {
            let outcome = self.verify_root_identity(&request.target, &request.credentials);
            if outcome != BindOutcome::OperationsError {
                ctx.set_target(request.target.clone());
                debug!("root bind for {}: {outcome}", request.target);
                return outcome;
            }
        }

        if request.method == BindMethod::Simple
            && request.target.is_empty()
            && request.credentials.is_empty()
        {
            return BindOutcome::Anonymous;
        }

        ctx.set_target(request.target.clone());
        ctx.set_credentials(request.credentials.as_slice());
        self.resolve_and_bind(ctx)
    }

    /// Select, check and attach the backend for `target`.
    ///
    /// On success the backend is attached to `ctx` with its result handlers
    /// installed, and the caller owns the returned lock. Every failure
    /// releases the lock before returning the outcome.
    fn select_backend(
        &self,
        target: &Dn,
        ctx: &mut BindContext,
    ) -> Result<BackendLock, BindOutcome> {
        let Selection {
            backend,
            referral,
            lock,
        } = match self.router.select(target) {
            Ok(selection) => selection,
            Err(e) => {
                debug!("no backend for {target}: {e}");
                return Err(BindOutcome::NoBackend);
            }
        };

        if let Some(referral) = referral {
            lock.release();
            ctx.set_referral(referral);
            return Err(BindOutcome::Referral);
        }

        ctx.attach_backend(Arc::clone(&backend));
        if !backend.supports_bind() {
            lock.release();
            debug!("backend {} does not support bind", backend.name());
            return Err(BindOutcome::OperationsError);
        }

        ctx.install_result_handlers(backend.result_handlers());
        Ok(lock)
    }
}
