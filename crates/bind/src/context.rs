//! Per-request bind parameter block.

use crate::backend::Backend;
use crate::types::{BindMethod, BindOutcome, Referral};
use dirsrv_types::Dn;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Function a backend calls to report its result to the client.
pub type SendResultFn = fn(&mut BindContext, BindOutcome);

/// Result-reporting path installed on a context before the backend runs.
#[derive(Clone, Copy)]
pub struct ResultHandlers {
    send_result: SendResultFn,
}

impl ResultHandlers {
    pub fn new(send_result: SendResultFn) -> Self {
        Self { send_result }
    }

    /// Default path used by database backends: record the outcome on the
    /// context for the frontend to encode.
    pub fn database_default() -> Self {
        Self::new(record_result)
    }
}

impl fmt::Debug for ResultHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandlers").finish_non_exhaustive()
    }
}

fn record_result(ctx: &mut BindContext, outcome: BindOutcome) {
    debug!(
        "bind result for {}: {outcome}",
        ctx.target().map(Dn::as_str).unwrap_or("")
    );
    ctx.sent_result = Some(outcome);
}

/// State accumulated while resolving one bind request.
///
/// Credentials are zeroed when the context is dropped.
pub struct BindContext {
    method: BindMethod,
    target: Option<Dn>,
    credentials: Option<Zeroizing<Vec<u8>>>,
    backend: Option<Arc<dyn Backend>>,
    result_handlers: Option<ResultHandlers>,
    referral: Option<Referral>,
    sent_result: Option<BindOutcome>,
}

impl BindContext {
    pub fn new(method: BindMethod) -> Self {
        Self {
            method,
            target: None,
            credentials: None,
            backend: None,
            result_handlers: None,
            referral: None,
            sent_result: None,
        }
    }

    pub fn method(&self) -> &BindMethod {
        &self.method
    }

    pub fn target(&self) -> Option<&Dn> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: Dn) {
        self.target = Some(target);
    }

    pub fn credentials(&self) -> Option<&[u8]> {
        self.credentials.as_ref().map(|c| c.as_slice())
    }

    pub fn set_credentials(&mut self, credentials: impl AsRef<[u8]>) {
        self.credentials = Some(Zeroizing::new(credentials.as_ref().to_vec()));
    }

    /// Whether identity or credentials were already established.
    pub fn is_populated(&self) -> bool {
        self.target.is_some() || self.credentials.is_some()
    }

    pub fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub(crate) fn attach_backend(&mut self, backend: Arc<dyn Backend>) {
        self.backend = Some(backend);
    }

    pub fn has_result_handlers(&self) -> bool {
        self.result_handlers.is_some()
    }

    pub(crate) fn install_result_handlers(&mut self, handlers: ResultHandlers) {
        self.result_handlers = Some(handlers);
    }

    pub fn referral(&self) -> Option<&Referral> {
        self.referral.as_ref()
    }

    /// Record a referral determined before resolution.
    pub fn set_referral(&mut self, referral: Referral) {
        self.referral = Some(referral);
    }

    pub fn take_referral(&mut self) -> Option<Referral> {
        self.referral.take()
    }

    /// Report a result through the installed handlers.
    pub fn send_result(&mut self, outcome: BindOutcome) {
        match self.result_handlers {
            Some(handlers) => (handlers.send_result)(self, outcome),
            None => {
                warn!("bind result {outcome} sent before result handlers were installed");
                self.sent_result = Some(outcome);
            }
        }
    }

    /// Last result reported through [`Self::send_result`].
    pub fn sent_result(&self) -> Option<BindOutcome> {
        self.sent_result
    }
}

impl fmt::Debug for BindContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindContext")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("has_credentials", &self.credentials.is_some())
            .field("backend", &self.backend_name())
            .field("referral", &self.referral)
            .field("sent_result", &self.sent_result)
            .finish()
    }
}
