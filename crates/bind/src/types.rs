use dirsrv_types::Dn;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Authentication method carried by a bind request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindMethod {
    Simple,
    Sasl { mechanism: String },
}

/// Decoded bind request.
#[derive(Clone)]
pub struct BindRequest {
    pub target: Dn,
    pub credentials: Zeroizing<Vec<u8>>,
    pub method: BindMethod,
}

impl BindRequest {
    pub fn simple(target: Dn, credentials: impl AsRef<[u8]>) -> Self {
        Self {
            target,
            credentials: Zeroizing::new(credentials.as_ref().to_vec()),
            method: BindMethod::Simple,
        }
    }

    pub fn sasl(target: Dn, mechanism: impl Into<String>, credentials: impl AsRef<[u8]>) -> Self {
        Self {
            target,
            credentials: Zeroizing::new(credentials.as_ref().to_vec()),
            method: BindMethod::Sasl {
                mechanism: mechanism.into(),
            },
        }
    }

    /// Simple bind without a password.
    pub fn is_simple_without_credentials(&self) -> bool {
        self.method == BindMethod::Simple && self.credentials.is_empty()
    }
}

impl fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRequest")
            .field("target", &self.target)
            .field("credentials", &format_args!("<{} bytes>", self.credentials.len()))
            .field("method", &self.method)
            .finish()
    }
}

/// Final result of a bind resolution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindOutcome {
    Success,
    Anonymous,
    Referral,
    NoBackend,
    InvalidCredentials,
    OperationsError,
}

impl BindOutcome {
    /// LDAP result code reported to the client.
    pub fn ldap_result_code(&self) -> u32 {
        match self {
            BindOutcome::Success | BindOutcome::Anonymous => 0,
            BindOutcome::OperationsError => 1,
            BindOutcome::Referral => 10,
            BindOutcome::NoBackend => 32,
            BindOutcome::InvalidCredentials => 49,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BindOutcome::Success | BindOutcome::Anonymous)
    }
}

impl fmt::Display for BindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            BindOutcome::Success => "success",
            BindOutcome::Anonymous => "anonymous",
            BindOutcome::Referral => "referral",
            BindOutcome::NoBackend => "no backend",
            BindOutcome::InvalidCredentials => "invalid credentials",
            BindOutcome::OperationsError => "operations error",
        };
        f.write_str(value)
    }
}

/// Where a client must go instead, when the target is not held locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub urls: Vec<String>,
}

impl Referral {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_follow_ldap() {
        assert_eq!(BindOutcome::Success.ldap_result_code(), 0);
        assert_eq!(BindOutcome::Referral.ldap_result_code(), 10);
        assert_eq!(BindOutcome::InvalidCredentials.ldap_result_code(), 49);
        assert!(BindOutcome::Anonymous.is_success());
        assert!(!BindOutcome::NoBackend.is_success());
    }

    #[test]
    fn debug_hides_credentials() {
        let request = BindRequest::simple(Dn::parse("uid=a").unwrap(), "hunter2");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<7 bytes>"));
    }

    #[test]
    fn anonymous_detection_is_simple_only() {
        let dn = Dn::parse("uid=a").unwrap();
        assert!(BindRequest::simple(dn.clone(), "").is_simple_without_credentials());
        assert!(!BindRequest::simple(dn.clone(), "pw").is_simple_without_credentials());
        assert!(!BindRequest::sasl(dn, "EXTERNAL", "").is_simple_without_credentials());
    }
}
