use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a distinguished name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("RDN `{rdn}` is missing the `=` separator")]
    MissingSeparator { rdn: String },
    #[error("RDN `{rdn}` has an empty attribute type")]
    EmptyAttributeType { rdn: String },
    #[error("distinguished name ends with a dangling escape")]
    DanglingEscape,
}

/// Distinguished name with a cached normalized form.
///
/// The raw text is kept for display. Equality, hashing and ordering all use
/// the normalized form: attribute types and values are trimmed and
/// lowercased, and RDNs are rejoined with a bare `,`. The empty DN names the
/// anonymous identity.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    raw: String,
    normalized: String,
    /// Normalized RDNs, leaf first.
    rdns: Vec<String>,
}

impl Dn {
    /// Parse and normalize a distinguished name.
    pub fn parse(raw: &str) -> Result<Self, DnError> {
        let rdns = split_rdns(raw)?;
        let mut normalized = Vec::with_capacity(rdns.len());
        for rdn in &rdns {
            normalized.push(normalize_rdn(rdn)?);
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized: normalized.join(","),
            rdns: normalized,
        })
    }

    /// The empty DN used by anonymous binds.
    pub fn anonymous() -> Self {
        Self {
            raw: String::new(),
            normalized: String::new(),
            rdns: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs in the name.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Whether `suffix` is this DN or one of its ancestors.
    ///
    /// Compared RDN by RDN, so an escaped comma inside a value never counts
    /// as a boundary. The empty DN is a suffix of every name.
    pub fn ends_with(&self, suffix: &Dn) -> bool {
        self.rdns.ends_with(&suffix.rdns)
    }

    /// Parent entry name, `None` for the empty DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.is_empty() {
            return None;
        }
        let rest = match split_rdns(&self.raw) {
            Ok(rdns) => rdns[1..].join(","),
            Err(_) => return None,
        };
        Dn::parse(&rest).ok()
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn({:?})", self.raw)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl Default for Dn {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dn::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.raw
    }
}

/// Split on unescaped commas, leaving escapes in place.
fn split_rdns(raw: &str) -> Result<Vec<String>, DnError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut rdns = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or(DnError::DanglingEscape)?;
                current.push('\\');
                current.push(escaped);
            }
            ',' => rdns.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    rdns.push(current);
    Ok(rdns)
}

fn normalize_rdn(rdn: &str) -> Result<String, DnError> {
    let (attr, value) = rdn.split_once('=').ok_or_else(|| DnError::MissingSeparator {
        rdn: rdn.trim().to_string(),
    })?;
    let attr = attr.trim();
    if attr.is_empty() {
        return Err(DnError::EmptyAttributeType {
            rdn: rdn.trim().to_string(),
        });
    }
    Ok(format!(
        "{}={}",
        attr.to_ascii_lowercase(),
        value.trim().to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_and_spaces() {
        let a = Dn::parse("UID=Admin, ou=People ,dc=Example,dc=com").unwrap();
        let b = Dn::parse("uid=admin,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.normalized(), "uid=admin,ou=people,dc=example,dc=com");
        assert_eq!(a.as_str(), "UID=Admin, ou=People ,dc=Example,dc=com");
        assert_eq!(a.depth(), 4);
    }

    #[test]
    fn empty_dn_is_anonymous() {
        let dn = Dn::parse("  ").unwrap();
        assert!(dn.is_empty());
        assert_eq!(dn, Dn::anonymous());
    }

    #[test]
    fn escaped_commas_stay_in_the_value() {
        let dn = Dn::parse(r"cn=Smith\, John,dc=example").unwrap();
        assert_eq!(dn.depth(), 2);
        assert_eq!(dn.normalized(), r"cn=smith\, john,dc=example");
    }

    #[test]
    fn rejects_rdn_without_separator() {
        assert_eq!(
            Dn::parse("admin,dc=example"),
            Err(DnError::MissingSeparator {
                rdn: "admin".to_string()
            })
        );
        assert_eq!(Dn::parse(r"cn=x\"), Err(DnError::DanglingEscape));
    }

    #[test]
    fn suffix_matching_respects_rdn_boundaries() {
        let entry = Dn::parse("uid=a,ou=people,dc=example,dc=com").unwrap();
        let suffix = Dn::parse("dc=example,dc=com").unwrap();
        let lookalike = Dn::parse("dc=com").unwrap();

        assert!(entry.ends_with(&suffix));
        assert!(entry.ends_with(&lookalike));
        assert!(entry.ends_with(&Dn::anonymous()));
        assert!(!suffix.ends_with(&entry));
        assert!(!Dn::parse("dc=xexample,dc=com").unwrap().ends_with(&suffix));
    }

    #[test]
    fn escaped_comma_is_not_an_rdn_boundary() {
        let suffix = Dn::parse("dc=example").unwrap();
        let single = Dn::parse(r"cn=x\,dc=example").unwrap();
        assert_eq!(single.depth(), 1);
        assert!(!single.ends_with(&suffix));

        let nested = Dn::parse(r"cn=x\,dc=example,dc=example").unwrap();
        assert_eq!(nested.depth(), 2);
        assert!(nested.ends_with(&suffix));
    }

    #[test]
    fn parent_walks_up_one_level() {
        let entry = Dn::parse("uid=a,dc=example").unwrap();
        let parent = entry.parent().unwrap();
        assert_eq!(parent, Dn::parse("dc=example").unwrap());
        assert!(parent.parent().unwrap().is_empty());
        assert!(Dn::anonymous().parent().is_none());
    }

    #[test]
    fn serde_uses_the_raw_string() {
        let dn = Dn::parse("cn=Directory Manager").unwrap();
        let json = serde_json::to_string(&dn).unwrap();
        assert_eq!(json, "\"cn=Directory Manager\"");
        let back: Dn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dn);
    }
}
