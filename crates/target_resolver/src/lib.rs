//! Target Resolver - admission-time input validation
//!
//! Target domains and company names end up as argument-vector elements and
//! directory names, so both are checked against an allow-listed character
//! set before a scan is admitted:
//! - domain: `[A-Za-z0-9.-]`, at least one dot, no empty labels, at most
//!   253 characters, no leading/trailing `.` or `-`
//! - company: `[A-Za-z0-9 _-]`, at most 100 characters

use harrow_common::{ScanError, ScanResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_DOMAIN_LENGTH: usize = 253;
pub const MAX_COMPANY_NAME_LENGTH: usize = 100;

static DOMAIN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+$").expect("static domain pattern"));
static COMPANY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _-]+$").expect("static company pattern"));

pub struct TargetResolver;

impl TargetResolver {
    pub fn new() -> Self { Self }

    /// Validate a target domain and return it lowercased.
    pub fn validate_domain(domain: &str) -> ScanResult<String> {
        let d = domain.trim();
        let reject = |why: &str| ScanError::InvalidTarget(format!("{d:?}: {why}"));

        if d.is_empty() {
            return Err(reject("empty domain"));
        }
        if d.len() > MAX_DOMAIN_LENGTH {
            return Err(reject("domain too long"));
        }
        if !DOMAIN_CHARS.is_match(d) {
            return Err(reject("only letters, digits, '.' and '-' are allowed"));
        }
        if d.starts_with(['.', '-']) || d.ends_with(['.', '-']) {
            return Err(reject("must not start or end with '.' or '-'"));
        }
        if !d.contains('.') {
            return Err(reject("expected at least one dot"));
        }
        if d.split('.').any(str::is_empty) {
            return Err(reject("empty label"));
        }

        Ok(d.to_ascii_lowercase())
    }

    /// Validate a company name and return it trimmed.
    pub fn validate_company(name: &str) -> ScanResult<String> {
        let n = name.trim();
        let reject = |why: &str| ScanError::InvalidCompany(format!("{n:?}: {why}"));

        if n.is_empty() {
            return Err(reject("empty company name"));
        }
        if n.len() > MAX_COMPANY_NAME_LENGTH {
            return Err(reject("company name too long"));
        }
        if !COMPANY_CHARS.is_match(n) {
            return Err(reject("only letters, digits, spaces, '-' and '_' are allowed"));
        }

        Ok(n.to_string())
    }
}

impl Default for TargetResolver { fn default() -> Self { Self::new() } }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_domains() {
        assert_eq!(TargetResolver::validate_domain("example.com").unwrap(), "example.com");
        assert_eq!(
            TargetResolver::validate_domain(" Sub-1.Example.CO.uk ").unwrap(),
            "sub-1.example.co.uk"
        );
    }

    #[test]
    fn rejects_shell_metacharacters() {
        for bad in ["example.com; rm -rf /", "$(id).example.com", "a|b.com", "exa mple.com"] {
            let err = TargetResolver::validate_domain(bad).unwrap_err();
            assert!(matches!(err, ScanError::InvalidTarget(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_malformed_structure() {
        assert!(TargetResolver::validate_domain("").is_err());
        assert!(TargetResolver::validate_domain("localhost").is_err());
        assert!(TargetResolver::validate_domain(".example.com").is_err());
        assert!(TargetResolver::validate_domain("example.com-").is_err());
        assert!(TargetResolver::validate_domain("example..com").is_err());
        assert!(TargetResolver::validate_domain(&format!("{}.com", "a".repeat(260))).is_err());
    }

    #[test]
    fn company_names() {
        assert_eq!(TargetResolver::validate_company("  Acme Corp_2 ").unwrap(), "Acme Corp_2");
        assert!(TargetResolver::validate_company("").is_err());
        assert!(TargetResolver::validate_company("../etc").is_err());
        assert!(TargetResolver::validate_company(&"x".repeat(101)).is_err());
    }
}
