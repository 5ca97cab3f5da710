//! Domain patterns used by network policy rules.
//!
//! Three shapes are accepted:
//! - `example.com`: exact host, case-insensitive, trailing dot ignored;
//! - `*.example.com`: any subdomain at any depth, but not the apex;
//! - `*`: every host.

use std::fmt;

use serde::{Deserialize, Serialize};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Parsed, normalized form of a rule's `domain` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DomainPattern {
    Exact(String),
    /// Stores the suffix without the leading `*.`.
    Subdomains(String),
    Any,
}

/// Lowercase, trim and drop one trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    match host.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

fn check_domain_body(body: &str, raw: &str) -> Result<(), String> {
    if body.is_empty() {
        return Err(format!("pattern '{raw}' has no domain after the wildcard"));
    }
    if body.len() > MAX_DOMAIN_LEN {
        return Err(format!("pattern '{raw}' is longer than {MAX_DOMAIN_LEN} characters"));
    }
    for label in body.split('.') {
        if label.is_empty() {
            return Err(format!("pattern '{raw}' contains an empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!("pattern '{raw}' has a label longer than {MAX_LABEL_LEN} characters"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("pattern '{raw}' contains invalid characters in '{label}'"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("pattern '{raw}' has a label starting or ending with '-'"));
        }
    }
    Ok(())
}

impl DomainPattern {
    /// Parse a rule domain, returning a human-readable reason on rejection.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("pattern must not be empty".to_string());
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(format!("pattern '{raw}' must not contain whitespace"));
        }
        if raw.contains("://") {
            return Err(format!("pattern '{raw}' must be a bare domain, not a URL with a scheme"));
        }
        if raw.contains('/') {
            return Err(format!("pattern '{raw}' must not contain a path"));
        }
        if raw.contains(':') {
            return Err(format!("pattern '{raw}' must not contain a port"));
        }
        if raw == "*" {
            return Ok(Self::Any);
        }
        if raw.contains("**") {
            return Err(format!("pattern '{raw}' contains a double wildcard"));
        }
        if raw.matches('*').count() > 1 {
            return Err(format!("pattern '{raw}' contains more than one wildcard"));
        }

        let normalized = normalize_host(raw);
        match normalized.strip_prefix("*.") {
            Some(suffix) => {
                check_domain_body(suffix, raw)?;
                Ok(Self::Subdomains(suffix.to_string()))
            }
            None if normalized.contains('*') => Err(format!(
                "pattern '{raw}' may only use a wildcard as a leading '*.'"
            )),
            None => {
                check_domain_body(&normalized, raw)?;
                Ok(Self::Exact(normalized))
            }
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Match an already-normalized host.
    pub fn matches_normalized(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(domain) => host == domain,
            Self::Subdomains(suffix) => host
                .strip_suffix(suffix.as_str())
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        self.matches_normalized(&normalize_host(host))
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(d) => f.write_str(d),
            Self::Subdomains(s) => write!(f, "*.{s}"),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Whether `raw` is an acceptable rule domain.
pub fn is_valid_pattern(raw: &str) -> bool {
    DomainPattern::parse(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_three_shapes() {
        assert_eq!(DomainPattern::parse("*").unwrap(), DomainPattern::Any);
        assert_eq!(
            DomainPattern::parse("GitHub.com.").unwrap(),
            DomainPattern::Exact("github.com".into())
        );
        assert_eq!(
            DomainPattern::parse("*.githubusercontent.com").unwrap(),
            DomainPattern::Subdomains("githubusercontent.com".into())
        );
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in [
            "",
            "   ",
            "**",
            "**.example.com",
            "*.*.example.com",
            "https://example.com",
            "example.com/path",
            "example.com:443",
            "exa mple.com",
            "foo.*.com",
            "example*.com",
            "*example.com",
            "a..com",
            ".example.com",
            "*.",
            "-bad.com",
            "bad!.com",
        ] {
            assert!(!is_valid_pattern(bad), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn exact_match_is_case_insensitive_and_ignores_trailing_dot() {
        let p = DomainPattern::parse("api.github.com").unwrap();
        assert!(p.matches("API.GitHub.com"));
        assert!(p.matches("api.github.com."));
        assert!(!p.matches("github.com"));
        assert!(!p.matches("evilapi.github.com"));
    }

    #[test]
    fn wildcard_matches_any_depth_but_not_apex() {
        let p = DomainPattern::parse("*.example.com").unwrap();
        assert!(p.matches("a.example.com"));
        assert!(p.matches("a.b.c.example.com"));
        assert!(!p.matches("example.com"));
        assert!(!p.matches("badexample.com"));
        assert!(!p.matches("example.com.evil.net"));
    }

    #[test]
    fn catch_all_matches_everything() {
        assert!(DomainPattern::Any.matches("anything.at.all"));
        assert!(DomainPattern::Any.is_catch_all());
    }
}
