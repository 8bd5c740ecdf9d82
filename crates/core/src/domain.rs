use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]+(([-]?[a-zA-Z0-9]+)*\.)+)*[a-zA-Z]{2,}$")
        .expect("hostname pattern compiles")
});

const SCHEMES: [&str; 2] = ["http://", "https://"];

/// Errors produced by domain validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,
    #[error("'{0}' is not a valid hostname")]
    Invalid(String),
}

/// Normalizes free-form user input into a bare hostname.
///
/// Drops the scheme, anything from the first `/`, `?` or `#`, lowercases
/// and strips combining diacritics after canonical decomposition.
pub fn normalize_domain(raw: &str) -> String {
    let mut value = raw.trim();
    for scheme in SCHEMES {
        if let Some(prefix) = value.get(..scheme.len()) {
            if prefix.eq_ignore_ascii_case(scheme) {
                value = &value[scheme.len()..];
            }
        }
    }

    let host = value.split(['/', '?', '#']).next().unwrap_or_default();
    host.to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// Checks that an already normalized value is shaped like a hostname.
pub fn validate_domain(domain: &str) -> Result<(), DomainError> {
    if domain.is_empty() {
        return Err(DomainError::Empty);
    }
    if HOSTNAME.is_match(domain) {
        Ok(())
    } else {
        Err(DomainError::Invalid(domain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_path_case_and_diacritics() {
        assert_eq!(
            normalize_domain("https://WWW.Exämple.com/path?x=1"),
            "www.example.com"
        );
        assert_eq!(normalize_domain("http://fonts.test#top"), "fonts.test");
        assert_eq!(normalize_domain("HTTPS://Shop.Test?ref=1"), "shop.test");
        assert_eq!(normalize_domain("  café.fr/menu "), "cafe.fr");
    }

    #[test]
    fn accepts_hostname_shaped_values() {
        for domain in ["a.b.co", "www.example.com", "my-site.io", "localhost"] {
            assert_eq!(validate_domain(domain), Ok(()), "{domain}");
        }
    }

    #[test]
    fn rejects_malformed_values() {
        for domain in [
            "not a domain",
            "-bad-.com",
            "bad-.com",
            "a--b.com",
            "example.c",
            "example.123",
            "exa_mple.com",
        ] {
            assert!(validate_domain(domain).is_err(), "{domain}");
        }
        assert_eq!(validate_domain(""), Err(DomainError::Empty));
    }
}
