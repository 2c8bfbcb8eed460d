//! URL Normalizer & Validator (spec §4.A).

use crate::error::ValidationError;
use crate::model::{ProxyTarget, Scheme};
use std::net::IpAddr;
use std::str::FromStr;

/// Trims whitespace/trailing slash, defaults a missing scheme to `http://`,
/// parses, and lowercases the scheme. Idempotent: `normalize(normalize(s)) ==
/// normalize(s)`.
pub fn normalize(s: &str) -> Result<ProxyTarget, ValidationError> {
    let trimmed = s.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidUrl(s.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = url::Url::parse(&with_scheme)
        .map_err(|e| ValidationError::InvalidUrl(format!("{with_scheme}: {e}")))?;

    let scheme = Scheme::parse(parsed.scheme())
        .ok_or_else(|| ValidationError::InvalidScheme(parsed.scheme().to_string()))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ValidationError::InvalidHost("missing host".to_string()))?
        .to_ascii_lowercase();

    let port = parsed.port().unwrap_or(match scheme {
        Scheme::Https => 443,
        Scheme::Socks4 | Scheme::Socks5 => 1080,
        Scheme::Http => 80,
    });

    let credentials = if !parsed.username().is_empty() {
        Some((parsed.username().to_string(), parsed.password().unwrap_or_default().to_string()))
    } else {
        None
    };

    if matches!(scheme, Scheme::Socks4 | Scheme::Socks5)
        && (!parsed.path().is_empty() && parsed.path() != "/"
            || parsed.query().is_some()
            || parsed.fragment().is_some())
    {
        return Err(ValidationError::InvalidUrl(
            "SOCKS URLs must not carry path, query, or fragment".to_string(),
        ));
    }

    Ok(ProxyTarget { scheme, host, port, credentials })
}

/// Validation policy applied after normalization.
#[derive(Debug, Clone)]
pub struct ValidationPolicySpec {
    pub allow_private: bool,
}

impl Default for ValidationPolicySpec {
    fn default() -> Self {
        Self { allow_private: false }
    }
}

/// Rejects a normalized target per the forbidden-IP set and structural checks
/// of spec §4.A.
pub fn validate(target: &ProxyTarget, policy: &ValidationPolicySpec) -> Result<(), ValidationError> {
    if target.host.is_empty() {
        return Err(ValidationError::InvalidHost("empty host".to_string()));
    }
    if target.port == 0 {
        return Err(ValidationError::InvalidPort(target.port.to_string()));
    }
    if target.host.len() > 253 {
        return Err(ValidationError::InvalidHost("hostname exceeds 253 characters".to_string()));
    }

    if let Ok(ip) = IpAddr::from_str(&target.host) {
        if !policy.allow_private && is_forbidden_ip(&ip) {
            return Err(ValidationError::PrivateIp(target.host.clone()));
        }
    } else if !is_rfc1123_hostname(&target.host) {
        return Err(ValidationError::InvalidHost(format!(
            "{} is not a valid RFC-1123 hostname",
            target.host
        )));
    }

    Ok(())
}

fn is_rfc1123_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// The forbidden IP set of spec §4.A. 240/4 (Class E) is intentionally permitted
/// per spec §9's resolved open question — real-world allocations exist there.
pub fn is_forbidden_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_documentation()
                || is_cgnat(v4)
        },
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || is_unique_local(v6)
                || is_v6_link_local(v6)
                || is_v6_documentation(v6)
                || is_ipv4_mapped(v6)
                || is_6to4(v6)
                || is_teredo(v6)
                || is_orchidv2(v6)
        },
    }
}

fn is_cgnat(v4: &std::net::Ipv4Addr) -> bool {
    let o = v4.octets();
    o[0] == 100 && (o[1] & 0b1100_0000) == 0b0100_0000
}

fn is_unique_local(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

fn is_v6_link_local(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

fn is_v6_documentation(v6: &std::net::Ipv6Addr) -> bool {
    v6.segments()[0] == 0x2001 && v6.segments()[1] == 0x0db8
}

fn is_ipv4_mapped(v6: &std::net::Ipv6Addr) -> bool {
    v6.to_ipv4_mapped().is_some()
}

fn is_6to4(v6: &std::net::Ipv6Addr) -> bool {
    v6.segments()[0] == 0x2002
}

fn is_teredo(v6: &std::net::Ipv6Addr) -> bool {
    v6.segments()[0] == 0x2001 && v6.segments()[1] == 0x0000
}

/// ORCHIDv2: 2001:20::/28.
fn is_orchidv2(v6: &std::net::Ipv6Addr) -> bool {
    let s = v6.segments();
    s[0] == 0x2001 && (s[1] & 0xfff0) == 0x0020
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_scheme() {
        let t = normalize("198.51.100.7:8080").unwrap();
        assert_eq!(t.scheme, Scheme::Http);
        assert_eq!(t.host, "198.51.100.7");
        assert_eq!(t.port, 8080);
    }

    #[test]
    fn normalize_trims_trailing_slash_and_whitespace() {
        let t = normalize("  http://example.com:8080/ ").unwrap();
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 8080);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("socks5://mock:1080").unwrap();
        let twice = normalize(&once.url()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_lowercases_scheme() {
        let t = normalize("HTTP://example.com:80").unwrap();
        assert_eq!(t.scheme, Scheme::Http);
    }

    #[test]
    fn socks_url_rejects_path() {
        let err = normalize("socks5://mock:1080/some/path").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl(_)));
    }

    #[test]
    fn validate_rejects_private_ip_by_default() {
        let t = normalize("10.0.0.1:8080").unwrap();
        let err = validate(&t, &ValidationPolicySpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::PrivateIp(_)));
    }

    #[test]
    fn validate_allows_private_ip_when_policy_permits() {
        let t = normalize("10.0.0.1:8080").unwrap();
        let policy = ValidationPolicySpec { allow_private: true };
        assert!(validate(&t, &policy).is_ok());
    }

    #[test]
    fn validate_permits_class_e() {
        let t = normalize("240.0.0.1:8080").unwrap();
        assert!(validate(&t, &ValidationPolicySpec::default()).is_ok());
    }

    #[test]
    fn validate_rejects_cgnat() {
        let t = normalize("100.64.0.1:8080").unwrap();
        let err = validate(&t, &ValidationPolicySpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::PrivateIp(_)));
    }

    #[test]
    fn validate_rejects_invalid_hostname() {
        let t = normalize("http://-bad-host-.com:80").unwrap();
        let err = validate(&t, &ValidationPolicySpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHost(_)));
    }

    #[test]
    fn validate_accepts_public_ip_and_normal_hostname() {
        let t = normalize("93.184.216.34:8080").unwrap();
        assert!(validate(&t, &ValidationPolicySpec::default()).is_ok());
        let t2 = normalize("http://example.com:8080").unwrap();
        assert!(validate(&t2, &ValidationPolicySpec::default()).is_ok());
    }
}
