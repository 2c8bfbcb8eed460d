//! Identity-response parsing (spec §6 "Identity URL contract").
//!
//! The default parser treats the body as JSON `{"ip": "..."}` and falls back
//! to the first IP-literal substring in the body text. A registry lets a
//! caller register an alternate parser keyed by name for non-default identity
//! services.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

pub trait IdentityParser: Send + Sync {
    fn parse(&self, body: &str) -> Option<String>;
}

#[derive(Deserialize)]
struct IpField {
    ip: String,
}

fn ip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:[0-9a-fA-F]{0,4}:){2,7}[0-9a-fA-F]{0,4}\b|\b(?:\d{1,3}\.){3}\d{1,3}\b")
            .expect("static regex is valid")
    })
}

/// Default identity parser: JSON `{"ip": "..."}`, falling back to the first
/// IP-literal match in the raw body.
pub struct DefaultIdentityParser;

impl IdentityParser for DefaultIdentityParser {
    fn parse(&self, body: &str) -> Option<String> {
        if let Ok(field) = serde_json::from_str::<IpField>(body) {
            if IpAddr::from_str(&field.ip).is_ok() {
                return Some(field.ip);
            }
        }
        ip_regex().find(body).map(|m| m.as_str().to_string())
    }
}

/// A registry of named parsers, for identity services that don't speak the
/// default `{"ip": "..."}` shape.
pub struct IdentityParserRegistry {
    parsers: HashMap<String, Box<dyn IdentityParser>>,
}

impl Default for IdentityParserRegistry {
    fn default() -> Self {
        let mut parsers: HashMap<String, Box<dyn IdentityParser>> = HashMap::new();
        parsers.insert("default".to_string(), Box::new(DefaultIdentityParser));
        Self { parsers }
    }
}

impl IdentityParserRegistry {
    pub fn register(&mut self, name: impl Into<String>, parser: Box<dyn IdentityParser>) {
        self.parsers.insert(name.into(), parser);
    }

    pub fn parse(&self, name: &str, body: &str) -> Option<String> {
        self.parsers.get(name).or_else(|| self.parsers.get("default"))?.parse(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_ip_field() {
        let p = DefaultIdentityParser;
        assert_eq!(p.parse(r#"{"ip":"203.0.113.42"}"#), Some("203.0.113.42".to_string()));
    }

    #[test]
    fn falls_back_to_regex_when_not_json() {
        let p = DefaultIdentityParser;
        assert_eq!(p.parse("your address is 203.0.113.42 today"), Some("203.0.113.42".to_string()));
    }

    #[test]
    fn returns_none_when_no_ip_found() {
        let p = DefaultIdentityParser;
        assert_eq!(p.parse("no ip here"), None);
    }

    #[test]
    fn registry_falls_back_to_default_parser() {
        let registry = IdentityParserRegistry::default();
        assert_eq!(
            registry.parse("unknown-service", r#"{"ip":"198.51.100.7"}"#),
            Some("198.51.100.7".to_string())
        );
    }
}
