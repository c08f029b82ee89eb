//! Custom field identifiers and their two interchangeable spellings.
//!
//! The CRM exposes user fields under two names: the upper-case form used by
//! the per-kind REST methods (`UF_CRM_123`, `UF_CRM_5_1712`) and the camel
//! form used by the generic item API (`ufCrm_123`, `ufCrm_5_1712`). Lookups
//! try the caller's spelling first, then the converted one.

pub mod metadata;

use regex_lite::Regex;
use std::fmt;
use std::sync::OnceLock;

pub use metadata::{FieldResolver, accepts_multiple, resolve_in_schema};

const UPPER_PREFIX: &str = "UF_CRM_";
const CAMEL_PREFIX: &str = "ufCrm_";

fn upper_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^UF_CRM_(_?\d+)(?:_(\d+))?$").expect("valid regex"))
}

fn camel_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ufCrm_(_?\d+)(?:_(\d+))?$").expect("valid regex"))
}

/// A caller-supplied field identifier, classified by spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIdentifier {
    /// `UF_CRM_<id>[_<id>]`
    Upper {
        raw: String,
        id: String,
        suffix: Option<String>,
    },
    /// `ufCrm_<id>[_<id>]`
    Camel {
        raw: String,
        id: String,
        suffix: Option<String>,
    },
    /// Anything else; never converted.
    Plain(String),
}

impl FieldIdentifier {
    pub fn parse(raw: &str) -> Self {
        if let Some((id, suffix)) = capture_numeric(upper_pattern(), raw) {
            return FieldIdentifier::Upper {
                raw: raw.to_string(),
                id,
                suffix,
            };
        }
        if let Some((id, suffix)) = capture_numeric(camel_pattern(), raw) {
            return FieldIdentifier::Camel {
                raw: raw.to_string(),
                id,
                suffix,
            };
        }
        FieldIdentifier::Plain(raw.to_string())
    }

    /// The identifier exactly as supplied.
    pub fn raw(&self) -> &str {
        match self {
            FieldIdentifier::Upper { raw, .. } | FieldIdentifier::Camel { raw, .. } => raw,
            FieldIdentifier::Plain(raw) => raw,
        }
    }

    /// The identifier in the other spelling, if it has one.
    pub fn converted(&self) -> Option<String> {
        match self {
            FieldIdentifier::Upper { id, suffix, .. } => Some(join(CAMEL_PREFIX, id, suffix)),
            FieldIdentifier::Camel { id, suffix, .. } => Some(join(UPPER_PREFIX, id, suffix)),
            FieldIdentifier::Plain(_) => None,
        }
    }

    /// Ordered lookup candidates: original first, then the converted spelling.
    pub fn candidates(&self) -> Vec<String> {
        let mut out = vec![self.raw().to_string()];
        if let Some(other) = self.converted() {
            if other != out[0] {
                out.push(other);
            }
        }
        out
    }
}

impl fmt::Display for FieldIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Shorthand for `FieldIdentifier::parse(raw).candidates()`.
pub fn candidates(raw: &str) -> Vec<String> {
    FieldIdentifier::parse(raw).candidates()
}

/// Find the first candidate spelling present as a key in `map`.
pub fn find_in_map<'a>(
    map: &'a serde_json::Map<String, serde_json::Value>,
    field: &FieldIdentifier,
) -> Option<(String, &'a serde_json::Value)> {
    field
        .candidates()
        .into_iter()
        .find_map(|name| map.get(&name).map(|value| (name, value)))
}

fn capture_numeric(re: &Regex, raw: &str) -> Option<(String, Option<String>)> {
    let caps = re.captures(raw)?;
    let id = caps.get(1)?.as_str().to_string();
    let suffix = caps
        .get(2)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());
    Some((id, suffix))
}

fn join(prefix: &str, id: &str, suffix: &Option<String>) -> String {
    match suffix {
        Some(suffix) => format!("{}{}_{}", prefix, id, suffix),
        None => format!("{}{}", prefix, id),
    }
}
