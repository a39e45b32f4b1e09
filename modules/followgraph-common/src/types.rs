use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

// --- Identity ---

/// Stable numeric account identifier. Upstream IDs are positive and fit in i64,
/// which is also what the graph store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// Longest screen name the upstream API hands out.
pub const MAX_LABEL_LEN: usize = 15;

/// Either a numeric ID or a screen name. Parsed from text as
/// `12345` (ID) or `@handle` (label); nothing else is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Id(UserId),
    Label(String),
}

impl Identifier {
    /// Build a label identifier, validating the handle charset and length.
    pub fn label(label: &str) -> Result<Self, CrawlError> {
        validate_label(label)?;
        Ok(Identifier::Label(label.to_string()))
    }
}

impl From<UserId> for Identifier {
    fn from(id: UserId) -> Self {
        Identifier::Id(id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Id(id) => write!(f, "{id}"),
            Identifier::Label(label) => write!(f, "@{label}"),
        }
    }
}

impl FromStr for Identifier {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(label) = s.strip_prefix('@') {
            return Identifier::label(label);
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CrawlError::Validation(format!(
                "identifier {s:?} is neither a numeric ID nor an @label"
            )));
        }
        match s.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Identifier::Id(UserId(id))),
            _ => Err(CrawlError::Validation(format!(
                "numeric identifier {s:?} is out of range"
            ))),
        }
    }
}

fn validate_label(label: &str) -> Result<(), CrawlError> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(CrawlError::Validation(format!(
            "label {label:?} must be 1-{MAX_LABEL_LEN} characters"
        )));
    }
    if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(CrawlError::Validation(format!(
            "label {label:?} may only contain letters, digits and underscores"
        )));
    }
    Ok(())
}

// --- Records ---

/// How much we know about an account. Only ever moves `Basic -> Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    /// Stub created to anchor an edge.
    Basic,
    /// Profile attributes fetched.
    Full,
}

impl Detail {
    pub fn as_str(self) -> &'static str {
        match self {
            Detail::Basic => "basic",
            Detail::Full => "full",
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Detail {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Detail::Basic),
            "full" => Ok(Detail::Full),
            other => Err(CrawlError::Validation(format!("unknown detail level {other:?}"))),
        }
    }
}

/// A scalar profile field. Nested objects never make it into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Convert a JSON value, returning `None` for null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(AttributeValue::Int)
                .or_else(|| n.as_f64().map(AttributeValue::Float)),
            serde_json::Value::String(s) => Some(AttributeValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// Open mapping of extension profile fields, ordered for stable output.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// One account in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub screen_name: Option<String>,
    pub detail: Detail,
    pub accessed_at: DateTime<Utc>,
    /// Empty while `detail` is `Basic`.
    pub attributes: Attributes,
}

impl UserRecord {
    pub fn stub(id: UserId, accessed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            screen_name: None,
            detail: Detail::Basic,
            accessed_at,
            attributes: Attributes::new(),
        }
    }

    pub fn from_profile(profile: ProfileAttributes) -> Self {
        Self {
            id: profile.id,
            screen_name: Some(profile.screen_name),
            detail: Detail::Full,
            accessed_at: profile.accessed_at,
            attributes: profile.extra,
        }
    }

    pub fn is_full(&self) -> bool {
        self.detail == Detail::Full
    }

    /// Human-readable label for logs: the screen name when known, else the ID.
    pub fn display_label(&self) -> String {
        match &self.screen_name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }
}

/// Complete attribute set for a `Full` record, as returned by a profile fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub id: UserId,
    pub screen_name: String,
    pub accessed_at: DateTime<Utc>,
    pub extra: Attributes,
}

/// Directed "source follows target" relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FollowEdge {
    pub source: UserId,
    pub target: UserId,
}

impl FollowEdge {
    pub fn new(source: UserId, target: UserId) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for FollowEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A stub together with its current incident-edge count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedUser {
    pub record: UserRecord,
    pub degree: u64,
}
