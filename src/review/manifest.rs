use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Manifest schema ──

/// A review plan: groups of changed files, optional flags and explanation,
/// pinned to a base/head ref pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub base: String,
    pub head: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub severity: Severity,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub file: String,
    /// 1-based line in the head version of `file`
    pub line: u32,
}

impl Flag {
    /// Text copied to the clipboard when the flag is opened
    pub fn clip_text(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{} | {}", self.title, summary),
            None => self.title.clone(),
        }
    }

    /// Short location label, e.g. `src/lib.rs:42`
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Error => "✖",
            Severity::Warning => "⚠",
            Severity::Info => "ⓘ",
        }
    }
}

// ── Validation ──

/// Fatal manifest load errors. The first failing check wins.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Invalid JSON: {0}")]
    Parse(serde_json::Error),

    #[error("{0}")]
    Schema(String),

    #[error("Unsafe git ref {reference:?}: {reason}")]
    UnsafeRef {
        reference: String,
        reason: &'static str,
    },
}

impl ManifestError {
    fn schema(msg: impl Into<String>) -> Self {
        ManifestError::Schema(msg.into())
    }
}

/// Parse and structurally validate a raw review manifest.
///
/// Checks run in a fixed order and stop at the first failure: object at the
/// top level, `meta.base`/`meta.head` strings, a `groups` array, then the two
/// ref safety checks. Refs end up as git arguments, so anything that could be
/// read as an option or that falls outside the ref token grammar is rejected.
pub fn validate(raw: &[u8]) -> Result<Manifest, ManifestError> {
    let value: Value = serde_json::from_slice(raw).map_err(ManifestError::Parse)?;

    let obj = value
        .as_object()
        .ok_or_else(|| ManifestError::schema("Review JSON must be an object"))?;

    let meta = obj.get("meta").and_then(Value::as_object);
    let base = meta.and_then(|m| m.get("base")).and_then(Value::as_str);
    let head = meta.and_then(|m| m.get("head")).and_then(Value::as_str);
    let (base, head) = match (base, head) {
        (Some(base), Some(head)) => (base, head),
        _ => {
            return Err(ManifestError::schema(
                "Review JSON must have meta.base and meta.head strings",
            ))
        }
    };

    if !obj.get("groups").is_some_and(Value::is_array) {
        return Err(ManifestError::schema("Review JSON must have a groups array"));
    }

    for reference in [base, head] {
        if reference.starts_with('-') {
            return Err(ManifestError::UnsafeRef {
                reference: reference.to_string(),
                reason: "git refs must not start with \"-\"",
            });
        }
    }
    for reference in [base, head] {
        if !is_safe_ref(reference) {
            return Err(ManifestError::UnsafeRef {
                reference: reference.to_string(),
                reason: "git refs contain invalid characters",
            });
        }
    }

    serde_json::from_value(value).map_err(|e| ManifestError::schema(e.to_string()))
}

/// `^[A-Za-z0-9_./~^{}-]+$`
pub fn is_safe_ref(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./~^{}-".contains(c))
}
