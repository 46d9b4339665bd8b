//! Conversion of a parsed API schema into route records.
//!
//! The schema is whatever the service published under its `paths` key. It
//! is treated as untrusted: anything that is not a recognized verb under a
//! path object is ignored, and structurally broken entries are reported
//! instead of aborting the run.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::model::{Method, Route};

/// Operation extension carrying the stream flag.
const STREAM_EXTENSION: &str = "x-stream";

/// Public path rewrite applied to every discovered route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathRewrite {
    /// Removed from the start of the internal path when present.
    #[serde(default)]
    pub strip_prefix: Option<String>,
    /// Prepended after stripping.
    #[serde(default)]
    pub add_prefix: Option<String>,
}

impl PathRewrite {
    /// Whether this rewrite leaves every path unchanged.
    pub fn is_identity(&self) -> bool {
        self.strip_prefix.as_deref().is_none_or(str::is_empty)
            && self.add_prefix.as_deref().is_none_or(str::is_empty)
    }

    /// Compute the public path for an internal path.
    pub fn apply(&self, path: &str) -> String {
        if self.is_identity() {
            return path.to_string();
        }

        let mut rest = path;
        if let Some(prefix) = self.strip_prefix.as_deref().filter(|p| !p.is_empty())
            && let Some(stripped) = path.strip_prefix(prefix.trim_end_matches('/'))
            && (stripped.is_empty() || stripped.starts_with('/'))
        {
            rest = stripped;
        }

        let prefix = self
            .add_prefix
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        let rest = rest.trim_start_matches('/');

        let mut public = String::with_capacity(prefix.len() + rest.len() + 2);
        if !prefix.starts_with('/') {
            public.push('/');
        }
        public.push_str(prefix);
        if !rest.is_empty() {
            if !public.ends_with('/') {
                public.push('/');
            }
            public.push_str(rest);
        }
        public
    }
}

/// A schema entry that could not be turned into routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedSchemaEntry {
    /// Path key the entry was found under.
    pub path: String,
    /// Verb, when the problem is inside an operation.
    pub method: Option<String>,
    /// Human readable description.
    pub reason: String,
}

impl MalformedSchemaEntry {
    fn new(path: &str, method: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            method: method.map(str::to_string),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedSchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}: {}", method, self.path, self.reason),
            None => write!(f, "{}: {}", self.path, self.reason),
        }
    }
}

/// Routes extracted from a schema, plus the entries that were skipped.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Extracted routes in document order.
    pub routes: Vec<Route>,
    /// Entries skipped as malformed.
    pub malformed: Vec<MalformedSchemaEntry>,
}

/// Turn a schema's `paths` object into routes bound to `port`.
///
/// Every recognized verb under every path yields one route whose
/// `target_path` is the schema path and whose `path` is the rewritten one.
pub fn normalize(paths: &Map<String, Value>, port: u16, rewrite: &PathRewrite) -> Normalized {
    let mut out = Normalized::default();

    for (path, item) in paths {
        let operations = match item {
            Value::Object(operations) => operations,
            Value::Null => continue,
            other => {
                out.malformed.push(MalformedSchemaEntry::new(
                    path,
                    None,
                    format!("expected an object, found {}", json_kind(other)),
                ));
                continue;
            }
        };
        if !path.starts_with('/') {
            out.malformed.push(MalformedSchemaEntry::new(
                path,
                None,
                "path does not start with '/'",
            ));
            continue;
        }

        let public_path = rewrite.apply(path);
        for (key, operation) in operations {
            let Ok(method) = key.parse::<Method>() else {
                continue;
            };
            let stream = match operation {
                Value::Object(fields) => match fields.get(STREAM_EXTENSION) {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(flag)) => *flag,
                    Some(other) => {
                        out.malformed.push(MalformedSchemaEntry::new(
                            path,
                            Some(method.as_str()),
                            format!("{STREAM_EXTENSION} must be a boolean, found {}", json_kind(other)),
                        ));
                        continue;
                    }
                },
                Value::Null => false,
                other => {
                    out.malformed.push(MalformedSchemaEntry::new(
                        path,
                        Some(method.as_str()),
                        format!("expected an operation object, found {}", json_kind(other)),
                    ));
                    continue;
                }
            };

            out.routes
                .push(Route::new(public_path.clone(), method, port, path.clone()).streaming(stream));
        }
    }

    for entry in &out.malformed {
        warn!("Skipping malformed schema entry {}", entry);
    }
    out
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
