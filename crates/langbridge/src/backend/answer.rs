//! Locating the answer inside a backend response.
//!
//! The key holding the answer differs between deployments (`output`,
//! `response`, `answer`, or Langflow's nested run output), so it is read
//! from configuration as a dot-separated path. Numeric segments index into
//! arrays; on objects every segment is a plain key.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// A dot-separated path into a JSON document.
///
/// ```
/// use langbridge::backend::AnswerPath;
///
/// let path: AnswerPath = "outputs.0.results.message.text".parse().unwrap();
/// let body = serde_json::json!({
///     "outputs": [{"results": {"message": {"text": "hello"}}}]
/// });
/// assert_eq!(path.extract(&body), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerPath {
    segments: Vec<String>,
}

impl AnswerPath {
    /// Follow the path and return the string found there, if any.
    pub fn extract<'a>(&self, body: &'a Value) -> Option<&'a str> {
        let mut current = body;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        current.as_str()
    }
}

impl FromStr for AnswerPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.trim().split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(format!("invalid answer path '{s}'"));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for AnswerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
