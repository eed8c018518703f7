//! Compile failure types shared by both backends.
//!
//! Errors crossing the backend seams are an open, optionally-structured
//! payload: a bare string, or an object carrying `message` plus optional
//! `code` (a source excerpt to render alongside it) and `location`. They are
//! decoded by defensive field probing, never by relying on a concrete shape.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Location
// ============================================================================

/// Zero-based position in the most recently submitted source.
///
/// The compiler reports these as a two-element `[line, column]` array, which
/// is also the canonical wire shape; decoding additionally accepts a
/// `{"line": n, "column": n}` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Clamp into the bounds of `source` so a marker always lands on a real
    /// character. The protocol passes out-of-range positions through as-is,
    /// so rendering clamps instead of trusting them.
    #[allow(clippy::cast_possible_truncation)] // Safe: clamped to source bounds
    pub fn clamped_to(&self, source: &str) -> Self {
        let line_count = source.lines().count();
        let line = (self.line as usize).min(line_count.saturating_sub(1));
        let width = source
            .lines()
            .nth(line)
            .map(|l| l.chars().count())
            .unwrap_or(0);
        let column = (self.column as usize).min(width.saturating_sub(1));
        Self {
            line: line as u32,
            column: column as u32,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.line, self.column].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair([u32; 2]),
            Fields { line: u32, column: u32 },
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair([line, column]) => Self { line, column },
            Repr::Fields { line, column } => Self { line, column },
        })
    }
}

// ============================================================================
// CompileError
// ============================================================================

/// Structured failure from a compile attempt.
///
/// Always surfaced as a visible alert, never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub message: String,
    /// Source excerpt to render under the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Position in the submitted source, when the compiler can point at one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl CompileError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            location: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Defensive decode of an open error payload.
    ///
    /// A JSON string becomes a plain message; an object contributes whatever
    /// of `message`/`code`/`location` it carries; anything else degrades to
    /// its string form. Never fails.
    pub fn from_value(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) => Self::message(s.clone()),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.to_string());
                let code = map.get("code").and_then(Value::as_str).map(str::to_owned);
                let location = map
                    .get("location")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                Self {
                    message,
                    code,
                    location,
                }
            }
            other => Self::message(other.to_string()),
        }
    }

    /// Code excerpt with the common indentation stripped, for display.
    pub fn dedented_code(&self) -> Option<String> {
        let code = self.code.as_ref()?;
        let indent = code
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
            .min()
            .unwrap_or_default();
        let indent: String = " ".repeat(indent);
        Some(
            code.lines()
                .map(|l| l.strip_prefix(&indent).unwrap_or(l))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

// Display is just the message; code/location render separately.
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}
