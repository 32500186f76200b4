//! Tolerant JSON parsing of model output
//!
//! Models frequently wrap JSON in a code fence even when told not to. The
//! [`ResponseParser`] strips the fence and decodes strictly; failures come
//! back as [`ParseError`] carrying the raw text, never as a panic.

use crate::error::ParseError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Strip surrounding whitespace and an enclosing code fence
///
/// Handles ` ```json\n{...}\n``` `, ` ```\n{...}\n``` ` and unfenced text.
#[must_use]
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // language tag, if any
        let tag_end = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_end..];
        if let Some(body) = text.trim_end().strip_suffix("```") {
            text = body;
        }
    } else if let Some(body) = text.strip_suffix("```") {
        text = body;
    }

    text.trim()
}

/// Find the first balanced `{...}` object in free text
///
/// String literals are respected, so braces inside quoted values do not
/// confuse the scan.
#[must_use]
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, byte) in text.as_bytes()[start..].iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parser for raw model replies
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Create new parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Strip fences and decode strict JSON
    ///
    /// # Errors
    /// - `ParseError::Malformed` with the raw text if decoding fails
    pub fn parse(&self, raw: &str) -> Result<Value, ParseError> {
        serde_json::from_str(strip_fences(raw))
            .map_err(|e| ParseError::malformed(e.to_string(), raw))
    }

    /// Decode and require a JSON object
    ///
    /// # Errors
    /// - `ParseError::Malformed` if not JSON
    /// - `ParseError::UnexpectedShape` if JSON but not an object
    pub fn parse_object(&self, raw: &str) -> Result<Map<String, Value>, ParseError> {
        match self.parse(raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(ParseError::unexpected_shape("a JSON object", raw)),
        }
    }

    /// Decode an object into a typed shape
    ///
    /// # Errors
    /// - `ParseError::Malformed` if not JSON
    /// - `ParseError::UnexpectedShape` if the object does not fit `T`
    pub fn parse_as<T: DeserializeOwned>(&self, raw: &str) -> Result<T, ParseError> {
        let map = self.parse_object(raw)?;
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            ParseError::unexpected_shape(
                format!("{} ({e})", std::any::type_name::<T>()),
                raw,
            )
        })
    }

    /// Best-effort second pass over text that already failed [`Self::parse`]
    ///
    /// Tries the fenced/strict decode first, then the first balanced object
    /// embedded in surrounding prose.
    ///
    /// # Errors
    /// - `ParseError::Malformed` if no decodable object is found
    pub fn salvage(&self, raw: &str) -> Result<Value, ParseError> {
        if let Ok(value) = self.parse(raw) {
            return Ok(value);
        }

        let candidate = find_json_object(raw)
            .ok_or_else(|| ParseError::malformed("no JSON object found", raw))?;
        tracing::debug!(len = candidate.len(), "salvaging embedded JSON object");

        serde_json::from_str(candidate).map_err(|e| ParseError::malformed(e.to_string(), raw))
    }
}
