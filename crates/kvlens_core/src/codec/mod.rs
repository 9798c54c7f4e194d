//! Conversion between store values and editable display text.
//!
//! Each [`Format`] has one [`Codec`] implementation. For every format,
//! `decode(key_type, &encode(value))` yields `value` back as long as the codec
//! reports the value as lossless (see [`Codec::is_lossless`]).

mod json;
mod quoted;
mod quoting;
mod string;

pub use json::JsonCodec;
pub use quoted::QuotedCodec;
pub use string::StringCodec;

use crate::error::DecodeError;
use crate::key_value::{KeyType, StoreValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Textual encoding used to show and edit a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    String,
    #[serde(rename = "JSON")]
    Json,
    Quoted,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::String, Format::Json, Format::Quoted];

    pub fn codec(self) -> &'static dyn Codec {
        static STRING: StringCodec = StringCodec;
        static JSON: JsonCodec = JsonCodec;
        static QUOTED: QuotedCodec = QuotedCodec;

        match self {
            Format::String => &STRING,
            Format::Json => &JSON,
            Format::Quoted => &QUOTED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::String => "String",
            Format::Json => "JSON",
            Format::Quoted => "Quoted",
        }
    }

    /// Picks the format a value is shown in when the caller did not ask for one.
    ///
    /// Strings holding a JSON document are shown as JSON, readable text as
    /// String, anything else (control bytes, invalid UTF-8) as Quoted.
    /// Composites are shown as JSON unless an element is not UTF-8, in which
    /// case the line-based String format quotes just those elements.
    pub fn detect(value: &StoreValue) -> Format {
        match value {
            StoreValue::String(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) if serde_json::from_str::<serde_json::Value>(text).is_ok() => {
                    Format::Json
                }
                Ok(text) if is_readable_text(text) => Format::String,
                _ => Format::Quoted,
            },
            composite if composite.is_utf8() => Format::Json,
            _ => Format::String,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "normal" => Ok(Format::String),
            "json" => Ok(Format::Json),
            "quoted" | "unknown" => Ok(Format::Quoted),
            other => Err(format!(
                "Unknown format '{}': expected String, JSON or Quoted",
                other
            )),
        }
    }
}

/// One display format.
pub trait Codec: Send + Sync {
    /// Renders a value as display text. Total: every value has a rendering.
    fn encode(&self, value: &StoreValue) -> String;

    /// Parses display text into a value of `key_type`. All-or-nothing.
    fn decode(&self, key_type: KeyType, text: &str) -> Result<StoreValue, DecodeError>;

    /// Whether `encode` keeps every byte of `value`, so saving the rendering
    /// unchanged writes the same value back.
    fn is_lossless(&self, _value: &StoreValue) -> bool {
        true
    }
}

pub fn encode(format: Format, value: &StoreValue) -> String {
    format.codec().encode(value)
}

pub fn decode(format: Format, key_type: KeyType, text: &str) -> Result<StoreValue, DecodeError> {
    format.codec().decode(key_type, text)
}

/// Text that reads fine without escaping: no control characters besides line breaks and tabs.
fn is_readable_text(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
}

/// Formats a score so that parsing it yields the same `f64`.
pub(crate) fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

pub(crate) fn parse_score(text: &str) -> Result<f64, DecodeError> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(score) if !score.is_nan() => Ok(score),
        _ => Err(DecodeError::type_mismatch(format!(
            "'{}' is not a valid score",
            trimmed
        ))),
    }
}

/// Rejects repeated set members, hash fields or sorted-set members.
pub(crate) fn ensure_unique<'a>(
    items: impl IntoIterator<Item = &'a [u8]>,
    what: &str,
) -> Result<(), DecodeError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(DecodeError::type_mismatch(format!(
                "duplicate {} '{}'",
                what,
                String::from_utf8_lossy(item)
            )));
        }
    }
    Ok(())
}

/// Checks that a decoded composite has no duplicates where the store type forbids them.
pub(crate) fn validate_composite(value: &StoreValue) -> Result<(), DecodeError> {
    match value {
        StoreValue::Hash(entries) => {
            ensure_unique(entries.iter().map(|(field, _)| field.as_slice()), "hash field")
        }
        StoreValue::Set(members) => ensure_unique(members.iter().map(Vec::as_slice), "set member"),
        StoreValue::SortedSet(members) => ensure_unique(
            members.iter().map(|m| m.member.as_slice()),
            "sorted set member",
        ),
        StoreValue::String(_) | StoreValue::List(_) => Ok(()),
    }
}

/// Non-blank lines of a line-based composite rendering, without trailing `\r`.
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split('\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line.strip_suffix('\r').unwrap_or(line)))
        .filter(|(_, line)| !line.is_empty())
}

/// Separator between a hash field (or sorted-set member) and its value (or score).
pub(crate) const PAIR_SEPARATOR: &str = ": ";
