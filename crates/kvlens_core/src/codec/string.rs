use super::quoting::{quote, unquote, unquote_prefix};
use super::{
    Codec, PAIR_SEPARATOR, content_lines, format_score, parse_score, validate_composite,
};
use crate::error::DecodeError;
use crate::key_value::{KeyType, ScoredMember, StoreValue};

/// Raw text for strings; one element per line for composites.
///
/// Composite elements are written as-is when that is unambiguous and as a
/// quoted token otherwise (empty, leading `"`, control characters, invalid
/// UTF-8, or a hash field containing `": "`).
pub struct StringCodec;

impl Codec for StringCodec {
    fn encode(&self, value: &StoreValue) -> String {
        match value {
            StoreValue::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            StoreValue::List(items) | StoreValue::Set(items) => items
                .iter()
                .map(|item| element(item, false))
                .collect::<Vec<_>>()
                .join("\n"),
            StoreValue::Hash(entries) => entries
                .iter()
                .map(|(field, value)| {
                    format!("{}{}{}", element(field, true), PAIR_SEPARATOR, element(value, false))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            StoreValue::SortedSet(members) => members
                .iter()
                .map(|m| {
                    format!("{}{}{}", element(&m.member, false), PAIR_SEPARATOR, format_score(m.score))
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn decode(&self, key_type: KeyType, text: &str) -> Result<StoreValue, DecodeError> {
        let value = match key_type {
            KeyType::String => return Ok(StoreValue::String(text.as_bytes().to_vec())),
            KeyType::List => StoreValue::List(read_elements(text)?),
            KeyType::Set => StoreValue::Set(read_elements(text)?),
            KeyType::Hash => {
                let mut entries = Vec::new();
                for (line_no, line) in content_lines(text) {
                    entries.push(read_hash_line(line).map_err(|e| at_line(e, line_no))?);
                }
                StoreValue::Hash(entries)
            }
            KeyType::SortedSet => {
                let mut members = Vec::new();
                for (line_no, line) in content_lines(text) {
                    members.push(read_zset_line(line).map_err(|e| at_line(e, line_no))?);
                }
                StoreValue::SortedSet(members)
            }
        };

        validate_composite(&value)?;
        Ok(value)
    }

    fn is_lossless(&self, value: &StoreValue) -> bool {
        match value {
            StoreValue::String(bytes) => std::str::from_utf8(bytes).is_ok(),
            _ => true,
        }
    }
}

fn element(bytes: &[u8], is_hash_field: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if is_plain(text, is_hash_field) => text.to_string(),
        _ => quote(bytes),
    }
}

fn is_plain(text: &str, is_hash_field: bool) -> bool {
    !text.is_empty()
        && !text.starts_with('"')
        && !text.chars().any(char::is_control)
        && !(is_hash_field && text.contains(PAIR_SEPARATOR))
}

fn read_element(text: &str) -> Result<Vec<u8>, DecodeError> {
    if text.starts_with('"') {
        unquote(text)
    } else {
        Ok(text.as_bytes().to_vec())
    }
}

fn read_elements(text: &str) -> Result<Vec<Vec<u8>>, DecodeError> {
    content_lines(text)
        .map(|(line_no, line)| read_element(line).map_err(|e| at_line(e, line_no)))
        .collect()
}

fn read_hash_line(line: &str) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
    let (field, value) = if line.starts_with('"') {
        let (field, rest) = unquote_prefix(line)?;
        let value = rest
            .strip_prefix(PAIR_SEPARATOR)
            .ok_or_else(missing_separator)?;
        (field, value)
    } else {
        let (field, value) = line.split_once(PAIR_SEPARATOR).ok_or_else(missing_separator)?;
        (field.as_bytes().to_vec(), value)
    };

    Ok((field, read_element(value)?))
}

fn read_zset_line(line: &str) -> Result<ScoredMember, DecodeError> {
    let (member, score) = if line.starts_with('"') {
        let (member, rest) = unquote_prefix(line)?;
        let score = rest
            .strip_prefix(PAIR_SEPARATOR)
            .ok_or_else(missing_separator)?;
        (member, score)
    } else {
        let (member, score) = line.rsplit_once(PAIR_SEPARATOR).ok_or_else(missing_separator)?;
        (member.as_bytes().to_vec(), score)
    };

    Ok(ScoredMember {
        member,
        score: parse_score(score)?,
    })
}

fn missing_separator() -> DecodeError {
    DecodeError::type_mismatch(format!("expected '<name>{}<value>'", PAIR_SEPARATOR))
}

pub(super) fn at_line(error: DecodeError, line_no: usize) -> DecodeError {
    match error {
        DecodeError::MalformedJson(msg) => {
            DecodeError::MalformedJson(format!("line {}: {}", line_no, msg))
        }
        DecodeError::MalformedQuoting(msg) => {
            DecodeError::MalformedQuoting(format!("line {}: {}", line_no, msg))
        }
        DecodeError::TypeMismatch(msg) => {
            DecodeError::TypeMismatch(format!("line {}: {}", line_no, msg))
        }
    }
}
