use super::quoting::{quote, unquote, unquote_prefix};
use super::string::at_line;
use super::{
    Codec, PAIR_SEPARATOR, content_lines, format_score, parse_score, validate_composite,
};
use crate::error::DecodeError;
use crate::key_value::{KeyType, ScoredMember, StoreValue};

/// Every payload as an escaped, double-quoted token.
pub struct QuotedCodec;

impl Codec for QuotedCodec {
    fn encode(&self, value: &StoreValue) -> String {
        match value {
            StoreValue::String(bytes) => quote(bytes),
            StoreValue::List(items) | StoreValue::Set(items) => items
                .iter()
                .map(|item| quote(item))
                .collect::<Vec<_>>()
                .join("\n"),
            StoreValue::Hash(entries) => entries
                .iter()
                .map(|(field, value)| format!("{}{}{}", quote(field), PAIR_SEPARATOR, quote(value)))
                .collect::<Vec<_>>()
                .join("\n"),
            StoreValue::SortedSet(members) => members
                .iter()
                .map(|m| format!("{}{}{}", quote(&m.member), PAIR_SEPARATOR, format_score(m.score)))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn decode(&self, key_type: KeyType, text: &str) -> Result<StoreValue, DecodeError> {
        let lines = content_lines(text).map(|(line_no, line)| (line_no, line.trim()));
        let value = match key_type {
            KeyType::String => return unquote(text.trim()).map(StoreValue::String),
            KeyType::List | KeyType::Set => {
                let items = lines
                    .map(|(line_no, line)| unquote(line).map_err(|e| at_line(e, line_no)))
                    .collect::<Result<Vec<_>, _>>()?;
                if key_type == KeyType::List {
                    StoreValue::List(items)
                } else {
                    StoreValue::Set(items)
                }
            }
            KeyType::Hash => StoreValue::Hash(
                lines
                    .map(|(line_no, line)| {
                        let (field, rest) = split_pair(line).map_err(|e| at_line(e, line_no))?;
                        let value = unquote(rest).map_err(|e| at_line(e, line_no))?;
                        Ok((field, value))
                    })
                    .collect::<Result<Vec<_>, DecodeError>>()?,
            ),
            KeyType::SortedSet => StoreValue::SortedSet(
                lines
                    .map(|(line_no, line)| {
                        let (member, rest) = split_pair(line).map_err(|e| at_line(e, line_no))?;
                        let score = parse_score(rest).map_err(|e| at_line(e, line_no))?;
                        Ok(ScoredMember { member, score })
                    })
                    .collect::<Result<Vec<_>, DecodeError>>()?,
            ),
        };

        validate_composite(&value)?;
        Ok(value)
    }
}

/// Splits `"name": rest` into the unquoted name and `rest`.
fn split_pair(line: &str) -> Result<(Vec<u8>, &str), DecodeError> {
    let (name, rest) = unquote_prefix(line)?;
    let rest = rest.strip_prefix(PAIR_SEPARATOR).ok_or_else(|| {
        DecodeError::type_mismatch(format!("expected '\"<name>\"{}<value>'", PAIR_SEPARATOR))
    })?;
    Ok((name, rest))
}
