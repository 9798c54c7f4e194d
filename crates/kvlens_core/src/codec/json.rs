use super::{Codec, format_score, parse_score, validate_composite};
use crate::error::DecodeError;
use crate::key_value::{KeyType, ScoredMember, StoreValue};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::{Map, Number, Value};
use std::fmt;

/// JSON documents: composites mirror their structure, strings holding JSON
/// are shown as-is and other strings as a JSON string literal.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &StoreValue) -> String {
        let document = match value {
            StoreValue::String(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                return match serde_json::from_str::<Value>(&text) {
                    Ok(parsed) if !parsed.is_string() => text.into_owned(),
                    _ => Value::String(text.into_owned()).to_string(),
                };
            }
            StoreValue::List(items) | StoreValue::Set(items) => {
                Value::Array(items.iter().map(|item| text_value(item)).collect())
            }
            StoreValue::Hash(entries) => {
                let mut object = Map::with_capacity(entries.len());
                for (field, value) in entries {
                    object.insert(
                        String::from_utf8_lossy(field).into_owned(),
                        text_value(value),
                    );
                }
                Value::Object(object)
            }
            StoreValue::SortedSet(members) => Value::Array(
                members
                    .iter()
                    .map(|m| {
                        let mut entry = Map::with_capacity(2);
                        entry.insert("member".to_string(), text_value(&m.member));
                        entry.insert("score".to_string(), score_value(m.score));
                        Value::Object(entry)
                    })
                    .collect(),
            ),
        };

        // Serializing a `Value` cannot fail; fall back to the compact form regardless.
        serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string())
    }

    fn decode(&self, key_type: KeyType, text: &str) -> Result<StoreValue, DecodeError> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::malformed_json(e.to_string()))?;

        let value = match key_type {
            KeyType::String => {
                return Ok(match document {
                    Value::String(inner) => StoreValue::String(inner.into_bytes()),
                    _ => StoreValue::String(text.as_bytes().to_vec()),
                });
            }
            KeyType::List => StoreValue::List(string_array(key_type, document)?),
            KeyType::Set => StoreValue::Set(string_array(key_type, document)?),
            KeyType::Hash => match document {
                Value::Object(_) => StoreValue::Hash(
                    object_entries(text)?
                        .into_iter()
                        .map(|(field, value)| {
                            let value = expect_string(value, || format!("value of field '{}'", field))?;
                            Ok((field.into_bytes(), value))
                        })
                        .collect::<Result<Vec<_>, DecodeError>>()?,
                ),
                Value::Array(_) => {
                    return Err(DecodeError::type_mismatch(
                        "a hash is edited as a JSON object, got an array",
                    ));
                }
                other => return Err(expected_container(key_type, &other)),
            },
            KeyType::SortedSet => match document {
                Value::Array(items) => StoreValue::SortedSet(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(index, item)| scored_member(index, item))
                        .collect::<Result<Vec<_>, DecodeError>>()?,
                ),
                Value::Object(_) => {
                    return Err(DecodeError::type_mismatch(
                        "a sorted set is edited as a JSON array of {\"member\", \"score\"} objects, got an object",
                    ));
                }
                other => return Err(expected_container(key_type, &other)),
            },
        };

        validate_composite(&value)?;
        Ok(value)
    }

    fn is_lossless(&self, value: &StoreValue) -> bool {
        value.is_utf8()
    }
}

/// Top-level object members in document order, repeated names included.
struct ObjectEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for ObjectEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ObjectEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Value>()? {
                    entries.push(entry);
                }
                Ok(ObjectEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// `serde_json::Map` keeps only the last of repeated names; hash decoding must see them all.
fn object_entries(text: &str) -> Result<Vec<(String, Value)>, DecodeError> {
    serde_json::from_str::<ObjectEntries>(text)
        .map(|ObjectEntries(entries)| entries)
        .map_err(|e| DecodeError::malformed_json(e.to_string()))
}

fn text_value(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

/// Finite scores are JSON numbers; infinities become `"inf"` / `"-inf"`.
fn score_value(score: f64) -> Value {
    Number::from_f64(score)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(format_score(score)))
}

fn string_array(key_type: KeyType, document: Value) -> Result<Vec<Vec<u8>>, DecodeError> {
    match document {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| expect_string(item, || format!("element {}", index)))
            .collect(),
        Value::Object(_) => Err(DecodeError::type_mismatch(format!(
            "a {} is edited as a JSON array, got an object",
            key_type
        ))),
        other => Err(expected_container(key_type, &other)),
    }
}

fn scored_member(index: usize, item: Value) -> Result<ScoredMember, DecodeError> {
    let Value::Object(mut entry) = item else {
        return Err(DecodeError::malformed_json(format!(
            "element {} must be an object with \"member\" and \"score\"",
            index
        )));
    };

    let member = entry.remove("member").ok_or_else(|| {
        DecodeError::malformed_json(format!("element {} is missing \"member\"", index))
    })?;
    let member = expect_string(member, || format!("member of element {}", index))?;

    let score = match entry.remove("score") {
        Some(Value::Number(number)) => number.as_f64().ok_or_else(|| {
            DecodeError::malformed_json(format!("score of element {} is out of range", index))
        })?,
        Some(Value::String(text)) => parse_score(&text)?,
        Some(_) => {
            return Err(DecodeError::malformed_json(format!(
                "score of element {} must be a number",
                index
            )));
        }
        None => {
            return Err(DecodeError::malformed_json(format!(
                "element {} is missing \"score\"",
                index
            )));
        }
    };

    Ok(ScoredMember { member, score })
}

fn expect_string(value: Value, what: impl FnOnce() -> String) -> Result<Vec<u8>, DecodeError> {
    match value {
        Value::String(text) => Ok(text.into_bytes()),
        other => Err(DecodeError::malformed_json(format!(
            "{} must be a string, got {}",
            what(),
            json_kind(&other)
        ))),
    }
}

fn expected_container(key_type: KeyType, found: &Value) -> DecodeError {
    let expected = match key_type {
        KeyType::Hash => "object",
        _ => "array",
    };
    DecodeError::malformed_json(format!(
        "expected a JSON {} for a {}, got {}",
        expected,
        key_type,
        json_kind(found)
    ))
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
