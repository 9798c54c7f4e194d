//! The quoted-token grammar shared by the String and Quoted formats.
//!
//! A token is `"` … `"`. Inside, printable ASCII other than `"` and `\` stands
//! for itself; every other byte is one of `\\ \" \n \r \t \xNN`.

use crate::error::DecodeError;
use std::fmt::Write;

pub(crate) fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out.push('"');
    out
}

/// Reads one token from the start of `input`, returning its bytes and the remaining text.
pub(crate) fn unquote_prefix(input: &str) -> Result<(Vec<u8>, &str), DecodeError> {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&b'"') {
        return Err(DecodeError::malformed_quoting(
            "expected a value starting with '\"'",
        ));
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 1;

    while index < bytes.len() {
        let byte = bytes[index];
        match byte {
            b'"' => return Ok((out, &input[index + 1..])),
            b'\\' => {
                let escape = bytes.get(index + 1).copied().ok_or_else(|| {
                    DecodeError::malformed_quoting("dangling '\\' at end of value")
                })?;

                match escape {
                    b'\\' => out.push(b'\\'),
                    b'"' => out.push(b'"'),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'x' => {
                        let high = bytes.get(index + 2).copied().and_then(hex_value);
                        let low = bytes.get(index + 3).copied().and_then(hex_value);
                        match (high, low) {
                            (Some(high), Some(low)) => out.push(high << 4 | low),
                            _ => {
                                return Err(DecodeError::malformed_quoting(format!(
                                    "'\\x' at offset {} must be followed by two hex digits",
                                    index
                                )));
                            }
                        }
                        index += 2;
                    }
                    other => {
                        return Err(DecodeError::malformed_quoting(format!(
                            "unknown escape '\\{}' at offset {}",
                            describe_byte(other),
                            index
                        )));
                    }
                }
                index += 2;
            }
            0x20..=0x7e => {
                out.push(byte);
                index += 1;
            }
            other => {
                return Err(DecodeError::malformed_quoting(format!(
                    "byte {} at offset {} must be escaped",
                    describe_byte(other),
                    index
                )));
            }
        }
    }

    Err(DecodeError::malformed_quoting("missing closing '\"'"))
}

/// Reads a token that must span all of `input`.
pub(crate) fn unquote(input: &str) -> Result<Vec<u8>, DecodeError> {
    let (value, rest) = unquote_prefix(input)?;
    if !rest.is_empty() {
        return Err(DecodeError::malformed_quoting(format!(
            "unexpected text after closing quote: '{}'",
            rest
        )));
    }
    Ok(value)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn describe_byte(byte: u8) -> String {
    if (0x20..=0x7e).contains(&byte) {
        (byte as char).to_string()
    } else {
        format!("0x{:02x}", byte)
    }
}
