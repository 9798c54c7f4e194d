//! Raw command lines: splitting operator input into arguments and rendering
//! replies the way `redis-cli` prints them.

use kvlens_core::StoreError;
use redis::Value;
use std::fmt::Write;

/// Splits a command line into arguments. Single and double quotes group
/// words, `\` escapes the next character.
pub fn split_command(input: &str) -> Result<Vec<String>, StoreError> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut quoted = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }

        if ch == '\\' {
            escaped = true;
            continue;
        }

        if ch == '\'' && !in_double {
            in_single = !in_single;
            quoted = true;
            continue;
        }

        if ch == '"' && !in_single {
            in_double = !in_double;
            quoted = true;
            continue;
        }

        if ch.is_whitespace() && !in_single && !in_double {
            if !current.is_empty() || quoted {
                items.push(std::mem::take(&mut current));
                quoted = false;
            }
            continue;
        }

        current.push(ch);
    }

    if escaped {
        return Err(StoreError::command_failed(
            "Dangling escape character in command",
        ));
    }

    if in_single {
        return Err(StoreError::command_failed("Unterminated single-quoted string"));
    }

    if in_double {
        return Err(StoreError::command_failed("Unterminated double-quoted string"));
    }

    if !current.is_empty() || quoted {
        items.push(current);
    }

    Ok(items)
}

/// Strips `#` comment lines and a trailing `;`, then splits what is left.
pub fn parse_command(input: &str) -> Result<Vec<String>, StoreError> {
    let cleaned = input
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let cleaned = cleaned.trim().trim_end_matches(';').trim();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    split_command(cleaned)
}

/// Renders a reply as `redis-cli` would print it.
pub fn render_reply(value: &Value) -> String {
    let mut out = String::new();
    render_into(&mut out, value, 0);
    out
}

fn render_into(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Nil => out.push_str("(nil)"),
        Value::Int(number) => {
            let _ = write!(out, "(integer) {}", number);
        }
        Value::BulkString(bytes) => out.push_str(&quote_bytes(bytes)),
        Value::SimpleString(text) => out.push_str(text),
        Value::Okay => out.push_str("OK"),
        Value::Double(number) => {
            let _ = write!(out, "(double) {}", number);
        }
        Value::Boolean(flag) => {
            let _ = write!(out, "({})", flag);
        }
        Value::VerbatimString { text, .. } => out.push_str(text),
        Value::Array(items) | Value::Set(items) => render_items(out, items.iter(), indent),
        Value::Map(pairs) => {
            if pairs.is_empty() {
                out.push_str("(empty hash)");
                return;
            }

            let width = pairs.len().to_string().len();
            for (index, (key, value)) in pairs.iter().enumerate() {
                if index > 0 {
                    out.push('\n');
                    out.push_str(&" ".repeat(indent));
                }
                let _ = write!(out, "{:>width$}# ", index + 1, width = width);
                render_into(out, key, indent + width + 2);
                out.push_str(" => ");
                render_into(out, value, indent + width + 2);
            }
        }
        other => {
            let _ = write!(out, "{:?}", other);
        }
    }
}

fn render_items<'a>(out: &mut String, items: impl ExactSizeIterator<Item = &'a Value>, indent: usize) {
    if items.len() == 0 {
        out.push_str("(empty array)");
        return;
    }

    let width = items.len().to_string().len();
    for (index, item) in items.enumerate() {
        if index > 0 {
            out.push('\n');
            out.push_str(&" ".repeat(indent));
        }
        let _ = write!(out, "{:>width$}) ", index + 1, width = width);
        render_into(out, item, indent + width + 2);
    }
}

/// Double-quoted with control and non-ASCII bytes escaped.
fn quote_bytes(bytes: &[u8]) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace_and_honours_quotes() {
        assert_eq!(
            split_command(r#"SET "my key" 'hello world'"#).unwrap(),
            ["SET", "my key", "hello world"]
        );
        assert_eq!(
            split_command(r#"SET k "say \"hi\"""#).unwrap(),
            ["SET", "k", "say \"hi\""]
        );
    }

    #[test]
    fn keeps_empty_quoted_arguments() {
        assert_eq!(split_command(r#"SET k """#).unwrap(), ["SET", "k", ""]);
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(matches!(
            split_command(r#"GET "open"#),
            Err(StoreError::CommandFailed(_))
        ));
        assert!(matches!(
            split_command("GET 'open"),
            Err(StoreError::CommandFailed(_))
        ));
        assert!(matches!(
            split_command("GET k\\"),
            Err(StoreError::CommandFailed(_))
        ));
    }

    #[test]
    fn drops_comments_and_trailing_semicolon() {
        assert_eq!(
            parse_command("# fetch the user\nHGETALL user:1;").unwrap(),
            ["HGETALL", "user:1"]
        );
        assert!(parse_command("  # only a comment  ").unwrap().is_empty());
    }

    #[test]
    fn renders_scalar_replies() {
        assert_eq!(render_reply(&Value::Nil), "(nil)");
        assert_eq!(render_reply(&Value::Int(3)), "(integer) 3");
        assert_eq!(render_reply(&Value::Okay), "OK");
        assert_eq!(
            render_reply(&Value::SimpleString("PONG".to_string())),
            "PONG"
        );
        assert_eq!(
            render_reply(&Value::BulkString(b"a\"b\n\xff".to_vec())),
            r#""a\"b\n\xff""#
        );
    }

    #[test]
    fn renders_arrays_with_numbered_lines() {
        let reply = Value::Array(vec![
            Value::BulkString(b"one".to_vec()),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        ]);

        assert_eq!(
            render_reply(&reply),
            "1) \"one\"\n2) 1) (integer) 1\n   2) (integer) 2"
        );
        assert_eq!(render_reply(&Value::Array(Vec::new())), "(empty array)");
    }
}
