//! Call identity codec
//!
//! Encodes a function reference plus arguments into a canonical string and
//! parses such strings back. The grammar is a small literal language:
//!
//! ```text
//! call    := qualname '(' [arg (',' arg)*] ')'
//! arg     := literal | ident '=' literal
//! literal := 'None' | 'True' | 'False' | int | float | str | bytes
//!          | '(' ')' | '(' literal ',' ')' | '(' literal (',' literal)+ ')'
//!          | '[' [literal (',' literal)*] ']'
//!          | 'set()' | '{' literal (',' literal)* '}'
//!          | '{' [literal ':' literal (',' literal ':' literal)*] '}'
//! ```
//!
//! Sets and dicts are sorted by the encoded text of their elements (keys), and
//! keyword arguments by name, so equal calls always produce the same string.

mod parser;

pub use parser::{parse_call, parse_value};

use crate::error::CodecError;
use crate::value::{CallArgs, Value};

/// Encode a single value into its canonical literal text.
pub fn encode_value(value: &Value) -> Result<String, CodecError> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Encode the parenthesised argument list: `(p1,p2,k1=v1)`.
pub fn encode_args(args: &CallArgs) -> Result<String, CodecError> {
    let mut parts = Vec::with_capacity(args.positional().len() + args.keywords().len());
    for value in args.positional() {
        parts.push(encode_value(value)?);
    }
    for (name, value) in args.keywords() {
        if !is_identifier(name) {
            return Err(CodecError::InvalidKeyword { name: name.clone() });
        }
        parts.push(format!("{}={}", name, encode_value(value)?));
    }
    Ok(format!("({})", parts.join(",")))
}

/// Encode a full call: `qualified_name(args)`.
pub fn encode_call(qualified_name: &str, args: &CallArgs) -> Result<String, CodecError> {
    Ok(format!("{}{}", qualified_name, encode_args(args)?))
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_value(value: &Value, out: &mut String) -> Result<(), CodecError> {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)?),
        Value::Str(s) => write_str(s, out),
        Value::Bytes(b) => write_bytes(b, out),
        Value::Tuple(items) => {
            out.push('(');
            write_joined(items, out)?;
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::List(items) => {
            out.push('[');
            write_joined(items, out)?;
            out.push(']');
        }
        Value::Set(items) => {
            let mut encoded = items
                .iter()
                .map(|item| {
                    require_hashable(item, "set element")?;
                    encode_value(item)
                })
                .collect::<Result<Vec<_>, _>>()?;
            encoded.sort();
            encoded.dedup();
            if encoded.is_empty() {
                out.push_str("set()");
            } else {
                out.push('{');
                out.push_str(&encoded.join(","));
                out.push('}');
            }
        }
        Value::Dict(entries) => {
            let mut encoded = entries
                .iter()
                .map(|(k, v)| {
                    require_hashable(k, "dict key")?;
                    Ok((encode_value(k)?, encode_value(v)?))
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            if let Some(dup) = encoded.windows(2).find(|w| w[0].0 == w[1].0) {
                return Err(CodecError::UnsupportedValue {
                    reason: format!("duplicate dict key {}", dup[0].0),
                });
            }
            out.push('{');
            let body: Vec<String> = encoded
                .into_iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect();
            out.push_str(&body.join(","));
            out.push('}');
        }
    }
    Ok(())
}

fn write_joined(items: &[Value], out: &mut String) -> Result<(), CodecError> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_value(item, out)?;
    }
    Ok(())
}

fn require_hashable(value: &Value, role: &str) -> Result<(), CodecError> {
    if value.is_hashable() {
        Ok(())
    } else {
        Err(CodecError::UnsupportedValue {
            reason: format!("unhashable {} as {}", value.kind(), role),
        })
    }
}

/// Shortest round-trip form; always contains `.` or `e` so floats never
/// collide with ints.
fn format_float(f: f64) -> Result<String, CodecError> {
    if !f.is_finite() {
        return Err(CodecError::UnsupportedValue {
            reason: format!("non-finite float {}", f),
        });
    }
    Ok(format!("{:?}", f))
}

/// Single quotes unless the text contains `'` but no `"`.
fn pick_quote(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double {
        '"'
    } else {
        '\''
    }
}

fn write_str(s: &str, out: &mut String) {
    let quote = pick_quote(s.contains('\''), s.contains('"'));
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = u32::from(c);
                if code <= 0xff {
                    out.push_str(&format!("\\x{:02x}", code));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{:04x}", code));
                } else {
                    out.push_str(&format!("\\U{:08x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_bytes(b: &[u8], out: &mut String) {
    let quote = pick_quote(b.contains(&b'\''), b.contains(&b'"'));
    out.push('b');
    out.push(quote);
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            byte if char::from(byte) == quote => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(char::from(byte)),
            byte => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push(quote);
}
