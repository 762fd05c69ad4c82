//! Recursive-descent parser for call identities
//!
//! Accepts exactly the literal grammar emitted by the encoder. Nothing is
//! evaluated: names other than `None`, `True`, `False` and `set` are errors.

use super::{encode_value, is_identifier};
use crate::error::CodecError;
use crate::identity::FunctionRef;
use crate::value::{CallArgs, Value};

/// Parse `module.func(args)` into its function reference and arguments.
pub fn parse_call(src: &str) -> Result<(FunctionRef, CallArgs), CodecError> {
    let open = src.find('(').ok_or_else(|| CodecError::Decode {
        offset: src.len(),
        reason: "expected '('".to_string(),
    })?;
    let prefix = &src[..open];
    let dot = prefix.rfind('.').ok_or_else(|| CodecError::Decode {
        offset: 0,
        reason: format!("function name {:?} has no module path", prefix),
    })?;
    let module = &prefix[..dot];
    let name = &prefix[dot + 1..];
    if module.is_empty() {
        return Err(CodecError::Decode {
            offset: 0,
            reason: "empty module path".to_string(),
        });
    }
    if !is_identifier(name) {
        return Err(CodecError::Decode {
            offset: dot + 1,
            reason: format!("invalid function name {:?}", name),
        });
    }

    let mut parser = Parser::new(src, open);
    let args = parser.parse_arguments()?;
    parser.expect_end()?;
    Ok((
        FunctionRef::owned(module.to_string(), name.to_string()),
        args,
    ))
}

/// Parse a single literal.
pub fn parse_value(src: &str) -> Result<Value, CodecError> {
    let mut parser = Parser::new(src, 0);
    let value = parser.parse_value()?;
    parser.expect_end()?;
    Ok(value)
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Decode {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CodecError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    fn expect_end(&mut self) -> Result<(), CodecError> {
        self.skip_ws();
        if self.pos == self.src.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn identifier_len(&self) -> usize {
        let rest = self.rest();
        match rest.chars().next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => rest
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(rest.len()),
            _ => 0,
        }
    }

    /// `(` already located at `pos`.
    fn parse_arguments(&mut self) -> Result<CallArgs, CodecError> {
        self.expect('(')?;
        let mut args = CallArgs::new();
        let mut seen_keyword = false;
        if self.eat(')') {
            return Ok(args);
        }
        loop {
            self.skip_ws();
            if let Some(name) = self.keyword_name() {
                let start = self.pos;
                self.pos += name.len();
                self.expect('=')?;
                let value = self.parse_value()?;
                if !args.insert_keyword(name.to_string(), value) {
                    self.pos = start;
                    return Err(self.error(format!("duplicate keyword argument {:?}", name)));
                }
                seen_keyword = true;
            } else {
                if seen_keyword {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let value = self.parse_value()?;
                args.push_positional(value);
            }
            if self.eat(',') {
                continue;
            }
            self.expect(')')?;
            return Ok(args);
        }
    }

    /// An identifier immediately followed by `=` (keyword argument).
    fn keyword_name(&self) -> Option<&'a str> {
        let len = self.identifier_len();
        if len == 0 {
            return None;
        }
        let rest = self.rest();
        let after = rest[len..].trim_start_matches(|c: char| c.is_ascii_whitespace());
        if after.starts_with('=') {
            Some(&rest[..len])
        } else {
            None
        }
    }

    fn parse_value(&mut self) -> Result<Value, CodecError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('(') => self.parse_tuple(),
            Some('[') => {
                self.bump();
                let items = self.parse_items(']')?;
                Ok(Value::List(items))
            }
            Some('{') => self.parse_braced(),
            Some('\'') | Some('"') => self.parse_str().map(Value::Str),
            Some('b') if matches!(self.rest().chars().nth(1), Some('\'') | Some('"')) => {
                self.bump();
                self.parse_bytes().map(Value::Bytes)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => self.parse_name(),
        }
    }

    fn parse_name(&mut self) -> Result<Value, CodecError> {
        let len = self.identifier_len();
        if len == 0 {
            return Err(self.error("unexpected character"));
        }
        let name = &self.rest()[..len];
        let value = match name {
            "None" => Value::None,
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            "set" => {
                self.pos += len;
                self.expect('(')?;
                self.expect(')')?;
                return Ok(Value::Set(Vec::new()));
            }
            other => return Err(self.error(format!("unexpected name {:?}", other))),
        };
        self.pos += len;
        Ok(value)
    }

    /// `()`, `(x)` (parenthesised literal), `(x,)` and `(x,y,...)`.
    fn parse_tuple(&mut self) -> Result<Value, CodecError> {
        self.expect('(')?;
        if self.eat(')') {
            return Ok(Value::Tuple(Vec::new()));
        }
        let first = self.parse_value()?;
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;
        let mut items = vec![first];
        items.extend(self.parse_items(')')?);
        Ok(Value::Tuple(items))
    }

    /// Comma separated literals up to `close`; the opener is already consumed.
    /// A trailing comma is accepted.
    fn parse_items(&mut self, close: char) -> Result<Vec<Value>, CodecError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.parse_value()?);
            if !self.eat(',') {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    /// `{}` (dict), `{k:v,...}` (dict) or `{x,...}` (set).
    fn parse_braced(&mut self) -> Result<Value, CodecError> {
        self.expect('{')?;
        if self.eat('}') {
            return Ok(Value::Dict(Vec::new()));
        }
        let first = self.parse_value()?;
        if self.eat(':') {
            let mut entries = vec![(first, self.parse_value()?)];
            while self.eat(',') {
                if self.eat('}') {
                    return Ok(Value::Dict(entries));
                }
                self.skip_ws();
                let key_at = self.pos;
                let key = self.parse_value()?;
                if entries.iter().any(|(k, _)| same_key(k, &key)) {
                    self.pos = key_at;
                    return Err(self.error("duplicate dict key"));
                }
                self.expect(':')?;
                entries.push((key, self.parse_value()?));
            }
            self.expect('}')?;
            Ok(Value::Dict(entries))
        } else {
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.parse_items('}')?);
            } else {
                self.expect('}')?;
            }
            Ok(Value::Set(items))
        }
    }

    fn parse_number(&mut self) -> Result<Value, CodecError> {
        let start = self.pos;
        let text = self.rest();
        let len = text
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_digit()
                    || c == '.'
                    || c == 'e'
                    || c == 'E'
                    || ((c == '-' || c == '+')
                        && (i == 0 || matches!(text[..i].chars().last(), Some('e') | Some('E')))))
            })
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let literal = &text[..len];
        self.pos += len;
        let is_float = literal.contains(['.', 'e', 'E']);
        let result = if is_float {
            literal
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
        } else {
            literal.parse::<i64>().ok().map(Value::Int)
        };
        result.ok_or(CodecError::Decode {
            offset: start,
            reason: format!("invalid number {:?}", literal),
        })
    }

    fn parse_str(&mut self) -> Result<String, CodecError> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string"))?;
            match c {
                c if c == quote => return Ok(out),
                '\\' => out.push(self.parse_escape(true)?),
                c => out.push(c),
            }
        }
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let mut out = Vec::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated bytes"))?;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.parse_escape(false)?;
                    out.push(u8::try_from(u32::from(escaped)).map_err(|_| {
                        self.error("escape out of byte range")
                    })?);
                }
                c if c.is_ascii() => out.push(c as u8),
                _ => return Err(self.error("non-ASCII character in bytes literal")),
            }
        }
    }

    /// The backslash is already consumed.
    fn parse_escape(&mut self, unicode: bool) -> Result<char, CodecError> {
        let c = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
        let digits = match c {
            '\\' | '\'' | '"' => return Ok(c),
            'n' => return Ok('\n'),
            'r' => return Ok('\r'),
            't' => return Ok('\t'),
            'x' => 2,
            'u' if unicode => 4,
            'U' if unicode => 8,
            other => return Err(self.error(format!("unknown escape \\{}", other))),
        };
        let hex = self
            .rest()
            .get(..digits)
            .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|e| self.error(e.to_string()))?;
        let decoded = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos += digits;
        Ok(decoded)
    }
}

/// Dict keys collide when they encode identically.
fn same_key(a: &Value, b: &Value) -> bool {
    match (encode_value(a), encode_value(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}
