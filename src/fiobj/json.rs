//! Streaming JSON parser and recursive formatter.
//!
//! The parser is callback-driven (`on_null`, `on_string`, ...) so a caller
//! can consume a value without ever materializing it; here the callback
//! contract is expressed as the [`JsonSink`] trait, and [`parse_value`] is
//! a convenience built on top of it that always builds a [`FioValue`]
//! tree, the way most callers actually use a push parser in practice.

use std::fmt;

use crate::collections::{Array, ByteString, OrderedMap};

use super::value::{FioValue, FIOBJ_MAX_NESTING};

/// Bounds nesting depth during parsing, the same role `FIOBJ_MAX_NESTING`
/// plays during formatting and `each2`.
pub const JSON_MAX_DEPTH: usize = FIOBJ_MAX_NESTING;

/// Toggles for this parser's lenient, non-RFC-8259 extensions. All default
/// on so callers opt *out* of leniency rather than into it.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    pub allow_trailing_commas: bool,
    pub allow_comments: bool,
    pub allow_nan_infinity: bool,
    pub allow_radix_literals: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            allow_trailing_commas: true,
            allow_comments: true,
            allow_nan_infinity: true,
            allow_radix_literals: true,
        }
    }
}

/// Callback contract a streaming caller can implement instead of taking the
/// always-build-a-tree path through [`parse_value`].
pub trait JsonSink {
    fn on_null(&mut self) {}
    fn on_true(&mut self) {}
    fn on_false(&mut self) {}
    fn on_number(&mut self, _value: i64) {}
    fn on_float(&mut self, _value: f64) {}
    fn on_string(&mut self, _bytes: &[u8]) {}
    fn on_start_object(&mut self) {}
    fn on_end_object(&mut self) {}
    fn on_start_array(&mut self) {}
    fn on_end_array(&mut self) {}
    fn on_json(&mut self) {}
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "json error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for JsonError {}

/// Parses one JSON value from the start of `input`, notifying `sink` of
/// every recognized token. Returns the number of bytes consumed so the
/// caller can feed the remainder (or a fresh buffer) back in, for
/// partial/streaming input.
pub fn parse<S: JsonSink>(input: &[u8], opts: ParserOptions, sink: &mut S) -> Result<usize, JsonError> {
    let mut cursor = Cursor {
        input,
        pos: 0,
        depth: 0,
        opts,
    };
    cursor.skip_whitespace_and_comments();
    cursor.parse_value(sink)?;
    sink.on_json();
    cursor.skip_whitespace_and_comments();
    Ok(cursor.pos)
}

/// Parses one JSON value into a [`FioValue`] tree.
pub fn parse_value(input: &[u8]) -> Result<(FioValue, usize), JsonError> {
    parse_value_with(input, ParserOptions::default())
}

pub fn parse_value_with(input: &[u8], opts: ParserOptions) -> Result<(FioValue, usize), JsonError> {
    let mut builder = TreeBuilder::default();
    let consumed = parse(input, opts, &mut builder)?;
    let value = builder.finish().ok_or_else(|| JsonError {
        message: "no value produced".to_string(),
        offset: consumed,
    })?;
    Ok((value, consumed))
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    opts: ParserOptions,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn err(&self, message: &str) -> JsonError {
        JsonError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => {
                    self.pos += 1;
                }
                Some(b'#') if self.opts.allow_comments => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.opts.allow_comments && self.input.get(self.pos + 1) == Some(&b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.opts.allow_comments && self.input.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    while self.pos < self.input.len() && !self.input[self.pos..].starts_with(b"*/") {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.input.len());
                }
                _ => break,
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), JsonError> {
        if self.bump() == Some(byte) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", byte as char)))
        }
    }

    fn parse_value<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), JsonError> {
        if self.depth >= JSON_MAX_DEPTH {
            return Err(self.err("max nesting depth exceeded"));
        }
        self.skip_whitespace_and_comments();
        match self.peek().ok_or_else(|| self.err("unexpected end of input"))? {
            b'{' => self.parse_object(sink),
            b'[' => self.parse_array(sink),
            b'"' => {
                let bytes = self.parse_string_bytes()?;
                sink.on_string(&bytes);
                Ok(())
            }
            b't' => self.parse_keyword(b"true", || {}, sink, JsonSink::on_true),
            b'f' => self.parse_keyword(b"false", || {}, sink, JsonSink::on_false),
            b'n' => self.parse_keyword(b"null", || {}, sink, JsonSink::on_null),
            b'N' if self.opts.allow_nan_infinity => {
                self.parse_keyword(b"NaN", || {}, sink, |s| s.on_float(f64::NAN))
            }
            b'I' if self.opts.allow_nan_infinity => {
                self.parse_keyword(b"Infinity", || {}, sink, |s| s.on_float(f64::INFINITY))
            }
            b'-' if self.opts.allow_nan_infinity && self.input[self.pos..].starts_with(b"-Infinity") => {
                self.pos += 9;
                sink.on_float(f64::NEG_INFINITY);
                Ok(())
            }
            b'-' | b'0'..=b'9' => self.parse_number(sink),
            other => Err(self.err(&format!("unexpected byte '{}'", other as char))),
        }
    }

    fn parse_keyword<S: JsonSink>(
        &mut self,
        keyword: &[u8],
        _unused: impl FnOnce(),
        sink: &mut S,
        emit: impl FnOnce(&mut S),
    ) -> Result<(), JsonError> {
        if self.input[self.pos..].starts_with(keyword) {
            self.pos += keyword.len();
            emit(sink);
            Ok(())
        } else {
            Err(self.err("invalid literal"))
        }
    }

    fn parse_object<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), JsonError> {
        self.expect(b'{')?;
        self.depth += 1;
        sink.on_start_object();
        self.skip_whitespace_and_comments();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            sink.on_end_object();
            return Ok(());
        }
        loop {
            self.skip_whitespace_and_comments();
            if self.peek() != Some(b'"') {
                return Err(self.err("expected object key"));
            }
            let key = self.parse_string_bytes()?;
            sink.on_string(&key);
            self.skip_whitespace_and_comments();
            self.expect(b':')?;
            self.parse_value(sink)?;
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace_and_comments();
                    if self.opts.allow_trailing_commas && self.peek() == Some(b'}') {
                        break;
                    }
                }
                Some(b'}') => break,
                _ => return Err(self.err("expected ',' or '}'")),
            }
        }
        self.expect(b'}')?;
        self.depth -= 1;
        sink.on_end_object();
        Ok(())
    }

    fn parse_array<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), JsonError> {
        self.expect(b'[')?;
        self.depth += 1;
        sink.on_start_array();
        self.skip_whitespace_and_comments();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            sink.on_end_array();
            return Ok(());
        }
        loop {
            self.parse_value(sink)?;
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace_and_comments();
                    if self.opts.allow_trailing_commas && self.peek() == Some(b']') {
                        break;
                    }
                }
                Some(b']') => break,
                _ => return Err(self.err("expected ',' or ']'")),
            }
        }
        self.expect(b']')?;
        self.depth -= 1;
        sink.on_end_array();
        Ok(())
    }

    fn parse_string_bytes(&mut self) -> Result<Vec<u8>, JsonError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.bump().ok_or_else(|| self.err("unterminated string"))?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.bump().ok_or_else(|| self.err("unterminated escape"))?;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'x' => {
                            let hex = self.take_hex(2)?;
                            out.push(hex as u8);
                        }
                        b'u' => {
                            let high = self.take_hex(4)?;
                            let code = if (0xD800..=0xDBFF).contains(&high) {
                                if self.input[self.pos..].starts_with(b"\\u") {
                                    self.pos += 2;
                                    let low = self.take_hex(4)?;
                                    if (0xDC00..=0xDFFF).contains(&low) {
                                        0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                                    } else {
                                        high
                                    }
                                } else {
                                    high
                                }
                            } else {
                                high
                            };
                            if let Some(c) = char::from_u32(code) {
                                let mut buf = [0u8; 4];
                                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                            }
                        }
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u32;
                            for _ in 0..2 {
                                if let Some(d @ b'0'..=b'7') = self.peek() {
                                    value = value * 8 + (d - b'0') as u32;
                                    self.pos += 1;
                                } else {
                                    break;
                                }
                            }
                            out.push(value as u8);
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn take_hex(&mut self, digits: usize) -> Result<u32, JsonError> {
        let end = self.pos + digits;
        let slice = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| self.err("truncated hex escape"))?;
        let s = std::str::from_utf8(slice).map_err(|_| self.err("invalid hex escape"))?;
        let value = u32::from_str_radix(s, 16).map_err(|_| self.err("invalid hex escape"))?;
        self.pos = end;
        Ok(value)
    }

    fn parse_number<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), JsonError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        if self.opts.allow_radix_literals && self.peek() == Some(b'0') {
            let radix_char = self.input.get(self.pos + 1).copied();
            let radix = match radix_char {
                Some(b'x') | Some(b'X') => Some(16),
                Some(b'o') | Some(b'O') => Some(8),
                Some(b'b') | Some(b'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while self
                    .peek()
                    .map(|b| (b as char).is_digit(radix))
                    .unwrap_or(false)
                {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.input[digits_start..self.pos]).unwrap();
                let magnitude = i64::from_str_radix(text, radix).map_err(|_| self.err("invalid radix literal"))?;
                let negative = self.input[start] == b'-';
                sink.on_number(if negative { -magnitude } else { magnitude });
                return Ok(());
            }
        }

        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' if self.pos > start => {
                    is_float = is_float || matches!(b, b'.' | b'e' | b'E');
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        if is_float {
            let value: f64 = text.parse().map_err(|_| self.err("invalid number"))?;
            sink.on_float(value);
        } else {
            match text.parse::<i64>() {
                Ok(value) => sink.on_number(value),
                Err(_) => {
                    let value: f64 = text.parse().map_err(|_| self.err("invalid number"))?;
                    sink.on_float(value);
                }
            }
        }
        Ok(())
    }
}

/// Builds a [`FioValue`] tree by following the callback stream — the
/// bridge between the push-style parser and a caller that just wants a
/// value.
#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<FioValue>,
}

enum Frame {
    Array(Array<FioValue>),
    /// The pending key lives per-frame so a nested object doesn't consume
    /// the key its parent object is still waiting to be matched with a
    /// value.
    Object(OrderedMap<ByteString, FioValue>, Option<ByteString>),
}

impl TreeBuilder {
    fn finish(mut self) -> Option<FioValue> {
        self.root.take()
    }

    fn emit(&mut self, value: FioValue) {
        match self.stack.last_mut() {
            Some(Frame::Array(arr)) => arr.push(value),
            Some(Frame::Object(map, pending_key)) => {
                if let Some(key) = pending_key.take() {
                    let hash = key.hash(0);
                    map.set(hash, key, value);
                }
            }
            None => self.root = Some(value),
        }
    }
}

impl JsonSink for TreeBuilder {
    fn on_null(&mut self) {
        self.emit(FioValue::Null);
    }

    fn on_true(&mut self) {
        self.emit(FioValue::True);
    }

    fn on_false(&mut self) {
        self.emit(FioValue::False);
    }

    fn on_number(&mut self, value: i64) {
        self.emit(FioValue::Int(value));
    }

    fn on_float(&mut self, value: f64) {
        self.emit(FioValue::Float(value));
    }

    fn on_string(&mut self, bytes: &[u8]) {
        // A string immediately following an object-key position (i.e. the
        // innermost frame is an `Object` still waiting on its own pending
        // key) is a key, not a value.
        if let Some(Frame::Object(_, pending_key)) = self.stack.last_mut() {
            if pending_key.is_none() {
                *pending_key = Some(ByteString::from_bytes(bytes));
                return;
            }
        }
        self.emit(FioValue::String(ByteString::from_bytes(bytes)));
    }

    fn on_start_object(&mut self) {
        self.stack.push(Frame::Object(OrderedMap::new(), None));
    }

    fn on_end_object(&mut self) {
        if let Some(Frame::Object(map, _)) = self.stack.pop() {
            self.emit(FioValue::Hash(map));
        }
    }

    fn on_start_array(&mut self) {
        self.stack.push(Frame::Array(Array::new()));
    }

    fn on_end_array(&mut self) {
        if let Some(Frame::Array(arr)) = self.stack.pop() {
            self.emit(FioValue::Array(arr));
        }
    }
}

/// Recursively formats `value` as JSON text, with an iteration-depth guard
/// equal to [`FIOBJ_MAX_NESTING`].
pub fn format(value: &FioValue, beautify: bool) -> String {
    let mut out = String::new();
    format_into(value, beautify, 0, &mut out);
    out
}

fn indent(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn format_into(value: &FioValue, beautify: bool, depth: usize, out: &mut String) {
    if depth >= FIOBJ_MAX_NESTING {
        out.push_str("null");
        return;
    }
    match value {
        FioValue::Null => out.push_str("null"),
        FioValue::True => out.push_str("true"),
        FioValue::False => out.push_str("false"),
        FioValue::Int(i) => out.push_str(&i.to_string()),
        FioValue::Float(f) => {
            if f.is_nan() {
                out.push_str("NaN");
            } else if f.is_infinite() {
                out.push_str(if *f > 0.0 { "Infinity" } else { "-Infinity" });
            } else {
                out.push_str(&f.to_string());
            }
        }
        FioValue::String(s) => format_string(s.as_bytes(), out),
        FioValue::Array(a) => {
            out.push('[');
            let mut first = true;
            a.each(0, |v| {
                if !first {
                    out.push(',');
                }
                first = false;
                if beautify {
                    indent(out, depth + 1);
                }
                format_into(v, beautify, depth + 1, out);
            });
            if beautify && !first {
                indent(out, depth);
            }
            out.push(']');
        }
        FioValue::Hash(h) => {
            out.push('{');
            let mut first = true;
            h.each(|k, v| {
                if !first {
                    out.push(',');
                }
                first = false;
                if beautify {
                    indent(out, depth + 1);
                }
                format_string(k.as_bytes(), out);
                out.push(':');
                if beautify {
                    out.push(' ');
                }
                format_into(v, beautify, depth + 1, out);
            });
            if beautify && !first {
                indent(out, depth);
            }
            out.push('}');
        }
        FioValue::Other(o) => {
            format_string(format!("{o:?}").as_bytes(), out);
        }
    }
}

/// First-byte lookup table classifying the length of a UTF-8 sequence
/// starting with that byte (0 = invalid/continuation byte).
const UTF8_LEN: [u8; 5] = [1, 2, 3, 4, 0];

fn format_string(bytes: &[u8], out: &mut String) {
    out.push('"');
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x08 => out.push_str("\\b"),
            0x0C => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x00..=0x1F => out.push_str(&format!("\\u{:04x}", b)),
            0x80..=0xFF => {
                let len = utf8_seq_len(b);
                if len > 0 && i + len <= bytes.len() {
                    if let Ok(s) = std::str::from_utf8(&bytes[i..i + len]) {
                        out.push_str(s);
                        i += len;
                        continue;
                    }
                }
                out.push_str(&format!("\\x{:02x}", b));
            }
            _ => out.push(b as char),
        }
        i += 1;
    }
    out.push('"');
}

fn utf8_seq_len(first_byte: u8) -> usize {
    let idx = match first_byte {
        0xC0..=0xDF => 1,
        0xE0..=0xEF => 2,
        0xF0..=0xF7 => 3,
        _ => 4,
    };
    UTF8_LEN[idx] as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_object() {
        let (value, consumed) = parse_value(br#"{"a":1,"b":[true,false,null]}"#).unwrap();
        assert!(consumed > 0);
        match value {
            FioValue::Hash(h) => assert_eq!(h.count(), 2),
            _ => panic!("expected hash"),
        }
    }

    #[test]
    fn parses_trailing_comma_and_comments() {
        let input = b"[1, 2, 3,] // trailing comment\n";
        let (value, _) = parse_value(input).unwrap();
        match value {
            FioValue::Array(a) => assert_eq!(a.count(), 3),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn parses_hex_and_nan() {
        let (value, _) = parse_value(b"0x1F").unwrap();
        assert!(matches!(value, FioValue::Int(31)));
        let (value, _) = parse_value(b"NaN").unwrap();
        assert!(matches!(value, FioValue::Float(f) if f.is_nan()));
    }

    #[test]
    fn parses_unicode_escape_with_surrogate_pair() {
        let (value, _) = parse_value(br#""😀""#).unwrap();
        match value {
            FioValue::String(s) => assert_eq!(String::from_utf8(s.as_bytes().to_vec()).unwrap(), "\u{1F600}"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn format_then_reparse_roundtrips() {
        let (value, _) = parse_value(br#"{"x":[1,2.5,"hi",null,true]}"#).unwrap();
        let text = format(&value, false);
        let (reparsed, _) = parse_value(text.as_bytes()).unwrap();
        assert!(value.deep_eq(&reparsed));
    }

    #[test]
    fn beautify_inserts_newlines_and_indentation() {
        let (value, _) = parse_value(br#"[1,2]"#).unwrap();
        let text = format(&value, true);
        assert!(text.contains('\n'));
    }

    #[test]
    fn rejects_unterminated_string() {
        let result = parse_value(br#""unterminated"#);
        assert!(result.is_err());
    }
}
