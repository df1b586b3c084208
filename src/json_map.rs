use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::SarifError;
use crate::model::Position;

/// Source span of one JSON value, and of its member key when it has one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PointerSpan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key_end: Option<Position>,
    pub(crate) value: Position,
    pub(crate) value_end: Position,
}

/// Parsed JSON document plus the source span of every value, keyed by JSON Pointer.
#[derive(Debug)]
pub(crate) struct JsonMapping {
    pub(crate) data: Value,
    pointers: BTreeMap<String, PointerSpan>,
}

impl JsonMapping {
    pub(crate) fn span(&self, pointer: &str) -> Option<&PointerSpan> {
        self.pointers.get(pointer)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pointers.len()
    }
}

/// Parse `text` once into a value tree and a pointer table.
pub(crate) fn parse(text: &str) -> Result<JsonMapping, SarifError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let data: Value = serde_json::from_str(text).map_err(|err| SarifError::InvalidJson {
        line: err.line() as u32,
        column: err.column() as u32,
        message: err.to_string(),
    })?;
    let mut scanner = Scanner::new(text);
    scanner.scan_document()?;
    Ok(JsonMapping {
        data,
        pointers: scanner.pointers,
    })
}

/// Escape one reference token per RFC 6901.
pub(crate) fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

struct Scanner {
    chars: Vec<char>,
    index: usize,
    line: u32,
    column: u32,
    pointers: BTreeMap<String, PointerSpan>,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            index: 0,
            line: 0,
            column: 0,
            pointers: BTreeMap::new(),
        }
    }

    fn scan_document(&mut self) -> Result<(), SarifError> {
        self.skip_whitespace();
        self.scan_value(String::new(), None)?;
        self.skip_whitespace();
        if self.peek().is_some() {
            return Err(self.error("trailing characters after JSON value"));
        }
        Ok(())
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peek()?;
        self.index += 1;
        if current == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            // Columns count UTF-16 code units, as editors do.
            self.column += current.len_utf16() as u32;
        }
        Some(current)
    }

    fn expect(&mut self, expected: char) -> Result<(), SarifError> {
        match self.bump() {
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(self.error(&format!("expected '{expected}', found '{found}'"))),
            None => Err(self.error(&format!("expected '{expected}', found end of input"))),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> SarifError {
        SarifError::InvalidJson {
            line: self.line + 1,
            column: self.column + 1,
            message: message.to_string(),
        }
    }

    fn scan_value(
        &mut self,
        pointer: String,
        key: Option<(Position, Position)>,
    ) -> Result<(), SarifError> {
        let start = self.position();
        match self.peek() {
            Some('{') => self.scan_object(&pointer)?,
            Some('[') => self.scan_array(&pointer)?,
            Some('"') => {
                self.scan_string()?;
            }
            Some('t') => self.scan_literal("true")?,
            Some('f') => self.scan_literal("false")?,
            Some('n') => self.scan_literal("null")?,
            Some(c) if c == '-' || c.is_ascii_digit() => self.scan_number()?,
            Some(c) => return Err(self.error(&format!("unexpected character '{c}'"))),
            None => return Err(self.error("unexpected end of input")),
        }
        let end = self.position();
        self.pointers.insert(
            pointer,
            PointerSpan {
                key: key.map(|(key_start, _)| key_start),
                key_end: key.map(|(_, key_end)| key_end),
                value: start,
                value_end: end,
            },
        );
        Ok(())
    }

    fn scan_object(&mut self, pointer: &str) -> Result<(), SarifError> {
        self.expect('{')?;
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(());
        }
        loop {
            self.skip_whitespace();
            let key_start = self.position();
            if self.peek() != Some('"') {
                return Err(self.error("expected object key"));
            }
            let key = self.scan_string()?;
            let key_end = self.position();
            self.skip_whitespace();
            self.expect(':')?;
            self.skip_whitespace();
            let child = format!("{pointer}/{}", escape_token(&key));
            self.scan_value(child, Some((key_start, key_end)))?;
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(()),
                _ => return Err(self.error("expected ',' or '}' in object")),
            }
        }
    }

    fn scan_array(&mut self, pointer: &str) -> Result<(), SarifError> {
        self.expect('[')?;
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(());
        }
        let mut index = 0usize;
        loop {
            self.skip_whitespace();
            self.scan_value(format!("{pointer}/{index}"), None)?;
            index += 1;
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(()),
                _ => return Err(self.error("expected ',' or ']' in array")),
            }
        }
    }

    fn scan_string(&mut self) -> Result<String, SarifError> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('/') => value.push('/'),
                    Some('b') => value.push('\u{8}'),
                    Some('f') => value.push('\u{c}'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('u') => {
                        let decoded = self.scan_unicode_escape()?;
                        value.push(decoded);
                    }
                    _ => return Err(self.error("invalid escape sequence")),
                },
                Some(c) if (c as u32) < 0x20 => {
                    return Err(self.error("control character in string"));
                }
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn scan_hex4(&mut self) -> Result<u32, SarifError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn scan_unicode_escape(&mut self) -> Result<char, SarifError> {
        let high = self.scan_hex4()?;
        if (0xD800..0xDC00).contains(&high)
            && self.peek() == Some('\\')
            && self.chars.get(self.index + 1) == Some(&'u')
        {
            self.bump();
            self.bump();
            let low = self.scan_hex4()?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn scan_literal(&mut self, literal: &str) -> Result<(), SarifError> {
        for expected in literal.chars() {
            if self.bump() != Some(expected) {
                return Err(self.error(&format!("invalid literal, expected {literal}")));
            }
        }
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), SarifError> {
        if self.peek() == Some('-') {
            self.bump();
        }
        match self.peek() {
            Some('0') => {
                self.bump();
            }
            Some(c) if c.is_ascii_digit() => self.scan_digits(),
            _ => return Err(self.error("invalid number")),
        }
        if self.peek() == Some('.') {
            self.bump();
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.error("invalid number fraction"));
            }
            self.scan_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.error("invalid number exponent"));
            }
            self.scan_digits();
        }
        Ok(())
    }

    fn scan_digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
    }
}
