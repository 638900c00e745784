//! Line and column lookup for nodes of a contract document.
//!
//! `serde_json` drops source positions, so [`PositionIndex::scan`] walks the
//! raw text once more and records where every object and array starts,
//! keyed by the JSON pointer of the value.

use std::collections::HashMap;

use serde::Serialize;

use super::escape_pointer_token;

/// 1-based line and column of a value in its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Start positions of the container values of one document.
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    positions: HashMap<String, Position>,
}

impl PositionIndex {
    /// Indexes `text`, which must already be known to be valid JSON.
    pub fn scan(text: &str) -> Self {
        let mut scanner = Scanner {
            text,
            offset: 0,
            line: 1,
            column: 1,
            positions: HashMap::new(),
        };
        let mut pointer = String::new();
        scanner.value(&mut pointer);
        Self {
            positions: scanner.positions,
        }
    }

    /// Position of the object or array at `pointer`.
    pub fn get(&self, pointer: &str) -> Option<Position> {
        self.positions.get(pointer).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

struct Scanner<'a> {
    text: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    positions: HashMap<String, Position>,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.offset).copied()
    }

    fn bump(&mut self) {
        let Some(byte) = self.peek() else {
            return;
        };
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if byte & 0xC0 != 0x80 {
            // UTF-8 continuation bytes belong to the previous character.
            self.column += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn value(&mut self, pointer: &mut String) {
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => {
                self.positions.insert(pointer.clone(), self.position());
                self.bump();
                self.object(pointer);
            }
            Some(b'[') => {
                self.positions.insert(pointer.clone(), self.position());
                self.bump();
                self.array(pointer);
            }
            Some(b'"') => {
                self.string();
            }
            Some(_) => self.scalar(),
            None => {}
        }
    }

    fn object(&mut self, pointer: &mut String) {
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.bump();
                    return;
                }
                Some(b'"') => {
                    let key = self.string();
                    self.skip_whitespace();
                    if self.peek() == Some(b':') {
                        self.bump();
                    }
                    let mark = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape_pointer_token(&key));
                    self.value(pointer);
                    pointer.truncate(mark);
                }
                Some(_) => self.bump(),
                None => return,
            }
        }
    }

    fn array(&mut self, pointer: &mut String) {
        let mut index = 0usize;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.bump();
                    return;
                }
                Some(b',') => {
                    self.bump();
                    index += 1;
                }
                Some(_) => {
                    let mark = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&index.to_string());
                    self.value(pointer);
                    pointer.truncate(mark);
                }
                None => return,
            }
        }
    }

    /// Consumes a string literal and returns its decoded contents.
    fn string(&mut self) -> String {
        let start = self.offset;
        self.bump();
        while let Some(byte) = self.peek() {
            match byte {
                b'\\' => {
                    self.bump();
                    self.bump();
                }
                b'"' => {
                    self.bump();
                    break;
                }
                _ => self.bump(),
            }
        }
        let literal = &self.text[start..self.offset];
        serde_json::from_str(literal).unwrap_or_else(|_| literal.trim_matches('"').to_string())
    }

    fn scalar(&mut self) {
        while let Some(byte) = self.peek() {
            if matches!(byte, b',' | b'}' | b']' | b' ' | b'\t' | b'\r' | b'\n') {
                break;
            }
            self.bump();
        }
    }
}
