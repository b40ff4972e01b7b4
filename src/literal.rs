//! Parser for the literal expression syntax used by `.rept_deps` files.
//!
//! A manifest is a single literal expression built from mappings,
//! sequences and scalars (strings, numbers, `True`, `False`, `None`).
//! Nothing is ever evaluated: any bare name other than the three constants
//! is rejected. Every node keeps the byte span it came from so that the
//! manifest patcher can edit the original text in place.

use std::fmt;

use crate::error::{Error, Result};

const ILLEGAL_VALUE_ERR: &str = "illegal value used. (Do you have a function call in the file?)";

/// A half-open byte range into the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A parsed value together with its location in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub node: Node,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A string value. Adjacent literals are concatenated, so `pieces` counts
    /// how many literals made up the value; `content` is the span between the
    /// quotes of the first one and `quote` is its closing delimiter.
    Str {
        value: String,
        pieces: usize,
        content: Span,
        quote: &'static str,
        raw: bool,
    },
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Seq(Vec<Value>),
    Map(MapNode),
}

/// A `{ key: value, ... }` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    pub entries: Vec<(Value, Value)>,
    /// Byte offset of the closing `}`.
    pub close: usize,
    /// Byte offset of a comma following the last entry, if there is one.
    pub trailing_comma: Option<usize>,
}

impl MapNode {
    /// Index of the first entry whose key is the string `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.as_str() == Some(key))
    }

    /// Value of the first entry whose key is the string `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match &self.node {
            Node::Str { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapNode> {
        match &self.node {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match &self.node {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// True for a string written as exactly one literal.
    pub fn is_single_string_literal(&self) -> bool {
        matches!(self.node, Node::Str { pieces: 1, .. })
    }

    /// Convert to a JSON value so typed records can be extracted with serde.
    ///
    /// Mapping keys that are not strings are rendered with their display
    /// form; they never match a field name.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match &self.node {
            Node::Str { value, .. } => Json::String(value.clone()),
            Node::Int(i) => Json::from(*i),
            Node::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Node::Bool(b) => Json::Bool(*b),
            Node::None => Json::Null,
            Node::Seq(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Node::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, value) in &map.entries {
                    let key = match key.as_str() {
                        Some(s) => s.to_string(),
                        None => key.to_string(),
                    };
                    object.insert(key, value.to_json());
                }
                Json::Object(object)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Str { value, .. } => write!(f, "{:?}", value),
            Node::Int(i) => write!(f, "{}", i),
            Node::Float(x) => write!(f, "{}", x),
            Node::Bool(true) => write!(f, "True"),
            Node::Bool(false) => write!(f, "False"),
            Node::None => write!(f, "None"),
            Node::Seq(items) => write!(f, "<sequence of {}>", items.len()),
            Node::Map(map) => write!(f, "<mapping of {}>", map.entries.len()),
        }
    }
}

/// Parse `text` as one literal expression.
///
/// Returns `Ok(None)` when the text holds nothing but whitespace and
/// comments.
pub fn parse(text: &str) -> Result<Option<Value>> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        text,
        tokens: &tokens,
        pos: 0,
    };
    let value = parser.parse_value()?;
    if let Some(token) = parser.peek() {
        return Err(syntax_error(text, token.span.start));
    }
    Ok(Some(value))
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Minus,
    Str {
        value: String,
        content: Span,
        quote: &'static str,
        raw: bool,
    },
    Number(String),
    Name(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    span: Span,
}

fn syntax_error(text: &str, offset: usize) -> Error {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = text[line_start..offset].chars().count() + 1;
    Error::parse(format!("syntax error at line {}, offset {}", line, column))
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let punct = match c {
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b':' => Some(TokenKind::Colon),
            b',' => Some(TokenKind::Comma),
            b'-' => Some(TokenKind::Minus),
            _ => None,
        };
        if let Some(kind) = punct {
            tokens.push(Token {
                kind,
                span: Span::new(i, i + 1),
            });
            i += 1;
            continue;
        }

        match c {
            b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' => i += 1,
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'\\' => {
                // Explicit line continuation.
                match bytes.get(i + 1) {
                    Some(b'\n') => i += 2,
                    Some(b'\r') if bytes.get(i + 2) == Some(&b'\n') => i += 3,
                    _ => return Err(syntax_error(text, i)),
                }
            }
            b'"' | b'\'' => {
                let token = lex_string(text, i, i, false)?;
                i = token.span.end;
                tokens.push(token);
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'.' | b'_'))
                {
                    // Exponent sign, as in 1e-5.
                    if matches!(bytes[i], b'e' | b'E')
                        && matches!(bytes.get(i + 1), Some(b'+') | Some(b'-'))
                    {
                        i += 1;
                    }
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number(text[start..i].to_string()),
                    span: Span::new(start, i),
                });
            }
            c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric() || bytes[i] >= 0x80)
                {
                    i += 1;
                }
                let word = &text[start..i];
                let quoted = matches!(bytes.get(i), Some(b'"') | Some(b'\''));
                let lower = word.to_ascii_lowercase();
                if quoted && matches!(lower.as_str(), "r" | "u") {
                    let token = lex_string(text, start, i, lower == "r")?;
                    i = token.span.end;
                    tokens.push(token);
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Name(word.to_string()),
                        span: Span::new(start, i),
                    });
                }
            }
            _ => return Err(syntax_error(text, i)),
        }
    }

    Ok(tokens)
}

/// Lex one string literal whose prefix starts at `start` and whose opening
/// quote is at `quote_at`.
fn lex_string(text: &str, start: usize, quote_at: usize, raw: bool) -> Result<Token> {
    let bytes = text.as_bytes();
    let q = bytes[quote_at];
    let triple = bytes.get(quote_at + 1) == Some(&q) && bytes.get(quote_at + 2) == Some(&q);
    let quote: &'static str = match (q, triple) {
        (b'"', true) => "\"\"\"",
        (b'"', false) => "\"",
        (_, true) => "'''",
        (_, false) => "'",
    };

    let content_start = quote_at + quote.len();
    let mut i = content_start;
    loop {
        if i >= bytes.len() {
            return Err(syntax_error(text, start));
        }
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !triple => return Err(syntax_error(text, start)),
            c if c == q && text[i..].starts_with(quote) => break,
            _ => i += 1,
        }
    }

    let content = Span::new(content_start, i);
    let inner = &text[content.start..content.end];
    let value = if raw {
        inner.to_string()
    } else {
        unescape(inner).map_err(|()| syntax_error(text, start))?
    };

    Ok(Token {
        kind: TokenKind::Str {
            value,
            content,
            quote,
            raw,
        },
        span: Span::new(start, i + quote.len()),
    })
}

fn unescape(inner: &str) -> std::result::Result<String, ()> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(());
        };
        match esc {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut code = esc.to_digit(8).ok_or(())?;
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(())?);
            }
            'x' | 'u' | 'U' => {
                let width = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..width {
                    let digit = chars.next().and_then(|d| d.to_digit(16)).ok_or(())?;
                    code = code * 16 + digit;
                }
                out.push(char::from_u32(code).ok_or(())?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

struct Parser<'a> {
    text: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&'a Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| syntax_error(self.text, self.text.len()))?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.peek().map(|t| &t.kind == kind).unwrap_or(false)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'a Token> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(syntax_error(self.text, token.span.start))
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Str { .. } => self.parse_string(token),
            TokenKind::Number(digits) => self.number(digits, token.span, false),
            TokenKind::Minus => {
                let operand = self.next()?;
                match &operand.kind {
                    TokenKind::Number(digits) => {
                        self.number(digits, Span::new(token.span.start, operand.span.end), true)
                    }
                    TokenKind::Name(_) => Err(Error::parse(ILLEGAL_VALUE_ERR)),
                    _ => Err(syntax_error(self.text, operand.span.start)),
                }
            }
            TokenKind::Name(name) => {
                let node = match name.as_str() {
                    "True" => Node::Bool(true),
                    "False" => Node::Bool(false),
                    "None" => Node::None,
                    _ => return Err(Error::parse(ILLEGAL_VALUE_ERR)),
                };
                if self.peek_is(&TokenKind::LParen) {
                    return Err(Error::parse(ILLEGAL_VALUE_ERR));
                }
                Ok(Value {
                    node,
                    span: token.span,
                })
            }
            TokenKind::LBrace => self.parse_map(token.span.start),
            TokenKind::LBracket => {
                let (items, end) = self.parse_items(TokenKind::RBracket)?;
                Ok(Value {
                    node: Node::Seq(items),
                    span: Span::new(token.span.start, end),
                })
            }
            TokenKind::LParen => self.parse_paren(token.span.start),
            _ => Err(syntax_error(self.text, token.span.start)),
        }
    }

    fn parse_string(&mut self, first: &'a Token) -> Result<Value> {
        let TokenKind::Str {
            value,
            content,
            quote,
            raw,
        } = &first.kind
        else {
            return Err(syntax_error(self.text, first.span.start));
        };

        let mut joined = value.clone();
        let mut pieces = 1;
        let mut end = first.span.end;
        while let Some(Token {
            kind: TokenKind::Str { value, .. },
            span,
        }) = self.peek()
        {
            joined.push_str(value);
            pieces += 1;
            end = span.end;
            self.pos += 1;
        }

        Ok(Value {
            node: Node::Str {
                value: joined,
                pieces,
                content: *content,
                quote: *quote,
                raw: *raw,
            },
            span: Span::new(first.span.start, end),
        })
    }

    fn number(&self, digits: &str, span: Span, negative: bool) -> Result<Value> {
        let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
        let cleaned = if negative {
            format!("-{}", cleaned)
        } else {
            cleaned
        };

        let node = if let Ok(i) = cleaned.parse::<i64>() {
            Node::Int(i)
        } else if let Ok(f) = cleaned.parse::<f64>() {
            Node::Float(f)
        } else {
            return Err(syntax_error(self.text, span.start));
        };
        Ok(Value { node, span })
    }

    fn parse_map(&mut self, start: usize) -> Result<Value> {
        let mut entries = Vec::new();
        let mut trailing_comma = None;

        loop {
            let token = self
                .peek()
                .ok_or_else(|| syntax_error(self.text, self.text.len()))?;
            if token.kind == TokenKind::RBrace {
                self.pos += 1;
                return Ok(Value {
                    node: Node::Map(MapNode {
                        entries,
                        close: token.span.start,
                        trailing_comma,
                    }),
                    span: Span::new(start, token.span.end),
                });
            }
            if !entries.is_empty() && trailing_comma.is_none() {
                return Err(syntax_error(self.text, token.span.start));
            }

            let key = self.parse_value()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value()?;
            entries.push((key, value));

            trailing_comma = if self.peek_is(&TokenKind::Comma) {
                let comma = self.next()?;
                Some(comma.span.start)
            } else {
                None
            };
        }
    }

    /// Parse comma separated values up to `close`, returning them and the
    /// end offset of the closing token.
    fn parse_items(&mut self, close: TokenKind) -> Result<(Vec<Value>, usize)> {
        let mut items = Vec::new();
        let mut separated = true;

        loop {
            let token = self
                .peek()
                .ok_or_else(|| syntax_error(self.text, self.text.len()))?;
            if token.kind == close {
                self.pos += 1;
                return Ok((items, token.span.end));
            }
            if !separated {
                return Err(syntax_error(self.text, token.span.start));
            }

            items.push(self.parse_value()?);
            separated = self.peek_is(&TokenKind::Comma);
            if separated {
                self.pos += 1;
            }
        }
    }

    fn parse_paren(&mut self, start: usize) -> Result<Value> {
        if self.peek_is(&TokenKind::RParen) {
            let close = self.next()?;
            return Ok(Value {
                node: Node::Seq(Vec::new()),
                span: Span::new(start, close.span.end),
            });
        }

        let first = self.parse_value()?;
        if self.peek_is(&TokenKind::RParen) {
            // A parenthesised value spans its parentheses.
            let close = self.next()?;
            return Ok(Value {
                node: first.node,
                span: Span::new(start, close.span.end),
            });
        }

        self.expect(TokenKind::Comma)?;
        let (mut rest, end) = self.parse_items(TokenKind::RParen)?;
        rest.insert(0, first);
        Ok(Value {
            node: Node::Seq(rest),
            span: Span::new(start, end),
        })
    }
}

#[cfg(test)]
#[path = "literal_tests.rs"]
mod tests;
