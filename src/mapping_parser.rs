//! Rename Mapping Parser
//!
//! Turns untrusted model text into a column rename mapping. The model is asked
//! for a Python dictionary literal; JSON objects are accepted too since they
//! are a subset of that syntax. Only a flat mapping of string keys to string
//! values is accepted, anything else is rejected with a reason.

use serde::{Deserialize, Serialize};

/// Tagged result of parsing untrusted text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Rejected { reason: String },
}

impl<T> ParseOutcome<T> {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ParseOutcome::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            ParseOutcome::Parsed(value) => Some(value),
            ParseOutcome::Rejected { .. } => None,
        }
    }
}

/// Ordered `old column name -> new column name` pairs
pub type RenameMapping = Vec<(String, String)>;

/// Remove surrounding Markdown code fences (```python, ```json, ```)
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(newline) => &body[newline + 1..],
            None => body.trim_start_matches('`'),
        };
    }
    let trimmed_end = body.trim_end();
    if let Some(stripped) = trimmed_end.strip_suffix("```") {
        body = stripped;
    }
    body.trim()
}

/// Parse model output into a rename mapping
pub fn parse_rename_mapping(text: &str) -> ParseOutcome<RenameMapping> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return ParseOutcome::rejected("empty response");
    }
    let mut parser = LiteralParser::new(body);
    match parser.parse_mapping() {
        Ok(mapping) => ParseOutcome::Parsed(mapping),
        Err(reason) => ParseOutcome::Rejected { reason },
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> ParseResult<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(format!(
                "expected '{}' at position {}, found '{}'",
                expected, self.pos, c
            )),
            None => Err(format!("expected '{}' but input ended", expected)),
        }
    }

    fn parse_mapping(&mut self) -> ParseResult<RenameMapping> {
        self.skip_whitespace();
        if self.peek() != Some('{') {
            return Err("response is not a dictionary".to_string());
        }
        self.pos += 1;

        let mut mapping: RenameMapping = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                None => return Err("unterminated dictionary".to_string()),
                _ => {}
            }

            let key = self.parse_string("key")?;
            self.expect(':')?;
            self.skip_whitespace();
            let value = self.parse_string(&format!("value for '{}'", key))?;

            // Later duplicates win, as in a Python dict literal
            match mapping.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => mapping.push((key, value)),
            }

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(c) => {
                    return Err(format!(
                        "expected ',' or '}}' at position {}, found '{}'",
                        self.pos, c
                    ))
                }
                None => return Err("unterminated dictionary".to_string()),
            }
        }

        self.skip_whitespace();
        if self.pos < self.chars.len() {
            return Err(format!("unexpected trailing text at position {}", self.pos));
        }
        Ok(mapping)
    }

    fn parse_string(&mut self, what: &str) -> ParseResult<String> {
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return Err(format!("{} is not a string", what)),
            None => return Err(format!("missing {}", what)),
        };
        self.pos += 1;

        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| format!("unterminated string in {}", what))?;
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\n' => return Err(format!("line break inside {}", what)),
                '\\' => self.parse_escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> ParseResult<()> {
        let c = self
            .peek()
            .ok_or_else(|| "dangling escape".to_string())?;
        self.pos += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '/' => out.push('/'),
            'u' => {
                let hex: String = self.chars.iter().skip(self.pos).take(4).collect();
                if hex.len() != 4 {
                    return Err("truncated \\u escape".to_string());
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("invalid \\u escape '{}'", hex))?;
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("invalid code point \\u{}", hex))?;
                out.push(ch);
                self.pos += 4;
            }
            other => {
                // Unknown escapes are kept verbatim
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }
}
