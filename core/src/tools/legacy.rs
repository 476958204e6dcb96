//! Reader for the quasi-literal mapping format stock snapshots are rendered
//! in, e.g. `{'Ticker Symbol': 'AAPL', 'Current Stock Price': np.float64(150.0)}`.
//!
//! Best effort: anything outside the small grammar below is a parse error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

static NUMERIC_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"np\.float64\(([^)]+)\)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl LegacyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for LegacyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

pub type LegacyMap = HashMap<String, LegacyValue>;

#[derive(Debug, Error, PartialEq)]
pub enum LegacyParseError {
    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected trailing input at offset {0}")]
    TrailingInput(usize),
}

/// Rewrites tokens the grammar does not know: numeric wrappers become bare
/// numbers and the quoted `'N/A'` marker becomes `None`.
pub fn normalize(text: &str) -> String {
    let unwrapped = NUMERIC_WRAPPER.replace_all(text, "$1");
    unwrapped.replace("'N/A'", "None")
}

pub fn parse_mapping(text: &str) -> Result<LegacyMap, LegacyParseError> {
    let normalized = normalize(text.trim());
    let mut parser = Parser::new(&normalized);
    let map = parser.mapping()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(LegacyParseError::TrailingInput(parser.pos));
    }
    Ok(map)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
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
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, ch: char, expected: &'static str) -> Result<(), LegacyParseError> {
        self.skip_whitespace();
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(LegacyParseError::Expected {
                expected,
                offset: self.pos,
            })
        }
    }

    fn mapping(&mut self) -> Result<LegacyMap, LegacyParseError> {
        self.expect('{', "'{'")?;
        let mut map = LegacyMap::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(map);
            }

            let key = self.string()?;
            self.expect(':', "':'")?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(map);
                }
                _ => {
                    return Err(LegacyParseError::Expected {
                        expected: "',' or '}'",
                        offset: self.pos,
                    });
                }
            }
        }
    }

    fn string(&mut self) -> Result<String, LegacyParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => {
                return Err(LegacyParseError::Expected {
                    expected: "quoted string",
                    offset: start,
                });
            }
        };
        self.pos += 1;

        let mut out = String::new();
        while let Some(ch) = self.peek() {
            self.pos += 1;
            match ch {
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or(LegacyParseError::UnterminatedString(start))?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }

        Err(LegacyParseError::UnterminatedString(start))
    }

    fn value(&mut self) -> Result<LegacyValue, LegacyParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('\'' | '"') => self.string().map(LegacyValue::Str),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            _ => Err(LegacyParseError::Expected {
                expected: "value",
                offset: self.pos,
            }),
        }
    }

    fn keyword(&mut self) -> Result<LegacyValue, LegacyParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" => Ok(LegacyValue::Null),
            "True" => Ok(LegacyValue::Bool(true)),
            "False" => Ok(LegacyValue::Bool(false)),
            _ => Err(LegacyParseError::Expected {
                expected: "value",
                offset: start,
            }),
        }
    }

    fn number(&mut self) -> Result<LegacyValue, LegacyParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let cleaned = raw.replace('_', "");
        // Spelled-out specials are not literals; overflow like 1e400 still is.
        let lower = cleaned.to_ascii_lowercase();
        if lower.contains("inf") || lower.contains("nan") {
            return Err(LegacyParseError::InvalidNumber(raw));
        }
        cleaned
            .parse::<f64>()
            .map(LegacyValue::Number)
            .map_err(|_| LegacyParseError::InvalidNumber(raw))
    }
}
