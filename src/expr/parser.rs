//! Key Expression Parser
//!
//! Compiles `#arg.path + 'literal' + 7` style expressions into segments.

use super::{PathStep, Segment};
use crate::error::{CacheError, Result};

/// Recursive-descent parser over the expression's characters.
pub(super) struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(super) fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    // == Entry Point ==
    /// Parses `term ('+' term)*` until end of input.
    pub(super) fn parse(mut self) -> Result<Vec<Segment>> {
        self.skip_whitespace();
        if self.at_end() {
            return Err(self.error("expression is empty"));
        }

        let mut segments = vec![self.term()?];
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('+') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    segments.push(self.term()?);
                }
                Some(c) => return Err(self.error(&format!("expected `+`, found `{}`", c))),
            }
        }
        Ok(segments)
    }

    fn term(&mut self) -> Result<Segment> {
        match self.peek() {
            Some('#') => {
                self.pos += 1;
                self.reference()
            }
            Some('\'') => {
                self.pos += 1;
                self.literal()
            }
            Some(c) if c.is_ascii_digit() || c == '-' => self.number(),
            Some(c) => Err(self.error(&format!("unexpected `{}`", c))),
            None => Err(self.error("expected a term after `+`")),
        }
    }

    // == Argument Reference ==
    fn reference(&mut self) -> Result<Segment> {
        let name = self.identifier()?;
        let mut path = Vec::new();

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    path.push(self.step()?);
                }
                Some('[') => {
                    self.pos += 1;
                    let digits = self.take_while(|c| c.is_ascii_digit());
                    if digits.is_empty() || self.peek() != Some(']') {
                        return Err(self.error("expected `[index]`"));
                    }
                    self.pos += 1;
                    path.push(PathStep::Index(self.index(&digits)?));
                }
                _ => break,
            }
        }

        Ok(Segment::Argument { name, path })
    }

    fn step(&mut self) -> Result<PathStep> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                Ok(PathStep::Index(self.index(&digits)?))
            }
            _ => Ok(PathStep::Field(self.identifier()?)),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(self.error("expected an identifier")),
        }
        Ok(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_'))
    }

    fn index(&self, digits: &str) -> Result<usize> {
        digits
            .parse()
            .map_err(|_| self.error(&format!("index `{}` is out of range", digits)))
    }

    // == Literals ==
    /// Quoted literal; `''` stands for a single quote.
    fn literal(&mut self) -> Result<Segment> {
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some('\'') => {
                    self.pos += 1;
                    if self.peek() == Some('\'') {
                        text.push('\'');
                        self.pos += 1;
                    } else {
                        return Ok(Segment::Literal(text));
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<Segment> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.pos += 1;
        }
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.error("expected digits"));
        }
        text.push_str(&digits);
        Ok(Segment::Literal(text))
    }

    // == Helpers ==
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn error(&self, message: &str) -> CacheError {
        CacheError::Expression {
            expression: self.source.to_string(),
            message: format!("{} at position {}", message, self.pos),
        }
    }
}
