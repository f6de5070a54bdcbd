//! SQL Lexer (Tokenizer)
//!
//! This module converts statement text into a stream of positioned tokens.

use super::token::{Located, Token};
use crate::error::{Error, Result};

/// SQL Lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input. The last token is always `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Located>> {
        let mut tokens = Vec::new();

        loop {
            let located = self.next_token()?;
            let done = located.token == Token::Eof;
            tokens.push(located);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Located> {
        self.skip_whitespace_and_comments();

        let position = self.position;
        let token = self.scan()?;
        let text = self.input[position..self.position].iter().collect();
        Ok(Located {
            token,
            position,
            text,
        })
    }

    fn scan(&mut self) -> Result<Token> {
        let ch = match self.current_char() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        let single = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '*' => Some(Token::Asterisk),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '\'' => self.read_string(),
            '"' => self.read_quoted_identifier(),
            '-' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            c => Err(Error::UnexpectedCharacter(c, self.position)),
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    /// Skip whitespace and SQL comments (-- and /* */)
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.current_char().is_some_and(char::is_whitespace) {
                self.advance();
            }

            match (self.current_char(), self.peek_char()) {
                (Some('-'), Some('-')) => {
                    while self.current_char().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.advance();
                    self.advance();
                    // An unterminated block comment runs to the end of input
                    while let Some(c) = self.current_char() {
                        if c == '*' && self.peek_char() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    /// Read a string literal (single-quoted, '' escapes a quote)
    fn read_string(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();

        while let Some(ch) = self.current_char() {
            if ch == '\'' {
                if self.peek_char() == Some('\'') {
                    value.push('\'');
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    return Ok(Token::StringLiteral(value));
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(Error::UnterminatedString(start_pos))
    }

    /// Read a quoted identifier (double-quoted)
    fn read_quoted_identifier(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();

        while let Some(ch) = self.current_char() {
            if ch == '"' {
                if self.peek_char() == Some('"') {
                    value.push('"');
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    return Ok(Token::Identifier(value));
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(Error::UnterminatedString(start_pos))
    }

    /// Read a number with optional sign, fraction and exponent. The text is
    /// kept as written; the target column type decides how to read it.
    fn read_number(&mut self) -> Result<Token> {
        let start_pos = self.position;
        let mut value = String::new();

        if self.current_char() == Some('-') {
            value.push('-');
            self.advance();
        }

        self.read_digits(&mut value);

        if self.current_char() == Some('.') && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            value.push('.');
            self.advance();
            self.read_digits(&mut value);
        }

        if let Some(e @ ('e' | 'E')) = self.current_char() {
            value.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.current_char() {
                value.push(sign);
                self.advance();
            }
            if !self.read_digits(&mut value) {
                return Err(Error::InvalidNumber(start_pos));
            }
        }

        Ok(Token::Number(value))
    }

    /// Append a run of ASCII digits. Returns false if there were none.
    fn read_digits(&mut self, value: &mut String) -> bool {
        let start = value.len();
        while let Some(ch) = self.current_char().filter(char::is_ascii_digit) {
            value.push(ch);
            self.advance();
        }
        value.len() > start
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut value = String::new();

        while let Some(ch) = self
            .current_char()
            .filter(|c| c.is_alphanumeric() || *c == '_')
        {
            value.push(ch);
            self.advance();
        }

        Token::from_keyword(&value).unwrap_or(Token::Identifier(value))
    }
}
