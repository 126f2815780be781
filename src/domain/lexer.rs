//! Lexer for VedaScript source text.
//!
//! Tokenizing is total: unrecognized characters are skipped and an
//! unterminated string runs to the end of input. Both cases are logged at
//! `debug` level and otherwise ignored, so a script that relies on the
//! leniency keeps working. The token stream always ends with one `Eof`.

use crate::domain::token::{Token, TokenKind};
use tracing::debug;

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.remaining().chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) {
        self.tokens.push(Token::new(kind, lexeme, line, column));
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        let mut has_dot = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let lexeme = &self.input[start..self.pos];
        self.push(TokenKind::Number, lexeme, line, column);
    }

    fn read_string(&mut self, quote: char) {
        let (line, column) = (self.line, self.column);
        self.advance();

        let mut value = String::new();
        let mut terminated = false;
        while let Some(ch) = self.advance() {
            if ch == quote {
                terminated = true;
                break;
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            match self.advance() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some(other) => value.push(other),
                None => break,
            }
        }

        if !terminated {
            debug!(line, column, "unterminated string literal runs to end of input");
        }
        self.push(TokenKind::String, value, line, column);
    }

    fn read_identifier(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;

        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let word = &self.input[start..self.pos];
        let kind = TokenKind::keyword(&word.to_lowercase()).unwrap_or(TokenKind::Identifier);
        self.push(kind, word, line, column);
    }

    fn read_operator(&mut self, ch: char) -> bool {
        let (line, column) = (self.line, self.column);

        let two_char = match (ch, self.peek_second()) {
            ('=', Some('=')) => Some((TokenKind::EqualEqual, "==")),
            ('!', Some('=')) => Some((TokenKind::BangEqual, "!=")),
            ('<', Some('=')) => Some((TokenKind::LessEqual, "<=")),
            ('>', Some('=')) => Some((TokenKind::GreaterEqual, ">=")),
            _ => None,
        };
        if let Some((kind, lexeme)) = two_char {
            self.advance();
            self.advance();
            self.push(kind, lexeme, line, column);
            return true;
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            _ => return false,
        };
        self.advance();
        self.push(kind, ch.to_string(), line, column);
        true
    }

    fn tokenize(mut self) -> Vec<Token> {
        loop {
            self.skip_whitespace_and_comments();

            let Some(ch) = self.peek() else {
                break;
            };

            if ch == '\n' {
                let (line, column) = (self.line, self.column);
                self.advance();
                self.push(TokenKind::Newline, "\n", line, column);
            } else if ch.is_ascii_digit() {
                self.read_number();
            } else if ch == '"' || ch == '\'' {
                self.read_string(ch);
            } else if ch.is_alphabetic() || ch == '_' {
                self.read_identifier();
            } else if !self.read_operator(ch) {
                debug!(
                    line = self.line,
                    column = self.column,
                    "skipping unrecognized character {:?}",
                    ch
                );
                self.advance();
            }
        }

        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, "", line, column);
        self.tokens
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}
