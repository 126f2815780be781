//! Token types produced by the lexer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    String,
    Identifier,

    If,
    Else,
    For,
    While,
    Function,
    Return,
    Var,

    Buy,
    Sell,
    Open,
    High,
    Low,
    Close,
    Volume,
    Sma,
    Ema,
    Rsi,
    Macd,

    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    EqualEqual,
    BangEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,

    Newline,
    Eof,
}

impl TokenKind {
    /// Keyword lookup. Callers pass the lowercased word.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "var" => TokenKind::Var,
            "buy" => TokenKind::Buy,
            "sell" => TokenKind::Sell,
            "open" => TokenKind::Open,
            "high" => TokenKind::High,
            "low" => TokenKind::Low,
            "close" => TokenKind::Close,
            "volume" => TokenKind::Volume,
            "sma" => TokenKind::Sma,
            "ema" => TokenKind::Ema,
            "rsi" => TokenKind::Rsi,
            "macd" => TokenKind::Macd,
            _ => return None,
        };
        Some(kind)
    }

    /// Keywords that name a built-in and may appear where an expression is expected.
    pub fn is_builtin_name(self) -> bool {
        matches!(
            self,
            TokenKind::Buy
                | TokenKind::Sell
                | TokenKind::Open
                | TokenKind::High
                | TokenKind::Low
                | TokenKind::Close
                | TokenKind::Volume
                | TokenKind::Sma
                | TokenKind::Ema
                | TokenKind::Rsi
                | TokenKind::Macd
        )
    }

    /// Keywords at which the parser resumes after an error.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Function
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Return
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::If => "IF",
            TokenKind::Else => "ELSE",
            TokenKind::For => "FOR",
            TokenKind::While => "WHILE",
            TokenKind::Function => "FUNCTION",
            TokenKind::Return => "RETURN",
            TokenKind::Var => "VAR",
            TokenKind::Buy => "BUY",
            TokenKind::Sell => "SELL",
            TokenKind::Open => "OPEN",
            TokenKind::High => "HIGH",
            TokenKind::Low => "LOW",
            TokenKind::Close => "CLOSE",
            TokenKind::Volume => "VOLUME",
            TokenKind::Sma => "SMA",
            TokenKind::Ema => "EMA",
            TokenKind::Rsi => "RSI",
            TokenKind::Macd => "MACD",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Slash => "SLASH",
            TokenKind::Assign => "ASSIGN",
            TokenKind::EqualEqual => "EQUAL_EQUAL",
            TokenKind::BangEqual => "BANG_EQUAL",
            TokenKind::Less => "LESS",
            TokenKind::Greater => "GREATER",
            TokenKind::LessEqual => "LESS_EQUAL",
            TokenKind::GreaterEqual => "GREATER_EQUAL",
            TokenKind::LeftParen => "LEFT_PAREN",
            TokenKind::RightParen => "RIGHT_PAREN",
            TokenKind::LeftBrace => "LEFT_BRACE",
            TokenKind::RightBrace => "RIGHT_BRACE",
            TokenKind::LeftBracket => "LEFT_BRACKET",
            TokenKind::RightBracket => "RIGHT_BRACKET",
            TokenKind::Comma => "COMMA",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Eof => "EOF",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
        }
    }

    /// Human-readable description used in parse error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::String => format!("\"{}\"", self.lexeme),
            _ => format!("'{}'", self.lexeme),
        }
    }
}
