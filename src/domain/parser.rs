//! VedaScript parser.
//!
//! Recursive descent over the token stream with one function per precedence
//! level, lowest first: assignment, `or`, `and`, equality, relational,
//! additive, multiplicative, unary (`-`, `not`), call/index postfix, primary.
//! `and`, `or`, `not`, `true` and `false` are plain identifiers to the lexer
//! and are recognized here by spelling.

use crate::domain::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, Program, Stmt, TradeAction, UnaryOp,
};
use crate::domain::error::ParseError;
use crate::domain::lexer;
use crate::domain::token::{Token, TokenKind};
use std::rc::Rc;

/// Deepest nesting of statements and sub-expressions accepted. Parsing is
/// recursive, so anything deeper is rejected with an error rather than
/// exhausting the stack.
pub const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: &[Token]) -> Self {
        let mut tokens = tokens.to_vec();
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.column));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_word(&self, word: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Identifier && token.lexeme.eq_ignore_ascii_case(word)
    }

    fn match_kind(&mut self, kinds: &[TokenKind]) -> bool {
        if kinds.contains(&self.peek().kind) && !self.is_at_end() {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(token: &Token, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        let found = self.peek();
        Err(Self::error_at(
            found,
            format!("{}, found {}", message, found.describe()),
        ))
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        what: &str,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(Self::error_at(
                self.peek(),
                format!("{} nested too deeply", what),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) {
        while self.match_kind(&[TokenKind::Newline]) {}
    }

    fn skip_terminators(&mut self) {
        while self.match_kind(&[TokenKind::Newline, TokenKind::Semicolon]) {}
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::RightBrace
                | TokenKind::Else
                | TokenKind::Eof
        )
    }

    /// Newline or `;` ends a statement; before `}`, `else` or end of input neither is needed.
    fn end_statement(&mut self) -> Result<(), ParseError> {
        if !self.at_statement_end() {
            let found = self.peek();
            return Err(Self::error_at(
                found,
                format!(
                    "expected newline or ';' after statement, found {}",
                    found.describe()
                ),
            ));
        }
        self.skip_terminators();
        Ok(())
    }

    /// Discard tokens until just after a `;` or just before a statement keyword.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if self.peek().kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    // ---- statements ----

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_terminators();
            if self.is_at_end() {
                break;
            }
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    fn program_collecting(&mut self) -> Result<Program, Vec<ParseError>> {
        let mut statements = Vec::new();
        let mut errors = Vec::new();
        loop {
            self.skip_terminators();
            if self.is_at_end() {
                break;
            }
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }
        if errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(errors)
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        self.nested("statement", Self::statement_kind)
    }

    fn statement_kind(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().kind {
            TokenKind::Function => {
                self.advance();
                self.function_declaration()
            }
            TokenKind::Var => {
                self.advance();
                let stmt = self.var_declaration()?;
                self.end_statement()?;
                Ok(stmt)
            }
            TokenKind::If => {
                self.advance();
                self.if_statement()
            }
            TokenKind::While => {
                self.advance();
                self.while_statement()
            }
            TokenKind::For => {
                self.advance();
                self.for_statement()
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement()
            }
            TokenKind::Buy | TokenKind::Sell => {
                self.advance();
                self.trade_statement()
            }
            TokenKind::LeftBrace => {
                self.advance();
                Ok(Stmt::Block(self.block_body()?))
            }
            _ => self.expression_statement(),
        }
    }

    /// Statements up to and including the closing `}`.
    fn block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_terminators();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            statements.push(self.statement()?);
        }
        self.consume(TokenKind::RightBrace, "expected '}' after block")?;
        Ok(statements)
    }

    /// Body of `if`/`while`/`for`; may start on the next line.
    fn body_statement(&mut self) -> Result<Box<Stmt>, ParseError> {
        self.skip_newlines();
        Ok(Box::new(self.statement()?))
    }

    fn function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self
            .consume(TokenKind::Identifier, "expected function name")?
            .lexeme;
        self.consume(TokenKind::LeftParen, "expected '(' after function name")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let param = self.consume(TokenKind::Identifier, "expected parameter name")?;
                params.push(param.lexeme);
                if !self.match_kind(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
        self.skip_newlines();
        self.consume(TokenKind::LeftBrace, "expected '{' before function body")?;
        let body = self.block_body()?;

        Ok(Stmt::Function(Rc::new(FunctionDecl { name, params, body })))
    }

    /// `name [= expr]` after the `var` keyword, without the terminator.
    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self
            .consume(TokenKind::Identifier, "expected variable name")?
            .lexeme;
        let initializer = if self.match_kind(&[TokenKind::Assign]) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Stmt::Var { name, initializer })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after if condition")?;
        let then_branch = self.body_statement()?;

        let checkpoint = self.current;
        self.skip_newlines();
        let else_branch = if self.match_kind(&[TokenKind::Else]) {
            Some(self.body_statement()?)
        } else {
            self.current = checkpoint;
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after while condition")?;
        let body = self.body_statement()?;
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'")?;

        let initializer = if self.match_kind(&[TokenKind::Semicolon]) {
            None
        } else {
            let init = if self.match_kind(&[TokenKind::Var]) {
                self.var_declaration()?
            } else {
                Stmt::Expression(self.expression()?)
            };
            self.consume(TokenKind::Semicolon, "expected ';' after loop initializer")?;
            Some(Box::new(init))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected ';' after loop condition")?;

        let increment = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenKind::RightParen, "expected ')' after for clauses")?;

        let body = self.body_statement()?;
        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.previous().line;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_statement()?;
        Ok(Stmt::Return { value, line })
    }

    fn trade_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let action = match keyword.kind {
            TokenKind::Sell => TradeAction::Sell,
            _ => TradeAction::Buy,
        };

        let mut args = Vec::new();
        if self.match_kind(&[TokenKind::LeftParen]) {
            if !self.check(TokenKind::RightParen) {
                args.push(self.expression()?);
                while self.match_kind(&[TokenKind::Comma]) {
                    args.push(self.expression()?);
                }
            }
            self.consume(TokenKind::RightParen, "expected ')' after trade arguments")?;
        }

        Self::validate_trade_args(&keyword, &args)?;
        self.end_statement()?;

        Ok(Stmt::Trade {
            action,
            args,
            line: keyword.line,
        })
    }

    /// At most one message and one quantity. Only literals can be checked here;
    /// other expressions are classified when the statement runs.
    fn validate_trade_args(keyword: &Token, args: &[Expr]) -> Result<(), ParseError> {
        let invalid = |reason: &str| {
            Self::error_at(
                keyword,
                format!("invalid trade-statement arguments: {}", reason),
            )
        };

        if args.len() > 2 {
            return Err(invalid("expected at most a message and a quantity"));
        }

        let mut messages = 0;
        let mut quantities = 0;
        for arg in args {
            match arg.kind {
                ExprKind::String(_) => messages += 1,
                ExprKind::Number(_) => quantities += 1,
                ExprKind::Bool(_) => return Err(invalid("boolean is neither a message nor a quantity")),
                _ => {}
            }
        }
        if messages > 1 {
            return Err(invalid("more than one message"));
        }
        if quantities > 1 {
            return Err(invalid("more than one quantity"));
        }
        Ok(())
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expression(expr))
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested("expression", Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.logical_or()?;

        if self.match_kind(&[TokenKind::Assign]) {
            let equals = self.previous().clone();
            let value = self.nested("expression", Self::assignment)?;
            return match target.kind {
                ExprKind::Identifier(name) => Ok(Expr::new(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    target.line,
                    target.column,
                )),
                _ => Err(Self::error_at(&equals, "invalid assignment target")),
            };
        }

        Ok(target)
    }

    fn binary(left: Expr, op: BinaryOp, right: Expr, at: &Token) -> Expr {
        Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            at.line,
            at.column,
        )
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logical_and()?;
        while self.check_word("or") {
            let op = self.advance().clone();
            let right = self.logical_and()?;
            expr = Self::binary(expr, BinaryOp::Or, right, &op);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while self.check_word("and") {
            let op = self.advance().clone();
            let right = self.equality()?;
            expr = Self::binary(expr, BinaryOp::And, right, &op);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        while self.match_kind(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let op = self.previous().clone();
            let bin_op = match op.kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                _ => BinaryOp::NotEqual,
            };
            let right = self.comparison()?;
            expr = Self::binary(expr, bin_op, right, &op);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;
        while self.match_kind(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = self.previous().clone();
            let bin_op = match op.kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                _ => BinaryOp::GreaterEqual,
            };
            let right = self.term()?;
            expr = Self::binary(expr, bin_op, right, &op);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;
        while self.match_kind(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = self.previous().clone();
            let bin_op = match op.kind {
                TokenKind::Plus => BinaryOp::Add,
                _ => BinaryOp::Subtract,
            };
            let right = self.factor()?;
            expr = Self::binary(expr, bin_op, right, &op);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while self.match_kind(&[TokenKind::Star, TokenKind::Slash]) {
            let op = self.previous().clone();
            let bin_op = match op.kind {
                TokenKind::Star => BinaryOp::Multiply,
                _ => BinaryOp::Divide,
            };
            let right = self.unary()?;
            expr = Self::binary(expr, bin_op, right, &op);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.check(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.check_word("not") {
            UnaryOp::Not
        } else {
            return self.call();
        };

        let token = self.advance().clone();
        let operand = self.nested("expression", Self::unary)?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            token.line,
            token.column,
        ))
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_kind(&[TokenKind::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(&[TokenKind::LeftBracket]) {
                let index = self.expression()?;
                self.consume(TokenKind::RightBracket, "expected ']' after index")?;
                let (line, column) = (expr.line, expr.column);
                expr = Expr::new(
                    ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                    column,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let paren = self.previous().clone();

        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            args.push(self.expression()?);
            while self.match_kind(&[TokenKind::Comma]) {
                args.push(self.expression()?);
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after arguments")?;

        match callee.kind {
            ExprKind::Identifier(name) => Ok(Expr::new(
                ExprKind::Call { callee: name, args },
                callee.line,
                callee.column,
            )),
            _ => Err(Self::error_at(&paren, "invalid function call")),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    Self::error_at(&token, format!("invalid number: {}", token.lexeme))
                })?;
                ExprKind::Number(value)
            }
            TokenKind::String => ExprKind::String(token.lexeme.clone()),
            TokenKind::Identifier if token.lexeme.eq_ignore_ascii_case("true") => {
                ExprKind::Bool(true)
            }
            TokenKind::Identifier if token.lexeme.eq_ignore_ascii_case("false") => {
                ExprKind::Bool(false)
            }
            TokenKind::Identifier => ExprKind::Identifier(token.lexeme.clone()),
            kind if kind.is_builtin_name() => ExprKind::Identifier(token.lexeme.to_lowercase()),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "expected ')' after expression")?;
                return Ok(expr);
            }
            _ => {
                return Err(Self::error_at(
                    &token,
                    format!("unexpected token {}", token.describe()),
                ));
            }
        };
        self.advance();
        Ok(Expr::new(kind, token.line, token.column))
    }
}

/// Parse a token stream, failing on the first grammar violation.
pub fn parse(tokens: &[Token]) -> Result<Program, ParseError> {
    Parser::new(tokens).program()
}

/// Parse a token stream, recovering at statement boundaries so that every
/// diagnostic is reported. No partial program is returned on error.
pub fn parse_collecting(tokens: &[Token]) -> Result<Program, Vec<ParseError>> {
    Parser::new(tokens).program_collecting()
}

/// Tokenize and parse in one step.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    parse(&lexer::tokenize(source))
}
