//! Domain error types.

use crate::domain::trade::TradeRecord;

/// A parse error with the line/column of the offending token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    /// Format the error with the offending source line and a caret under the column.
    pub fn display_with_context(&self, source: &str) -> String {
        let text = source
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or_default();
        let caret = " ".repeat(self.column.saturating_sub(1)) + "^";
        format!(
            "{line:>4} | {text}\n     | {caret}\n{err}",
            line = self.line,
            text = text,
            caret = caret,
            err = self
        )
    }
}

/// Errors raised while executing a program. `line` is the source line of the
/// expression or statement that failed, or 0 when no position is known.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("line {line}: undefined variable '{name}'")]
    UndefinedVariable { name: String, line: usize },

    #[error("line {line}: '{name}' is not a function")]
    NotCallable { name: String, line: usize },

    #[error("line {line}: division by zero")]
    DivisionByZero { line: usize },

    #[error("line {line}: index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: f64, len: usize, line: usize },

    #[error("line {line}: {kind} value cannot be indexed")]
    NotIndexable { kind: &'static str, line: usize },

    #[error("line {line}: no field '{field}'")]
    UnknownField { field: String, line: usize },

    #[error("line {line}: type error: {details}")]
    TypeError { details: String, line: usize },

    #[error("line {line}: invalid argument to {function}: {reason}")]
    InvalidArgument {
        function: String,
        reason: String,
        line: usize,
    },

    #[error("line {line}: 'return' outside of a function")]
    ReturnOutsideFunction { line: usize },

    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("line {line}: call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize, line: usize },
}

impl RuntimeError {
    /// Fill in the line for errors raised without position information.
    /// An error that already knows its line keeps it.
    pub fn at_line(mut self, at: usize) -> Self {
        match &mut self {
            RuntimeError::UndefinedVariable { line, .. }
            | RuntimeError::NotCallable { line, .. }
            | RuntimeError::DivisionByZero { line }
            | RuntimeError::IndexOutOfBounds { line, .. }
            | RuntimeError::NotIndexable { line, .. }
            | RuntimeError::UnknownField { line, .. }
            | RuntimeError::TypeError { line, .. }
            | RuntimeError::InvalidArgument { line, .. }
            | RuntimeError::ReturnOutsideFunction { line }
            | RuntimeError::CallDepthExceeded { line, .. } => {
                if *line == 0 {
                    *line = at;
                }
            }
            RuntimeError::StepLimitExceeded { .. } => {}
        }
        self
    }
}

/// A failed run: the error plus every trade emitted before it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    pub error: RuntimeError,
    pub trades: Vec<TradeRecord>,
}

/// Top-level error type for vedascript.
#[derive(Debug, thiserror::Error)]
pub enum VedaError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RunError),

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config value [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&VedaError> for std::process::ExitCode {
    fn from(err: &VedaError) -> Self {
        let code: u8 = match err {
            VedaError::Io(_) => 1,
            VedaError::ConfigParse { .. }
            | VedaError::ConfigMissing { .. }
            | VedaError::ConfigInvalid { .. } => 2,
            VedaError::Data { .. } => 3,
            VedaError::Parse(_) => 4,
            VedaError::Runtime(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError {
            message: "expected ')'".into(),
            line: 2,
            column: 7,
        };
        assert_eq!(
            err.to_string(),
            "parse error at line 2, column 7: expected ')'"
        );
    }

    #[test]
    fn parse_error_context_points_at_column() {
        let err = ParseError {
            message: "unexpected token".into(),
            line: 2,
            column: 5,
        };
        let rendered = err.display_with_context("var a = 1\nvar = 2\n");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "   2 | var = 2");
        assert_eq!(lines[1], "     |     ^");
        assert!(lines[2].contains("unexpected token"));
    }

    #[test]
    fn context_past_end_of_source_is_blank() {
        let err = ParseError {
            message: "x".into(),
            line: 9,
            column: 1,
        };
        let rendered = err.display_with_context("a");
        assert!(rendered.starts_with("   9 | \n"));
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::UndefinedVariable {
            name: "y".into(),
            line: 3,
        };
        assert_eq!(err.to_string(), "line 3: undefined variable 'y'");
    }

    #[test]
    fn at_line_only_fills_unknown_positions() {
        let unknown = RuntimeError::UndefinedVariable {
            name: "x".into(),
            line: 0,
        };
        assert_eq!(unknown.at_line(4).to_string(), "line 4: undefined variable 'x'");

        let known = RuntimeError::DivisionByZero { line: 2 };
        assert_eq!(known.at_line(9), RuntimeError::DivisionByZero { line: 2 });

        let steps = RuntimeError::StepLimitExceeded { limit: 10 };
        assert_eq!(steps.clone().at_line(3), steps);
    }

    #[test]
    fn run_error_displays_inner_error() {
        let err = RunError {
            error: RuntimeError::DivisionByZero { line: 1 },
            trades: vec![],
        };
        assert_eq!(err.to_string(), "line 1: division by zero");
    }

    #[test]
    fn exit_codes() {
        use std::process::ExitCode;

        let parse = VedaError::from(ParseError {
            message: "x".into(),
            line: 1,
            column: 1,
        });
        assert_eq!(ExitCode::from(&parse), ExitCode::from(4));

        let data = VedaError::Data {
            reason: "empty".into(),
        };
        assert_eq!(ExitCode::from(&data), ExitCode::from(3));

        let config = VedaError::ConfigInvalid {
            section: "interpreter".into(),
            key: "max_steps".into(),
            reason: "negative".into(),
        };
        assert_eq!(ExitCode::from(&config), ExitCode::from(2));
    }
}
