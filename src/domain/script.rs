//! One-call entry points: source text in, trades or diagnostics out.

use crate::domain::ast::{Program, Stmt};
use crate::domain::builtins;
use crate::domain::error::{ParseError, VedaError};
use crate::domain::interpreter::{Interpreter, InterpreterConfig};
use crate::domain::lexer::tokenize;
use crate::domain::market_data::MarketData;
use crate::domain::parser;
use crate::domain::trade::{PositionSummary, TradeRecord};
use crate::domain::value::Value;
use std::sync::Arc;

#[derive(Debug)]
pub struct ScriptReport {
    pub trades: Vec<TradeRecord>,
    pub position: PositionSummary,
    /// User globals at the end of the run, sorted by name.
    pub globals: Vec<(String, Value)>,
}

pub fn compile(source: &str) -> Result<Program, ParseError> {
    parser::parse(&tokenize(source))
}

/// Every parse diagnostic in `source`; empty when it parses cleanly.
pub fn check(source: &str) -> Vec<ParseError> {
    match parser::parse_collecting(&tokenize(source)) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

/// Names declared by the script (variables, functions, parameters) that hide
/// a built-in of the same name, sorted and deduplicated. Shadowing is legal;
/// this only feeds warnings.
pub fn shadowed_builtins(program: &Program) -> Vec<String> {
    let mut declared = Vec::new();
    collect_declarations(&program.statements, &mut declared);
    let mut shadowed: Vec<String> = declared
        .into_iter()
        .filter(|name| builtins::names().any(|builtin| builtin == name.as_str()))
        .collect();
    shadowed.sort();
    shadowed.dedup();
    shadowed
}

fn collect_declarations(statements: &[Stmt], out: &mut Vec<String>) {
    for stmt in statements {
        collect_declaration(stmt, out);
    }
}

fn collect_declaration(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Function(decl) => {
            out.push(decl.name.clone());
            out.extend(decl.params.iter().cloned());
            collect_declarations(&decl.body, out);
        }
        Stmt::Var { name, .. } => out.push(name.clone()),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_declaration(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_declaration(else_branch, out);
            }
        }
        Stmt::While { body, .. } => collect_declaration(body, out),
        Stmt::For {
            initializer, body, ..
        } => {
            if let Some(init) = initializer {
                collect_declaration(init, out);
            }
            collect_declaration(body, out);
        }
        Stmt::Block(statements) => collect_declarations(statements, out),
        Stmt::Return { .. } | Stmt::Trade { .. } | Stmt::Expression(_) => {}
    }
}

pub fn run_script(
    source: &str,
    market: Arc<MarketData>,
    config: InterpreterConfig,
) -> Result<ScriptReport, VedaError> {
    let program = compile(source)?;
    let mut interpreter = Interpreter::with_config(config);
    let trades = interpreter.run(&program, market)?;
    Ok(ScriptReport {
        position: PositionSummary::from_trades(&trades),
        globals: interpreter.globals(),
        trades,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Arc<MarketData> {
        Arc::new(MarketData::new().with_series("close", vec![100.0, 102.0, 104.0]))
    }

    #[test]
    fn run_script_reports_trades_position_and_globals() {
        let source = "var target = 50\nif (close() > sma(3)) buy(\"up\", target)\nsell(20)";
        let report = run_script(source, market(), InterpreterConfig::default()).unwrap();

        assert_eq!(report.trades.len(), 2);
        assert!((report.position.quantity - 30.0).abs() < f64::EPSILON);
        assert_eq!(report.globals.len(), 1);
        assert_eq!(report.globals[0].0, "target");
    }

    #[test]
    fn parse_failure_is_parse_error() {
        let err = run_script("var = 1", market(), InterpreterConfig::default()).unwrap_err();
        assert!(matches!(err, VedaError::Parse(_)));
    }

    #[test]
    fn runtime_failure_keeps_trades() {
        let err = run_script("buy()\nvar x = 1 / 0", market(), InterpreterConfig::default()).unwrap_err();
        match err {
            VedaError::Runtime(run) => assert_eq!(run.trades.len(), 1),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn shadowed_builtins_found_at_any_depth() {
        let program = compile(
            "var abs = 1\nfunction helper(max) {\n  for (var len = 0; len < 2; len = len + 1) { var round = 2 }\n}\nvar abs = 3\nvar plain = 4",
        )
        .unwrap();
        assert_eq!(shadowed_builtins(&program), vec!["abs", "len", "max", "round"]);
    }

    #[test]
    fn no_shadowing_in_plain_script() {
        let program = compile("var fast = sma(5)\nfunction enter(size) { buy(size) }").unwrap();
        assert!(shadowed_builtins(&program).is_empty());
    }

    #[test]
    fn check_lists_every_error() {
        assert!(check("var a = 1\nbuy(\"x\")").is_empty());
        assert_eq!(check("var = 1\nvar b = )").len(), 2);
    }
}
