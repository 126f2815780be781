//! Tree-walking interpreter.
//!
//! One interpreter owns one global scope (built-ins plus user globals) and
//! one trade log. `run` executes a program's top-level statements once
//! against a market-data snapshot; the trade log is reset at the start of
//! every run while globals carry over.

use crate::domain::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, TradeAction, UnaryOp};
use crate::domain::builtins::{self, CallContext};
use crate::domain::environment::{EnvRef, Environment};
use crate::domain::error::{RunError, RuntimeError};
use crate::domain::market_data::MarketData;
use crate::domain::trade::{TradeLog, TradeRecord};
use crate::domain::value::{Function, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, trace};

/// Script-level call depth allowed by default. Each level costs a handful of
/// native frames, and 64 levels stay well inside a 2 MB thread stack in
/// unoptimized builds.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Statements and loop iterations allowed per run; `None` is unlimited.
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Control-flow outcome of executing a statement.
enum Flow {
    Normal,
    Return { value: Value, line: usize },
}

/// What happened to a scope holding functions that close over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeRelease {
    NoClosures,
    Released,
    Retained,
}

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    market: Arc<MarketData>,
    trades: TradeLog,
    config: InterpreterConfig,
    steps: u64,
    depth: usize,
    /// Exited scopes kept alive by a function that escaped them.
    retained: Vec<Weak<RefCell<Environment>>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let globals = Environment::new_global();
        builtins::register(&mut globals.borrow_mut());
        Self {
            environment: Rc::clone(&globals),
            globals,
            market: Arc::new(MarketData::default()),
            trades: TradeLog::new(),
            config,
            steps: 0,
            depth: 0,
            retained: Vec::new(),
        }
    }

    /// Execute `program` against `market`. On failure the returned error
    /// still carries every trade emitted before it.
    pub fn run(
        &mut self,
        program: &Program,
        market: Arc<MarketData>,
    ) -> Result<Vec<TradeRecord>, RunError> {
        self.market = market;
        self.trades.clear();
        self.steps = 0;
        self.depth = 0;
        self.environment = Rc::clone(&self.globals);
        self.sweep_retained();

        debug!(
            statements = program.statements.len(),
            bars = self.market.len(),
            "run started"
        );

        for stmt in &program.statements {
            let error = match self.execute(stmt) {
                Ok(Flow::Normal) => continue,
                Ok(Flow::Return { line, .. }) => RuntimeError::ReturnOutsideFunction { line },
                Err(err) => err,
            };
            self.environment = Rc::clone(&self.globals);
            debug!(%error, trades = self.trades.len(), "run failed");
            return Err(RunError {
                error,
                trades: self.trades.records().to_vec(),
            });
        }

        debug!(trades = self.trades.len(), steps = self.steps, "run finished");
        Ok(self.trades.records().to_vec())
    }

    /// Trades emitted by the most recent run.
    pub fn trades(&self) -> &[TradeRecord] {
        self.trades.records()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).ok()
    }

    /// User-defined globals sorted by name. Built-ins are left out unless a
    /// script rebound the name to something else.
    pub fn globals(&self) -> Vec<(String, Value)> {
        self.globals
            .borrow()
            .bindings()
            .filter(|(_, value)| !matches!(value, Value::Builtin(_)))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Drop retained scopes whose escaped functions are gone.
    fn sweep_retained(&mut self) {
        self.retained.retain(|weak| match weak.upgrade() {
            Some(scope) => release_scope(&scope) == ScopeRelease::Retained,
            None => false,
        });
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        match self.config.max_steps {
            Some(limit) if self.steps > limit => Err(RuntimeError::StepLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        self.tick()?;
        match stmt {
            Stmt::Function(decl) => {
                let function = Function {
                    decl: Rc::clone(decl),
                    closure: Rc::clone(&self.environment),
                };
                self.environment
                    .borrow_mut()
                    .define(decl.name.clone(), Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Stmt::Var { name, initializer } => self.execute_var(name, initializer.as_ref()),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.execute_if(condition, then_branch, else_branch.as_deref()),
            Stmt::While { condition, body } => self.execute_while(condition, body),
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                let scope = Environment::with_parent(&self.environment);
                let previous = std::mem::replace(&mut self.environment, scope);
                let result = self.execute_for(
                    initializer.as_deref(),
                    condition.as_ref(),
                    increment.as_ref(),
                    body,
                );
                self.leave_scope(previous);
                result
            }
            Stmt::Return { value, line } => self.execute_return(value.as_ref(), *line),
            Stmt::Trade { action, args, line } => {
                self.execute_trade(*action, args, *line)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(statements) => {
                let scope = Environment::with_parent(&self.environment);
                self.execute_block(statements, scope)
            }
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn execute_var(&mut self, name: &str, initializer: Option<&Expr>) -> Result<Flow, RuntimeError> {
        let value = match initializer {
            Some(expr) => self.evaluate(expr)?,
            None => Value::Null,
        };
        self.environment.borrow_mut().define(name.to_string(), value);
        Ok(Flow::Normal)
    }

    fn execute_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Flow, RuntimeError> {
        if self.evaluate(condition)?.is_truthy() {
            self.execute(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute(else_branch)
        } else {
            Ok(Flow::Normal)
        }
    }

    fn execute_while(&mut self, condition: &Expr, body: &Stmt) -> Result<Flow, RuntimeError> {
        while self.evaluate(condition)?.is_truthy() {
            self.tick()?;
            if let flow @ Flow::Return { .. } = self.execute(body)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_return(&mut self, value: Option<&Expr>, line: usize) -> Result<Flow, RuntimeError> {
        let value = match value {
            Some(expr) => self.evaluate(expr)?,
            None => Value::Null,
        };
        Ok(Flow::Return { value, line })
    }

    fn execute_statements(&mut self, statements: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in statements {
            if let flow @ Flow::Return { .. } = self.execute(stmt)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Run `statements` in `scope`, restoring the current scope afterwards
    /// whether or not they succeed.
    fn execute_block(&mut self, statements: &[Stmt], scope: EnvRef) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.environment, scope);
        let result = self.execute_statements(statements);
        self.leave_scope(previous);
        result
    }

    /// Make `previous` current again and break the cycles of the scope being
    /// left. Runs while the block's result is still alive, so a returned
    /// function counts as an escape.
    fn leave_scope(&mut self, previous: EnvRef) {
        let scope = std::mem::replace(&mut self.environment, previous);
        if release_scope(&scope) == ScopeRelease::Retained {
            self.retained.push(Rc::downgrade(&scope));
        }
    }

    fn execute_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow, RuntimeError> {
        if let Some(init) = initializer {
            self.execute(init)?;
        }
        loop {
            let keep_going = match condition {
                Some(condition) => self.evaluate(condition)?.is_truthy(),
                None => true,
            };
            if !keep_going {
                break;
            }
            self.tick()?;
            if let flow @ Flow::Return { .. } = self.execute(body)? {
                return Ok(flow);
            }
            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_trade(&mut self, action: TradeAction, args: &[Expr], line: usize) -> Result<(), RuntimeError> {
        let values = self.evaluate_args(args)?;
        let (message, quantity) = builtins::classify_trade_args(&values).map_err(|reason| {
            RuntimeError::TypeError {
                details: format!("invalid {} arguments: {}", action, reason),
                line,
            }
        })?;
        let mut ctx = CallContext {
            market: &self.market,
            trades: &mut self.trades,
        };
        ctx.emit_trade(action, message, quantity);
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Identifier(name) => self
                .environment
                .borrow()
                .get(name)
                .map_err(|err| err.at_line(expr.line)),
            ExprKind::Assign { name, value } => self.evaluate_assign(name, value, expr.line),
            ExprKind::Binary { left, op, right } => self.evaluate_binary(left, *op, right, expr.line),
            ExprKind::Unary { op, operand } => self.evaluate_unary(*op, operand, expr.line),
            ExprKind::Call { callee, args } => self.call(callee, args, expr.line),
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_value(target, index, expr.line)
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.evaluate(arg)).collect()
    }

    fn evaluate_assign(&mut self, name: &str, value: &Expr, line: usize) -> Result<Value, RuntimeError> {
        let value = self.evaluate(value)?;
        self.environment
            .borrow_mut()
            .set(name, value.clone())
            .map_err(|err| err.at_line(line))?;
        Ok(value)
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinaryOp::And => {
                let truthy = self.evaluate(left)?.is_truthy() && self.evaluate(right)?.is_truthy();
                Ok(Value::Bool(truthy))
            }
            BinaryOp::Or => {
                let truthy = self.evaluate(left)?.is_truthy() || self.evaluate(right)?.is_truthy();
                Ok(Value::Bool(truthy))
            }
            _ => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(op, left, right, line)
            }
        }
    }

    fn evaluate_unary(&mut self, op: UnaryOp, operand: &Expr, line: usize) -> Result<Value, RuntimeError> {
        let value = self.evaluate(operand)?;
        match (op, value) {
            (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
            (UnaryOp::Negate, other) => Err(RuntimeError::TypeError {
                details: format!("cannot negate {}", other.type_name()),
                line,
            }),
            (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], line: usize) -> Result<Value, RuntimeError> {
        let callee = self
            .environment
            .borrow()
            .get(name)
            .map_err(|err| err.at_line(line))?;
        let values = self.evaluate_args(args)?;

        match callee {
            Value::Function(function) => self.call_function(&function, values, line),
            Value::Builtin(builtin) => {
                let mut ctx = CallContext {
                    market: &self.market,
                    trades: &mut self.trades,
                };
                (builtin.func)(&mut ctx, &values).map_err(|reason| RuntimeError::InvalidArgument {
                    function: builtin.name.to_string(),
                    reason,
                    line,
                })
            }
            _ => Err(RuntimeError::NotCallable {
                name: name.to_string(),
                line,
            }),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
                line,
            });
        }
        trace!(function = %function.decl.name, args = args.len(), depth = self.depth, "call");

        let scope = Environment::with_parent(&function.closure);
        {
            let mut scope = scope.borrow_mut();
            let mut args = args.into_iter();
            for param in &function.decl.params {
                scope.define(param.clone(), args.next().unwrap_or_default());
            }
        }

        self.depth += 1;
        let result = self.execute_block(&function.decl.body, scope);
        self.depth -= 1;

        match result? {
            Flow::Return { value, .. } => Ok(value),
            Flow::Normal => Ok(Value::Null),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // Functions capture the scope that holds them.
        for scope in self.retained.drain(..).filter_map(|weak| weak.upgrade()) {
            scope.borrow_mut().clear();
        }
        self.globals.borrow_mut().clear();
    }
}

/// Break the cycle between a scope and the functions declared in it once
/// nothing outside the scope can reach them. A scope is unreachable when its
/// only strong references are `scope` itself and its own closures, and no
/// copy of those closures lives outside the scope.
fn release_scope(scope: &EnvRef) -> ScopeRelease {
    let unreachable = {
        let env = scope.borrow();
        // (function, bindings holding it)
        let mut closures: Vec<(&Rc<Function>, usize)> = Vec::new();
        let own = env.bindings().filter_map(|(_, value)| match value {
            Value::Function(function) if Rc::ptr_eq(&function.closure, scope) => Some(function),
            _ => None,
        });
        for function in own {
            match closures.iter_mut().find(|(seen, _)| Rc::ptr_eq(seen, function)) {
                Some((_, count)) => *count += 1,
                None => closures.push((function, 1)),
            }
        }
        if closures.is_empty() {
            return ScopeRelease::NoClosures;
        }
        let escaped = closures
            .iter()
            .any(|(function, count)| Rc::strong_count(function) != *count);
        !escaped && Rc::strong_count(scope) == 1 + closures.len()
    };

    if unreachable {
        scope.borrow_mut().clear();
        ScopeRelease::Released
    } else {
        ScopeRelease::Retained
    }
}

fn type_error(op: BinaryOp, left: &Value, right: &Value, line: usize) -> RuntimeError {
    RuntimeError::TypeError {
        details: format!(
            "unsupported operands for '{}': {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
        line,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, line: usize) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Equal => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => return Ok(Value::Bool(left != right)),
        BinaryOp::And => return Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => return Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        _ => {}
    }

    match (op, &left, &right) {
        (BinaryOp::Add, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Subtract, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (BinaryOp::Multiply, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (BinaryOp::Divide, Value::Number(_), Value::Number(b)) if *b == 0.0 => {
            Err(RuntimeError::DivisionByZero { line })
        }
        (BinaryOp::Divide, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual, _, _) => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => return Err(type_error(op, &left, &right, line)),
            };
            let result = match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Less, Some(ord)) => ord == Ordering::Less,
                (BinaryOp::LessEqual, Some(ord)) => ord != Ordering::Greater,
                (BinaryOp::Greater, Some(ord)) => ord == Ordering::Greater,
                (_, Some(ord)) => ord != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        _ => Err(type_error(op, &left, &right, line)),
    }
}

fn index_value(target: Value, index: Value, line: usize) -> Result<Value, RuntimeError> {
    match (&target, &index) {
        (Value::List(items), Value::Number(i)) => {
            let in_range = *i >= 0.0 && i.fract() == 0.0 && (*i as usize) < items.len();
            if in_range {
                Ok(items[*i as usize].clone())
            } else {
                Err(RuntimeError::IndexOutOfBounds {
                    index: *i,
                    len: items.len(),
                    line,
                })
            }
        }
        (Value::Record(fields), Value::Str(key)) => {
            fields
                .get(key)
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownField {
                    field: key.clone(),
                    line,
                })
        }
        (Value::List(_), other) => Err(RuntimeError::TypeError {
            details: format!("list index must be a number, got {}", other.type_name()),
            line,
        }),
        (Value::Record(_), other) => Err(RuntimeError::TypeError {
            details: format!("record key must be a string, got {}", other.type_name()),
            line,
        }),
        (other, _) => Err(RuntimeError::NotIndexable {
            kind: other.type_name(),
            line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ast::FunctionDecl;
    use crate::domain::lexer::tokenize;
    use crate::domain::parser::parse;

    fn closes(values: &[f64]) -> Arc<MarketData> {
        Arc::new(MarketData::new().with_series("close", values.to_vec()))
    }

    fn run_with(source: &str, market: Arc<MarketData>) -> (Interpreter, Result<Vec<TradeRecord>, RunError>) {
        let program = parse(&tokenize(source)).unwrap();
        let mut interp = Interpreter::new();
        let result = interp.run(&program, market);
        (interp, result)
    }

    fn eval_global(source: &str, name: &str) -> Value {
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        interp.global(name).unwrap()
    }

    fn run_err(source: &str) -> RunError {
        run_with(source, closes(&[])).1.unwrap_err()
    }

    #[test]
    fn precedence() {
        assert_eq!(eval_global("var result = 2 + 3 * 4", "result"), Value::from(14.0));
        assert_eq!(eval_global("var r = (2 + 3) * 4", "r"), Value::from(20.0));
        assert_eq!(eval_global("var r = 10 - 4 - 3", "r"), Value::from(3.0));
        assert_eq!(eval_global("var r = -2 * 3", "r"), Value::from(-6.0));
    }

    #[test]
    fn shadowing_in_block_leaves_global() {
        let (interp, result) = run_with("var x = 10\n{ var x = 20 }", closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("x"), Some(Value::from(10.0)));
    }

    #[test]
    fn assignment_updates_enclosing_scope() {
        let source = "var x = 1\n{ x = x + 1 }\nvar y = x = 5";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("x"), Some(Value::from(5.0)));
        assert_eq!(interp.global("y"), Some(Value::from(5.0)));
    }

    #[test]
    fn assignment_to_undeclared_fails() {
        let err = run_err("z = 1");
        assert_eq!(
            err.error,
            RuntimeError::UndefinedVariable {
                name: "z".into(),
                line: 1
            }
        );
    }

    #[test]
    fn function_call() {
        let source = "function add(a, b) { return a + b }\nvar r = add(2, 3)";
        assert_eq!(eval_global(source, "r"), Value::from(5.0));
    }

    #[test]
    fn recursion() {
        let source = "\
function fact(n) {
    if (n <= 1) { return 1 }
    return n * fact(n - 1)
}
var r = fact(5)
";
        assert_eq!(eval_global(source, "r"), Value::from(120.0));
    }

    #[test]
    fn mutual_recursion_through_globals() {
        let source = "\
function is_even(n) { if (n == 0) return true else return is_odd(n - 1) }
function is_odd(n) { if (n == 0) return false else return is_even(n - 1) }
var r = is_even(10)
";
        assert_eq!(eval_global(source, "r"), Value::from(true));
    }

    #[test]
    fn missing_arguments_are_null_and_extras_ignored() {
        let source = "function f(a, b) { return b }\nvar r = f(1)\nvar s = f(1, 2, 3)";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("r"), Some(Value::Null));
        assert_eq!(interp.global("s"), Some(Value::from(2.0)));
    }

    #[test]
    fn function_without_return_yields_null() {
        assert_eq!(eval_global("function f() { var a = 1 }\nvar r = f()", "r"), Value::Null);
    }

    #[test]
    fn closures_capture_declaring_scope() {
        let source = "\
function make_counter() {
    var count = 0
    function next() {
        count = count + 1
        return count
    }
    return next
}
var counter = make_counter()
counter()
counter()
var r = counter()
";
        assert_eq!(eval_global(source, "r"), Value::from(3.0));
    }

    #[test]
    fn lexical_not_dynamic_scope() {
        let source = "\
var x = \"global\"
function show() { return x }
function caller() { var x = \"local\"\n return show() }
var r = caller()
";
        assert_eq!(eval_global(source, "r"), Value::from("global"));
    }

    #[test]
    fn division_by_zero_aborts_with_empty_log() {
        let err = run_err("var x = 5 / 0");
        assert_eq!(err.error, RuntimeError::DivisionByZero { line: 1 });
        assert!(err.trades.is_empty());
    }

    #[test]
    fn undefined_reference() {
        let err = run_err("var x = 1\nvar y = z + 1");
        assert_eq!(
            err.error,
            RuntimeError::UndefinedVariable {
                name: "z".into(),
                line: 2
            }
        );
    }

    #[test]
    fn trade_statement_emits_record_at_latest_close() {
        let (_, result) = run_with("buy(\"breakout\", 100)", closes(&[100.0, 105.0]));
        let trades = result.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, TradeAction::Buy);
        assert_eq!(trades[0].message.as_deref(), Some("breakout"));
        assert_eq!(trades[0].quantity, Some(100.0));
        assert_eq!(trades[0].reference_price, 105.0);
        assert_eq!(trades[0].sequence, 0);
    }

    #[test]
    fn trade_statement_with_runtime_arguments() {
        let source = "var qty = 25\nvar why = \"exit\"\nsell(qty, why)";
        let (_, result) = run_with(source, closes(&[50.0]));
        let trades = result.unwrap();
        assert_eq!(trades[0].action, TradeAction::Sell);
        assert_eq!(trades[0].quantity, Some(25.0));
        assert_eq!(trades[0].message.as_deref(), Some("exit"));
    }

    #[test]
    fn trade_statement_rejects_bad_runtime_argument() {
        let err = run_err("var flag = true\nbuy(flag)");
        assert!(matches!(err.error, RuntimeError::TypeError { line: 2, .. }));
    }

    #[test]
    fn buy_builtin_in_expression_returns_true() {
        let (interp, result) = run_with("var ok = buy(\"x\")", closes(&[7.0]));
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(interp.global("ok"), Some(Value::from(true)));
    }

    #[test]
    fn partial_trade_log_survives_failure() {
        let err = run_err("buy(1)\nsell(2)\nvar boom = 1 / 0\nbuy(3)");
        assert_eq!(err.trades.len(), 2);
        assert_eq!(err.trades[1].quantity, Some(2.0));
    }

    #[test]
    fn sma_builtin() {
        let (interp, result) = run_with("var avg = sma(3)", closes(&[10.0, 20.0, 30.0]));
        result.unwrap();
        assert_eq!(interp.global("avg"), Some(Value::from(20.0)));
    }

    #[test]
    fn strategy_with_indicators() {
        let source = "\
var fast = sma(2)
var slow = sma(4)
if (fast > slow and rsi(3) > 50) {
    buy(\"crossover\", 10)
} else {
    sell(\"exit\")
}
";
        let (_, result) = run_with(source, closes(&[10.0, 11.0, 12.0, 13.0, 14.0]));
        let trades = result.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, TradeAction::Buy);
        assert_eq!(trades[0].reference_price, 14.0);
    }

    #[test]
    fn while_and_for_loops() {
        let source = "\
var total = 0
var i = 0
while (i < 5) { total = total + i\n i = i + 1 }
var sum = 0
for (var j = 1; j <= 4; j = j + 1) sum = sum + j
";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("total"), Some(Value::from(10.0)));
        assert_eq!(interp.global("sum"), Some(Value::from(10.0)));
        // loop variable is scoped to the loop
        assert_eq!(interp.global("j"), None);
    }

    #[test]
    fn return_from_inside_loop() {
        let source = "\
function first_above(limit) {
    for (var i = 0; ; i = i + 1) {
        if (i > limit) return i
    }
}
var r = first_above(3)
";
        assert_eq!(eval_global(source, "r"), Value::from(4.0));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let source = "\
var calls = 0
function touch() { calls = calls + 1\n return true }
var a = false and touch()
var b = true or touch()
var c = 1 and \"yes\"
var d = not 0
";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("calls"), Some(Value::from(0.0)));
        assert_eq!(interp.global("a"), Some(Value::from(false)));
        assert_eq!(interp.global("b"), Some(Value::from(true)));
        assert_eq!(interp.global("c"), Some(Value::from(true)));
        assert_eq!(interp.global("d"), Some(Value::from(true)));
    }

    #[test]
    fn string_concatenation_and_comparison() {
        let source = "var s = \"ab\" + \"cd\"\nvar lt = \"a\" < \"b\"\nvar eq = 1 == \"1\"";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("s"), Some(Value::from("abcd")));
        assert_eq!(interp.global("lt"), Some(Value::from(true)));
        assert_eq!(interp.global("eq"), Some(Value::from(false)));
    }

    #[test]
    fn mixed_operand_types_fail() {
        assert!(matches!(run_err("var x = 1 + \"a\"").error, RuntimeError::TypeError { .. }));
        assert!(matches!(run_err("var x = 1 < \"a\"").error, RuntimeError::TypeError { .. }));
        assert!(matches!(run_err("var x = -\"a\"").error, RuntimeError::TypeError { .. }));
    }

    #[test]
    fn indexing_records_and_lists() {
        let source = "\
var m = macd(2, 3)
var sig = m[\"signal\"]
var latest = series()[0]
var oldest = series()[2]
";
        let (interp, result) = run_with(source, closes(&[1.0, 2.0, 3.0]));
        result.unwrap();
        assert_eq!(interp.global("latest"), Some(Value::from(3.0)));
        assert_eq!(interp.global("oldest"), Some(Value::from(1.0)));
        assert!(matches!(interp.global("sig"), Some(Value::Number(_))));
    }

    #[test]
    fn indexing_errors() {
        let market = closes(&[1.0]);
        let err = run_with("var x = series()[1]", Arc::clone(&market)).1.unwrap_err();
        assert!(matches!(err.error, RuntimeError::IndexOutOfBounds { len: 1, .. }));

        let err = run_with("var x = macd()[\"nope\"]", Arc::clone(&market)).1.unwrap_err();
        assert!(matches!(err.error, RuntimeError::UnknownField { .. }));

        let err = run_with("var x = 5[0]", market).1.unwrap_err();
        assert!(matches!(err.error, RuntimeError::NotIndexable { kind: "number", .. }));
    }

    #[test]
    fn calling_a_non_function() {
        let err = run_err("var x = 1\nx()");
        assert_eq!(
            err.error,
            RuntimeError::NotCallable {
                name: "x".into(),
                line: 2
            }
        );
    }

    #[test]
    fn builtin_errors_carry_name_and_line() {
        let err = run_err("\n\nvar r = sqrt(-4)");
        match err.error {
            RuntimeError::InvalidArgument { function, line, .. } => {
                assert_eq!(function, "sqrt");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn builtins_can_be_shadowed() {
        let source = "function abs(x) { return 42 }\nvar c = abs(-1)";
        let (interp, result) = run_with(source, closes(&[1.0]));
        result.unwrap();
        assert_eq!(interp.global("c"), Some(Value::from(42.0)));
    }

    #[test]
    fn top_level_return_is_an_error() {
        let err = run_err("var a = 1\nreturn a");
        assert_eq!(err.error, RuntimeError::ReturnOutsideFunction { line: 2 });
    }

    #[test]
    fn step_limit_stops_infinite_loop() {
        let program = parse(&tokenize("while (true) { }")).unwrap();
        let mut interp = Interpreter::with_config(InterpreterConfig {
            max_steps: Some(1000),
            ..Default::default()
        });
        let err = interp.run(&program, closes(&[])).unwrap_err();
        assert_eq!(err.error, RuntimeError::StepLimitExceeded { limit: 1000 });
    }

    #[test]
    fn call_depth_limit_stops_runaway_recursion() {
        let program = parse(&tokenize("function f(n) { return f(n + 1) }\nf(0)")).unwrap();
        let mut interp = Interpreter::with_config(InterpreterConfig {
            max_call_depth: 50,
            ..Default::default()
        });
        let err = interp.run(&program, closes(&[])).unwrap_err();
        assert!(matches!(err.error, RuntimeError::CallDepthExceeded { limit: 50, .. }));
    }

    #[test]
    fn default_call_depth_fails_cleanly_on_test_thread() {
        let err = run_err("function f(n) { return f(n + 1) }\nf(0)");
        assert_eq!(
            err.error,
            RuntimeError::CallDepthExceeded {
                limit: DEFAULT_MAX_CALL_DEPTH,
                line: 1
            }
        );
    }

    #[test]
    fn recursion_close_to_default_depth_succeeds() {
        let source = "function count(n) {\n  if (n <= 0) { return 0 }\n  return 1 + count(n - 1)\n}\nvar result = count(60)";
        assert_eq!(eval_global(source, "result"), Value::from(60.0));
    }

    #[test]
    fn scope_kept_alive_only_by_own_closures_is_released() {
        let scope = Environment::new_global();
        let decl = Rc::new(FunctionDecl {
            name: "h".into(),
            params: vec![],
            body: vec![],
        });
        let function = Rc::new(Function {
            decl,
            closure: Rc::clone(&scope),
        });
        scope.borrow_mut().define("h", Value::Function(Rc::clone(&function)));
        scope.borrow_mut().define("alias", Value::Function(Rc::clone(&function)));
        let weak = Rc::downgrade(&scope);

        assert_eq!(release_scope(&scope), ScopeRelease::Retained);
        drop(function);
        assert_eq!(release_scope(&scope), ScopeRelease::Released);
        drop(scope);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn plain_scope_has_nothing_to_release() {
        let scope = Environment::new_global();
        scope.borrow_mut().define("x", Value::from(1.0));
        assert_eq!(release_scope(&scope), ScopeRelease::NoClosures);
        assert_eq!(scope.borrow().get("x").unwrap(), Value::from(1.0));
    }

    #[test]
    fn helpers_declared_in_loops_do_not_leak_scopes() {
        let source = "var i = 0\nwhile (i < 100) {\n  function h() { return 1 }\n  i = i + h()\n}";
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("i"), Some(Value::from(100.0)));
        // the `globals` and `environment` fields only
        assert_eq!(Rc::strong_count(&interp.globals), 2);
        assert!(interp.retained.is_empty());
    }

    #[test]
    fn call_frames_with_inner_helpers_do_not_leak() {
        let source = r#"
function outer(n) {
    function helper(x) { return x * 2 }
    return helper(n)
}
var total = 0
for (var i = 0; i < 10; i = i + 1) { total = total + outer(i) }
"#;
        let (interp, result) = run_with(source, closes(&[]));
        result.unwrap();
        assert_eq!(interp.global("total"), Some(Value::from(90.0)));
        // plus the closure of `outer`
        assert_eq!(Rc::strong_count(&interp.globals), 3);
        assert!(interp.retained.is_empty());
    }

    #[test]
    fn escaped_closure_scope_is_freed_once_unreachable() {
        let mut interp = Interpreter::new();
        let make = parse(&tokenize(
            "function make() {\n  function inner() { return 1 }\n  return inner\n}\nvar f = make()",
        ))
        .unwrap();
        interp.run(&make, closes(&[])).unwrap();

        let frame = match interp.global("f") {
            Some(Value::Function(f)) => Rc::downgrade(&f.closure),
            other => panic!("expected function, got {:?}", other),
        };
        assert_eq!(interp.retained.len(), 1);

        let still_used = parse(&tokenize("var one = f()\nf = 0")).unwrap();
        interp.run(&still_used, closes(&[])).unwrap();
        assert!(frame.upgrade().is_some());
        assert_eq!(interp.global("one"), Some(Value::from(1.0)));

        let next = parse(&tokenize("var unused = 1")).unwrap();
        interp.run(&next, closes(&[])).unwrap();
        assert!(frame.upgrade().is_none());
        assert!(interp.retained.is_empty());
    }

    #[test]
    fn dropping_interpreter_frees_escaped_closure_scopes() {
        let (interp, result) = run_with(
            "function make() {\n  var n = 0\n  function inc() { n = n + 1\n return n }\n  return inc\n}\nvar counter = make()\ncounter()",
            closes(&[]),
        );
        result.unwrap();
        let frame = match interp.global("counter") {
            Some(Value::Function(f)) => Rc::downgrade(&f.closure),
            other => panic!("expected function, got {:?}", other),
        };
        let globals = Rc::downgrade(&interp.globals);

        drop(interp);
        assert!(frame.upgrade().is_none());
        assert!(globals.upgrade().is_none());
    }

    #[test]
    fn globals_persist_but_trades_reset_between_runs() {
        let mut interp = Interpreter::new();
        let first = parse(&tokenize("var n = 1\nbuy()")).unwrap();
        let second = parse(&tokenize("n = n + 1\nsell()\nsell()")).unwrap();

        assert_eq!(interp.run(&first, closes(&[1.0])).unwrap().len(), 1);
        let trades = interp.run(&second, closes(&[2.0])).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sequence, 0);
        assert_eq!(trades[0].reference_price, 2.0);
        assert_eq!(interp.trades().len(), 2);
        assert_eq!(interp.global("n"), Some(Value::from(2.0)));
    }

    #[test]
    fn scope_is_restored_after_failed_run() {
        let mut interp = Interpreter::new();
        let failing = parse(&tokenize("function f() { var local = 1\n return 1 / 0 }\nf()")).unwrap();
        assert!(interp.run(&failing, closes(&[])).is_err());

        let next = parse(&tokenize("var after = 1")).unwrap();
        interp.run(&next, closes(&[])).unwrap();
        assert_eq!(interp.global("after"), Some(Value::from(1.0)));
        assert_eq!(interp.global("local"), None);
    }

    #[test]
    fn globals_listing_skips_builtins() {
        let (interp, result) = run_with("var b = 2\nvar a = 1\nvar abs = 3", closes(&[]));
        result.unwrap();
        let names: Vec<String> = interp.globals().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "abs", "b"]);
    }

    #[test]
    fn market_data_is_shared_between_interpreters() {
        let market = closes(&[3.0, 4.0]);
        let program = parse(&tokenize("buy()")).unwrap();
        let mut a = Interpreter::new();
        let mut b = Interpreter::new();
        let ta = a.run(&program, Arc::clone(&market)).unwrap();
        let tb = b.run(&program, Arc::clone(&market)).unwrap();
        assert_eq!(ta, tb);
        assert_eq!(Arc::strong_count(&market), 3);
    }
}
