//! Built-in functions registered into every interpreter's global scope.
//!
//! Each built-in receives a `CallContext` (market data plus the trade log)
//! and the already-evaluated arguments. Missing or `null` optional arguments
//! take their defaults. Errors are plain messages; the interpreter attaches
//! the function name and call-site line.

use crate::domain::ast::TradeAction;
use crate::domain::environment::Environment;
use crate::domain::indicator::{self, bollinger, macd};
use crate::domain::market_data::MarketData;
use crate::domain::trade::TradeLog;
use crate::domain::value::{Builtin, BuiltinFn, Value};
use std::rc::Rc;
use tracing::debug;

pub struct CallContext<'a> {
    pub market: &'a MarketData,
    pub trades: &'a mut TradeLog,
}

impl CallContext<'_> {
    /// Append a trade at the most recent close (0.0 without data).
    pub fn emit_trade(&mut self, action: TradeAction, message: Option<String>, quantity: Option<f64>) {
        let price = self.market.latest("close").unwrap_or(0.0);
        let record = self.trades.emit(action, message, quantity, price);
        debug!(
            action = %record.action,
            message = ?record.message,
            quantity = ?record.quantity,
            price = record.reference_price,
            sequence = record.sequence,
            "trade emitted"
        );
    }
}

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("open", open),
    ("high", high),
    ("low", low),
    ("close", close),
    ("volume", volume),
    ("sma", sma),
    ("ema", ema),
    ("rsi", rsi),
    ("macd", macd),
    ("bollinger_bands", bollinger_bands),
    ("bb", bollinger_bands),
    ("buy", buy),
    ("sell", sell),
    ("position", position),
    ("series", series),
    ("len", len),
    ("abs", abs),
    ("max", max),
    ("min", min),
    ("round", round),
    ("sqrt", sqrt),
];

pub fn register(env: &mut Environment) {
    for &(name, func) in BUILTINS {
        env.define(name, Value::Builtin(Builtin { name, func }));
    }
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Split trade arguments into an optional message and an optional quantity.
/// `null` arguments are ignored.
pub fn classify_trade_args(args: &[Value]) -> Result<(Option<String>, Option<f64>), String> {
    if args.len() > 2 {
        return Err(format!(
            "expected at most a message and a quantity, got {} arguments",
            args.len()
        ));
    }
    let mut message = None;
    let mut quantity = None;
    for arg in args {
        match arg {
            Value::Null => {}
            Value::Str(s) if message.is_none() => message = Some(s.clone()),
            Value::Number(n) if quantity.is_none() => quantity = Some(*n),
            Value::Str(_) => return Err("more than one message".into()),
            Value::Number(_) => return Err("more than one quantity".into()),
            other => {
                return Err(format!(
                    "{} is neither a message nor a quantity",
                    other.type_name()
                ));
            }
        }
    }
    Ok((message, quantity))
}

fn arg(args: &[Value], idx: usize) -> Option<&Value> {
    args.get(idx).filter(|v| !matches!(v, Value::Null))
}

fn number_arg(args: &[Value], idx: usize, name: &str, default: f64) -> Result<f64, String> {
    match arg(args, idx) {
        None => Ok(default),
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(format!("{} must be a number, got {}", name, other.type_name())),
    }
}

fn required_number(args: &[Value], idx: usize, name: &str) -> Result<f64, String> {
    match arg(args, idx) {
        None => Err(format!("missing {}", name)),
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(format!("{} must be a number, got {}", name, other.type_name())),
    }
}

fn period_arg(args: &[Value], idx: usize, name: &str, default: usize) -> Result<usize, String> {
    let n = number_arg(args, idx, name, default as f64)?;
    if !n.is_finite() || n < 0.0 {
        return Err(format!("{} must be a non-negative number, got {}", name, n));
    }
    Ok(n as usize)
}

fn field_arg(args: &[Value], idx: usize) -> Result<String, String> {
    match arg(args, idx) {
        None => Ok("close".to_string()),
        Some(Value::Str(s)) => Ok(s.to_lowercase()),
        Some(other) => Err(format!("field must be a string, got {}", other.type_name())),
    }
}

// Market data accessors. Offsets outside the series read as 0.0.

fn price_at(ctx: &CallContext<'_>, field: &str, args: &[Value]) -> Result<Value, String> {
    let offset = number_arg(args, 0, "offset", 0.0)?;
    if !offset.is_finite() || offset < 0.0 {
        return Ok(Value::Number(0.0));
    }
    let value = ctx.market.value_at(field, offset as usize).unwrap_or(0.0);
    Ok(Value::Number(value))
}

fn open(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    price_at(ctx, "open", args)
}

fn high(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    price_at(ctx, "high", args)
}

fn low(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    price_at(ctx, "low", args)
}

fn close(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    price_at(ctx, "close", args)
}

fn volume(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    price_at(ctx, "volume", args)
}

// Indicators

fn sma(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let period = period_arg(args, 0, "period", 20)?;
    let field = field_arg(args, 1)?;
    Ok(Value::Number(indicator::calculate_sma(ctx.market.series(&field), period)))
}

fn ema(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let period = period_arg(args, 0, "period", 20)?;
    let field = field_arg(args, 1)?;
    Ok(Value::Number(indicator::calculate_ema(ctx.market.series(&field), period)))
}

fn rsi(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let period = period_arg(args, 0, "period", 14)?;
    let field = field_arg(args, 1)?;
    Ok(Value::Number(indicator::calculate_rsi(ctx.market.series(&field), period)))
}

fn macd(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let fast = period_arg(args, 0, "fast period", macd::DEFAULT_FAST)?;
    let slow = period_arg(args, 1, "slow period", macd::DEFAULT_SLOW)?;
    let signal = period_arg(args, 2, "signal period", macd::DEFAULT_SIGNAL)?;
    let field = field_arg(args, 3)?;
    let value = indicator::calculate_macd(ctx.market.series(&field), fast, slow, signal);
    Ok(Value::record([
        ("macd", Value::Number(value.line)),
        ("signal", Value::Number(value.signal)),
        ("histogram", Value::Number(value.histogram)),
    ]))
}

fn bollinger_bands(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let period = period_arg(args, 0, "period", bollinger::DEFAULT_PERIOD)?;
    let multiplier = number_arg(args, 1, "multiplier", bollinger::DEFAULT_MULTIPLIER)?;
    let field = field_arg(args, 2)?;
    let bands = indicator::calculate_bollinger(ctx.market.series(&field), period, multiplier);
    Ok(Value::record([
        ("upper", Value::Number(bands.upper)),
        ("middle", Value::Number(bands.middle)),
        ("lower", Value::Number(bands.lower)),
    ]))
}

// Trading

fn trade(ctx: &mut CallContext<'_>, action: TradeAction, args: &[Value]) -> Result<Value, String> {
    let (message, quantity) = classify_trade_args(args)?;
    ctx.emit_trade(action, message, quantity);
    Ok(Value::Bool(true))
}

fn buy(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    trade(ctx, TradeAction::Buy, args)
}

fn sell(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    trade(ctx, TradeAction::Sell, args)
}

fn position(ctx: &mut CallContext<'_>, _args: &[Value]) -> Result<Value, String> {
    let summary = ctx.trades.position();
    Ok(Value::record([
        ("quantity", Value::Number(summary.quantity)),
        ("buy_quantity", Value::Number(summary.buy_quantity)),
        ("sell_quantity", Value::Number(summary.sell_quantity)),
        ("trades_count", Value::Number(summary.trades_count as f64)),
    ]))
}

// Series access

fn series(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let field = field_arg(args, 0)?;
    let values = ctx.market.series(&field);
    let count = match arg(args, 1) {
        None => values.len(),
        Some(_) => period_arg(args, 1, "count", 0)?,
    };
    let items = values
        .iter()
        .rev()
        .take(count)
        .map(|&v| Value::Number(v))
        .collect();
    Ok(Value::List(Rc::new(items)))
}

fn len(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::List(items)) => Ok(Value::Number(items.len() as f64)),
        Some(Value::Str(s)) => Ok(Value::Number(s.chars().count() as f64)),
        Some(other) => Err(format!("expected a list or string, got {}", other.type_name())),
        None => Err("missing value".into()),
    }
}

// Math

fn abs(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(required_number(args, 0, "value")?.abs()))
}

fn numbers(args: &[Value]) -> Result<Vec<f64>, String> {
    if args.is_empty() {
        return Err("expected at least one number".into());
    }
    args.iter()
        .map(|v| {
            v.as_number()
                .ok_or_else(|| format!("expected numbers, got {}", v.type_name()))
        })
        .collect()
}

fn max(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let values = numbers(args)?;
    Ok(Value::Number(values.into_iter().fold(f64::NEG_INFINITY, f64::max)))
}

fn min(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let values = numbers(args)?;
    Ok(Value::Number(values.into_iter().fold(f64::INFINITY, f64::min)))
}

fn round(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let x = required_number(args, 0, "value")?;
    let digits = number_arg(args, 1, "digits", 0.0)?;
    if !digits.is_finite() {
        return Err(format!("digits must be finite, got {}", digits));
    }
    let scale = 10f64.powi(digits as i32);
    Ok(Value::Number((x * scale).round() / scale))
}

fn sqrt(_ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    let x = required_number(args, 0, "value")?;
    if x < 0.0 {
        return Err(format!("cannot take the square root of {}", x));
    }
    Ok(Value::Number(x.sqrt()))
}
