//! Core language and trading domain.
//!
//! Front end: `token`, `lexer`, `ast`, `parser`. Runtime: `value`,
//! `environment`, `interpreter`, `builtins`. Trading data: `ohlcv`,
//! `market_data`, `indicator`, `trade`.

pub mod ast;
pub mod builtins;
pub mod config_validation;
pub mod environment;
pub mod error;
pub mod indicator;
pub mod interpreter;
pub mod lexer;
pub mod market_data;
pub mod ohlcv;
pub mod parser;
pub mod script;
pub mod token;
pub mod trade;
pub mod value;
