//! vedascript — a small scripting language for trading strategies.
//!
//! Hexagonal architecture: the language and trading domain in [`domain`],
//! port traits in [`ports`], concrete implementations in [`adapters`], and
//! the command-line front end in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
