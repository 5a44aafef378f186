#![allow(clippy::collapsible_if)]

pub mod config;
pub mod diagnostics;
pub mod language;
pub mod runtime;

pub use runtime::Interpreter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;
