pub mod abi;
mod commands;
pub mod environment;
pub mod error;
mod eval;
pub mod interpreter;
pub mod library;
pub mod memory;
pub mod platform;
mod stack;
pub mod value;

pub use commands::translate_escapes;
pub use interpreter::Interpreter;
