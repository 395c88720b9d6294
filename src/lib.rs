pub mod ast;
pub mod backend;
pub mod builtins;
pub mod codegen;
pub mod dictionary;
pub mod error;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod stack;
pub mod tokenizer;

pub use error::{Error, Result};
pub use session::{CompiledUnit, RunSummary, Session};
