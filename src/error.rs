// error.rs - Errors surfaced to the execution driver

use crate::codegen::CodegenError;
use crate::parser::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("code generation error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("cannot open {}: {source}", path.display())]
    FileOpen { path: PathBuf, source: io::Error },

    #[error("could not initialize the code generator: {0}")]
    BackendInit(String),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("could not emit object file: {0}")]
    Emit(String),

    #[error("{0} is not available in this mode")]
    WrongMode(&'static str),
}

impl Error {
    /// True when the input ended in the middle of a unit.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Error::Parse(e) if e.is_end_of_input())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
