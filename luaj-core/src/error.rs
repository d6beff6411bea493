// luaj-core - Values, objects, and bytecode for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types and status codes.
//!
//! # Examples
//!
//! ```
//! use luaj_core::{Error, Status};
//!
//! let err = Error::syntax("test.lua", 3, 7, "unexpected symbol");
//! assert_eq!(err.to_string(), "test.lua:3:7: unexpected symbol");
//! assert_eq!(Status::from(&err), Status::SyntaxErr);
//! ```

use std::fmt;

/// Result type shared by compilation and execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling or running a chunk.
#[derive(Debug, Clone)]
pub enum Error {
    /// Compile-time error with full source position.
    Syntax {
        chunk: String,
        line: u32,
        col: u32,
        msg: String,
    },
    /// Execution error; the column is unknown at runtime.
    Runtime {
        chunk: String,
        line: u32,
        msg: String,
    },
    /// Allocation failure (reserved; allocation currently aborts).
    Mem,
    /// Failure inside an error handler (reserved).
    ErrErr,
}

impl Error {
    /// Build a syntax error.
    pub fn syntax(
        chunk: impl Into<String>,
        line: u32,
        col: u32,
        msg: impl Into<String>,
    ) -> Error {
        Error::Syntax {
            chunk: chunk.into(),
            line,
            col,
            msg: msg.into(),
        }
    }

    /// Build a runtime error.
    pub fn runtime(chunk: impl Into<String>, line: u32, msg: impl Into<String>) -> Error {
        Error::Runtime {
            chunk: chunk.into(),
            line,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax {
                chunk,
                line,
                col,
                msg,
            } => write!(f, "{}:{}:{}: {}", chunk, line, col, msg),
            Error::Runtime { chunk, line, msg } => write!(f, "{}:{}: {}", chunk, line, msg),
            Error::Mem => write!(f, "not enough memory"),
            Error::ErrErr => write!(f, "error in error handling"),
        }
    }
}

impl std::error::Error for Error {}

/// Status codes returned by the embedding API. `Ok` is zero; the others
/// match the classic numbering, with `Yield` reserved for coroutines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Yield = 1,
    RunErr = 2,
    SyntaxErr = 3,
    MemErr = 4,
    ErrErr = 5,
}

impl Status {
    /// The numeric code, suitable for a process exit status.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<&Error> for Status {
    fn from(e: &Error) -> Status {
        match e {
            Error::Syntax { .. } => Status::SyntaxErr,
            Error::Runtime { .. } => Status::RunErr,
            Error::Mem => Status::MemErr,
            Error::ErrErr => Status::ErrErr,
        }
    }
}
