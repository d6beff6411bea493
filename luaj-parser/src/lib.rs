// luaj-parser - Reader, lexer, and bytecode compiler for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # luaj-parser
//!
//! The LuaJ front end: a chunked character reader, the lexer, and the
//! single-pass compiler that lowers source text directly to register-based
//! bytecode with no intermediate AST.
//!
//! The compiler's moving parts are the expression descriptors (`expr`),
//! the per-function emission state with its jump-list machinery (`func`),
//! the demand-driven emitter (`emit`), and the recursive-descent parser
//! itself (`parser`).

mod emit;
mod expr;
mod func;

pub mod lexer;
pub mod parser;
pub mod reader;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::parse;
pub use reader::Reader;
