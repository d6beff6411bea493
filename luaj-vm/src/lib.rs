// luaj-vm - Bytecode interpreter and embedding API for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # luaj-vm
//!
//! The LuaJ interpreter: a register-based bytecode VM over NaN-boxed
//! values, plus the embedding API (`State`) that ties compilation and
//! execution together.
//!
//! ```
//! use luaj_vm::State;
//!
//! let mut state = State::new();
//! assert!(state.load_str("local a = 1 + 2 assert(a == 3)", "demo").is_ok());
//! assert!(state.pcall(0, 0).is_ok());
//! ```

pub mod aux;
pub mod frame;
pub mod stack;
pub mod state;
mod vm;

pub use luaj_core::{Status, Value};
pub use state::State;
