// luaj-vm - Bytecode interpreter and embedding API for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames.

use luaj_core::Value;

/// Per-call record pushed by `CALL` and popped by the return opcodes.
/// Stores the caller's context and how many results it expects back.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo {
    /// The caller's function prototype value.
    pub proto: Value,
    /// Caller instruction index to resume at.
    pub return_pc: usize,
    /// Caller frame base.
    pub return_base: usize,
    /// Results the caller's `CALL` expects.
    pub expected: u8,
}
