// luaj-vm - Bytecode interpreter and embedding API for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The LuaJ state and its embedding API.
//!
//! A `State` owns everything needed to compile and run chunks: the object
//! heap, the register stack, and the call-info stack. States share nothing;
//! independent states may run in parallel.
//!
//! # Examples
//!
//! ```
//! use luaj_vm::State;
//!
//! let mut state = State::new();
//! let status = state.load_str("local x = 2 + 3 return x", "demo");
//! assert!(status.is_ok());
//! let status = state.pcall(0, 1);
//! assert!(status.is_ok());
//! assert_eq!(state.number_at(0), Some(5.0));
//! ```

use luaj_core::{proto_listing, Heap, Status, Value};
use luaj_parser::{parse, Reader};

use crate::frame::CallInfo;
use crate::stack::RegStack;

/// Everything needed to compile and run LuaJ programs.
pub struct State {
    pub(crate) heap: Heap,
    pub(crate) stack: RegStack,
    pub(crate) calls: Vec<CallInfo>,
}

impl State {
    /// Create a fresh state.
    pub fn new() -> State {
        State {
            heap: Heap::new(),
            stack: RegStack::new(),
            calls: Vec::new(),
        }
    }

    /// Compile a chunk. On success a function prototype is pushed on the
    /// stack; on failure the formatted error message is pushed instead.
    pub fn load(&mut self, reader: Reader<'_>) -> Status {
        match parse(&mut self.heap, reader) {
            Ok(proto) => {
                self.stack.push(proto);
                Status::Ok
            }
            Err(e) => {
                let status = Status::from(&e);
                let msg = self.heap.alloc_str(e.to_string().as_bytes());
                self.stack.push(msg);
                status
            }
        }
    }

    /// Compile a chunk from a string.
    pub fn load_str(&mut self, src: &str, chunk_name: &str) -> Status {
        self.load(Reader::from_str(src, chunk_name))
    }

    /// Protected call: like [`call`](State::call), but errors are caught.
    /// On failure the function and arguments are replaced by the error
    /// message and the status is returned.
    pub fn pcall(&mut self, n_args: usize, n_results: usize) -> Status {
        let saved_top = self.stack.top().saturating_sub(n_args + 1);
        let saved_calls = self.calls.len();
        match self.call(n_args, n_results) {
            Ok(()) => Status::Ok,
            Err(e) => {
                self.calls.truncate(saved_calls);
                let status = Status::from(&e);
                let msg = self.heap.alloc_str(e.to_string().as_bytes());
                self.stack.set_top(saved_top);
                self.stack.push(msg);
                status
            }
        }
    }

    // ---- Stack inspection ----

    /// Number of values on the API stack.
    pub fn top(&self) -> usize {
        self.stack.top()
    }

    /// The value at `idx` (0 is the bottom).
    pub fn value_at(&self, idx: usize) -> Option<Value> {
        if idx < self.stack.top() {
            Some(self.stack.get(idx))
        } else {
            None
        }
    }

    /// The value at `idx` as a number, if it is one.
    pub fn number_at(&self, idx: usize) -> Option<f64> {
        let v = self.value_at(idx)?;
        v.is_num().then(|| v.as_num())
    }

    /// The value at `idx` decoded as a string, if it is one.
    pub fn string_at(&self, idx: usize) -> Option<String> {
        let v = self.value_at(idx)?;
        if v.is_str() {
            Some(unsafe { v.as_str_obj() }.to_string_lossy())
        } else {
            None
        }
    }

    /// A bytecode listing of the function at `idx`, if it is one.
    pub fn listing_at(&self, idx: usize) -> Option<String> {
        let v = self.value_at(idx)?;
        if v.is_fn() {
            Some(proto_listing(unsafe { v.as_proto() }))
        } else {
            None
        }
    }

    /// Pop the top value.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Push a value produced by this state.
    pub fn push(&mut self, v: Value) {
        self.stack.push(v);
    }
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}
