// luaj-core - Values, objects, and bytecode for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # luaj-core
//!
//! Shared leaves of the LuaJ implementation: the NaN-boxed value
//! representation, heap objects (strings and function prototypes), the
//! 32-bit bytecode encoding, error types, and bytecode listings.
//!
//! Both the compiler (`luaj-parser`) and the interpreter (`luaj-vm`) are
//! built on the invariants defined here.

pub mod bytecode;
pub mod dump;
pub mod error;
pub mod heap;
pub mod object;
pub mod value;

pub use bytecode::{BcIns, Op, JMP_BIAS, NO_SLOT};
pub use dump::proto_listing;
pub use error::{Error, Result, Status};
pub use heap::Heap;
pub use object::{Header, ObjType, Proto, Str};
pub use value::{num_mod, num_pow, values_equal, Value, TAG_FALSE, TAG_NIL, TAG_PRIM, TAG_TRUE};
