// luaj-vm - Bytecode interpreter and embedding API for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Auxiliary chunk loading.
//!
//! Convenience wrappers that feed files or standard input through the
//! chunked reader.

use std::fs::File;
use std::io;
use std::path::Path;

use luaj_core::Status;
use luaj_parser::Reader;

use crate::state::State;

/// Load a chunk from a file, reading it in buffered pieces. The file name
/// becomes the chunk name. An unopenable file is reported as an `Err`
/// before any compilation happens.
pub fn load_file(state: &mut State, path: impl AsRef<Path>) -> io::Result<Status> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let name = path.to_string_lossy();
    Ok(state.load(Reader::from_stream(file, &name)))
}

/// Load a chunk from standard input with the chunk name `stdin`.
pub fn load_stdin(state: &mut State) -> Status {
    state.load(Reader::from_stream(io::stdin(), "stdin"))
}
