// luaj-vm - Embedding API tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tests for the embedding surface: reader contracts, file loading,
//! host-driven calls, and bytecode listings.

use std::env;
use std::fs;

use luaj_parser::Reader;
use luaj_vm::{State, Status, Value};

#[test]
fn chunked_reading_is_transparent() {
    // Chunk boundaries may fall in the middle of a token.
    let parts: Vec<&[u8]> = vec![b"local a = 4", b"2 retu", b"rn a"];
    let mut i = 0;
    let reader = Reader::from_chunks(
        move || {
            let p = parts.get(i).map(|s| s.to_vec());
            i += 1;
            p
        },
        "chunked",
    );
    let mut state = State::new();
    assert_eq!(state.load(reader), Status::Ok);
    assert_eq!(state.pcall(0, 1), Status::Ok);
    assert_eq!(state.number_at(0), Some(42.0));
}

#[test]
fn empty_chunk_ends_the_stream() {
    let parts: Vec<&[u8]> = vec![b"return 7", b"", b" + 1"];
    let mut i = 0;
    let reader = Reader::from_chunks(
        move || {
            let p = parts.get(i).map(|s| s.to_vec());
            i += 1;
            p
        },
        "chunked",
    );
    let mut state = State::new();
    assert_eq!(state.load(reader), Status::Ok);
    assert_eq!(state.pcall(0, 1), Status::Ok);
    // The trailing " + 1" is never seen.
    assert_eq!(state.number_at(0), Some(7.0));
}

#[test]
fn load_file_round_trip() {
    let path = env::temp_dir().join("luaj_api_test_chunk.lua");
    fs::write(&path, "local n = 6 * 7\nreturn n\n").unwrap();
    let mut state = State::new();
    let status = luaj_vm::aux::load_file(&mut state, &path).unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(state.pcall(0, 1), Status::Ok);
    assert_eq!(state.number_at(0), Some(42.0));
    fs::remove_file(&path).ok();
}

#[test]
fn load_file_reports_missing_files() {
    let mut state = State::new();
    let err = luaj_vm::aux::load_file(&mut state, "/no/such/luaj/file.lua");
    assert!(err.is_err());
    assert_eq!(state.top(), 0, "nothing is pushed for an unopenable file");
}

#[test]
fn syntax_errors_carry_the_chunk_name() {
    let mut state = State::new();
    let status = state.load_str("local", "embedded-chunk");
    assert_eq!(status, Status::SyntaxErr);
    let msg = state.string_at(0).unwrap();
    assert!(msg.starts_with("embedded-chunk:1:"), "got: {}", msg);
}

#[test]
fn host_calls_a_loaded_function_with_arguments() {
    let mut state = State::new();
    let status = state.load_str(
        "local function add(a, b) return a + b end return add",
        "test",
    );
    assert_eq!(status, Status::Ok);
    // Run the chunk to obtain the function value.
    assert_eq!(state.pcall(0, 1), Status::Ok);
    assert!(state.value_at(0).unwrap().is_fn());

    state.push(Value::num(30.0));
    state.push(Value::num(12.0));
    assert_eq!(state.pcall(2, 1), Status::Ok);
    assert_eq!(state.number_at(0), Some(42.0));
}

#[test]
fn unchecked_call_propagates_errors() {
    let mut state = State::new();
    state.push(Value::num(1.0));
    assert!(state.call(0, 0).is_err(), "calling a number must fail");
}

#[test]
fn listing_shows_the_compiled_chunk() {
    let mut state = State::new();
    assert_eq!(
        state.load_str("local a = 1 local b = a + 1 return b", "test"),
        Status::Ok
    );
    let listing = state.listing_at(0).expect("chunk listing");
    assert!(listing.contains("KINT"), "got:\n{}", listing);
    assert!(listing.contains("ADDVN"), "got:\n{}", listing);
    assert!(listing.contains("RET1"), "got:\n{}", listing);
    assert!(listing.contains("; 1"), "constant comment column missing");
}

#[test]
fn listing_includes_nested_functions() {
    let mut state = State::new();
    assert_eq!(
        state.load_str("local function f(x) return x end", "test"),
        Status::Ok
    );
    let listing = state.listing_at(0).unwrap();
    assert!(listing.contains("KFN"));
    assert!(listing.contains("-- function f --"), "got:\n{}", listing);
}

#[test]
fn states_are_independent() {
    let mut a = State::new();
    let mut b = State::new();
    assert_eq!(a.load_str("return 1", "a"), Status::Ok);
    assert_eq!(b.load_str("return 2", "b"), Status::Ok);
    assert_eq!(b.pcall(0, 1), Status::Ok);
    assert_eq!(a.pcall(0, 1), Status::Ok);
    assert_eq!(a.number_at(0), Some(1.0));
    assert_eq!(b.number_at(0), Some(2.0));
}
