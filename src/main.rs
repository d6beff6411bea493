// luaj - A compiler and bytecode interpreter for a Lua-subset language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::process;

use luaj_vm::{aux, State};

/// Exit code for files that cannot be opened, outside the 0-5 API range.
const EXIT_BAD_FILE: i32 = 6;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("LuaJ 5.4.4");
        return;
    }

    let mut list = false;
    let mut run = false;
    let mut file: Option<&str> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--list" | "-l" => list = true,
            "--run" | "-r" => run = true,
            _ if arg.starts_with('-') => {
                eprintln!("luaj: unknown option '{}'", arg);
                usage();
                process::exit(EXIT_BAD_FILE);
            }
            _ => file = Some(arg),
        }
    }

    let mut state = State::new();

    // Compile the chunk; with no file, read from stdin.
    let status = match file {
        Some(path) => match aux::load_file(&mut state, path) {
            Ok(status) => status,
            Err(e) => {
                eprintln!("luaj: cannot open {} ({})", path, e);
                process::exit(EXIT_BAD_FILE);
            }
        },
        None => aux::load_stdin(&mut state),
    };

    if !status.is_ok() {
        report_error(&state);
        process::exit(status.code());
    }

    if list {
        if let Some(listing) = state.listing_at(state.top() - 1) {
            print!("{}", listing);
        }
    }

    if run {
        let status = state.pcall(0, 0);
        if !status.is_ok() {
            report_error(&state);
            process::exit(status.code());
        }
    }
}

/// Print the error message left on the stack top.
fn report_error(state: &State) {
    if state.top() > 0 {
        if let Some(msg) = state.string_at(state.top() - 1) {
            eprintln!("{}", msg);
            return;
        }
    }
    eprintln!("luaj: unknown error");
}

fn usage() {
    eprintln!("usage: luaj [--list] [--run] [file]");
}
