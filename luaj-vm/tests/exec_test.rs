// luaj-vm - End-to-end execution tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compile-and-run tests driven through the embedding API.

use luaj_vm::{State, Status};

/// Compile and run a chunk, panicking on any error. Returns the state for
/// further inspection.
fn run(src: &str) -> State {
    let mut state = State::new();
    let status = state.load_str(src, "test");
    assert_eq!(status, Status::Ok, "compile failed: {:?}", state.string_at(0));
    let status = state.pcall(0, 0);
    assert_eq!(status, Status::Ok, "run failed: {:?}", state.string_at(0));
    state
}

/// Compile and run a chunk expecting one result; returns it as a number.
fn run_number(src: &str) -> f64 {
    let mut state = State::new();
    assert_eq!(state.load_str(src, "test"), Status::Ok);
    assert_eq!(state.pcall(0, 1), Status::Ok, "run failed: {:?}", state.string_at(0));
    state.number_at(0).expect("result is not a number")
}

#[test]
fn literals_and_locals() {
    run("local a = 1 local b = 'x' local c = nil local d = true assert(d)");
}

#[test]
fn and_of_comparisons_yields_a_boolean() {
    let mut state = run("local a = 3 local b = 4 local c = a == 3 and b == 4 assert(c == true)");
    assert_eq!(state.top(), 0);
    assert_eq!(state.load_str("local a = 3 local c = a == 3 and a == 4 assert(c == false)", "t"), Status::Ok);
    assert_eq!(state.pcall(0, 0), Status::Ok);
}

#[test]
fn and_yields_its_right_operand() {
    run("local a = 3 local b = 4 assert((a and b) == 4)");
    assert_eq!(run_number("local a = 3 local b = 4 return a and b"), 4.0);
}

#[test]
fn and_or_preserve_operand_values() {
    run("local y = 5 local z = nil and y assert(z == nil)");
    run("local z = false or 'x' assert(z == 'x')");
    run("local z = 5 or nil assert(z == 5)");
    run("local y = false local z = y or 7 assert(z == 7)");
    run("local y = nil local z = y and 7 assert(z == nil)");
}

#[test]
fn exponentiation_is_right_associative() {
    assert_eq!(run_number("local r = 2^3^2 return r"), 512.0);
    assert_eq!(run_number("local a = 2 local b = 3 return a^b^2"), 512.0);
    assert_eq!(run_number("return -2^2"), -4.0);
}

#[test]
fn multi_return_adjusts_and_pads_with_nil() {
    run(concat!(
        "local function f(a, b) return a + 1, b + 2, a + 3 end\n",
        "local x, y, z, w = f(1, 2)\n",
        "assert(x == 2 and y == 4 and z == 4 and w == nil)",
    ));
}

#[test]
fn while_loop_counts_to_ten() {
    run("local i = 0 while i < 10 do i = i + 1 end assert(i == 10)");
}

#[test]
fn concatenation_produces_one_string() {
    run("local s = 'a' .. 'b' .. 'c' assert(s == 'abc')");
    run("local a = 'a' local s = a .. 'b' assert(s ~= 'a' and s == 'ab')");
}

#[test]
fn repeat_runs_body_at_least_once() {
    run("local i = 0 repeat i = i + 1 until i == 3 assert(i == 3)");
    run("local i = 10 repeat i = i + 1 until true assert(i == 11)");
}

#[test]
fn if_elseif_else_dispatch() {
    let src = |n: u32| {
        format!(
            concat!(
                "local n = {}\n",
                "local r = 0\n",
                "if n == 1 then r = 10 elseif n == 2 then r = 20 else r = 30 end\n",
                "return r",
            ),
            n
        )
    };
    assert_eq!(run_number(&src(1)), 10.0);
    assert_eq!(run_number(&src(2)), 20.0);
    assert_eq!(run_number(&src(3)), 30.0);
}

#[test]
fn break_leaves_the_innermost_loop() {
    assert_eq!(
        run_number(concat!(
            "local i = 0\n",
            "while true do\n",
            "  i = i + 1\n",
            "  if i == 5 then break end\n",
            "end\n",
            "return i",
        )),
        5.0
    );
}

#[test]
fn nested_loops_and_breaks() {
    assert_eq!(
        run_number(concat!(
            "local total = 0\n",
            "local i = 0\n",
            "while i < 3 do\n",
            "  local j = 0\n",
            "  while true do\n",
            "    j = j + 1\n",
            "    if j == 4 then break end\n",
            "    total = total + 1\n",
            "  end\n",
            "  i = i + 1\n",
            "end\n",
            "return total",
        )),
        9.0
    );
}

#[test]
fn functions_are_first_class_arguments() {
    assert_eq!(
        run_number(concat!(
            "local function apply(f, x) return f(x) end\n",
            "local function double(x) return x * 2 end\n",
            "return apply(double, 21)",
        )),
        42.0
    );
}

#[test]
fn recursion_through_a_self_parameter() {
    // Without upvalues a function cannot see enclosing locals, so
    // recursion threads the function through its own parameters.
    assert_eq!(
        run_number(concat!(
            "local function fib(self, n)\n",
            "  if n < 2 then return n end\n",
            "  return self(self, n - 1) + self(self, n - 2)\n",
            "end\n",
            "return fib(fib, 10)",
        )),
        55.0
    );
}

#[test]
fn calls_adjust_argument_counts() {
    run("local function f(a) return a end assert(f(1, 2) == 1)");
    run("local function f(a, b) return b end assert(f(1) == nil)");
    run("local function f() return 7 end local a, b = f(), 2 assert(a == 7 and b == 2)");
}

#[test]
fn multiple_assignment_evaluates_rhs_first() {
    run("local a, b = 1, 2 a, b = b, a assert(a == 2 and b == 1)");
    run("local a, b = 1, 2 a, b = b + 1, a + 1 assert(a == 3 and b == 2)");
    run("local a, b, c = 1, 2, 3 a, b, c = c, a, b assert(a == 3 and b == 1 and c == 2)");
}

#[test]
fn assignment_with_unbalanced_counts() {
    run("local a, b = 1, 2 a, b = 9 assert(a == 9 and b == nil)");
    run("local a = 1 a = 2, 3 assert(a == 2)");
}

#[test]
fn division_follows_ieee() {
    assert_eq!(run_number("return 1 / 0"), f64::INFINITY);
    assert_eq!(run_number("return -1 / 0"), f64::NEG_INFINITY);
    assert!(run_number("return 0 / 0").is_nan());
}

#[test]
fn nan_comparisons_are_false() {
    run(concat!(
        "local z = 0\n",
        "local n = z / z\n",
        "assert(not (n < 0))\n",
        "assert(not (n > 0))\n",
        "assert(not (n == n))\n",
        "assert(n ~= n)",
    ));
}

#[test]
fn floored_modulo_semantics() {
    assert_eq!(run_number("local a = -5 return a % 3"), 1.0);
    assert_eq!(run_number("local a = 5 return a % -3"), -1.0);
}

#[test]
fn not_produces_booleans() {
    run("assert(not nil == true)");
    run("assert(not false == true)");
    run("assert(not 0 == false)");
    run("local a = 1 assert(not (a == 2))");
    run("local a = 1 assert(not not a == true)");
}

#[test]
fn shadowing_resolves_to_the_innermost_local() {
    run(concat!(
        "local x = 1\n",
        "do\n",
        "  local x = 2\n",
        "  assert(x == 2)\n",
        "end\n",
        "assert(x == 1)",
    ));
    run("local x = 1 local x = x + 1 assert(x == 2)");
}

#[test]
fn assert_returns_its_argument() {
    assert_eq!(run_number("local ok = assert(42) return ok"), 42.0);
}

#[test]
fn stack_top_is_restored_around_calls() {
    let mut state = State::new();
    assert_eq!(state.load_str("local a = 1 return a", "test"), Status::Ok);
    assert_eq!(state.top(), 1);
    assert_eq!(state.pcall(0, 1), Status::Ok);
    assert_eq!(state.top(), 1);
    assert_eq!(state.number_at(0), Some(1.0));
    state.pop();
    assert_eq!(state.top(), 0);
}

#[test]
fn results_beyond_returns_are_nil() {
    let mut state = State::new();
    assert_eq!(state.load_str("return 1", "test"), Status::Ok);
    assert_eq!(state.pcall(0, 3), Status::Ok);
    assert_eq!(state.top(), 3);
    assert_eq!(state.number_at(0), Some(1.0));
    assert!(state.value_at(1).unwrap().is_nil());
    assert!(state.value_at(2).unwrap().is_nil());
}

#[test]
fn chunks_can_return_multiple_values() {
    let mut state = State::new();
    assert_eq!(state.load_str("local a, b = 1, 2 return a, b", "test"), Status::Ok);
    assert_eq!(state.pcall(0, 2), Status::Ok);
    assert_eq!(state.number_at(0), Some(1.0));
    assert_eq!(state.number_at(1), Some(2.0));
}

#[test]
fn comments_are_skipped() {
    run(concat!(
        "-- leading comment\n",
        "local a = 1 -- trailing\n",
        "--[[ block\ncomment ]] local b = a + 1\n",
        "assert(b == 2)",
    ));
}

#[test]
fn deep_call_chains() {
    assert_eq!(
        run_number(concat!(
            "local function count(self, n)\n",
            "  if n == 0 then return 0 end\n",
            "  return self(self, n - 1) + 1\n",
            "end\n",
            "return count(count, 200)",
        )),
        200.0
    );
}

#[test]
fn function_bodies_cannot_see_enclosing_locals() {
    let mut state = State::new();
    let status = state.load_str(
        "local x = 1 local function f() return x end",
        "test",
    );
    assert_eq!(status, Status::SyntaxErr);
    let msg = state.string_at(0).unwrap();
    assert!(msg.contains("undefined name 'x'"), "got: {}", msg);
}
