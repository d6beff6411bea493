// luaj-parser - Statement-level bytecode shape tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tests pinning the exact instruction sequences emitted for statements:
//! control flow, assignments, calls, and returns.

use luaj_core::{Heap, Op, Proto, Value, JMP_BIAS};
use luaj_parser::{parse, Reader};

fn compile(src: &str) -> (Heap, Value) {
    let mut heap = Heap::new();
    let v = parse(&mut heap, Reader::from_str(src, "test")).expect("compile error");
    (heap, v)
}

fn ops_of(proto: &Proto) -> Vec<Op> {
    proto.ins.iter().map(|i| i.op()).collect()
}

fn jmp_target(proto: &Proto, pc: usize) -> i64 {
    assert_eq!(proto.ins[pc].op(), Op::Jmp);
    pc as i64 + proto.ins[pc].e_arg() as i64 - JMP_BIAS as i64
}

#[test]
fn return_forms() {
    let (_heap, v) = compile("return");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::Ret0, Op::Ret0]);

    let (_heap, v) = compile("local a = 1 return a");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::KInt, Op::Ret1, Op::Ret0]);
    assert_eq!(proto.ins[1].e_arg(), 0);

    let (_heap, v) = compile("return 1, 2");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::KInt, Op::KInt, Op::Ret, Op::Ret0]);
    let ret = proto.ins[2];
    assert_eq!((ret.a(), ret.d()), (0, 2));
}

#[test]
fn if_without_else_jumps_past_the_block() {
    let (_heap, v) = compile("local a = 1 if a == 1 then a = 2 end");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KInt, Op::NeqVN, Op::Jmp, Op::KInt, Op::Ret0]
    );
    assert_eq!(jmp_target(proto, 2), 4);
}

#[test]
fn if_else_shapes() {
    let (_heap, v) = compile("local a = 1 if a == 1 then a = 2 else a = 3 end");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KInt, Op::NeqVN, Op::Jmp, Op::KInt, Op::Jmp, Op::KInt, Op::Ret0]
    );
    // The false branch enters the else arm; the then arm escapes past it.
    assert_eq!(jmp_target(proto, 2), 5);
    assert_eq!(jmp_target(proto, 4), 6);
}

#[test]
fn break_patches_to_the_loop_exit() {
    let (_heap, v) = compile("while true do break end");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::Jmp, Op::Jmp, Op::Ret0]);
    assert_eq!(jmp_target(proto, 0), 2, "break leaves the loop");
    assert_eq!(jmp_target(proto, 1), 0, "loop closes back to its start");
}

#[test]
fn repeat_jumps_back_while_the_condition_fails() {
    let (_heap, v) = compile("local i = 0 repeat i = i + 1 until i == 3");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KInt, Op::AddVN, Op::NeqVN, Op::Jmp, Op::Ret0]
    );
    assert_eq!(jmp_target(proto, 3), 1);
}

#[test]
fn swap_assignment_moves_through_a_temporary() {
    let (_heap, v) = compile("local a, b = 1, 2 a, b = b, a");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KInt, Op::KInt, Op::Mov, Op::Mov, Op::Mov, Op::Ret0]
    );
    let movs: Vec<(u8, u16)> = proto.ins[2..5].iter().map(|i| (i.a(), i.d())).collect();
    assert_eq!(movs, vec![(2, 1), (1, 0), (0, 2)]);
}

#[test]
fn call_lays_out_callee_and_arguments_contiguously() {
    let (_heap, v) = compile("local function f(a, b) end local r = f(1, 2)");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KFn, Op::Mov, Op::KInt, Op::KInt, Op::Call, Op::Ret0]
    );
    let call = proto.ins[4];
    assert_eq!((call.a(), call.b(), call.c()), (1, 2, 1));
    // The result slot doubles as the new local's slot.
    let inner = unsafe { proto.k[proto.ins[0].d() as usize].as_proto() };
    assert_eq!(inner.num_params, 2);
    assert_eq!(ops_of(inner), vec![Op::Ret0]);
}

#[test]
fn block_exit_retires_locals_and_reuses_slots() {
    let (_heap, v) = compile("do local x = 1 end local y = 2");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::KInt, Op::KInt, Op::Ret0]);
    assert_eq!(proto.ins[0].a(), 0);
    assert_eq!(proto.ins[1].a(), 0, "y reuses the retired slot");
}

#[test]
fn assert_tests_the_argument_slot() {
    let (_heap, v) = compile("local x = 1 assert(x)");
    let proto = unsafe { v.as_proto() };
    assert_eq!(ops_of(proto), vec![Op::KInt, Op::Assert, Op::Ret0]);
    assert_eq!(proto.ins[1].d(), 0);
}

#[test]
fn chunk_metadata_records_lines_and_name() {
    let (_heap, v) = compile("local a = 1\nlocal function f()\nend");
    let proto = unsafe { v.as_proto() };
    assert_eq!(&*proto.chunk_name, "test");
    assert_eq!(proto.start_line, 1);
    let inner = proto.k.iter().find(|k| k.is_fn()).unwrap();
    let inner = unsafe { inner.as_proto() };
    assert_eq!(inner.name.as_deref(), Some("f"));
    assert_eq!(inner.start_line, 2);
    assert_eq!(inner.end_line, 3);
}

#[test]
fn conditions_in_plain_statements_drop_their_copies() {
    // A bare conditional in statement position must not leave an ISTC/ISFC
    // writing to the relocation sentinel.
    let (_heap, v) = compile("local a = 1 if a then a = 2 end");
    let proto = unsafe { v.as_proto() };
    assert_eq!(
        ops_of(proto),
        vec![Op::KInt, Op::IsF, Op::Jmp, Op::KInt, Op::Ret0]
    );
    assert_eq!(proto.ins[1].a(), 0, "demoted test carries no destination");
    assert_eq!(jmp_target(proto, 2), 4);
}
