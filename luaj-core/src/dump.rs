// luaj-core - Values, objects, and bytecode for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode listings for debugging.
//!
//! Prints one line per instruction with a comment column decoding constant
//! operands; nested prototypes are listed after their parent.

use std::fmt::Write;

use crate::bytecode::{BcIns, Op, JMP_BIAS};
use crate::object::Proto;

/// Render a full listing of `proto` and every nested prototype.
pub fn proto_listing(proto: &Proto) -> String {
    let mut out = String::new();
    write_proto(proto, &mut out);
    out
}

fn write_proto(proto: &Proto, out: &mut String) {
    match &proto.name {
        Some(name) => {
            let _ = writeln!(out, "-- function {} --", name);
        }
        None => {
            let _ = writeln!(out, "-- function --");
        }
    }
    for (pc, ins) in proto.ins.iter().enumerate() {
        write_ins(proto, pc, *ins, out);
    }
    for k in &proto.k {
        if k.is_fn() {
            let _ = writeln!(out);
            write_proto(unsafe { k.as_proto() }, out);
        }
    }
}

fn write_ins(proto: &Proto, pc: usize, ins: BcIns, out: &mut String) {
    let op = ins.op();
    let _ = write!(out, "{:04}\t{}", pc, op.mnemonic());
    match op {
        Op::Nop | Op::Ret0 => {}
        Op::Jmp => {
            let target = pc as i64 + (ins.e_arg() as i64 - JMP_BIAS as i64);
            let _ = write!(out, "\t=> {:04}", target);
        }
        Op::Ret1 => {
            let _ = write!(out, "\t{}", ins.e_arg());
        }
        Op::Assert | Op::IsT | Op::IsF => {
            let _ = write!(out, "\t{}", ins.d());
        }
        Op::Call
        | Op::Concat
        | Op::Pow
        | Op::AddVV
        | Op::SubVV
        | Op::MulVV
        | Op::DivVV
        | Op::ModVV
        | Op::AddVN
        | Op::SubVN
        | Op::MulVN
        | Op::DivVN
        | Op::ModVN
        | Op::SubNV
        | Op::DivNV
        | Op::ModNV => {
            let _ = write!(out, "\t{}\t{}\t{}", ins.a(), ins.b(), ins.c());
        }
        _ => {
            let _ = write!(out, "\t{}\t{}", ins.a(), ins.d());
        }
    }
    write_comment(proto, ins, out);
    let _ = writeln!(out);
}

fn write_comment(proto: &Proto, ins: BcIns, out: &mut String) {
    match ins.op() {
        Op::KNum | Op::EqVN | Op::NeqVN | Op::LtVN | Op::LeVN | Op::GtVN | Op::GeVN => {
            let k = proto.k[ins.d() as usize];
            let _ = write!(out, "\t; {}", k.as_num());
        }
        Op::KStr | Op::EqVS | Op::NeqVS => {
            let k = proto.k[ins.d() as usize];
            let s = unsafe { k.as_str_obj() };
            let _ = write!(out, "\t; \"{}\"", s.to_string_lossy());
        }
        Op::KPrim | Op::EqVP | Op::NeqVP => {
            let _ = write!(out, "\t; {}", prim_name(ins.d()));
        }
        Op::AddVN | Op::SubVN | Op::MulVN | Op::DivVN | Op::ModVN => {
            let k = proto.k[ins.c() as usize];
            let _ = write!(out, "\t; {}", k.as_num());
        }
        Op::SubNV | Op::DivNV | Op::ModNV => {
            let k = proto.k[ins.b() as usize];
            let _ = write!(out, "\t; {}", k.as_num());
        }
        _ => {}
    }
}

fn prim_name(tag: u16) -> &'static str {
    use crate::value::{TAG_FALSE, TAG_NIL, TAG_TRUE};
    match tag {
        t if t == TAG_NIL => "nil",
        t if t == TAG_FALSE => "false",
        t if t == TAG_TRUE => "true",
        _ => "?",
    }
}
