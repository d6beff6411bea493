// luaj-vm - Bytecode interpreter and embedding API for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The interpreter loop.
//!
//! A single dispatch loop decodes and executes one instruction per
//! iteration. Conditional opcodes either fall into their paired `JMP` (the
//! predicate held) or step over it. Calls and returns switch the current
//! prototype, base, and instruction index in place; the call-info stack
//! records where to resume.

use luaj_core::{num_mod, num_pow, values_equal, Error, Op, Proto, Result, Value, JMP_BIAS};

use crate::frame::CallInfo;
use crate::state::State;

/// Addressable slots guaranteed to every frame.
const FRAME_SLOTS: usize = 256;

fn rt_err(proto: &Proto, pc: usize, msg: String) -> Error {
    Error::runtime(&*proto.chunk_name, proto.lines[pc], msg)
}

fn arith_verb(op: Op) -> &'static str {
    match op {
        Op::AddVV | Op::AddVN => "add",
        Op::SubVV | Op::SubVN | Op::SubNV => "subtract",
        Op::MulVV | Op::MulVN => "multiply",
        Op::DivVV | Op::DivVN | Op::DivNV => "divide",
        Op::ModVV | Op::ModVN | Op::ModNV => "modulo",
        Op::Pow => "exponentiate",
        _ => "perform arithmetic on",
    }
}

fn apply_arith(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::AddVV | Op::AddVN => a + b,
        Op::SubVV | Op::SubVN | Op::SubNV => a - b,
        Op::MulVV | Op::MulVN => a * b,
        Op::DivVV | Op::DivVN | Op::DivNV => a / b,
        Op::ModVV | Op::ModVN | Op::ModNV => num_mod(a, b),
        Op::Pow => num_pow(a, b),
        _ => unreachable!("not an arithmetic opcode"),
    }
}

impl State {
    /// Call the function at `stack[top - n_args - 1]` with the `n_args`
    /// values above it, expecting `n_results` back in its place.
    pub fn call(&mut self, n_args: usize, n_results: usize) -> Result<()> {
        let top = self.stack.top();
        if top < n_args + 1 {
            return Err(Error::runtime("?", 0, "not enough values on the stack"));
        }
        let fn_idx = top - n_args - 1;
        let callee = self.stack.get(fn_idx);
        if !callee.is_fn() {
            return Err(Error::runtime(
                "?",
                0,
                format!("attempt to call a {} value", callee.type_name()),
            ));
        }
        let base = fn_idx + 1;
        self.stack.ensure(base + FRAME_SLOTS);
        let num_params = unsafe { callee.as_proto() }.num_params as usize;
        for i in n_args..num_params {
            self.stack.set(base + i, Value::NIL);
        }
        self.run(callee, base, n_results)
    }

    fn run(&mut self, entry: Value, entry_base: usize, expected: usize) -> Result<()> {
        let floor = self.calls.len();
        let mut fn_val = entry;
        let mut proto: &Proto = unsafe { fn_val.as_proto() };
        let mut base = entry_base;
        let mut pc: usize = 0;

        loop {
            let ins = proto.ins[pc];
            let ins_pc = pc;
            pc += 1;
            let op = ins.op();
            match op {
                Op::Nop => {}

                // ---- Storage ----
                Op::Mov => {
                    let v = self.stack.get(base + ins.d() as usize);
                    self.stack.set(base + ins.a() as usize, v);
                }
                Op::KPrim => {
                    self.stack.set(base + ins.a() as usize, Value::prim(ins.d()));
                }
                Op::KInt => {
                    let n = ins.d() as i16 as f64;
                    self.stack.set(base + ins.a() as usize, Value::num(n));
                }
                Op::KNum | Op::KStr | Op::KFn => {
                    let v = proto.k[ins.d() as usize];
                    self.stack.set(base + ins.a() as usize, v);
                }
                Op::KNil => {
                    for i in ins.a() as usize..=ins.d() as usize {
                        self.stack.set(base + i, Value::NIL);
                    }
                }

                // ---- Arithmetic ----
                Op::Neg => {
                    let v = self.stack.get(base + ins.d() as usize);
                    if !v.is_num() {
                        return Err(rt_err(
                            proto,
                            ins_pc,
                            format!("attempt to negate a {} value", v.type_name()),
                        ));
                    }
                    self.stack.set(base + ins.a() as usize, Value::num(-v.as_num()));
                }
                Op::AddVV | Op::SubVV | Op::MulVV | Op::DivVV | Op::ModVV | Op::Pow => {
                    let vb = self.stack.get(base + ins.b() as usize);
                    let vc = self.stack.get(base + ins.c() as usize);
                    if !vb.is_num() || !vc.is_num() {
                        return Err(arith_type_err(proto, ins_pc, op, vb, vc));
                    }
                    let r = apply_arith(op, vb.as_num(), vc.as_num());
                    self.stack.set(base + ins.a() as usize, Value::num(r));
                }
                Op::AddVN | Op::SubVN | Op::MulVN | Op::DivVN | Op::ModVN => {
                    let vb = self.stack.get(base + ins.b() as usize);
                    let vc = proto.k[ins.c() as usize];
                    if !vb.is_num() {
                        return Err(arith_type_err(proto, ins_pc, op, vb, vc));
                    }
                    let r = apply_arith(op, vb.as_num(), vc.as_num());
                    self.stack.set(base + ins.a() as usize, Value::num(r));
                }
                Op::SubNV | Op::DivNV | Op::ModNV => {
                    let vb = proto.k[ins.b() as usize];
                    let vc = self.stack.get(base + ins.c() as usize);
                    if !vc.is_num() {
                        return Err(arith_type_err(proto, ins_pc, op, vb, vc));
                    }
                    let r = apply_arith(op, vb.as_num(), vc.as_num());
                    self.stack.set(base + ins.a() as usize, Value::num(r));
                }
                Op::Concat => {
                    let mut bytes = Vec::new();
                    for i in ins.b() as usize..=ins.c() as usize {
                        let v = self.stack.get(base + i);
                        if !v.is_str() {
                            return Err(rt_err(
                                proto,
                                ins_pc,
                                format!("attempt to concatenate a {} value", v.type_name()),
                            ));
                        }
                        bytes.extend_from_slice(unsafe { v.as_str_obj() }.as_bytes());
                    }
                    let s = self.heap.alloc_str(&bytes);
                    self.stack.set(base + ins.a() as usize, s);
                }

                // ---- Conditions ----
                Op::Not => {
                    let v = self.stack.get(base + ins.d() as usize);
                    self.stack
                        .set(base + ins.a() as usize, Value::bool(!v.compares_true()));
                }
                Op::Assert => {
                    let v = self.stack.get(base + ins.d() as usize);
                    if !v.compares_true() {
                        return Err(rt_err(proto, ins_pc, "assertion failed!".to_string()));
                    }
                }
                Op::IsT => {
                    if !self.stack.get(base + ins.d() as usize).compares_true() {
                        pc += 1;
                    }
                }
                Op::IsF => {
                    if self.stack.get(base + ins.d() as usize).compares_true() {
                        pc += 1;
                    }
                }
                Op::IsTC => {
                    let v = self.stack.get(base + ins.d() as usize);
                    if v.compares_true() {
                        self.stack.set(base + ins.a() as usize, v);
                    } else {
                        pc += 1;
                    }
                }
                Op::IsFC => {
                    let v = self.stack.get(base + ins.d() as usize);
                    if !v.compares_true() {
                        self.stack.set(base + ins.a() as usize, v);
                    } else {
                        pc += 1;
                    }
                }
                Op::EqVV | Op::NeqVV | Op::EqVP | Op::NeqVP | Op::EqVN | Op::NeqVN | Op::EqVS
                | Op::NeqVS => {
                    let va = self.stack.get(base + ins.a() as usize);
                    let vd = match op {
                        Op::EqVV | Op::NeqVV => self.stack.get(base + ins.d() as usize),
                        Op::EqVP | Op::NeqVP => Value::prim(ins.d()),
                        _ => proto.k[ins.d() as usize],
                    };
                    let eq = values_equal(va, vd);
                    let pred = match op {
                        Op::EqVV | Op::EqVP | Op::EqVN | Op::EqVS => eq,
                        _ => !eq,
                    };
                    if !pred {
                        pc += 1;
                    }
                }
                Op::LtVV | Op::LeVV | Op::GtVV | Op::GeVV | Op::LtVN | Op::LeVN | Op::GtVN
                | Op::GeVN => {
                    let va = self.stack.get(base + ins.a() as usize);
                    let vd = match op {
                        Op::LtVN | Op::LeVN | Op::GtVN | Op::GeVN => proto.k[ins.d() as usize],
                        _ => self.stack.get(base + ins.d() as usize),
                    };
                    if !va.is_num() || !vd.is_num() {
                        return Err(rt_err(
                            proto,
                            ins_pc,
                            format!(
                                "attempt to compare a {} and {} value",
                                va.type_name(),
                                vd.type_name()
                            ),
                        ));
                    }
                    let (a, d) = (va.as_num(), vd.as_num());
                    let pred = match op {
                        Op::LtVV | Op::LtVN => a < d,
                        Op::LeVV | Op::LeVN => a <= d,
                        Op::GtVV | Op::GtVN => a > d,
                        _ => a >= d,
                    };
                    if !pred {
                        pc += 1;
                    }
                }

                // ---- Control flow ----
                Op::Jmp => {
                    pc = (ins_pc as i64 + (ins.e_arg() as i64 - JMP_BIAS as i64)) as usize;
                }
                Op::Call => {
                    let a = ins.a() as usize;
                    let n_args = ins.b() as usize;
                    let callee = self.stack.get(base + a);
                    if !callee.is_fn() {
                        return Err(rt_err(
                            proto,
                            ins_pc,
                            format!("attempt to call a {} value", callee.type_name()),
                        ));
                    }
                    self.calls.push(CallInfo {
                        proto: fn_val,
                        return_pc: pc,
                        return_base: base,
                        expected: ins.c(),
                    });
                    fn_val = callee;
                    proto = unsafe { fn_val.as_proto() };
                    base = base + a + 1;
                    pc = 0;
                    self.stack.ensure(base + FRAME_SLOTS);
                    // Missing arguments read as nil.
                    for i in n_args..proto.num_params as usize {
                        self.stack.set(base + i, Value::NIL);
                    }
                }
                Op::Ret0 | Op::Ret1 | Op::Ret => {
                    let (first, n) = match op {
                        Op::Ret0 => (0, 0),
                        Op::Ret1 => (ins.e_arg() as usize, 1),
                        _ => (ins.a() as usize, ins.d() as usize),
                    };
                    let ret_base = base - 1;
                    if self.calls.len() == floor {
                        // Top of this activation: hand the results back.
                        self.stack.ensure(ret_base + expected);
                        for i in 0..expected {
                            let v = if i < n {
                                self.stack.get(base + first + i)
                            } else {
                                Value::NIL
                            };
                            self.stack.set(ret_base + i, v);
                        }
                        self.stack.set_top(ret_base + expected);
                        return Ok(());
                    }
                    let ci = self.calls.pop().unwrap();
                    for i in 0..ci.expected as usize {
                        let v = if i < n {
                            self.stack.get(base + first + i)
                        } else {
                            Value::NIL
                        };
                        self.stack.set(ret_base + i, v);
                    }
                    fn_val = ci.proto;
                    proto = unsafe { fn_val.as_proto() };
                    base = ci.return_base;
                    pc = ci.return_pc;
                }
            }
        }
    }
}

fn arith_type_err(proto: &Proto, pc: usize, op: Op, a: Value, b: Value) -> Error {
    rt_err(
        proto,
        pc,
        format!(
            "attempt to {} a {} and {} value",
            arith_verb(op),
            a.type_name(),
            b.type_name()
        ),
    )
}
