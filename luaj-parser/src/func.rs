// luaj-parser - Reader, lexer, and bytecode compiler for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Per-function compilation state: the prototype under construction, the
//! register allocator, locals, block scopes, the constant pool, and the
//! jump-list machinery.
//!
//! Jump lists are singly-linked lists threaded through the E fields of
//! unpatched `JMP` instructions: an E of zero marks the list tail, anything
//! else is the biased offset to the next `JMP` in the list. List heads are
//! plain instruction indices with `NO_JMP` as the empty list.

use std::rc::Rc;

use luaj_core::{BcIns, Error, Heap, Op, Proto, Result, Value, JMP_BIAS, NO_SLOT};

use crate::expr::NO_JMP;

/// Upper bound on declared locals per function; slot 0xff is reserved as
/// the relocation sentinel.
pub(crate) const MAX_LOCALS: u32 = 255;

/// Upper bound on constant-pool entries; indices must fit 16 bits.
pub(crate) const MAX_CONSTS: usize = 1 << 16;

/// A lexical block. Loops carry the pending jump list of their `break`s.
#[derive(Debug)]
pub(crate) struct BlockScope {
    pub first_local: u32,
    pub is_loop: bool,
    pub breaks: i32,
}

/// Compilation state for one function scope.
pub(crate) struct FuncState {
    pub proto: Proto,
    pub chunk_name: Rc<str>,
    /// Source position driving `line_info` and emitter errors.
    pub line: u32,
    pub col: u32,
    /// Live register top. Between statements this equals `num_locals`.
    pub num_stack: u32,
    /// Committed local variables, slot-indexed by declaration order.
    pub num_locals: u32,
    pub locals: Vec<String>,
    pub blocks: Vec<BlockScope>,
}

impl FuncState {
    pub fn new(proto: Proto, chunk_name: Rc<str>, line: u32) -> FuncState {
        FuncState {
            proto,
            chunk_name,
            line,
            col: 1,
            num_stack: 0,
            num_locals: 0,
            locals: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn syntax_err(&self, msg: impl Into<String>) -> Error {
        Error::syntax(&*self.chunk_name, self.line, self.col, msg)
    }

    /// Append an instruction at the current source line; returns its PC.
    pub fn emit(&mut self, ins: BcIns) -> usize {
        self.proto.emit(ins, self.line)
    }

    /// PC of the next instruction to be emitted.
    pub fn pc(&self) -> usize {
        self.proto.pc()
    }

    // ---- Registers ----

    /// Reserve `n` fresh slots; returns the first.
    pub fn reserve_slots(&mut self, n: u32) -> Result<u32> {
        if self.num_stack + n > MAX_LOCALS {
            return Err(self.syntax_err("function or expression too complex"));
        }
        let first = self.num_stack;
        self.num_stack += n;
        Ok(first)
    }

    /// Release a slot if it is a temporary. Only the current top may be
    /// freed; locals are never reclaimed here.
    pub fn free_slot(&mut self, slot: u8) {
        if slot != NO_SLOT && (slot as u32) >= self.num_locals {
            self.num_stack -= 1;
            debug_assert_eq!(self.num_stack, slot as u32, "freed slot is not the stack top");
        }
    }

    // ---- Locals ----

    /// Fail early when declaring `n_new` more locals would blow the limit.
    /// Checked before their slots are reserved so the overflow reports as
    /// a locals problem rather than a register one.
    pub fn check_locals(&self, n_new: u32) -> Result<()> {
        if self.num_locals + n_new > MAX_LOCALS {
            return Err(self.syntax_err("too many local variables in function"));
        }
        Ok(())
    }

    /// Commit a new local over an already-reserved slot.
    pub fn register_local(&mut self, name: String) -> Result<()> {
        if self.num_locals >= MAX_LOCALS {
            return Err(self.syntax_err("too many local variables in function"));
        }
        self.locals.push(name);
        self.num_locals += 1;
        Ok(())
    }

    /// Resolve a name against the locals, innermost declaration first.
    pub fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals[..self.num_locals as usize]
            .iter()
            .rposition(|l| l == name)
            .map(|slot| slot as u8)
    }

    // ---- Constant pool ----

    fn check_k_space(&self) -> Result<()> {
        if self.proto.k.len() >= MAX_CONSTS {
            return Err(self.syntax_err("too many constants in function"));
        }
        Ok(())
    }

    /// Pool index for a number, deduplicated by bit pattern.
    pub fn const_num(&mut self, n: f64) -> Result<u16> {
        let bits = n.to_bits();
        for (i, k) in self.proto.k.iter().enumerate() {
            if k.is_num() && k.as_num().to_bits() == bits {
                return Ok(i as u16);
            }
        }
        self.check_k_space()?;
        Ok(self.proto.add_k(Value::num(n)) as u16)
    }

    /// Pool index for a string, deduplicated by contents.
    pub fn const_str(&mut self, heap: &mut Heap, s: &str) -> Result<u16> {
        for (i, k) in self.proto.k.iter().enumerate() {
            if k.is_str() && unsafe { k.as_str_obj() }.as_bytes() == s.as_bytes() {
                return Ok(i as u16);
            }
        }
        self.check_k_space()?;
        let v = heap.alloc_str(s.as_bytes());
        Ok(self.proto.add_k(v) as u16)
    }

    /// Pool index for a nested prototype. Never deduplicated.
    pub fn const_proto(&mut self, v: Value) -> Result<u16> {
        self.check_k_space()?;
        Ok(self.proto.add_k(v) as u16)
    }

    // ---- Jump lists ----

    /// Emit an unpatched `JMP`; returns its PC as a list head.
    pub fn emit_jmp(&mut self) -> i32 {
        self.emit(BcIns::e(Op::Jmp, 0)) as i32
    }

    /// Point the jump at `j` to `target`.
    pub fn patch_jmp(&mut self, j: i32, target: i32) -> Result<()> {
        let biased = target - j + JMP_BIAS;
        if !(1..=0xff_ffff).contains(&biased) {
            return Err(self.syntax_err("control structure too long"));
        }
        self.proto.ins[j as usize].set_e(biased as u32);
        Ok(())
    }

    /// The next PC in a jump list, or `NO_JMP` at the tail.
    pub fn follow_jmp(&self, j: i32) -> i32 {
        let e = self.proto.ins[j as usize].e_arg() as i32;
        if e == 0 {
            NO_JMP
        } else {
            j + (e - JMP_BIAS)
        }
    }

    /// Concatenate two jump lists; returns the new head.
    pub fn append_jmp(&mut self, head: i32, to_add: i32) -> Result<i32> {
        if to_add == NO_JMP {
            return Ok(head);
        }
        if head == NO_JMP {
            return Ok(to_add);
        }
        let mut tail = to_add;
        loop {
            let next = self.follow_jmp(tail);
            if next == NO_JMP {
                break;
            }
            tail = next;
        }
        self.patch_jmp(tail, head)?;
        Ok(to_add)
    }

    /// Patch every jump in the list to `target`, discarding any associated
    /// value instructions.
    pub fn patch_jmps(&mut self, head: i32, target: i32) -> Result<()> {
        self.patch_jmps_and_vals(head, target, None, target)
    }

    /// Patch every jump in the list to the current PC.
    pub fn patch_here(&mut self, head: i32) -> Result<()> {
        let pc = self.pc() as i32;
        self.patch_jmps(head, pc)
    }

    /// Patch a jump list, directing value-producing nodes separately.
    ///
    /// A node "carries a value" when the instruction before its `JMP` is a
    /// conditional copy (`ISTC`/`ISFC`) or a relocatable instruction with an
    /// unassigned destination. Such nodes have their value steered into
    /// `dst` and jump to `value_target`; with no destination the copy is
    /// demoted (`ISTC`→`IST`, `ISFC`→`ISF`, relocatables become `NOP`).
    /// Pure jumps go to `jump_target`.
    pub fn patch_jmps_and_vals(
        &mut self,
        head: i32,
        jump_target: i32,
        dst: Option<u8>,
        value_target: i32,
    ) -> Result<()> {
        let mut j = head;
        while j != NO_JMP {
            let next = self.follow_jmp(j);
            if self.patch_test_reg(j, dst) {
                self.patch_jmp(j, value_target)?;
            } else {
                self.patch_jmp(j, jump_target)?;
            }
            j = next;
        }
        Ok(())
    }

    /// Redirect the value produced before the jump at `j` into `dst`.
    /// Returns false when the preceding instruction produces no value.
    fn patch_test_reg(&mut self, j: i32, dst: Option<u8>) -> bool {
        let jp = j as usize;
        if jp == 0 {
            return false;
        }
        let prev = self.proto.ins[jp - 1];
        match prev.op() {
            Op::IsTC | Op::IsFC => {
                match dst {
                    Some(r) if r as u16 != prev.d() => {
                        self.proto.ins[jp - 1].set_a(r);
                    }
                    _ => {
                        // Nothing to store, or the value is already in place.
                        let op = if prev.op() == Op::IsTC { Op::IsT } else { Op::IsF };
                        self.proto.ins[jp - 1].set_op(op);
                        self.proto.ins[jp - 1].set_a(0);
                    }
                }
                true
            }
            op if op != Op::Jmp && prev.a() == NO_SLOT => {
                match dst {
                    Some(r) => self.proto.ins[jp - 1].set_a(r),
                    None => self.proto.ins[jp - 1] = BcIns::bare(Op::Nop),
                }
                true
            }
            _ => false,
        }
    }

    /// Demote the value instructions of every node in the list.
    pub fn drop_vals(&mut self, head: i32) {
        let mut j = head;
        while j != NO_JMP {
            let next = self.follow_jmp(j);
            self.patch_test_reg(j, None);
            j = next;
        }
    }

    /// True if any jump in the list is pure (carries no value), forcing the
    /// materialiser to synthesise true/false tail blocks.
    pub fn needs_fall_through(&self, head: i32) -> bool {
        let mut j = head;
        while j != NO_JMP {
            let pure = if j == 0 {
                true
            } else {
                let prev = self.proto.ins[j as usize - 1];
                !(matches!(prev.op(), Op::IsTC | Op::IsFC)
                    || (prev.op() != Op::Jmp && prev.a() == NO_SLOT))
            };
            if pure {
                return true;
            }
            j = self.follow_jmp(j);
        }
        false
    }
}
