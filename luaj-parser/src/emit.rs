// luaj-parser - Reader, lexer, and bytecode compiler for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Expression emission: demand-driven materialisation of descriptors into
//! stack slots, constant folding, operand-form selection (`VV`/`VN`/`NV`),
//! and the short-circuit branch emitters behind `and`/`or`.

use luaj_core::{
    num_mod, num_pow, BcIns, Heap, Op, Result, NO_SLOT, TAG_FALSE, TAG_NIL, TAG_TRUE,
};

use crate::expr::{ExpDesc, ExpKind, NO_JMP};
use crate::func::FuncState;

/// Binary operators, ordered by parse dispatch rather than precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Precedence of unary operators; `^` on the right binds tighter, so
/// `-x^2` parses as `-(x^2)`.
pub(crate) const UNARY_PREC: u8 = 7;

impl BinOp {
    /// Binding power, low to high.
    pub fn prec(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 3,
            BinOp::Concat => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
            BinOp::Pow => 8,
        }
    }

    pub fn right_assoc(self) -> bool {
        matches!(self, BinOp::Pow | BinOp::Concat)
    }

    /// Mirror an ordered comparison for swapped operands.
    fn swapped(self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            op => op,
        }
    }

    fn fold_arith(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Mod => num_mod(a, b),
            BinOp::Pow => num_pow(a, b),
            _ => unreachable!("not an arithmetic operator"),
        }
    }

    fn vv_op(self) -> Op {
        match self {
            BinOp::Add => Op::AddVV,
            BinOp::Sub => Op::SubVV,
            BinOp::Mul => Op::MulVV,
            BinOp::Div => Op::DivVV,
            BinOp::Mod => Op::ModVV,
            BinOp::Pow => Op::Pow,
            _ => unreachable!("no VV form"),
        }
    }

    fn vn_op(self) -> Op {
        match self {
            BinOp::Add => Op::AddVN,
            BinOp::Sub => Op::SubVN,
            BinOp::Mul => Op::MulVN,
            BinOp::Div => Op::DivVN,
            BinOp::Mod => Op::ModVN,
            _ => unreachable!("no VN form"),
        }
    }

    fn nv_op(self) -> Op {
        match self {
            BinOp::Sub => Op::SubNV,
            BinOp::Div => Op::DivNV,
            BinOp::Mod => Op::ModNV,
            _ => unreachable!("no NV form"),
        }
    }

    fn cmp_vv_op(self) -> Op {
        match self {
            BinOp::Lt => Op::LtVV,
            BinOp::Le => Op::LeVV,
            BinOp::Gt => Op::GtVV,
            BinOp::Ge => Op::GeVV,
            _ => unreachable!("not an ordered comparison"),
        }
    }

    fn cmp_vn_op(self) -> Op {
        match self {
            BinOp::Lt => Op::LtVN,
            BinOp::Le => Op::LeVN,
            BinOp::Gt => Op::GtVN,
            BinOp::Ge => Op::GeVN,
            _ => unreachable!("not an ordered comparison"),
        }
    }
}

impl FuncState {
    /// Normalise variable and call descriptors to `NonReloc`: a local
    /// references its own slot, a call its base slot.
    pub fn discharge(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Local(slot) => e.kind = ExpKind::NonReloc(slot),
            ExpKind::Call(pc) => {
                let base = self.proto.ins[pc].a();
                e.kind = ExpKind::NonReloc(base);
            }
            ExpKind::Assert(pc) => {
                let slot = self.proto.ins[pc].d() as u8;
                e.kind = ExpKind::NonReloc(slot);
            }
            _ => {}
        }
    }

    /// Release the slot held by a materialised temporary.
    pub fn free_expr(&mut self, e: &ExpDesc) {
        if let ExpKind::NonReloc(slot) = e.kind {
            self.free_slot(slot);
        }
    }

    fn free_two_slots(&mut self, a: u8, b: u8) {
        let (hi, lo) = if a > b { (a, b) } else { (b, a) };
        self.free_slot(hi);
        if lo != hi {
            self.free_slot(lo);
        }
    }

    /// Emit the minimal instruction putting `e`'s value into `dst`, leaving
    /// jump lists untouched.
    fn discharge_to_slot(&mut self, heap: &mut Heap, e: &mut ExpDesc, dst: u8) -> Result<()> {
        self.discharge(e);
        match std::mem::replace(&mut e.kind, ExpKind::Void) {
            ExpKind::Prim(tag) => {
                self.emit(BcIns::ad(Op::KPrim, dst, tag));
            }
            ExpKind::Num(n) => {
                let i = n as i16;
                if (i as f64).to_bits() == n.to_bits() {
                    self.emit(BcIns::ad(Op::KInt, dst, i as u16));
                } else {
                    let idx = self.const_num(n)?;
                    self.emit(BcIns::ad(Op::KNum, dst, idx));
                }
            }
            ExpKind::Str(s) => {
                let idx = self.const_str(heap, &s)?;
                self.emit(BcIns::ad(Op::KStr, dst, idx));
            }
            ExpKind::NonReloc(slot) => {
                if slot != dst {
                    self.emit(BcIns::ad(Op::Mov, dst, slot as u16));
                }
            }
            ExpKind::Reloc(pc) => {
                self.proto.ins[pc].set_a(dst);
            }
            ExpKind::Jmp(pc) => {
                // Handled by to_slot; put the kind back.
                e.kind = ExpKind::Jmp(pc);
                return Ok(());
            }
            kind => {
                debug_assert!(false, "cannot discharge {:?}", kind);
            }
        }
        e.kind = ExpKind::NonReloc(dst);
        Ok(())
    }

    /// Force the expression's value into slot `dst`, synthesising true and
    /// false tail blocks when a pending jump carries no value.
    pub fn to_slot(&mut self, heap: &mut Heap, e: &mut ExpDesc, dst: u8) -> Result<()> {
        let was_jmp = matches!(e.kind, ExpKind::Jmp(_));
        self.discharge_to_slot(heap, e, dst)?;
        if let ExpKind::Jmp(pc) = e.kind {
            // The branch itself joins the true list.
            e.true_list = self.append_jmp(e.true_list, pc as i32)?;
        }
        if e.has_jumps() {
            let mut jfalse = NO_JMP;
            let mut jtrue = NO_JMP;
            if self.needs_fall_through(e.true_list) || self.needs_fall_through(e.false_list) {
                let jval = if was_jmp { NO_JMP } else { self.emit_jmp() };
                jfalse = self.pc() as i32;
                self.emit(BcIns::ad(Op::KPrim, dst, TAG_FALSE));
                let jskip = self.emit_jmp();
                jtrue = self.pc() as i32;
                self.emit(BcIns::ad(Op::KPrim, dst, TAG_TRUE));
                let end = self.pc() as i32;
                if jval != NO_JMP {
                    self.patch_jmp(jval, end)?;
                }
                self.patch_jmp(jskip, end)?;
            }
            let end = self.pc() as i32;
            self.patch_jmps_and_vals(e.false_list, jfalse, Some(dst), end)?;
            self.patch_jmps_and_vals(e.true_list, jtrue, Some(dst), end)?;
        }
        e.true_list = NO_JMP;
        e.false_list = NO_JMP;
        e.kind = ExpKind::NonReloc(dst);
        Ok(())
    }

    /// Free the expression's slot if it is a temporary top, then force the
    /// value into a fresh slot.
    pub fn to_next_slot(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<u8> {
        self.discharge(e);
        self.free_expr(e);
        let slot = self.reserve_slots(1)? as u8;
        self.to_slot(heap, e, slot)?;
        Ok(slot)
    }

    /// Put the value into some slot, preferring one it already occupies.
    pub fn to_any_slot(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<u8> {
        self.discharge(e);
        if let ExpKind::NonReloc(slot) = e.kind {
            if !e.has_jumps() {
                return Ok(slot);
            }
            if slot as u32 >= self.num_locals {
                self.to_slot(heap, e, slot)?;
                return Ok(slot);
            }
        }
        self.to_next_slot(heap, e)
    }

    /// Pool index for a numeric constant when it fits an 8-bit operand.
    fn inline_uint8_num(&mut self, n: f64) -> Result<Option<u8>> {
        let idx = self.const_num(n)?;
        Ok(if idx <= 0xff { Some(idx as u8) } else { None })
    }

    // ---- Unary operators ----

    /// Emit unary minus, folding numeric constants.
    pub fn emit_neg(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<()> {
        if let ExpKind::Num(n) = e.kind {
            if !e.has_jumps() {
                e.kind = ExpKind::Num(-n);
                return Ok(());
            }
        }
        let slot = self.to_any_slot(heap, e)?;
        self.free_expr(e);
        let pc = self.emit(BcIns::ad(Op::Neg, NO_SLOT, slot as u16));
        e.kind = ExpKind::Reloc(pc);
        Ok(())
    }

    /// Emit `not`, folding constants and inverting pending branches.
    pub fn emit_not(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<()> {
        std::mem::swap(&mut e.true_list, &mut e.false_list);
        self.drop_vals(e.true_list);
        self.drop_vals(e.false_list);
        match e.kind.clone() {
            ExpKind::Prim(tag) if tag == TAG_NIL || tag == TAG_FALSE => {
                e.kind = ExpKind::Prim(TAG_TRUE);
            }
            ExpKind::Prim(_) | ExpKind::Num(_) | ExpKind::Str(_) => {
                e.kind = ExpKind::Prim(TAG_FALSE);
            }
            ExpKind::Jmp(pc) => {
                self.invert_cond(pc);
            }
            _ => {
                let slot = self.to_any_slot(heap, e)?;
                self.free_expr(e);
                let pc = self.emit(BcIns::ad(Op::Not, NO_SLOT, slot as u16));
                e.kind = ExpKind::Reloc(pc);
            }
        }
        Ok(())
    }

    /// Invert the comparison or test paired with the jump at `jmp_pc`.
    fn invert_cond(&mut self, jmp_pc: usize) {
        let ins = &mut self.proto.ins[jmp_pc - 1];
        let inverted = ins.op().invert();
        ins.set_op(inverted);
    }

    // ---- Short-circuit branches ----

    /// Emit a branch that fires when `e` is false, extending `false_list`;
    /// used for the left operand of `and`. The true list falls through.
    pub fn emit_branch_true(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<()> {
        self.discharge(e);
        let j = match e.kind {
            ExpKind::Num(_) | ExpKind::Str(_) => NO_JMP,
            ExpKind::Prim(tag) if tag == TAG_TRUE => NO_JMP,
            ExpKind::Prim(_) => {
                // Always false: load the constant with an open destination
                // so the unconditional jump carries it as its value.
                self.discharge_to_slot(heap, e, NO_SLOT)?;
                self.emit_jmp()
            }
            ExpKind::Jmp(pc) => {
                self.invert_cond(pc);
                pc as i32
            }
            _ => self.emit_test_branch(heap, e, false)?,
        };
        e.false_list = self.append_jmp(e.false_list, j)?;
        self.patch_here(e.true_list)?;
        e.true_list = NO_JMP;
        Ok(())
    }

    /// Dual of `emit_branch_true`: fires on truth, extends `true_list`;
    /// used for the left operand of `or`.
    pub fn emit_branch_false(&mut self, heap: &mut Heap, e: &mut ExpDesc) -> Result<()> {
        self.discharge(e);
        let j = match e.kind {
            ExpKind::Prim(tag) if tag == TAG_NIL || tag == TAG_FALSE => NO_JMP,
            ExpKind::Num(_) | ExpKind::Str(_) | ExpKind::Prim(_) => {
                // Always true: the jump carries the constant as its value.
                self.discharge_to_slot(heap, e, NO_SLOT)?;
                self.emit_jmp()
            }
            ExpKind::Jmp(pc) => pc as i32,
            _ => self.emit_test_branch(heap, e, true)?,
        };
        e.true_list = self.append_jmp(e.true_list, j)?;
        self.patch_here(e.false_list)?;
        e.false_list = NO_JMP;
        Ok(())
    }

    /// Emit `ISTC`/`ISFC` with an open destination plus its `JMP`.
    fn emit_test_branch(&mut self, heap: &mut Heap, e: &mut ExpDesc, on_true: bool) -> Result<i32> {
        let slot = self.to_any_slot(heap, e)?;
        let op = if on_true { Op::IsTC } else { Op::IsFC };
        self.emit(BcIns::ad(op, NO_SLOT, slot as u16));
        let j = self.emit_jmp();
        self.free_expr(e);
        Ok(j)
    }

    // ---- Binary operators ----

    /// Prepare the left operand before the right-hand side is parsed.
    pub fn emit_binop_left(&mut self, heap: &mut Heap, op: BinOp, e: &mut ExpDesc) -> Result<()> {
        match op {
            BinOp::And => self.emit_branch_true(heap, e),
            BinOp::Or => self.emit_branch_false(heap, e),
            BinOp::Concat => {
                self.to_next_slot(heap, e)?;
                Ok(())
            }
            BinOp::Eq | BinOp::Neq => {
                if !e.is_const() {
                    self.to_any_slot(heap, e)?;
                }
                Ok(())
            }
            _ => {
                if !e.is_num_const() {
                    self.to_any_slot(heap, e)?;
                }
                Ok(())
            }
        }
    }

    /// Combine the operands after both sides are parsed; the result
    /// replaces `l`.
    pub fn emit_binop(
        &mut self,
        heap: &mut Heap,
        op: BinOp,
        l: &mut ExpDesc,
        mut r: ExpDesc,
    ) -> Result<()> {
        match op {
            BinOp::And => {
                debug_assert_eq!(l.true_list, NO_JMP, "left true list must fall through");
                r.false_list = self.append_jmp(r.false_list, l.false_list)?;
                *l = r;
                Ok(())
            }
            BinOp::Or => {
                debug_assert_eq!(l.false_list, NO_JMP, "left false list must fall through");
                r.true_list = self.append_jmp(r.true_list, l.true_list)?;
                *l = r;
                Ok(())
            }
            BinOp::Concat => self.emit_concat(heap, l, r),
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                self.emit_comp(heap, op, l, r)
            }
            _ => self.emit_arith(heap, op, l, r),
        }
    }

    fn emit_arith(
        &mut self,
        heap: &mut Heap,
        op: BinOp,
        l: &mut ExpDesc,
        mut r: ExpDesc,
    ) -> Result<()> {
        if l.is_num_const() && r.is_num_const() {
            if let (ExpKind::Num(a), ExpKind::Num(b)) = (&l.kind, &r.kind) {
                let folded = op.fold_arith(*a, *b);
                l.kind = ExpKind::Num(folded);
                return Ok(());
            }
        }

        if op == BinOp::Pow {
            // No inline constants for '^'.
            let rc = self.to_any_slot(heap, &mut r)?;
            let rb = self.to_any_slot(heap, l)?;
            self.free_two_slots(rb, rc);
            let pc = self.emit(BcIns::abc(Op::Pow, NO_SLOT, rb, rc));
            l.kind = ExpKind::Reloc(pc);
            return Ok(());
        }

        if l.is_num_const() && matches!(op, BinOp::Sub | BinOp::Div | BinOp::Mod) {
            if let ExpKind::Num(n) = l.kind {
                // Left constant of a non-commutative op: NV form. A constant
                // left of `+` or `*` has no NV encoding and falls through to
                // a slot below, keeping the operands in source order so a
                // runtime type error names them as written.
                if let Some(b_idx) = self.inline_uint8_num(n)? {
                    let rc = self.to_any_slot(heap, &mut r)?;
                    self.free_expr(&r);
                    let pc = self.emit(BcIns::abc(op.nv_op(), NO_SLOT, b_idx, rc));
                    l.kind = ExpKind::Reloc(pc);
                    return Ok(());
                }
            }
        }

        if let ExpKind::Num(n) = r.kind {
            if r.is_num_const() {
                if let Some(c_idx) = self.inline_uint8_num(n)? {
                    let rb = self.to_any_slot(heap, l)?;
                    self.free_expr(l);
                    let pc = self.emit(BcIns::abc(op.vn_op(), NO_SLOT, rb, c_idx));
                    l.kind = ExpKind::Reloc(pc);
                    return Ok(());
                }
            }
        }

        let rc = self.to_any_slot(heap, &mut r)?;
        let rb = self.to_any_slot(heap, l)?;
        self.free_two_slots(rb, rc);
        let pc = self.emit(BcIns::abc(op.vv_op(), NO_SLOT, rb, rc));
        l.kind = ExpKind::Reloc(pc);
        Ok(())
    }

    fn emit_comp(
        &mut self,
        heap: &mut Heap,
        op: BinOp,
        l: &mut ExpDesc,
        mut r: ExpDesc,
    ) -> Result<()> {
        // Fold closed comparisons: equality over any constants, ordered
        // comparisons over numbers.
        if l.is_const() && r.is_const() {
            let folded = match op {
                BinOp::Eq | BinOp::Neq => {
                    let eq = const_equal(&l.kind, &r.kind);
                    Some(if op == BinOp::Eq { eq } else { !eq })
                }
                _ => match (&l.kind, &r.kind) {
                    (ExpKind::Num(a), ExpKind::Num(b)) => Some(match op {
                        BinOp::Lt => a < b,
                        BinOp::Le => a <= b,
                        BinOp::Gt => a > b,
                        BinOp::Ge => a >= b,
                        _ => unreachable!(),
                    }),
                    _ => None,
                },
            };
            if let Some(res) = folded {
                l.kind = ExpKind::Prim(if res { TAG_TRUE } else { TAG_FALSE });
                l.true_list = NO_JMP;
                l.false_list = NO_JMP;
                return Ok(());
            }
        }

        let j = if op == BinOp::Eq || op == BinOp::Neq {
            if l.is_const() {
                std::mem::swap(l, &mut r);
            }
            let ra = self.to_any_slot(heap, l)?;
            let (base_op, d, freed_both) = if r.has_jumps() || !r.is_const() {
                let rd = self.to_any_slot(heap, &mut r)?;
                (Op::EqVV, rd as u16, true)
            } else {
                match r.kind.clone() {
                    ExpKind::Prim(tag) => (Op::EqVP, tag, false),
                    ExpKind::Num(n) => (Op::EqVN, self.const_num(n)?, false),
                    ExpKind::Str(s) => (Op::EqVS, self.const_str(heap, &s)?, false),
                    _ => unreachable!("constant expected"),
                }
            };
            if freed_both {
                self.free_two_slots(ra, d as u8);
            } else {
                self.free_slot(ra);
            }
            let emit_op = if op == BinOp::Neq { base_op.invert() } else { base_op };
            self.emit(BcIns::ad(emit_op, ra, d));
            self.emit_jmp()
        } else {
            let mut cop = op;
            if l.is_num_const() {
                // Put the slot operand on the left, mirroring the operator.
                std::mem::swap(l, &mut r);
                cop = cop.swapped();
            }
            let ra = self.to_any_slot(heap, l)?;
            let (cmp_op, d, freed_both) = if r.is_num_const() {
                if let ExpKind::Num(n) = r.kind {
                    (cop.cmp_vn_op(), self.const_num(n)?, false)
                } else {
                    unreachable!()
                }
            } else {
                let rd = self.to_any_slot(heap, &mut r)?;
                (cop.cmp_vv_op(), rd as u16, true)
            };
            if freed_both {
                self.free_two_slots(ra, d as u8);
            } else {
                self.free_slot(ra);
            }
            self.emit(BcIns::ad(cmp_op, ra, d));
            self.emit_jmp()
        };
        l.kind = ExpKind::Jmp(j as usize);
        Ok(())
    }

    fn emit_concat(&mut self, heap: &mut Heap, l: &mut ExpDesc, mut r: ExpDesc) -> Result<()> {
        if r.has_jumps() {
            self.to_any_slot(heap, &mut r)?;
        }
        let l_slot = match l.kind {
            ExpKind::NonReloc(slot) => slot,
            _ => unreachable!("left concat operand must be in its slot"),
        };
        if let ExpKind::Reloc(pc) = r.kind {
            // Fuse a chained concat into one instruction over the whole
            // slot range.
            if self.proto.ins[pc].op() == Op::Concat && self.proto.ins[pc].b() == l_slot + 1 {
                self.free_slot(l_slot);
                self.proto.ins[pc].set_b(l_slot);
                l.kind = ExpKind::Reloc(pc);
                return Ok(());
            }
        }
        let r_slot = self.to_next_slot(heap, &mut r)?;
        self.free_slot(r_slot);
        self.free_slot(l_slot);
        let pc = self.emit(BcIns::abc(Op::Concat, NO_SLOT, l_slot, r_slot));
        l.kind = ExpKind::Reloc(pc);
        Ok(())
    }

    /// Write nil into `n` slots starting at `first`.
    pub fn emit_nil(&mut self, first: u8, n: u32) {
        if n == 1 {
            self.emit(BcIns::ad(Op::KPrim, first, TAG_NIL));
        } else {
            let last = first as u32 + n - 1;
            self.emit(BcIns::ad(Op::KNil, first, last as u16));
        }
    }
}

fn const_equal(a: &ExpKind, b: &ExpKind) -> bool {
    match (a, b) {
        (ExpKind::Num(a), ExpKind::Num(b)) => a == b,
        (ExpKind::Prim(a), ExpKind::Prim(b)) => a == b,
        (ExpKind::Str(a), ExpKind::Str(b)) => a == b,
        _ => false,
    }
}
