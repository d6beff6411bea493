// luaj-parser - Reader, lexer, and bytecode compiler for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass recursive-descent parser and bytecode emitter.
//!
//! Statements and blocks are parsed by recursive descent; expressions by
//! Pratt precedence climbing. There is no AST: operand parsers produce
//! expression descriptors and the emitter lowers them to bytecode as
//! operators and statements consume them. Between any two statements the
//! register stack holds exactly the committed locals.

use std::rc::Rc;

use luaj_core::{BcIns, Error, Heap, Op, Proto, Result, Value, NO_SLOT, TAG_FALSE, TAG_NIL, TAG_TRUE};

use crate::emit::{BinOp, UNARY_PREC};
use crate::expr::{ExpDesc, ExpKind, NO_JMP};
use crate::func::{BlockScope, FuncState};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::reader::Reader;

/// Compile the chunk provided by `reader` into a function prototype value
/// allocated on `heap`.
pub fn parse(heap: &mut Heap, reader: Reader<'_>) -> Result<Value> {
    let lexer = Lexer::new(reader)?;
    let parser = Parser {
        chunk_name: lexer.chunk_name(),
        lexer,
        heap,
        fs: Vec::new(),
    };
    parser.parse_chunk()
}

struct Parser<'h, 'r> {
    lexer: Lexer<'r>,
    heap: &'h mut Heap,
    chunk_name: Rc<str>,
    fs: Vec<FuncState>,
}

impl<'h, 'r> Parser<'h, 'r> {
    // ---- Token plumbing ----

    fn parts(&mut self) -> (&mut FuncState, &mut Heap) {
        let fs = self.fs.last_mut().expect("no open function scope");
        (fs, &mut *self.heap)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.lexer.peek().kind
    }

    /// Consume the current token, keeping the emitter's source position in
    /// step for `line_info` and error messages.
    fn next(&mut self) -> Result<Token> {
        let tok = self.lexer.next()?;
        if let Some(fs) = self.fs.last_mut() {
            fs.line = tok.line;
            fs.col = tok.col;
        }
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.lexer.peek().kind.same_kind(&kind) {
            self.next()
        } else {
            self.lexer.expect(&kind)
        }
    }

    fn expect_sym(&mut self, c: u8) -> Result<Token> {
        self.expect(TokenKind::Sym(c))
    }

    fn expect_ident(&mut self) -> Result<(String, Token)> {
        let tok = self.expect(TokenKind::Ident(String::new()))?;
        match &tok.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                Ok((name, tok))
            }
            _ => unreachable!(),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.lexer.peek().kind.same_kind(kind)
    }

    fn check_sym(&self, c: u8) -> bool {
        self.check(&TokenKind::Sym(c))
    }

    fn accept(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.check(kind) {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn accept_sym(&mut self, c: u8) -> Result<bool> {
        self.accept(&TokenKind::Sym(c))
    }

    fn err_at(&self, line: u32, col: u32, msg: impl Into<String>) -> Error {
        Error::syntax(&*self.chunk_name, line, col, msg)
    }

    fn err_here(&self, msg: impl Into<String>) -> Error {
        let tok = self.lexer.peek();
        self.err_at(tok.line, tok.col, msg)
    }

    // ---- Function scopes ----

    fn open_func(&mut self, name: Option<String>, line: u32) {
        let proto = Proto::new(name.map(Rc::from), self.chunk_name.clone(), line);
        self.fs
            .push(FuncState::new(proto, self.chunk_name.clone(), line));
    }

    /// Freeze the innermost function: emit the fall-through return, record
    /// the end line, and move the prototype to the heap.
    fn close_func(&mut self, end_line: u32) -> Result<Value> {
        let (fs, _) = self.parts();
        fs.emit(BcIns::bare(Op::Ret0));
        let mut fs = self.fs.pop().unwrap();
        fs.proto.end_line = end_line;
        Ok(self.heap.alloc_proto(fs.proto))
    }

    fn enter_block(&mut self, is_loop: bool) {
        let (fs, _) = self.parts();
        fs.blocks.push(BlockScope {
            first_local: fs.num_locals,
            is_loop,
            breaks: NO_JMP,
        });
    }

    /// Pop the innermost block, retiring its locals; returns the pending
    /// `break` list for loop blocks.
    fn leave_block(&mut self) -> i32 {
        let (fs, _) = self.parts();
        let block = fs.blocks.pop().expect("no open block");
        fs.locals.truncate(block.first_local as usize);
        fs.num_locals = block.first_local;
        fs.num_stack = block.first_local;
        block.breaks
    }

    // ---- Entry point ----

    fn parse_chunk(mut self) -> Result<Value> {
        self.open_func(None, 1);
        self.parse_block()?;
        let end = self.lexer.peek().line;
        self.expect(TokenKind::Eof)?;
        self.close_func(end)
    }

    // ---- Statements ----

    fn block_follow(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::End
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    fn parse_block(&mut self) -> Result<()> {
        while !self.block_follow() {
            self.parse_statement()?;
            let (fs, _) = self.parts();
            debug_assert_eq!(
                fs.num_stack, fs.num_locals,
                "dangling temporaries after statement"
            );
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<()> {
        match self.peek_kind() {
            TokenKind::Local => self.parse_local(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Do => {
                self.next()?;
                self.enter_block(false);
                self.parse_block()?;
                self.leave_block();
                self.expect(TokenKind::End)?;
                Ok(())
            }
            TokenKind::Break => self.parse_break(),
            TokenKind::Return => self.parse_return(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_local(&mut self) -> Result<()> {
        self.next()?; // 'local'
        if self.check(&TokenKind::Function) {
            let fn_tok = self.next()?;
            let (name, _) = self.expect_ident()?;
            // Define the name before the body so it can call itself.
            let slot = {
                let (fs, _) = self.parts();
                fs.check_locals(1)?;
                let slot = fs.reserve_slots(1)? as u8;
                fs.register_local(name.clone())?;
                slot
            };
            let mut e = self.parse_function_body(Some(name), fn_tok.line, fn_tok.col)?;
            let (fs, heap) = self.parts();
            fs.to_slot(heap, &mut e, slot)?;
            return Ok(());
        }

        let mut names = Vec::new();
        names.push(self.expect_ident()?.0);
        while self.accept_sym(b',')? {
            names.push(self.expect_ident()?.0);
        }
        {
            let (fs, _) = self.parts();
            fs.check_locals(names.len() as u32)?;
        }
        let (n_exprs, last) = if self.accept_sym(b'=')? {
            self.parse_expr_list()?
        } else {
            (0, ExpDesc::new(ExpKind::Void, 0, 0))
        };
        // The names only become visible once the right-hand side has been
        // fully evaluated.
        self.adjust_assign(names.len(), n_exprs, last)?;
        let (fs, _) = self.parts();
        for name in names {
            fs.register_local(name)?;
        }
        debug_assert_eq!(fs.num_stack, fs.num_locals);
        Ok(())
    }

    /// Balance `n_vars` assignment targets against `n_exprs` evaluated
    /// expressions, leaving exactly `n_vars` values on the stack top.
    fn adjust_assign(&mut self, n_vars: usize, n_exprs: usize, mut e: ExpDesc) -> Result<()> {
        let (fs, heap) = self.parts();
        let extra = n_vars as i32 - n_exprs as i32;
        if let ExpKind::Call(pc) = e.kind {
            // A trailing call produces exactly the missing values.
            let rets = (extra + 1).max(0);
            fs.proto.ins[pc].set_c(rets as u8);
            if rets > 1 {
                fs.reserve_slots(rets as u32 - 1)?;
            }
        } else {
            if !matches!(e.kind, ExpKind::Void) {
                fs.to_next_slot(heap, &mut e)?;
            }
            if extra > 0 {
                let first = fs.reserve_slots(extra as u32)?;
                fs.emit_nil(first as u8, extra as u32);
            }
        }
        if n_exprs > n_vars {
            fs.num_stack -= (n_exprs - n_vars) as u32;
        }
        Ok(())
    }

    /// Parse `expr {',' expr}`; all but the last are discharged to fresh
    /// slots, the last is returned as a descriptor.
    fn parse_expr_list(&mut self) -> Result<(usize, ExpDesc)> {
        let mut e = self.parse_expr()?;
        let mut n = 1;
        while self.accept_sym(b',')? {
            {
                let (fs, heap) = self.parts();
                fs.to_next_slot(heap, &mut e)?;
            }
            e = self.parse_expr()?;
            n += 1;
        }
        Ok((n, e))
    }

    fn parse_if(&mut self) -> Result<()> {
        self.next()?; // 'if'
        let mut escapes = NO_JMP;
        let mut flist = self.parse_cond_then_block()?;
        loop {
            if self.check(&TokenKind::ElseIf) {
                self.next()?;
                let (fs, _) = self.parts();
                let j = fs.emit_jmp();
                escapes = fs.append_jmp(escapes, j)?;
                fs.patch_here(flist)?;
                flist = self.parse_cond_then_block()?;
            } else if self.check(&TokenKind::Else) {
                self.next()?;
                {
                    let (fs, _) = self.parts();
                    let j = fs.emit_jmp();
                    escapes = fs.append_jmp(escapes, j)?;
                    fs.patch_here(flist)?;
                }
                flist = NO_JMP;
                self.enter_block(false);
                self.parse_block()?;
                self.leave_block();
                break;
            } else {
                break;
            }
        }
        self.expect(TokenKind::End)?;
        let (fs, _) = self.parts();
        escapes = fs.append_jmp(escapes, flist)?;
        fs.patch_here(escapes)?;
        Ok(())
    }

    /// `<cond> then <block>`; returns the condition's false list.
    fn parse_cond_then_block(&mut self) -> Result<i32> {
        let flist = self.parse_cond()?;
        self.expect(TokenKind::Then)?;
        self.enter_block(false);
        self.parse_block()?;
        self.leave_block();
        Ok(flist)
    }

    /// Parse a condition expression; returns the jump list taken when the
    /// condition is false. The true path falls through.
    fn parse_cond(&mut self) -> Result<i32> {
        let mut e = self.parse_expr()?;
        let (fs, heap) = self.parts();
        fs.emit_branch_true(heap, &mut e)?;
        Ok(e.false_list)
    }

    fn parse_while(&mut self) -> Result<()> {
        self.next()?; // 'while'
        let start = {
            let (fs, _) = self.parts();
            fs.pc() as i32
        };
        let cond_false = self.parse_cond()?;
        self.expect(TokenKind::Do)?;
        self.enter_block(true);
        self.parse_block()?;
        self.expect(TokenKind::End)?;
        {
            let (fs, _) = self.parts();
            let j = fs.emit_jmp();
            fs.patch_jmp(j, start)?;
        }
        let breaks = self.leave_block();
        let (fs, _) = self.parts();
        fs.patch_here(cond_false)?;
        fs.patch_here(breaks)?;
        Ok(())
    }

    fn parse_repeat(&mut self) -> Result<()> {
        self.next()?; // 'repeat'
        let start = {
            let (fs, _) = self.parts();
            fs.pc() as i32
        };
        self.enter_block(true);
        self.parse_block()?;
        self.expect(TokenKind::Until)?;
        // The condition is parsed inside the loop scope, so it can see the
        // body's locals.
        let cond_false = self.parse_cond()?;
        {
            let (fs, _) = self.parts();
            fs.patch_jmps(cond_false, start)?;
        }
        let breaks = self.leave_block();
        let (fs, _) = self.parts();
        fs.patch_here(breaks)?;
        Ok(())
    }

    fn parse_break(&mut self) -> Result<()> {
        self.next()?; // 'break'
        let (fs, _) = self.parts();
        let Some(idx) = fs.blocks.iter().rposition(|b| b.is_loop) else {
            return Err(fs.syntax_err("no loop to break"));
        };
        let j = fs.emit_jmp();
        let head = fs.blocks[idx].breaks;
        let head = fs.append_jmp(head, j)?;
        fs.blocks[idx].breaks = head;
        Ok(())
    }

    fn parse_return(&mut self) -> Result<()> {
        self.next()?; // 'return'
        if self.block_follow() {
            let (fs, _) = self.parts();
            fs.emit(BcIns::bare(Op::Ret0));
            return Ok(());
        }
        let (n, mut last) = self.parse_expr_list()?;
        let (fs, heap) = self.parts();
        if n == 1 {
            let slot = fs.to_any_slot(heap, &mut last)?;
            fs.emit(BcIns::e(Op::Ret1, slot as u32));
        } else {
            fs.to_next_slot(heap, &mut last)?;
            let base = fs.num_stack - n as u32;
            fs.emit(BcIns::ad(Op::Ret, base as u8, n as u16));
        }
        fs.num_stack = fs.num_locals;
        Ok(())
    }

    fn parse_expr_statement(&mut self) -> Result<()> {
        let e = self.parse_suffixed()?;
        if self.check_sym(b'=') || self.check_sym(b',') {
            return self.parse_assignment(e);
        }
        match e.kind {
            ExpKind::Call(pc) => {
                let (fs, _) = self.parts();
                // A bare call discards every return value.
                fs.proto.ins[pc].set_c(0);
                fs.num_stack = fs.num_locals;
                Ok(())
            }
            ExpKind::Assert(_) => {
                let (fs, _) = self.parts();
                fs.num_stack = fs.num_locals;
                Ok(())
            }
            _ => Err(self.err_at(e.line, e.col, "unexpected symbol")),
        }
    }

    fn parse_assignment(&mut self, first: ExpDesc) -> Result<()> {
        let mut targets = vec![first];
        while self.accept_sym(b',')? {
            targets.push(self.parse_suffixed()?);
        }
        let mut slots = Vec::with_capacity(targets.len());
        for t in &targets {
            match t.kind {
                ExpKind::Local(slot) => slots.push(slot),
                _ => return Err(self.err_at(t.line, t.col, "cannot assign to this expression")),
            }
        }
        self.expect_sym(b'=')?;
        let (n_exprs, mut last) = self.parse_expr_list()?;
        let n_vars = slots.len();
        if n_exprs == n_vars {
            // The last expression goes straight into the last target; any
            // earlier values are copied down from their temporaries.
            let (fs, heap) = self.parts();
            let last_slot = *slots.last().unwrap();
            fs.to_slot(heap, &mut last, last_slot)?;
            let base = fs.num_stack - (n_vars as u32 - 1);
            for i in (0..n_vars - 1).rev() {
                fs.emit(BcIns::ad(Op::Mov, slots[i], (base + i as u32) as u16));
            }
            fs.num_stack = fs.num_locals;
        } else {
            self.adjust_assign(n_vars, n_exprs, last)?;
            let (fs, _) = self.parts();
            let base = fs.num_stack - n_vars as u32;
            for i in (0..n_vars).rev() {
                fs.emit(BcIns::ad(Op::Mov, slots[i], (base + i as u32) as u16));
            }
            fs.num_stack = fs.num_locals;
        }
        Ok(())
    }

    // ---- Expressions ----

    fn parse_expr(&mut self) -> Result<ExpDesc> {
        self.parse_sub_expr(0)
    }

    fn binop_of(kind: &TokenKind) -> Option<BinOp> {
        Some(match kind {
            TokenKind::Sym(b'+') => BinOp::Add,
            TokenKind::Sym(b'-') => BinOp::Sub,
            TokenKind::Sym(b'*') => BinOp::Mul,
            TokenKind::Sym(b'/') => BinOp::Div,
            TokenKind::Sym(b'%') => BinOp::Mod,
            TokenKind::Sym(b'^') => BinOp::Pow,
            TokenKind::Sym(b'<') => BinOp::Lt,
            TokenKind::Sym(b'>') => BinOp::Gt,
            TokenKind::Concat => BinOp::Concat,
            TokenKind::Eq => BinOp::Eq,
            TokenKind::Neq => BinOp::Neq,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::And => BinOp::And,
            TokenKind::Or => BinOp::Or,
            _ => return None,
        })
    }

    fn parse_sub_expr(&mut self, limit: u8) -> Result<ExpDesc> {
        let mut left = match self.peek_kind() {
            TokenKind::Not => {
                self.next()?;
                let mut e = self.parse_sub_expr(UNARY_PREC)?;
                let (fs, heap) = self.parts();
                fs.emit_not(heap, &mut e)?;
                e
            }
            TokenKind::Sym(b'-') => {
                self.next()?;
                let mut e = self.parse_sub_expr(UNARY_PREC)?;
                let (fs, heap) = self.parts();
                fs.emit_neg(heap, &mut e)?;
                e
            }
            _ => self.parse_simple_expr()?,
        };
        while let Some(op) = Self::binop_of(self.peek_kind()) {
            if op.prec() <= limit {
                break;
            }
            self.next()?;
            {
                let (fs, heap) = self.parts();
                fs.emit_binop_left(heap, op, &mut left)?;
            }
            let sub_limit = if op.right_assoc() {
                op.prec() - 1
            } else {
                op.prec()
            };
            let right = self.parse_sub_expr(sub_limit)?;
            let (fs, heap) = self.parts();
            fs.emit_binop(heap, op, &mut left, right)?;
        }
        Ok(left)
    }

    fn parse_simple_expr(&mut self) -> Result<ExpDesc> {
        let tok = self.lexer.peek();
        let (line, col) = (tok.line, tok.col);
        let kind = match &tok.kind {
            TokenKind::Nil => Some(ExpKind::Prim(TAG_NIL)),
            TokenKind::False => Some(ExpKind::Prim(TAG_FALSE)),
            TokenKind::True => Some(ExpKind::Prim(TAG_TRUE)),
            TokenKind::Num(n) => Some(ExpKind::Num(*n)),
            TokenKind::Str(s) => Some(ExpKind::Str(s.clone())),
            _ => None,
        };
        if let Some(kind) = kind {
            self.next()?;
            return Ok(ExpDesc::new(kind, line, col));
        }
        if self.check(&TokenKind::Function) {
            self.next()?;
            return self.parse_function_body(None, line, col);
        }
        self.parse_suffixed()
    }

    fn parse_suffixed(&mut self) -> Result<ExpDesc> {
        let mut e = self.parse_primary()?;
        while self.check_sym(b'(') {
            e = self.parse_call(e)?;
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<ExpDesc> {
        let tok = self.lexer.peek().clone();
        match &tok.kind {
            TokenKind::Sym(b'(') => {
                self.next()?;
                let mut e = self.parse_expr()?;
                self.expect_sym(b')')?;
                // Parenthesised expressions yield exactly one value.
                let (fs, _) = self.parts();
                fs.discharge(&mut e);
                Ok(e)
            }
            TokenKind::Ident(name) => {
                self.next()?;
                let resolved = {
                    let (fs, _) = self.parts();
                    fs.resolve_local(name)
                };
                if let Some(slot) = resolved {
                    Ok(ExpDesc::new(ExpKind::Local(slot), tok.line, tok.col))
                } else if name == "assert" && self.check_sym(b'(') {
                    self.parse_assert(tok.line, tok.col)
                } else {
                    Err(self.err_at(
                        tok.line,
                        tok.col,
                        format!("undefined name '{}'", name),
                    ))
                }
            }
            _ => Err(self.err_here("unexpected symbol")),
        }
    }

    /// The `assert` builtin: a one-argument call compiled straight to an
    /// `ASSERT` instruction. The expression's value is the tested slot.
    fn parse_assert(&mut self, line: u32, col: u32) -> Result<ExpDesc> {
        self.expect_sym(b'(')?;
        let mut arg = self.parse_expr()?;
        self.expect_sym(b')')?;
        let (fs, heap) = self.parts();
        let slot = fs.to_any_slot(heap, &mut arg)?;
        let pc = fs.emit(BcIns::ad(Op::Assert, 0, slot as u16));
        Ok(ExpDesc::new(ExpKind::Assert(pc), line, col))
    }

    fn parse_call(&mut self, mut e: ExpDesc) -> Result<ExpDesc> {
        let (line, col) = (e.line, e.col);
        let base = {
            let (fs, heap) = self.parts();
            fs.to_next_slot(heap, &mut e)?
        };
        self.expect_sym(b'(')?;
        let mut n_args: u32 = 0;
        if !self.check_sym(b')') {
            loop {
                let mut arg = self.parse_expr()?;
                {
                    let (fs, heap) = self.parts();
                    fs.to_next_slot(heap, &mut arg)?;
                }
                n_args += 1;
                if !self.accept_sym(b',')? {
                    break;
                }
            }
        }
        self.expect_sym(b')')?;
        let (fs, _) = self.parts();
        debug_assert_eq!(fs.num_stack, base as u32 + 1 + n_args);
        let pc = fs.emit(BcIns::abc(Op::Call, base, n_args as u8, 1));
        // The call's arguments die with it; the single expected result
        // lands in the base slot.
        fs.num_stack = base as u32 + 1;
        Ok(ExpDesc::new(ExpKind::Call(pc), line, col))
    }

    /// Parse `(params) block end` into a nested prototype and emit the
    /// `KFN` loading it in the enclosing function.
    fn parse_function_body(&mut self, name: Option<String>, line: u32, col: u32) -> Result<ExpDesc> {
        self.open_func(name, line);
        self.expect_sym(b'(')?;
        if !self.check_sym(b')') {
            loop {
                let (param, _) = self.expect_ident()?;
                let (fs, _) = self.parts();
                fs.check_locals(1)?;
                fs.reserve_slots(1)?;
                fs.register_local(param)?;
                if !self.accept_sym(b',')? {
                    break;
                }
            }
        }
        self.expect_sym(b')')?;
        {
            let (fs, _) = self.parts();
            fs.proto.num_params = fs.num_locals as u8;
        }
        self.parse_block()?;
        let end_tok = self.expect(TokenKind::End)?;
        let proto = self.close_func(end_tok.line)?;
        let (fs, _) = self.parts();
        let idx = fs.const_proto(proto)?;
        let pc = fs.emit(BcIns::ad(Op::KFn, NO_SLOT, idx));
        Ok(ExpDesc::new(ExpKind::Reloc(pc), line, col))
    }
}
