/*
Lingo bytecode toolchain

MIT License

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! AST to bytecode generator. Expressions leave exactly one value on the
//! operand stack, statements leave it balanced. One chunk per handler.

use std::collections::HashMap;

use lingo_ast::{
    BinOp, Expr, ExprKind, HandlerDecl, LiteralValue, Root, Scope, Stmt, StmtKind, UnOp,
};
use lingo_bytecode::{instr, instr_i16, instr_u16, instr_u16_u8, instr_u8, Chunk, ChunkBuilder, Op};
use lingo_common::{LingoError, Pos, Result};

pub mod service;

/// Compile source text end to end: tokenise, parse, generate.
pub fn compile(src: &str) -> Result<Vec<Chunk>> {
    let root = lingo_parser::parse(src)?;
    generate(&root)
}

/// Generate one chunk per handler, in declaration order.
pub fn generate(root: &Root) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::with_capacity(root.handlers.len());
    for handler in &root.handlers {
        chunks.push(gen_handler(handler)?);
    }
    Ok(chunks)
}

struct LoopCtx {
    exit_patches: Vec<usize>,
    next_patches: Vec<usize>,
}

struct Gen {
    b: ChunkBuilder,
    locals: HashMap<String, u16>,
    loops: Vec<LoopCtx>,
    tmp_count: u32,
    line: u32,
}

fn gen_handler(h: &HandlerDecl) -> Result<Chunk> {
    let mut g = Gen {
        b: ChunkBuilder::new(h.name.clone()),
        locals: HashMap::new(),
        loops: Vec::new(),
        tmp_count: 0,
        line: h.pos.line,
    };

    // parameters occupy the low slots; a zero-parameter handler gets the
    // implicit `me` as local 0
    for p in &h.params {
        g.register_local(h.pos, p)?;
    }
    let nargs = if h.params.is_empty() {
        g.register_local(h.pos, "me")?;
        1u16
    } else {
        h.params.len() as u16
    };
    g.b.set_nargs(nargs);

    for l in &h.locals {
        g.register_local(h.pos, l)?;
    }

    for s in &h.body {
        g.emit_stmt(s)?;
    }
    g.emit(instr(Op::LoadVoid));
    g.emit(instr(Op::Ret));

    if g.b.ninstr() > u32::MAX as usize {
        return Err(LingoError::gen(h.pos, "too many instructions in handler"));
    }
    Ok(g.b.finish())
}

impl Gen {
    fn emit(&mut self, word: u32) {
        self.b.emit(word, self.line);
    }

    fn register_local(&mut self, pos: Pos, name: &str) -> Result<u16> {
        let slot = self
            .b
            .register_local(name)
            .ok_or_else(|| LingoError::gen(pos, "too many locals in handler"))?;
        self.locals.insert(name.to_string(), slot);
        Ok(slot)
    }

    fn alloc_temp(&mut self, pos: Pos) -> Result<u16> {
        let name = format!("_tmp{}", self.tmp_count);
        self.tmp_count += 1;
        self.register_local(pos, &name)
    }

    fn local_slot(&self, pos: Pos, name: &str) -> Result<u16> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| LingoError::gen(pos, format!("unresolved local '{}'", name)))
    }

    fn kint(&mut self, pos: Pos, v: i32) -> Result<u16> {
        self.b.const_int(v).ok_or_else(|| LingoError::gen(pos, "too many constants in handler"))
    }

    fn kfloat(&mut self, pos: Pos, v: f64) -> Result<u16> {
        self.b.const_float(v).ok_or_else(|| LingoError::gen(pos, "too many constants in handler"))
    }

    fn kstr(&mut self, pos: Pos, s: &str) -> Result<u16> {
        self.b.const_str(s).ok_or_else(|| LingoError::gen(pos, "too many constants in handler"))
    }

    fn ksym(&mut self, pos: Pos, s: &str) -> Result<u16> {
        self.b.const_sym(s).ok_or_else(|| LingoError::gen(pos, "too many constants in handler"))
    }

    fn jump_placeholder(&mut self, op: Op) -> usize {
        let at = self.b.here();
        self.emit(instr_i16(op, 0));
        at
    }

    fn patch(&mut self, pos: Pos, at: usize, target: usize) -> Result<()> {
        if self.b.patch_jump(at, target) {
            Ok(())
        } else {
            Err(LingoError::gen(pos, "jump distance exceeds 16-bit range"))
        }
    }

    fn back_jump(&mut self, pos: Pos, target: usize) -> Result<()> {
        let at = self.jump_placeholder(Op::Jmp);
        self.patch(pos, at, target)
    }

    // ---- expressions ----

    fn emit_expr(&mut self, e: &Expr) -> Result<()> {
        self.line = e.pos.line;
        match &e.kind {
            ExprKind::Literal(lit) => self.emit_literal(e.pos, lit),
            ExprKind::Identifier { name, scope } => self.emit_load_ident(e.pos, name, *scope),
            ExprKind::The(id) => {
                self.emit(instr_u8(Op::The, *id as u8));
                Ok(())
            }
            ExprKind::List(items) => {
                if items.len() > u16::MAX as usize {
                    return Err(LingoError::gen(e.pos, "list literal has too many elements"));
                }
                self.emit(instr_u16(Op::NewLList, items.len() as u16));
                let add = self.ksym(e.pos, "add")?;
                for item in items {
                    self.emit(instr(Op::Dup));
                    self.emit_expr(item)?;
                    self.emit(instr_u16_u8(Op::OCall, add, 1));
                    self.emit(instr(Op::Pop));
                }
                Ok(())
            }
            ExprKind::PropList(pairs) => {
                self.emit(instr(Op::NewPList));
                let addprop = self.ksym(e.pos, "addprop")?;
                for (k, v) in pairs {
                    self.emit(instr(Op::Dup));
                    self.emit_expr(k)?;
                    self.emit_expr(v)?;
                    self.emit(instr_u16_u8(Op::OCall, addprop, 2));
                    self.emit(instr(Op::Pop));
                }
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                self.line = e.pos.line;
                match op {
                    BinOp::Add => self.emit(instr(Op::Add)),
                    BinOp::Sub => self.emit(instr(Op::Sub)),
                    BinOp::Mul => self.emit(instr(Op::Mul)),
                    BinOp::Div => self.emit(instr(Op::Div)),
                    BinOp::Mod => self.emit(instr(Op::Mod)),
                    BinOp::And => self.emit(instr(Op::And)),
                    BinOp::Or => self.emit(instr(Op::Or)),
                    BinOp::Lt => self.emit(instr(Op::Lt)),
                    BinOp::Gt => self.emit(instr(Op::Gt)),
                    BinOp::Le => self.emit(instr(Op::Lte)),
                    BinOp::Ge => self.emit(instr(Op::Gte)),
                    BinOp::Eq => self.emit(instr(Op::Eq)),
                    BinOp::Ne => {
                        self.emit(instr(Op::Eq));
                        self.emit(instr(Op::Not));
                    }
                    BinOp::Concat => self.emit(instr(Op::Concat)),
                    BinOp::ConcatSp => self.emit(instr(Op::ConcatSp)),
                }
                Ok(())
            }
            ExprKind::Unary { op, expr } => {
                self.emit_expr(expr)?;
                self.line = e.pos.line;
                match op {
                    UnOp::Neg => self.emit(instr(Op::Unm)),
                    UnOp::Not => self.emit(instr(Op::Not)),
                }
                Ok(())
            }
            ExprKind::Dot { expr, name } => {
                self.emit_expr(expr)?;
                let k = self.ksym(e.pos, name)?;
                self.emit(instr_u16(Op::LoadC, k));
                self.emit(instr(Op::OIdxG));
                Ok(())
            }
            ExprKind::Index { expr, from, to } => {
                match to {
                    None => {
                        // the innermost dot fuses into the chunk access
                        if let ExprKind::Dot { expr: base, name } = &expr.kind {
                            self.emit_expr(base)?;
                            let k = self.ksym(e.pos, name)?;
                            self.emit(instr_u16(Op::LoadC, k));
                            self.emit_expr(from)?;
                            self.emit(instr(Op::OIdxK));
                        } else {
                            self.emit_expr(expr)?;
                            self.emit_expr(from)?;
                            self.emit(instr(Op::OIdxG));
                        }
                    }
                    Some(to) => {
                        if let ExprKind::Dot { expr: base, name } = &expr.kind {
                            self.emit_expr(base)?;
                            let k = self.ksym(e.pos, name)?;
                            self.emit(instr_u16(Op::LoadC, k));
                        } else {
                            // a range over the object itself carries a
                            // void key
                            self.emit_expr(expr)?;
                            self.emit(instr(Op::LoadVoid));
                        }
                        self.emit_expr(from)?;
                        self.emit_expr(to)?;
                        self.emit(instr(Op::OIdxKr));
                    }
                }
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                if args.len() > u8::MAX as usize {
                    return Err(LingoError::gen(e.pos, "too many call arguments"));
                }
                match &callee.kind {
                    ExprKind::Dot { expr, name } => {
                        self.emit_expr(expr)?;
                        for a in args {
                            self.emit_expr(a)?;
                        }
                        let k = self.ksym(e.pos, name)?;
                        self.line = e.pos.line;
                        self.emit(instr_u16_u8(Op::OCall, k, args.len() as u8));
                    }
                    ExprKind::Identifier { name, .. } => {
                        for a in args {
                            self.emit_expr(a)?;
                        }
                        let k = self.ksym(e.pos, name)?;
                        self.line = e.pos.line;
                        self.emit(instr_u16_u8(Op::Call, k, args.len() as u8));
                    }
                    _ => {
                        return Err(LingoError::gen(
                            e.pos,
                            "handler reference must be an identifier or dot access",
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn emit_literal(&mut self, pos: Pos, lit: &LiteralValue) -> Result<()> {
        match lit {
            LiteralValue::Int(0) => self.emit(instr(Op::LoadI0)),
            LiteralValue::Int(1) => self.emit(instr(Op::LoadI1)),
            LiteralValue::Int(v) => {
                let k = self.kint(pos, *v)?;
                self.emit(instr_u16(Op::LoadC, k));
            }
            LiteralValue::Float(v) => {
                let k = self.kfloat(pos, *v)?;
                self.emit(instr_u16(Op::LoadC, k));
            }
            LiteralValue::Str(s) => {
                let k = self.kstr(pos, s)?;
                self.emit(instr_u16(Op::LoadC, k));
            }
            LiteralValue::Symbol(s) => {
                let k = self.ksym(pos, s)?;
                self.emit(instr_u16(Op::LoadC, k));
            }
            LiteralValue::Void => self.emit(instr(Op::LoadVoid)),
        }
        Ok(())
    }

    fn emit_load_ident(&mut self, pos: Pos, name: &str, scope: Scope) -> Result<()> {
        match scope {
            Scope::Local => {
                let slot = self.local_slot(pos, name)?;
                self.emit(instr_u16(Op::LoadL, slot));
            }
            Scope::Global => {
                let k = self.ksym(pos, name)?;
                self.emit(instr_u16(Op::LoadG, k));
            }
            Scope::Property => {
                self.emit(instr(Op::LoadL0));
                let k = self.ksym(pos, name)?;
                self.emit(instr_u16(Op::LoadC, k));
                self.emit(instr(Op::OIdxG));
            }
        }
        Ok(())
    }

    /// Store the value on top of the stack into an lvalue.
    fn emit_store(&mut self, lvalue: &Expr) -> Result<()> {
        self.line = lvalue.pos.line;
        match &lvalue.kind {
            ExprKind::Identifier { name, scope } => match scope {
                Scope::Local => {
                    let slot = self.local_slot(lvalue.pos, name)?;
                    self.emit(instr_u16(Op::StoreL, slot));
                }
                Scope::Global => {
                    let k = self.ksym(lvalue.pos, name)?;
                    self.emit(instr_u16(Op::StoreG, k));
                }
                Scope::Property => {
                    self.emit(instr(Op::LoadL0));
                    let k = self.ksym(lvalue.pos, name)?;
                    self.emit(instr_u16(Op::LoadC, k));
                    self.emit(instr(Op::OIdxS));
                }
            },
            ExprKind::Dot { expr, name } => {
                self.emit_expr(expr)?;
                let k = self.ksym(lvalue.pos, name)?;
                self.emit(instr_u16(Op::LoadC, k));
                self.emit(instr(Op::OIdxS));
            }
            ExprKind::Index { expr, from, to: None } => {
                self.emit_expr(expr)?;
                self.emit_expr(from)?;
                self.emit(instr(Op::OIdxS));
            }
            _ => {
                return Err(LingoError::gen(lvalue.pos, "invalid assignment target"));
            }
        }
        Ok(())
    }

    // ---- statements ----

    fn emit_stmt(&mut self, s: &Stmt) -> Result<()> {
        self.line = s.pos.line;
        match &s.kind {
            StmtKind::Return(expr) => {
                match expr {
                    Some(e) => self.emit_expr(e)?,
                    None => self.emit(instr(Op::LoadVoid)),
                }
                self.emit(instr(Op::Ret));
                Ok(())
            }
            StmtKind::Assign { lvalue, rvalue } => {
                self.emit_expr(rvalue)?;
                self.emit_store(lvalue)
            }
            StmtKind::Expr(e) => {
                self.emit_expr(e)?;
                self.emit(instr(Op::Pop));
                Ok(())
            }
            StmtKind::Put(e) => {
                self.emit_expr(e)?;
                self.emit(instr(Op::Put));
                Ok(())
            }
            StmtKind::PutOn { expr, target, before } => self.emit_put_on(s.pos, expr, target, *before),
            StmtKind::If { branches, else_body } => {
                let mut end_jumps: Vec<usize> = Vec::new();
                for branch in branches {
                    self.emit_expr(&branch.condition)?;
                    let brf = self.jump_placeholder(Op::Brf);
                    for st in &branch.body {
                        self.emit_stmt(st)?;
                    }
                    end_jumps.push(self.jump_placeholder(Op::Jmp));
                    let here = self.b.here();
                    self.patch(s.pos, brf, here)?;
                }
                if let Some(else_body) = else_body {
                    for st in else_body {
                        self.emit_stmt(st)?;
                    }
                }
                let end = self.b.here();
                for j in end_jumps {
                    self.patch(s.pos, j, end)?;
                }
                Ok(())
            }
            StmtKind::RepeatWhile { condition, body } => {
                let top = self.b.here();
                self.emit_expr(condition)?;
                let brf = self.jump_placeholder(Op::Brf);
                self.loops.push(LoopCtx { exit_patches: Vec::new(), next_patches: Vec::new() });
                for st in body {
                    self.emit_stmt(st)?;
                }
                self.line = s.pos.line;
                self.back_jump(s.pos, top)?;
                let end = self.b.here();
                self.patch(s.pos, brf, end)?;
                let ctx = self.loops.pop().expect("loop context");
                for j in ctx.exit_patches {
                    self.patch(s.pos, j, end)?;
                }
                for j in ctx.next_patches {
                    self.patch(s.pos, j, top)?;
                }
                Ok(())
            }
            StmtKind::RepeatTo { iterator, init, to, down, body } => {
                self.emit_expr(init)?;
                self.emit_store(iterator)?;
                let top = self.b.here();
                self.emit_expr(iterator)?;
                self.emit_expr(to)?;
                self.emit(instr(if *down { Op::Gte } else { Op::Lte }));
                let brf = self.jump_placeholder(Op::Brf);
                self.loops.push(LoopCtx { exit_patches: Vec::new(), next_patches: Vec::new() });
                for st in body {
                    self.emit_stmt(st)?;
                }
                self.line = s.pos.line;
                let cont = self.b.here();
                self.emit_expr(iterator)?;
                self.emit(instr(Op::LoadI1));
                self.emit(instr(if *down { Op::Sub } else { Op::Add }));
                self.emit_store(iterator)?;
                self.back_jump(s.pos, top)?;
                let end = self.b.here();
                self.patch(s.pos, brf, end)?;
                let ctx = self.loops.pop().expect("loop context");
                for j in ctx.exit_patches {
                    self.patch(s.pos, j, end)?;
                }
                for j in ctx.next_patches {
                    self.patch(s.pos, j, cont)?;
                }
                Ok(())
            }
            StmtKind::RepeatIn { iterator, iterable, body } => {
                // the iterable lives in a fresh temporary; the index
                // drives 1..count and the iterator is rebound each step
                let tmp = self.alloc_temp(s.pos)?;
                let idx = self.alloc_temp(s.pos)?;
                self.emit_expr(iterable)?;
                self.emit(instr_u16(Op::StoreL, tmp));
                self.emit(instr(Op::LoadI1));
                self.emit(instr_u16(Op::StoreL, idx));
                let count = self.ksym(s.pos, "count")?;
                let top = self.b.here();
                self.emit(instr_u16(Op::LoadL, idx));
                self.emit(instr_u16(Op::LoadL, tmp));
                self.emit(instr_u16(Op::LoadC, count));
                self.emit(instr(Op::OIdxG));
                self.emit(instr(Op::Lte));
                let brf = self.jump_placeholder(Op::Brf);
                self.emit(instr_u16(Op::LoadL, tmp));
                self.emit(instr_u16(Op::LoadL, idx));
                self.emit(instr(Op::OIdxG));
                self.emit_store(iterator)?;
                self.loops.push(LoopCtx { exit_patches: Vec::new(), next_patches: Vec::new() });
                for st in body {
                    self.emit_stmt(st)?;
                }
                self.line = s.pos.line;
                let cont = self.b.here();
                self.emit(instr_u16(Op::LoadL, idx));
                self.emit(instr(Op::LoadI1));
                self.emit(instr(Op::Add));
                self.emit(instr_u16(Op::StoreL, idx));
                self.back_jump(s.pos, top)?;
                let end = self.b.here();
                self.patch(s.pos, brf, end)?;
                let ctx = self.loops.pop().expect("loop context");
                for j in ctx.exit_patches {
                    self.patch(s.pos, j, end)?;
                }
                for j in ctx.next_patches {
                    self.patch(s.pos, j, cont)?;
                }
                Ok(())
            }
            StmtKind::ExitRepeat => {
                if self.loops.is_empty() {
                    return Err(LingoError::gen(s.pos, "'exit repeat' outside of a repeat loop"));
                }
                let j = self.jump_placeholder(Op::Jmp);
                self.loops.last_mut().expect("loop context").exit_patches.push(j);
                Ok(())
            }
            StmtKind::NextRepeat => {
                if self.loops.is_empty() {
                    return Err(LingoError::gen(s.pos, "'next repeat' outside of a repeat loop"));
                }
                let j = self.jump_placeholder(Op::Jmp);
                self.loops.last_mut().expect("loop context").next_patches.push(j);
                Ok(())
            }
            StmtKind::Case { expr, clauses, otherwise } => {
                self.emit_expr(expr)?;
                let mut end_jumps: Vec<usize> = Vec::new();
                for clause in clauses {
                    let mut body_patches: Vec<usize> = Vec::new();
                    for lit in &clause.literals {
                        self.emit(instr(Op::Dup));
                        self.emit_expr(lit)?;
                        self.emit(instr(Op::Eq));
                        body_patches.push(self.jump_placeholder(Op::Brt));
                    }
                    let skip = self.jump_placeholder(Op::Jmp);
                    let body_start = self.b.here();
                    for j in body_patches {
                        self.patch(s.pos, j, body_start)?;
                    }
                    self.emit(instr(Op::Pop));
                    for st in &clause.body {
                        self.emit_stmt(st)?;
                    }
                    end_jumps.push(self.jump_placeholder(Op::Jmp));
                    let next_clause = self.b.here();
                    self.patch(s.pos, skip, next_clause)?;
                }
                // fall-through: drop the scrutinee, then the otherwise
                // clause if present
                self.emit(instr(Op::Pop));
                if let Some(body) = otherwise {
                    for st in body {
                        self.emit_stmt(st)?;
                    }
                }
                let end = self.b.here();
                for j in end_jumps {
                    self.patch(s.pos, j, end)?;
                }
                Ok(())
            }
        }
    }

    /// `put e after t` / `put e before t`: read the target, concatenate
    /// on the chosen side and write the result back.
    fn emit_put_on(&mut self, pos: Pos, expr: &Expr, target: &Expr, before: bool) -> Result<()> {
        match &target.kind {
            ExprKind::Identifier { name, scope } => {
                if before {
                    self.emit_expr(expr)?;
                    self.emit_load_ident(target.pos, name, *scope)?;
                } else {
                    self.emit_load_ident(target.pos, name, *scope)?;
                    self.emit_expr(expr)?;
                }
                self.emit(instr(Op::Concat));
                self.emit_store(target)
            }
            ExprKind::Dot { expr: base, name } => {
                let tmp = self.alloc_temp(pos)?;
                let key = self.ksym(pos, name)?;
                self.emit_expr(base)?;
                self.emit(instr_u16(Op::StoreL, tmp));
                if before {
                    self.emit_expr(expr)?;
                    self.emit(instr_u16(Op::LoadL, tmp));
                    self.emit(instr_u16(Op::LoadC, key));
                    self.emit(instr(Op::OIdxG));
                } else {
                    self.emit(instr_u16(Op::LoadL, tmp));
                    self.emit(instr_u16(Op::LoadC, key));
                    self.emit(instr(Op::OIdxG));
                    self.emit_expr(expr)?;
                }
                self.emit(instr(Op::Concat));
                self.emit(instr_u16(Op::LoadL, tmp));
                self.emit(instr_u16(Op::LoadC, key));
                self.emit(instr(Op::OIdxS));
                Ok(())
            }
            ExprKind::Index { expr: base, from, to: None } => {
                let tobj = self.alloc_temp(pos)?;
                let tidx = self.alloc_temp(pos)?;
                self.emit_expr(base)?;
                self.emit(instr_u16(Op::StoreL, tobj));
                self.emit_expr(from)?;
                self.emit(instr_u16(Op::StoreL, tidx));
                if before {
                    self.emit_expr(expr)?;
                    self.emit(instr_u16(Op::LoadL, tobj));
                    self.emit(instr_u16(Op::LoadL, tidx));
                    self.emit(instr(Op::OIdxG));
                } else {
                    self.emit(instr_u16(Op::LoadL, tobj));
                    self.emit(instr_u16(Op::LoadL, tidx));
                    self.emit(instr(Op::OIdxG));
                    self.emit_expr(expr)?;
                }
                self.emit(instr(Op::Concat));
                self.emit(instr_u16(Op::LoadL, tobj));
                self.emit(instr_u16(Op::LoadL, tidx));
                self.emit(instr(Op::OIdxS));
                Ok(())
            }
            _ => Err(LingoError::gen(pos, "invalid put after/before target")),
        }
    }
}
