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

//! Recursive-descent parser with parse-time scope resolution. Every
//! identifier leaves here classified as local, global or property; a use
//! of an undeclared name is rejected unless it is a call target.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use lingo_ast::{
    BinOp, CaseClause, Expr, ExprKind, HandlerDecl, IfBranch, LiteralValue, Root, Scope, Stmt,
    StmtKind, TheId, UnOp,
};
use lingo_common::{LingoError, Pos, Result};
use lingo_lexer::{token_desc, tokenize, Keyword, Sym, Token, TokenKind, WordId};

/// Built-in identifiers that parse directly to literals.
static BUILTIN_IDENTS: Lazy<HashMap<&'static str, LiteralValue>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("true", LiteralValue::Int(1));
    m.insert("false", LiteralValue::Int(0));
    m.insert("pi", LiteralValue::Float(std::f64::consts::PI));
    m.insert("quote", LiteralValue::Str("\"".to_string()));
    m.insert("empty", LiteralValue::Str(String::new()));
    m.insert("return", LiteralValue::Str("\r".to_string()));
    m.insert("space", LiteralValue::Str(" ".to_string()));
    m.insert("tab", LiteralValue::Str("\t".to_string()));
    m.insert("backspace", LiteralValue::Str("\u{8}".to_string()));
    m.insert("enter", LiteralValue::Str("\u{3}".to_string()));
    m.insert("void", LiteralValue::Void);
    m
});

static THE_IDS: Lazy<HashMap<&'static str, TheId>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("moviepath", TheId::MoviePath);
    m.insert("frame", TheId::Frame);
    m.insert("dirseparator", TheId::DirSeparator);
    m.insert("milliseconds", TheId::Milliseconds);
    m.insert("randomseed", TheId::RandomSeed);
    m.insert("platform", TheId::Platform);
    m
});

/// Parse a whole source text: tokenise then build the AST root.
pub fn parse(src: &str) -> Result<Root> {
    let tokens = tokenize(src)?;
    parse_tokens(&tokens)
}

/// Parse an already-tokenised script.
pub fn parse_tokens(tokens: &[Token]) -> Result<Root> {
    let mut p = Parser::new(tokens);
    let mut root = Root::default();

    while !p.cur.eof() {
        if p.match_line_end() {
            continue;
        }
        let t = p.cur.peek()?;
        if t.is_word(WordId::Property) {
            p.parse_script_decl(true)?;
        } else if t.is_word(WordId::Global) {
            p.parse_script_decl(false)?;
        } else if t.is_keyword(Keyword::On) {
            let handler = p.parse_handler()?;
            root.handlers.push(handler);
        } else {
            return Err(LingoError::parse(
                t.pos,
                format!("unexpected {} at script scope", token_desc(&t.kind)),
            ));
        }
    }

    root.properties = p.script.properties;
    Ok(root)
}

struct Cursor<'a> {
    toks: &'a [Token],
    i: usize,
}

impl<'a> Cursor<'a> {
    fn eof(&self) -> bool {
        self.i >= self.toks.len()
    }

    fn last_pos(&self) -> Pos {
        self.toks.last().map(|t| t.pos).unwrap_or_default()
    }

    fn pos(&self) -> Pos {
        self.toks.get(self.i).map(|t| t.pos).unwrap_or_else(|| self.last_pos())
    }

    fn peek(&self) -> Result<&'a Token> {
        self.toks
            .get(self.i)
            .ok_or_else(|| LingoError::parse(self.last_pos(), "unexpected end of input"))
    }

    fn peek_at(&self, off: usize) -> Option<&'a Token> {
        self.toks.get(self.i + off)
    }

    fn pop(&mut self) -> Result<&'a Token> {
        let t = self.peek()?;
        self.i += 1;
        Ok(t)
    }
}

#[derive(Default)]
struct ScriptScope {
    properties: Vec<String>,
    globals: Vec<String>,
}

struct HandlerScope {
    params: Vec<String>,
    locals: Vec<String>,
    globals: Vec<String>,
}

fn resolve(script: &ScriptScope, hs: &HandlerScope, name: &str) -> Option<Scope> {
    // properties shadow everything; they belong to the script instance
    if script.properties.iter().any(|p| p == name) {
        return Some(Scope::Property);
    }
    if hs.locals.iter().any(|l| l == name) || hs.params.iter().any(|p| p == name) {
        return Some(Scope::Local);
    }
    if hs.globals.iter().any(|g| g == name) || script.globals.iter().any(|g| g == name) {
        return Some(Scope::Global);
    }
    None
}

struct Parser<'a> {
    cur: Cursor<'a>,
    script: ScriptScope,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { cur: Cursor { toks: tokens, i: 0 }, script: ScriptScope::default() }
    }

    // ---- token helpers ----

    fn match_line_end(&mut self) -> bool {
        if !self.cur.eof() && self.cur.toks[self.cur.i].is_line_end() {
            self.cur.i += 1;
            true
        } else {
            false
        }
    }

    fn match_symbol(&mut self, s: Sym) -> bool {
        if !self.cur.eof() && self.cur.toks[self.cur.i].is_symbol(s) {
            self.cur.i += 1;
            true
        } else {
            false
        }
    }

    fn match_word(&mut self, id: WordId) -> bool {
        if !self.cur.eof() && self.cur.toks[self.cur.i].is_word(id) {
            self.cur.i += 1;
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, k: Keyword) -> bool {
        if !self.cur.eof() && self.cur.toks[self.cur.i].is_keyword(k) {
            self.cur.i += 1;
            true
        } else {
            false
        }
    }

    fn expect_line_end(&mut self) -> Result<()> {
        if self.cur.eof() {
            return Ok(());
        }
        let t = self.cur.peek()?;
        if t.is_line_end() {
            self.cur.pop()?;
            Ok(())
        } else {
            Err(LingoError::parse(
                t.pos,
                format!("expected end of line, got {}", token_desc(&t.kind)),
            ))
        }
    }

    fn expect_symbol(&mut self, s: Sym, what: &str) -> Result<()> {
        let t = self.cur.peek()?;
        if t.is_symbol(s) {
            self.cur.pop()?;
            Ok(())
        } else {
            Err(LingoError::parse(t.pos, format!("{}, got {}", what, token_desc(&t.kind))))
        }
    }

    fn expect_keyword(&mut self, k: Keyword, what: &str) -> Result<()> {
        let t = self.cur.peek()?;
        if t.is_keyword(k) {
            self.cur.pop()?;
            Ok(())
        } else {
            Err(LingoError::parse(t.pos, format!("{}, got {}", what, token_desc(&t.kind))))
        }
    }

    fn expect_word(&mut self, id: WordId, what: &str) -> Result<()> {
        let t = self.cur.peek()?;
        if t.is_word(id) {
            self.cur.pop()?;
            Ok(())
        } else {
            Err(LingoError::parse(t.pos, format!("{}, got {}", what, token_desc(&t.kind))))
        }
    }

    fn expect_any_word(&mut self) -> Result<(String, Pos)> {
        let t = self.cur.peek()?;
        if let TokenKind::Word(_, text) = &t.kind {
            let out = (text.clone(), t.pos);
            self.cur.pop()?;
            Ok(out)
        } else {
            Err(LingoError::parse(
                t.pos,
                format!("expected identifier, got {}", token_desc(&t.kind)),
            ))
        }
    }

    /// The `repeat` header discards everything after its keyword tail up
    /// to the end of the line. Dialect quirk, kept on purpose.
    fn discard_to_line_end(&mut self) {
        while !self.cur.eof() {
            let is_end = self.cur.toks[self.cur.i].is_line_end();
            self.cur.i += 1;
            if is_end {
                return;
            }
        }
    }

    // ---- script scope ----

    fn parse_script_decl(&mut self, is_property: bool) -> Result<()> {
        self.cur.pop()?; // 'property' or 'global'
        loop {
            let (name, pos) = self.expect_any_word()?;
            let list = if is_property { &self.script.properties } else { &self.script.globals };
            if list.iter().any(|n| *n == name) {
                let kind = if is_property { "property" } else { "global" };
                return Err(LingoError::parse(
                    pos,
                    format!("duplicate {} declaration '{}'", kind, name),
                ));
            }
            if is_property {
                self.script.properties.push(name);
            } else {
                self.script.globals.push(name);
            }
            if !self.match_symbol(Sym::Comma) {
                break;
            }
        }
        self.expect_line_end()
    }

    fn parse_handler(&mut self) -> Result<HandlerDecl> {
        let pos = self.cur.pos();
        self.cur.pop()?; // 'on'
        let (name, _) = self.expect_any_word()?;

        let mut params: Vec<String> = Vec::new();
        let mut line_end_seen = false;
        if !self.cur.peek()?.is_line_end() {
            let paren = self.match_symbol(Sym::LParen);
            loop {
                let (param, ppos) = self.expect_any_word()?;
                if params.iter().any(|p| *p == param) {
                    return Err(LingoError::parse(
                        ppos,
                        format!("duplicate parameter '{}'", param),
                    ));
                }
                params.push(param);
                let t = self.cur.pop()?;
                if t.is_symbol(Sym::Comma) {
                    continue;
                }
                if paren && t.is_symbol(Sym::RParen) {
                    break;
                }
                if !paren && t.is_line_end() {
                    line_end_seen = true;
                    break;
                }
                return Err(LingoError::parse(
                    t.pos,
                    format!("unexpected {} in parameter list", token_desc(&t.kind)),
                ));
            }
        }
        if !line_end_seen {
            self.expect_line_end()?;
        }

        let mut hs = HandlerScope { params, locals: Vec::new(), globals: Vec::new() };
        let mut body: Vec<Stmt> = Vec::new();
        loop {
            if self.cur.eof() {
                return Err(LingoError::parse(pos, format!("unterminated handler '{}'", name)));
            }
            if self.match_line_end() {
                continue;
            }
            if self.cur.peek()?.is_word(WordId::End) {
                self.cur.pop()?;
                // optional trailing handler name after 'end'
                if !self.cur.eof() {
                    if let TokenKind::Word(_, _) = self.cur.peek()?.kind {
                        self.cur.pop()?;
                    }
                }
                self.expect_line_end()?;
                break;
            }
            if let Some(s) = self.parse_statement(&mut hs)? {
                body.push(s);
            }
        }

        Ok(HandlerDecl { pos, name, params: hs.params, body, locals: hs.locals })
    }

    // ---- statements ----

    fn parse_statement(&mut self, hs: &mut HandlerScope) -> Result<Option<Stmt>> {
        let t = self.cur.peek()?;
        let pos = t.pos;
        match &t.kind {
            TokenKind::Word(WordId::Global, _) => {
                self.parse_handler_globals(hs)?;
                Ok(None)
            }
            TokenKind::Word(WordId::Property, _) => Err(LingoError::parse(
                pos,
                "property declarations are only allowed at script scope",
            )),
            TokenKind::Word(WordId::If, _) => Ok(Some(self.parse_if(hs)?)),
            TokenKind::Word(WordId::Repeat, _) => Ok(Some(self.parse_repeat(hs)?)),
            TokenKind::Word(WordId::Case, _) => Ok(Some(self.parse_case(hs)?)),
            _ => {
                let s = self.parse_simple_stmt(hs)?;
                self.expect_line_end()?;
                Ok(Some(s))
            }
        }
    }

    fn parse_handler_globals(&mut self, hs: &mut HandlerScope) -> Result<()> {
        self.cur.pop()?; // 'global'
        loop {
            let (name, pos) = self.expect_any_word()?;
            if hs.globals.iter().any(|g| *g == name) {
                return Err(LingoError::parse(
                    pos,
                    format!("duplicate global declaration '{}'", name),
                ));
            }
            hs.globals.push(name);
            if !self.match_symbol(Sym::Comma) {
                break;
            }
        }
        self.expect_line_end()
    }

    /// True when the token after the leading word makes the statement a
    /// handler-invocation statement (`name arg1, arg2 ...`). A comma is
    /// included for the optional-leading-comma form `name, arg1, ...`.
    fn bare_call_follows(&self) -> bool {
        match self.cur.peek_at(1) {
            None => true,
            Some(t) => matches!(
                t.kind,
                TokenKind::Word(..)
                    | TokenKind::Str(_)
                    | TokenKind::Integer(_)
                    | TokenKind::Float(_)
                    | TokenKind::SymbolLit(_)
                    | TokenKind::Symbol(Sym::Comma)
                    | TokenKind::LineEnd
            ),
        }
    }

    fn at_stmt_end(&self) -> bool {
        if self.cur.eof() {
            return true;
        }
        let t = &self.cur.toks[self.cur.i];
        t.is_line_end() || t.is_keyword(Keyword::Else)
    }

    /// A statement without its terminator: return, put, assignment,
    /// handler invocation, exit/next repeat or a bare expression. Used
    /// both for ordinary lines and for the inline `if ... then stmt`
    /// form, where it stops short of `else`.
    fn parse_simple_stmt(&mut self, hs: &mut HandlerScope) -> Result<Stmt> {
        let t = self.cur.peek()?.clone();
        let pos = t.pos;

        match &t.kind {
            TokenKind::Word(WordId::Return, _) => {
                self.cur.pop()?;
                if self.at_stmt_end() {
                    return Ok(Stmt::new(pos, StmtKind::Return(None)));
                }
                let e = self.parse_expr_bp(hs, 0, true)?;
                return Ok(Stmt::new(pos, StmtKind::Return(Some(e))));
            }
            TokenKind::Word(WordId::Put, _) => {
                self.cur.pop()?;
                let e = self.parse_expr_bp(hs, 0, true)?;
                let before = if self.match_word(WordId::After) {
                    Some(false)
                } else if self.match_word(WordId::Before) {
                    Some(true)
                } else {
                    None
                };
                return match before {
                    None => Ok(Stmt::new(pos, StmtKind::Put(e))),
                    Some(before) => {
                        let target = self.parse_postfix(hs)?;
                        if !target.is_lvalue() {
                            return Err(LingoError::parse(
                                target.pos,
                                "put after/before target must be an identifier, dot or index expression",
                            ));
                        }
                        Ok(Stmt::new(pos, StmtKind::PutOn { expr: e, target, before }))
                    }
                };
            }
            TokenKind::Word(WordId::Exit, _) => {
                self.cur.pop()?;
                if self.match_word(WordId::Repeat) {
                    return Ok(Stmt::new(pos, StmtKind::ExitRepeat));
                }
                // bare `exit` leaves the handler
                return Ok(Stmt::new(pos, StmtKind::Return(None)));
            }
            TokenKind::Word(WordId::Next, _) => {
                self.cur.pop()?;
                self.expect_word(WordId::Repeat, "expected 'repeat' after 'next'")?;
                return Ok(Stmt::new(pos, StmtKind::NextRepeat));
            }
            _ => {}
        }

        if let TokenKind::Word(id, name) = &t.kind {
            if *id != WordId::The {
                // `word = expr` introduces a new local if unbound
                if self.cur.peek_at(1).map(|n| n.is_symbol(Sym::Equal)).unwrap_or(false) {
                    let name = name.clone();
                    self.cur.pop()?; // word
                    self.cur.pop()?; // '='
                    let scope = match resolve(&self.script, hs, &name) {
                        Some(s) => s,
                        None => {
                            hs.locals.push(name.clone());
                            Scope::Local
                        }
                    };
                    let rvalue = self.parse_expr_bp(hs, 0, true)?;
                    let lvalue = Expr::new(pos, ExprKind::Identifier { name, scope });
                    return Ok(Stmt::new(pos, StmtKind::Assign { lvalue, rvalue }));
                }

                if self.bare_call_follows() {
                    let name = name.clone();
                    self.cur.pop()?;
                    let scope = resolve(&self.script, hs, &name).unwrap_or(Scope::Local);
                    let callee = Expr::new(pos, ExprKind::Identifier { name, scope });
                    let mut args: Vec<Expr> = Vec::new();
                    if !self.at_stmt_end() {
                        // only the first comma is optional
                        let _ = self.match_symbol(Sym::Comma);
                        args.push(self.parse_expr_bp(hs, 0, true)?);
                        while self.match_symbol(Sym::Comma) {
                            args.push(self.parse_expr_bp(hs, 0, true)?);
                        }
                    }
                    let call =
                        Expr::new(pos, ExprKind::Call { callee: Box::new(callee), args });
                    return Ok(Stmt::new(pos, StmtKind::Expr(call)));
                }
            }
        }

        // general expression statement; a trailing '=' turns it into an
        // lvalue assignment
        let e = self.parse_expr_bp(hs, 0, false)?;
        if self.match_symbol(Sym::Equal) {
            if !e.is_lvalue() {
                return Err(LingoError::parse(
                    e.pos,
                    "assignment target must be an identifier, dot or index expression",
                ));
            }
            let rvalue = self.parse_expr_bp(hs, 0, true)?;
            return Ok(Stmt::new(pos, StmtKind::Assign { lvalue: e, rvalue }));
        }
        Ok(Stmt::new(pos, StmtKind::Expr(e)))
    }

    fn parse_if(&mut self, hs: &mut HandlerScope) -> Result<Stmt> {
        let pos = self.cur.pos();
        self.cur.pop()?; // 'if'
        let cond = self.parse_expr_bp(hs, 0, true)?;
        self.expect_keyword(Keyword::Then, "expected 'then' after if condition")?;

        if !self.cur.peek()?.is_line_end() {
            // inline form
            let then_stmt = self.parse_simple_stmt(hs)?;
            let branches = vec![IfBranch { condition: cond, body: vec![then_stmt] }];
            let else_body = if self.match_keyword(Keyword::Else) {
                Some(vec![self.parse_simple_stmt(hs)?])
            } else {
                None
            };
            self.expect_line_end()?;
            return Ok(Stmt::new(pos, StmtKind::If { branches, else_body }));
        }

        self.cur.pop()?; // LineEnd
        let mut branches: Vec<IfBranch> = Vec::new();
        let mut cur_cond = cond;
        let mut cur_body: Vec<Stmt> = Vec::new();
        loop {
            if self.cur.eof() {
                return Err(LingoError::parse(pos, "unterminated if statement"));
            }
            if self.match_line_end() {
                continue;
            }
            let t = self.cur.peek()?;
            if t.is_keyword(Keyword::Else) {
                self.cur.pop()?;
                if self.cur.peek()?.is_word(WordId::If) {
                    self.cur.pop()?;
                    let next_cond = self.parse_expr_bp(hs, 0, true)?;
                    self.expect_keyword(Keyword::Then, "expected 'then' after if condition")?;
                    self.expect_line_end()?;
                    branches.push(IfBranch { condition: cur_cond, body: cur_body });
                    cur_cond = next_cond;
                    cur_body = Vec::new();
                    continue;
                }
                self.expect_line_end()?;
                branches.push(IfBranch { condition: cur_cond, body: cur_body });
                let mut else_body: Vec<Stmt> = Vec::new();
                loop {
                    if self.cur.eof() {
                        return Err(LingoError::parse(pos, "unterminated if statement"));
                    }
                    if self.match_line_end() {
                        continue;
                    }
                    if self.cur.peek()?.is_word(WordId::End) {
                        self.cur.pop()?;
                        self.expect_word(WordId::If, "expected 'if' after 'end'")?;
                        self.expect_line_end()?;
                        break;
                    }
                    if let Some(s) = self.parse_statement(hs)? {
                        else_body.push(s);
                    }
                }
                return Ok(Stmt::new(pos, StmtKind::If { branches, else_body: Some(else_body) }));
            }
            if t.is_word(WordId::End) {
                self.cur.pop()?;
                self.expect_word(WordId::If, "expected 'if' after 'end'")?;
                self.expect_line_end()?;
                branches.push(IfBranch { condition: cur_cond, body: cur_body });
                return Ok(Stmt::new(pos, StmtKind::If { branches, else_body: None }));
            }
            if let Some(s) = self.parse_statement(hs)? {
                cur_body.push(s);
            }
        }
    }

    fn parse_repeat(&mut self, hs: &mut HandlerScope) -> Result<Stmt> {
        let pos = self.cur.pos();
        self.cur.pop()?; // 'repeat'

        if self.match_word(WordId::While) {
            let condition = self.parse_expr_bp(hs, 0, true)?;
            self.discard_to_line_end();
            let body = self.parse_repeat_body(hs, pos)?;
            return Ok(Stmt::new(pos, StmtKind::RepeatWhile { condition, body }));
        }

        if self.match_word(WordId::With) {
            let (name, npos) = self.expect_any_word()?;
            let scope = match resolve(&self.script, hs, &name) {
                Some(s) => s,
                None => {
                    hs.locals.push(name.clone());
                    Scope::Local
                }
            };
            let iterator = Expr::new(npos, ExprKind::Identifier { name, scope });

            if self.match_symbol(Sym::Equal) {
                let init = self.parse_expr_bp(hs, 0, true)?;
                let down = self.match_word(WordId::Down);
                self.expect_word(WordId::To, "expected 'to' in repeat header")?;
                let to = self.parse_expr_bp(hs, 0, true)?;
                self.discard_to_line_end();
                let body = self.parse_repeat_body(hs, pos)?;
                return Ok(Stmt::new(
                    pos,
                    StmtKind::RepeatTo {
                        iterator: Box::new(iterator),
                        init: Box::new(init),
                        to: Box::new(to),
                        down,
                        body,
                    },
                ));
            }
            if self.match_word(WordId::In) {
                let iterable = self.parse_expr_bp(hs, 0, true)?;
                self.discard_to_line_end();
                let body = self.parse_repeat_body(hs, pos)?;
                return Ok(Stmt::new(
                    pos,
                    StmtKind::RepeatIn {
                        iterator: Box::new(iterator),
                        iterable: Box::new(iterable),
                        body,
                    },
                ));
            }
            let t = self.cur.peek()?;
            return Err(LingoError::parse(
                t.pos,
                format!("expected '=' or 'in' in repeat header, got {}", token_desc(&t.kind)),
            ));
        }

        let t = self.cur.peek()?;
        Err(LingoError::parse(
            t.pos,
            format!("expected 'while' or 'with' after 'repeat', got {}", token_desc(&t.kind)),
        ))
    }

    fn parse_repeat_body(&mut self, hs: &mut HandlerScope, start: Pos) -> Result<Vec<Stmt>> {
        let mut body: Vec<Stmt> = Vec::new();
        loop {
            if self.cur.eof() {
                return Err(LingoError::parse(start, "unterminated repeat statement"));
            }
            if self.match_line_end() {
                continue;
            }
            if self.cur.peek()?.is_word(WordId::End) {
                self.cur.pop()?;
                self.expect_word(WordId::Repeat, "expected 'repeat' after 'end'")?;
                self.expect_line_end()?;
                return Ok(body);
            }
            if let Some(s) = self.parse_statement(hs)? {
                body.push(s);
            }
        }
    }

    /// A statement in the inline position of a case clause: block forms
    /// go through the full statement parser, everything else is a simple
    /// statement followed by its line end.
    fn parse_clause_stmt(&mut self, hs: &mut HandlerScope) -> Result<Option<Stmt>> {
        let is_block = matches!(
            self.cur.peek()?.kind,
            TokenKind::Word(WordId::If, _)
                | TokenKind::Word(WordId::Repeat, _)
                | TokenKind::Word(WordId::Case, _)
        );
        if is_block {
            self.parse_statement(hs)
        } else {
            let s = self.parse_simple_stmt(hs)?;
            self.expect_line_end()?;
            Ok(Some(s))
        }
    }

    /// Does the current line look like a case-clause label, i.e. is there
    /// a colon at bracket depth zero before the next line end?
    fn at_case_label(&self) -> bool {
        let mut depth = 0i32;
        for t in &self.cur.toks[self.cur.i..] {
            match &t.kind {
                TokenKind::LineEnd => return false,
                TokenKind::Symbol(Sym::LParen)
                | TokenKind::Symbol(Sym::LBracket)
                | TokenKind::Symbol(Sym::LBrace) => depth += 1,
                TokenKind::Symbol(Sym::RParen)
                | TokenKind::Symbol(Sym::RBracket)
                | TokenKind::Symbol(Sym::RBrace) => depth -= 1,
                TokenKind::Symbol(Sym::Colon) if depth == 0 => return true,
                _ => {}
            }
        }
        false
    }

    fn parse_case(&mut self, hs: &mut HandlerScope) -> Result<Stmt> {
        let pos = self.cur.pos();
        self.cur.pop()?; // 'case'
        let scrutinee = self.parse_expr_bp(hs, 0, true)?;
        self.expect_word(WordId::Of, "expected 'of' in case header")?;
        self.expect_line_end()?;

        let mut clauses: Vec<CaseClause> = Vec::new();
        let mut otherwise: Option<Vec<Stmt>> = None;
        loop {
            if self.cur.eof() {
                return Err(LingoError::parse(pos, "unterminated case statement"));
            }
            if self.match_line_end() {
                continue;
            }
            let t = self.cur.peek()?;
            if t.is_word(WordId::End) {
                self.cur.pop()?;
                self.expect_word(WordId::Case, "expected 'case' after 'end'")?;
                self.expect_line_end()?;
                break;
            }
            if t.is_word(WordId::Otherwise) {
                self.cur.pop()?;
                let _ = self.match_symbol(Sym::Colon);
                let mut body: Vec<Stmt> = Vec::new();
                if !self.cur.peek()?.is_line_end() {
                    if let Some(s) = self.parse_clause_stmt(hs)? {
                        body.push(s);
                    }
                }
                loop {
                    if self.cur.eof() {
                        return Err(LingoError::parse(pos, "unterminated case statement"));
                    }
                    if self.match_line_end() {
                        continue;
                    }
                    if self.cur.peek()?.is_word(WordId::End) {
                        self.cur.pop()?;
                        self.expect_word(WordId::Case, "expected 'case' after 'end'")?;
                        self.expect_line_end()?;
                        break;
                    }
                    if let Some(s) = self.parse_statement(hs)? {
                        body.push(s);
                    }
                }
                otherwise = Some(body);
                break;
            }

            // clause: literal[, literal ...] ':' then inline or block body
            let mut literals = vec![self.parse_expr_bp(hs, 0, true)?];
            while self.match_symbol(Sym::Comma) {
                literals.push(self.parse_expr_bp(hs, 0, true)?);
            }
            self.expect_symbol(Sym::Colon, "expected ':' after case clause literals")?;
            let mut body: Vec<Stmt> = Vec::new();
            if !self.cur.peek()?.is_line_end() {
                if let Some(s) = self.parse_clause_stmt(hs)? {
                    body.push(s);
                }
            } else {
                self.cur.pop()?;
                loop {
                    if self.cur.eof() {
                        return Err(LingoError::parse(pos, "unterminated case statement"));
                    }
                    if self.match_line_end() {
                        continue;
                    }
                    let t2 = self.cur.peek()?;
                    if t2.is_word(WordId::End) || t2.is_word(WordId::Otherwise) {
                        break;
                    }
                    if self.at_case_label() {
                        break;
                    }
                    if let Some(s) = self.parse_statement(hs)? {
                        body.push(s);
                    }
                }
            }
            clauses.push(CaseClause { literals, body });
        }

        Ok(Stmt::new(pos, StmtKind::Case { expr: scrutinee, clauses, otherwise }))
    }

    // ---- expressions ----

    fn peek_binop(&self) -> Option<(BinOp, u8, u8)> {
        let t = self.cur.peek_at(0)?;
        match &t.kind {
            TokenKind::Symbol(Sym::Equal) => Some((BinOp::Eq, 10, 11)),
            TokenKind::Symbol(Sym::NotEqual) => Some((BinOp::Ne, 10, 11)),
            TokenKind::Symbol(Sym::Lt) => Some((BinOp::Lt, 10, 11)),
            TokenKind::Symbol(Sym::Gt) => Some((BinOp::Gt, 10, 11)),
            TokenKind::Symbol(Sym::Le) => Some((BinOp::Le, 10, 11)),
            TokenKind::Symbol(Sym::Ge) => Some((BinOp::Ge, 10, 11)),
            TokenKind::Symbol(Sym::Ampersand) => Some((BinOp::Concat, 20, 21)),
            TokenKind::Symbol(Sym::ConcatSp) => Some((BinOp::ConcatSp, 20, 21)),
            TokenKind::Symbol(Sym::Plus) => Some((BinOp::Add, 30, 31)),
            TokenKind::Symbol(Sym::Minus) => Some((BinOp::Sub, 30, 31)),
            TokenKind::Symbol(Sym::Star) => Some((BinOp::Mul, 40, 41)),
            TokenKind::Symbol(Sym::Slash) => Some((BinOp::Div, 40, 41)),
            TokenKind::Keyword(Keyword::Mod) => Some((BinOp::Mod, 40, 41)),
            TokenKind::Keyword(Keyword::And) => Some((BinOp::And, 40, 41)),
            TokenKind::Keyword(Keyword::Or) => Some((BinOp::Or, 40, 41)),
            _ => None,
        }
    }

    /// Precedence-climbing expression parser. `allow_eq` is false only
    /// for the leading expression of a statement, where a top-level `=`
    /// belongs to assignment rather than comparison.
    fn parse_expr_bp(&mut self, hs: &HandlerScope, min_bp: u8, allow_eq: bool) -> Result<Expr> {
        let mut lhs = self.parse_unary(hs)?;
        loop {
            let Some((op, lbp, rbp)) = self.peek_binop() else { break };
            if lbp < min_bp {
                break;
            }
            if op == BinOp::Eq && !allow_eq {
                break;
            }
            self.cur.pop()?;
            let rhs = self.parse_expr_bp(hs, rbp, true)?;
            let pos = lhs.pos;
            lhs = Expr::new(
                pos,
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, hs: &HandlerScope) -> Result<Expr> {
        let t = self.cur.peek()?;
        let pos = t.pos;
        if t.is_symbol(Sym::Minus) {
            self.cur.pop()?;
            // fold into an immediately-following numeric literal
            match self.cur.peek()?.kind {
                TokenKind::Integer(v) => {
                    self.cur.pop()?;
                    return Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Int(v.wrapping_neg()))));
                }
                TokenKind::Float(v) => {
                    self.cur.pop()?;
                    return Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Float(-v))));
                }
                _ => {
                    let e = self.parse_unary(hs)?;
                    return Ok(Expr::new(pos, ExprKind::Unary { op: UnOp::Neg, expr: Box::new(e) }));
                }
            }
        }
        if t.is_keyword(Keyword::Not) {
            self.cur.pop()?;
            let e = self.parse_unary(hs)?;
            return Ok(Expr::new(pos, ExprKind::Unary { op: UnOp::Not, expr: Box::new(e) }));
        }
        self.parse_postfix(hs)
    }

    fn parse_postfix(&mut self, hs: &HandlerScope) -> Result<Expr> {
        let mut e = self.parse_atom(hs)?;
        loop {
            if self.match_symbol(Sym::LParen) {
                let mut args: Vec<Expr> = Vec::new();
                if !self.cur.peek()?.is_symbol(Sym::RParen) {
                    loop {
                        args.push(self.parse_expr_bp(hs, 0, true)?);
                        if !self.match_symbol(Sym::Comma) {
                            break;
                        }
                    }
                }
                self.expect_symbol(Sym::RParen, "expected ')' after arguments")?;
                let pos = e.pos;
                e = Expr::new(pos, ExprKind::Call { callee: Box::new(e), args });
                continue;
            }
            if self.match_symbol(Sym::Period) {
                let (name, _) = self.expect_any_word()?;
                let pos = e.pos;
                e = Expr::new(pos, ExprKind::Dot { expr: Box::new(e), name });
                continue;
            }
            if self.match_symbol(Sym::LBracket) {
                let from = self.parse_expr_bp(hs, 0, true)?;
                let to = if self.match_symbol(Sym::Range) {
                    Some(Box::new(self.parse_expr_bp(hs, 0, true)?))
                } else {
                    None
                };
                self.expect_symbol(Sym::RBracket, "expected ']' after index")?;
                let pos = e.pos;
                e = Expr::new(
                    pos,
                    ExprKind::Index { expr: Box::new(e), from: Box::new(from), to },
                );
                continue;
            }
            break;
        }
        Ok(e)
    }

    fn parse_atom(&mut self, hs: &HandlerScope) -> Result<Expr> {
        let t = self.cur.peek()?.clone();
        let pos = t.pos;
        match t.kind {
            TokenKind::Integer(v) => {
                self.cur.pop()?;
                Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Int(v))))
            }
            TokenKind::Float(v) => {
                self.cur.pop()?;
                Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Float(v))))
            }
            TokenKind::Str(s) => {
                self.cur.pop()?;
                Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Str(s))))
            }
            TokenKind::SymbolLit(s) => {
                self.cur.pop()?;
                Ok(Expr::new(pos, ExprKind::Literal(LiteralValue::Symbol(s))))
            }
            TokenKind::Symbol(Sym::LParen) => {
                self.cur.pop()?;
                let e = self.parse_expr_bp(hs, 0, true)?;
                self.expect_symbol(Sym::RParen, "expected ')'")?;
                Ok(e)
            }
            TokenKind::Symbol(Sym::LBracket) => self.parse_list_literal(hs),
            TokenKind::Word(WordId::The, _) => {
                self.cur.pop()?;
                let (name, npos) = self.expect_any_word()?;
                match THE_IDS.get(name.as_str()) {
                    Some(id) => Ok(Expr::new(pos, ExprKind::The(*id))),
                    None => Err(LingoError::parse(
                        npos,
                        format!("unknown 'the' built-in '{}'", name),
                    )),
                }
            }
            TokenKind::Word(_, ref name) => {
                let name = name.clone();
                self.cur.pop()?;
                if let Some(lit) = BUILTIN_IDENTS.get(name.as_str()) {
                    return Ok(Expr::new(pos, ExprKind::Literal(lit.clone())));
                }
                match resolve(&self.script, hs, &name) {
                    Some(scope) => Ok(Expr::new(pos, ExprKind::Identifier { name, scope })),
                    None => {
                        // any bare word can name a handler when called
                        let is_call = self
                            .cur
                            .peek_at(0)
                            .map(|n| n.is_symbol(Sym::LParen))
                            .unwrap_or(false);
                        if is_call {
                            Ok(Expr::new(
                                pos,
                                ExprKind::Identifier { name, scope: Scope::Local },
                            ))
                        } else {
                            Err(LingoError::parse(
                                pos,
                                format!("use of undeclared identifier '{}'", name),
                            ))
                        }
                    }
                }
            }
            other => Err(LingoError::parse(
                pos,
                format!("unexpected {} in expression", token_desc(&other)),
            )),
        }
    }

    fn parse_list_literal(&mut self, hs: &HandlerScope) -> Result<Expr> {
        let pos = self.cur.pos();
        self.cur.pop()?; // '['
        if self.match_symbol(Sym::RBracket) {
            return Ok(Expr::new(pos, ExprKind::List(Vec::new())));
        }
        if self.match_symbol(Sym::Colon) {
            self.expect_symbol(Sym::RBracket, "expected ']' after ':'")?;
            return Ok(Expr::new(pos, ExprKind::PropList(Vec::new())));
        }

        let first = self.parse_expr_bp(hs, 0, true)?;
        if self.match_symbol(Sym::Colon) {
            let value = self.parse_expr_bp(hs, 0, true)?;
            let mut pairs = vec![(first, value)];
            while self.match_symbol(Sym::Comma) {
                let k = self.parse_expr_bp(hs, 0, true)?;
                self.expect_symbol(Sym::Colon, "expected ':' in property list")?;
                let v = self.parse_expr_bp(hs, 0, true)?;
                pairs.push((k, v));
            }
            self.expect_symbol(Sym::RBracket, "expected ']' after property list")?;
            return Ok(Expr::new(pos, ExprKind::PropList(pairs)));
        }

        let mut items = vec![first];
        while self.match_symbol(Sym::Comma) {
            items.push(self.parse_expr_bp(hs, 0, true)?);
        }
        self.expect_symbol(Sym::RBracket, "expected ']' after list")?;
        Ok(Expr::new(pos, ExprKind::List(items)))
    }
}
