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

//! Frame-based stack VM. Single-threaded dispatch loop over packed
//! 32-bit instructions; operand stack plus a call stack of activation
//! records; globals and interned symbols are VM-wide. Errors unwind all
//! frames. No instruction blocks; a cooperative cancel flag is checked
//! at every back-edge and at RET.

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lingo_bytecode::{
    decode_i16, decode_op, decode_u16, decode_u8, decode_u8_hi, Chunk, Const, Op,
};
use lingo_common::{LingoError, Result};

pub mod host;
pub mod value;

pub use host::{DefaultHost, HostEnv};
pub use value::{stringify, values_equal, Value};

pub const STACK_MAX: usize = 256;
pub const FRAMES_MAX: usize = 256;

/// Shared flag for cooperative cancellation; an external watcher sets
/// it, the VM raises a cancellation error at the next back-edge or RET.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct Frame {
    chunk: Rc<Chunk>,
    ip: usize,
    base: usize,
}

pub struct VM {
    handlers: HashMap<String, Rc<Chunk>>,
    globals: HashMap<String, Value>,
    symbols: HashMap<String, Rc<String>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    host: Box<dyn HostEnv>,
    out: Box<dyn Write>,
    cancel: Arc<AtomicBool>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        Self::with_output(Box::new(std::io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self {
            handlers: HashMap::new(),
            globals: HashMap::new(),
            symbols: HashMap::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            host: Box::new(DefaultHost::new()),
            out,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn set_host(&mut self, host: Box<dyn HostEnv>) {
        self.host = host;
    }

    /// Register one compiled handler under its name.
    pub fn register(&mut self, chunk: Chunk) {
        self.handlers.insert(chunk.name().to_string(), Rc::new(chunk));
    }

    pub fn register_all(&mut self, chunks: Vec<Chunk>) {
        for c in chunks {
            self.register(c);
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancel))
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Interned symbol value, for embedders constructing arguments.
    pub fn symbol(&mut self, s: &str) -> Value {
        Value::Symbol(self.intern(s))
    }

    /// Run a registered handler with no arguments.
    pub fn run(&mut self, entry: &str) -> Result<Value> {
        self.call(entry, Vec::new())
    }

    /// Run a registered handler with arguments. For a zero-parameter
    /// handler the single implicit slot is `me`, so one argument may
    /// still be supplied as the receiver.
    pub fn call(&mut self, entry: &str, args: Vec<Value>) -> Result<Value> {
        let res = self.call_inner(entry, args);
        if res.is_err() {
            self.frames.clear();
            self.stack.clear();
        }
        res
    }

    fn call_inner(&mut self, entry: &str, args: Vec<Value>) -> Result<Value> {
        let chunk = self.handlers.get(entry).cloned().ok_or_else(|| {
            LingoError::runtime(entry, 0, format!("unknown handler '{}'", entry))
        })?;
        let argc = args.len();
        for a in args {
            self.push(a)?;
        }
        self.push_frame(chunk, argc)?;
        self.exec()
    }

    // ---- plumbing ----

    fn rerr(&self, msg: impl Into<String>) -> LingoError {
        match self.frames.last() {
            Some(f) => LingoError::runtime(
                f.chunk.name(),
                f.ip.saturating_sub(1) as u32,
                msg,
            ),
            None => LingoError::runtime("<vm>", 0, msg),
        }
    }

    fn push(&mut self, v: Value) -> Result<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.rerr("operand stack overflow"));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => Err(self.rerr("operand stack underflow")),
        }
    }

    fn intern(&mut self, s: &str) -> Rc<String> {
        if let Some(r) = self.symbols.get(s) {
            return Rc::clone(r);
        }
        let r = Rc::new(s.to_string());
        self.symbols.insert(s.to_string(), Rc::clone(&r));
        r
    }

    fn const_string(&self, chunk: &Chunk, k: u16) -> Result<String> {
        if k >= chunk.nconsts() {
            return Err(self.rerr("constant index out of range"));
        }
        match chunk.const_at(k) {
            Const::Sym(off) | Const::Str(off) => Ok(chunk.string_at(off).to_string()),
            _ => Err(self.rerr("expected a name constant")),
        }
    }

    fn truthy(&self, v: &Value) -> Result<bool> {
        match v {
            Value::Int(i) => Ok(*i != 0),
            Value::Void => Ok(false),
            other => {
                Err(self.rerr(format!("expected integer or void, got {}", other.type_name())))
            }
        }
    }

    fn push_frame(&mut self, chunk: Rc<Chunk>, argc: usize) -> Result<()> {
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.rerr(format!("call stack overflow calling '{}'", chunk.name())));
        }
        let nargs = chunk.nargs() as usize;
        if argc > nargs {
            return Err(self.rerr(format!(
                "too many arguments to handler '{}': expected {}, got {}",
                chunk.name(),
                nargs,
                argc
            )));
        }
        let nslots = nargs + chunk.nlocals() as usize;
        let base = self.stack.len() - argc;
        for _ in argc..nslots {
            self.push(Value::Void)?;
        }
        self.frames.push(Frame { chunk, ip: 0, base });
        Ok(())
    }

    fn branch(&mut self, off: i64) -> Result<()> {
        let (ip, n) = {
            let f = self.frames.last().expect("active frame");
            (f.ip as i64, f.chunk.ninstr() as i64)
        };
        let target = ip + off;
        if target < 0 || target > n {
            return Err(self.rerr("jump out of range"));
        }
        self.frames.last_mut().expect("active frame").ip = target as usize;
        Ok(())
    }

    // ---- dispatch ----

    fn exec(&mut self) -> Result<Value> {
        loop {
            let (word, chunk, base) = {
                let f = match self.frames.last() {
                    Some(f) => f,
                    None => return Err(self.rerr("no active frame")),
                };
                if f.ip >= f.chunk.ninstr() as usize {
                    return Err(self.rerr("instruction pointer out of range"));
                }
                (f.chunk.instr(f.ip), Rc::clone(&f.chunk), f.base)
            };
            self.frames.last_mut().expect("active frame").ip += 1;

            let byte = decode_op(word);
            let op = match Op::from_byte(byte) {
                Some(op) => op,
                None => return Err(self.rerr(format!("bad opcode {}", byte))),
            };

            match op {
                Op::Ret => {
                    if self.cancel.load(Ordering::Relaxed) {
                        return Err(self.rerr("execution cancelled"));
                    }
                    let ret = self.pop()?;
                    let frame = self.frames.pop().expect("active frame");
                    self.stack.truncate(frame.base);
                    if self.frames.is_empty() {
                        return Ok(ret);
                    }
                    self.push(ret)?;
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::Dup => {
                    let v = match self.stack.last() {
                        Some(v) => v.clone(),
                        None => return Err(self.rerr("operand stack underflow")),
                    };
                    self.push(v)?;
                }
                Op::LoadVoid => self.push(Value::Void)?,
                Op::LoadI0 => self.push(Value::Int(0))?,
                Op::LoadI1 => self.push(Value::Int(1))?,
                Op::LoadC => {
                    let k = decode_u16(word);
                    if k >= chunk.nconsts() {
                        return Err(self.rerr("constant index out of range"));
                    }
                    let v = match chunk.const_at(k) {
                        Const::Void => Value::Void,
                        Const::Int(i) => Value::Int(i),
                        Const::Float(f) => Value::Float(f),
                        Const::Str(off) => Value::Str(Rc::new(chunk.string_at(off).to_string())),
                        Const::Sym(off) => {
                            let s = chunk.string_at(off).to_string();
                            Value::Symbol(self.intern(&s))
                        }
                    };
                    self.push(v)?;
                }
                Op::LoadL | Op::LoadL0 => {
                    let slot = if op == Op::LoadL0 { 0 } else { decode_u16(word) as usize };
                    let v = match self.stack.get(base + slot) {
                        Some(v) => v.clone(),
                        None => return Err(self.rerr("local slot out of range")),
                    };
                    self.push(v)?;
                }
                Op::StoreL => {
                    let slot = decode_u16(word) as usize;
                    let v = self.pop()?;
                    if base + slot >= self.stack.len() {
                        return Err(self.rerr("local slot out of range"));
                    }
                    self.stack[base + slot] = v;
                }
                Op::LoadG => {
                    let name = self.const_string(&chunk, decode_u16(word))?;
                    let v = self.globals.get(&name).cloned().unwrap_or(Value::Void);
                    self.push(v)?;
                }
                Op::StoreG => {
                    let name = self.const_string(&chunk, decode_u16(word))?;
                    let v = self.pop()?;
                    self.globals.insert(name, v);
                }
                Op::Unm => {
                    let v = self.pop()?;
                    let out = match v {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(self.rerr(format!(
                                "cannot negate a {}",
                                other.type_name()
                            )));
                        }
                    };
                    self.push(out)?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                    self.binary_arith(op)?;
                }
                Op::Lt | Op::Gt | Op::Lte | Op::Gte => {
                    self.binary_cmp(op)?;
                }
                Op::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Int(values_equal(&a, &b) as i32))?;
                }
                Op::And | Op::Or => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let ta = self.truthy(&a)?;
                    let tb = self.truthy(&b)?;
                    let r = if op == Op::And { ta && tb } else { ta || tb };
                    self.push(Value::Int(r as i32))?;
                }
                Op::Not => {
                    let v = self.pop()?;
                    let t = self.truthy(&v)?;
                    self.push(Value::Int(!t as i32))?;
                }
                Op::Concat | Op::ConcatSp => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let mut s = stringify(&a);
                    if op == Op::ConcatSp {
                        s.push(' ');
                    }
                    s.push_str(&stringify(&b));
                    self.push(Value::string(s))?;
                }
                Op::Jmp => {
                    let off = decode_i16(word) as i64;
                    if off < 0 && self.cancel.load(Ordering::Relaxed) {
                        return Err(self.rerr("execution cancelled"));
                    }
                    self.branch(off)?;
                }
                Op::Brt | Op::Brf => {
                    let off = decode_i16(word) as i64;
                    let v = self.pop()?;
                    let t = self.truthy(&v)?;
                    let take = if op == Op::Brt { t } else { !t };
                    if take {
                        self.branch(off)?;
                    }
                }
                Op::Call => {
                    let name = self.const_string(&chunk, decode_u16(word))?;
                    let n = decode_u8_hi(word) as usize;
                    if self.stack.len() < n {
                        return Err(self.rerr("operand stack underflow"));
                    }
                    if let Some(h) = self.handlers.get(&name).cloned() {
                        self.push_frame(h, n)?;
                    } else {
                        let mut args = Vec::with_capacity(n);
                        for _ in 0..n {
                            args.push(self.pop()?);
                        }
                        args.reverse();
                        let v = self.call_native(&name, args)?;
                        self.push(v)?;
                    }
                }
                Op::OCall => {
                    let name = self.const_string(&chunk, decode_u16(word))?;
                    let n = decode_u8_hi(word) as usize;
                    let mut args = Vec::with_capacity(n);
                    for _ in 0..n {
                        args.push(self.pop()?);
                    }
                    args.reverse();
                    let recv = self.pop()?;
                    let v = self.ocall(&recv, &name, args)?;
                    self.push(v)?;
                }
                Op::OIdxG => {
                    let idx = self.pop()?;
                    let obj = self.pop()?;
                    let v = self.index_get(&obj, &idx)?;
                    self.push(v)?;
                }
                Op::OIdxS => {
                    let idx = self.pop()?;
                    let obj = self.pop()?;
                    let val = self.pop()?;
                    self.index_set(&obj, &idx, val)?;
                }
                Op::OIdxK => {
                    let idx = self.pop()?;
                    let key = self.pop()?;
                    let obj = self.pop()?;
                    let mid = self.index_get(&obj, &key)?;
                    let v = self.index_get(&mid, &idx)?;
                    self.push(v)?;
                }
                Op::OIdxKr => {
                    let hi = self.pop()?;
                    let lo = self.pop()?;
                    let key = self.pop()?;
                    let obj = self.pop()?;
                    let target = match key {
                        Value::Void => obj,
                        key => self.index_get(&obj, &key)?,
                    };
                    let v = self.range_get(&target, &lo, &hi)?;
                    self.push(v)?;
                }
                Op::The => {
                    let id = decode_u8(word);
                    let v = match id {
                        0 => Value::string(self.host.movie_path()),
                        1 => Value::Int(self.host.frame()),
                        2 => Value::string(self.host.dir_separator()),
                        3 => Value::Int(self.host.milliseconds()),
                        4 => self.host.random_seed(),
                        5 => Value::string(self.host.platform()),
                        other => {
                            return Err(self.rerr(format!("unknown 'the' built-in id {}", other)));
                        }
                    };
                    self.push(v)?;
                }
                Op::NewLList => {
                    let cap = decode_u16(word) as usize;
                    self.push(Value::LList(Rc::new(std::cell::RefCell::new(Vec::with_capacity(
                        cap,
                    )))))?;
                }
                Op::NewPList => {
                    self.push(Value::prop_list(Vec::new()))?;
                }
                Op::Case => {
                    return Err(self.rerr("CASE jump tables are not emitted by this compiler"));
                }
                Op::Put => {
                    let v = self.pop()?;
                    let s = stringify(&v);
                    let res = writeln!(self.out, "{}", s);
                    if let Err(e) = res {
                        return Err(self.rerr(format!("put failed: {}", e)));
                    }
                }
            }
        }
    }

    // ---- operators ----

    fn binary_arith(&mut self, op: Op) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let v = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => {
                let (x, y) = (*x, *y);
                match op {
                    Op::Add => Value::Int(x.wrapping_add(y)),
                    Op::Sub => Value::Int(x.wrapping_sub(y)),
                    Op::Mul => Value::Int(x.wrapping_mul(y)),
                    Op::Div => {
                        if y == 0 {
                            return Err(self.rerr("integer division by zero"));
                        }
                        Value::Int(x.wrapping_div(y))
                    }
                    Op::Mod => {
                        if y == 0 {
                            return Err(self.rerr("integer modulo by zero"));
                        }
                        Value::Int(x.wrapping_rem(y))
                    }
                    _ => unreachable!("non-arithmetic opcode"),
                }
            }
            _ => {
                let xf = match &a {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    other => {
                        return Err(self.rerr(format!(
                            "invalid operand types for arithmetic: {} and {}",
                            other.type_name(),
                            b.type_name()
                        )));
                    }
                };
                let yf = match &b {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    other => {
                        return Err(self.rerr(format!(
                            "invalid operand types for arithmetic: {} and {}",
                            a.type_name(),
                            other.type_name()
                        )));
                    }
                };
                match op {
                    Op::Add => Value::Float(xf + yf),
                    Op::Sub => Value::Float(xf - yf),
                    Op::Mul => Value::Float(xf * yf),
                    // floating division by zero follows IEEE
                    Op::Div => Value::Float(xf / yf),
                    Op::Mod => Value::Float(xf % yf),
                    _ => unreachable!("non-arithmetic opcode"),
                }
            }
        };
        self.push(v)
    }

    fn binary_cmp(&mut self, op: Op) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let res = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => match op {
                Op::Lt => x < y,
                Op::Gt => x > y,
                Op::Lte => x <= y,
                Op::Gte => x >= y,
                _ => unreachable!("non-comparison opcode"),
            },
            (Value::Str(x), Value::Str(y)) => match op {
                Op::Lt => x < y,
                Op::Gt => x > y,
                Op::Lte => x <= y,
                Op::Gte => x >= y,
                _ => unreachable!("non-comparison opcode"),
            },
            _ => {
                let xf = match &a {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    _ => {
                        return Err(self.rerr(format!(
                            "invalid comparison operands: {} and {}",
                            a.type_name(),
                            b.type_name()
                        )));
                    }
                };
                let yf = match &b {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    _ => {
                        return Err(self.rerr(format!(
                            "invalid comparison operands: {} and {}",
                            a.type_name(),
                            b.type_name()
                        )));
                    }
                };
                match op {
                    Op::Lt => xf < yf,
                    Op::Gt => xf > yf,
                    Op::Lte => xf <= yf,
                    Op::Gte => xf >= yf,
                    _ => unreachable!("non-comparison opcode"),
                }
            }
        };
        self.push(Value::Int(res as i32))
    }

    // ---- heap object access ----

    fn want_int(&self, what: &str, v: &Value) -> Result<i32> {
        match v {
            Value::Int(i) => Ok(*i),
            other => Err(self.rerr(format!("{} must be an integer, got {}", what, other.type_name()))),
        }
    }

    fn index_get(&self, obj: &Value, idx: &Value) -> Result<Value> {
        match obj {
            Value::LList(items) => {
                if let Value::Symbol(s) = idx {
                    if s.as_str() == "count" {
                        return Ok(Value::Int(items.borrow().len() as i32));
                    }
                }
                let i = self.want_int("list index", idx)?;
                let items = items.borrow();
                if i < 1 || i as usize > items.len() {
                    return Err(self.rerr(format!(
                        "list index {} out of range 1..{}",
                        i,
                        items.len()
                    )));
                }
                Ok(items[i as usize - 1].clone())
            }
            Value::PList(pairs) => {
                let pairs = pairs.borrow();
                for (k, v) in pairs.iter() {
                    if values_equal(k, idx) {
                        return Ok(v.clone());
                    }
                }
                if let Value::Symbol(s) = idx {
                    if s.as_str() == "count" {
                        return Ok(Value::Int(pairs.len() as i32));
                    }
                }
                Ok(Value::Void)
            }
            Value::Str(s) => {
                if let Value::Symbol(sym) = idx {
                    if sym.as_str() == "length" || sym.as_str() == "count" {
                        return Ok(Value::Int(s.chars().count() as i32));
                    }
                }
                let i = self.want_int("string index", idx)?;
                let count = s.chars().count();
                if i < 1 || i as usize > count {
                    return Err(self.rerr(format!(
                        "string index {} out of range 1..{}",
                        i, count
                    )));
                }
                let c = s.chars().nth(i as usize - 1).expect("checked index");
                Ok(Value::string(c.to_string()))
            }
            Value::Point(p) => {
                let i = self.want_int("point index", idx)?;
                if !(1..=2).contains(&i) {
                    return Err(self.rerr(format!("point index {} out of range 1..2", i)));
                }
                Ok(p.borrow()[i as usize - 1].clone())
            }
            Value::Quad(q) => {
                let i = self.want_int("rect index", idx)?;
                if !(1..=4).contains(&i) {
                    return Err(self.rerr(format!("rect index {} out of range 1..4", i)));
                }
                Ok(q.borrow()[i as usize - 1].clone())
            }
            other => Err(self.rerr(format!("cannot index a {}", other.type_name()))),
        }
    }

    fn index_set(&self, obj: &Value, idx: &Value, val: Value) -> Result<()> {
        match obj {
            Value::LList(items) => {
                let i = self.want_int("list index", idx)?;
                if i < 1 {
                    return Err(self.rerr(format!("list index {} out of range", i)));
                }
                let mut items = items.borrow_mut();
                // writing past the end grows the list with voids
                while items.len() < i as usize {
                    items.push(Value::Void);
                }
                items[i as usize - 1] = val;
                Ok(())
            }
            Value::PList(pairs) => {
                let mut pairs = pairs.borrow_mut();
                for (k, v) in pairs.iter_mut() {
                    if values_equal(k, idx) {
                        *v = val;
                        return Ok(());
                    }
                }
                pairs.push((idx.clone(), val));
                Ok(())
            }
            Value::Point(p) => {
                let i = self.want_int("point index", idx)?;
                if !(1..=2).contains(&i) {
                    return Err(self.rerr(format!("point index {} out of range 1..2", i)));
                }
                p.borrow_mut()[i as usize - 1] = val;
                Ok(())
            }
            Value::Quad(q) => {
                let i = self.want_int("rect index", idx)?;
                if !(1..=4).contains(&i) {
                    return Err(self.rerr(format!("rect index {} out of range 1..4", i)));
                }
                q.borrow_mut()[i as usize - 1] = val;
                Ok(())
            }
            other => Err(self.rerr(format!("cannot assign into a {}", other.type_name()))),
        }
    }

    fn range_get(&self, obj: &Value, lo: &Value, hi: &Value) -> Result<Value> {
        let a = self.want_int("range start", lo)?;
        let b = self.want_int("range end", hi)?;
        match obj {
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let lo = a.max(1) as usize;
                let hi = (b.min(chars.len() as i32)).max(0) as usize;
                if lo > hi {
                    return Ok(Value::string(String::new()));
                }
                Ok(Value::string(chars[lo - 1..hi].iter().collect::<String>()))
            }
            Value::LList(items) => {
                let items = items.borrow();
                let lo = a.max(1) as usize;
                let hi = (b.min(items.len() as i32)).max(0) as usize;
                if lo > hi {
                    return Ok(Value::list(Vec::new()));
                }
                Ok(Value::list(items[lo - 1..hi].to_vec()))
            }
            other => Err(self.rerr(format!("cannot take a range of a {}", other.type_name()))),
        }
    }

    fn want_args(&self, name: &str, args: &[Value], n: usize) -> Result<()> {
        if args.len() != n {
            return Err(self.rerr(format!(
                "{} expects {} argument(s), got {}",
                name,
                n,
                args.len()
            )));
        }
        Ok(())
    }

    fn ocall(&mut self, recv: &Value, name: &str, mut args: Vec<Value>) -> Result<Value> {
        match recv {
            Value::LList(items) => match name {
                "add" => {
                    self.want_args("add", &args, 1)?;
                    items.borrow_mut().push(args.pop().expect("argument"));
                    Ok(Value::Void)
                }
                "addat" => {
                    self.want_args("addat", &args, 2)?;
                    let v = args.pop().expect("argument");
                    let i = self.want_int("list index", &args[0])?;
                    let mut items = items.borrow_mut();
                    if i < 1 || i as usize > items.len() + 1 {
                        return Err(self.rerr(format!("list index {} out of range", i)));
                    }
                    items.insert(i as usize - 1, v);
                    Ok(Value::Void)
                }
                "count" => {
                    self.want_args("count", &args, 0)?;
                    Ok(Value::Int(items.borrow().len() as i32))
                }
                "getat" => {
                    self.want_args("getat", &args, 1)?;
                    self.index_get(recv, &args[0])
                }
                "setat" => {
                    self.want_args("setat", &args, 2)?;
                    let v = args.pop().expect("argument");
                    self.index_set(recv, &args[0], v)?;
                    Ok(Value::Void)
                }
                "deleteat" => {
                    self.want_args("deleteat", &args, 1)?;
                    let i = self.want_int("list index", &args[0])?;
                    let mut items = items.borrow_mut();
                    if i < 1 || i as usize > items.len() {
                        return Err(self.rerr(format!(
                            "list index {} out of range 1..{}",
                            i,
                            items.len()
                        )));
                    }
                    items.remove(i as usize - 1);
                    Ok(Value::Void)
                }
                _ => Err(self.rerr(format!("no method '{}' on list", name))),
            },
            Value::PList(pairs) => match name {
                "addprop" => {
                    self.want_args("addprop", &args, 2)?;
                    let v = args.pop().expect("argument");
                    let k = args.pop().expect("argument");
                    let mut pairs = pairs.borrow_mut();
                    for (ek, ev) in pairs.iter_mut() {
                        if values_equal(ek, &k) {
                            *ev = v;
                            return Ok(Value::Void);
                        }
                    }
                    pairs.push((k, v));
                    Ok(Value::Void)
                }
                "getaprop" => {
                    self.want_args("getaprop", &args, 1)?;
                    let pairs = pairs.borrow();
                    for (k, v) in pairs.iter() {
                        if values_equal(k, &args[0]) {
                            return Ok(v.clone());
                        }
                    }
                    Ok(Value::Void)
                }
                "deleteprop" => {
                    self.want_args("deleteprop", &args, 1)?;
                    let mut pairs = pairs.borrow_mut();
                    if let Some(at) = pairs.iter().position(|(k, _)| values_equal(k, &args[0])) {
                        pairs.remove(at);
                    }
                    Ok(Value::Void)
                }
                "count" => {
                    self.want_args("count", &args, 0)?;
                    Ok(Value::Int(pairs.borrow().len() as i32))
                }
                "getat" => {
                    self.want_args("getat", &args, 1)?;
                    let i = self.want_int("property list index", &args[0])?;
                    let pairs = pairs.borrow();
                    if i < 1 || i as usize > pairs.len() {
                        return Err(self.rerr(format!(
                            "property list index {} out of range 1..{}",
                            i,
                            pairs.len()
                        )));
                    }
                    Ok(pairs[i as usize - 1].1.clone())
                }
                _ => Err(self.rerr(format!("no method '{}' on property list", name))),
            },
            other => Err(self.rerr(format!("no method '{}' on {}", name, other.type_name()))),
        }
    }

    fn want_f64(&self, name: &str, v: &Value) -> Result<f64> {
        match v {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => {
                Err(self.rerr(format!("{} expects a number, got {}", name, other.type_name())))
            }
        }
    }

    /// Handlers not registered by the embedding fall back to a small
    /// native set.
    fn call_native(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "abs" => {
                self.want_args("abs", &args, 1)?;
                match &args[0] {
                    Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => {
                        Err(self.rerr(format!("abs expects a number, got {}", other.type_name())))
                    }
                }
            }
            "sqrt" | "cos" | "sin" | "atan" | "exp" | "log" => {
                self.want_args(name, &args, 1)?;
                let x = self.want_f64(name, &args[0])?;
                let v = match name {
                    "sqrt" => x.sqrt(),
                    "cos" => x.cos(),
                    "sin" => x.sin(),
                    "atan" => x.atan(),
                    "exp" => x.exp(),
                    _ => x.ln(),
                };
                Ok(Value::Float(v))
            }
            "string" => {
                self.want_args("string", &args, 1)?;
                Ok(Value::string(stringify(&args[0])))
            }
            "float" => {
                self.want_args("float", &args, 1)?;
                match &args[0] {
                    Value::Int(i) => Ok(Value::Float(*i as f64)),
                    Value::Float(f) => Ok(Value::Float(*f)),
                    Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        self.rerr(format!("float cannot convert \"{}\"", s))
                    }),
                    other => Err(self
                        .rerr(format!("float cannot convert a {}", other.type_name()))),
                }
            }
            "integer" => {
                self.want_args("integer", &args, 1)?;
                match &args[0] {
                    Value::Int(i) => Ok(Value::Int(*i)),
                    Value::Float(f) => Ok(Value::Int(f.trunc() as i32)),
                    Value::Str(s) => s.trim().parse::<i32>().map(Value::Int).map_err(|_| {
                        self.rerr(format!("integer cannot convert \"{}\"", s))
                    }),
                    other => Err(self
                        .rerr(format!("integer cannot convert a {}", other.type_name()))),
                }
            }
            "point" => {
                self.want_args("point", &args, 2)?;
                let mut it = args.into_iter();
                let a = it.next().expect("argument");
                let b = it.next().expect("argument");
                Ok(Value::Point(Rc::new(std::cell::RefCell::new([a, b]))))
            }
            "rect" => {
                self.want_args("rect", &args, 4)?;
                let mut it = args.into_iter();
                let a = it.next().expect("argument");
                let b = it.next().expect("argument");
                let c = it.next().expect("argument");
                let d = it.next().expect("argument");
                Ok(Value::Quad(Rc::new(std::cell::RefCell::new([a, b, c, d]))))
            }
            _ => Err(self.rerr(format!("call to unknown handler '{}'", name))),
        }
    }
}
