//! Shared helpers: compile a source text, run a handler, capture what
//! `put` wrote.

// not every test binary uses every helper
#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use lingo_common::Result;
use lingo_vm::{Value, VM};

pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn capture_vm(src: &str) -> (VM, Rc<RefCell<Vec<u8>>>) {
    let chunks = lingo_compiler::compile(src).expect("compile");
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::with_output(Box::new(SharedBuf(Rc::clone(&buf))));
    vm.register_all(chunks);
    (vm, buf)
}

/// Run `entry` and return the result plus everything `put` printed.
pub fn run_capture(src: &str, entry: &str) -> (Result<Value>, String) {
    let (mut vm, buf) = capture_vm(src);
    let res = vm.run(entry);
    let out = String::from_utf8(buf.borrow().clone()).expect("utf-8 output");
    (res, out)
}

/// Run `main`, expect success, return the captured output.
#[allow(dead_code)]
pub fn run_main(src: &str) -> String {
    let (res, out) = run_capture(src, "main");
    res.expect("program runs");
    out
}

/// Run `main`, expect success, return the handler's value.
#[allow(dead_code)]
pub fn eval_main(src: &str) -> Value {
    let (res, _) = run_capture(src, "main");
    res.expect("program runs")
}
