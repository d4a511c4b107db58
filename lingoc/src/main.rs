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

//! lingoc: compile a Lingo script to a bytecode program, or disassemble,
//! run or analyze it. Exit codes: 0 success, 1 pipeline diagnostic,
//! 2 argument misuse. A single `-` names the corresponding standard
//! stream.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::process::exit;

use lingo_bytecode::{disassemble, serialize_chunks};
use lingo_compiler::service::analyze_source;
use lingo_vm::VM;

#[derive(PartialEq, Eq, Clone, Copy)]
enum Mode {
    Compile,
    Disasm,
    Run,
    Analyze,
}

fn print_usage() {
    eprintln!("usage: lingoc [--disasm | --run | --analyze] <input> [output]");
    eprintln!("  compiles <input> to a bytecode program written to <output>");
    eprintln!("  --disasm   write a disassembly listing instead of bytecode");
    eprintln!("  --run      compile and run the program's main handler");
    eprintln!("  --analyze  print JSON diagnostics and symbols");
    eprintln!("  a single '-' names the corresponding standard stream");
}

fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        Ok(src)
    } else {
        fs::read_to_string(path)
    }
}

fn write_output(path: &str, bytes: &[u8]) -> io::Result<()> {
    if path == "-" {
        io::stdout().write_all(bytes)
    } else {
        fs::write(path, bytes)
    }
}

fn main() {
    let mut mode = Mode::Compile;
    let mut positional: Vec<String> = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--disasm" => mode = Mode::Disasm,
            "--run" => mode = Mode::Run,
            "--analyze" => mode = Mode::Analyze,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other if other.starts_with("--") => {
                eprintln!("error: unknown option '{}'", other);
                print_usage();
                exit(2);
            }
            _ => positional.push(arg),
        }
    }

    let want_output = mode == Mode::Compile || mode == Mode::Disasm;
    let expected = if want_output { 2 } else { 1 };
    if positional.len() != expected {
        print_usage();
        exit(2);
    }

    let input = &positional[0];
    let src = match read_input(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read {}: {}", input, e);
            exit(1);
        }
    };

    if mode == Mode::Analyze {
        let diags = analyze_source(&src);
        match serde_json::to_string_pretty(&diags) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("error: {}", e);
                exit(1);
            }
        }
        if !diags.errors.is_empty() {
            exit(1);
        }
        return;
    }

    let chunks = match lingo_compiler::compile(&src) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    match mode {
        Mode::Compile => {
            let bytes = serialize_chunks(&chunks);
            if let Err(e) = write_output(&positional[1], &bytes) {
                eprintln!("error: could not write {}: {}", positional[1], e);
                exit(1);
            }
        }
        Mode::Disasm => {
            let mut text = String::new();
            for c in &chunks {
                text.push_str(&format!(
                    "=== handler {} (nargs={}, nlocals={}) ===\n",
                    c.name(),
                    c.nargs(),
                    c.nlocals()
                ));
                text.push_str(&disassemble(c));
                text.push('\n');
            }
            if let Err(e) = write_output(&positional[1], text.as_bytes()) {
                eprintln!("error: could not write {}: {}", positional[1], e);
                exit(1);
            }
        }
        Mode::Run => {
            let entry = if chunks.iter().any(|c| c.name() == "main") {
                "main".to_string()
            } else {
                match chunks.first() {
                    Some(c) => c.name().to_string(),
                    None => {
                        eprintln!("error: program has no handlers");
                        exit(1);
                    }
                }
            };
            let mut vm = VM::new();
            vm.register_all(chunks);
            if let Err(e) = vm.run(&entry) {
                eprintln!("{}", e);
                exit(1);
            }
        }
        Mode::Analyze => unreachable!("handled above"),
    }
}
