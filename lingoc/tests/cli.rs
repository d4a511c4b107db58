use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn lingoc_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lingoc"))
}

fn temp_path(name: &str) -> PathBuf {
    let mut p = env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    p.push(format!("lingoc_{}_{}", nanos, name));
    p
}

const HELLO: &str = "on main\n  put \"hello\"\nend\n";

#[test]
fn compiles_a_program_to_the_container_format() {
    let src = temp_path("hello.lingo");
    let out = temp_path("hello.lgc");
    fs::write(&src, HELLO).expect("write source");

    let status = Command::new(lingoc_exe())
        .arg(&src)
        .arg(&out)
        .status()
        .expect("run lingoc");
    assert!(status.success());

    let bytes = fs::read(&out).expect("read output");
    assert_eq!(&bytes[0..4], b"LGC1");

    let _ = fs::remove_file(&src);
    let _ = fs::remove_file(&out);
}

#[test]
fn disassembles_to_stdout() {
    let src = temp_path("disasm.lingo");
    fs::write(&src, HELLO).expect("write source");

    let output = Command::new(lingoc_exe())
        .arg("--disasm")
        .arg(&src)
        .arg("-")
        .output()
        .expect("run lingoc");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("handler main"), "got: {}", text);
    assert!(text.contains("LOADC"), "got: {}", text);
    assert!(text.contains("PUT"), "got: {}", text);

    let _ = fs::remove_file(&src);
}

#[test]
fn runs_the_main_handler() {
    let src = temp_path("run.lingo");
    fs::write(&src, HELLO).expect("write source");

    let output = Command::new(lingoc_exe())
        .arg("--run")
        .arg(&src)
        .output()
        .expect("run lingoc");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");

    let _ = fs::remove_file(&src);
}

#[test]
fn diagnostics_exit_one_with_position() {
    let src = temp_path("bad.lingo");
    let out = temp_path("bad.lgc");
    fs::write(&src, "on main\n  put zzz\nend\n").expect("write source");

    let output = Command::new(lingoc_exe())
        .arg(&src)
        .arg(&out)
        .output()
        .expect("run lingoc");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.starts_with("error 2:"), "got: {}", err);

    let _ = fs::remove_file(&src);
}

#[test]
fn argument_misuse_exits_two() {
    let output = Command::new(lingoc_exe()).output().expect("run lingoc");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn analyze_prints_json_symbols() {
    let src = temp_path("analyze.lingo");
    fs::write(&src, "property score\non main\n  put score\nend\n").expect("write source");

    let output = Command::new(lingoc_exe())
        .arg("--analyze")
        .arg(&src)
        .output()
        .expect("run lingoc");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("\"score\""), "got: {}", text);
    assert!(text.contains("\"main\""), "got: {}", text);

    let _ = fs::remove_file(&src);
}
