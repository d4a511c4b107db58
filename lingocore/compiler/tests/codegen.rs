use lingo_bytecode::{decode_i16, decode_op, disasm_instr, disassemble, Op};
use lingo_compiler::compile;

fn ops(chunk: &lingo_bytecode::Chunk) -> Vec<u8> {
    (0..chunk.ninstr() as usize).map(|i| decode_op(chunk.instr(i))).collect()
}

#[test]
fn echo_lowering() {
    let chunks = compile("on main\n  put \"hello\"\nend\n").expect("compile");
    assert_eq!(chunks.len(), 1);
    let c = &chunks[0];
    assert_eq!(c.name(), "main");
    assert_eq!(
        ops(c),
        vec![Op::LoadC as u8, Op::Put as u8, Op::LoadVoid as u8, Op::Ret as u8]
    );
    let listing = disassemble(c);
    assert!(listing.contains("LOADC        0 ; \"hello\""));
    assert!(listing.contains("PUT"));
}

#[test]
fn empty_handler_compiles_to_loadvoid_ret() {
    let chunks = compile("on nop\nend\n").expect("compile");
    let c = &chunks[0];
    assert_eq!(ops(c), vec![Op::LoadVoid as u8, Op::Ret as u8]);
    // zero declared parameters still get the implicit me at local 0
    assert_eq!(c.nargs(), 1);
    assert_eq!(c.local_name(0), "me");
}

#[test]
fn declared_parameters_occupy_the_low_slots() {
    let chunks = compile("on greet who, times\n  put who\nend\n").expect("compile");
    let c = &chunks[0];
    assert_eq!(c.nargs(), 2);
    assert_eq!(c.local_name(0), "who");
    assert_eq!(c.local_name(1), "times");
}

#[test]
fn property_access_goes_through_the_receiver() {
    let chunks =
        compile("property name\non getName\n  return name\nend\n").expect("compile");
    let c = &chunks[0];
    assert_eq!(
        ops(c)[0..4],
        [Op::LoadL0 as u8, Op::LoadC as u8, Op::OIdxG as u8, Op::Ret as u8]
    );
    assert_eq!(disasm_instr(c, 1), "LOADC        0 ; #name");
}

#[test]
fn duplicate_literals_share_one_pool_entry() {
    let chunks = compile("on main\n  put \"a\" & \"a\"\nend\n").expect("compile");
    assert_eq!(chunks[0].nconsts(), 1);

    let chunks = compile("on main\n  put 7 + 7 + 7\nend\n").expect("compile");
    assert_eq!(chunks[0].nconsts(), 1);
}

#[test]
fn small_integers_use_fast_paths() {
    let chunks = compile("on main\n  put 0 + 1\nend\n").expect("compile");
    let c = &chunks[0];
    assert_eq!(ops(c)[0..3], [Op::LoadI0 as u8, Op::LoadI1 as u8, Op::Add as u8]);
    assert_eq!(c.nconsts(), 0);
}

#[test]
fn compilation_is_deterministic() {
    let src = "global g\non main\n  x = [1, \"two\", #three]\n  g = x\n  helper x, 4\nend\non helper v, n\n  repeat with i = 1 to n\n    put v\n  end repeat\nend\n";
    let a = compile(src).expect("compile");
    let b = compile(src).expect("compile");
    assert_eq!(a.len(), b.len());
    for (ca, cb) in a.iter().zip(b.iter()) {
        assert_eq!(ca.blob(), cb.blob());
    }
}

#[test]
fn while_loop_emits_a_conditional_exit_and_a_back_edge() {
    let src = "on main\n  i = 1\n  repeat while i <= 3\n    i = i + 1\n  end repeat\nend\n";
    let chunks = compile(src).expect("compile");
    let c = &chunks[0];
    let ops = ops(c);
    assert!(ops.contains(&(Op::Brf as u8)));
    let mut saw_back_edge = false;
    for i in 0..c.ninstr() as usize {
        if decode_op(c.instr(i)) == Op::Jmp as u8 && decode_i16(c.instr(i)) < 0 {
            saw_back_edge = true;
        }
    }
    assert!(saw_back_edge);
}

#[test]
fn if_branches_fall_through_past_the_else() {
    let src = "on main\n  if 1 then\n    put \"y\"\n  else\n    put \"n\"\n  end if\nend\n";
    let chunks = compile(src).expect("compile");
    let c = &chunks[0];
    // LOADI1 BRF <else> LOADC PUT JMP <end> LOADC PUT LOADVOID RET
    let ops = ops(c);
    assert_eq!(ops[0], Op::LoadI1 as u8);
    assert_eq!(ops[1], Op::Brf as u8);
    assert_eq!(decode_i16(c.instr(1)), 3);
    assert_eq!(ops[4], Op::Jmp as u8);
    assert_eq!(decode_i16(c.instr(4)), 2);
}

#[test]
fn list_literals_build_through_add() {
    let chunks = compile("on main\n  x = [5, 6]\n  put x\nend\n").expect("compile");
    let c = &chunks[0];
    let ops = ops(c);
    assert_eq!(ops[0], Op::NewLList as u8);
    assert_eq!(ops[1], Op::Dup as u8);
    assert_eq!(ops[3], Op::OCall as u8);
    assert_eq!(ops[4], Op::Pop as u8);
}

#[test]
fn repeat_in_drives_a_hidden_index() {
    let src = "on main\n  repeat with x in [1, 2]\n    put x\n  end repeat\nend\n";
    let chunks = compile(src).expect("compile");
    let c = &chunks[0];
    // me + x + two generator temporaries
    assert_eq!(c.nargs(), 1);
    assert_eq!(c.nlocals(), 3);
    assert_eq!(c.local_name(1), "x");
}

#[test]
fn exit_repeat_outside_a_loop_is_rejected_by_the_generator() {
    // the parser accepts the statement form; the generator has no loop
    // to bind it to
    let err = compile("on main\n  exit repeat\nend\n").unwrap_err();
    assert!(format!("{}", err).contains("outside of a repeat loop"));
}

#[test]
fn gen_errors_carry_positions() {
    let err = compile("on main\n  exit repeat\nend\n").unwrap_err();
    assert_eq!(format!("{}", err).split(':').next(), Some("error 2"));
}
