use lingo_bytecode::{
    decode_i16, decode_op, decode_u16, decode_u8_hi, deserialize_chunks, disasm_instr, instr,
    instr_i16, instr_u16, instr_u16_u8, instr_u8, serialize_chunks, Chunk, ChunkBuilder, Const, Op,
};

fn hello_chunk() -> Chunk {
    let mut b = ChunkBuilder::new("main");
    b.register_local("me").expect("local");
    b.set_nargs(1);
    let k = b.const_str("hello").expect("const");
    b.emit(instr_u16(Op::LoadC, k), 2);
    b.emit(instr(Op::Put), 2);
    b.emit(instr(Op::LoadVoid), 3);
    b.emit(instr(Op::Ret), 3);
    b.finish()
}

#[test]
fn instruction_packing_round_trips() {
    let w = instr_u16_u8(Op::Call, 513, 7);
    assert_eq!(decode_op(w), Op::Call as u8);
    assert_eq!(decode_u16(w), 513);
    assert_eq!(decode_u8_hi(w), 7);

    let j = instr_i16(Op::Jmp, -12);
    assert_eq!(decode_op(j), Op::Jmp as u8);
    assert_eq!(decode_i16(j), -12);
}

#[test]
fn constants_are_deduplicated() {
    let mut b = ChunkBuilder::new("t");
    b.register_local("me").expect("local");
    b.set_nargs(1);
    assert_eq!(b.const_int(5), b.const_int(5));
    assert_eq!(b.const_float(2.5), b.const_float(2.5));
    assert_eq!(b.const_str("a"), b.const_str("a"));
    assert_eq!(b.const_sym("a"), b.const_sym("a"));
    // a string and a symbol with the same spelling are distinct entries
    assert_ne!(b.const_str("b"), b.const_sym("b"));
}

#[test]
fn chunk_header_describes_its_regions() {
    let c = hello_chunk();
    assert_eq!(c.name(), "main");
    assert_eq!(c.nargs(), 1);
    assert_eq!(c.nlocals(), 0);
    assert_eq!(c.nconsts(), 1);
    assert_eq!(c.ninstr(), 4);
    assert_eq!(c.local_name(0), "me");
    match c.const_at(0) {
        Const::Str(off) => assert_eq!(c.string_at(off), "hello"),
        other => panic!("expected string constant, got {:?}", other),
    }
    assert_eq!(decode_op(c.instr(0)), Op::LoadC as u8);
    assert_eq!(decode_op(c.instr(3)), Op::Ret as u8);
    assert_eq!(c.line_of(0), Some(2));
}

#[test]
fn blob_round_trips_through_from_blob() {
    let c = hello_chunk();
    let back = Chunk::from_blob(c.name().to_string(), c.blob().to_vec()).expect("from_blob");
    assert_eq!(back.nargs(), c.nargs());
    assert_eq!(back.nlocals(), c.nlocals());
    assert_eq!(back.nconsts(), c.nconsts());
    assert_eq!(back.ninstr(), c.ninstr());
    assert_eq!(back.blob(), c.blob());
    assert_eq!(back.local_name(0), "me");
}

#[test]
fn truncated_blob_is_rejected() {
    let c = hello_chunk();
    let mut data = c.blob().to_vec();
    data.truncate(data.len() - 4);
    assert!(Chunk::from_blob("main".to_string(), data).is_err());
}

#[test]
fn program_serialisation_round_trips() {
    let a = hello_chunk();
    let mut b2 = ChunkBuilder::new("other");
    b2.register_local("x").expect("local");
    b2.set_nargs(1);
    b2.emit(instr(Op::LoadVoid), 1);
    b2.emit(instr(Op::Ret), 1);
    let b2 = b2.finish();

    let bytes = serialize_chunks(&[a, b2]);
    let back = deserialize_chunks(&bytes).expect("deserialize");
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].name(), "main");
    assert_eq!(back[1].name(), "other");
    assert_eq!(back[1].ninstr(), 2);

    // byte-identical when serialized again
    assert_eq!(serialize_chunks(&back), bytes);
}

#[test]
fn disassembly_resolves_hints() {
    let c = hello_chunk();
    assert_eq!(disasm_instr(&c, 0), "LOADC        0 ; \"hello\"");
    assert_eq!(disasm_instr(&c, 1), "PUT");
    assert_eq!(disasm_instr(&c, 2), "LOADVOID");
    assert_eq!(disasm_instr(&c, 3), "RET");

    let mut b = ChunkBuilder::new("t");
    b.register_local("who").expect("local");
    b.set_nargs(1);
    b.emit(instr_u16(Op::LoadL, 0), 1);
    b.emit(instr_u8(Op::The, 2), 1);
    let k = b.const_sym("name").expect("const");
    b.emit(instr_u16(Op::LoadC, k), 1);
    b.emit(instr(Op::Ret), 1);
    let c = b.finish();
    assert_eq!(disasm_instr(&c, 0), "LOADL        0 ; who");
    assert_eq!(disasm_instr(&c, 1), "THE          2 ; dirSeparator");
    assert_eq!(disasm_instr(&c, 2), "LOADC        0 ; #name");
}
