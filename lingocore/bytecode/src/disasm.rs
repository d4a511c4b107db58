//! Chunk disassembler. One line per instruction:
//! `OPCODE operand [; hint]`, where the hint resolves local slots to
//! their names, constants to their literal form and THE ids to the named
//! built-in.

use crate::{
    decode_i16, decode_op, decode_u16, decode_u8, decode_u8_hi, operand_kind, Chunk, Const, Instr,
    Op, OperandKind, THE_NAMES,
};

fn const_hint(chunk: &Chunk, index: u16) -> String {
    if index >= chunk.nconsts() {
        return "???".to_string();
    }
    match chunk.const_at(index) {
        Const::Void => "void".to_string(),
        Const::Int(v) => format!("{}", v),
        Const::Float(v) => format!("{:.6}", v),
        Const::Str(off) => format!("\"{}\"", chunk.string_at(off)),
        Const::Sym(off) => format!("#{}", chunk.string_at(off)),
    }
}

fn local_hint(chunk: &Chunk, slot: u16) -> String {
    let count = chunk.nargs() as usize + chunk.nlocals() as usize;
    if (slot as usize) < count {
        chunk.local_name(slot as usize).to_string()
    } else {
        "???".to_string()
    }
}

/// Render one instruction of `chunk`.
pub fn disasm_instr(chunk: &Chunk, index: usize) -> String {
    let word: Instr = chunk.instr(index);
    let op = match Op::from_byte(decode_op(word)) {
        Some(op) => op,
        None => return format!("?? {:#010x}", word),
    };

    match operand_kind(op) {
        OperandKind::None => op.name().to_string(),
        OperandKind::I16 => format!("{:<12} {}", op.name(), decode_i16(word)),
        OperandKind::U8 => {
            let id = decode_u8(word);
            let hint = THE_NAMES.get(id as usize).copied().unwrap_or("???");
            format!("{:<12} {} ; {}", op.name(), id, hint)
        }
        OperandKind::U16 => {
            let a = decode_u16(word);
            match op {
                Op::LoadC | Op::LoadG | Op::StoreG => {
                    format!("{:<12} {} ; {}", op.name(), a, const_hint(chunk, a))
                }
                Op::LoadL | Op::StoreL => {
                    format!("{:<12} {} ; {}", op.name(), a, local_hint(chunk, a))
                }
                _ => format!("{:<12} {}", op.name(), a),
            }
        }
        OperandKind::U16U8 => {
            let a = decode_u16(word);
            let b = decode_u8_hi(word);
            format!("{:<12} {} {} ; {}", op.name(), a, b, const_hint(chunk, a))
        }
    }
}

/// Render a whole chunk, one instruction per line.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();
    for i in 0..chunk.ninstr() as usize {
        out.push_str(&format!("{:04} {}\n", i, disasm_instr(chunk, i)));
    }
    out
}
