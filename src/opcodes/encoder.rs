//! Instruction encoder, the inverse of [`decode`](super::decoder::decode)
//!
//! Used by tests and tooling to assemble code. Every operand gets the
//! smallest encoding that holds its value.

use super::operands::Operand;
use super::Opcode;
use crate::interpreter::errors::{VmError, VmResult};

/// Assemble one instruction
pub fn encode_opcode(mnemonic: &str, operands: &[Operand]) -> VmResult<Vec<u8>> {
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| VmError::UnknownMnemonic(mnemonic.to_string()))?;
    if operands.len() != opcode.operand_count() {
        return Err(VmError::OperandCount {
            mnemonic: opcode.mnemonic(),
            expected: opcode.operand_count(),
            got: operands.len(),
        });
    }

    let mut out = Vec::new();
    let code = opcode.code();
    if code < 0x80 {
        out.push(code as u8);
    } else if code < 0x4000 {
        out.extend_from_slice(&((code | 0x8000) as u16).to_be_bytes());
    } else {
        out.extend_from_slice(&(code | 0xC000_0000).to_be_bytes());
    }

    let encoded: Vec<(u8, Vec<u8>)> = operands.iter().map(encode_operand).collect();
    for pair in encoded.chunks(2) {
        let low = pair[0].0;
        let high = pair.get(1).map_or(0, |(mode, _)| *mode);
        out.push(low | (high << 4));
    }
    for (_, bytes) in encoded {
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

/// Assemble from textual operands, e.g. `encode_text("add", &["1", "pop", "*3A0"])`
pub fn encode_text(mnemonic: &str, operands: &[&str]) -> VmResult<Vec<u8>> {
    let parsed = operands
        .iter()
        .map(|s| s.parse::<Operand>())
        .collect::<VmResult<Vec<_>>>()?;
    encode_opcode(mnemonic, &parsed)
}

/// Pick a mode nibble and the bytes that follow for one operand
fn encode_operand(op: &Operand) -> (u8, Vec<u8>) {
    match *op {
        Operand::Const(0) => (0x0, Vec::new()),
        Operand::Const(v) if (-0x80..0x80).contains(&v) => (0x1, vec![v as u8]),
        Operand::Const(v) if (-0x8000..0x8000).contains(&v) => {
            (0x2, (v as i16).to_be_bytes().to_vec())
        }
        Operand::Const(v) => (0x3, v.to_be_bytes().to_vec()),
        Operand::Addr(a) => sized(0x5, a),
        Operand::Stack => (0x8, Vec::new()),
        Operand::Local(a) => sized(0x9, a),
        Operand::Ram(a) => sized(0xD, a),
    }
}

fn sized(base: u8, value: u32) -> (u8, Vec<u8>) {
    if value <= 0xFF {
        (base, vec![value as u8])
    } else if value <= 0xFFFF {
        (base + 1, (value as u16).to_be_bytes().to_vec())
    } else {
        (base + 2, value.to_be_bytes().to_vec())
    }
}
