use std::io::Cursor;

use binrw::{BinResult, BinWrite};

use crate::code_attribute::Instruction;

/// Returns the byte size of an instruction in the code array.
pub fn instruction_byte_size(instr: &Instruction) -> u32 {
    match instr {
        Instruction::Bipush(_) | Instruction::Ldc(_) | Instruction::Newarray(_) => 2,
        Instruction::Iload(_) | Instruction::Lload(_) | Instruction::Fload(_)
        | Instruction::Dload(_) | Instruction::Aload(_) => 2,
        Instruction::Istore(_) | Instruction::Lstore(_) | Instruction::Fstore(_)
        | Instruction::Dstore(_) | Instruction::Astore(_) => 2,
        Instruction::Sipush(_) | Instruction::LdcW(_) | Instruction::Ldc2W(_) => 3,
        Instruction::Iinc { .. } => 3,
        Instruction::Ifeq(_) | Instruction::Ifne(_) | Instruction::Iflt(_)
        | Instruction::Ifge(_) | Instruction::Ifgt(_) | Instruction::Ifle(_) => 3,
        Instruction::IfIcmpeq(_) | Instruction::IfIcmpne(_) | Instruction::IfIcmplt(_)
        | Instruction::IfIcmpge(_) | Instruction::IfIcmpgt(_) | Instruction::IfIcmple(_) => 3,
        Instruction::IfAcmpeq(_) | Instruction::IfAcmpne(_) => 3,
        Instruction::Ifnull(_) | Instruction::Ifnonnull(_) | Instruction::Goto(_) => 3,
        Instruction::Getstatic(_) | Instruction::Putstatic(_)
        | Instruction::Getfield(_) | Instruction::Putfield(_) => 3,
        Instruction::Invokevirtual(_) | Instruction::Invokespecial(_)
        | Instruction::Invokestatic(_) => 3,
        Instruction::New(_) | Instruction::Anewarray(_) => 3,
        Instruction::Checkcast(_) | Instruction::Instanceof(_) => 3,
        Instruction::Multianewarray { .. } => 4,
        Instruction::Invokeinterface { .. } => 5,
        // wide instructions: 2 bytes magic + 2 bytes index
        Instruction::IloadWide(_) | Instruction::LloadWide(_) | Instruction::FloadWide(_)
        | Instruction::DloadWide(_) | Instruction::AloadWide(_) => 4,
        Instruction::IstoreWide(_) | Instruction::LstoreWide(_) | Instruction::FstoreWide(_)
        | Instruction::DstoreWide(_) | Instruction::AstoreWide(_) => 4,
        Instruction::IincWide { .. } => 6,
        _ => 1,
    }
}

pub fn compute_byte_addresses(instructions: &[Instruction]) -> Vec<u32> {
    let mut addresses = Vec::with_capacity(instructions.len());
    let mut addr = 0u32;
    for instr in instructions {
        addresses.push(addr);
        addr += instruction_byte_size(instr);
    }
    addresses
}

pub fn code_length(instructions: &[Instruction]) -> u32 {
    instructions.iter().map(instruction_byte_size).sum()
}

/// Serialize instructions into a `code` array.
pub fn encode_instructions(instructions: &[Instruction]) -> BinResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    for instr in instructions {
        instr.write_be(&mut cursor)?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_encoding() {
        let code = vec![
            Instruction::Aload0,
            Instruction::Bipush(7),
            Instruction::Invokeinterface { index: 3, count: 2, filler: 0 },
            Instruction::IfIcmplt(-4),
            Instruction::AstoreWide(300),
            Instruction::IincWide { index: 300, value: -2 },
            Instruction::Return,
        ];
        let bytes = encode_instructions(&code).unwrap();
        assert_eq!(bytes.len() as u32, code_length(&code));
        assert_eq!(compute_byte_addresses(&code), vec![0, 1, 3, 8, 11, 15, 21]);
        assert_eq!(&bytes[11..15], &[0xc4, 0x3a, 0x01, 0x2c]);
    }
}
