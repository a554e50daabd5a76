use std::collections::HashMap;

use crate::code_attribute::Instruction;

use super::util::compute_byte_addresses;
use super::CompileError;

/// Compute max_stack by following control flow from the method entry and
/// from every exception handler, which starts with the thrown value pushed.
///
/// `effects` supplies the stack change of field and invoke instructions,
/// keyed by instruction index.
pub fn compute_max_stack(
    instructions: &[Instruction],
    handlers: &[usize],
    effects: &HashMap<usize, i32>,
) -> Result<u16, CompileError> {
    let addresses = compute_byte_addresses(instructions);
    let index_at: HashMap<u32, usize> = addresses.iter().enumerate().map(|(i, &a)| (a, i)).collect();

    let mut depth_at: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut worklist: Vec<(usize, i32)> = Vec::new();
    if !instructions.is_empty() {
        worklist.push((0, 0));
    }
    worklist.extend(handlers.iter().map(|&h| (h, 1)));
    let mut max_depth = 0;

    while let Some((idx, depth)) = worklist.pop() {
        let Some(instr) = instructions.get(idx) else {
            return Err(CompileError::encoding("control flows past the end of the code"));
        };
        match depth_at[idx] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(CompileError::encoding(format!(
                    "stack depth {} and {} meet at instruction {}",
                    seen, depth, idx
                )))
            }
            None => depth_at[idx] = Some(depth),
        }
        max_depth = max_depth.max(depth);

        let delta = match stack_delta(instr) {
            Some(delta) => delta,
            None => *effects
                .get(&idx)
                .ok_or_else(|| CompileError::encoding(format!("no stack effect recorded for {:?}", instr)))?,
        };
        let next = depth + delta;
        if next < 0 {
            return Err(CompileError::encoding(format!("operand stack underflow at instruction {}", idx)));
        }
        max_depth = max_depth.max(next);

        if let Some(offset) = branch_offset(instr) {
            let target = i64::from(addresses[idx]) + i64::from(offset);
            let target = u32::try_from(target)
                .ok()
                .and_then(|t| index_at.get(&t))
                .ok_or_else(|| CompileError::encoding(format!("branch at instruction {} lands mid-instruction", idx)))?;
            worklist.push((*target, next));
        }
        if falls_through(instr) {
            worklist.push((idx + 1, next));
        }
    }

    u16::try_from(max_depth).map_err(|_| CompileError::encoding("operand stack exceeds 65535 slots"))
}

fn branch_offset(instr: &Instruction) -> Option<i16> {
    use Instruction::*;
    match instr {
        Ifeq(o) | Ifne(o) | Iflt(o) | Ifge(o) | Ifgt(o) | Ifle(o) | IfIcmpeq(o) | IfIcmpne(o) | IfIcmplt(o)
        | IfIcmpge(o) | IfIcmpgt(o) | IfIcmple(o) | IfAcmpeq(o) | IfAcmpne(o) | Goto(o) | Ifnull(o)
        | Ifnonnull(o) => Some(*o),
        _ => None,
    }
}

fn falls_through(instr: &Instruction) -> bool {
    !matches!(
        instr,
        Instruction::Goto(_)
            | Instruction::Athrow
            | Instruction::Return
            | Instruction::Ireturn
            | Instruction::Lreturn
            | Instruction::Freturn
            | Instruction::Dreturn
            | Instruction::Areturn
    )
}

/// Net stack depth change of an instruction, or `None` when it depends on
/// a field or method descriptor.
fn stack_delta(instr: &Instruction) -> Option<i32> {
    Some(match instr {
        // Constants: push 1
        Instruction::Aconstnull
        | Instruction::Iconstm1
        | Instruction::Iconst0
        | Instruction::Iconst1
        | Instruction::Iconst2
        | Instruction::Iconst3
        | Instruction::Iconst4
        | Instruction::Iconst5
        | Instruction::Fconst0
        | Instruction::Fconst1
        | Instruction::Fconst2
        | Instruction::Bipush(_)
        | Instruction::Sipush(_)
        | Instruction::Ldc(_)
        | Instruction::LdcW(_) => 1,

        // long and double constants take two slots
        Instruction::Lconst0 | Instruction::Lconst1 | Instruction::Dconst0 | Instruction::Dconst1 => 2,
        Instruction::Ldc2W(_) => 2,

        // Loads: push 1 (or 2 for long/double)
        Instruction::Iload(_)
        | Instruction::Iload0
        | Instruction::Iload1
        | Instruction::Iload2
        | Instruction::Iload3
        | Instruction::Fload(_)
        | Instruction::Fload0
        | Instruction::Fload1
        | Instruction::Fload2
        | Instruction::Fload3
        | Instruction::Aload(_)
        | Instruction::Aload0
        | Instruction::Aload1
        | Instruction::Aload2
        | Instruction::Aload3
        | Instruction::IloadWide(_)
        | Instruction::FloadWide(_)
        | Instruction::AloadWide(_) => 1,

        Instruction::Lload(_)
        | Instruction::Lload0
        | Instruction::Lload1
        | Instruction::Lload2
        | Instruction::Lload3
        | Instruction::Dload(_)
        | Instruction::Dload0
        | Instruction::Dload1
        | Instruction::Dload2
        | Instruction::Dload3
        | Instruction::LloadWide(_)
        | Instruction::DloadWide(_) => 2,

        // Array loads: pop 2 (arrayref + index), push 1 (or 2)
        Instruction::Iaload
        | Instruction::Faload
        | Instruction::Aaload
        | Instruction::Baload
        | Instruction::Caload
        | Instruction::Saload => -1, // -2 + 1

        Instruction::Laload | Instruction::Daload => 0, // -2 + 2

        // Stores: pop 1 (or 2 for long/double)
        Instruction::Istore(_)
        | Instruction::Istore0
        | Instruction::Istore1
        | Instruction::Istore2
        | Instruction::Istore3
        | Instruction::Fstore(_)
        | Instruction::Fstore0
        | Instruction::Fstore1
        | Instruction::Fstore2
        | Instruction::Fstore3
        | Instruction::Astore(_)
        | Instruction::Astore0
        | Instruction::Astore1
        | Instruction::Astore2
        | Instruction::Astore3
        | Instruction::IstoreWide(_)
        | Instruction::FstoreWide(_)
        | Instruction::AstoreWide(_) => -1,

        Instruction::Lstore(_)
        | Instruction::Lstore0
        | Instruction::Lstore1
        | Instruction::Lstore2
        | Instruction::Lstore3
        | Instruction::Dstore(_)
        | Instruction::Dstore0
        | Instruction::Dstore1
        | Instruction::Dstore2
        | Instruction::Dstore3
        | Instruction::LstoreWide(_)
        | Instruction::DstoreWide(_) => -2,

        // Array stores: pop 3 (arrayref + index + value)
        Instruction::Iastore
        | Instruction::Fastore
        | Instruction::Aastore
        | Instruction::Bastore
        | Instruction::Castore
        | Instruction::Sastore => -3,

        Instruction::Lastore | Instruction::Dastore => -4, // pop arrayref + index + long/double

        // Stack manipulation
        Instruction::Pop => -1,
        Instruction::Pop2 => -2,
        Instruction::Dup => 1,
        Instruction::Dupx1 => 1,
        Instruction::Dupx2 => 1,
        Instruction::Dup2 => 2,
        Instruction::Dup2x1 => 2,
        Instruction::Dup2x2 => 2,
        Instruction::Swap => 0,

        // Arithmetic: pop 2, push 1 (net -1 for int/float)
        Instruction::Iadd
        | Instruction::Isub
        | Instruction::Imul
        | Instruction::Idiv
        | Instruction::Irem
        | Instruction::Ishl
        | Instruction::Ishr
        | Instruction::Iushr
        | Instruction::Iand
        | Instruction::Ior
        | Instruction::Ixor
        | Instruction::Fadd
        | Instruction::Fsub
        | Instruction::Fmul
        | Instruction::Fdiv
        | Instruction::Frem => -1,

        // Long/double arithmetic: pop 4, push 2 (net -2)
        Instruction::Ladd
        | Instruction::Lsub
        | Instruction::Lmul
        | Instruction::Ldiv
        | Instruction::Lrem
        | Instruction::Land
        | Instruction::Lor
        | Instruction::Lxor
        | Instruction::Dadd
        | Instruction::Dsub
        | Instruction::Dmul
        | Instruction::Ddiv
        | Instruction::Drem => -2,

        // Long shift: pop long(2) + int(1), push long(2) = -1
        Instruction::Lshl | Instruction::Lshr | Instruction::Lushr => -1,

        // Negate: pop 1, push 1 = 0
        Instruction::Ineg | Instruction::Fneg => 0,
        Instruction::Lneg | Instruction::Dneg => 0,

        // Iinc doesn't touch the stack
        Instruction::Iinc { .. } | Instruction::IincWide { .. } => 0,

        // Conversions: same stack effect as source and target sizes
        Instruction::I2l | Instruction::I2d | Instruction::F2l | Instruction::F2d => 1, // push extra slot
        Instruction::L2i | Instruction::L2f | Instruction::D2i | Instruction::D2f => -1, // lose a slot
        Instruction::I2f | Instruction::I2b | Instruction::I2c | Instruction::I2s | Instruction::F2i => 0,
        Instruction::L2d | Instruction::D2l => 0, // 2 -> 2

        // Comparisons
        Instruction::Lcmp => -3, // pop 2 longs (4 slots), push int (1) = -3
        Instruction::Fcmpl | Instruction::Fcmpg => -1, // pop 2, push 1
        Instruction::Dcmpl | Instruction::Dcmpg => -3, // pop 2 doubles (4 slots), push int

        // Branches: pop operand(s), no push
        Instruction::Ifeq(_)
        | Instruction::Ifne(_)
        | Instruction::Iflt(_)
        | Instruction::Ifge(_)
        | Instruction::Ifgt(_)
        | Instruction::Ifle(_)
        | Instruction::Ifnull(_)
        | Instruction::Ifnonnull(_) => -1,

        Instruction::IfIcmpeq(_)
        | Instruction::IfIcmpne(_)
        | Instruction::IfIcmplt(_)
        | Instruction::IfIcmpge(_)
        | Instruction::IfIcmpgt(_)
        | Instruction::IfIcmple(_)
        | Instruction::IfAcmpeq(_)
        | Instruction::IfAcmpne(_) => -2,

        Instruction::Goto(_) => 0,

        // Returns
        Instruction::Return => 0,
        Instruction::Ireturn | Instruction::Freturn | Instruction::Areturn => -1,
        Instruction::Lreturn | Instruction::Dreturn => -2,

        Instruction::Getstatic(_)
        | Instruction::Putstatic(_)
        | Instruction::Getfield(_)
        | Instruction::Putfield(_)
        | Instruction::Invokevirtual(_)
        | Instruction::Invokespecial(_)
        | Instruction::Invokestatic(_)
        | Instruction::Invokeinterface { .. } => return None,

        // Object creation
        Instruction::New(_) => 1,
        Instruction::Newarray(_) => 0, // pop count, push arrayref
        Instruction::Anewarray(_) => 0,
        Instruction::Arraylength => 0, // pop arrayref, push length

        Instruction::Athrow => -1,
        Instruction::Checkcast(_) => 0,
        Instruction::Instanceof(_) => 0, // pop ref, push int

        Instruction::Monitorenter | Instruction::Monitorexit => -1,

        Instruction::Multianewarray { dimensions, .. } => {
            1 - (*dimensions as i32) // pop N counts, push arrayref
        }

        // Nop
        Instruction::Nop => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_points_take_the_depth_of_either_arm() {
        // iload_0; ifeq +7; iconst_1; goto +4; iconst_0; ireturn
        let code = vec![
            Instruction::Iload0,
            Instruction::Ifeq(7),
            Instruction::Iconst1,
            Instruction::Goto(4),
            Instruction::Iconst0,
            Instruction::Ireturn,
        ];
        assert_eq!(compute_max_stack(&code, &[], &HashMap::new()).unwrap(), 1);
    }

    #[test]
    fn descriptor_effects_come_from_the_caller() {
        let code = vec![
            Instruction::Lconst1,
            Instruction::Lconst1,
            Instruction::Invokestatic(1),
            Instruction::Pop2,
            Instruction::Return,
        ];
        let effects = HashMap::from([(2, -2)]);
        assert_eq!(compute_max_stack(&code, &[], &effects).unwrap(), 4);
        assert!(compute_max_stack(&code, &[], &HashMap::new()).is_err());
    }

    #[test]
    fn handlers_begin_with_one_value() {
        let code = vec![Instruction::Return, Instruction::Athrow];
        assert_eq!(compute_max_stack(&code, &[1], &HashMap::new()).unwrap(), 1);
    }

    #[test]
    fn mismatched_depths_are_rejected() {
        // iconst_0; ifeq +4; iconst_1; (merge) return
        let code = vec![Instruction::Iconst0, Instruction::Ifeq(4), Instruction::Iconst1, Instruction::Return];
        assert!(compute_max_stack(&code, &[], &HashMap::new()).is_err());
    }
}
