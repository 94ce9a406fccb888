//! Direct conditional branches, as numbered by the instrumentation side's opcode table.
//!
//! Both the near (`jo`..`jnle`) and short (`jo_short`..`jnle_short`) forms are laid out as
//! condition/negated-condition pairs, so flipping the low bit inverts the condition.

use core::ops::RangeInclusive;

use remopt_protocol::{InstructionRecord, Operand};

use crate::block::{BlockError, Result};

pub const COND_BRANCH_NEAR: RangeInclusive<i32> = 26..=41;
pub const COND_BRANCH_SHORT: RangeInclusive<i32> = 152..=167;

pub fn is_cond_branch(opcode: i32) -> bool {
    COND_BRANCH_NEAR.contains(&opcode) || COND_BRANCH_SHORT.contains(&opcode)
}

pub fn invert_cond(opcode: i32) -> Option<i32> {
    is_cond_branch(opcode).then_some(opcode ^ 1)
}

/// Taken-path target of a direct conditional branch.
pub fn branch_target(record: &InstructionRecord) -> Option<u64> {
    if !is_cond_branch(record.opcode()) {
        return None;
    }
    record.source(0)?.near_address()
}

pub fn set_branch_target(record: &mut InstructionRecord, target: u64) -> Result<()> {
    if branch_target(record).is_none() {
        return Err(BlockError::NotBranch {
            opcode: record.opcode(),
        });
    }
    record
        .set_source(0, Operand::NearAddress(target))
        .map_err(|_| BlockError::NotBranch {
            opcode: record.opcode(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jcc(opcode: i32, target: Operand) -> InstructionRecord {
        InstructionRecord::new(0x40, opcode, vec![target], vec![], 2).unwrap()
    }

    #[test]
    fn branch_ranges() {
        for opcode in [26, 33, 41, 152, 167] {
            assert!(is_cond_branch(opcode), "{opcode}");
        }
        for opcode in [25, 42, 151, 168, 0, -1] {
            assert!(!is_cond_branch(opcode), "{opcode}");
        }
    }

    #[test]
    fn inversion_pairs() {
        assert_eq!(invert_cond(26), Some(27));
        assert_eq!(invert_cond(27), Some(26));
        assert_eq!(invert_cond(167), Some(166));
        assert_eq!(invert_cond(12), None);
    }

    #[test]
    fn target_requires_near_address() {
        assert_eq!(branch_target(&jcc(30, Operand::NearAddress(0x80))), Some(0x80));
        assert_eq!(branch_target(&jcc(30, Operand::Register(1))), None);
        assert_eq!(branch_target(&jcc(12, Operand::NearAddress(0x80))), None);
    }

    #[test]
    fn retarget() {
        let mut record = jcc(160, Operand::NearAddress(0x80));
        set_branch_target(&mut record, 0x90).unwrap();
        assert_eq!(branch_target(&record), Some(0x90));

        let mut record = jcc(30, Operand::Immediate32(5));
        assert_eq!(
            set_branch_target(&mut record, 0x90),
            Err(BlockError::NotBranch { opcode: 30 })
        );
    }
}
