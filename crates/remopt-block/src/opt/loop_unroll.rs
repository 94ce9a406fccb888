use crate::block::{BlockModel, Result};
use crate::branch::{branch_target, invert_cond, set_branch_target};
use crate::opt::Optimizer;

/// Unrolls a block that branches back to its own first instruction.
///
/// The body is duplicated once after the closing branch. The first copy's branch is inverted
/// and sent to the loop exit, so a taken exit leaves early and otherwise execution falls into
/// the second copy, which still loops back to the head.
///
/// Clones keep the address of the instruction they repeat. An address here is the application
/// pc an instruction translates back to, and the second copy re-executes exactly those
/// instructions; renumbering them past the branch would map them onto the code at the exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopUnroll;

impl Optimizer for LoopUnroll {
    fn optimize(&mut self, block: &mut BlockModel) -> Result<()> {
        let (Some(first), Some(last)) = (block.first(), block.last()) else {
            return Ok(());
        };
        let head = block.node(first)?.record().address();
        let branch = block.node(last)?.record();
        if branch_target(branch) != Some(head) {
            return Ok(());
        }
        let (Some(inverted), Some(exit)) = (invert_cond(branch.opcode()), branch.end_address())
        else {
            return Ok(());
        };

        let body: Vec<_> = block.ids().collect();
        let mut anchor = last;
        for id in body {
            let copy = block.clone_node(id)?;
            block.insert_after(anchor, copy)?;
            anchor = copy;
        }

        let closing = block.record_mut(last)?;
        closing.set_opcode(inverted);
        set_branch_target(closing, exit)?;
        tracing::debug!(head, exit, len = block.len(), "unrolled self-loop");
        Ok(())
    }
}
