use crate::{BlockModel, NodeId};
use proptest::prelude::*;
use remopt_protocol::{InstructionRecord, Operand};

#[derive(Debug, Clone)]
enum Op {
    CloneAppend(usize),
    CloneInsertAfter { from: usize, anchor: usize },
    Remove(usize),
    MoveToTail(usize),
    Retarget { at: usize, target: u64 },
    Readdress { at: usize, address: u64, opcode: i32 },
}

const MAX_INSNS: usize = 12;
const MAX_OPS: usize = 32;

fn op_strategy() -> impl Strategy<Value = Op> {
    let pick = 0usize..64;
    prop_oneof![
        pick.clone().prop_map(Op::CloneAppend),
        (pick.clone(), pick.clone()).prop_map(|(from, anchor)| Op::CloneInsertAfter { from, anchor }),
        pick.clone().prop_map(Op::Remove),
        pick.clone().prop_map(Op::MoveToTail),
        (pick.clone(), any::<u64>()).prop_map(|(at, target)| Op::Retarget { at, target }),
        (pick, any::<u64>(), any::<i32>())
            .prop_map(|(at, address, opcode)| Op::Readdress { at, address, opcode }),
    ]
}

fn block_strategy() -> impl Strategy<Value = Vec<InstructionRecord>> {
    prop::collection::vec((any::<u64>(), any::<i32>(), 0usize..=3), 1..=MAX_INSNS).prop_map(
        |insns| {
            insns
                .into_iter()
                .map(|(address, opcode, num_src)| {
                    let sources = (0..num_src)
                        .map(|i| match i {
                            0 => Operand::NearAddress(address.wrapping_add(16)),
                            _ => Operand::Register(i as i32),
                        })
                        .collect();
                    InstructionRecord::new(address, opcode, sources, vec![Operand::Register(0)], 4)
                        .expect("bounded operand counts")
                })
                .collect()
        },
    )
}

fn linked(block: &BlockModel, pick: usize) -> Option<NodeId> {
    let len = block.len();
    (len > 0).then(|| block.ids().nth(pick % len)).flatten()
}

fn apply_op(block: &mut BlockModel, op: &Op) {
    match *op {
        Op::CloneAppend(from) => {
            if let Some(id) = linked(block, from) {
                let copy = block.clone_node(id).unwrap();
                block.append(copy).unwrap();
            }
        }
        Op::CloneInsertAfter { from, anchor } => {
            if let (Some(id), Some(anchor)) = (linked(block, from), linked(block, anchor)) {
                let copy = block.clone_node(id).unwrap();
                block.insert_after(anchor, copy).unwrap();
            }
        }
        Op::Remove(at) => {
            if let Some(id) = linked(block, at) {
                block.remove(id).unwrap();
            }
        }
        Op::MoveToTail(at) => {
            if let Some(id) = linked(block, at) {
                block.remove(id).unwrap();
                block.append(id).unwrap();
            }
        }
        Op::Retarget { at, target } => {
            if let Some(id) = linked(block, at) {
                let record = block.record_mut(id).unwrap();
                if !record.sources().is_empty() {
                    record.set_source(0, Operand::NearAddress(target)).unwrap();
                }
            }
        }
        Op::Readdress {
            at,
            address,
            opcode,
        } => {
            if let Some(id) = linked(block, at) {
                let record = block.record_mut(id).unwrap();
                record.set_address(address);
                record.set_opcode(opcode);
            }
        }
    }
}

proptest! {
    #[test]
    fn patches_reproduce_edited_block(
        originals in block_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..MAX_OPS),
    ) {
        let mut block = BlockModel::from_records(originals.clone());
        for op in &ops {
            apply_op(&mut block, op);
        }

        // Every node still resolves to the instruction it was cloned from.
        for node in &block {
            let original = &originals[node.original_index() as usize];
            prop_assert_eq!(node.record().destinations(), original.destinations());
            prop_assert_eq!(node.record().sources().len(), original.sources().len());
        }

        let set = block.patch_set();
        prop_assert_eq!(set.len(), block.len());
        prop_assert_eq!(set.apply(&originals).unwrap(), block.records());
    }

    #[test]
    fn list_links_stay_consistent(
        originals in block_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..MAX_OPS),
    ) {
        let mut block = BlockModel::from_records(originals);
        for op in &ops {
            apply_op(&mut block, op);
        }

        let forward: Vec<NodeId> = block.ids().collect();
        prop_assert_eq!(forward.len(), block.len());
        let mut backward = Vec::new();
        let mut cursor = block.last();
        while let Some(id) = cursor {
            backward.push(id);
            cursor = block.prev(id);
        }
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }
}
