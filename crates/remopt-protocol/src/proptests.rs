use crate::patch::{read_patch, InstructionDelta, PatchDelta, PatchEntry, PatchFrame};
use crate::wire::{read_record, write_record};
use crate::{InstructionRecord, Limits, Operand, MAX_OPERANDS};
use proptest::prelude::*;

fn operand_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        Just(Operand::Empty),
        any::<i32>().prop_map(Operand::Register),
        Just(Operand::PartialRegister),
        any::<i32>().prop_map(Operand::Immediate32),
        any::<i64>().prop_map(Operand::Immediate64),
        Just(Operand::ImmediateFloat),
        any::<u64>().prop_map(Operand::NearAddress),
        Just(Operand::FarAddress),
        Just(Operand::AbsoluteAddress),
        Just(Operand::Unrecognized),
    ]
}

fn record_strategy() -> impl Strategy<Value = InstructionRecord> {
    (
        any::<u64>(),
        any::<i32>(),
        prop::collection::vec(operand_strategy(), 0..=MAX_OPERANDS),
        prop::collection::vec(operand_strategy(), 0..=MAX_OPERANDS),
        any::<i32>(),
    )
        .prop_map(|(address, opcode, sources, destinations, length)| {
            InstructionRecord::new(address, opcode, sources, destinations, length)
                .expect("operand counts are bounded by the strategy")
        })
}

fn entry_strategy(original: InstructionRecord, index: u32) -> impl Strategy<Value = PatchEntry> {
    let num_src = original.sources().len();
    let delta = (
        prop::option::of((any::<u64>(), any::<i32>())),
        prop::collection::vec(prop::option::of(operand_strategy()), num_src),
    )
        .prop_map(|(insn, sources)| PatchDelta {
            instruction: insn.map(|(address, opcode)| InstructionDelta { address, opcode }),
            sources,
        });
    prop::option::of(delta).prop_map(move |delta| PatchEntry {
        original_index: index,
        delta,
    })
}

proptest! {
    #[test]
    fn operand_decode_inverts_encode(op in operand_strategy()) {
        prop_assert_eq!(Operand::from_bytes(&op.to_bytes()), op);
    }

    #[test]
    fn operand_decode_never_panics(bytes in any::<[u8; 20]>()) {
        let op = Operand::from_bytes(&bytes);
        // Re-encoding normalises unused fields; decoding that must be stable.
        prop_assert_eq!(Operand::from_bytes(&op.to_bytes()), op);
    }

    #[test]
    fn record_stream_round_trip(records in prop::collection::vec(record_strategy(), 0..8)) {
        let limits = Limits::default();
        let mut stream = Vec::new();
        for record in &records {
            write_record(&mut stream, record, &limits).unwrap();
        }
        let mut cursor = &stream[..];
        for record in &records {
            prop_assert_eq!(&read_record(&mut cursor, &limits).unwrap(), record);
        }
        prop_assert!(cursor.is_empty());
    }

    #[test]
    fn patch_entry_round_trip(
        (original, entry) in record_strategy()
            .prop_flat_map(|original| (Just(original.clone()), entry_strategy(original, 0)))
    ) {
        let originals = vec![original];
        let bytes = PatchFrame::Entry(entry.clone()).to_bytes();
        prop_assert_eq!(bytes.len(), entry.encoded_len());
        let decoded = read_patch(&mut &bytes[..], &originals, &Limits::default()).unwrap();
        prop_assert_eq!(decoded, PatchFrame::Entry(entry));
    }

    #[test]
    fn applied_entry_keeps_operand_counts(
        (original, entry) in record_strategy()
            .prop_flat_map(|original| (Just(original.clone()), entry_strategy(original, 0)))
    ) {
        let out = entry.apply(&original);
        prop_assert_eq!(out.sources().len(), original.sources().len());
        prop_assert_eq!(out.destinations(), original.destinations());
        prop_assert_eq!(out.length(), original.length());
        for (i, src) in out.sources().iter().enumerate() {
            let replaced = entry
                .delta
                .as_ref()
                .and_then(|d| d.sources[i])
                .filter(|op| matches!(op, Operand::NearAddress(_)));
            prop_assert_eq!(*src, replaced.unwrap_or(original.sources()[i]));
        }
    }
}
