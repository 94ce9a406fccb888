#![forbid(unsafe_code)]

//! Wire codec for the remote basic-block exchange.
//!
//! An instrumented process ("client") ships each basic block to an optimizer process, which
//! answers with a list of patches that refer back to the block's instructions by their original
//! position. Every message is fixed-layout: the receiver always knows how many bytes come next
//! from what it has already read, so there are no length prefixes on the wire.
//!
//! All integers are little-endian. Addresses are 64-bit.
//!
//! ```text
//! announce      client -> opt   i32 count | -1 (terminate)
//! ack           opt -> client   i32
//! instruction   client -> opt   u64 address | i32 opcode | i32 num_src | i32 num_dst | i32 length
//!                               | num_src x operand | num_dst x operand
//! ack           opt -> client   i32
//! end marker    client -> opt   i32
//! patch         opt -> client   i32 index | -1 (end)
//!                               [i32 dirty [i32 insn_dirty [u64 address | i32 opcode]]
//!                                (i32 src_dirty [operand]) x num_src of the referenced instruction]
//! ack           client -> opt   i32
//! fallthrough   opt -> client   u64 address (0 = unchanged)
//! ```
//!
//! Operands are always 20 bytes: `i32 tag | i64 wide | i32 p1 | i32 p2`.

pub mod operand;
pub mod patch;
pub mod record;
pub mod wire;

#[cfg(test)]
mod proptests;

pub use operand::{Operand, OPERAND_RECORD_LEN};
pub use patch::{InstructionDelta, PatchDelta, PatchEntry, PatchFrame, PatchSet};
pub use record::{InstructionRecord, OperandSide, RecordError, MAX_OPERANDS, RECORD_HEADER_LEN};
pub use wire::{Announce, ErrorKind, Limits, WireError, DEFAULT_TRANSFER_BUFFER_BYTES};

/// Reserved value ending a stream of items (announce = terminate, patch index = end of set).
pub const SENTINEL: i32 = -1;
