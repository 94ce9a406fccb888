//! Patch entries: per-instruction deltas against the block as it was originally sent.
//!
//! An entry never describes a new instruction. It names an original instruction by index and
//! lists which of its fields to overwrite in a fresh clone. The same index may appear any
//! number of times (duplication) or not at all (removal).

use std::io::{Read, Write};

use crate::operand::{Operand, OPERAND_RECORD_LEN};
use crate::record::InstructionRecord;
use crate::wire::{send_frame, FrameReader, Limits, WireError};
use crate::SENTINEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionDelta {
    pub address: u64,
    pub opcode: i32,
}

/// Fields that differ from the original instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PatchDelta {
    /// New address and opcode, written together.
    pub instruction: Option<InstructionDelta>,
    /// One slot per source operand of the referenced instruction; `Some` marks it dirty.
    pub sources: Vec<Option<Operand>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchEntry {
    pub original_index: u32,
    /// `None` means the output instruction is an unchanged copy of the original.
    pub delta: Option<PatchDelta>,
}

impl PatchEntry {
    pub fn clean(original_index: u32) -> Self {
        Self {
            original_index,
            delta: None,
        }
    }

    pub fn with_delta(original_index: u32, delta: PatchDelta) -> Self {
        Self {
            original_index,
            delta: Some(delta),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.delta.is_some()
    }

    pub fn encoded_len(&self) -> usize {
        let Some(delta) = &self.delta else {
            return 8;
        };
        let instruction = if delta.instruction.is_some() { 12 } else { 0 };
        let sources: usize = delta
            .sources
            .iter()
            .map(|src| 4 + if src.is_some() { OPERAND_RECORD_LEN } else { 0 })
            .sum();
        12 + instruction + sources
    }

    /// Check that the receiver can parse this entry: the index must name one of `originals`
    /// and fit the wire's i32, and a delta must carry one source slot per original source.
    pub fn check_against(&self, originals: &[InstructionRecord]) -> Result<(), WireError> {
        let index = i32::try_from(self.original_index)
            .map_err(|_| WireError::CountOverflow(self.original_index as usize))?;
        let original = originals
            .get(self.original_index as usize)
            .ok_or(WireError::IndexOutOfRange {
                index,
                len: originals.len(),
            })?;
        if let Some(delta) = &self.delta {
            if delta.sources.len() != original.sources().len() {
                return Err(WireError::SourceCountMismatch {
                    index,
                    expected: original.sources().len(),
                    found: delta.sources.len(),
                });
            }
        }
        Ok(())
    }

    /// Encode without validation; [`PatchEntry::check_against`] rejects entries that would not
    /// survive the trip, including indices above `i32::MAX`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.original_index as i32).to_le_bytes());
        let Some(delta) = &self.delta else {
            out.extend_from_slice(&0i32.to_le_bytes());
            return;
        };
        out.extend_from_slice(&1i32.to_le_bytes());
        match delta.instruction {
            Some(insn) => {
                out.extend_from_slice(&1i32.to_le_bytes());
                out.extend_from_slice(&insn.address.to_le_bytes());
                out.extend_from_slice(&insn.opcode.to_le_bytes());
            }
            None => out.extend_from_slice(&0i32.to_le_bytes()),
        }
        for src in &delta.sources {
            match src {
                Some(operand) => {
                    out.extend_from_slice(&1i32.to_le_bytes());
                    operand.encode_into(out);
                }
                None => out.extend_from_slice(&0i32.to_le_bytes()),
            }
        }
    }

    /// Build the output instruction from a clone of `original`.
    ///
    /// Only near-address source replacements take effect. Every other replacement kind is
    /// accepted and dropped: the applier deliberately supports retargeting direct branches and
    /// nothing else.
    pub fn apply(&self, original: &InstructionRecord) -> InstructionRecord {
        let mut out = original.clone();
        let Some(delta) = &self.delta else {
            return out;
        };
        if let Some(insn) = delta.instruction {
            out.set_address(insn.address);
            out.set_opcode(insn.opcode);
        }
        for (source, replacement) in delta.sources.iter().enumerate() {
            match replacement {
                None => {}
                Some(operand @ Operand::NearAddress(_)) => {
                    if let Err(err) = out.set_source(source, *operand) {
                        tracing::debug!(index = self.original_index, %err, "dropping source replacement");
                    }
                }
                Some(other) => {
                    tracing::debug!(
                        index = self.original_index,
                        source,
                        kind = ?other,
                        "ignoring unsupported operand replacement"
                    );
                }
            }
        }
        out
    }
}

/// One message of the patch phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchFrame {
    Entry(PatchEntry),
    End,
}

impl PatchFrame {
    pub fn encoded_len(&self) -> usize {
        match self {
            PatchFrame::Entry(entry) => entry.encoded_len(),
            PatchFrame::End => 4,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            PatchFrame::Entry(entry) => entry.encode_into(out),
            PatchFrame::End => out.extend_from_slice(&SENTINEL.to_le_bytes()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

/// Write one patch message. Entries are checked against `originals` first, so nothing that the
/// receiver would misparse reaches the stream.
pub fn write_patch<W: Write + ?Sized>(
    writer: &mut W,
    frame: &PatchFrame,
    originals: &[InstructionRecord],
    limits: &Limits,
) -> Result<(), WireError> {
    if let PatchFrame::Entry(entry) = frame {
        entry.check_against(originals)?;
    }
    limits.check(frame.encoded_len())?;
    send_frame(writer, &frame.to_bytes(), limits)
}

/// Read one patch message. The number of source flags is not on the wire; it comes from the
/// referenced original instruction, which is why the reader needs `originals`.
pub fn read_patch<R: Read + ?Sized>(
    reader: &mut R,
    originals: &[InstructionRecord],
    limits: &Limits,
) -> Result<PatchFrame, WireError> {
    let mut frame = FrameReader::new(reader, limits);
    let index = frame.read_i32()?;
    if index == SENTINEL {
        return Ok(PatchFrame::End);
    }
    let original = usize::try_from(index)
        .ok()
        .and_then(|i| originals.get(i))
        .ok_or(WireError::IndexOutOfRange {
            index,
            len: originals.len(),
        })?;
    let original_index = index as u32;

    if !frame.read_flag()? {
        return Ok(PatchFrame::Entry(PatchEntry::clean(original_index)));
    }
    let instruction = if frame.read_flag()? {
        Some(InstructionDelta {
            address: frame.read_u64()?,
            opcode: frame.read_i32()?,
        })
    } else {
        None
    };
    let mut sources = Vec::with_capacity(original.sources().len());
    for _ in 0..original.sources().len() {
        let replacement = if frame.read_flag()? {
            Some(frame.read_operand()?)
        } else {
            None
        };
        sources.push(replacement);
    }
    Ok(PatchFrame::Entry(PatchEntry::with_delta(
        original_index,
        PatchDelta {
            instruction,
            sources,
        },
    )))
}

/// Ordered patch entries for one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    entries: Vec<PatchEntry>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PatchEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchEntry> {
        self.entries.iter()
    }

    /// Rebuild the output sequence against `originals`. Fails without producing anything if
    /// any entry points outside the block.
    pub fn apply(&self, originals: &[InstructionRecord]) -> Result<Vec<InstructionRecord>, WireError> {
        self.entries
            .iter()
            .map(|entry| {
                let original = originals.get(entry.original_index as usize).ok_or(
                    WireError::IndexOutOfRange {
                        index: i32::try_from(entry.original_index).unwrap_or(i32::MAX),
                        len: originals.len(),
                    },
                )?;
                Ok(entry.apply(original))
            })
            .collect()
    }
}

impl FromIterator<PatchEntry> for PatchSet {
    fn from_iter<T: IntoIterator<Item = PatchEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PatchSet {
    type Item = PatchEntry;
    type IntoIter = std::vec::IntoIter<PatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchEntry;
    type IntoIter = std::slice::Iter<'a, PatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
