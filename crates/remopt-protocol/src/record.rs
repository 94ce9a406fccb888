use core::fmt;

use thiserror::Error;

use crate::operand::{Operand, OPERAND_RECORD_LEN};
use crate::wire::{self, Limits, WireError};

/// Per-side operand capacity. Patches carry one dirty flag per source, and both ends size
/// their flag arrays to this bound.
pub const MAX_OPERANDS: usize = 8;

/// `u64 address | i32 opcode | i32 num_src | i32 num_dst | i32 length`.
pub const RECORD_HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSide {
    Source,
    Destination,
}

impl fmt::Display for OperandSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandSide::Source => f.write_str("source"),
            OperandSide::Destination => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{side} operand count {count} exceeds the limit of {MAX_OPERANDS}")]
    TooManyOperands { side: OperandSide, count: usize },

    #[error("{side} operand count {count} is negative")]
    NegativeCount { side: OperandSide, count: i32 },

    #[error("source index {index} out of range (instruction has {count} sources)")]
    SourceOutOfRange { index: usize, count: usize },
}

/// Snapshot of one instruction as the instrumentation side sees it.
///
/// Operand counts are fixed at construction. Only the address, opcode and individual source
/// operands can change afterwards, which is exactly what a patch can express.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstructionRecord {
    address: u64,
    opcode: i32,
    sources: Vec<Operand>,
    destinations: Vec<Operand>,
    length: i32,
}

impl InstructionRecord {
    pub fn new(
        address: u64,
        opcode: i32,
        sources: Vec<Operand>,
        destinations: Vec<Operand>,
        length: i32,
    ) -> Result<Self, RecordError> {
        check_count(OperandSide::Source, sources.len())?;
        check_count(OperandSide::Destination, destinations.len())?;
        Ok(Self {
            address,
            opcode,
            sources,
            destinations,
            length,
        })
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn opcode(&self) -> i32 {
        self.opcode
    }

    pub fn sources(&self) -> &[Operand] {
        &self.sources
    }

    pub fn source(&self, index: usize) -> Option<&Operand> {
        self.sources.get(index)
    }

    pub fn destinations(&self) -> &[Operand] {
        &self.destinations
    }

    /// Encoded machine-code length reported by the instrumentation side.
    pub fn length(&self) -> i32 {
        self.length
    }

    /// Address of the byte following this instruction, if the length is sane.
    pub fn end_address(&self) -> Option<u64> {
        let length = u64::try_from(self.length).ok()?;
        self.address.checked_add(length)
    }

    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    pub fn set_opcode(&mut self, opcode: i32) {
        self.opcode = opcode;
    }

    pub fn set_source(&mut self, index: usize, operand: Operand) -> Result<(), RecordError> {
        let count = self.sources.len();
        let slot = self
            .sources
            .get_mut(index)
            .ok_or(RecordError::SourceOutOfRange { index, count })?;
        *slot = operand;
        Ok(())
    }

    /// Size of this record on the wire.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + (self.sources.len() + self.destinations.len()) * OPERAND_RECORD_LEN
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.extend_from_slice(&self.address.to_le_bytes());
        out.extend_from_slice(&self.opcode.to_le_bytes());
        // Counts are bounded by MAX_OPERANDS, so the casts cannot truncate.
        out.extend_from_slice(&(self.sources.len() as i32).to_le_bytes());
        out.extend_from_slice(&(self.destinations.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        for operand in self.sources.iter().chain(&self.destinations) {
            operand.encode_into(out);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode exactly one record from `bytes`.
    pub fn decode(bytes: &[u8], limits: &Limits) -> Result<Self, WireError> {
        let mut cursor = bytes;
        let record = wire::read_record(&mut cursor, limits)?;
        if !cursor.is_empty() {
            return Err(WireError::TrailingBytes {
                trailing: cursor.len(),
            });
        }
        Ok(record)
    }
}

pub(crate) fn check_count(side: OperandSide, count: usize) -> Result<(), RecordError> {
    if count > MAX_OPERANDS {
        return Err(RecordError::TooManyOperands { side, count });
    }
    Ok(())
}
