//! Typed per-phase messages over a byte stream.
//!
//! Each phase of the exchange has its own read/write pair. Writers build the full message
//! before touching the stream and refuse anything larger than the transfer buffer; readers
//! account every byte they pull against the same bound.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::operand::{Operand, OPERAND_RECORD_LEN};
use crate::record::{check_count, InstructionRecord, OperandSide, RecordError, RECORD_HEADER_LEN};
use crate::SENTINEL;

/// Transfer buffer size used by the reference deployment.
pub const DEFAULT_TRANSFER_BUFFER_BYTES: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest single message (instruction or patch) either side will send or accept.
    pub max_frame_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_TRANSFER_BUFFER_BYTES,
        }
    }
}

impl Limits {
    pub fn check(&self, len: usize) -> Result<(), WireError> {
        if len > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

/// Coarse classification used to decide what a failure means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FrameTooLarge,
    ProtocolDesync,
    Channel,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame of {len} bytes exceeds the {max}-byte transfer buffer")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed instruction record: {0}")]
    Record(#[from] RecordError),

    #[error("announced instruction count {0} is negative")]
    NegativeCount(i32),

    #[error("{0} does not fit in an i32 count or index")]
    CountOverflow(usize),

    #[error("patch for instruction {index} carries {found} source flags, the instruction has {expected}")]
    SourceCountMismatch {
        index: i32,
        expected: usize,
        found: usize,
    },

    #[error("patch references instruction {index} but the block holds {len}")]
    IndexOutOfRange { index: i32, len: usize },

    #[error("{trailing} trailing bytes after message")]
    TrailingBytes { trailing: usize },

    #[error("channel error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::FrameTooLarge { .. } => ErrorKind::FrameTooLarge,
            WireError::Record(_)
            | WireError::NegativeCount(_)
            | WireError::CountOverflow(_)
            | WireError::IndexOutOfRange { .. }
            | WireError::SourceCountMismatch { .. }
            | WireError::TrailingBytes { .. } => ErrorKind::ProtocolDesync,
            WireError::Io(_) => ErrorKind::Channel,
        }
    }
}

/// First message of every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    Block { count: u32 },
    Terminate,
}

impl Announce {
    pub fn for_block(len: usize) -> Result<Self, WireError> {
        let count = i32::try_from(len).map_err(|_| WireError::CountOverflow(len))?;
        Ok(Announce::Block {
            count: count as u32,
        })
    }

    pub fn to_wire(self) -> i32 {
        match self {
            // `for_block` keeps counts within i32 range.
            Announce::Block { count } => count as i32,
            Announce::Terminate => SENTINEL,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, WireError> {
        match value {
            SENTINEL => Ok(Announce::Terminate),
            v if v < 0 => Err(WireError::NegativeCount(v)),
            v => Ok(Announce::Block { count: v as u32 }),
        }
    }
}

/// Reads one message from a stream while enforcing the transfer-buffer bound.
pub struct FrameReader<'a, R: ?Sized> {
    inner: &'a mut R,
    len: usize,
    max: usize,
}

impl<'a, R: Read + ?Sized> FrameReader<'a, R> {
    pub fn new(inner: &'a mut R, limits: &Limits) -> Self {
        Self {
            inner,
            len: 0,
            max: limits.max_frame_bytes,
        }
    }

    /// Bytes consumed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let len = self.len + N;
        if len > self.max {
            return Err(WireError::FrameTooLarge { len, max: self.max });
        }
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        self.len = len;
        Ok(buf)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    /// Flags are C-style: any non-zero value is set.
    pub fn read_flag(&mut self) -> Result<bool, WireError> {
        Ok(self.read_i32()? != 0)
    }

    pub fn read_operand(&mut self) -> Result<Operand, WireError> {
        Ok(Operand::from_bytes(&self.take::<OPERAND_RECORD_LEN>()?))
    }
}

/// Write a fully built message, refusing it if it does not fit the transfer buffer.
pub fn send_frame<W: Write + ?Sized>(
    writer: &mut W,
    bytes: &[u8],
    limits: &Limits,
) -> Result<(), WireError> {
    limits.check(bytes.len())?;
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Announce counts, acknowledgements and the end marker are all a single i32.
pub fn write_i32<W: Write + ?Sized>(writer: &mut W, value: i32) -> Result<(), WireError> {
    writer.write_all(&value.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_i32<R: Read + ?Sized>(reader: &mut R) -> Result<i32, WireError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_announce<W: Write + ?Sized>(
    writer: &mut W,
    announce: Announce,
) -> Result<(), WireError> {
    write_i32(writer, announce.to_wire())
}

pub fn read_announce<R: Read + ?Sized>(reader: &mut R) -> Result<Announce, WireError> {
    Announce::from_wire(read_i32(reader)?)
}

pub fn write_record<W: Write + ?Sized>(
    writer: &mut W,
    record: &InstructionRecord,
    limits: &Limits,
) -> Result<(), WireError> {
    limits.check(record.encoded_len())?;
    send_frame(writer, &record.to_bytes(), limits)
}

pub fn read_record<R: Read + ?Sized>(
    reader: &mut R,
    limits: &Limits,
) -> Result<InstructionRecord, WireError> {
    let mut frame = FrameReader::new(reader, limits);
    let address = frame.read_u64()?;
    let opcode = frame.read_i32()?;
    let num_src = operand_count(OperandSide::Source, frame.read_i32()?)?;
    let num_dst = operand_count(OperandSide::Destination, frame.read_i32()?)?;
    let length = frame.read_i32()?;

    // Reject the whole record before pulling operand bytes we would refuse anyway.
    limits.check(RECORD_HEADER_LEN + (num_src + num_dst) * OPERAND_RECORD_LEN)?;

    let sources = (0..num_src)
        .map(|_| frame.read_operand())
        .collect::<Result<Vec<_>, _>>()?;
    let destinations = (0..num_dst)
        .map(|_| frame.read_operand())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InstructionRecord::new(
        address,
        opcode,
        sources,
        destinations,
        length,
    )?)
}

fn operand_count(side: OperandSide, raw: i32) -> Result<usize, RecordError> {
    let count = usize::try_from(raw).map_err(|_| RecordError::NegativeCount { side, count: raw })?;
    check_count(side, count)?;
    Ok(count)
}

/// `None` travels as address 0 and means "leave the fallthrough target alone".
pub fn write_fallthrough<W: Write + ?Sized>(
    writer: &mut W,
    fallthrough: Option<u64>,
) -> Result<(), WireError> {
    writer.write_all(&fallthrough.unwrap_or(0).to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_fallthrough<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u64>, WireError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    let address = u64::from_le_bytes(buf);
    Ok((address != 0).then_some(address))
}
