//! Fixed-width operand records.
//!
//! Every operand occupies [`OPERAND_RECORD_LEN`] bytes on the wire no matter which variant it
//! is, so operand arrays can be skipped or scanned without per-variant sizing.

/// Encoded size of one operand: `i32 tag | i64 wide | i32 p1 | i32 p2`.
pub const OPERAND_RECORD_LEN: usize = 20;

// Tag values are shared with the instrumentation side and must not change.
pub const OPND_TAG_EMPTY: i32 = 0;
pub const OPND_TAG_REGISTER: i32 = 1;
pub const OPND_TAG_PARTIAL_REGISTER: i32 = 2;
pub const OPND_TAG_IMMEDIATE32: i32 = 4;
pub const OPND_TAG_IMMEDIATE64: i32 = 5;
pub const OPND_TAG_IMMEDIATE_FLOAT: i32 = 6;
pub const OPND_TAG_NEAR_ADDRESS: i32 = 7;
pub const OPND_TAG_FAR_ADDRESS: i32 = 8;
pub const OPND_TAG_ABSOLUTE_ADDRESS: i32 = 9;
pub const OPND_TAG_UNRECOGNIZED: i32 = -1;

/// One instruction operand.
///
/// Variants without a payload carry no information beyond their kind; the instrumentation
/// side only reports the kind for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Empty,
    /// Register id, carried in `p1`.
    Register(i32),
    PartialRegister,
    /// 32-bit immediate, carried in `p1`.
    Immediate32(i32),
    /// 64-bit immediate, carried in `wide`.
    Immediate64(i64),
    ImmediateFloat,
    /// Direct code address, carried in `wide`.
    NearAddress(u64),
    FarAddress,
    AbsoluteAddress,
    /// Any tag this side does not understand.
    Unrecognized,
}

impl Operand {
    pub fn tag(&self) -> i32 {
        match self {
            Operand::Empty => OPND_TAG_EMPTY,
            Operand::Register(_) => OPND_TAG_REGISTER,
            Operand::PartialRegister => OPND_TAG_PARTIAL_REGISTER,
            Operand::Immediate32(_) => OPND_TAG_IMMEDIATE32,
            Operand::Immediate64(_) => OPND_TAG_IMMEDIATE64,
            Operand::ImmediateFloat => OPND_TAG_IMMEDIATE_FLOAT,
            Operand::NearAddress(_) => OPND_TAG_NEAR_ADDRESS,
            Operand::FarAddress => OPND_TAG_FAR_ADDRESS,
            Operand::AbsoluteAddress => OPND_TAG_ABSOLUTE_ADDRESS,
            Operand::Unrecognized => OPND_TAG_UNRECOGNIZED,
        }
    }

    pub fn near_address(&self) -> Option<u64> {
        match *self {
            Operand::NearAddress(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> [u8; OPERAND_RECORD_LEN] {
        let (wide, p1): (i64, i32) = match *self {
            Operand::Register(id) => (0, id),
            Operand::Immediate32(value) => (0, value),
            Operand::Immediate64(value) => (value, 0),
            Operand::NearAddress(addr) => (addr as i64, 0),
            _ => (0, 0),
        };
        let mut out = [0u8; OPERAND_RECORD_LEN];
        out[0..4].copy_from_slice(&self.tag().to_le_bytes());
        out[4..12].copy_from_slice(&wide.to_le_bytes());
        out[12..16].copy_from_slice(&p1.to_le_bytes());
        // p2 (bytes 16..20) is not used by any variant and stays zero.
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    /// Decode one operand record. Never fails: unknown tags become [`Operand::Unrecognized`]
    /// and fields the variant does not use are ignored.
    pub fn from_bytes(bytes: &[u8; OPERAND_RECORD_LEN]) -> Self {
        let tag = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let wide = i64::from_le_bytes([
            bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11],
        ]);
        let p1 = i32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        match tag {
            OPND_TAG_EMPTY => Operand::Empty,
            OPND_TAG_REGISTER => Operand::Register(p1),
            OPND_TAG_PARTIAL_REGISTER => Operand::PartialRegister,
            OPND_TAG_IMMEDIATE32 => Operand::Immediate32(p1),
            OPND_TAG_IMMEDIATE64 => Operand::Immediate64(wide),
            OPND_TAG_IMMEDIATE_FLOAT => Operand::ImmediateFloat,
            OPND_TAG_NEAR_ADDRESS => Operand::NearAddress(wide as u64),
            OPND_TAG_FAR_ADDRESS => Operand::FarAddress,
            OPND_TAG_ABSOLUTE_ADDRESS => Operand::AbsoluteAddress,
            _ => Operand::Unrecognized,
        }
    }
}
