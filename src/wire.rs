// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion between host scalars and their register representation.
//!
//! A register value wider than 16 bit spans several consecutive Modbus
//! registers. The canonical representation is big-endian; the other
//! [`WireOrder`]s permute bytes and 16-bit words of that canonical form.

use byteorder::{BigEndian, ByteOrder};

/// Scalar type stored in a register.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    #[default]
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl RegKind {
    /// Number of 16-bit Modbus registers the value occupies.
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::U16 | Self::I16 => 1,
            Self::U32 | Self::I32 | Self::F32 => 2,
            Self::U64 | Self::I64 | Self::F64 => 4,
        }
    }

    /// Number of bytes the value occupies on the wire.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.words() * 2
    }

    pub(crate) const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// Byte and word layout of a register value on the wire.
///
/// The swapped variants transpose the 16-bit words within the value, so
/// the 32-bit value `0xAABB_CCDD` is emitted as `CC DD AA BB`.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WireOrder {
    #[default]
    Big,
    BigSwapped,
    Little,
    LittleSwapped,
}

/// A typed register value.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// The scalar type of the value.
    #[must_use]
    pub const fn kind(self) -> RegKind {
        match self {
            Self::U16(_) => RegKind::U16,
            Self::I16(_) => RegKind::I16,
            Self::U32(_) => RegKind::U32,
            Self::I32(_) => RegKind::I32,
            Self::U64(_) => RegKind::U64,
            Self::I64(_) => RegKind::I64,
            Self::F32(_) => RegKind::F32,
            Self::F64(_) => RegKind::F64,
        }
    }

    /// Raw bit pattern, zero-extended to 64 bit.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        match self {
            Self::U16(v) => v as u64,
            Self::I16(v) => v as u16 as u64,
            Self::U32(v) => v as u64,
            Self::I32(v) => v as u32 as u64,
            Self::U64(v) => v,
            Self::I64(v) => v as u64,
            Self::F32(v) => v.to_bits() as u64,
            Self::F64(v) => v.to_bits(),
        }
    }

    /// Reassemble a value of `kind` from a raw bit pattern.
    #[must_use]
    pub const fn from_bits(kind: RegKind, bits: u64) -> Self {
        match kind {
            RegKind::U16 => Self::U16(bits as u16),
            RegKind::I16 => Self::I16(bits as u16 as i16),
            RegKind::U32 => Self::U32(bits as u32),
            RegKind::I32 => Self::I32(bits as u32 as i32),
            RegKind::U64 => Self::U64(bits),
            RegKind::I64 => Self::I64(bits as i64),
            RegKind::F32 => Self::F32(f32::from_bits(bits as u32)),
            RegKind::F64 => Self::F64(f64::from_bits(bits)),
        }
    }
}

/// Reverse the order of the 16-bit words in `buf`.
fn reverse_words(buf: &mut [u8]) {
    debug_assert!(buf.len() % 2 == 0);
    let words = buf.len() / 2;
    for i in 0..words / 2 {
        let j = words - 1 - i;
        buf.swap(i * 2, j * 2);
        buf.swap(i * 2 + 1, j * 2 + 1);
    }
}

/// Encode `value` into `out` with the given order.
///
/// Returns the number of bytes written (2, 4 or 8). `out` must hold at
/// least `value.kind().bytes()` bytes.
pub fn encode_value(value: Value, order: WireOrder, out: &mut [u8]) -> usize {
    let n = value.kind().bytes();
    let buf = &mut out[..n];
    match value {
        Value::U16(v) => BigEndian::write_u16(buf, v),
        Value::I16(v) => BigEndian::write_i16(buf, v),
        Value::U32(v) => BigEndian::write_u32(buf, v),
        Value::I32(v) => BigEndian::write_i32(buf, v),
        Value::U64(v) => BigEndian::write_u64(buf, v),
        Value::I64(v) => BigEndian::write_i64(buf, v),
        Value::F32(v) => BigEndian::write_u32(buf, v.to_bits()),
        Value::F64(v) => BigEndian::write_u64(buf, v.to_bits()),
    }
    match order {
        WireOrder::Big => (),
        WireOrder::BigSwapped => reverse_words(buf),
        WireOrder::Little => buf.reverse(),
        WireOrder::LittleSwapped => {
            buf.reverse();
            reverse_words(buf);
        }
    }
    n
}

/// Decode a value of `kind` from the leading `kind.bytes()` bytes of `data`.
pub fn decode_value(kind: RegKind, order: WireOrder, data: &[u8]) -> Value {
    let mut buf = [0u8; 8];
    let n = kind.bytes();
    buf[..n].copy_from_slice(&data[..n]);
    let buf = &mut buf[..n];
    match order {
        WireOrder::Big => (),
        WireOrder::BigSwapped => reverse_words(buf),
        WireOrder::Little => buf.reverse(),
        WireOrder::LittleSwapped => {
            reverse_words(buf);
            buf.reverse();
        }
    }
    match kind {
        RegKind::U16 => Value::U16(BigEndian::read_u16(buf)),
        RegKind::I16 => Value::I16(BigEndian::read_i16(buf)),
        RegKind::U32 => Value::U32(BigEndian::read_u32(buf)),
        RegKind::I32 => Value::I32(BigEndian::read_i32(buf)),
        RegKind::U64 => Value::U64(BigEndian::read_u64(buf)),
        RegKind::I64 => Value::I64(BigEndian::read_i64(buf)),
        RegKind::F32 => Value::F32(f32::from_bits(BigEndian::read_u32(buf))),
        RegKind::F64 => Value::F64(f64::from_bits(BigEndian::read_u64(buf))),
    }
}
