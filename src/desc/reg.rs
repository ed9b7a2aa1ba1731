// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::cell::Cell;
use core::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::desc::BSEARCH_THRESHOLD;
use crate::exception::Exception;
use crate::wire::{RegKind, Value, WireOrder, decode_value, encode_value};

/// Typed reference to host-owned register storage.
#[derive(Clone, Copy)]
pub enum CellRef<'a> {
    U16(&'a Cell<u16>),
    I16(&'a Cell<i16>),
    U32(&'a Cell<u32>),
    I32(&'a Cell<i32>),
    U64(&'a Cell<u64>),
    I64(&'a Cell<i64>),
    F32(&'a Cell<f32>),
    F64(&'a Cell<f64>),
}

impl CellRef<'_> {
    const fn kind(self) -> RegKind {
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

    fn get(self) -> Value {
        match self {
            Self::U16(c) => Value::U16(c.get()),
            Self::I16(c) => Value::I16(c.get()),
            Self::U32(c) => Value::U32(c.get()),
            Self::I32(c) => Value::I32(c.get()),
            Self::U64(c) => Value::U64(c.get()),
            Self::I64(c) => Value::I64(c.get()),
            Self::F32(c) => Value::F32(c.get()),
            Self::F64(c) => Value::F64(c.get()),
        }
    }

    /// Store `value`, failing on a type mismatch.
    fn set(self, value: Value) -> Result<(), Exception> {
        match (self, value) {
            (Self::U16(c), Value::U16(v)) => c.set(v),
            (Self::I16(c), Value::I16(v)) => c.set(v),
            (Self::U32(c), Value::U32(v)) => c.set(v),
            (Self::I32(c), Value::I32(v)) => c.set(v),
            (Self::U64(c), Value::U64(v)) => c.set(v),
            (Self::I64(c), Value::I64(v)) => c.set(v),
            (Self::F32(c), Value::F32(v)) => c.set(v),
            (Self::F64(c), Value::F64(v)) => c.set(v),
            _ => return Err(Exception::ServerDeviceFailure),
        }
        Ok(())
    }
}

/// Where a register read gets its value from.
#[derive(Default, Clone, Copy)]
pub enum RegRead<'a> {
    /// The register is not readable.
    #[default]
    None,
    /// A fixed value.
    Value(Value),
    /// Host-owned storage.
    Cell(CellRef<'a>),
    /// Read through a callback.
    Fn(&'a dyn Fn() -> Value),
}

/// Where a register write puts its value.
#[derive(Default, Clone, Copy)]
pub enum RegWrite<'a> {
    /// The register is not writable.
    #[default]
    None,
    /// Host-owned storage.
    Cell(CellRef<'a>),
    /// Write through a callback.
    Fn(&'a dyn Fn(Value) -> Result<(), Exception>),
}

/// A bit-field slice within a wider physical word.
///
/// The slice is the Modbus-visible value; writes read-modify-write the
/// underlying storage so bits outside the slice never change.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubField {
    /// Bit offset of the slice within the physical word.
    pub offset: u8,
    /// Number of bits in the slice.
    pub len: u8,
    /// Sign-extend the slice on reads.
    pub signed: bool,
}

impl SubField {
    /// Slice parameters if they fit the physical `kind`.
    fn checked(self, kind: RegKind) -> Option<(u32, u32)> {
        let offset = u32::from(self.offset);
        let len = u32::from(self.len);
        let phys_bits = kind.bytes() as u32 * 8;
        if kind.is_float() || len == 0 || offset + len > phys_bits {
            return None;
        }
        Some((offset, len))
    }

    const fn mask(len: u32) -> u64 {
        if len >= 64 { u64::MAX } else { (1 << len) - 1 }
    }
}

/// A register occupying one or more consecutive Modbus addresses.
///
/// Arrays of descriptors must be sorted ascending by address and must
/// not overlap: a descriptor reserves all addresses in its word span.
#[derive(Default)]
pub struct RegDesc<'a> {
    pub address: u16,
    /// Physical scalar type; determines the word span.
    pub kind: RegKind,
    /// Byte/word layout on the wire.
    pub order: WireOrder,
    pub read: RegRead<'a>,
    pub write: RegWrite<'a>,
    /// Optional bit-field slice within the physical word.
    pub sub: Option<SubField>,
    /// Returns `true` while reads are locked out.
    pub rlock: Option<&'a dyn Fn() -> bool>,
    /// Returns `true` while writes are locked out.
    pub wlock: Option<&'a dyn Fn() -> bool>,
    /// Fired after the register has been fully written.
    pub post_write: Option<&'a dyn Fn()>,
}

impl fmt::Debug for RegDesc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegDesc")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Why a register read failed.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegError {
    /// The read lock is engaged.
    Locked,
    /// The register has no read source.
    NoAccess,
    /// Misconfigured descriptor or failing callback.
    DeviceFailure,
}

impl RegDesc<'_> {
    /// Number of 16-bit Modbus registers this descriptor occupies.
    #[must_use]
    pub fn words(&self) -> usize {
        match self.sub {
            Some(sub) => usize::from(sub.len).div_ceil(16),
            None => self.kind.words(),
        }
    }

    /// Whether `addr` falls within this descriptor's word span.
    #[must_use]
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.address && usize::from(addr - self.address) < self.words()
    }

    fn current(&self) -> Result<Value, RegError> {
        let value = match self.read {
            RegRead::None => return Err(RegError::NoAccess),
            RegRead::Value(v) => v,
            RegRead::Cell(c) => c.get(),
            RegRead::Fn(read) => read(),
        };
        if value.kind() != self.kind {
            return Err(RegError::DeviceFailure);
        }
        Ok(value)
    }

    /// Encode the visible value into `buf` (big-endian words).
    fn encode_visible(&self, value: Value, buf: &mut [u8; 8]) -> Result<usize, RegError> {
        let Some(sub) = self.sub else {
            return Ok(encode_value(value, self.order, buf));
        };
        let (offset, len) = sub.checked(self.kind).ok_or(RegError::DeviceFailure)?;
        let mask = SubField::mask(len);
        let mut bits = (value.to_bits() >> offset) & mask;
        if sub.signed && len < 64 && bits & (1 << (len - 1)) != 0 {
            bits |= !mask;
        }
        let words = self.words();
        for w in 0..words {
            let word = (bits >> ((words - 1 - w) * 16)) as u16;
            BigEndian::write_u16(&mut buf[w * 2..], word);
        }
        Ok(words * 2)
    }

    /// Read the register and emit its big-endian 16-bit words into `out`.
    ///
    /// `addr` may point into the middle of the word span; emission starts
    /// at that word. At most `max_words` words are produced and the
    /// number actually emitted is returned, which is less than the full
    /// span when `max_words` cuts it short.
    pub fn read_words(
        &self,
        addr: u16,
        max_words: usize,
        out: &mut [u8],
    ) -> Result<usize, RegError> {
        if self.rlock.is_some_and(|locked| locked()) {
            return Err(RegError::Locked);
        }
        let value = self.current()?;
        let mut buf = [0u8; 8];
        let bytes = self.encode_visible(value, &mut buf)?;
        let offset = usize::from(addr.checked_sub(self.address).ok_or(RegError::DeviceFailure)?);
        let words = bytes / 2;
        if offset >= words {
            return Err(RegError::DeviceFailure);
        }
        let n = (words - offset).min(max_words);
        out[..n * 2].copy_from_slice(&buf[offset * 2..(offset + n) * 2]);
        Ok(n)
    }

    /// Check that a write starting at `addr` with `max_words` words of
    /// supplied data could go through.
    ///
    /// Returns the number of words the register would consume. Run as a
    /// pre-pass by the multi-write handlers so validation completes
    /// before any mutation.
    pub fn write_allowed(&self, addr: u16, max_words: usize) -> Result<usize, Exception> {
        if self.wlock.is_some_and(|locked| locked()) {
            return Err(Exception::IllegalDataAddress);
        }
        if matches!(self.write, RegWrite::None) {
            return Err(Exception::IllegalDataAddress);
        }
        // A write must cover the whole span; starting in the middle of a
        // wide register is not addressable.
        if addr != self.address {
            return Err(Exception::IllegalDataAddress);
        }
        if max_words < self.words() {
            return Err(Exception::IllegalDataValue);
        }
        Ok(self.words())
    }

    fn store(&self, value: Value) -> Result<(), Exception> {
        match self.write {
            RegWrite::None => Err(Exception::ServerDeviceFailure),
            RegWrite::Cell(c) => c.set(value),
            RegWrite::Fn(write) => write(value),
        }
    }

    /// Physical word for the read-modify-write of a sub-register.
    fn rmw_current(&self) -> Result<u64, Exception> {
        if let RegWrite::Cell(c) = self.write {
            if c.kind() != self.kind {
                return Err(Exception::ServerDeviceFailure);
            }
            return Ok(c.get().to_bits());
        }
        self.current()
            .map(Value::to_bits)
            .map_err(|_| Exception::ServerDeviceFailure)
    }

    /// Write the register from `2 * words()` big-endian bytes of `data`.
    ///
    /// Returns the number of words consumed. A request that supplies
    /// fewer words than the register spans is rejected with
    /// [`Exception::IllegalDataValue`].
    pub fn write_words(
        &self,
        addr: u16,
        max_words: usize,
        data: &[u8],
    ) -> Result<usize, Exception> {
        if addr != self.address {
            return Err(Exception::IllegalDataAddress);
        }
        let words = self.words();
        if max_words < words || data.len() < words * 2 {
            return Err(Exception::IllegalDataValue);
        }
        if let Some(sub) = self.sub {
            let (offset, len) = sub
                .checked(self.kind)
                .ok_or(Exception::ServerDeviceFailure)?;
            let mask = SubField::mask(len);
            let mut incoming = 0u64;
            for w in 0..words {
                incoming = (incoming << 16) | u64::from(BigEndian::read_u16(&data[w * 2..]));
            }
            let merged =
                (self.rmw_current()? & !(mask << offset)) | ((incoming & mask) << offset);
            self.store(Value::from_bits(self.kind, merged))?;
        } else {
            self.store(decode_value(self.kind, self.order, data))?;
        }
        Ok(words)
    }
}

/// Find the register descriptor whose word span contains `addr`.
///
/// A 32-bit register at address `A` is also found when looking up
/// `A + 1`; the caller derives the word offset from the descriptor's
/// base address.
#[must_use]
pub fn find_reg<'r, 'a>(regs: &'r [RegDesc<'a>], addr: u16) -> Option<&'r RegDesc<'a>> {
    if regs.len() < BSEARCH_THRESHOLD {
        regs.iter().find(|reg| reg.contains(addr))
    } else {
        let idx = regs.partition_point(|reg| reg.address <= addr);
        idx.checked_sub(1)
            .map(|i| &regs[i])
            .filter(|reg| reg.contains(addr))
    }
}
