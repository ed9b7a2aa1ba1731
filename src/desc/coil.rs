// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::cell::Cell;
use core::fmt;

use crate::desc::find_by_key;
use crate::exception::Exception;

/// Where a coil read gets its bit from.
#[derive(Default, Clone, Copy)]
pub enum CoilRead<'a> {
    /// The coil is not readable.
    #[default]
    None,
    /// A fixed value.
    Value(bool),
    /// Bit `1 << index` of the referenced byte. The index must be in `0..8`.
    Bit(&'a Cell<u8>, u8),
    /// Read through a callback.
    Fn(&'a dyn Fn() -> bool),
}

/// Where a coil write puts its bit.
#[derive(Default, Clone, Copy)]
pub enum CoilWrite<'a> {
    /// The coil is not writable.
    #[default]
    None,
    /// Bit `1 << index` of the referenced byte. The index must be in `0..8`.
    Bit(&'a Cell<u8>, u8),
    /// Write through a callback.
    Fn(&'a dyn Fn(bool) -> Result<(), Exception>),
}

/// A single coil or discrete input.
///
/// Arrays of descriptors must be sorted ascending by address.
#[derive(Default)]
pub struct CoilDesc<'a> {
    pub address: u16,
    pub read: CoilRead<'a>,
    pub write: CoilWrite<'a>,
    /// Returns `true` while reads are locked out.
    pub rlock: Option<&'a dyn Fn() -> bool>,
    /// Returns `true` while writes are locked out.
    pub wlock: Option<&'a dyn Fn() -> bool>,
    /// Fired by the function handler after a successful write.
    pub post_write: Option<&'a dyn Fn()>,
}

impl fmt::Debug for CoilDesc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoilDesc")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Why a coil access failed.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilError {
    /// The read lock is engaged.
    Locked,
    /// The coil has no source for the requested direction.
    NoAccess,
    /// Misconfigured descriptor or failing callback.
    DeviceFailure,
}

impl CoilDesc<'_> {
    /// Read the coil state.
    pub fn read(&self) -> Result<bool, CoilError> {
        if self.rlock.is_some_and(|locked| locked()) {
            return Err(CoilError::Locked);
        }
        match self.read {
            CoilRead::None => Err(CoilError::NoAccess),
            CoilRead::Value(v) => Ok(v),
            CoilRead::Bit(byte, ix) => {
                if ix < 8 {
                    Ok(byte.get() & (1 << ix) != 0)
                } else {
                    Err(CoilError::DeviceFailure)
                }
            }
            CoilRead::Fn(read) => Ok(read()),
        }
    }

    /// `false` while the write lock is engaged.
    #[must_use]
    pub fn write_allowed(&self) -> bool {
        !self.wlock.is_some_and(|locked| locked())
    }

    /// Write the coil state.
    ///
    /// The caller fires `post_write` afterwards; this only moves the bit.
    pub fn write(&self, on: bool) -> Result<(), Exception> {
        match self.write {
            CoilWrite::None => Err(Exception::ServerDeviceFailure),
            CoilWrite::Bit(byte, ix) => {
                if ix > 7 {
                    return Err(Exception::ServerDeviceFailure);
                }
                if on {
                    byte.set(byte.get() | (1 << ix));
                } else {
                    byte.set(byte.get() & !(1 << ix));
                }
                Ok(())
            }
            CoilWrite::Fn(write) => write(on),
        }
    }
}

/// Find the coil descriptor with the given address.
#[must_use]
pub fn find_coil<'r, 'a>(coils: &'r [CoilDesc<'a>], addr: u16) -> Option<&'r CoilDesc<'a>> {
    find_by_key(coils, addr, |coil| coil.address)
}
