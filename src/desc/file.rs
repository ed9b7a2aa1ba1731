// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::desc::{RegDesc, RegError, find_by_key, find_reg};
use crate::exception::Exception;

/// A Modbus file: a numbered collection of register records.
///
/// Records are addressed by record number the way registers are
/// addressed in a bank, so a record wider than 16 bit occupies several
/// consecutive record numbers. Arrays of file descriptors must be
/// sorted ascending by file number.
#[derive(Default)]
pub struct FileDesc<'a> {
    pub file_no: u16,
    /// Records, sorted ascending by address.
    pub records: &'a [RegDesc<'a>],
}

impl fmt::Debug for FileDesc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDesc")
            .field("file_no", &self.file_no)
            .field("records", &self.records.len())
            .finish()
    }
}

/// Why a file record read failed.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileReadError {
    /// The first requested record does not exist.
    IllegalAddress,
    /// A record reported a device failure.
    DeviceFailure,
}

impl FileDesc<'_> {
    /// Read `record_length` 16-bit words starting at `record_no` into `out`.
    ///
    /// Records that are missing, locked or unreadable are zero-filled one
    /// word at a time; only a missing *first* record rejects the request.
    /// Exactly `2 * record_length` bytes of `out` are filled on success.
    pub fn read_records(
        &self,
        record_no: u16,
        record_length: u16,
        out: &mut [u8],
    ) -> Result<(), FileReadError> {
        if find_reg(self.records, record_no).is_none() {
            return Err(FileReadError::IllegalAddress);
        }

        let mut offs: u16 = 0;
        while offs < record_length {
            let addr = record_no.wrapping_add(offs);
            let filled = usize::from(offs) * 2;
            match find_reg(self.records, addr) {
                Some(reg) => {
                    let remaining = usize::from(record_length - offs);
                    match reg.read_words(addr, remaining, &mut out[filled..]) {
                        Ok(n) => offs += n as u16,
                        Err(RegError::DeviceFailure) => {
                            return Err(FileReadError::DeviceFailure);
                        }
                        Err(RegError::Locked | RegError::NoAccess) => {
                            BigEndian::write_u16(&mut out[filled..], 0);
                            offs += 1;
                        }
                    }
                }
                None => {
                    BigEndian::write_u16(&mut out[filled..], 0);
                    offs += 1;
                }
            }
        }
        Ok(())
    }

    /// Pre-pass for a record write: every touched record must exist and
    /// accept the write. Nothing is mutated.
    pub fn write_allowed(&self, record_no: u16, record_length: u16) -> Result<(), Exception> {
        let mut offs: u16 = 0;
        while offs < record_length {
            let addr = record_no.wrapping_add(offs);
            let reg = find_reg(self.records, addr).ok_or(Exception::IllegalDataAddress)?;
            let remaining = usize::from(record_length - offs);
            let n = reg.write_allowed(addr, remaining)?;
            // Advance by the consumed span to handle sub-registers and
            // wide records.
            offs += n as u16;
        }
        Ok(())
    }

    /// Write `record_length` words of big-endian `data` starting at
    /// `record_no`, firing each record's `post_write` as it completes.
    pub fn write_records(
        &self,
        record_no: u16,
        record_length: u16,
        data: &[u8],
    ) -> Result<(), Exception> {
        let mut offs: u16 = 0;
        while offs < record_length {
            let addr = record_no.wrapping_add(offs);
            let reg = find_reg(self.records, addr).ok_or(Exception::ServerDeviceFailure)?;
            let remaining = usize::from(record_length - offs);
            let n = reg.write_words(addr, remaining, &data[usize::from(offs) * 2..])?;
            if let Some(post_write) = reg.post_write {
                post_write();
            }
            offs += n as u16;
        }
        Ok(())
    }
}

/// Find the file descriptor with the given file number.
#[must_use]
pub fn find_file<'r, 'a>(files: &'r [FileDesc<'a>], file_no: u16) -> Option<&'r FileDesc<'a>> {
    find_by_key(files, file_no, |file| file.file_no)
}
