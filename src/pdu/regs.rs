// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register function handlers (FC 0x03, 0x04, 0x06, 0x10, 0x16, 0x17).

use byteorder::{BigEndian, ByteOrder};

use super::PduBuf;
use crate::desc::{RegDesc, RegError, find_reg};
use crate::exception::Exception;
use crate::instance::Instance;

const READ_QUANTITY_MAX: u16 = 0x007D;
const WRITE_QUANTITY_MAX: u16 = 0x007B;
const RW_WRITE_QUANTITY_MAX: u16 = 0x0079;

/// Emit `quantity` big-endian words starting at `start_addr`.
///
/// Registers not present in the bank and registers without read access
/// contribute a zero word each; a locked register aborts with
/// `ILLEGAL DATA ADDRESS` and a device failure propagates.
fn emit_words(
    bank: &[RegDesc<'_>],
    start_addr: u16,
    quantity: u16,
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    let mut written: u16 = 0;
    while written < quantity {
        let addr = start_addr.wrapping_add(written);
        let Some(reg) = find_reg(bank, addr) else {
            res.push_u16(0);
            written += 1;
            continue;
        };
        let mut word_buf = [0u8; 8];
        match reg.read_words(addr, usize::from(quantity - written), &mut word_buf) {
            Ok(n) => {
                res.extend_from_slice(&word_buf[..n * 2]);
                written += n as u16;
            }
            Err(RegError::NoAccess) => {
                res.push_u16(0);
                written += 1;
            }
            Err(RegError::Locked) => return Err(Exception::IllegalDataAddress),
            Err(RegError::DeviceFailure) => return Err(Exception::ServerDeviceFailure),
        }
    }
    Ok(())
}

/// Validate then perform the writes of a multi-register request.
///
/// All descriptors are checked with `write_allowed` before the first
/// mutation; writes then run in ascending address order, firing each
/// register's `post_write` as it completes.
fn write_run(bank: &[RegDesc<'_>], start_addr: u16, quantity: u16, data: &[u8]) -> Result<(), Exception> {
    let mut offs: u16 = 0;
    while offs < quantity {
        let addr = start_addr.wrapping_add(offs);
        let reg = find_reg(bank, addr).ok_or(Exception::IllegalDataAddress)?;
        let n = reg.write_allowed(addr, usize::from(quantity - offs))?;
        offs += n as u16;
    }

    let mut offs: u16 = 0;
    while offs < quantity {
        let addr = start_addr.wrapping_add(offs);
        let reg = find_reg(bank, addr).ok_or(Exception::ServerDeviceFailure)?;
        let n = reg.write_words(
            addr,
            usize::from(quantity - offs),
            &data[usize::from(offs) * 2..],
        )?;
        if let Some(post_write) = reg.post_write {
            post_write();
        }
        offs += n as u16;
    }
    Ok(())
}

/// FC `0x03` / `0x04`: read a run of holding or input registers.
pub(crate) fn read_regs(
    bank: &[RegDesc<'_>],
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    let start_addr = BigEndian::read_u16(&req[1..3]);
    let quantity = BigEndian::read_u16(&req[3..5]);
    if quantity == 0 || quantity > READ_QUANTITY_MAX {
        return Err(Exception::IllegalDataValue);
    }

    // Gaps inside the run read as zero, a missing first register does not.
    if find_reg(bank, start_addr).is_none() {
        return Err(Exception::IllegalDataAddress);
    }

    res.push((quantity * 2) as u8);
    emit_words(bank, start_addr, quantity, res)
}

/// FC `0x06`: write a single 16-bit word.
pub(crate) fn write_reg(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    let addr = BigEndian::read_u16(&req[1..3]);

    let reg = find_reg(inst.holding_regs, addr).ok_or(Exception::IllegalDataAddress)?;
    reg.write_allowed(addr, 1)?;
    reg.write_words(addr, 1, &req[3..5])?;

    if let Some(post_write) = reg.post_write {
        post_write();
    }
    if let Some(commit) = inst.commit_regs_write {
        commit();
    }

    // Echo the request
    res.extend_from_slice(&req[1..5]);
    Ok(())
}

/// FC `0x10`: write a run of registers.
pub(crate) fn write_regs(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < 6 {
        return Err(Exception::IllegalDataValue);
    }
    let start_addr = BigEndian::read_u16(&req[1..3]);
    let quantity = BigEndian::read_u16(&req[3..5]);
    let byte_count = req[5];

    if quantity == 0 || quantity > WRITE_QUANTITY_MAX {
        return Err(Exception::IllegalDataValue);
    }
    if u16::from(byte_count) != quantity * 2 {
        return Err(Exception::IllegalDataValue);
    }
    if req.len() != 6 + usize::from(byte_count) {
        return Err(Exception::IllegalDataValue);
    }

    write_run(inst.holding_regs, start_addr, quantity, &req[6..])?;

    if let Some(commit) = inst.commit_regs_write {
        commit();
    }

    res.push_u16(start_addr);
    res.push_u16(quantity);
    Ok(())
}

/// FC `0x16`: masked read-modify-write of a single word.
///
/// `new = (current AND and_mask) OR (or_mask AND NOT and_mask)`
pub(crate) fn mask_write_reg(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 7 {
        return Err(Exception::IllegalDataValue);
    }
    let addr = BigEndian::read_u16(&req[1..3]);
    let and_mask = BigEndian::read_u16(&req[3..5]);
    let or_mask = BigEndian::read_u16(&req[5..7]);

    let reg = find_reg(inst.holding_regs, addr).ok_or(Exception::IllegalDataAddress)?;
    // Mask-write is defined on single-word registers.
    if reg.words() != 1 {
        return Err(Exception::IllegalDataAddress);
    }
    reg.write_allowed(addr, 1)?;

    let mut word_buf = [0u8; 8];
    match reg.read_words(addr, 1, &mut word_buf) {
        Ok(_) => (),
        Err(RegError::Locked | RegError::NoAccess) => {
            return Err(Exception::IllegalDataAddress);
        }
        Err(RegError::DeviceFailure) => return Err(Exception::ServerDeviceFailure),
    }
    let current = BigEndian::read_u16(&word_buf);

    let new = (current & and_mask) | (or_mask & !and_mask);
    let mut new_be = [0u8; 2];
    BigEndian::write_u16(&mut new_be, new);
    reg.write_words(addr, 1, &new_be)?;

    if let Some(post_write) = reg.post_write {
        post_write();
    }
    if let Some(commit) = inst.commit_regs_write {
        commit();
    }

    // Echo the request
    res.extend_from_slice(&req[1..7]);
    Ok(())
}

/// FC `0x17`: combined write-then-read on the holding registers.
///
/// Both halves are validated before the write phase mutates anything;
/// the read phase then reports the post-write contents.
pub(crate) fn read_write_regs(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < 10 {
        return Err(Exception::IllegalDataValue);
    }
    let read_addr = BigEndian::read_u16(&req[1..3]);
    let read_quantity = BigEndian::read_u16(&req[3..5]);
    let write_addr = BigEndian::read_u16(&req[5..7]);
    let write_quantity = BigEndian::read_u16(&req[7..9]);
    let write_byte_count = req[9];

    if read_quantity == 0 || read_quantity > READ_QUANTITY_MAX {
        return Err(Exception::IllegalDataValue);
    }
    if write_quantity == 0 || write_quantity > RW_WRITE_QUANTITY_MAX {
        return Err(Exception::IllegalDataValue);
    }
    if u16::from(write_byte_count) != write_quantity * 2 {
        return Err(Exception::IllegalDataValue);
    }
    if req.len() != 10 + usize::from(write_byte_count) {
        return Err(Exception::IllegalDataValue);
    }
    if find_reg(inst.holding_regs, read_addr).is_none() {
        return Err(Exception::IllegalDataAddress);
    }

    // Write first, then read.
    write_run(inst.holding_regs, write_addr, write_quantity, &req[10..])?;
    if let Some(commit) = inst.commit_regs_write {
        commit();
    }

    res.push((read_quantity * 2) as u8);
    emit_words(inst.holding_regs, read_addr, read_quantity, res)
}
