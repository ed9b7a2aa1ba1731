// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coil and discrete input function handlers (FC 0x01, 0x02, 0x05, 0x0F).

use byteorder::{BigEndian, ByteOrder};

use super::PduBuf;
use crate::desc::{CoilDesc, CoilError, find_coil};
use crate::exception::Exception;
use crate::instance::Instance;

const READ_QUANTITY_MAX: u16 = 0x07D0;
const WRITE_QUANTITY_MAX: u16 = 0x07B0;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// FC `0x01` / `0x02`: read a run of coils or discrete inputs.
pub(crate) fn read_coils(
    bank: &[CoilDesc<'_>],
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

    // Missing coils inside the run read as zero, but a missing first
    // coil rejects the whole request.
    if find_coil(bank, start_addr).is_none() {
        return Err(Exception::IllegalDataAddress);
    }

    let byte_count = usize::from(quantity.div_ceil(8));
    let mut packed = [0u8; READ_QUANTITY_MAX.div_ceil(8) as usize];
    for i in 0..quantity {
        let addr = start_addr.wrapping_add(i);
        let Some(coil) = find_coil(bank, addr) else {
            continue;
        };
        match coil.read() {
            Ok(true) => packed[usize::from(i / 8)] |= 1 << (i % 8),
            Ok(false) | Err(CoilError::NoAccess) => (),
            Err(CoilError::Locked) => return Err(Exception::IllegalDataAddress),
            Err(CoilError::DeviceFailure) => return Err(Exception::ServerDeviceFailure),
        }
    }

    res.push(byte_count as u8);
    res.extend_from_slice(&packed[..byte_count]);
    Ok(())
}

/// FC `0x05`: write a single coil.
pub(crate) fn write_coil(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    let coil_addr = BigEndian::read_u16(&req[1..3]);
    let coil_value = BigEndian::read_u16(&req[3..5]);
    if coil_value != COIL_ON && coil_value != COIL_OFF {
        return Err(Exception::IllegalDataValue);
    }

    let coil = find_coil(inst.coils, coil_addr).ok_or(Exception::IllegalDataAddress)?;
    if !coil.write_allowed() {
        return Err(Exception::IllegalDataAddress);
    }
    coil.write(coil_value == COIL_ON)?;

    if let Some(post_write) = coil.post_write {
        post_write();
    }
    if let Some(commit) = inst.commit_coils_write {
        commit();
    }

    // Echo the request
    res.extend_from_slice(&req[1..5]);
    Ok(())
}

/// FC `0x0F`: write a run of coils.
pub(crate) fn write_coils(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < 7 {
        return Err(Exception::IllegalDataValue);
    }
    let start_addr = BigEndian::read_u16(&req[1..3]);
    let quantity = BigEndian::read_u16(&req[3..5]);
    let byte_count = req[5];

    if quantity == 0 || quantity > WRITE_QUANTITY_MAX {
        return Err(Exception::IllegalDataValue);
    }
    if u16::from(byte_count) != quantity.div_ceil(8) {
        return Err(Exception::IllegalDataValue);
    }
    if req.len() != 6 + usize::from(byte_count) {
        return Err(Exception::IllegalDataValue);
    }

    // Every coil must exist and be writable before anything is written.
    for i in 0..quantity {
        let addr = start_addr.wrapping_add(i);
        let coil = find_coil(inst.coils, addr).ok_or(Exception::IllegalDataAddress)?;
        if !coil.write_allowed() {
            return Err(Exception::IllegalDataAddress);
        }
    }

    for i in 0..quantity {
        let addr = start_addr.wrapping_add(i);
        let coil = find_coil(inst.coils, addr).ok_or(Exception::ServerDeviceFailure)?;
        let on = req[6 + usize::from(i / 8)] & (1 << (i % 8)) != 0;
        coil.write(on)?;
        if let Some(post_write) = coil.post_write {
            post_write();
        }
    }

    if let Some(commit) = inst.commit_coils_write {
        commit();
    }

    res.push_u16(start_addr);
    res.push_u16(quantity);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{CoilRead, CoilWrite};
    use crate::frame::PDU_SIZE_MAX;
    use crate::pdu::handle_req;
    use core::cell::Cell;

    fn pdu(inst: &mut Instance<'_>, req: &[u8]) -> (usize, [u8; PDU_SIZE_MAX]) {
        let mut res = [0u8; PDU_SIZE_MAX];
        let len = handle_req(inst, req, &mut res);
        (len, res)
    }

    fn value_coil(address: u16, on: bool) -> CoilDesc<'static> {
        CoilDesc {
            address,
            read: CoilRead::Value(on),
            ..CoilDesc::default()
        }
    }

    #[test]
    fn read_coils_packs_lsb_first() {
        let coils = [
            value_coil(0, true),
            value_coil(1, false),
            value_coil(2, true),
            value_coil(3, true),
        ];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(&res[..len], &[0x01, 0x01, 0b0000_1101]);
    }

    #[test]
    fn read_coils_pads_missing_with_zero() {
        let coils = [value_coil(0, true), value_coil(2, true)];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(&res[..len], &[0x01, 0x01, 0b0000_0101]);
    }

    #[test]
    fn read_coils_missing_first_is_illegal_address() {
        let coils = [value_coil(5, true)];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x81, 0x02]);
    }

    #[test]
    fn read_coils_quantity_bounds() {
        let coils = [value_coil(0, true)];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&res[..len], &[0x81, 0x03]);
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x07, 0xD1]);
        assert_eq!(&res[..len], &[0x81, 0x03]);
    }

    #[test]
    fn read_coils_locked_is_illegal_address() {
        let locked = || true;
        let coils = [CoilDesc {
            address: 0,
            read: CoilRead::Value(true),
            rlock: Some(&locked),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x81, 0x02]);
    }

    #[test]
    fn read_discrete_inputs_uses_their_bank() {
        let inputs = [value_coil(3, true)];
        let mut inst = Instance {
            discrete_inputs: &inputs,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x02, 0x00, 0x03, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x02, 0x01, 0x01]);
    }

    #[test]
    fn write_coil_echoes_the_request() {
        let bits = Cell::new(0u8);
        let coils = [CoilDesc {
            address: 0x00AC,
            write: CoilWrite::Bit(&bits, 0),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(&res[..len], &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(bits.get(), 1);
    }

    #[test]
    fn write_coil_rejects_odd_values() {
        let bits = Cell::new(0u8);
        let coils = [CoilDesc {
            address: 0,
            write: CoilWrite::Bit(&bits, 0),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x05, 0x00, 0x00, 0x12, 0x34]);
        assert_eq!(&res[..len], &[0x85, 0x03]);
        assert_eq!(bits.get(), 0);
    }

    #[test]
    fn write_coil_fires_callbacks_in_order() {
        let trace = Cell::new(0u8);
        let bits = Cell::new(0u8);
        let post = || trace.set(trace.get() * 10 + 1);
        let commit = || trace.set(trace.get() * 10 + 2);
        let coils = [CoilDesc {
            address: 0,
            write: CoilWrite::Bit(&bits, 0),
            post_write: Some(&post),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            commit_coils_write: Some(&commit),
            ..Instance::default()
        };
        let _ = pdu(&mut inst, &[0x05, 0x00, 0x00, 0xFF, 0x00]);
        assert_eq!(trace.get(), 12);
    }

    #[test]
    fn write_coils_round_trip() {
        let bits = Cell::new(0u8);
        let coils: [CoilDesc<'_>; 4] = core::array::from_fn(|i| CoilDesc {
            address: i as u16,
            read: CoilRead::Bit(&bits, i as u8),
            write: CoilWrite::Bit(&bits, i as u8),
            ..CoilDesc::default()
        });
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x0F, 0x00, 0x00, 0x00, 0x04, 0x01, 0b1011]);
        assert_eq!(&res[..len], &[0x0F, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(bits.get(), 0b1011);

        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(&res[..len], &[0x01, 0x01, 0b1011]);
    }

    #[test]
    fn write_coils_validates_before_writing() {
        let bits = Cell::new(0u8);
        // Coil 1 is missing, so nothing may be written at all.
        let coils = [CoilDesc {
            address: 0,
            write: CoilWrite::Bit(&bits, 0),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x0F, 0x00, 0x00, 0x00, 0x02, 0x01, 0b11]);
        assert_eq!(&res[..len], &[0x8F, 0x02]);
        assert_eq!(bits.get(), 0);
    }

    #[test]
    fn write_coils_byte_count_mismatch() {
        let bits = Cell::new(0u8);
        let coils = [CoilDesc {
            address: 0,
            write: CoilWrite::Bit(&bits, 0),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x0F, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x00]);
        assert_eq!(&res[..len], &[0x8F, 0x03]);
    }
}
