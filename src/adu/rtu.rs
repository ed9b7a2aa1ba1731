// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use byteorder::{BigEndian, ByteOrder};

use super::{BROADCAST_ADDR, is_addressed_to};
use crate::instance::{Instance, event};
use crate::pdu;

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const ADU_SIZE_MAX: usize = 256;

/// Address, function code and CRC.
pub const ADU_SIZE_MIN: usize = 4;

/// Calculate the CRC (Cyclic Redundancy Check) sum.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.rotate_right(8)
}

/// Handle one received RTU frame and encode the response frame.
///
/// `res` must hold at least [`ADU_SIZE_MAX`] bytes. Returns the number
/// of response bytes; `0` means nothing is sent (malformed frame, CRC
/// error, not addressed to us, broadcast, or a suppressed response).
pub fn handle_req(inst: &mut Instance<'_>, req: &[u8], res: &mut [u8]) -> usize {
    if req.len() < ADU_SIZE_MIN || req.len() > ADU_SIZE_MAX || res.len() < ADU_SIZE_MAX {
        return 0;
    }

    // Trailing CRC, transmitted low byte first.
    let expected_crc = BigEndian::read_u16(&req[req.len() - 2..]);
    let actual_crc = crc16(&req[..req.len() - 2]);
    if expected_crc != actual_crc {
        #[cfg(feature = "log")]
        log::warn!("Invalid CRC: expected = {expected_crc:#06X}, actual = {actual_crc:#06X}");
        inst.state.bus_comm_err_counter = inst.state.bus_comm_err_counter.wrapping_add(1);
        let mut ev = event::IS_RECV | event::RECV_COMM_ERR;
        if inst.state.is_listen_only {
            ev |= event::RECV_LISTEN_MODE;
        }
        inst.add_comm_event(ev);
        return 0;
    }

    let slave = req[0];
    if !is_addressed_to(inst, slave) {
        return 0;
    }
    let broadcast = slave == BROADCAST_ADDR;

    inst.state.bus_msg_counter = inst.state.bus_msg_counter.wrapping_add(1);

    if broadcast || inst.state.is_listen_only {
        let mut ev = event::IS_RECV;
        if broadcast {
            ev |= event::RECV_BROADCAST;
        }
        if inst.state.is_listen_only {
            ev |= event::RECV_LISTEN_MODE;
        }
        inst.add_comm_event(ev);
    }

    let pdu_len = pdu::handle_req(inst, &req[1..req.len() - 2], &mut res[1..]);

    // Requests sent to the broadcast address never get a response.
    if pdu_len == 0 || broadcast {
        inst.state.no_resp_counter = inst.state.no_resp_counter.wrapping_add(1);
        return 0;
    }

    res[0] = slave;
    let crc = crc16(&res[..1 + pdu_len]);
    BigEndian::write_u16(&mut res[1 + pdu_len..], crc);
    1 + pdu_len + 2
}
