// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII

use super::{BROADCAST_ADDR, is_addressed_to};
use crate::frame::PDU_SIZE_MAX;
use crate::instance::{Instance, event};
use crate::pdu;

/// Start of every ASCII frame.
pub const START_CHAR: u8 = b':';

/// Address, function code and LRC as hex pairs, plus framing.
pub const ADU_SIZE_MIN: usize = 1 + 3 * 2 + 2;

/// `':'` + hex pairs for address, maximum PDU and LRC + CR + delimiter.
pub const ADU_SIZE_MAX: usize = 1 + (1 + PDU_SIZE_MAX + 1) * 2 + 2;

/// Binary content of a maximum frame: address + PDU + LRC.
const BIN_SIZE_MAX: usize = 1 + PDU_SIZE_MAX + 1;

/// Calculate the LRC (Longitudinal Redundancy Check) sum: the two's
/// complement of the byte sum, truncated to eight bits.
#[must_use]
pub fn lrc(data: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for x in data {
        sum = sum.wrapping_add(*x);
    }
    sum.wrapping_neg()
}

const fn from_hex(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn push_hex(res: &mut [u8], pos: usize, value: u8) {
    res[pos] = HEX_DIGITS[usize::from(value >> 4)];
    res[pos + 1] = HEX_DIGITS[usize::from(value & 0x0F)];
}

/// Hex-encode the binary response with framing into `res`.
fn prep_res(inst: &Instance<'_>, bin_res: &[u8], res: &mut [u8]) -> usize {
    let mut size = 0;
    res[size] = START_CHAR;
    size += 1;
    for byte in bin_res {
        push_hex(res, size, *byte);
        size += 2;
    }
    push_hex(res, size, lrc(bin_res));
    size += 2;
    res[size] = b'\r';
    // A delimiter change within this very request is already in effect.
    res[size + 1] = inst.state.ascii_delimiter;
    size + 2
}

/// Handle one received ASCII frame and encode the response frame.
///
/// `res` must hold at least [`ADU_SIZE_MAX`] bytes. Returns the number
/// of response bytes; `0` means nothing is sent.
pub fn handle_req(inst: &mut Instance<'_>, req: &[u8], res: &mut [u8]) -> usize {
    if req.len() < ADU_SIZE_MIN || req.len() > ADU_SIZE_MAX || res.len() < ADU_SIZE_MAX {
        return 0;
    }

    // ':' start, CR plus the configured delimiter at the end, an even
    // number of hex digits in between.
    if req[0] != START_CHAR {
        return 0;
    }
    if req[req.len() - 2] != b'\r' || req[req.len() - 1] != inst.state.ascii_delimiter {
        return 0;
    }
    if (req.len() - 1) % 2 != 0 {
        return 0;
    }

    let mut req_bin = [0u8; BIN_SIZE_MAX];
    let req_bin_len = (req.len() - 3) / 2;
    for i in 0..req_bin_len {
        let (Some(hi), Some(lo)) = (from_hex(req[1 + i * 2]), from_hex(req[2 + i * 2]))
        else {
            return 0;
        };
        req_bin[i] = (hi << 4) | lo;
    }
    let req_bin = &req_bin[..req_bin_len];

    let slave = req_bin[0];
    let broadcast = slave == BROADCAST_ADDR;

    // LRC comes before the address filter so bus-wide health is
    // recorded even when the frame is for somebody else.
    let recv_lrc = req_bin[req_bin_len - 1];
    if recv_lrc != lrc(&req_bin[..req_bin_len - 1]) {
        #[cfg(feature = "log")]
        log::warn!("Invalid LRC in frame for slave {slave}");
        inst.state.bus_comm_err_counter = inst.state.bus_comm_err_counter.wrapping_add(1);
        let mut ev = event::IS_RECV | event::RECV_COMM_ERR;
        if inst.state.is_listen_only {
            ev |= event::RECV_LISTEN_MODE;
        }
        if broadcast {
            ev |= event::RECV_BROADCAST;
        }
        inst.add_comm_event(ev);
        return 0;
    }

    if !is_addressed_to(inst, slave) {
        return 0;
    }

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

    let mut res_bin = [0u8; 1 + PDU_SIZE_MAX];
    res_bin[0] = slave;
    let pdu_len = pdu::handle_req(inst, &req_bin[1..req_bin_len - 1], &mut res_bin[1..]);

    // Requests sent to the broadcast address never get a response.
    if pdu_len == 0 || broadcast {
        inst.state.no_resp_counter = inst.state.no_resp_counter.wrapping_add(1);
        return 0;
    }

    prep_res(inst, &res_bin[..1 + pdu_len], res)
}
