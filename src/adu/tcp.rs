// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP

use byteorder::{BigEndian, ByteOrder};

use crate::frame::PDU_SIZE_MAX;
use crate::instance::Instance;
use crate::pdu;

/// Transaction, protocol, length and unit identifier.
pub const MBAP_HEADER_SIZE: usize = 7;

// [MODBUS MESSAGING ON TCP/IP IMPLEMENTATION GUIDE V1.0b](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 5
// "the default Modbus port 502"
pub const TCP_PORT: u16 = 502;

/// MBAP header plus a maximum PDU.
pub const ADU_SIZE_MAX: usize = MBAP_HEADER_SIZE + PDU_SIZE_MAX;

/// Handle one received TCP ADU and encode the response ADU.
///
/// `res` must hold at least [`ADU_SIZE_MAX`] bytes. The transaction and
/// unit identifiers are echoed; unit 0 is not treated as a broadcast at
/// this layer and reaches the dispatcher unchanged. Returns the number
/// of response bytes, `0` meaning the frame was malformed or the
/// dispatcher suppressed the response.
pub fn handle_req(inst: &mut Instance<'_>, req: &[u8], res: &mut [u8]) -> usize {
    if req.len() < MBAP_HEADER_SIZE + 1 || req.len() > ADU_SIZE_MAX || res.len() < ADU_SIZE_MAX
    {
        return 0;
    }

    let transaction_id = BigEndian::read_u16(&req[0..2]);
    let protocol_id = BigEndian::read_u16(&req[2..4]);
    let length = usize::from(BigEndian::read_u16(&req[4..6]));
    let unit_id = req[6];

    if protocol_id != 0 {
        #[cfg(feature = "log")]
        log::warn!("Protocol not Modbus(0), received {protocol_id} instead");
        return 0;
    }
    // The length field covers the unit identifier and the PDU.
    if length != req.len() - 6 {
        #[cfg(feature = "log")]
        log::warn!(
            "Length mismatch: length field {length}, PDU length + 1: {}",
            req.len() - 6
        );
        return 0;
    }

    let pdu_len = pdu::handle_req(inst, &req[MBAP_HEADER_SIZE..], &mut res[MBAP_HEADER_SIZE..]);
    if pdu_len == 0 {
        return 0;
    }

    BigEndian::write_u16(&mut res[0..2], transaction_id);
    BigEndian::write_u16(&mut res[2..4], 0);
    BigEndian::write_u16(&mut res[4..6], (1 + pdu_len) as u16);
    res[6] = unit_id;
    MBAP_HEADER_SIZE + pdu_len
}
