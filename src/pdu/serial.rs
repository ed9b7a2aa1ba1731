// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial-only auxiliary functions (FC 0x07, 0x11).

use super::PduBuf;
use crate::exception::Exception;
use crate::frame::PDU_SIZE_MAX;
use crate::instance::Instance;

/// FC `0x07`: read the exception status byte from the host hook.
pub(crate) fn read_exception_status(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 1 {
        return Err(Exception::IllegalDataValue);
    }
    let Some(read) = inst.serial.read_exception_status else {
        return Err(Exception::IllegalFunction);
    };
    res.push(read());
    Ok(())
}

/// FC `0x11`: report the server ID payload provided by the host.
pub(crate) fn report_server_id(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 1 {
        return Err(Exception::IllegalDataValue);
    }
    let Some(provide) = inst.serial.report_slave_id else {
        return Err(Exception::IllegalFunction);
    };
    // [fc][byte count][server id..][run indicator..]
    let mut payload = [0u8; PDU_SIZE_MAX - 2];
    let n = provide(&mut payload).min(payload.len());
    res.push(n as u8);
    res.extend_from_slice(&payload[..n]);
    Ok(())
}
