// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial-line diagnostics (FC 0x08, 0x0B, 0x0C).

use byteorder::{BigEndian, ByteOrder};

use super::PduBuf;
use crate::exception::Exception;
use crate::frame::diag as subfn;
use crate::instance::{Instance, event};

/// `0x00` Return Query Data: echo the request of any length.
fn loopback(req: &[u8], res: &mut PduBuf<'_>) -> Result<(), Exception> {
    res.set_len(1);
    res.extend_from_slice(&req[1..]);
    Ok(())
}

/// `0x01` Restart Communications Option.
fn restart_comms(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    let data = BigEndian::read_u16(&req[3..5]);
    if data != 0x0000 && data != 0xFF00 {
        return Err(Exception::IllegalDataValue);
    }

    if let Some(request_restart) = inst.serial.request_restart {
        request_restart();
    }
    inst.state.is_listen_only = false;
    inst.state.reset_comm_counters();

    if data == 0xFF00 {
        inst.state.event_log.clear();
    } else {
        inst.add_comm_event(event::COMM_RESTART);
    }

    res.push_u16(data);
    Ok(())
}

/// `0x02` Return Diagnostic Register.
fn read_diag_register(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    expect_zero_data(req)?;
    let value = inst.serial.read_diagnostics.map_or(0, |read| read());
    res.push_u16(value);
    Ok(())
}

/// `0x03` Change ASCII Input Delimiter.
fn change_ascii_delimiter(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    if req[3] > 127 || req[4] != 0 {
        return Err(Exception::IllegalDataValue);
    }

    inst.state.ascii_delimiter = req[3];

    res.push(req[3]);
    res.push(0);
    Ok(())
}

/// `0x04` Force Listen Only Mode. The response is suppressed by the
/// dispatcher once the mode is active.
fn force_listen_only(inst: &mut Instance<'_>, req: &[u8]) -> Result<(), Exception> {
    expect_zero_data(req)?;
    inst.state.is_listen_only = true;
    inst.add_comm_event(event::ENTERED_LISTEN_ONLY);
    Ok(())
}

/// `0x0A` Clear Counters and Diagnostic Register.
fn clear_counters(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    expect_zero_data(req)?;
    inst.state.reset_comm_counters();
    if let Some(reset_diagnostics) = inst.serial.reset_diagnostics {
        reset_diagnostics();
    }
    res.push_u16(0);
    Ok(())
}

/// `0x0B`..`0x12` Return one of the diagnostic counters.
fn read_counter(counter: u16, req: &[u8], res: &mut PduBuf<'_>) -> Result<(), Exception> {
    expect_zero_data(req)?;
    res.push_u16(counter);
    Ok(())
}

/// `0x14` Clear Overrun Counter and Flag.
fn clear_overrun(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    expect_zero_data(req)?;
    inst.state.bus_char_overrun_counter = 0;
    res.push_u16(0);
    Ok(())
}

/// Most sub-functions require a 5-byte request with a zero data word.
fn expect_zero_data(req: &[u8]) -> Result<(), Exception> {
    if req.len() != 5 {
        return Err(Exception::IllegalDataValue);
    }
    if BigEndian::read_u16(&req[3..5]) != 0 {
        return Err(Exception::IllegalDataValue);
    }
    Ok(())
}

/// FC `0x08`: dispatch on the diagnostics sub-function.
pub(crate) fn diagnostics(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < 3 {
        return Err(Exception::IllegalDataValue);
    }

    // Every response echoes the sub-function code.
    res.push(req[1]);
    res.push(req[2]);

    match BigEndian::read_u16(&req[1..3]) {
        subfn::LOOPBACK => loopback(req, res),
        subfn::RESTART_COMMS => restart_comms(inst, req, res),
        subfn::DIAG_REGISTER => read_diag_register(inst, req, res),
        subfn::ASCII_DELIMITER => change_ascii_delimiter(inst, req, res),
        subfn::FORCE_LISTEN_ONLY => force_listen_only(inst, req),
        subfn::CLEAR_COUNTERS => clear_counters(inst, req, res),
        subfn::BUS_MSG_COUNT => read_counter(inst.state.bus_msg_counter, req, res),
        subfn::BUS_COMM_ERR_COUNT => read_counter(inst.state.bus_comm_err_counter, req, res),
        subfn::BUS_EXCEPTION_COUNT => read_counter(inst.state.exception_counter, req, res),
        subfn::MSG_COUNT => read_counter(inst.state.msg_counter, req, res),
        subfn::NO_RESP_COUNT => read_counter(inst.state.no_resp_counter, req, res),
        subfn::NAK_COUNT => read_counter(inst.state.nak_counter, req, res),
        subfn::BUSY_COUNT => read_counter(inst.state.busy_counter, req, res),
        subfn::BUS_OVERRUN_COUNT => {
            read_counter(inst.state.bus_char_overrun_counter, req, res)
        }
        subfn::CLEAR_OVERRUN => clear_overrun(inst, req, res),
        _ => Err(Exception::IllegalFunction),
    }
}

/// FC `0x0B`: status word and comm event counter.
pub(crate) fn comm_event_counter(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 1 {
        return Err(Exception::IllegalDataValue);
    }
    res.push_u16(inst.state.status);
    res.push_u16(inst.state.comm_event_counter);
    Ok(())
}

/// FC `0x0C`: status, counters and the event log, newest event first.
pub(crate) fn comm_event_log(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() != 1 {
        return Err(Exception::IllegalDataValue);
    }
    res.push((6 + inst.state.event_log.len()) as u8);
    res.push_u16(inst.state.status);
    res.push_u16(inst.state.comm_event_counter);
    res.push_u16(inst.state.bus_msg_counter);
    for ev in inst.state.event_log.newest_first() {
        res.push(ev);
    }
    Ok(())
}
