// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU dispatcher
//!
//! Routes a request PDU to its function handler and frames the result,
//! driving the diagnostic counters and the communication event log along
//! the way. The ADU layers call [`handle_req`] after stripping their
//! transport framing.

mod coils;
mod diag;
mod files;
mod regs;
mod serial;

use byteorder::{BigEndian, ByteOrder};

use crate::exception::{ERR_FLAG, Exception};
use crate::frame::{FunctionCode, PDU_SIZE_MAX, diag as subfn};
use crate::instance::{Instance, event};

/// Response PDU under construction.
///
/// A thin cursor over the caller's buffer; handlers append body bytes
/// behind the pre-placed function code. All writes stay within the
/// buffer handed to [`handle_req`].
#[derive(Debug)]
pub struct PduBuf<'b> {
    buf: &'b mut [u8],
    len: usize,
}

impl<'b> PduBuf<'b> {
    pub(crate) fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes written so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn push(&mut self, byte: u8) {
        self.buf[self.len] = byte;
        self.len += 1;
    }

    pub fn push_u16(&mut self, word: u16) {
        BigEndian::write_u16(&mut self.buf[self.len..], word);
        self.len += 2;
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
    }

    /// Overwrite a single byte, independent of the current length.
    pub(crate) fn set(&mut self, ix: usize, byte: u8) {
        self.buf[ix] = byte;
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    /// Hand out the next `n` bytes and advance the cursor over them.
    pub(crate) fn reserve(&mut self, n: usize) -> &mut [u8] {
        let start = self.len;
        self.len += n;
        &mut self.buf[start..self.len]
    }
}

/// Route the request to its handler.
///
/// `None` means the function code has no built-in route for this
/// instance and falls through to `handle_fn` / `ILLEGAL FUNCTION`.
fn route(
    inst: &mut Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Option<Result<(), Exception>> {
    use FunctionCode as F;

    match FunctionCode::new(req[0]) {
        F::ReadCoils if !inst.coils.is_empty() => {
            Some(coils::read_coils(inst.coils, req, res))
        }
        F::ReadDiscreteInputs if !inst.discrete_inputs.is_empty() => {
            Some(coils::read_coils(inst.discrete_inputs, req, res))
        }
        F::ReadHoldingRegisters if !inst.holding_regs.is_empty() => {
            Some(regs::read_regs(inst.holding_regs, req, res))
        }
        F::ReadInputRegisters if !inst.input_regs.is_empty() => {
            Some(regs::read_regs(inst.input_regs, req, res))
        }
        F::WriteSingleCoil if !inst.coils.is_empty() => {
            Some(coils::write_coil(inst, req, res))
        }
        F::WriteSingleRegister if !inst.holding_regs.is_empty() => {
            Some(regs::write_reg(inst, req, res))
        }
        F::ReadExceptionStatus if inst.serial.read_exception_status.is_some() => {
            Some(serial::read_exception_status(inst, req, res))
        }
        F::Diagnostics => Some(diag::diagnostics(inst, req, res)),
        F::GetCommEventCounter => Some(diag::comm_event_counter(inst, req, res)),
        F::GetCommEventLog => Some(diag::comm_event_log(inst, req, res)),
        F::WriteMultipleCoils if !inst.coils.is_empty() => {
            Some(coils::write_coils(inst, req, res))
        }
        F::WriteMultipleRegisters if !inst.holding_regs.is_empty() => {
            Some(regs::write_regs(inst, req, res))
        }
        F::ReportServerId if inst.serial.report_slave_id.is_some() => {
            Some(serial::report_server_id(inst, req, res))
        }
        F::ReadFileRecord if !inst.files.is_empty() => {
            Some(files::read_file_record(inst, req, res))
        }
        F::WriteFileRecord if !inst.files.is_empty() => {
            Some(files::write_file_record(inst, req, res))
        }
        F::MaskWriteRegister if !inst.holding_regs.is_empty() => {
            Some(regs::mask_write_reg(inst, req, res))
        }
        F::ReadWriteMultipleRegisters if !inst.holding_regs.is_empty() => {
            Some(regs::read_write_regs(inst, req, res))
        }
        _ => None,
    }
}

/// Whether the request is the Restart Communications diagnostic, the
/// only function served while in listen-only mode.
fn is_restart_comms(req: &[u8]) -> bool {
    req.len() >= 3
        && req[0] == FunctionCode::Diagnostics.value()
        && BigEndian::read_u16(&req[1..3]) == subfn::RESTART_COMMS
}

/// Handle a request PDU and encode the response PDU into `res`.
///
/// `res` must hold at least [`PDU_SIZE_MAX`] bytes. Returns the number
/// of response bytes, `0` meaning no response is to be sent (listen-only
/// mode, or a degenerate request).
pub fn handle_req(inst: &mut Instance<'_>, req: &[u8], res: &mut [u8]) -> usize {
    if req.is_empty() || req.len() > PDU_SIZE_MAX || res.len() < PDU_SIZE_MAX {
        return 0;
    }

    let mut send_event = event::IS_SEND;

    // In listen-only mode nothing is handled except Restart Comms.
    if inst.state.is_listen_only && !is_restart_comms(req) {
        inst.add_comm_event(send_event | event::SEND_LISTEN_ONLY);
        return 0;
    }

    // Count of messages addressed to this device; not incremented while
    // listening only.
    inst.state.msg_counter = inst.state.msg_counter.wrapping_add(1);

    let was_listen_only = inst.state.is_listen_only;

    let mut out = PduBuf::new(res);
    out.push(req[0]);

    let status = match route(inst, req, &mut out) {
        Some(status) => status,
        None => match inst.handle_fn {
            Some(handle_fn) => handle_fn(req, &mut out),
            None => Err(Exception::IllegalFunction),
        },
    };

    if let Err(exception) = status {
        out.set(0, req[0] | ERR_FLAG);
        out.set(1, exception as u8);
        out.set_len(2);

        send_event |= match exception {
            Exception::IllegalFunction
            | Exception::IllegalDataAddress
            | Exception::IllegalDataValue => event::SEND_READ_EX,
            Exception::ServerDeviceFailure => event::SEND_ABORT_EX,
            Exception::Acknowledge | Exception::ServerDeviceBusy => event::SEND_BUSY_EX,
            Exception::NegativeAcknowledge => event::SEND_NAK_EX,
            Exception::MemoryParityError => 0,
        };
    }

    // Listen-only takes effect after the response would have been sent;
    // the event reports the state from before the request.
    if was_listen_only {
        send_event |= event::SEND_LISTEN_ONLY;
    }
    let res_len = out.len();
    inst.add_comm_event(send_event);

    let fc = req[0];
    let state = &mut inst.state;
    if status.is_ok()
        && fc != FunctionCode::Diagnostics.value()
        && fc != FunctionCode::GetCommEventCounter.value()
        && fc != FunctionCode::GetCommEventLog.value()
    {
        state.comm_event_counter = state.comm_event_counter.wrapping_add(1);
    }
    if status.is_err() {
        state.exception_counter = state.exception_counter.wrapping_add(1);
    }
    if status == Err(Exception::NegativeAcknowledge) {
        state.nak_counter = state.nak_counter.wrapping_add(1);
    }
    if status == Err(Exception::ServerDeviceBusy) {
        state.busy_counter = state.busy_counter.wrapping_add(1);
    }

    // No response while the device is, or just was, listening only.
    if state.is_listen_only || was_listen_only {
        0
    } else {
        res_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{CoilDesc, CoilRead, RegDesc, RegRead};
    use crate::wire::Value;

    fn pdu(inst: &mut Instance<'_>, req: &[u8]) -> (usize, [u8; PDU_SIZE_MAX]) {
        let mut res = [0u8; PDU_SIZE_MAX];
        let len = handle_req(inst, req, &mut res);
        (len, res)
    }

    #[test]
    fn empty_request_produces_nothing() {
        let mut inst = Instance::default();
        let (len, _) = pdu(&mut inst, &[]);
        assert_eq!(len, 0);
        assert_eq!(inst.state.msg_counter, 0);
    }

    #[test]
    fn undersized_response_buffer_is_rejected() {
        let mut inst = Instance::default();
        let mut res = [0u8; 16];
        assert_eq!(handle_req(&mut inst, &[0x03, 0, 0, 0, 1], &mut res), 0);
    }

    #[test]
    fn read_single_holding_register() {
        let regs = [RegDesc {
            address: 0x0001,
            read: RegRead::Value(Value::U16(0xBEEF)),
            ..RegDesc::default()
        }];
        let mut inst = Instance {
            holding_regs: &regs,
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x03, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x03, 0x02, 0xBE, 0xEF]);
    }

    #[test]
    fn illegal_function_without_fallback() {
        let mut inst = Instance::default();
        let (len, res) = pdu(&mut inst, &[0x63, 0x00, 0x00]);
        assert_eq!(&res[..len], &[0xE3, 0x01]);
        assert_eq!(inst.state.exception_counter, 1);
    }

    #[test]
    fn unrouted_function_goes_to_the_fallback() {
        let handle = |req: &[u8], res: &mut PduBuf<'_>| {
            assert_eq!(req[0], 0x41);
            res.push(0x55);
            Ok(())
        };
        let mut inst = Instance {
            handle_fn: Some(&handle),
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x41, 0x01]);
        assert_eq!(&res[..len], &[0x41, 0x55]);
    }

    #[test]
    fn bank_less_read_falls_through_to_illegal_function() {
        let mut inst = Instance::default();
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x81, 0x01]);
    }

    #[test]
    fn exception_length_is_always_two() {
        let regs = [RegDesc {
            address: 0,
            read: RegRead::Value(Value::U16(1)),
            ..RegDesc::default()
        }];
        let mut inst = Instance {
            holding_regs: &regs,
            ..Instance::default()
        };
        // Quantity out of range
        let (len, res) = pdu(&mut inst, &[0x03, 0x00, 0x00, 0x00, 0x80]);
        assert_eq!(len, 2);
        assert_eq!(&res[..2], &[0x83, 0x03]);
    }

    #[test]
    fn comm_event_counter_policy() {
        let coils = [CoilDesc {
            address: 0,
            read: CoilRead::Value(true),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };
        // A successful data access bumps the counter.
        let (_, _) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(inst.state.comm_event_counter, 1);
        // Diagnostics and the event counter/log fetches do not.
        let (_, _) = pdu(&mut inst, &[0x08, 0x00, 0x00, 0x12, 0x34]);
        let (_, _) = pdu(&mut inst, &[0x0B]);
        let (_, _) = pdu(&mut inst, &[0x0C]);
        assert_eq!(inst.state.comm_event_counter, 1);
        assert_eq!(inst.state.msg_counter, 4);
    }

    #[test]
    fn listen_only_suppresses_everything_but_restart() {
        let coils = [CoilDesc {
            address: 0,
            read: CoilRead::Value(true),
            ..CoilDesc::default()
        }];
        let mut inst = Instance {
            coils: &coils,
            ..Instance::default()
        };

        // Force listen-only mode: no response.
        let (len, _) = pdu(&mut inst, &[0x08, 0x00, 0x04, 0x00, 0x00]);
        assert_eq!(len, 0);
        assert!(inst.state.is_listen_only);
        let msgs = inst.state.msg_counter;

        // Ordinary request: still nothing, and not even counted.
        let (len, _) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(len, 0);
        assert_eq!(inst.state.msg_counter, msgs);

        // Restart Communications gets through and clears the mode.
        let (len, res) = pdu(&mut inst, &[0x08, 0x00, 0x01, 0x00, 0x00]);
        assert!(!inst.state.is_listen_only);
        // The restart response itself is still suppressed because the
        // device was listening when the request arrived.
        assert_eq!(len, 0);
        let _ = res;

        // Back to normal operation afterwards.
        let (len, res) = pdu(&mut inst, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&res[..len], &[0x01, 0x01, 0x01]);
    }

    #[test]
    fn nak_and_busy_counters() {
        let handle = |_req: &[u8], _res: &mut PduBuf<'_>| Err(Exception::NegativeAcknowledge);
        let mut inst = Instance {
            handle_fn: Some(&handle),
            ..Instance::default()
        };
        let (len, res) = pdu(&mut inst, &[0x41]);
        assert_eq!(&res[..len], &[0xC1, 0x07]);
        assert_eq!(inst.state.nak_counter, 1);
        assert_eq!(inst.state.exception_counter, 1);

        let handle = |_req: &[u8], _res: &mut PduBuf<'_>| Err(Exception::ServerDeviceBusy);
        let mut inst = Instance {
            handle_fn: Some(&handle),
            ..Instance::default()
        };
        let _ = pdu(&mut inst, &[0x41]);
        assert_eq!(inst.state.busy_counter, 1);
    }

    #[test]
    fn send_events_are_logged() {
        let mut inst = Instance::default();
        let _ = pdu(&mut inst, &[0x63, 0x00, 0x00]);
        let newest = inst.state.event_log.newest_first().next().unwrap();
        assert_eq!(newest, event::IS_SEND | event::SEND_READ_EX);
    }
}
