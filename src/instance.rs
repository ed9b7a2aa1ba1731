// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::desc::{CoilDesc, FileDesc, RegDesc};
use crate::exception::Exception;
use crate::frame::SlaveId;
use crate::pdu::PduBuf;

/// Capacity of the communication event log ring buffer.
pub const COMM_EVENT_LOG_LEN: usize = 64;

/// Communication event log byte encoding.
pub mod event {
    /// Set when the byte is a receive event.
    pub const IS_RECV: u8 = 1 << 7;

    // Receive event detail bits (IS_RECV set):
    /// Communication error
    pub const RECV_COMM_ERR: u8 = 1 << 1;
    /// Character overrun
    pub const RECV_CHAR_OVERRUN: u8 = 1 << 4;
    /// Currently in listen-only mode
    pub const RECV_LISTEN_MODE: u8 = 1 << 5;
    /// Broadcast received
    pub const RECV_BROADCAST: u8 = 1 << 6;

    // Send event detail bits (IS_SEND set, IS_RECV clear):
    /// Read exception sent (exception codes 1-3)
    pub const SEND_READ_EX: u8 = 1 << 0;
    /// Server abort exception sent (exception code 4)
    pub const SEND_ABORT_EX: u8 = 1 << 1;
    /// Server busy exception sent (exception codes 5-6)
    pub const SEND_BUSY_EX: u8 = 1 << 2;
    /// Server program NAK exception sent (exception code 7)
    pub const SEND_NAK_EX: u8 = 1 << 3;
    /// Write timeout error occurred
    pub const SEND_WRITE_TIMEOUT: u8 = 1 << 4;
    /// Currently in listen-only mode
    pub const SEND_LISTEN_ONLY: u8 = 1 << 5;
    /// Marks a send event; requires `IS_RECV` to be clear.
    pub const IS_SEND: u8 = 1 << 6;

    /// Communications restart
    pub const COMM_RESTART: u8 = 0x00;
    /// Entered listen-only mode
    pub const ENTERED_LISTEN_ONLY: u8 = 0x04;
}

/// Bounded ring buffer of communication events, newest wins.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: [u8; COMM_EVENT_LOG_LEN],
    write_pos: usize,
    count: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: [0; COMM_EVENT_LOG_LEN],
            write_pos: 0,
            count: 0,
        }
    }
}

impl EventLog {
    pub(crate) fn push(&mut self, event: u8) {
        self.events[self.write_pos] = event;
        self.write_pos = (self.write_pos + 1) % COMM_EVENT_LOG_LEN;
        self.count = (self.count + 1).min(COMM_EVENT_LOG_LEN);
    }

    pub(crate) fn clear(&mut self) {
        self.write_pos = 0;
        self.count = 0;
    }

    /// Number of events currently held, at most [`COMM_EVENT_LOG_LEN`].
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate the events newest-first, walking the ring backwards from
    /// the write position.
    pub fn newest_first(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.count).map(|i| {
            let ix = (self.write_pos + COMM_EVENT_LOG_LEN - 1 - i) % COMM_EVENT_LOG_LEN;
            self.events[ix]
        })
    }
}

/// Serial-line configuration and host hooks.
#[derive(Default)]
pub struct SerialConfig<'a> {
    /// Our slave address on the serial bus.
    pub slave_addr: SlaveId,
    /// Also answer requests sent to the default-response address (248).
    pub enable_def_resp: bool,
    /// Invoked by the Restart Communications diagnostic.
    pub request_restart: Option<&'a dyn Fn()>,
    /// Provides the diagnostic register contents.
    pub read_diagnostics: Option<&'a dyn Fn() -> u16>,
    /// Invoked when counters and the diagnostic register are cleared.
    pub reset_diagnostics: Option<&'a dyn Fn()>,
    /// Provides the exception status byte (FC `0x07`).
    pub read_exception_status: Option<&'a dyn Fn() -> u8>,
    /// Fills the Report Server ID payload (FC `0x11`) and returns its
    /// length.
    pub report_slave_id: Option<&'a dyn Fn(&mut [u8]) -> usize>,
}

/// Mutable per-instance runtime state.
///
/// All counters wrap modulo 2^16.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub bus_msg_counter: u16,
    pub bus_comm_err_counter: u16,
    pub exception_counter: u16,
    pub msg_counter: u16,
    pub no_resp_counter: u16,
    pub nak_counter: u16,
    pub busy_counter: u16,
    pub bus_char_overrun_counter: u16,
    pub comm_event_counter: u16,
    /// Status word reported by FC `0x0B`/`0x0C`.
    pub status: u16,
    pub is_listen_only: bool,
    /// Trailing frame delimiter for Modbus ASCII.
    pub ascii_delimiter: u8,
    pub event_log: EventLog,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            bus_msg_counter: 0,
            bus_comm_err_counter: 0,
            exception_counter: 0,
            msg_counter: 0,
            no_resp_counter: 0,
            nak_counter: 0,
            busy_counter: 0,
            bus_char_overrun_counter: 0,
            comm_event_counter: 0,
            status: 0,
            is_listen_only: false,
            ascii_delimiter: b'\n',
            event_log: EventLog::default(),
        }
    }
}

impl ServerState {
    /// Zero every diagnostic counter, including the comm event counter.
    pub(crate) fn reset_comm_counters(&mut self) {
        self.comm_event_counter = 0;
        self.bus_msg_counter = 0;
        self.bus_comm_err_counter = 0;
        self.exception_counter = 0;
        self.msg_counter = 0;
        self.no_resp_counter = 0;
        self.nak_counter = 0;
        self.busy_counter = 0;
        self.bus_char_overrun_counter = 0;
    }
}

/// Handler for function codes without a built-in implementation.
///
/// The callback receives the raw request PDU and the response buffer
/// with the echoed function code already in place. It must not re-enter
/// the dispatcher.
pub type HandleFnCb<'a> = &'a dyn Fn(&[u8], &mut PduBuf<'_>) -> Result<(), Exception>;

/// A Modbus server instance: the host's data map plus runtime state.
///
/// Descriptor banks are borrowed for the life of the instance and never
/// mutated by the engine; only [`ServerState`] changes while handling
/// requests. One request is processed to completion before the next, so
/// the engine carries no locks.
#[derive(Default)]
pub struct Instance<'a> {
    /// Coils (read/write bits), sorted ascending by address.
    pub coils: &'a [CoilDesc<'a>],
    /// Discrete inputs (read-only bits), sorted ascending by address.
    pub discrete_inputs: &'a [CoilDesc<'a>],
    /// Holding registers, sorted ascending by address.
    pub holding_regs: &'a [RegDesc<'a>],
    /// Input registers, sorted ascending by address.
    pub input_regs: &'a [RegDesc<'a>],
    /// File records, sorted ascending by file number.
    pub files: &'a [FileDesc<'a>],
    /// Serial-line configuration and hooks.
    pub serial: SerialConfig<'a>,
    /// Lift the standard record-number ceiling (0x270F) for file records.
    pub allow_ext_file_recs: bool,
    /// Fallback for unrecognized or unrouted function codes.
    pub handle_fn: Option<HandleFnCb<'a>>,
    /// Fired once after every successful coil write request.
    pub commit_coils_write: Option<&'a dyn Fn()>,
    /// Fired once after every successful register write request.
    pub commit_regs_write: Option<&'a dyn Fn()>,
    /// Runtime state; reset to defaults between deployments, not between
    /// requests.
    pub state: ServerState,
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("coils", &self.coils.len())
            .field("discrete_inputs", &self.discrete_inputs.len())
            .field("holding_regs", &self.holding_regs.len())
            .field("input_regs", &self.input_regs.len())
            .field("files", &self.files.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Instance<'_> {
    pub(crate) fn add_comm_event(&mut self, event: u8) {
        self.state.event_log.push(event);
    }
}
