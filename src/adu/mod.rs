// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application Data Unit layers
//!
//! Each transport strips its framing, filters by address where the
//! transport has addresses, hands the PDU to the dispatcher and frames
//! the response again. Frame errors never produce a response; they only
//! move counters and the event log.

#[cfg(feature = "ascii")]
pub mod ascii;
#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

/// Broadcast address on serial lines.
#[cfg(any(feature = "rtu", feature = "ascii"))]
pub const BROADCAST_ADDR: u8 = 0;

/// Default-response address, answered when
/// [`SerialConfig::enable_def_resp`](crate::SerialConfig::enable_def_resp)
/// is set.
#[cfg(any(feature = "rtu", feature = "ascii"))]
pub const DEFAULT_RESP_ADDR: u8 = 248;

#[cfg(any(feature = "rtu", feature = "ascii"))]
pub(crate) fn is_addressed_to(inst: &crate::Instance<'_>, slave: u8) -> bool {
    slave == inst.serial.slave_addr
        || slave == BROADCAST_ADDR
        || (inst.serial.enable_def_resp && slave == DEFAULT_RESP_ADDR)
}
