// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

/// Flag OR-ed into the function code of an exception response.
pub const ERR_FLAG: u8 = 0x80;

/// A server (slave) exception.
///
/// These are the codes a Modbus server may place into the second byte of
/// an exception response. Handlers report them through
/// `Result<(), Exception>`; the PDU dispatcher is the only place that
/// turns one into response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

#[cfg(all(feature = "defmt", target_os = "none"))]
impl defmt::Format for Exception {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.get_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_codes_match_the_wire() {
        assert_eq!(Exception::IllegalFunction as u8, 0x01);
        assert_eq!(Exception::IllegalDataAddress as u8, 0x02);
        assert_eq!(Exception::IllegalDataValue as u8, 0x03);
        assert_eq!(Exception::ServerDeviceFailure as u8, 0x04);
        assert_eq!(Exception::Acknowledge as u8, 0x05);
        assert_eq!(Exception::ServerDeviceBusy as u8, 0x06);
        assert_eq!(Exception::NegativeAcknowledge as u8, 0x07);
        assert_eq!(Exception::MemoryParityError as u8, 0x08);
    }
}
