// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

/// Maximum size of a PDU (function code plus data).
pub const PDU_SIZE_MAX: usize = 253;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Slave ID
pub type SlaveId = u8;

/// A Modbus sub-function code is represented by an unsigned 16 bit integer.
pub type SubFunctionCode = u16;

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `07` (`0x07`), serial only.
    ReadExceptionStatus,

    /// Modbus Function Code: `08` (`0x08`), serial only.
    Diagnostics,

    /// Modbus Function Code: `11` (`0x0B`), serial only.
    GetCommEventCounter,

    /// Modbus Function Code: `12` (`0x0C`), serial only.
    GetCommEventLog,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `17` (`0x11`), serial only.
    ReportServerId,

    /// Modbus Function Code: `20` (`0x14`).
    ReadFileRecord,

    /// Modbus Function Code: `21` (`0x15`).
    WriteFileRecord,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Modbus Function Code: `23` (`0x17`).
    ReadWriteMultipleRegisters,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x08 => Self::Diagnostics,
            0x0B => Self::GetCommEventCounter,
            0x0C => Self::GetCommEventLog,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportServerId,
            0x14 => Self::ReadFileRecord,
            0x15 => Self::WriteFileRecord,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            code => FunctionCode::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadExceptionStatus => 0x07,
            Self::Diagnostics => 0x08,
            Self::GetCommEventCounter => 0x0B,
            Self::GetCommEventLog => 0x0C,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportServerId => 0x11,
            Self::ReadFileRecord => 0x14,
            Self::WriteFileRecord => 0x15,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Diagnostics (FC `0x08`) sub-function codes.
pub mod diag {
    use super::SubFunctionCode;

    /// Return Query Data
    pub const LOOPBACK: SubFunctionCode = 0x00;
    /// Restart Communications Option
    pub const RESTART_COMMS: SubFunctionCode = 0x01;
    /// Return Diagnostic Register
    pub const DIAG_REGISTER: SubFunctionCode = 0x02;
    /// Change ASCII Input Delimiter
    pub const ASCII_DELIMITER: SubFunctionCode = 0x03;
    /// Force Listen Only Mode
    pub const FORCE_LISTEN_ONLY: SubFunctionCode = 0x04;
    // 0x05..=0x09 reserved
    /// Clear Counters and Diagnostic Register
    pub const CLEAR_COUNTERS: SubFunctionCode = 0x0A;
    /// Return Bus Message Count
    pub const BUS_MSG_COUNT: SubFunctionCode = 0x0B;
    /// Return Bus Communication Error Count
    pub const BUS_COMM_ERR_COUNT: SubFunctionCode = 0x0C;
    /// Return Bus Exception Error Count
    pub const BUS_EXCEPTION_COUNT: SubFunctionCode = 0x0D;
    /// Return Server Message Count
    pub const MSG_COUNT: SubFunctionCode = 0x0E;
    /// Return Server No Response Count
    pub const NO_RESP_COUNT: SubFunctionCode = 0x0F;
    /// Return Server NAK Count
    pub const NAK_COUNT: SubFunctionCode = 0x10;
    /// Return Server Busy Count
    pub const BUSY_COUNT: SubFunctionCode = 0x11;
    /// Return Bus Character Overrun Count
    pub const BUS_OVERRUN_COUNT: SubFunctionCode = 0x12;
    // 0x13 reserved
    /// Clear Overrun Counter and Flag
    pub const CLEAR_OVERRUN: SubFunctionCode = 0x14;
}
