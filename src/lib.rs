#![no_std]

pub mod adu;
mod desc;
mod exception;
mod frame;
mod instance;
mod pdu;
mod wire;

pub use desc::*;
pub use exception::*;
pub use frame::*;
pub use instance::*;
pub use pdu::{PduBuf, handle_req};
pub use wire::*;
