// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File record function handlers (FC 0x14, 0x15).

use byteorder::{BigEndian, ByteOrder};

use super::PduBuf;
use crate::desc::{FileReadError, find_file};
use crate::exception::Exception;
use crate::instance::Instance;

/// Function code (1 byte) + byte count (1 byte).
const REQ_HEADER_SIZE: usize = 2;

/// Reference type (1) + file number (2) + record number (2) + record
/// length (2).
const SUB_REQ_SIZE: usize = 7;

const REF_TYPE: u8 = 0x06;

/// Highest record number of the standard address space.
const REC_NO_MAX: u16 = 0x270F;

/// `(253 - 2) - ((253 - 2) % 7)`
const READ_BYTE_COUNT_MAX: usize = 0xF5;

/// Each read sub-response costs 2 header bytes plus its data.
const SUB_RESP_HEADER_SIZE: usize = 2;
const RESP_BYTE_COUNT_MAX: usize = 0xF5;

/// Byte-count bounds of a write request (one minimal sub-request up to
/// the PDU capacity).
const WRITE_BYTE_COUNT_MIN: usize = SUB_REQ_SIZE + 2;
const WRITE_BYTE_COUNT_MAX: usize = 0xFB;

struct SubReq {
    file_no: u16,
    record_no: u16,
    record_length: u16,
}

fn parse_sub_req(inst: &Instance<'_>, sub: &[u8]) -> Result<SubReq, Exception> {
    if sub[0] != REF_TYPE {
        return Err(Exception::IllegalDataValue);
    }
    let file_no = BigEndian::read_u16(&sub[1..3]);
    let record_no = BigEndian::read_u16(&sub[3..5]);
    let record_length = BigEndian::read_u16(&sub[5..7]);

    if file_no == 0 {
        // Valid range: (0x0000, 0xFFFF]
        return Err(Exception::IllegalDataValue);
    }
    if record_no > REC_NO_MAX && !inst.allow_ext_file_recs {
        return Err(Exception::IllegalDataAddress);
    }
    if record_length == 0 {
        return Err(Exception::IllegalDataValue);
    }
    Ok(SubReq {
        file_no,
        record_no,
        record_length,
    })
}

/// FC `0x14`: read one or more file records.
pub(crate) fn read_file_record(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < REQ_HEADER_SIZE + SUB_REQ_SIZE {
        return Err(Exception::IllegalDataValue);
    }
    let byte_count = usize::from(req[1]);
    if byte_count < SUB_REQ_SIZE
        || byte_count > READ_BYTE_COUNT_MAX
        || byte_count != req.len() - REQ_HEADER_SIZE
        || byte_count % SUB_REQ_SIZE != 0
    {
        return Err(Exception::IllegalDataValue);
    }

    let n_sub_reqs = byte_count / SUB_REQ_SIZE;

    // Validate every sub-request and the response budget before
    // producing any output.
    let mut resp_byte_count = 0usize;
    for i in 0..n_sub_reqs {
        let sub = &req[REQ_HEADER_SIZE + i * SUB_REQ_SIZE..];
        let sub = parse_sub_req(inst, &sub[..SUB_REQ_SIZE])?;
        resp_byte_count += SUB_RESP_HEADER_SIZE + usize::from(sub.record_length) * 2;
    }
    if resp_byte_count > RESP_BYTE_COUNT_MAX {
        return Err(Exception::IllegalDataValue);
    }

    res.push(resp_byte_count as u8);
    for i in 0..n_sub_reqs {
        let sub = &req[REQ_HEADER_SIZE + i * SUB_REQ_SIZE..];
        let sub = parse_sub_req(inst, &sub[..SUB_REQ_SIZE])?;

        let file =
            find_file(inst.files, sub.file_no).ok_or(Exception::IllegalDataAddress)?;

        res.push((1 + usize::from(sub.record_length) * 2) as u8);
        res.push(REF_TYPE);
        let out = res.reserve(usize::from(sub.record_length) * 2);
        match file.read_records(sub.record_no, sub.record_length, out) {
            Ok(()) => (),
            Err(FileReadError::IllegalAddress) => return Err(Exception::IllegalDataAddress),
            Err(FileReadError::DeviceFailure) => return Err(Exception::ServerDeviceFailure),
        }
    }

    Ok(())
}

/// FC `0x15`: write one or more file records.
///
/// The whole request is validated, including a `write_allowed` pre-pass
/// over every record, before the first write. A record failing *during*
/// the write phase still leaves earlier sub-requests committed; the
/// error is reported and the host must treat the write as partial.
pub(crate) fn write_file_record(
    inst: &Instance<'_>,
    req: &[u8],
    res: &mut PduBuf<'_>,
) -> Result<(), Exception> {
    if req.len() < REQ_HEADER_SIZE + WRITE_BYTE_COUNT_MIN {
        return Err(Exception::IllegalDataValue);
    }
    let byte_count = usize::from(req[1]);
    if byte_count < WRITE_BYTE_COUNT_MIN
        || byte_count > WRITE_BYTE_COUNT_MAX
        || byte_count != req.len() - REQ_HEADER_SIZE
    {
        return Err(Exception::IllegalDataValue);
    }

    // Validation pass over all sub-requests; no writes yet.
    let mut pos = REQ_HEADER_SIZE;
    while pos < req.len() {
        if req.len() - pos < SUB_REQ_SIZE {
            return Err(Exception::IllegalDataValue);
        }
        let sub = parse_sub_req(inst, &req[pos..pos + SUB_REQ_SIZE])?;
        let data_end = pos + SUB_REQ_SIZE + usize::from(sub.record_length) * 2;
        if data_end > req.len() {
            return Err(Exception::IllegalDataValue);
        }

        let file =
            find_file(inst.files, sub.file_no).ok_or(Exception::IllegalDataAddress)?;
        file.write_allowed(sub.record_no, sub.record_length)?;

        pos = data_end;
    }

    // Write pass.
    let mut pos = REQ_HEADER_SIZE;
    while pos < req.len() {
        let sub = parse_sub_req(inst, &req[pos..pos + SUB_REQ_SIZE])?;
        let data_end = pos + SUB_REQ_SIZE + usize::from(sub.record_length) * 2;

        let file =
            find_file(inst.files, sub.file_no).ok_or(Exception::ServerDeviceFailure)?;
        file.write_records(
            sub.record_no,
            sub.record_length,
            &req[pos + SUB_REQ_SIZE..data_end],
        )?;

        pos = data_end;
    }

    if let Some(commit) = inst.commit_regs_write {
        commit();
    }

    // Echo the request
    res.extend_from_slice(&req[1..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{CellRef, FileDesc, RegDesc, RegRead, RegWrite};
    use crate::frame::PDU_SIZE_MAX;
    use crate::pdu::handle_req;
    use crate::wire::Value;
    use core::cell::Cell;

    fn pdu(inst: &mut Instance<'_>, req: &[u8]) -> (usize, [u8; PDU_SIZE_MAX]) {
        let mut res = [0u8; PDU_SIZE_MAX];
        let len = handle_req(inst, req, &mut res);
        (len, res)
    }

    fn value_rec(address: u16, value: u16) -> RegDesc<'static> {
        RegDesc {
            address,
            read: RegRead::Value(Value::U16(value)),
            ..RegDesc::default()
        }
    }

    #[test]
    fn read_two_files() {
        let file1 = [value_rec(0x09, 0xDEAD), value_rec(0x0A, 0xBEEF)];
        let file2 = [value_rec(0x01, 0x1234), value_rec(0x02, 0xABCD)];
        let files = [
            FileDesc {
                file_no: 0x03,
                records: &file1,
            },
            FileDesc {
                file_no: 0x04,
                records: &file2,
            },
        ];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let (len, res) = pdu(
            &mut inst,
            &[
                0x14, 0x0E, //
                0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, //
                0x06, 0x00, 0x03, 0x00, 0x09, 0x00, 0x02,
            ],
        );
        assert_eq!(
            &res[..len],
            &[
                0x14, 0x0C, //
                0x05, 0x06, 0x12, 0x34, 0xAB, 0xCD, //
                0x05, 0x06, 0xDE, 0xAD, 0xBE, 0xEF,
            ]
        );
    }

    #[test]
    fn read_rejects_bad_ref_type() {
        let recs = [value_rec(1, 1)];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x07, 0x07, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01],
        );
        assert_eq!(&res[..len], &[0x94, 0x03]);
    }

    #[test]
    fn read_rejects_file_zero_and_unknown_file() {
        let recs = [value_rec(1, 1)];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x07, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01],
        );
        assert_eq!(&res[..len], &[0x94, 0x03]);
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x07, 0x06, 0x00, 0x09, 0x00, 0x01, 0x00, 0x01],
        );
        assert_eq!(&res[..len], &[0x94, 0x02]);
    }

    #[test]
    fn read_record_number_ceiling() {
        let recs = [value_rec(0x2710, 1)];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let req = &[0x14, 0x07, 0x06, 0x00, 0x01, 0x27, 0x10, 0x00, 0x01];
        let (len, res) = pdu(&mut inst, req);
        assert_eq!(&res[..len], &[0x94, 0x02]);

        // Extended file records lift the ceiling.
        inst.allow_ext_file_recs = true;
        let (len, res) = pdu(&mut inst, req);
        assert_eq!(&res[..len], &[0x14, 0x04, 0x03, 0x06, 0x00, 0x01]);
    }

    #[test]
    fn read_byte_count_must_match_and_divide() {
        let recs = [value_rec(1, 1)];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        // Byte count not a multiple of 7
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x08, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00],
        );
        assert_eq!(&res[..len], &[0x94, 0x03]);
        // Byte count disagrees with the request length
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x0E, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01],
        );
        assert_eq!(&res[..len], &[0x94, 0x03]);
    }

    #[test]
    fn read_missing_first_record_is_illegal_address() {
        let recs = [value_rec(5, 1)];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let (len, res) = pdu(
            &mut inst,
            &[0x14, 0x07, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x02],
        );
        assert_eq!(&res[..len], &[0x94, 0x02]);
    }

    #[test]
    fn write_single_record_echoes_request() {
        let a = Cell::new(0u16);
        let b = Cell::new(0u16);
        let recs = [
            RegDesc {
                address: 1,
                write: RegWrite::Cell(CellRef::U16(&a)),
                ..RegDesc::default()
            },
            RegDesc {
                address: 2,
                write: RegWrite::Cell(CellRef::U16(&b)),
                ..RegDesc::default()
            },
        ];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let req = &[
            0x15, 0x0B, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x12, 0x34, 0x56, 0x78,
        ];
        let (len, res) = pdu(&mut inst, req);
        assert_eq!(&res[..len], req);
        assert_eq!(a.get(), 0x1234);
        assert_eq!(b.get(), 0x5678);
    }

    #[test]
    fn write_validates_every_sub_request_first() {
        let a = Cell::new(0u16);
        let recs = [RegDesc {
            address: 1,
            write: RegWrite::Cell(CellRef::U16(&a)),
            ..RegDesc::default()
        }];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        // First sub-request is fine, second touches a missing record;
        // nothing may be written.
        let req = &[
            0x15, 0x12, //
            0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0xAB, 0xCD, //
            0x06, 0x00, 0x01, 0x00, 0x05, 0x00, 0x01, 0x11, 0x22,
        ];
        let (len, res) = pdu(&mut inst, req);
        assert_eq!(&res[..len], &[0x95, 0x02]);
        assert_eq!(a.get(), 0);
    }

    #[test]
    fn write_byte_count_mismatch() {
        let a = Cell::new(0u16);
        let recs = [RegDesc {
            address: 1,
            write: RegWrite::Cell(CellRef::U16(&a)),
            ..RegDesc::default()
        }];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            ..Instance::default()
        };
        let (len, res) = pdu(
            &mut inst,
            &[0x15, 0x0B, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x12, 0x34],
        );
        assert_eq!(&res[..len], &[0x95, 0x03]);
    }

    #[test]
    fn write_fires_commit_once() {
        let commits = Cell::new(0u8);
        let commit = || commits.set(commits.get() + 1);
        let a = Cell::new(0u16);
        let recs = [RegDesc {
            address: 1,
            write: RegWrite::Cell(CellRef::U16(&a)),
            ..RegDesc::default()
        }];
        let files = [FileDesc {
            file_no: 1,
            records: &recs,
        }];
        let mut inst = Instance {
            files: &files,
            commit_regs_write: Some(&commit),
            ..Instance::default()
        };
        let _ = pdu(
            &mut inst,
            &[0x15, 0x09, 0x06, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0xAB, 0xCD],
        );
        assert_eq!(commits.get(), 1);
        assert_eq!(a.get(), 0xABCD);
    }
}
