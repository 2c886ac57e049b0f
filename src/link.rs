//! Link layer: locate, CRC-check and validate frames in an untrusted byte stream.
//!
//! ## Wire format
//!
//! ```text
//! +------+------+--------+---------+------+-----+-------+----------------------------+
//! | 0x05 | 0x64 | length | control | dest | src | CRC16 | blocks: <=16 data + CRC16  |
//! |  1   |  1   |   1    |    1    |  2   |  2  |   2   | ...                        |
//! +------+------+--------+---------+------+-----+-------+----------------------------+
//! ```
//!
//! `length` counts control, addresses and user data (5..=255). Addresses and
//! CRCs are little-endian.
//!
//! Framing ([`scan`], [`try_parse_frame`]) only decides frame *shape*; CRC
//! failures are reported as `corrupted` frames. A block CRC failure consumes
//! the whole frame. A header CRC failure consumes the header only up to the
//! next sync marker inside it, so a stray sync cannot hide the frame behind
//! it. Semantic checks live in [`validate_frame`].

use crate::crc;
use byteorder::{ByteOrder, LittleEndian};

pub const SYNC: [u8; 2] = [0x05, 0x64];
/// Sync, length, control, addresses and header CRC.
pub const HEADER_LEN: usize = 10;
/// User data bytes per CRC-protected block.
pub const BLOCK_LEN: usize = 16;
pub const MIN_LENGTH: u8 = 5;
pub const MAX_USER_DATA: usize = 250;
/// Lowest broadcast destination address.
pub const BROADCAST_MIN: u16 = 0xFFFD;
/// Highest source address not reserved by the standard.
pub const MAX_SOURCE: u16 = 0xFFEF;

/// Control octet bits.
pub mod control {
    pub const DIR: u8 = 0x80;
    pub const PRM: u8 = 0x40;
    /// FCB on primary frames, reserved on secondary frames.
    pub const FCB: u8 = 0x20;
    /// FCV on primary frames, DFC on secondary frames.
    pub const FCV: u8 = 0x10;
    pub const DFC: u8 = 0x10;
    pub const FUNC_MASK: u8 = 0x0F;
}

/// Link function codes. Primary and secondary codes overlap numerically; the
/// PRM bit selects the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkFunction {
    ResetLinkStates,
    TestLinkStates,
    ConfirmedUserData,
    UnconfirmedUserData,
    RequestLinkStatus,
    Ack,
    Nack,
    LinkStatus,
    NotSupported,
}

impl LinkFunction {
    pub fn from_code(prm: bool, code: u8) -> Option<Self> {
        use LinkFunction::*;
        match (prm, code) {
            (true, 0) => Some(ResetLinkStates),
            (true, 2) => Some(TestLinkStates),
            (true, 3) => Some(ConfirmedUserData),
            (true, 4) => Some(UnconfirmedUserData),
            (true, 9) => Some(RequestLinkStatus),
            (false, 0) => Some(Ack),
            (false, 1) => Some(Nack),
            (false, 11) => Some(LinkStatus),
            (false, 15) => Some(NotSupported),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        use LinkFunction::*;
        match self {
            ResetLinkStates => 0,
            TestLinkStates => 2,
            ConfirmedUserData => 3,
            UnconfirmedUserData => 4,
            RequestLinkStatus => 9,
            Ack => 0,
            Nack => 1,
            LinkStatus => 11,
            NotSupported => 15,
        }
    }

    pub fn is_primary(self) -> bool {
        use LinkFunction::*;
        matches!(
            self,
            ResetLinkStates | TestLinkStates | ConfirmedUserData | UnconfirmedUserData | RequestLinkStatus
        )
    }

    pub fn is_user_data(self) -> bool {
        matches!(self, LinkFunction::ConfirmedUserData | LinkFunction::UnconfirmedUserData)
    }

    /// Primary codes that take part in frame-count sequencing.
    fn requires_fcv(self) -> bool {
        matches!(self, LinkFunction::TestLinkStates | LinkFunction::ConfirmedUserData)
    }

    pub fn name(self) -> &'static str {
        use LinkFunction::*;
        match self {
            ResetLinkStates => "RESET_LINK_STATES",
            TestLinkStates => "TEST_LINK_STATES",
            ConfirmedUserData => "CONFIRMED_USER_DATA",
            UnconfirmedUserData => "UNCONFIRMED_USER_DATA",
            RequestLinkStatus => "REQUEST_LINK_STATUS",
            Ack => "ACK",
            Nack => "NACK",
            LinkStatus => "LINK_STATUS",
            NotSupported => "NOT_SUPPORTED",
        }
    }
}

/// One link frame as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub length: u8,
    pub control: u8,
    pub destination: u16,
    pub source: u16,
    /// User data with block CRCs stripped; `None` for empty or corrupted frames.
    pub payload: Option<Vec<u8>>,
    /// A header or block CRC did not match.
    pub corrupted: bool,
}

impl Frame {
    pub fn dir(&self) -> bool {
        self.control & control::DIR != 0
    }

    pub fn prm(&self) -> bool {
        self.control & control::PRM != 0
    }

    pub fn fcb(&self) -> bool {
        self.prm() && self.control & control::FCB != 0
    }

    pub fn fcv(&self) -> bool {
        self.prm() && self.control & control::FCV != 0
    }

    pub fn dfc(&self) -> bool {
        !self.prm() && self.control & control::DFC != 0
    }

    pub fn function_code(&self) -> u8 {
        self.control & control::FUNC_MASK
    }

    pub fn function(&self) -> Option<LinkFunction> {
        LinkFunction::from_code(self.prm(), self.function_code())
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination >= BROADCAST_MIN
    }

    /// True for CRC-clean, semantically valid user-data frames.
    pub fn carries_user_data(&self) -> bool {
        validate_frame(self) && self.function().map(LinkFunction::is_user_data).unwrap_or(false)
    }
}

/// Outcome of scanning a buffer for the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// A frame shape was recognised. `consumed` counts from the start of the
    /// buffer and includes the `skipped` noise bytes in front of the frame.
    Frame { frame: Frame, skipped: usize, consumed: usize },
    /// Not enough bytes to decide. The first `skipped` bytes can never start
    /// a frame and may be discarded.
    Incomplete { skipped: usize },
}

/// Number of wire bytes occupied by `n` bytes of user data (data + block CRCs).
pub fn blocks_len(n: usize) -> usize {
    n + 2 * ((n + BLOCK_LEN - 1) / BLOCK_LEN)
}

/// Scan `buf` for the next frame, skipping noise one byte at a time.
pub fn scan(buf: &[u8]) -> Scan {
    let mut start = 0;
    loop {
        let rest = &buf[start..];
        if rest.len() < 2 {
            // A trailing 0x05 may be the first half of a sync.
            let keep = usize::from(rest.first() == Some(&SYNC[0]));
            return Scan::Incomplete { skipped: buf.len() - keep };
        }
        if rest[..2] != SYNC {
            start += 1;
            continue;
        }
        if rest.len() < HEADER_LEN {
            return Scan::Incomplete { skipped: start };
        }
        let length = rest[2];
        if length < MIN_LENGTH {
            start += 1;
            continue;
        }

        let mut frame = Frame {
            length,
            control: rest[3],
            destination: LittleEndian::read_u16(&rest[4..6]),
            source: LittleEndian::read_u16(&rest[6..8]),
            payload: None,
            corrupted: false,
        };

        // A bad header CRC makes the length untrustworthy. Report the header
        // as corrupted but resume at the next sync it contains, if any.
        if !crc::check(&rest[..8], [rest[8], rest[9]]) {
            frame.corrupted = true;
            return Scan::Frame { frame, skipped: start, consumed: start + resync_offset(rest) };
        }

        let data_len = (length - MIN_LENGTH) as usize;
        let total = HEADER_LEN + blocks_len(data_len);
        if rest.len() < total {
            return Scan::Incomplete { skipped: start };
        }
        if data_len > 0 {
            match unblock(&rest[HEADER_LEN..total], data_len) {
                Some(data) => frame.payload = Some(data),
                None => frame.corrupted = true,
            }
        }
        return Scan::Frame { frame, skipped: start, consumed: start + total };
    }
}

/// Offset of the next possible sync inside a rejected header, or the header
/// length if there is none. `rest` holds at least a full header.
fn resync_offset(rest: &[u8]) -> usize {
    (1..HEADER_LEN)
        .find(|&i| rest[i] == SYNC[0] && rest.get(i + 1).map_or(true, |&b| b == SYNC[1]))
        .unwrap_or(HEADER_LEN)
}

/// Parse one frame from `buf`. Returns the frame and the number of bytes
/// consumed (leading noise included), or `None` when more input is needed.
pub fn try_parse_frame(buf: &[u8]) -> Option<(Frame, usize)> {
    match scan(buf) {
        Scan::Frame { frame, consumed, .. } => Some((frame, consumed)),
        Scan::Incomplete { .. } => None,
    }
}

/// Strip and check the per-block CRCs; `None` if any block fails.
fn unblock(blocks: &[u8], data_len: usize) -> Option<Vec<u8>> {
    let mut data = Vec::with_capacity(data_len);
    for chunk in blocks.chunks(BLOCK_LEN + 2) {
        let (body, stored) = chunk.split_at(chunk.len() - 2);
        if !crc::check(body, [stored[0], stored[1]]) {
            return None;
        }
        data.extend_from_slice(body);
    }
    Some(data)
}

/// Semantic checks independent of framing: recognised function for the
/// role, FCV/reserved bits, address ranges and payload presence.
pub fn validate_frame(frame: &Frame) -> bool {
    if frame.corrupted {
        return false;
    }
    let func = match frame.function() {
        Some(f) => f,
        None => return false,
    };
    if frame.prm() {
        if frame.fcv() != func.requires_fcv() {
            return false;
        }
    } else if frame.control & control::FCB != 0 {
        return false;
    }
    if frame.source > MAX_SOURCE {
        return false;
    }
    if frame.is_broadcast() && func != LinkFunction::UnconfirmedUserData {
        return false;
    }
    let has_payload = frame.payload.as_ref().map(|p| !p.is_empty()).unwrap_or(false);
    has_payload == func.is_user_data()
}

/// Assemble a control octet.
pub fn control_byte(dir: bool, prm: bool, fcb: bool, fcv_dfc: bool, code: u8) -> u8 {
    let mut c = code & control::FUNC_MASK;
    if dir {
        c |= control::DIR;
    }
    if prm {
        c |= control::PRM;
    }
    if fcb {
        c |= control::FCB;
    }
    if fcv_dfc {
        c |= control::FCV;
    }
    c
}

/// Encode a frame with correct header and block CRCs. `None` if the payload
/// exceeds [`MAX_USER_DATA`].
pub fn encode_frame(control: u8, destination: u16, source: u16, payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() > MAX_USER_DATA {
        return None;
    }
    let mut out = Vec::with_capacity(HEADER_LEN + blocks_len(payload.len()));
    out.extend_from_slice(&SYNC);
    out.push(MIN_LENGTH + payload.len() as u8);
    out.push(control);
    let mut addr = [0u8; 4];
    LittleEndian::write_u16(&mut addr[..2], destination);
    LittleEndian::write_u16(&mut addr[2..], source);
    out.extend_from_slice(&addr);
    let header_crc = crc::crc16(&out);
    out.extend_from_slice(&header_crc.to_le_bytes());
    for block in payload.chunks(BLOCK_LEN) {
        out.extend_from_slice(block);
        out.extend_from_slice(&crc::crc16(block).to_le_bytes());
    }
    Some(out)
}
