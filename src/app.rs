//! Application layer: fragment header, function codes, internal indications
//! and the fragment parser.
//!
//! ```text
//! request:  | control | function |                  | object blocks ... |
//! response: | control | function | IIN1 | IIN2      | object blocks ... |
//! control:  FIR(7) FIN(6) CON(5) UNS(4) SEQ(3..0)
//! ```

use crate::catalogue::Catalogue;
use crate::error::{AppError, ErrorKind};
use crate::grammar::{self, FunctionGrammar, Reader};
use crate::object::{Object, ObjectBlock};
use std::io::Cursor;

/// Application control octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppControl {
    pub fir: bool,
    pub fin: bool,
    pub con: bool,
    pub uns: bool,
    pub seq: u8,
}

impl AppControl {
    pub const FIR: u8 = 0x80;
    pub const FIN: u8 = 0x40;
    pub const CON: u8 = 0x20;
    pub const UNS: u8 = 0x10;
    pub const SEQ_MASK: u8 = 0x0F;

    pub fn from_byte(b: u8) -> Self {
        AppControl {
            fir: b & Self::FIR != 0,
            fin: b & Self::FIN != 0,
            con: b & Self::CON != 0,
            uns: b & Self::UNS != 0,
            seq: b & Self::SEQ_MASK,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = self.seq & Self::SEQ_MASK;
        if self.fir {
            b |= Self::FIR;
        }
        if self.fin {
            b |= Self::FIN;
        }
        if self.con {
            b |= Self::CON;
        }
        if self.uns {
            b |= Self::UNS;
        }
        b
    }
}

macro_rules! function_codes {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// Application function codes recognised by the parser.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum FunctionCode {
            $($variant = $code,)*
        }

        impl FunctionCode {
            pub const ALL: &'static [FunctionCode] = &[$(FunctionCode::$variant,)*];

            pub fn from_u8(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(FunctionCode::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(FunctionCode::$variant => $name,)*
                }
            }
        }
    };
}

function_codes! {
    Confirm = 0x00 => "CONFIRM",
    Read = 0x01 => "READ",
    Write = 0x02 => "WRITE",
    Select = 0x03 => "SELECT",
    Operate = 0x04 => "OPERATE",
    DirectOperate = 0x05 => "DIRECT_OPERATE",
    DirectOperateNr = 0x06 => "DIRECT_OPERATE_NR",
    ImmedFreeze = 0x07 => "IMMED_FREEZE",
    ImmedFreezeNr = 0x08 => "IMMED_FREEZE_NR",
    FreezeClear = 0x09 => "FREEZE_CLEAR",
    FreezeClearNr = 0x0A => "FREEZE_CLEAR_NR",
    FreezeAtTime = 0x0B => "FREEZE_AT_TIME",
    FreezeAtTimeNr = 0x0C => "FREEZE_AT_TIME_NR",
    ColdRestart = 0x0D => "COLD_RESTART",
    WarmRestart = 0x0E => "WARM_RESTART",
    InitializeData = 0x0F => "INITIALIZE_DATA",
    InitializeAppl = 0x10 => "INITIALIZE_APPL",
    StartAppl = 0x11 => "START_APPL",
    StopAppl = 0x12 => "STOP_APPL",
    SaveConfig = 0x13 => "SAVE_CONFIG",
    EnableUnsolicited = 0x14 => "ENABLE_UNSOLICITED",
    DisableUnsolicited = 0x15 => "DISABLE_UNSOLICITED",
    AssignClass = 0x16 => "ASSIGN_CLASS",
    DelayMeasure = 0x17 => "DELAY_MEASURE",
    RecordCurrentTime = 0x18 => "RECORD_CURRENT_TIME",
    OpenFile = 0x19 => "OPEN_FILE",
    CloseFile = 0x1A => "CLOSE_FILE",
    DeleteFile = 0x1B => "DELETE_FILE",
    GetFileInfo = 0x1C => "GET_FILE_INFO",
    AuthenticateFile = 0x1D => "AUTHENTICATE_FILE",
    AbortFile = 0x1E => "ABORT_FILE",
    ActivateConfig = 0x1F => "ACTIVATE_CONFIG",
    AuthenticateReq = 0x20 => "AUTHENTICATE_REQ",
    AuthReqNoAck = 0x21 => "AUTH_REQ_NO_ACK",
    Response = 0x81 => "RESPONSE",
    UnsolicitedResponse = 0x82 => "UNSOLICITED_RESPONSE",
    AuthenticateResp = 0x83 => "AUTHENTICATE_RESP",
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Responses carry internal indications after the function code.
    pub fn is_response(self) -> bool {
        self.code() & 0x80 != 0
    }
}

/// Internal indications (responses only). IIN1 is the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Iin(pub u16);

impl Iin {
    pub const BROADCAST: u16 = 0x0001;
    pub const CLASS_1_EVENTS: u16 = 0x0002;
    pub const CLASS_2_EVENTS: u16 = 0x0004;
    pub const CLASS_3_EVENTS: u16 = 0x0008;
    pub const NEED_TIME: u16 = 0x0010;
    pub const LOCAL_CONTROL: u16 = 0x0020;
    pub const DEVICE_TROUBLE: u16 = 0x0040;
    pub const DEVICE_RESTART: u16 = 0x0080;
    pub const NO_FUNC_CODE_SUPPORT: u16 = 0x0100;
    pub const OBJECT_UNKNOWN: u16 = 0x0200;
    pub const PARAMETER_ERROR: u16 = 0x0400;
    pub const EVENT_BUFFER_OVERFLOW: u16 = 0x0800;
    pub const ALREADY_EXECUTING: u16 = 0x1000;
    pub const CONFIG_CORRUPT: u16 = 0x2000;
    pub const RESERVED_2: u16 = 0x4000;
    pub const RESERVED_1: u16 = 0x8000;

    pub const NAMES: [(u16, &'static str); 16] = [
        (Self::BROADCAST, "broadcast"),
        (Self::CLASS_1_EVENTS, "class_1_events"),
        (Self::CLASS_2_EVENTS, "class_2_events"),
        (Self::CLASS_3_EVENTS, "class_3_events"),
        (Self::NEED_TIME, "need_time"),
        (Self::LOCAL_CONTROL, "local_control"),
        (Self::DEVICE_TROUBLE, "device_trouble"),
        (Self::DEVICE_RESTART, "device_restart"),
        (Self::NO_FUNC_CODE_SUPPORT, "no_func_code_support"),
        (Self::OBJECT_UNKNOWN, "object_unknown"),
        (Self::PARAMETER_ERROR, "parameter_error"),
        (Self::EVENT_BUFFER_OVERFLOW, "event_buffer_overflow"),
        (Self::ALREADY_EXECUTING, "already_executing"),
        (Self::CONFIG_CORRUPT, "config_corrupt"),
        (Self::RESERVED_2, "reserved_2"),
        (Self::RESERVED_1, "reserved_1"),
    ];

    pub fn from_bytes(iin1: u8, iin2: u8) -> Self {
        Iin(u16::from_le_bytes([iin1, iin2]))
    }

    pub fn contains(self, bit: u16) -> bool {
        self.0 & bit == bit
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Header fields that decoded before any error; kept on rejected fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppHeader {
    pub control: AppControl,
    pub function_code: u8,
    pub iin: Option<Iin>,
}

impl AppHeader {
    pub fn function(&self) -> Option<FunctionCode> {
        FunctionCode::from_u8(self.function_code)
    }
}

/// Aggressive-mode authentication data from the wrapping g120 objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    /// Challenge sequence number.
    pub csq: u32,
    pub user: u16,
    pub mac: Vec<u8>,
}

/// A parsed application fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub control: AppControl,
    pub function: FunctionCode,
    pub iin: Option<Iin>,
    pub auth: Option<AuthData>,
    pub blocks: Vec<ObjectBlock>,
}

impl Fragment {
    pub fn header(&self) -> AppHeader {
        AppHeader { control: self.control, function_code: self.function.code(), iin: self.iin }
    }
}

/// Discriminants of the aggressive-mode wrapper objects.
pub const AGGRESSIVE_MODE: (u8, u8) = (120, 3);
pub const AUTH_MAC: (u8, u8) = (120, 9);

/// Parse one complete application fragment. The whole input must be
/// consumed.
pub fn parse_fragment(catalogue: &Catalogue, bytes: &[u8]) -> Result<Fragment, AppError> {
    if bytes.len() < 2 {
        return Err(AppError::no_parse());
    }
    let control = AppControl::from_byte(bytes[0]);
    let mut header = AppHeader { control, function_code: bytes[1], iin: None };

    let function = match FunctionCode::from_u8(bytes[1]) {
        Some(f) => f,
        None => return Err(AppError::new(ErrorKind::FuncNotSupp, Some(header))),
    };

    let mut body = &bytes[2..];
    if function.is_response() {
        if body.len() < 2 {
            return Err(AppError::new(ErrorKind::ParamError, Some(header)));
        }
        header.iin = Some(Iin::from_bytes(body[0], body[1]));
        body = &body[2..];
    } else if control.con || (control.uns && function != FunctionCode::Confirm) {
        // CON is never set on requests; UNS only confirms unsolicited responses.
        return Err(AppError::new(ErrorKind::ParamError, Some(header)));
    }

    let grammar = catalogue.grammar(function);
    let (blocks, auth) = parse_objects(catalogue, grammar, body).map_err(|kind| AppError::new(kind, Some(header)))?;

    Ok(Fragment { control, function, iin: header.iin, auth, blocks })
}

/// Object data, optionally wrapped in aggressive-mode authentication.
fn parse_objects(
    catalogue: &Catalogue,
    grammar: &FunctionGrammar,
    body: &[u8],
) -> Result<(Vec<ObjectBlock>, Option<AuthData>), ErrorKind> {
    let mut r = Cursor::new(body);
    if grammar.aggressive && grammar::peek_discriminant(&r) == Some(AGGRESSIVE_MODE) {
        return parse_wrapped(catalogue, grammar, &mut r);
    }
    Ok((parse_blocks(grammar, &mut r)?, None))
}

fn parse_blocks(grammar: &FunctionGrammar, r: &mut Reader<'_>) -> Result<Vec<ObjectBlock>, ErrorKind> {
    let mut blocks = Vec::new();
    while !grammar::remaining(r).is_empty() {
        blocks.push(grammar.parse_block(r)?);
    }
    Ok(blocks)
}

/// `g120v3 <objects> g120v9`. The leading discriminant commits to this
/// branch; a missing or misplaced MAC is a parameter error.
fn parse_wrapped(
    catalogue: &Catalogue,
    grammar: &FunctionGrammar,
    r: &mut Reader<'_>,
) -> Result<(Vec<ObjectBlock>, Option<AuthData>), ErrorKind> {
    let auth = catalogue.auth_grammar();
    let head = auth.parse_block(r)?;
    let (csq, user) = match head.objects.as_deref() {
        Some([Object::AggressiveMode { csq, user }]) => (*csq, *user),
        _ => return Err(ErrorKind::ParamError),
    };

    let mut blocks = Vec::new();
    loop {
        match grammar::peek_discriminant(r) {
            Some(AUTH_MAC) => break,
            Some(_) => blocks.push(grammar.parse_block(r)?),
            None => return Err(ErrorKind::ParamError),
        }
    }

    let tail = auth.parse_block(r)?;
    let mac = match tail.objects {
        Some(mut objects) if objects.len() == 1 => match objects.pop() {
            Some(Object::Octets(mac)) => mac,
            _ => return Err(ErrorKind::ParamError),
        },
        _ => return Err(ErrorKind::ParamError),
    };
    if !grammar::remaining(r).is_empty() {
        return Err(ErrorKind::ParamError);
    }
    Ok((blocks, Some(AuthData { csq, user, mac })))
}
