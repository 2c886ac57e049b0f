//! # dnp3-dissect: a streaming DNP3 protocol dissector
//!
//! Turns an untrusted byte stream into validated link, transport and
//! application layer events, without panicking on malformed input.
//!
//! ## Layers
//!
//! - **Link** ([`link`]): `05 64` framing, CRC-16/DNP checked header and
//!   16-byte data blocks, semantic frame validation.
//! - **Transport** ([`transport`], [`context`]): per-connection segment
//!   reassembly keyed by (source, destination), bounded with LRU eviction.
//! - **Application** ([`app`], [`grammar`], [`catalogue`], [`object`]):
//!   fragment header, function-specific object grammars and typed object
//!   decoding with exact `FUNC_NOT_SUPP` / `OBJ_UNKNOWN` / `PARAM_ERROR`
//!   reporting.
//!
//! ## Usage
//!
//! ```no_run
//! use dnp3_dissect::{Callbacks, Dissector, Fragment, Frame};
//!
//! struct Printer;
//!
//! impl Callbacks for Printer {
//!     fn app_fragment(&mut self, frame: &Frame, fragment: &Fragment, _payload: &[u8]) {
//!         println!("{} -> {}: {}", frame.source, frame.destination, fragment);
//!     }
//! }
//!
//! let mut d = Dissector::new(Printer);
//! d.feed(&[0x05, 0x64, 0x05, 0xF2, 0x01, 0x00, 0xEF, 0xFF, 0xBF, 0xB5]).expect("feed");
//! d.finish().expect("finish");
//! ```
//!
//! Events are rendered with `Display` (see [`dump`]).

pub mod app;
pub mod catalogue;
pub mod config;
pub mod context;
pub mod crc;
pub mod dissector;
pub mod dump;
pub mod error;
pub mod grammar;
pub mod link;
pub mod object;
pub mod transport;

pub use app::{parse_fragment, AppControl, AppHeader, AuthData, Fragment, FunctionCode, Iin};
pub use catalogue::Catalogue;
pub use config::{Config, ConfirmPolicy};
pub use context::{ContextKey, ContextTable};
pub use crc::crc16;
pub use dissector::{Callbacks, Dissector};
pub use error::{AppError, DissectError, ErrorKind};
pub use link::{try_parse_frame, validate_frame, Frame, LinkFunction};
pub use object::{Object, ObjectBlock, PrefixCode, RangeSpec};
pub use transport::{Reassembler, Segment};
