//! Error types.
//!
//! Application-layer parse failures are values, not panics: every grammar
//! level yields either its result or an [`ErrorKind`]. Once a branch has been
//! selected by its discriminant, a failure inside it is final and travels up
//! unchanged, attached to whatever header fields were already decoded.

use crate::app::AppHeader;

/// The application-layer error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Function code not recognised.
    #[error("FUNC_NOT_SUPP")]
    FuncNotSupp,
    /// Group/variation not recognised for the active function.
    #[error("OBJ_UNKNOWN")]
    ObjUnknown,
    /// Malformed data after a valid discriminant was matched.
    #[error("PARAM_ERROR")]
    ParamError,
    /// The input could not even be framed as a fragment.
    #[error("no parse")]
    NoParse,
}

/// Every read failure inside a committed branch is a truncation.
impl From<std::io::Error> for ErrorKind {
    fn from(_: std::io::Error) -> Self {
        ErrorKind::ParamError
    }
}

/// A rejected application fragment: the error plus the header fields that
/// decoded before it occurred. Renders as `[seq] (flags) FUNCTION KIND`, or
/// the bare kind when no header decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}{kind}", header_prefix(.header))]
pub struct AppError {
    pub kind: ErrorKind,
    pub header: Option<AppHeader>,
}

impl AppError {
    pub fn new(kind: ErrorKind, header: Option<AppHeader>) -> Self {
        AppError { kind, header }
    }

    pub fn no_parse() -> Self {
        AppError { kind: ErrorKind::NoParse, header: None }
    }
}

fn header_prefix(header: &Option<AppHeader>) -> String {
    header.as_ref().map(|h| format!("{} ", h)).unwrap_or_default()
}

/// Errors raised by the [`Dissector`](crate::Dissector).
///
/// Only [`DissectError::Finished`] is returned from `feed`; the rest are
/// reported through [`Callbacks::log_error`](crate::Callbacks::log_error) and
/// processing continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DissectError {
    #[error("dissector used after finish()")]
    Finished,
    #[error("context {src}->{dst} evicted, {bytes} buffered bytes dropped")]
    ContextEvicted { src: u16, dst: u16, bytes: usize },
    #[error("context {src}->{dst} buffer full ({capacity} bytes), {dropped} bytes dropped")]
    BufferOverflow { src: u16, dst: u16, dropped: usize, capacity: usize },
    #[error("context {src}->{dst} torn down, {bytes} buffered bytes dropped")]
    TornDown { src: u16, dst: u16, bytes: usize },
}
