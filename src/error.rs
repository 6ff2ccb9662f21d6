use std::fmt;

use thiserror::Error;

use crate::data::cursor::TextEncoding;

/// Error raised anywhere in a loading session.
///
/// `kind` says what went wrong; `record` names the innermost record shape that
/// was being populated when it happened, if any.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub record: Option<RecordFrame>,
}

/// The record shape and absolute offset a failure was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFrame {
    pub name: &'static str,
    pub offset: u64,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("read past end of data at 0x{offset:X} (need {needed} bytes, have {available})")]
    TruncatedData {
        offset: u64,
        needed: usize,
        available: usize,
    },
    #[error("invalid {encoding:?} text at 0x{offset:X}")]
    TextDecode { offset: u64, encoding: TextEncoding },
    #[error("offset 0x{offset:X} lies outside the {len:#X}-byte buffer")]
    OffsetOutOfRange { offset: u64, len: usize },
    #[error("invalid signature at 0x{offset:X}: expected {expected:?}, found {found:?}")]
    SignatureMismatch {
        offset: u64,
        expected: String,
        found: String,
    },
    #[error("key {key:?} already exists")]
    DuplicateKey { key: String },
    #[error("key {key:?} not found")]
    KeyNotFound { key: String },
    #[error("index {index} out of bounds for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("unsupported {what} value {value:#X}")]
    UnsupportedVariant { what: &'static str, value: u32 },
    #[error("{record} at 0x{offset:X} references itself while being loaded")]
    CyclicReference { record: &'static str, offset: u64 },
    #[error("dictionary has {count} keys but no value array")]
    DictionaryValuesMissing { count: u32 },
    #[error("parse error at 0x{offset:X}: {detail}")]
    ParseError { offset: u64, detail: String },
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Attribute this error to `name` at `offset` unless an inner record already claimed it.
    pub fn in_record(mut self, name: &'static str, offset: u64) -> Self {
        if self.record.is_none() {
            self.record = Some(RecordFrame { name, offset });
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record {
            Some(frame) => write!(
                f,
                "{} (while loading {} at 0x{:X})",
                self.kind, frame.name, frame.offset
            ),
            None => self.kind.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error { kind, record: None }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(x: std::io::Error) -> Error {
        Error {
            kind: x.into(),
            record: None,
        }
    }
}

pub type IResult<T> = Result<T, Error>;
