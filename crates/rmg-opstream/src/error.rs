use thiserror::Error;

use crate::Tag;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream ended unexpectedly at byte {at}, needed {needed} more bytes")]
    UnexpectedEof { at: usize, needed: usize },
    #[error("Stream magic {found:?} does not match expected {expected:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("Unsupported stream version {0}, expected {expected}", expected = crate::VERSION)]
    UnsupportedVersion(u32),
    #[error("Unknown record tag {0:#x}")]
    UnknownTag(u32),
    #[error("Payload of {tag:?} has {found} bytes, schema expects {expected}")]
    PayloadSize {
        tag: Tag,
        expected: usize,
        found: usize,
    },
    #[error("Record {tag:?} is not terminated by the sentinel, found {found:#x}")]
    MissingSentinel { tag: Tag, found: u32 },
    #[error("Tail of {tag:?} has {remaining} unread bytes")]
    TailNotConsumed { tag: Tag, remaining: usize },
    #[error("Record {found:?} is not allowed at this point")]
    UnexpectedTag { found: Tag },
    #[error("Enumeration value {value} is not valid for {field}")]
    InvalidValue { field: &'static str, value: u32 },
    #[error("String in tail is not valid utf-8: {0}")]
    InvalidUtf8(#[from] core::str::Utf8Error),
    #[error("{0} bytes trail the end record")]
    TrailingBytes(usize),
}
