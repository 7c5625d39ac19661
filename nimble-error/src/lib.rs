//! Error types shared by every Nimble crate.
//!
//! The [`NimbleError`] variants mirror the failure taxonomy of the file
//! format: structural file corruption, malformed encodings, type and schema
//! mismatches, exhausted decoder state, and resource/I/O failures. The
//! [`nimble_err`], [`nimble_bail`] and [`nimble_panic`] macros are the
//! preferred way to construct them.

use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// A string that is cheap to clone and to construct from literals.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// The error type for every fallible Nimble operation.
#[derive(Clone)]
pub enum NimbleError {
    /// Magic/version mismatch, truncated footer, or checksum failure.
    MalformedFile(ErrString),
    /// Unknown encoding kind, or an encoding prefix inconsistent with its buffer.
    MalformedEncoding(ErrString),
    /// Encoding/data-type combination that is not implemented.
    UnsupportedDataType(ErrString),
    /// Requested read type is neither the stored type nor a supported up-cast.
    TypeMismatch(ErrString),
    /// Requested column path is absent or of the wrong kind.
    SchemaMismatch(ErrString),
    /// Layout planner was given a non-flat-map column.
    InvalidLayoutRequest(ErrString),
    /// More rows requested than remain in a stream.
    DecoderStateExhausted(ErrString),
    /// Memory pool allocation failure.
    ResourceExhausted(ErrString),
    /// Surfaced from the file backend.
    IoError(ErrString),
    /// Anything that does not fit the categories above.
    InvalidArgument(ErrString),
    /// A shared error, produced when one failure is surfaced to several waiters.
    Shared(Arc<NimbleError>),
}

impl NimbleError {
    fn name(&self) -> &'static str {
        match self {
            Self::MalformedFile(_) => "MalformedFile",
            Self::MalformedEncoding(_) => "MalformedEncoding",
            Self::UnsupportedDataType(_) => "UnsupportedDataType",
            Self::TypeMismatch(_) => "TypeMismatch",
            Self::SchemaMismatch(_) => "SchemaMismatch",
            Self::InvalidLayoutRequest(_) => "InvalidLayoutRequest",
            Self::DecoderStateExhausted(_) => "DecoderStateExhausted",
            Self::ResourceExhausted(_) => "ResourceExhausted",
            Self::IoError(_) => "IoError",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Shared(e) => e.name(),
        }
    }

    /// The human-readable message carried by this error.
    pub fn message(&self) -> &str {
        match self {
            Self::MalformedFile(s)
            | Self::MalformedEncoding(s)
            | Self::UnsupportedDataType(s)
            | Self::TypeMismatch(s)
            | Self::SchemaMismatch(s)
            | Self::InvalidLayoutRequest(s)
            | Self::DecoderStateExhausted(s)
            | Self::ResourceExhausted(s)
            | Self::IoError(s)
            | Self::InvalidArgument(s) => s,
            Self::Shared(e) => e.message(),
        }
    }
}

impl Display for NimbleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

impl Debug for NimbleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for NimbleError {}

impl From<std::io::Error> for NimbleError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string().into())
    }
}

impl From<Arc<NimbleError>> for NimbleError {
    fn from(e: Arc<NimbleError>) -> Self {
        Self::Shared(e)
    }
}

/// The result type for every fallible Nimble operation.
pub type NimbleResult<T> = Result<T, NimbleError>;

/// Construct a [`NimbleError`] without returning it.
///
/// `nimble_err!(TypeMismatch: "got {}", x)` selects a variant; the bare form
/// defaults to `InvalidArgument`.
#[macro_export]
macro_rules! nimble_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::NimbleError::$variant(format!($fmt $(, $arg)*).into())
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::NimbleError::InvalidArgument(format!($fmt $(, $arg)*).into())
    };
}

/// Return early with a [`NimbleError`].
#[macro_export]
macro_rules! nimble_bail {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::nimble_err!($variant: $fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::nimble_err!($fmt $(, $arg)*))
    };
}

/// Panic with a formatted [`NimbleError`]. Reserved for violated internal
/// invariants that cannot be surfaced as a `Result`.
#[macro_export]
macro_rules! nimble_panic {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        panic!("{}", $crate::nimble_err!($variant: $fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        panic!("{}", $crate::nimble_err!($fmt $(, $arg)*))
    };
}

/// Unwrap helpers that panic with a [`NimbleError`]-formatted message.
pub trait NimbleExpect {
    type Output;

    /// Unwrap, panicking with `msg` on failure.
    fn nimble_expect(self, msg: &str) -> Self::Output;
}

impl<T> NimbleExpect for Option<T> {
    type Output = T;

    fn nimble_expect(self, msg: &str) -> T {
        match self {
            Some(v) => v,
            None => nimble_panic!("expected Some: {}", msg),
        }
    }
}

impl<T> NimbleExpect for NimbleResult<T> {
    type Output = T;

    fn nimble_expect(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => nimble_panic!("expected Ok: {}: {}", msg, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_selection() {
        let e = nimble_err!(TypeMismatch: "stored {} requested {}", "i8", "string");
        assert!(matches!(e, NimbleError::TypeMismatch(_)));
        assert_eq!(e.to_string(), "TypeMismatch: stored i8 requested string");
    }

    #[test]
    fn default_variant() {
        let e = nimble_err!("bad argument");
        assert!(matches!(e, NimbleError::InvalidArgument(_)));
    }

    #[test]
    fn bail_returns_err() {
        fn inner() -> NimbleResult<()> {
            nimble_bail!(MalformedFile: "bad magic");
        }
        assert!(matches!(inner(), Err(NimbleError::MalformedFile(_))));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let e: NimbleError = io.into();
        assert!(matches!(e, NimbleError::IoError(_)));
    }
}
