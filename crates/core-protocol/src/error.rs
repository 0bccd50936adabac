//! Error taxonomy shared by the builder, intern tables, and transport.
//!
//! Every failure that crosses a crate boundary is a `CoreError`: a stable
//! machine-readable kind plus a human-readable detail string. Library code
//! never panics on bad input and never unwinds through the encode path; the
//! first error is recorded and surfaced, subsequent operations no-op.

use std::fmt;

/// Stable failure classification. The wire-facing code strings are fixed;
/// callers may match on the enum or log `code()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Validation failure: non-finite number, out-of-range integer, wrong
    /// buffer shape, invalid enum value, stable-key collision within a frame.
    BadParams,
    /// A configured limit was exceeded: frame bytes, command count, intern
    /// capacity with nothing evictable, mailbox slot size.
    TooLarge,
    /// Malformed bytes observed on a boundary (drawlist or event-batch decode).
    Format,
    /// A violated invariant, including environment-support failures.
    Internal,
    /// Consumer-side failure surfaced on an accepted or completed ack.
    BackendError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadParams => "BAD_PARAMS",
            ErrorKind::TooLarge => "TOO_LARGE",
            ErrorKind::Format => "FORMAT",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::BackendError => "BACKEND_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error: `{ code, detail }`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn bad_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadParams, detail)
    }

    pub fn too_large(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooLarge, detail)
    }

    pub fn format(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn backend(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendError, detail)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
