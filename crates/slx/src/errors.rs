// ai
//! 💀 Errors — the part of the codebase that knows exactly how things went wrong.
//!
//! 🎬 *[a conversion dies at row 40,000. the on-call engineer asks "where?"]*
//! *[anyhow shrugs. thiserror hands over a clipboard with the row offset on it.]*
//!
//! Everything inside the pipeline speaks `anyhow` with `.context(...)`, like the rest
//! of the crate. The outer boundary speaks [`ConversionError`]: one [`ErrorKind`], the
//! row offset being processed when it broke, and what happened to the upload session.
//! That's enough for a human to re-run from the right place. No automatic resume. 🦆
//!
//! 🧠 Knowledge graph:
//! - `StageFailure`: crate-internal, an `anyhow::Error` tagged with its kind
//! - `StageResultExt::stage(kind)`: the tagging helper, used at every pipeline step
//! - `ConversionError`: public, what `run()` hands back on failure

use std::fmt;

use thiserror::Error;

/// 📦 A boxed error that still remembers its cause chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🏷️ Which stage of the pipeline gave up.
///
/// Every kind is fatal. None are retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 🗺️ An input or output location could not be split into (container, key).
    InvalidLocation,
    /// 📗 The workbook could not be opened, or a window could not be decoded.
    SourceReadError,
    /// 🧹 The header reduced to nothing usable (all blank, or no cells at all).
    SanitizationError,
    /// 🧾 A chunk could not be serialized.
    EncodeError,
    /// 🪣 Any object-store call failed.
    UploadError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_name = match self {
            ErrorKind::InvalidLocation => "InvalidLocation",
            ErrorKind::SourceReadError => "SourceReadError",
            ErrorKind::SanitizationError => "SanitizationError",
            ErrorKind::EncodeError => "EncodeError",
            ErrorKind::UploadError => "UploadError",
        };
        f.write_str(the_name)
    }
}

/// 🪣 What became of the multipart upload session by the time the pipeline returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDisposition {
    /// The session was never requested (failure happened before the first store call).
    NeverCreated,
    /// The session was aborted.
    Aborted,
    /// An abort was attempted and the store refused. Logged, not re-raised.
    AbortFailed,
    /// All parts acknowledged and the session completed.
    Completed,
    /// The session went unused and the object was written in one shot.
    DirectWrite,
}

impl fmt::Display for SessionDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_words = match self {
            SessionDisposition::NeverCreated => "never created",
            SessionDisposition::Aborted => "aborted",
            SessionDisposition::AbortFailed => "abort failed",
            SessionDisposition::Completed => "completed",
            SessionDisposition::DirectWrite => "direct write",
        };
        f.write_str(the_words)
    }
}

/// 💀 The terminal failure of one conversion.
///
/// `row_offset` is the data-row offset of the window being processed when things broke.
/// Rows before it were read and handed to the uploader, but since the session is
/// aborted on failure, nothing from this run survives remotely. Re-run from the start,
/// or slice the source and resume from here by hand.
#[derive(Debug, Error)]
#[error("{kind} (row offset: {}, upload session: {disposition})", display_offset(.row_offset))]
pub struct ConversionError {
    pub kind: ErrorKind,
    pub row_offset: Option<u64>,
    pub disposition: SessionDisposition,
    #[source]
    pub cause: BoxError,
}

fn display_offset(row_offset: &Option<u64>) -> String {
    match row_offset {
        Some(offset) => offset.to_string(),
        None => "n/a".to_string(),
    }
}

/// 🏷️ An `anyhow::Error` wearing a name tag that says which stage it came from.
#[derive(Debug)]
pub(crate) struct StageFailure {
    pub(crate) kind: ErrorKind,
    pub(crate) error: anyhow::Error,
}

impl StageFailure {
    pub(crate) fn new(kind: ErrorKind, error: anyhow::Error) -> Self {
        Self { kind, error }
    }

    /// 🔚 Seal it into the public error, now that we know the offset and the session's fate.
    pub(crate) fn into_conversion_error(
        self,
        row_offset: Option<u64>,
        disposition: SessionDisposition,
    ) -> ConversionError {
        ConversionError {
            kind: self.kind,
            row_offset,
            disposition,
            cause: self.error.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.kind, self.error)
    }
}

/// 🏷️ `.stage(ErrorKind::X)?` — tag an anyhow result with where it blew up.
pub(crate) trait StageResultExt<T> {
    fn stage(self, kind: ErrorKind) -> Result<T, StageFailure>;
}

impl<T> StageResultExt<T> for anyhow::Result<T> {
    fn stage(self, kind: ErrorKind) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure::new(kind, error))
    }
}
