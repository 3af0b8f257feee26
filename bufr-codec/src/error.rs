//! Error types for the BUFR codec.
//!
//! "Error kinds (reported, never recovered inside the engine)." (ERROR
//! HANDLING DESIGN §7) `QueryError` is deliberately not a variant here: it
//! never touches the bitstream, so it gets its own type in [`crate::query`].

use bufr_tables::DescriptorId;
use core::fmt;

/// The kind of failure the codec reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Section magic, length, or terminator mismatch.
    MalformedHeader(String),
    /// A descriptor id absent from tables for the negotiated versions.
    UnknownDescriptor(DescriptorId),
    /// An operator left coder state unbalanced, e.g. `204YYY` without
    /// `204000`, or a cyclic sequence expansion.
    UnbalancedOperator(String),
    /// A bitmap's cardinality disagreed with the number of marker values that
    /// followed it.
    BitmapMismatch {
        /// Number of bitmap `0` bits (candidates marked present).
        expected: usize,
        /// Number of marker values actually supplied.
        found: usize,
    },
    /// The reader ran out of bits before the requested width was satisfied.
    InsufficientBits {
        /// Bits requested.
        needed: u32,
        /// Bits actually available.
        available: usize,
    },
    /// A section's payload left more than 7 unread bits that were not pad
    /// zeroes.
    ExcessBits {
        /// Number of bits left unread.
        unread: usize,
    },
    /// A structural signature check failed (e.g. section 0 must start with
    /// `BUFR`, section 5 must be `7777`).
    ValidationFailed(String),
    /// A tree value's type was incompatible with its element's declared type
    /// during encoding.
    EncodeTypeMismatch {
        /// The descriptor whose value did not match.
        descriptor: DescriptorId,
        /// A human-readable description of the mismatch.
        detail: String,
    },
    /// Internal: a compiled template's recorded trace disagreed with a
    /// structural (replication count / bitmap bit) read during replay.
    /// Always caught by [`crate::compile`] and never surfaces past it.
    TemplateDiverged,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader(msg) => write!(f, "malformed header: {msg}"),
            Self::UnknownDescriptor(id) => write!(f, "unknown descriptor {id}"),
            Self::UnbalancedOperator(msg) => write!(f, "unbalanced operator: {msg}"),
            Self::BitmapMismatch { expected, found } => write!(
                f,
                "bitmap cardinality mismatch: bitmap selects {expected} element(s), but {found} marker value(s) followed"
            ),
            Self::InsufficientBits { needed, available } => write!(
                f,
                "insufficient bits: needed {needed}, only {available} available"
            ),
            Self::ExcessBits { unread } => {
                write!(f, "excess bits: {unread} non-zero pad bit(s) left unread")
            }
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::EncodeTypeMismatch { descriptor, detail } => {
                write!(f, "encode type mismatch at {descriptor}: {detail}")
            }
            Self::TemplateDiverged => write!(f, "compiled template diverged from its recorded trace"),
        }
    }
}

/// Where in the stream and template an error occurred.
///
/// "the engine surfaces the first error with a stream byte+bit offset and the
/// descriptor trail." (ERROR HANDLING DESIGN §7)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// Byte offset into the message at the point of failure.
    pub byte_offset: usize,
    /// Bit offset within that byte (0-7).
    pub bit_offset: usize,
    /// The chain of descriptors the walk had entered, outermost first.
    pub descriptor_trail: Vec<DescriptorId>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at byte {}, bit {}", self.byte_offset, self.bit_offset)?;

        if !self.descriptor_trail.is_empty() {
            write!(f, ", trail [")?;
            for (i, id) in self.descriptor_trail.iter().enumerate() {
                if i > 0 {
                    write!(f, " > ")?;
                }
                write!(f, "{id}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

/// The top-level error type returned by decode and encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where it went wrong, if known at the point of construction.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Construct an error with no context yet attached.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attach (or replace) the error's context.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ctx) = &self.context {
            write!(f, " ({ctx})")?;
        }

        Ok(())
    }
}

impl core::error::Error for Error {}

/// Result alias used throughout the codec.
pub type Result<T> = core::result::Result<T, Error>;

macro_rules! bail {
    ($kind:expr) => {
        return Err($crate::error::Error::new($kind))
    };
}

macro_rules! err {
    ($kind:expr) => {
        Err($crate::error::Error::new($kind))
    };
}

pub(crate) use bail;
pub(crate) use err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::ValidationFailed("bad terminator".into())).with_context(
            ErrorContext {
                byte_offset: 40,
                bit_offset: 0,
                descriptor_trail: vec![],
            },
        );

        let msg = err.to_string();
        assert!(msg.contains("bad terminator"));
        assert!(msg.contains("byte 40"));
    }
}
