use super::frames::FrameComputationError;
use super::remap::RemapError;
use crate::hex::HexError;
use crate::jvm::{self, IndexResolutionError};
use std::fmt;

/// Reasons a patch can't be applied
///
/// Any of these means no output gets produced.
#[derive(Debug)]
pub enum PatchError {
    /// Hex input rejected (only with strict decoding)
    InputDecoding(HexError),

    /// Target or reference class isn't a valid class file
    ClassFormat(jvm::Error),

    /// Method bytes end in the middle of a header field
    TruncatedMethodBytes { field: &'static str, offset: usize },

    /// The original method's name or descriptor don't resolve in the target pool
    UnresolvableOriginalMethod(IndexResolutionError),

    /// The method to patch isn't in the class
    MethodNotFound { method: String },

    /// The patched method has no `Code` attribute but needs one
    MissingCodeAttribute { method: String },

    /// Method couldn't be moved into the target constant pool
    Remap(RemapError),

    FrameComputation(FrameComputationError),

    /// Final class came out with no bytes
    EmptyOutput,
}

impl PatchError {
    /// Short name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::InputDecoding(_) => "InputDecodingError",
            PatchError::ClassFormat(_) => "ClassFormatError",
            PatchError::TruncatedMethodBytes { .. } => "TruncatedMethodBytesError",
            PatchError::UnresolvableOriginalMethod(_) => "UnresolvableOriginalMethodError",
            PatchError::MethodNotFound { .. } => "MethodNotFoundError",
            PatchError::MissingCodeAttribute { .. } => "MissingCodeAttributeError",
            PatchError::Remap(_) => "RemapError",
            PatchError::FrameComputation(_) => "FrameComputationError",
            PatchError::EmptyOutput => "EmptyOutputError",
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::InputDecoding(err) => write!(f, "bad hex input: {}", err),
            PatchError::ClassFormat(err) => write!(f, "bad class file: {}", err),
            PatchError::TruncatedMethodBytes { field, offset } => write!(
                f,
                "method bytes end before {} (offset {})",
                field, offset
            ),
            PatchError::UnresolvableOriginalMethod(err) => {
                write!(f, "original method doesn't resolve in target class: {}", err)
            }
            PatchError::MethodNotFound { method } => {
                write!(f, "method {} not found in target class", method)
            }
            PatchError::MissingCodeAttribute { method } => {
                write!(f, "patch for {} has no Code attribute", method)
            }
            PatchError::Remap(err) => write!(f, "could not copy method: {}", err),
            PatchError::FrameComputation(err) => write!(f, "frame computation failed: {}", err),
            PatchError::EmptyOutput => write!(f, "patched class is empty"),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchError::InputDecoding(err) => Some(err),
            PatchError::ClassFormat(err) => Some(err),
            PatchError::UnresolvableOriginalMethod(err) => Some(err),
            PatchError::Remap(err) => Some(err),
            PatchError::FrameComputation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HexError> for PatchError {
    fn from(err: HexError) -> PatchError {
        PatchError::InputDecoding(err)
    }
}

impl From<jvm::Error> for PatchError {
    fn from(err: jvm::Error) -> PatchError {
        PatchError::ClassFormat(err)
    }
}

impl From<RemapError> for PatchError {
    fn from(err: RemapError) -> PatchError {
        PatchError::Remap(err)
    }
}

impl From<FrameComputationError> for PatchError {
    fn from(err: FrameComputationError) -> PatchError {
        PatchError::FrameComputation(err)
    }
}
