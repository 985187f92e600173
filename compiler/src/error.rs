use thiserror::Error;

use common::Uid;

use crate::ir::{link::LinkError, verify::VerifyError};

/// Failures of the rewriting engine. All of them abort the run.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("function `{function}` returns void but carries return-value assertion `{kind}`")]
    VoidReturnAssertion { function: String, kind: String },

    #[error(
        "function `{function}` carries more than one return-value assertion (uid {ignored} after uid {honored})"
    )]
    MultipleReturnAssertions {
        function: String,
        honored: Uid,
        ignored: Uid,
    },

    #[error(
        "no state for assertion uid {uid} in function `{function}`; only pass unoptimized modules to this tool"
    )]
    MissingState { function: String, uid: Uid },

    #[error(
        "hidden parameter {index} of the call to `{callee}` in `{function}` was already assigned (uid {uid})"
    )]
    PlaceholderAlreadyAssigned {
        function: String,
        callee: String,
        index: usize,
        uid: Uid,
    },

    #[error("assertion library routine `{0}` is missing from the linked module")]
    MissingRoutine(String),

    #[error("malformed marker in function `{function}`: {reason}")]
    MalformedMarker { function: String, reason: String },

    #[error(
        "cannot replace the signature of `{function}`: parameter {index} would change from `{old}` to `{new}`"
    )]
    SignatureMismatch {
        function: String,
        index: usize,
        old: String,
        new: String,
    },

    #[error("cannot replace the signature of `{function}`: {reason}")]
    SignatureShape { function: String, reason: String },

    #[error("function {0} is no longer part of the module")]
    DanglingFunction(crate::ir::FuncId),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

pub type Result<T, E = InstrumentError> = std::result::Result<T, E>;
