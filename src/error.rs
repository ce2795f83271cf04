//! The crate's error taxonomy (§7). Every fault except a malformed
//! `check()` argument is absorbed inside a probe and never surfaces here.

use thiserror::Error;

/// Errors the public façade can return. The only variant in practice is
/// [`Error::InvalidArgument`]; `detect`/`percentage`/`brand` never fail
/// because `FlagSet` cannot be built with an unknown bit set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument to check(): {detail}")]
    InvalidArgument { detail: String },
}

impl Error {
    pub(crate) fn invalid_argument(detail: impl Into<String>) -> Self {
        Error::InvalidArgument {
            detail: detail.into(),
        }
    }
}
