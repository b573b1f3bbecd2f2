//! The single error sink described in the core's error table. Every fallible
//! entry point in this crate returns [`Result<T>`] instead of raising through
//! a callback; [`raise`] and [`raise_warn`] centralize the "log, then return
//! `Err`" behavior so the logging story stays consistent no matter where the
//! error originates.

use thiserror::Error;

/// One of the core's error codes. `Display` gives the human-readable message
/// that gets logged at the raise site.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("allocator id {0} refers to no live allocator")]
    BadAllocId(i64),
    #[error("allocation of {size} bytes failed")]
    NoMem { size: usize },
    #[error("allocator registry is full")]
    NoSlots,
    #[error("invalid argument: {0}")]
    BadValue(&'static str),
    #[error("size computation overflowed")]
    BadLength,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Log `err` at `error` level and return it as an `Err`. Use for failures
/// that indicate a caller bug or an unrecoverable condition (bad id, overflow).
pub(crate) fn raise<T>(err: Error) -> Result<T> {
    log::error!("{err}");
    Err(err)
}

/// Log `err` at `warn` level and return it as an `Err`. Use for failures a
/// well-behaved caller can reasonably expect and recover from (registry full,
/// allocation failure).
pub(crate) fn raise_warn<T>(err: Error) -> Result<T> {
    log::warn!("{err}");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        assert!(!Error::BadAllocId(7).to_string().is_empty());
        assert!(!Error::NoMem { size: 16 }.to_string().is_empty());
        assert!(!Error::NoSlots.to_string().is_empty());
        assert!(!Error::BadValue("base").to_string().is_empty());
        assert!(!Error::BadLength.to_string().is_empty());
    }
}
