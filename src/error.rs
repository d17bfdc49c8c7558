//! Crate-wide error type.
//!
//! Every fallible operation in the core returns `Result<_, Error>`. Nothing
//! here panics on valid-shape input; the handful of `debug_assert!`s that
//! encode true invariants are backed by one of these variants so a release
//! build degrades to an error return instead of undefined behaviour.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The pool has no free slot and the uninitialized-slot counter has
    /// been exhausted.
    #[error("memory pool is full")]
    PoolFull,

    /// The requested allocation does not fit in one pool slot and no
    /// fallback allocation was permitted.
    #[error("allocation of {0} bytes is too large for a pool slot")]
    TooLarge(usize),

    /// A `SampleSpec` or `ChannelMap` failed validation.
    #[error("invalid sample spec or channel map: {0}")]
    InvalidSpec(String),

    /// A cross-process memblock reference was revoked by its exporter.
    #[error("memblock was revoked by its exporter")]
    Revoked,

    /// A lookup by name or id found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-blocking operation could not complete immediately.
    #[error("operation would block")]
    WouldBlock,

    /// Resampler engine construction failed.
    #[error("resampler init failed: {0}")]
    ResamplerInit(String),

    /// `NameRegistry::register` hit an existing name with `fail_on_collision`.
    #[error("name already registered: {0}")]
    NameCollision(String),

    /// A checked invariant did not hold; in a debug build this would have
    /// been an assertion failure.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    /// The device collaborator reported an I/O failure.
    #[error("device I/O error: {0}")]
    DeviceIo(String),

    /// A message could not be delivered because the peer (I/O thread or
    /// main thread) has gone away.
    #[error("message channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
