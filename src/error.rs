//! Error taxonomy for the client
//!
//! Every variant is terminal for the process. The binary maps each one to
//! an exit code through [`ClientError::exit_code`].

use std::io;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Shared-memory creation, sizing, or mapping failed
    #[error("shared memory allocation failed during {stage}: {source}")]
    Allocation {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// A pool was asked to declare more bytes than the backing region holds
    #[error("refusing to declare pool of {requested} bytes over a {capacity} byte region")]
    PoolOverflow { requested: u64, capacity: u64 },

    /// A buffer would reach past the end of the pool's declared size
    #[error("buffer at offset {offset} spanning {len} bytes exceeds pool size {declared}")]
    BufferOutOfBounds { offset: u64, len: u64, declared: u64 },

    /// Geometry that cannot be expressed on the wire
    #[error("invalid buffer layout: {0}")]
    InvalidLayout(String),

    /// A required global was not advertised by the compositor
    #[error("compositor does not advertise required global <{0}>")]
    MissingGlobal(&'static str),

    /// Connection bootstrap failed
    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[source] io::Error),

    /// The compositor reported a fatal protocol error
    #[error("fatal error: target_object={object} code={code} error={message}")]
    Protocol {
        object: String,
        code: u32,
        message: String,
    },

    /// The transport stopped being usable
    #[error("wayland transport failure: {0}")]
    Transport(#[source] io::Error),

    /// An operation was issued in a handshake state that does not allow it
    #[error("invalid handshake state: {0}")]
    InvalidState(String),
}

impl ClientError {
    pub(crate) fn allocation(stage: &'static str, source: io::Error) -> Self {
        ClientError::Allocation { stage, source }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Allocation { source, .. }
            | ClientError::Connect(source)
            | ClientError::Transport(source) => source.raw_os_error().unwrap_or(1),
            ClientError::PoolOverflow { .. }
            | ClientError::BufferOutOfBounds { .. }
            | ClientError::InvalidLayout(_)
            | ClientError::MissingGlobal(_)
            | ClientError::Protocol { .. }
            | ClientError::InvalidState(_) => libc::EINVAL,
        }
    }
}
