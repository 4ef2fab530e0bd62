//! # shm-window
//!
//! A minimal Wayland client that maps one toplevel window and paints it from
//! a shared-memory pixel buffer, keeping that buffer consistent with every
//! size the compositor proposes.
//!
//! ## Architecture
//!
//! - `shm`: anonymous shared memory region, mapped and growable
//! - `pool`: pool and buffer geometry over a region
//! - `protocol`: the compositor request surface the session drives
//! - `session`: handshake state machine and frame emission
//! - `render`: solid fills into the mapping
//! - `wayland`: connection, globals, and the dispatch loop
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shm_window::{wayland, ClientConfig};
//!
//! fn main() -> shm_window::Result<()> {
//!     wayland::run(ClientConfig::default())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod render;
pub mod session;
pub mod shm;
pub mod wayland;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use pool::{Buffer, BufferLayout, PixelFormat, Pool, Size};
pub use protocol::{Compositor, ShellEvent};
pub use session::{HandshakeState, Session};
pub use shm::SharedRegion;

/// Crate version as reported in the startup banner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
