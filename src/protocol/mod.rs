//! Compositor-facing protocol seam
//!
//! The handshake state machine never talks to the transport directly. It
//! issues requests through the [`Compositor`] trait and consumes compositor
//! notifications as [`ShellEvent`] values, one dispatch entry point for all
//! of them.
//!
//! # Overview
//!
//! - [`Compositor`]: the requests this client sends (pool, buffer, surface,
//!   shell, liveness)
//! - [`ShellEvent`]: the events the session reacts to
//! - `recording::RecordingCompositor` (feature `testing`): a headless
//!   implementation that records requests and checks the backing object
//!   size at every pool declaration
//!
//! # Usage
//!
//! ```ignore
//! use shm_window::config::ClientConfig;
//! use shm_window::protocol::{recording::RecordingCompositor, ShellEvent};
//! use shm_window::session::Session;
//!
//! let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
//! session.start().unwrap();
//! session.handle(ShellEvent::ToplevelConfigure { width: 0, height: 0 }).unwrap();
//! session.handle(ShellEvent::SurfaceConfigure { serial: 1 }).unwrap();
//! session.render_frame().unwrap();
//! ```

#[cfg(any(test, feature = "testing"))]
pub mod recording;

use std::os::fd::BorrowedFd;

use crate::pool::PixelFormat;

/// Client-side identifier carried by every buffer so release events can be
/// matched back to it
pub type BufferId = u64;

/// Requests the session issues to the compositor
///
/// Implementations only forward; every precondition is checked by the
/// caller before a request reaches this trait.
pub trait Compositor {
    /// Compositor-side handle for a shared-memory pool
    type Pool;
    /// Compositor-side handle for a buffer carved from a pool
    type Buffer;

    fn create_pool(&mut self, fd: BorrowedFd<'_>, size: i32) -> Self::Pool;
    fn resize_pool(&mut self, pool: &Self::Pool, size: i32);
    fn destroy_pool(&mut self, pool: Self::Pool);

    #[allow(clippy::too_many_arguments)]
    fn create_buffer(
        &mut self,
        pool: &Self::Pool,
        id: BufferId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: PixelFormat,
    ) -> Self::Buffer;
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn set_title(&mut self, title: &str);
    /// Attaches `buffer` to the surface at the origin
    fn attach(&mut self, buffer: &Self::Buffer);
    fn commit(&mut self);

    fn ack_configure(&mut self, serial: u32);
    fn pong(&mut self, serial: u32);

    fn destroy_toplevel(&mut self);
    fn destroy_xdg_surface(&mut self);
    fn destroy_surface(&mut self);
    fn disconnect(&mut self);
}

/// Compositor notifications consumed by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    /// Liveness check, must be echoed with the same serial
    Ping { serial: u32 },
    /// Proposed toplevel size; zero on an axis means "client chooses"
    ToplevelConfigure { width: i32, height: i32 },
    /// End of a configure sequence, must be acknowledged
    SurfaceConfigure { serial: u32 },
    /// The window should close
    Close,
    /// The compositor no longer reads from this buffer
    BufferReleased { id: BufferId },
}
