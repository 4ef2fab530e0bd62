//! Handshake state machine and frame emission
//!
//! The session owns the three resources that have to stay consistent: the
//! shared region, the pool declared over it, and the buffer carved from the
//! pool. Every compositor event goes through [`Session::handle`] and runs to
//! completion before the next one is looked at.
//!
//! # State machine
//!
//! ```text
//! Connecting -> Negotiating -> Ready <-> Resizing
//!                    |           |
//!                    +-----------+--> Closing -> Terminated
//! ```
//!
//! A resize always runs in this order: grow the region, declare the larger
//! pool, carve the new buffer. The pool never declares bytes the region does
//! not hold, and no buffer reaches past the pool.

use log::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pool::{Buffer, BufferLayout, PixelFormat, Pool, Size};
use crate::protocol::{BufferId, Compositor, ShellEvent};
use crate::render;
use crate::shm::SharedRegion;

/// Fill used when the configured colour cannot be parsed
const FALLBACK_FILL: u32 = 0xFFFF_0000;

/// Handshake states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Globals not bound yet
    Connecting,
    /// Toplevel requested, waiting for the first configure sequence
    Negotiating,
    /// A buffer matching the negotiated size exists
    Ready,
    /// Region, pool and buffer are being brought to a new size
    Resizing,
    /// Close requested, teardown in progress
    Closing,
    /// Torn down; no further requests are issued
    Terminated,
}

/// Negotiated logical size, independent of the buffer currently attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSession {
    /// Size proposed by the latest toplevel configure
    pub pending: Size,
    /// Whether the latest configure sequence has been acknowledged
    pub acked: bool,
    /// Serial of the last acknowledged surface configure
    pub last_serial: Option<u32>,
}

pub struct Session<C: Compositor> {
    compositor: C,
    title: String,
    default_size: Size,
    format: PixelFormat,
    fill: u32,
    state: HandshakeState,
    surface: SurfaceSession,
    region: Option<SharedRegion>,
    pool: Option<Pool<C::Pool>>,
    buffer: Option<Buffer<C::Buffer>>,
    /// Superseded buffers the compositor may still be reading
    retired: Vec<Buffer<C::Buffer>>,
    /// Current buffer committed and not yet released by the compositor
    busy: Option<BufferId>,
    next_buffer_id: BufferId,
    frames: u64,
}

impl<C: Compositor> Session<C> {
    pub fn new(config: ClientConfig, compositor: C) -> Self {
        let fill = config.render.fill_pixel().unwrap_or_else(|| {
            warn!(
                "Unparseable fill colour {}, using {:#010x}",
                config.render.fill_color, FALLBACK_FILL
            );
            FALLBACK_FILL
        });
        let default_size = config.window.default_size();

        Self {
            compositor,
            title: config.window.title,
            default_size,
            format: config.render.format,
            fill,
            state: HandshakeState::Connecting,
            surface: SurfaceSession {
                pending: default_size,
                acked: false,
                last_serial: None,
            },
            region: None,
            pool: None,
            buffer: None,
            retired: Vec::new(),
            busy: None,
            next_buffer_id: 1,
            frames: 0,
        }
    }

    /// Required globals are bound: title the toplevel and issue the initial
    /// empty commit that asks the compositor for a configure
    pub fn start(&mut self) -> Result<()> {
        if self.state != HandshakeState::Connecting {
            return Err(ClientError::InvalidState(format!(
                "start() called in {:?}",
                self.state
            )));
        }

        self.compositor.set_title(&self.title);
        self.compositor.commit();
        self.transition(HandshakeState::Negotiating);
        Ok(())
    }

    /// Single dispatch entry point for compositor events
    pub fn handle(&mut self, event: ShellEvent) -> Result<()> {
        if self.state == HandshakeState::Terminated {
            trace!("Ignoring {:?} after teardown", event);
            return Ok(());
        }

        match event {
            ShellEvent::Ping { serial } => {
                self.compositor.pong(serial);
                trace!("Ponged serial {}", serial);
                Ok(())
            }
            ShellEvent::ToplevelConfigure { width, height } => {
                self.on_toplevel_configure(width, height)
            }
            ShellEvent::SurfaceConfigure { serial } => self.on_surface_configure(serial),
            ShellEvent::Close => {
                info!("Close event received");
                self.shutdown();
                Ok(())
            }
            ShellEvent::BufferReleased { id } => {
                self.on_buffer_released(id);
                Ok(())
            }
        }
    }

    /// Writes the current mapping and attaches/commits the current buffer
    ///
    /// Returns whether a frame was submitted. Nothing is drawn until the
    /// session is `Ready` and the latest configure has been acknowledged.
    pub fn render_frame(&mut self) -> Result<bool> {
        if self.state != HandshakeState::Ready || !self.surface.acked {
            return Ok(false);
        }
        let (Some(region), Some(buffer)) = (self.region.as_mut(), self.buffer.as_ref()) else {
            return Err(ClientError::InvalidState("Ready without a buffer".into()));
        };

        render::fill_solid(region.pixels_mut(), buffer.offset(), buffer.layout(), self.fill);
        self.compositor.attach(buffer.handle());
        self.compositor.commit();
        self.busy = Some(buffer.id());
        self.frames += 1;
        trace!("Committed frame {} with buffer #{}", self.frames, buffer.id());
        Ok(true)
    }

    /// Tears the session down once; later calls do nothing
    ///
    /// Destroy order: toplevel, xdg surface, surface, then buffers and the
    /// pool, then the connection.
    pub fn shutdown(&mut self) {
        if self.state == HandshakeState::Terminated {
            return;
        }
        self.transition(HandshakeState::Closing);

        self.compositor.destroy_toplevel();
        self.compositor.destroy_xdg_surface();
        self.compositor.destroy_surface();

        for buffer in self.buffer.take().into_iter().chain(self.retired.drain(..)) {
            self.compositor.destroy_buffer(buffer.into_handle());
        }
        if let Some(pool) = self.pool.take() {
            pool.destroy(&mut self.compositor);
        }
        self.compositor.disconnect();
        self.region = None;

        self.transition(HandshakeState::Terminated);
        info!("Session terminated after {} frames", self.frames);
    }

    fn on_toplevel_configure(&mut self, width: i32, height: i32) -> Result<()> {
        match self.state {
            HandshakeState::Connecting | HandshakeState::Negotiating => {
                self.surface.pending = resolve_size(width, height, self.default_size);
                self.surface.acked = false;
                debug!(
                    "Initial configure proposes {}x{}, using {}",
                    width, height, self.surface.pending
                );
                Ok(())
            }
            HandshakeState::Ready => {
                let current = self
                    .buffer
                    .as_ref()
                    .map_or(self.surface.pending, |buffer| buffer.size());
                let size = resolve_size(width, height, current);
                self.surface.pending = size;
                self.surface.acked = false;

                if size == current {
                    trace!("Configure keeps size {}", size);
                    Ok(())
                } else {
                    self.resize(size)
                }
            }
            HandshakeState::Resizing | HandshakeState::Closing | HandshakeState::Terminated => {
                warn!("Toplevel configure ignored in {:?}", self.state);
                Ok(())
            }
        }
    }

    fn on_surface_configure(&mut self, serial: u32) -> Result<()> {
        match self.state {
            HandshakeState::Negotiating => {
                self.allocate(self.surface.pending)?;
                self.ack(serial);
                self.transition(HandshakeState::Ready);
                Ok(())
            }
            HandshakeState::Ready => {
                self.ack(serial);
                Ok(())
            }
            HandshakeState::Connecting => {
                warn!("Surface configure {} before negotiation started", serial);
                self.ack(serial);
                Ok(())
            }
            HandshakeState::Resizing | HandshakeState::Closing | HandshakeState::Terminated => {
                warn!("Surface configure {} ignored in {:?}", serial, self.state);
                Ok(())
            }
        }
    }

    fn ack(&mut self, serial: u32) {
        self.compositor.ack_configure(serial);
        self.surface.acked = true;
        self.surface.last_serial = Some(serial);
        trace!("Acked configure serial {}", serial);
    }

    /// First allocation: region, pool, and buffer at offset 0
    fn allocate(&mut self, size: Size) -> Result<()> {
        let layout = BufferLayout::new(size, self.format)?;
        let region = SharedRegion::create(size.pixel_count(), self.format.bytes_per_pixel())?;
        let pool = Pool::create(&mut self.compositor, &region)?;
        let id = self.take_buffer_id();
        let buffer = pool.carve_buffer(&mut self.compositor, id, 0, layout)?;

        info!("Allocated {} buffer #{} in a {} byte pool", size, id, pool.declared_size());
        self.region = Some(region);
        self.pool = Some(pool);
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Grow region, then pool, then carve; in that order and only that order
    fn resize(&mut self, size: Size) -> Result<()> {
        let layout = BufferLayout::new(size, self.format)?;
        self.transition(HandshakeState::Resizing);
        info!("Resizing buffer to {}", size);

        let id = self.take_buffer_id();
        let (Some(region), Some(pool)) = (self.region.as_mut(), self.pool.as_mut()) else {
            return Err(ClientError::InvalidState("resize before allocation".into()));
        };

        region.grow(size.pixel_count())?;
        pool.grow_to(&mut self.compositor, region, layout.len())?;
        let buffer = pool.carve_buffer(&mut self.compositor, id, 0, layout)?;

        if let Some(old) = self.buffer.replace(buffer) {
            self.retire(old);
        }
        self.transition(HandshakeState::Ready);
        Ok(())
    }

    /// Keeps a superseded buffer until the compositor releases it, or drops
    /// it right away if the compositor does not hold it
    fn retire(&mut self, buffer: Buffer<C::Buffer>) {
        if self.busy == Some(buffer.id()) {
            debug!("Retiring buffer #{} until released", buffer.id());
            self.retired.push(buffer);
        } else {
            debug!("Destroying idle buffer #{}", buffer.id());
            self.compositor.destroy_buffer(buffer.into_handle());
        }
    }

    fn on_buffer_released(&mut self, id: BufferId) {
        if self.busy == Some(id) {
            self.busy = None;
        }
        match self.retired.iter().position(|buffer| buffer.id() == id) {
            Some(index) => {
                let buffer = self.retired.swap_remove(index);
                self.compositor.destroy_buffer(buffer.into_handle());
                debug!("Destroyed released buffer #{}", id);
            }
            None => trace!("Buffer #{} released", id),
        }
    }

    fn take_buffer_id(&mut self) -> BufferId {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        id
    }

    fn transition(&mut self, new_state: HandshakeState) {
        if self.state != new_state {
            debug!("Session state transition: {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == HandshakeState::Terminated
    }

    pub fn surface(&self) -> &SurfaceSession {
        &self.surface
    }

    pub fn region(&self) -> Option<&SharedRegion> {
        self.region.as_ref()
    }

    pub fn pool(&self) -> Option<&Pool<C::Pool>> {
        self.pool.as_ref()
    }

    pub fn buffer(&self) -> Option<&Buffer<C::Buffer>> {
        self.buffer.as_ref()
    }

    /// Number of superseded buffers awaiting release
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut C {
        &mut self.compositor
    }
}

/// Applies a configure proposal; non-positive axes keep `fallback`
fn resolve_size(width: i32, height: i32, fallback: Size) -> Size {
    let pick = |proposed: i32, fallback: u32| {
        u32::try_from(proposed)
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(fallback)
    };
    Size::new(pick(width, fallback.width), pick(height, fallback.height))
}

#[cfg(test)]
mod tests;
