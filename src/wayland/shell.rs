//! [`Compositor`] backed by live wayland-client proxies

use std::os::fd::BorrowedFd;

use log::{debug, warn};
use wayland_client::{
    protocol::{
        wl_buffer::WlBuffer,
        wl_output::WlOutput,
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
    Connection, QueueHandle,
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel, xdg_wm_base::XdgWmBase,
};

use super::globals::BoundGlobals;
use super::App;
use crate::pool::PixelFormat;
use crate::protocol::{BufferId, Compositor};

impl From<PixelFormat> for wl_shm::Format {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
            PixelFormat::Argb8888 => wl_shm::Format::Argb8888,
        }
    }
}

/// Surface, xdg surface and toplevel for the single window, plus the
/// globals needed to issue requests on them
pub struct WaylandShell {
    conn: Connection,
    qh: QueueHandle<App>,
    shm: WlShm,
    wm_base: XdgWmBase,
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    _output: Option<WlOutput>,
}

impl WaylandShell {
    /// Creates the surface and gives it the toplevel role
    pub fn new(conn: Connection, qh: QueueHandle<App>, globals: BoundGlobals) -> Self {
        let surface = globals.compositor.create_surface(&qh, ());
        let xdg_surface = globals.wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        debug!("Created toplevel surface {:?}", surface);

        Self {
            conn,
            qh,
            shm: globals.shm,
            wm_base: globals.wm_base,
            surface,
            xdg_surface,
            toplevel,
            _output: globals.output,
        }
    }
}

impl Compositor for WaylandShell {
    type Pool = WlShmPool;
    type Buffer = WlBuffer;

    fn create_pool(&mut self, fd: BorrowedFd<'_>, size: i32) -> WlShmPool {
        self.shm.create_pool(fd, size, &self.qh, ())
    }

    fn resize_pool(&mut self, pool: &WlShmPool, size: i32) {
        pool.resize(size);
    }

    fn destroy_pool(&mut self, pool: WlShmPool) {
        pool.destroy();
    }

    fn create_buffer(
        &mut self,
        pool: &WlShmPool,
        id: BufferId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: PixelFormat,
    ) -> WlBuffer {
        pool.create_buffer(offset, width, height, stride, format.into(), &self.qh, id)
    }

    fn destroy_buffer(&mut self, buffer: WlBuffer) {
        buffer.destroy();
    }

    fn set_title(&mut self, title: &str) {
        self.toplevel.set_title(title.to_string());
    }

    fn attach(&mut self, buffer: &WlBuffer) {
        self.surface.attach(Some(buffer), 0, 0);
    }

    fn commit(&mut self) {
        self.surface.commit();
    }

    fn ack_configure(&mut self, serial: u32) {
        self.xdg_surface.ack_configure(serial);
    }

    fn pong(&mut self, serial: u32) {
        self.wm_base.pong(serial);
    }

    fn destroy_toplevel(&mut self) {
        self.toplevel.destroy();
    }

    fn destroy_xdg_surface(&mut self) {
        self.xdg_surface.destroy();
    }

    fn destroy_surface(&mut self) {
        self.surface.destroy();
    }

    /// Flushes pending requests; the socket closes when the last
    /// `Connection` handle drops at the end of [`super::run`]
    fn disconnect(&mut self) {
        if let Err(e) = self.conn.flush() {
            warn!("Failed to flush teardown requests: {}", e);
        }
    }
}
