//! Wayland transport
//!
//! Connects to the compositor named by the environment, binds the globals,
//! and runs the blocking dispatch loop. Each `Dispatch` impl below only
//! translates a protocol event into a [`ShellEvent`] and hands it to the
//! session; all decisions live in [`crate::session`].

pub mod globals;
pub mod shell;

use std::io;

use log::{debug, error, info, trace, warn};
use wayland_backend::client::WaylandError;
use wayland_client::{
    delegate_noop,
    globals::{registry_queue_init, GlobalError, GlobalListContents},
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_compositor::WlCompositor,
        wl_output::WlOutput,
        wl_registry::{self, WlRegistry},
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
    Connection, Dispatch, DispatchError, EventQueue, QueueHandle,
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{BufferId, ShellEvent};
use crate::session::Session;

use self::globals::BoundGlobals;
use self::shell::WaylandShell;

/// Dispatch state: the session plus the first error an event produced
pub struct App {
    session: Session<WaylandShell>,
    error: Option<ClientError>,
}

impl App {
    fn deliver(&mut self, event: ShellEvent) {
        if self.error.is_some() {
            trace!("Dropping {:?} after a fatal error", event);
            return;
        }
        if let Err(e) = self.session.handle(event) {
            error!("Handling {:?} failed: {}", event, e);
            self.error = Some(e);
        }
    }
}

/// Runs the client until the window closes or the connection fails
///
/// Teardown runs exactly once on every exit path.
pub fn run(config: ClientConfig) -> Result<()> {
    let conn = Connection::connect_to_env().map_err(|e| ClientError::Connect(io::Error::other(e)))?;
    info!("Connected to Wayland display");

    let (globals, mut queue) = registry_queue_init::<App>(&conn).map_err(|e| match e {
        GlobalError::Backend(e) => backend_error(e),
        GlobalError::InvalidId(e) => ClientError::Transport(io::Error::other(e)),
    })?;
    let qh = queue.handle();

    let bound = BoundGlobals::bind(&globals, &qh)?;
    let shell = WaylandShell::new(conn, qh, bound);

    let mut app = App {
        session: Session::new(config, shell),
        error: None,
    };
    app.session.start()?;

    let result = drive(&mut queue, &mut app);
    app.session.shutdown();
    result
}

/// Blocks for events, lets the session react, then submits a frame
fn drive(queue: &mut EventQueue<App>, app: &mut App) -> Result<()> {
    loop {
        if let Err(e) = queue.blocking_dispatch(app) {
            return match dispatch_error(e) {
                ClientError::Transport(e) if is_hangup(&e) => {
                    warn!("Compositor closed the connection: {}", e);
                    Ok(())
                }
                e => Err(e),
            };
        }
        if let Some(e) = app.error.take() {
            return Err(e);
        }
        if app.session.is_terminated() {
            return Ok(());
        }
        app.session.render_frame()?;
    }
}

fn is_hangup(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

fn dispatch_error(err: DispatchError) -> ClientError {
    match err {
        DispatchError::Backend(e) => backend_error(e),
        other => ClientError::Transport(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
    }
}

fn backend_error(err: WaylandError) -> ClientError {
    match err {
        WaylandError::Protocol(e) => ClientError::Protocol {
            object: format!("{}@{}", e.object_interface, e.object_id),
            code: e.code,
            message: e.message,
        },
        WaylandError::Io(e) => ClientError::Transport(e),
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for App {
    fn event(
        _state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => debug!(
                "New global after startup: name={} interface={} version={}",
                name, interface, version
            ),
            wl_registry::Event::GlobalRemove { name } => {
                info!("<- global-remove {:?} name:{}", registry, name)
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for App {
    fn event(
        _state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            trace!("wl_shm advertises format {:?}", format);
        }
    }
}

impl Dispatch<WlBuffer, BufferId> for App {
    fn event(
        state: &mut Self,
        _buffer: &WlBuffer,
        event: wl_buffer::Event,
        id: &BufferId,
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.deliver(ShellEvent::BufferReleased { id: *id });
        }
    }
}

impl Dispatch<XdgWmBase, ()> for App {
    fn event(
        state: &mut Self,
        _wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            state.deliver(ShellEvent::Ping { serial });
        }
    }
}

impl Dispatch<XdgSurface, ()> for App {
    fn event(
        state: &mut Self,
        _xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.deliver(ShellEvent::SurfaceConfigure { serial });
        }
    }
}

impl Dispatch<XdgToplevel, ()> for App {
    fn event(
        state: &mut Self,
        _toplevel: &XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<App>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state.deliver(ShellEvent::ToplevelConfigure { width, height })
            }
            xdg_toplevel::Event::Close => state.deliver(ShellEvent::Close),
            other => trace!("Unhandled toplevel event {:?}", other),
        }
    }
}

delegate_noop!(App: WlCompositor);
delegate_noop!(App: WlShmPool);
delegate_noop!(App: ignore WlSurface);
delegate_noop!(App: ignore WlOutput);
