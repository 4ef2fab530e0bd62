//! Global discovery and binding
//!
//! The compositor advertises `(name, interface, version)` tuples. The client
//! binds exactly `wl_shm`, `wl_compositor`, `xdg_wm_base`, and the first
//! `wl_output` if one exists, each capped at the version this client speaks.

use log::info;
use wayland_client::{
    globals::GlobalList,
    protocol::{wl_compositor::WlCompositor, wl_output::WlOutput, wl_shm::WlShm},
    QueueHandle,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use super::App;
use crate::error::{ClientError, Result};

const SHM_VERSION: u32 = 1;
const COMPOSITOR_VERSION: u32 = 4;
const WM_BASE_VERSION: u32 = 1;
const OUTPUT_VERSION: u32 = 2;

/// A global as it will be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertised {
    pub name: u32,
    pub version: u32,
}

/// Globals seen so far, one slot per interface the client cares about
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub shm: Option<Advertised>,
    pub compositor: Option<Advertised>,
    pub wm_base: Option<Advertised>,
    pub output: Option<Advertised>,
}

/// The three globals the client cannot run without, plus the optional output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Required {
    pub shm: Advertised,
    pub compositor: Advertised,
    pub wm_base: Advertised,
    pub output: Option<Advertised>,
}

impl Capabilities {
    /// Records an advertised global; returns whether the client uses it
    pub fn offer(&mut self, name: u32, interface: &str, version: u32) -> bool {
        let (slot, max) = match interface {
            "wl_shm" => (&mut self.shm, SHM_VERSION),
            "wl_compositor" => (&mut self.compositor, COMPOSITOR_VERSION),
            "xdg_wm_base" => (&mut self.wm_base, WM_BASE_VERSION),
            "wl_output" => (&mut self.output, OUTPUT_VERSION),
            _ => return false,
        };
        if slot.is_none() {
            *slot = Some(Advertised {
                name,
                version: version.min(max),
            });
        }
        true
    }

    pub fn require(&self) -> Result<Required> {
        Ok(Required {
            shm: self.shm.ok_or(ClientError::MissingGlobal("wl_shm"))?,
            compositor: self
                .compositor
                .ok_or(ClientError::MissingGlobal("wl_compositor"))?,
            wm_base: self.wm_base.ok_or(ClientError::MissingGlobal("xdg_wm_base"))?,
            output: self.output,
        })
    }
}

/// Proxies for every bound global
pub struct BoundGlobals {
    pub shm: WlShm,
    pub compositor: WlCompositor,
    pub wm_base: XdgWmBase,
    pub output: Option<WlOutput>,
}

impl BoundGlobals {
    pub fn bind(globals: &GlobalList, qh: &QueueHandle<App>) -> Result<Self> {
        let mut caps = Capabilities::default();
        for global in globals.contents().clone_list() {
            caps.offer(global.name, &global.interface, global.version);
        }
        let required = caps.require()?;
        let registry = globals.registry();

        info!(
            "Binding <wl_shm> using name={} version={}",
            required.shm.name, required.shm.version
        );
        let shm = registry.bind::<WlShm, _, _>(required.shm.name, required.shm.version, qh, ());

        info!(
            "Binding <wl_compositor> using name={} version={}",
            required.compositor.name, required.compositor.version
        );
        let compositor = registry.bind::<WlCompositor, _, _>(
            required.compositor.name,
            required.compositor.version,
            qh,
            (),
        );

        info!(
            "Binding <xdg_wm_base> using name={} version={}",
            required.wm_base.name, required.wm_base.version
        );
        let wm_base = registry.bind::<XdgWmBase, _, _>(
            required.wm_base.name,
            required.wm_base.version,
            qh,
            (),
        );

        let output = required.output.map(|output| {
            info!(
                "Binding <wl_output> using name={} version={}",
                output.name, output.version
            );
            registry.bind::<WlOutput, _, _>(output.name, output.version, qh, ())
        });

        Ok(Self {
            shm,
            compositor,
            wm_base,
            output,
        })
    }
}
