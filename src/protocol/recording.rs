//! Headless compositor that records requests
//!
//! Every pool declaration is stamped with the size of the backing object at
//! the moment the request was issued, so a test can check the pool never
//! claimed more memory than the object actually had.

use std::fs::File;
use std::os::fd::BorrowedFd;

use log::trace;

use super::{BufferId, Compositor};
use crate::pool::PixelFormat;

/// One request as issued by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreatePool {
        pool: u32,
        size: i32,
        /// Size of the shared object when the request was issued
        backing: u64,
    },
    ResizePool {
        pool: u32,
        size: i32,
        backing: u64,
    },
    DestroyPool {
        pool: u32,
    },
    CreateBuffer {
        buffer: BufferId,
        pool: u32,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: PixelFormat,
    },
    DestroyBuffer {
        buffer: BufferId,
    },
    SetTitle(String),
    Attach {
        buffer: BufferId,
    },
    Commit,
    AckConfigure {
        serial: u32,
    },
    Pong {
        serial: u32,
    },
    DestroyToplevel,
    DestroyXdgSurface,
    DestroySurface,
    Disconnect,
}

impl Request {
    /// True for a pool declaration larger than its backing object
    pub fn overcommits(&self) -> bool {
        match self {
            Request::CreatePool { size, backing, .. } | Request::ResizePool { size, backing, .. } => {
                u64::try_from(*size).map_or(true, |size| size > *backing)
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct RecordingPool {
    id: u32,
    backing: Option<File>,
}

impl RecordingPool {
    fn backing_len(&self) -> u64 {
        self.backing
            .as_ref()
            .and_then(|file| file.metadata().ok())
            .map_or(0, |meta| meta.len())
    }
}

#[derive(Debug)]
pub struct RecordingBuffer {
    id: BufferId,
}

impl RecordingBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct RecordingCompositor {
    requests: Vec<Request>,
    next_pool: u32,
}

impl RecordingCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything issued so far, in order
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Drains the log
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// Pool declarations that claimed more than the backing object held
    pub fn overcommits(&self) -> Vec<&Request> {
        self.requests.iter().filter(|r| r.overcommits()).collect()
    }

    fn record(&mut self, request: Request) {
        trace!("recorded {:?}", request);
        self.requests.push(request);
    }
}

impl Compositor for RecordingCompositor {
    type Pool = RecordingPool;
    type Buffer = RecordingBuffer;

    fn create_pool(&mut self, fd: BorrowedFd<'_>, size: i32) -> RecordingPool {
        self.next_pool += 1;
        let pool = RecordingPool {
            id: self.next_pool,
            backing: fd.try_clone_to_owned().ok().map(File::from),
        };
        let backing = pool.backing_len();
        self.record(Request::CreatePool {
            pool: pool.id,
            size,
            backing,
        });
        pool
    }

    fn resize_pool(&mut self, pool: &RecordingPool, size: i32) {
        let backing = pool.backing_len();
        self.record(Request::ResizePool {
            pool: pool.id,
            size,
            backing,
        });
    }

    fn destroy_pool(&mut self, pool: RecordingPool) {
        self.record(Request::DestroyPool { pool: pool.id });
    }

    fn create_buffer(
        &mut self,
        pool: &RecordingPool,
        id: BufferId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: PixelFormat,
    ) -> RecordingBuffer {
        self.record(Request::CreateBuffer {
            buffer: id,
            pool: pool.id,
            offset,
            width,
            height,
            stride,
            format,
        });
        RecordingBuffer { id }
    }

    fn destroy_buffer(&mut self, buffer: RecordingBuffer) {
        self.record(Request::DestroyBuffer { buffer: buffer.id });
    }

    fn set_title(&mut self, title: &str) {
        self.record(Request::SetTitle(title.to_string()));
    }

    fn attach(&mut self, buffer: &RecordingBuffer) {
        self.record(Request::Attach { buffer: buffer.id });
    }

    fn commit(&mut self) {
        self.record(Request::Commit);
    }

    fn ack_configure(&mut self, serial: u32) {
        self.record(Request::AckConfigure { serial });
    }

    fn pong(&mut self, serial: u32) {
        self.record(Request::Pong { serial });
    }

    fn destroy_toplevel(&mut self) {
        self.record(Request::DestroyToplevel);
    }

    fn destroy_xdg_surface(&mut self) {
        self.record(Request::DestroyXdgSurface);
    }

    fn destroy_surface(&mut self) {
        self.record(Request::DestroySurface);
    }

    fn disconnect(&mut self) {
        self.record(Request::Disconnect);
    }
}
