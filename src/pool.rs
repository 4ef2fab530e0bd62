//! Pool and buffer descriptors
//!
//! A [`Pool`] is the compositor's view of a [`SharedRegion`]. Its declared
//! size may never exceed the region's capacity; [`Pool::grow_to`] refuses
//! any request that would break that. A [`Buffer`] is a rectangular view
//! carved from the pool and must lie entirely within the declared size.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::protocol::{BufferId, Compositor};
use crate::shm::SharedRegion;

/// Pixel formats every compositor must support for shm buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit RGB, upper byte ignored
    #[default]
    Xrgb8888,
    /// 32-bit RGB with alpha
    Argb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 | PixelFormat::Argb8888 => 4,
        }
    }
}

/// Logical surface size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Validated buffer geometry
///
/// Every field fits the wire's signed 32-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    size: Size,
    stride: u32,
    format: PixelFormat,
    len: u64,
}

impl BufferLayout {
    /// Tightly packed rows: `stride == width * bytes_per_pixel`
    pub fn new(size: Size, format: PixelFormat) -> Result<Self> {
        let stride = size
            .width
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| ClientError::InvalidLayout(format!("stride of {} overflows", size)))?;
        Self::with_stride(size, stride, format)
    }

    pub fn with_stride(size: Size, stride: u32, format: PixelFormat) -> Result<Self> {
        if size.is_empty() {
            return Err(ClientError::InvalidLayout(format!("empty buffer {}", size)));
        }
        let min_stride = u64::from(size.width) * u64::from(format.bytes_per_pixel());
        if u64::from(stride) < min_stride {
            return Err(ClientError::InvalidLayout(format!(
                "stride {} shorter than a {} pixel row",
                stride, size.width
            )));
        }

        let len = u64::from(stride) * u64::from(size.height);
        for (what, value) in [
            ("width", u64::from(size.width)),
            ("height", u64::from(size.height)),
            ("stride", u64::from(stride)),
            ("length", len),
        ] {
            to_wire(value).map_err(|_| {
                ClientError::InvalidLayout(format!("{} {} exceeds the protocol range", what, value))
            })?;
        }

        Ok(Self {
            size,
            stride,
            format,
            len,
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes spanned by the buffer: `stride * height`
    pub fn len(&self) -> u64 {
        self.len
    }
}

/// Converts a byte count to the protocol's signed 32-bit field
pub(crate) fn to_wire(value: u64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ClientError::InvalidLayout(format!("{} exceeds the protocol range", value)))
}

/// Compositor-side registration of a shared region
#[derive(Debug)]
pub struct Pool<P> {
    handle: P,
    declared_size: u64,
}

impl<P> Pool<P> {
    /// Registers the region at its current capacity
    pub fn create<C>(compositor: &mut C, region: &SharedRegion) -> Result<Self>
    where
        C: Compositor<Pool = P>,
    {
        let size = region.capacity();
        let handle = compositor.create_pool(region.fd(), to_wire(size)?);
        info!("Created shm pool of {} bytes", size);
        Ok(Self {
            handle,
            declared_size: size,
        })
    }

    /// Declares a larger pool size to the compositor
    ///
    /// Fails with [`ClientError::PoolOverflow`] when `new_size` exceeds the
    /// region's capacity; the region has to grow first. Sizes at or below the
    /// current declaration are a no-op since pools cannot shrink.
    pub fn grow_to<C>(&mut self, compositor: &mut C, region: &SharedRegion, new_size: u64) -> Result<bool>
    where
        C: Compositor<Pool = P>,
    {
        if new_size > region.capacity() {
            return Err(ClientError::PoolOverflow {
                requested: new_size,
                capacity: region.capacity(),
            });
        }
        if new_size <= self.declared_size {
            debug!(
                "Pool already declares {} bytes, {} requested",
                self.declared_size, new_size
            );
            return Ok(false);
        }

        compositor.resize_pool(&self.handle, to_wire(new_size)?);
        info!("Resized shm pool from {} to {} bytes", self.declared_size, new_size);
        self.declared_size = new_size;
        Ok(true)
    }

    /// Carves a buffer at `offset` with the given geometry
    pub fn carve_buffer<C>(
        &self,
        compositor: &mut C,
        id: BufferId,
        offset: u64,
        layout: BufferLayout,
    ) -> Result<Buffer<C::Buffer>>
    where
        C: Compositor<Pool = P>,
    {
        let end = offset.checked_add(layout.len()).filter(|end| *end <= self.declared_size);
        if end.is_none() {
            return Err(ClientError::BufferOutOfBounds {
                offset,
                len: layout.len(),
                declared: self.declared_size,
            });
        }

        let size = layout.size();
        let handle = compositor.create_buffer(
            &self.handle,
            id,
            to_wire(offset)?,
            to_wire(u64::from(size.width))?,
            to_wire(u64::from(size.height))?,
            to_wire(u64::from(layout.stride()))?,
            layout.format(),
        );
        debug!(
            "Carved buffer #{} {} stride={} at offset {}",
            id,
            size,
            layout.stride(),
            offset
        );

        Ok(Buffer {
            handle,
            id,
            offset,
            layout,
        })
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn destroy<C>(self, compositor: &mut C)
    where
        C: Compositor<Pool = P>,
    {
        compositor.destroy_pool(self.handle);
    }
}

/// A rectangular pixel view carved from a pool
#[derive(Debug)]
pub struct Buffer<B> {
    handle: B,
    id: BufferId,
    offset: u64,
    layout: BufferLayout,
}

impl<B> Buffer<B> {
    pub fn handle(&self) -> &B {
        &self.handle
    }

    pub fn into_handle(self) -> B {
        self.handle
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn size(&self) -> Size {
        self.layout.size()
    }

    pub fn stride(&self) -> u32 {
        self.layout.stride()
    }

    /// One past the last byte this buffer covers
    pub fn end(&self) -> u64 {
        self.offset + self.layout.len()
    }
}
