//! Growable shared-memory region backing the pixel pool
//!
//! The region is a POSIX shared-memory object that is unlinked right after
//! creation, so only the file descriptor keeps it alive. The mapping is only
//! reachable through `&mut self`, which means nothing can hold a view across
//! a [`SharedRegion::grow`] that replaces it.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};

use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{ClientError, Result};

/// Attempts at finding an unused object name before giving up
const NAME_ATTEMPTS: usize = 8;

/// Length of the random part of the object name
const NAME_LEN: usize = 24;

/// Shared-memory object mapped read-write into this process
#[derive(Debug)]
pub struct SharedRegion {
    file: File,
    capacity: u64,
    bytes_per_pixel: u32,
    map: MmapMut,
}

impl SharedRegion {
    /// Allocates a region large enough for `initial_pixels` pixels
    pub fn create(initial_pixels: u64, bytes_per_pixel: u32) -> Result<Self> {
        let size = pixels_to_bytes(initial_pixels, bytes_per_pixel)?;
        if size == 0 {
            return Err(ClientError::InvalidLayout(
                "shared region must hold at least one pixel".into(),
            ));
        }

        let file = open_anonymous()?;
        file.set_len(size)
            .map_err(|e| ClientError::allocation("ftruncate", e))?;
        let map = map_file(&file, size)?;

        info!("Allocated shared region of {} bytes", size);

        Ok(Self {
            file,
            capacity: size,
            bytes_per_pixel,
            map,
        })
    }

    /// Grows the region to hold `new_pixels` pixels
    ///
    /// Requests at or below the current capacity do nothing. Returns whether
    /// the backing object actually grew.
    pub fn grow(&mut self, new_pixels: u64) -> Result<bool> {
        let size = pixels_to_bytes(new_pixels, self.bytes_per_pixel)?;
        if size <= self.capacity {
            debug!(
                "Shared region already holds {} bytes, {} requested",
                self.capacity, size
            );
            return Ok(false);
        }

        self.file
            .set_len(size)
            .map_err(|e| ClientError::allocation("ftruncate", e))?;
        // Replacing the map unmaps the old window.
        self.map = map_file(&self.file, size)?;

        info!("Grew shared region from {} to {} bytes", self.capacity, size);
        self.capacity = size;
        Ok(true)
    }

    /// Bytes currently backing the object and the mapping
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    /// Descriptor shared with the compositor
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }

    /// The current mapping
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }
}

fn pixels_to_bytes(pixels: u64, bytes_per_pixel: u32) -> Result<u64> {
    pixels.checked_mul(u64::from(bytes_per_pixel)).ok_or_else(|| {
        ClientError::InvalidLayout(format!(
            "{} pixels at {} bytes each overflows",
            pixels, bytes_per_pixel
        ))
    })
}

fn map_file(file: &File, size: u64) -> Result<MmapMut> {
    let len = usize::try_from(size).map_err(|_| {
        ClientError::InvalidLayout(format!("{} bytes does not fit the address space", size))
    })?;
    // SAFETY: the object is unlinked and only this process writes to it.
    unsafe { MmapOptions::new().len(len).map_mut(file) }
        .map_err(|e| ClientError::allocation("mmap", e))
}

/// Opens a fresh shm object under a random name and unlinks the name
fn open_anonymous() -> Result<File> {
    let mut last_err = io::Error::from_raw_os_error(libc::EEXIST);

    for _ in 0..NAME_ATTEMPTS {
        let name = random_name();
        let c_name = CString::new(name.clone())
            .map_err(|e| ClientError::allocation("shm_open", io::Error::other(e)))?;

        // SAFETY: c_name is a valid NUL-terminated string.
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC,
                0o600,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                warn!("shm object {} already exists, retrying", name);
                last_err = err;
                continue;
            }
            return Err(ClientError::allocation("shm_open", err));
        }

        // SAFETY: shm_open returned a descriptor we now own exclusively.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };

        // SAFETY: same name as above.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
            return Err(ClientError::allocation("shm_unlink", io::Error::last_os_error()));
        }

        debug!("Opened and unlinked shm object {}", name);
        return Ok(File::from(owned));
    }

    Err(ClientError::allocation("shm_open", last_err))
}

fn random_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_LEN)
        .map(char::from)
        .collect();
    format!("/shm-window-{}", suffix)
}
