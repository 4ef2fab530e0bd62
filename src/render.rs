//! Pixel content for the current buffer

use crate::pool::BufferLayout;

/// Fills the rectangle described by `layout` at `offset` with `color`
///
/// `color` is a packed 32-bit pixel in the layout's format; shm formats
/// are little-endian in memory. Row padding beyond `width` is left alone.
/// Rows that fall outside `pixels` are skipped.
pub fn fill_solid(pixels: &mut [u8], offset: u64, layout: &BufferLayout, color: u32) {
    let Ok(offset) = usize::try_from(offset) else {
        return;
    };
    let size = layout.size();
    let stride = layout.stride() as usize;
    let row_len = size.width as usize * layout.format().bytes_per_pixel() as usize;
    let bytes = color.to_le_bytes();

    for row in 0..size.height as usize {
        let start = offset + row * stride;
        let Some(row) = pixels.get_mut(start..start + row_len) else {
            break;
        };
        for px in row.chunks_exact_mut(bytes.len()) {
            px.copy_from_slice(&bytes);
        }
    }
}
