//! Byte-exact copies between unpadded host memory and padded device memory.
//!
//! Every routine validates its lengths and pitches up front and then picks a
//! copy strategy by comparing the logical width with the physical pitch. A
//! single bulk copy is only ever taken when the two are equal; otherwise the
//! data is moved one element, row or slice at a time. Each routine returns the
//! number of discrete block copies it performed.
//!
//! The routines perform no synchronization: the caller must already know that
//! any GPU work writing the device-side bytes has completed.

use crate::error::{ForgeError, Result};
use crate::layout::ElementLayout;

/// Geometry of one side of a pitched copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pitch {
    row: usize,
    slice: usize,
}

/// Bytes spanned by `count` items of `width` bytes laid out `stride` apart.
#[inline]
fn span(count: usize, stride: usize, width: usize) -> usize {
    if count == 0 {
        0
    } else {
        (count - 1) * stride + width
    }
}

fn check_len(required: usize, available: usize) -> Result<()> {
    if required > available {
        return Err(ForgeError::BufferOverflow {
            required,
            available,
        });
    }
    Ok(())
}

fn check_pitch(width: usize, pitch: usize) -> Result<()> {
    if width > pitch {
        return Err(ForgeError::InvalidPitch { width, pitch });
    }
    Ok(())
}

/// Copy `count` elements of `element_size` bytes between regions with
/// independent element strides.
///
/// Equal strides take one bulk copy; differing strides copy element by element.
pub fn copy_elements(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    element_size: usize,
    count: usize,
) -> Result<usize> {
    check_pitch(element_size, src_stride)?;
    check_pitch(element_size, dst_stride)?;
    check_len(span(count, src_stride, element_size), src.len())?;
    check_len(span(count, dst_stride, element_size), dst.len())?;

    if count == 0 || element_size == 0 {
        return Ok(0);
    }

    if src_stride == dst_stride {
        let bytes = span(count, src_stride, element_size);
        tracing::trace!(bytes, "element copy: bulk");
        dst[..bytes].copy_from_slice(&src[..bytes]);
        return Ok(1);
    }

    tracing::trace!(count, src_stride, dst_stride, "element copy: per element");
    for i in 0..count {
        let s = i * src_stride;
        let d = i * dst_stride;
        dst[d..d + element_size].copy_from_slice(&src[s..s + element_size]);
    }
    Ok(count)
}

/// Expand tightly packed host elements into padded device elements.
pub fn pad_elements(
    src: &[u8],
    dst: &mut [u8],
    layout: ElementLayout,
    count: usize,
) -> Result<usize> {
    copy_elements(
        src,
        layout.natural_size,
        dst,
        layout.padded_stride,
        layout.natural_size,
        count,
    )
}

/// Compact padded device elements into tightly packed host elements.
pub fn unpad_elements(
    src: &[u8],
    dst: &mut [u8],
    layout: ElementLayout,
    count: usize,
) -> Result<usize> {
    copy_elements(
        src,
        layout.padded_stride,
        dst,
        layout.natural_size,
        layout.natural_size,
        count,
    )
}

fn copy_pitched(
    src: &[u8],
    src_pitch: Pitch,
    dst: &mut [u8],
    dst_pitch: Pitch,
    width: usize,
    height: usize,
    depth: usize,
) -> Result<usize> {
    for pitch in [src_pitch, dst_pitch] {
        check_pitch(width, pitch.row)?;
        if depth > 1 {
            check_pitch(pitch.row * height, pitch.slice)?;
        }
    }

    let extent = |pitch: Pitch| {
        if height == 0 || depth == 0 {
            0
        } else {
            (depth - 1) * pitch.slice + span(height, pitch.row, width)
        }
    };
    check_len(extent(src_pitch), src.len())?;
    check_len(extent(dst_pitch), dst.len())?;

    if width == 0 || height == 0 || depth == 0 {
        return Ok(0);
    }

    let rows_packed = src_pitch.row == width && dst_pitch.row == width;
    let slices_packed = depth == 1
        || (src_pitch.slice == width * height && dst_pitch.slice == width * height);

    if rows_packed && slices_packed {
        let bytes = width * height * depth;
        tracing::trace!(bytes, "pitched copy: bulk");
        dst[..bytes].copy_from_slice(&src[..bytes]);
        return Ok(1);
    }

    if rows_packed {
        tracing::trace!(depth, "pitched copy: per slice");
        let bytes = width * height;
        for z in 0..depth {
            let s = z * src_pitch.slice;
            let d = z * dst_pitch.slice;
            dst[d..d + bytes].copy_from_slice(&src[s..s + bytes]);
        }
        return Ok(depth);
    }

    tracing::trace!(height, depth, "pitched copy: per row");
    for z in 0..depth {
        for y in 0..height {
            let s = z * src_pitch.slice + y * src_pitch.row;
            let d = z * dst_pitch.slice + y * dst_pitch.row;
            dst[d..d + width].copy_from_slice(&src[s..s + width]);
        }
    }
    Ok(height * depth)
}

/// Copy `height` tightly packed rows of `width` bytes into a region whose rows
/// are `pitch` bytes apart.
pub fn copy_rows_to_pitched(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    pitch: usize,
    height: usize,
) -> Result<usize> {
    copy_pitched(
        src,
        Pitch {
            row: width,
            slice: width * height,
        },
        dst,
        Pitch {
            row: pitch,
            slice: pitch * height,
        },
        width,
        height,
        1,
    )
}

/// Copy `height` rows `pitch` bytes apart into tightly packed rows of
/// `width` bytes.
pub fn copy_rows_from_pitched(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    pitch: usize,
    height: usize,
) -> Result<usize> {
    copy_pitched(
        src,
        Pitch {
            row: pitch,
            slice: pitch * height,
        },
        dst,
        Pitch {
            row: width,
            slice: width * height,
        },
        width,
        height,
        1,
    )
}

/// Copy a tightly packed volume into a row- and slice-pitched region.
///
/// The unpadded side advances `width * height` bytes per slice; the padded
/// side advances `slice_pitch`.
pub fn copy_slices_to_pitched(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    pitch: usize,
    height: usize,
    slice_pitch: usize,
    depth: usize,
) -> Result<usize> {
    copy_pitched(
        src,
        Pitch {
            row: width,
            slice: width * height,
        },
        dst,
        Pitch {
            row: pitch,
            slice: slice_pitch,
        },
        width,
        height,
        depth,
    )
}

/// Copy a row- and slice-pitched region into a tightly packed volume.
pub fn copy_slices_from_pitched(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    pitch: usize,
    height: usize,
    slice_pitch: usize,
    depth: usize,
) -> Result<usize> {
    copy_pitched(
        src,
        Pitch {
            row: pitch,
            slice: slice_pitch,
        },
        dst,
        Pitch {
            row: width,
            slice: width * height,
        },
        width,
        height,
        depth,
    )
}
