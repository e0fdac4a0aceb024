//! Bit interleaving between NESTED sub-pixel indices and axis coordinates.
//!
//! Within a tile of order `k`, a sub-pixel index packs the `x` axis
//! coordinate into the even bit positions and `y` into the odd ones:
//!
//! ```text
//! subpixel = ... y1 x1 y0 x0
//! ```

/// Axis coordinate of a sub-pixel inside a square block of side `2^order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisCoord {
    pub x: u32,
    pub y: u32,
}

impl AxisCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Moves the low 32 bits of `v` onto the even bit positions of a `u64`.
#[inline]
fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: gathers the even bits of `v`.
#[inline]
fn compress_bits(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Converts a sub-pixel index to its `(x, y)` axis coordinate.
///
/// # Arguments
///
/// * `order` - Depth of the block, `subpixel` must be below `4^order`
/// * `subpixel` - NESTED index relative to the block origin
pub fn subpixel_to_axis(order: u8, subpixel: u64) -> AxisCoord {
    debug_assert!(order <= 31);
    debug_assert!(subpixel < 1u64 << (2 * order as u32));
    AxisCoord {
        x: compress_bits(subpixel),
        y: compress_bits(subpixel >> 1),
    }
}

/// Converts an `(x, y)` axis coordinate back to its sub-pixel index.
pub fn axis_to_subpixel(order: u8, axis: AxisCoord) -> u64 {
    debug_assert!(order <= 31);
    debug_assert!((axis.x as u64) < 1u64 << order && (axis.y as u64) < 1u64 << order);
    spread_bits(axis.x) | (spread_bits(axis.y) << 1)
}

/// Builds the full sub-pixel to axis table for a block of side `2^order`.
///
/// Entry `i` holds the axis coordinate of sub-pixel `i`.
pub fn axis_table(order: u8) -> Vec<AxisCoord> {
    let count = 1u64 << (2 * order as u32);
    (0..count).map(|i| subpixel_to_axis(order, i)).collect()
}
