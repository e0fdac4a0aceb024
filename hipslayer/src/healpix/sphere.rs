//! Angle and boundary computations for the NESTED scheme.
//!
//! Follows the standard face/ring decomposition: each of the 12 base faces
//! is addressed by its ring row (`JRLL`) and longitude column (`JPLL`), and
//! positions inside a face are `(x, y)` fractions of the face side.

use std::f64::consts::{FRAC_PI_2, PI};

use super::nested::{axis_to_subpixel, subpixel_to_axis, AxisCoord};
use super::{GeoFootprint, LonLat, MAX_ORDER};

const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Face number and in-face axis coordinate of a NESTED pixel.
fn nest_to_xyf(order: u8, pixel: u64) -> (usize, i64, i64) {
    let shift = 2 * order as u32;
    let face = (pixel >> shift) as usize;
    let axis = subpixel_to_axis(order, pixel & ((1u64 << shift) - 1));
    (face, axis.x as i64, axis.y as i64)
}

fn xyf_to_nest(order: u8, ix: i64, iy: i64, face: i64) -> u64 {
    ((face as u64) << (2 * order as u32))
        | axis_to_subpixel(order, AxisCoord::new(ix as u32, iy as u32))
}

/// Modulo that always lands in `[0, v2)`.
fn fmodulo(v1: f64, v2: f64) -> f64 {
    if v1 >= 0.0 {
        if v1 < v2 {
            v1
        } else {
            v1 % v2
        }
    } else {
        let tmp = v1 % v2 + v2;
        if tmp == v2 {
            0.0
        } else {
            tmp
        }
    }
}

/// Converts `z = cos(theta)` (with an optional precise `sin(theta)` near the
/// poles) to a latitude in degrees.
fn latitude(z: f64, sth: Option<f64>) -> f64 {
    match sth {
        Some(s) if s == 0.0 => 90.0_f64.copysign(z),
        Some(s) => 90.0 - s.atan2(z).to_degrees(),
        None => z.asin().to_degrees(),
    }
}

/// Returns the sky position of the centre of `pixel` at `order`.
///
/// Longitudes are in `[0, 360)`, latitudes in `[-90, 90]`.
pub fn pixel_center(order: u8, pixel: u64) -> LonLat {
    debug_assert!(order <= MAX_ORDER);
    let nside = 1i64 << order;
    let npix = 12 * nside * nside;
    let fact2 = 4.0 / npix as f64;
    let fact1 = (nside << 1) as f64 * fact2;

    let (face, ix, iy) = nest_to_xyf(order, pixel);
    let jr = (JRLL[face] << order) - ix - iy - 1;

    let (nr, z, sth, kshift) = if jr < nside {
        let tmp = (jr * jr) as f64 * fact2;
        let z = 1.0 - tmp;
        let sth = (z > 0.99).then(|| (tmp * (2.0 - tmp)).sqrt());
        (jr, z, sth, 0)
    } else if jr > 3 * nside {
        let nr = 4 * nside - jr;
        let tmp = (nr * nr) as f64 * fact2;
        let z = tmp - 1.0;
        let sth = (z < -0.99).then(|| (tmp * (2.0 - tmp)).sqrt());
        (nr, z, sth, 0)
    } else {
        let z = (2 * nside - jr) as f64 * fact1;
        (nside, z, None, (jr - nside) & 1)
    };

    let nl4 = 4 * nside;
    let mut jp = (JPLL[face] * nr + ix - iy + 1 + kshift) / 2;
    if jp > nl4 {
        jp -= nl4;
    }
    if jp < 1 {
        jp += nl4;
    }
    let phi = (jp as f64 - (kshift + 1) as f64 * 0.5) * (FRAC_PI_2 / nr as f64);

    LonLat::new(phi.to_degrees(), latitude(z, sth))
}

/// Converts a fractional in-face position to lon/lat in degrees.
///
/// `x` and `y` are expressed in units of the face side (`[0, 1]`).
fn face_location(x: f64, y: f64, face: usize) -> LonLat {
    let jr = JRLL[face] as f64 - x - y;
    let (nr, z, sth) = if jr < 1.0 {
        let tmp = jr * jr / 3.0;
        let z = 1.0 - tmp;
        (jr, z, (z > 0.99).then(|| (tmp * (2.0 - tmp)).sqrt()))
    } else if jr > 3.0 {
        let nr = 4.0 - jr;
        let tmp = nr * nr / 3.0;
        let z = tmp - 1.0;
        (nr, z, (z < -0.99).then(|| (tmp * (2.0 - tmp)).sqrt()))
    } else {
        (1.0, (2.0 - jr) * 2.0 / 3.0, None)
    };

    let mut tmp = JPLL[face] as f64 * nr + x - y;
    if tmp < 0.0 {
        tmp += 8.0;
    }
    if tmp >= 8.0 {
        tmp -= 8.0;
    }
    // 45 degrees per unit of tmp keeps face edges exactly on multiples of 45
    let lon = if nr < 1e-15 { 0.0 } else { 45.0 * tmp / nr };
    LonLat::new(lon, latitude(z, sth))
}

/// Returns the four corners of `pixel` at `order`, ordered north, west,
/// south, east.
///
/// Longitudes are normalised to `(-180, 180]`.
pub fn pixel_boundaries(order: u8, pixel: u64) -> GeoFootprint {
    debug_assert!(order <= MAX_ORDER);
    let nside = (1u64 << order) as f64;
    let (face, ix, iy) = nest_to_xyf(order, pixel);
    let dc = 0.5 / nside;
    let xc = (ix as f64 + 0.5) / nside;
    let yc = (iy as f64 + 0.5) / nside;

    let corner = |x: f64, y: f64| {
        let mut loc = face_location(x, y, face);
        if loc.lon > 180.0 {
            loc.lon -= 360.0;
        }
        loc
    };

    GeoFootprint::new([
        corner(xc + dc, yc + dc),
        corner(xc - dc, yc + dc),
        corner(xc - dc, yc - dc),
        corner(xc + dc, yc - dc),
    ])
}

/// Returns the NESTED pixel containing `(lon, lat)` at `order`.
pub fn angle_to_pixel(order: u8, lon: f64, lat: f64) -> u64 {
    debug_assert!(order <= MAX_ORDER);
    let nside = 1i64 << order;
    let nside_f = nside as f64;
    let theta = (90.0 - lat).to_radians();
    let phi = lon.to_radians();
    let z = theta.cos();
    let sth = (!(0.01..=PI - 0.01).contains(&theta)).then(|| theta.sin());

    let za = z.abs();
    let tt = fmodulo(phi * (2.0 / PI), 4.0);

    if za <= 2.0 / 3.0 {
        let temp1 = nside_f * (0.5 + tt);
        let temp2 = nside_f * (z * 0.75);
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ifp = jp >> order;
        let ifm = jm >> order;
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        let ix = jm & (nside - 1);
        let iy = nside - (jp & (nside - 1)) - 1;
        xyf_to_nest(order, ix, iy, face)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = match sth {
            Some(s) => nside_f * s / ((1.0 + za) / 3.0).sqrt(),
            None => nside_f * (3.0 * (1.0 - za)).sqrt(),
        };
        let jp = ((tp * tmp) as i64).min(nside - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(nside - 1);
        if z >= 0.0 {
            xyf_to_nest(order, nside - jm - 1, nside - jp - 1, ntt)
        } else {
            xyf_to_nest(order, jp, jm, ntt + 8)
        }
    }
}

/// Returns the pixel containing `(lon, lat)` at `order` together with the
/// fractional position `(dx, dy)` inside it.
///
/// The lookup runs at [`MAX_ORDER`]; the residual sub-pixel is decomposed
/// into axis coordinates and scaled to `[0, 1)`.
pub fn angle_to_pixel_with_offsets(order: u8, lon: f64, lat: f64) -> (u64, f64, f64) {
    debug_assert!(order <= MAX_ORDER);
    let extra = MAX_ORDER - order;
    let fine = angle_to_pixel(MAX_ORDER, lon, lat);
    let shift = 2 * extra as u32;
    let pixel = fine >> shift;
    let axis = subpixel_to_axis(extra, fine & ((1u64 << shift) - 1));
    let scale = (1u64 << extra) as f64;
    (pixel, axis.x as f64 / scale, axis.y as f64 / scale)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_offsets_in_unit_square(lon in -180.0f64..360.0, lat in -90.0f64..=90.0, order in 0u8..=12) {
            let (pixel, dx, dy) = angle_to_pixel_with_offsets(order, lon, lat);
            prop_assert!(pixel < 12u64 << (2 * order as u32));
            prop_assert!((0.0..1.0).contains(&dx));
            prop_assert!((0.0..1.0).contains(&dy));
            prop_assert_eq!(pixel, angle_to_pixel(order, lon, lat));
        }

        #[test]
        fn prop_center_round_trip(order in 0u8..=20, seed in any::<u64>()) {
            let pixel = seed % (12u64 << (2 * order as u32));
            let c = pixel_center(order, pixel);
            prop_assert!((0.0..360.0).contains(&c.lon));
            prop_assert_eq!(angle_to_pixel(order, c.lon, c.lat), pixel);
        }
    }
}
