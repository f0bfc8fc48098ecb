//! Shared angle helpers

use std::f32::consts::{PI, TAU};

/// Wrap an angle difference into (-π, π].
///
/// Used for the shortest signed rotation between two headings, so a step
/// across the 0/2π seam is seen as a small delta instead of a near-2π jump.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Normalize a heading into [0, 2π)
#[inline]
pub fn normalize_heading(angle: f32) -> f32 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}
