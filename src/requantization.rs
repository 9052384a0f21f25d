// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed-point requantization of 32-bit accumulators to int8.

use core::fmt;

/// Smallest representable requantization scale, 2⁻³².
pub const MIN_SCALE: f32 = 2.3283064e-10;

/// Fixed-point requantization parameters for signed 8-bit outputs.
///
/// Derived once from a floating point scale and output zero point, then
/// shared unchanged by every channel and every pixel of a kernel call.
/// Each ISA broadcasts these values into its own register form before the
/// main loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Qs8RequantParams {
    pub(crate) multiplier: i32,
    pub(crate) rounding: i64,
    pub(crate) remainder_mask: i32,
    pub(crate) remainder_threshold: i32,
    pub(crate) shift: u32,
    pub(crate) output_zero_point: i8,
    pub(crate) output_min: i8,
    pub(crate) output_max: i8,
}

/// Invalid requantization parameters
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamsError {
    /// Scale is not a finite value in `[2⁻³², 1)`
    ScaleOutOfRange(f32),
    /// `output_min` is greater than `output_max`
    EmptyOutputRange { min: i8, max: i8 },
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParamsError::ScaleOutOfRange(scale) =>
                write!(f, "requantization scale {} is outside [2^-32, 1)", scale),
            ParamsError::EmptyOutputRange { min, max } =>
                write!(f, "output range [{}, {}] is empty", min, max),
        }
    }
}

impl std::error::Error for ParamsError { }

impl Qs8RequantParams {
    /// Compute requantization parameters for `scale`.
    ///
    /// The scale is split into a Q31 multiplier in
    /// `[0x40000000, 0x7FFFFF80]` (its 24-bit significand) and a right
    /// shift in `[0, 31]` (its exponent).
    pub fn new(scale: f32, output_zero_point: i8, output_min: i8, output_max: i8)
        -> Result<Self, ParamsError>
    {
        if !(scale >= MIN_SCALE && scale < 1.) {
            return Err(ParamsError::ScaleOutOfRange(scale));
        }
        if output_min > output_max {
            return Err(ParamsError::EmptyOutputRange { min: output_min, max: output_max });
        }

        let scale_bits = scale.to_bits();
        let multiplier = (((scale_bits & 0x007F_FFFF) | 0x0080_0000) << 7) as i32;
        debug_assert!(multiplier >= 0x4000_0000 && multiplier <= 0x7FFF_FF80);

        let shift = 127 + 31 - 32 - (scale_bits >> 23);
        debug_assert!(shift < 32);

        let remainder_mask = ((1u32 << shift) - 1) as i32;
        Ok(Qs8RequantParams {
            multiplier,
            rounding: 1 << 30,
            remainder_mask,
            remainder_threshold: remainder_mask >> 1,
            shift,
            output_zero_point,
            output_min,
            output_max,
        })
    }

    pub fn multiplier(&self) -> i32 { self.multiplier }
    pub fn shift(&self) -> u32 { self.shift }
    pub fn output_zero_point(&self) -> i8 { self.output_zero_point }
    pub fn output_min(&self) -> i8 { self.output_min }
    pub fn output_max(&self) -> i8 { self.output_max }
}

/// Requantize one accumulator.
///
/// This is the portable definition of the arithmetic; the vector kernels
/// compute the same bytes lane by lane.
///
/// + Q31 product: `(acc · multiplier + 2³⁰) >> 31`, computed in 64 bits
/// + divide by `2^shift`, rounding to nearest with ties away from zero
///   (an arithmetic shift plus a correction from the remainder)
/// + saturate to i16, add the zero point (saturating), clamp to
///   `[output_min, output_max]`
#[inline(always)]
pub fn requantize(acc: i32, params: &Qs8RequantParams) -> i8 {
    let product = acc as i64 * params.multiplier as i64;
    let q31product = ((product + params.rounding) >> 31) as i32;

    let remainder = (q31product & params.remainder_mask) - (q31product < 0) as i32;
    let scaled = (q31product >> params.shift)
        + (remainder > params.remainder_threshold) as i32;

    let out = saturate_i16(scaled).saturating_add(params.output_zero_point as i16);
    out.max(params.output_min as i16).min(params.output_max as i16) as i8
}

#[inline(always)]
fn saturate_i16(x: i32) -> i16 {
    x.max(i16::MIN as i32).min(i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(scale: f32) -> Qs8RequantParams {
        Qs8RequantParams::new(scale, 0, i8::MIN, i8::MAX).unwrap()
    }

    #[test]
    fn scale_decomposition() {
        let p = params(0.5);
        assert_eq!(p.multiplier, 0x4000_0000);
        assert_eq!(p.shift, 0);
        assert_eq!(p.remainder_mask, 0);

        let p = params(0.25);
        assert_eq!(p.multiplier, 0x4000_0000);
        assert_eq!(p.shift, 1);
        assert_eq!(p.remainder_mask, 1);
        assert_eq!(p.remainder_threshold, 0);

        let p = params(MIN_SCALE);
        assert_eq!(p.shift, 31);

        let p = params(f32::from_bits(0x3F7F_FFFF));
        assert_eq!(p.multiplier, 0x7FFF_FF80);
        assert_eq!(p.shift, 0);
    }

    #[test]
    fn rejects_bad_parameters() {
        for &scale in &[1., 2., 0., -0.5, MIN_SCALE / 2., f32::NAN, f32::INFINITY] {
            assert!(matches!(Qs8RequantParams::new(scale, 0, -128, 127),
                             Err(ParamsError::ScaleOutOfRange(_))),
                    "scale {}", scale);
        }
        assert_eq!(Qs8RequantParams::new(0.5, 0, 10, -10),
                   Err(ParamsError::EmptyOutputRange { min: 10, max: -10 }));
    }

    #[test]
    fn ties_round_away_from_zero() {
        // 0.25 = 0.5 (Q31 multiplier) · 2⁻¹ (shift)
        let p = params(0.25);
        assert_eq!(requantize(2, &p), 1);   // 0.5
        assert_eq!(requantize(6, &p), 2);   // 1.5
        assert_eq!(requantize(-6, &p), -2); // -1.5
        assert_eq!(requantize(-5, &p), -1); // -1.25
        assert_eq!(requantize(4, &p), 1);   // 1.0
        assert_eq!(requantize(7, &p), 2);   // 1.75
        // 1.25: the Q31 step already rounded 2.5 up to 3
        assert_eq!(requantize(5, &p), 2);
    }

    #[test]
    fn zero_point_and_clamp() {
        let p = Qs8RequantParams::new(0.5, 10, -20, 50).unwrap();
        assert_eq!(requantize(0, &p), 10);
        assert_eq!(requantize(1000, &p), 50);
        assert_eq!(requantize(-1000, &p), -20);
        assert_eq!(requantize(i32::MAX, &p), 50);
        assert_eq!(requantize(i32::MIN, &p), -20);
    }

    #[test]
    fn near_identity_scale() {
        let p = params(f32::from_bits(0x3F7F_FFFF));
        for acc in -128..=127 {
            assert_eq!(requantize(acc, &p), acc as i8);
        }
    }
}
