// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::requantization::Qs8RequantParams;

/// Instruction set a kernel variant is compiled for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Isa {
    /// Portable Rust, available everywhere
    Scalar,
    Sse2,
    Sse41,
    Avx2,
    /// AVX with fused multiply-add
    Fma3,
    Neon,
}

impl Isa {
    /// Whether the running cpu supports this instruction set.
    ///
    /// The compile time environment variable `QKTEST_FEATURE` restricts
    /// detection to the single named feature (for testing).
    pub fn is_available(self) -> bool {
        match self {
            Isa::Scalar => true,
            #[cfg(any(target_arch="x86", target_arch="x86_64"))]
            Isa::Sse2 => is_x86_feature_detected_!("sse2"),
            #[cfg(any(target_arch="x86", target_arch="x86_64"))]
            Isa::Sse41 => is_x86_feature_detected_!("sse4.1"),
            #[cfg(any(target_arch="x86", target_arch="x86_64"))]
            Isa::Avx2 => is_x86_feature_detected_!("avx2"),
            #[cfg(any(target_arch="x86", target_arch="x86_64"))]
            Isa::Fma3 => is_x86_feature_detected_!("fma") && is_x86_feature_detected!("avx"),
            #[cfg(target_arch="aarch64")]
            Isa::Neon => is_aarch64_feature_detected_!("neon"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

/// Integer lanes for the quantized depthwise convolution loop.
///
/// An implementation supplies loads, a widening multiply-accumulate and
/// the requantizing store for one tile of `TILE` channels; the loop itself
/// (row resolution, channel tiling, the remainder tile) is written once in
/// `dwconv::dwconv_loop`.
///
/// All methods are called from inside a function compiled with the
/// implementation's target features, so they must be `#[inline(always)]`.
pub(crate) trait Qs8Lanes {
    /// Channels per tile
    const TILE: usize;
    /// `TILE` 32-bit accumulators
    type Acc: Copy;
    /// Requantization parameters in register form
    type Params: Copy;

    unsafe fn prepare(params: &Qs8RequantParams) -> Self::Params;

    /// Load `TILE` native endian i32 biases from `w` (unaligned)
    unsafe fn load_bias(w: *const u8) -> Self::Acc;

    /// `acc + widen(i[..TILE]) · widen(k[..TILE])`, wrapping
    unsafe fn multiply_add(acc: Self::Acc, i: *const i8, k: *const i8) -> Self::Acc;

    /// Requantize the tile and store `TILE` bytes to `output`
    unsafe fn requantize_store(acc: Self::Acc, params: &Self::Params, output: *mut i8);
}

/// f32 lanes for an elementwise unary kernel.
pub(crate) trait UnaryLanes {
    /// Elements per tile
    const TILE: usize;

    /// Transform one full tile from `x` to `y`
    unsafe fn tile(x: *const f32, y: *mut f32);

    /// Precise scalar version, used for the elements after the last
    /// full tile
    fn tail(x: f32) -> f32;
}
