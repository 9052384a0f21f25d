// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Elementwise f32 square root kernels.

use rawpointer::PointerExt;

use crate::kernel::{Isa, UnaryLanes};

/// Raw entry point of an elementwise f32 kernel: `n`, `x`, `y`.
/// `x` and `y` hold `n` elements each.
pub type F32UnaryFn = unsafe fn(usize, *const f32, *mut f32);

/// The elementwise loop: full tiles through `L::tile`, then the remaining
/// `n % L::TILE` elements one at a time through `L::tail`.
#[inline(always)]
unsafe fn unary_loop<L: UnaryLanes>(n: usize, mut x: *const f32, mut y: *mut f32) {
    debug_assert_ne!(n, 0);
    for _ in 0..n / L::TILE {
        L::tile(x, y);
        x = x.add(L::TILE);
        y = y.add(L::TILE);
    }
    for _ in 0..n % L::TILE {
        *y.post_inc() = L::tail(*x.post_inc());
    }
}

enum ScalarSqrt<const N: usize> {}

impl<const N: usize> UnaryLanes for ScalarSqrt<N> {
    const TILE: usize = N;

    #[inline(always)]
    unsafe fn tile(x: *const f32, y: *mut f32) {
        for j in 0..N {
            *y.add(j) = (*x.add(j)).sqrt();
        }
    }

    #[inline(always)]
    fn tail(x: f32) -> f32 { x.sqrt() }
}

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
mod x86 {
    #[cfg(target_arch="x86")]
    use core::arch::x86::*;
    #[cfg(target_arch="x86_64")]
    use core::arch::x86_64::*;

    use crate::kernel::UnaryLanes;

    /// `_mm_sqrt_ps`, `N / 4` vectors per tile
    pub(super) enum Sse2Sqrt<const N: usize> {}

    /// Reciprocal square root estimate refined with two Newton-Raphson
    /// iterations and one final adjustment, `N / 8` vectors per tile
    pub(super) enum FmaNr2Adj<const N: usize> {}

    impl<const N: usize> UnaryLanes for Sse2Sqrt<N> {
        const TILE: usize = N;

        #[inline(always)]
        unsafe fn tile(x: *const f32, y: *mut f32) {
            for j in (0..N).step_by(4) {
                _mm_storeu_ps(y.add(j), _mm_sqrt_ps(_mm_loadu_ps(x.add(j))));
            }
        }

        #[inline(always)]
        fn tail(x: f32) -> f32 { x.sqrt() }
    }

    impl<const N: usize> UnaryLanes for FmaNr2Adj<N> {
        const TILE: usize = N;

        #[inline(always)]
        unsafe fn tile(x: *const f32, y: *mut f32) {
            for j in (0..N).step_by(8) {
                _mm256_storeu_ps(y.add(j), sqrt_nr2fma1adj(_mm256_loadu_ps(x.add(j))));
            }
        }

        #[inline(always)]
        fn tail(x: f32) -> f32 { x.sqrt() }
    }

    /// Tracks `s ≈ sqrt(x)` and `h ≈ 0.5 / sqrt(x)` together:
    ///
    /// + `r = 0.5 - s·h`, `h += h·r`, `s += s·r` (twice)
    /// + `y = s + h·(x - s²)`
    ///
    /// `x = ±0` and `x = +∞` produce `0·∞` in the estimate and are passed
    /// through unchanged. `_mm256_rsqrt_ps` flushes subnormal inputs to zero,
    /// so those lanes are computed as `sqrt(x·2²⁴)·2⁻¹²`; both scalings are
    /// exact.
    #[inline(always)]
    unsafe fn sqrt_nr2fma1adj(vx: __m256) -> __m256 {
        let vhalf = _mm256_set1_ps(0.5);
        let vsubnormal = _mm256_and_ps(
            _mm256_cmp_ps(vx, _mm256_setzero_ps(), _CMP_GT_OQ),
            _mm256_cmp_ps(vx, _mm256_set1_ps(f32::MIN_POSITIVE), _CMP_LT_OQ));
        let vinput = _mm256_blendv_ps(
            vx, _mm256_mul_ps(vx, _mm256_set1_ps(16777216.)), vsubnormal);

        let vrsqrtx = _mm256_rsqrt_ps(vinput);
        let mut vsqrtx = _mm256_mul_ps(vrsqrtx, vinput);
        let mut vhalfrsqrtx = _mm256_mul_ps(vrsqrtx, vhalf);

        repeat!(2 {
            let vresidual = _mm256_fnmadd_ps(vsqrtx, vhalfrsqrtx, vhalf);
            vhalfrsqrtx = _mm256_fmadd_ps(vhalfrsqrtx, vresidual, vhalfrsqrtx);
            vsqrtx = _mm256_fmadd_ps(vsqrtx, vresidual, vsqrtx);
        });

        let vadjustment = _mm256_fnmadd_ps(vsqrtx, vsqrtx, vinput);
        let vy = _mm256_fmadd_ps(vhalfrsqrtx, vadjustment, vsqrtx);
        let vy = _mm256_blendv_ps(
            vy, _mm256_mul_ps(vy, _mm256_set1_ps(1. / 4096.)), vsubnormal);

        let vspecial = _mm256_or_ps(
            _mm256_cmp_ps(vx, _mm256_setzero_ps(), _CMP_EQ_OQ),
            _mm256_cmp_ps(vx, _mm256_set1_ps(f32::INFINITY), _CMP_EQ_OQ));
        _mm256_blendv_ps(vy, vx, vspecial)
    }
}

#[cfg(target_arch="aarch64")]
mod aarch64 {
    use core::arch::aarch64::*;

    use crate::kernel::UnaryLanes;

    /// `vsqrtq_f32`, `N / 4` vectors per tile
    pub(super) enum NeonSqrt<const N: usize> {}

    impl<const N: usize> UnaryLanes for NeonSqrt<N> {
        const TILE: usize = N;

        #[inline(always)]
        unsafe fn tile(x: *const f32, y: *mut f32) {
            for j in (0..N).step_by(4) {
                vst1q_f32(y.add(j), vsqrtq_f32(vld1q_f32(x.add(j))));
            }
        }

        #[inline(always)]
        fn tail(x: f32) -> f32 { x.sqrt() }
    }
}

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
use self::x86::{FmaNr2Adj, Sse2Sqrt};
#[cfg(target_arch="aarch64")]
use self::aarch64::NeonSqrt;

macro_rules! vsqrt_ukernel {
    ($(#[$attr:meta])* $name:ident: $lanes:ty) => {
        $(#[$attr])*
        unsafe fn $name(n: usize, x: *const f32, y: *mut f32) {
            unary_loop::<$lanes>(n, x, y)
        }
    };
}

vsqrt_ukernel!(#[inline(never)] f32_vsqrt_scalar_sqrt_x1: ScalarSqrt<1>);
vsqrt_ukernel!(#[inline(never)] f32_vsqrt_scalar_sqrt_x2: ScalarSqrt<2>);
vsqrt_ukernel!(#[inline(never)] f32_vsqrt_scalar_sqrt_x4: ScalarSqrt<4>);

vsqrt_ukernel!(
    #[target_feature(enable="sse2")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    f32_vsqrt_sse2_sqrt_x4: Sse2Sqrt<4>);
vsqrt_ukernel!(
    #[target_feature(enable="sse2")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    f32_vsqrt_sse2_sqrt_x8: Sse2Sqrt<8>);
vsqrt_ukernel!(
    #[target_feature(enable="avx,fma")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    f32_vsqrt_fma3_nr2fma1adj_x8: FmaNr2Adj<8>);
vsqrt_ukernel!(
    #[target_feature(enable="avx,fma")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    f32_vsqrt_fma3_nr2fma1adj_x16: FmaNr2Adj<16>);

vsqrt_ukernel!(
    #[target_feature(enable="neon")]
    #[cfg(target_arch="aarch64")]
    f32_vsqrt_neon_sqrt_x4: NeonSqrt<4>);
vsqrt_ukernel!(
    #[target_feature(enable="neon")]
    #[cfg(target_arch="aarch64")]
    f32_vsqrt_neon_sqrt_x8: NeonSqrt<8>);

/// An elementwise square root kernel variant.
#[derive(Copy, Clone)]
pub struct F32VSqrtUkernel {
    pub name: &'static str,
    pub isa: Isa,
    /// Elements per vector tile
    pub batch_tile: usize,
    kernel: F32UnaryFn,
}

impl F32VSqrtUkernel {
    pub fn function(&self) -> F32UnaryFn { self.kernel }

    /// `y[i] = sqrt(x[i])`
    ///
    /// ***Panics*** if the kernel's ISA is not available, if `x` is empty or
    /// if the lengths differ.
    pub fn run(&self, x: &[f32], y: &mut [f32]) {
        assert!(self.isa.is_available(), "{}: {:?} is not available", self.name, self.isa);
        assert!(!x.is_empty());
        assert_eq!(x.len(), y.len());
        unsafe {
            (self.kernel)(x.len(), x.as_ptr(), y.as_mut_ptr())
        }
    }
}

impl core::fmt::Debug for F32VSqrtUkernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("F32VSqrtUkernel")
            .field("name", &self.name)
            .field("isa", &self.isa)
            .field("batch_tile", &self.batch_tile)
            .finish()
    }
}

macro_rules! catalog_entry {
    ($name:ident, $isa:ident, $tile:expr) => {
        F32VSqrtUkernel { name: stringify!($name), isa: Isa::$isa, batch_tile: $tile, kernel: $name }
    };
}

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
const ARCH_KERNELS: &[F32VSqrtUkernel] = &[
    catalog_entry!(f32_vsqrt_fma3_nr2fma1adj_x16, Fma3, 16),
    catalog_entry!(f32_vsqrt_fma3_nr2fma1adj_x8, Fma3, 8),
    catalog_entry!(f32_vsqrt_sse2_sqrt_x8, Sse2, 8),
    catalog_entry!(f32_vsqrt_sse2_sqrt_x4, Sse2, 4),
];

#[cfg(target_arch="aarch64")]
const ARCH_KERNELS: &[F32VSqrtUkernel] = &[
    catalog_entry!(f32_vsqrt_neon_sqrt_x8, Neon, 8),
    catalog_entry!(f32_vsqrt_neon_sqrt_x4, Neon, 4),
];

#[cfg(not(any(target_arch="x86", target_arch="x86_64", target_arch="aarch64")))]
const ARCH_KERNELS: &[F32VSqrtUkernel] = &[];

const PORTABLE_KERNELS: &[F32VSqrtUkernel] = &[
    catalog_entry!(f32_vsqrt_scalar_sqrt_x4, Scalar, 4),
    catalog_entry!(f32_vsqrt_scalar_sqrt_x2, Scalar, 2),
    catalog_entry!(f32_vsqrt_scalar_sqrt_x1, Scalar, 1),
];

/// All square root variants compiled for this target.
pub fn f32_vsqrt_ukernels() -> impl Iterator<Item=&'static F32VSqrtUkernel> {
    ARCH_KERNELS.iter().chain(PORTABLE_KERNELS)
}

/// The preferred square root variant for the running cpu.
pub fn select_f32_vsqrt() -> &'static F32VSqrtUkernel {
    let selected = f32_vsqrt_ukernels()
        .find(|k| k.isa.is_available())
        .unwrap_or(&PORTABLE_KERNELS[0]);
    dprint!("f32 vsqrt: selected {}", selected.name);
    selected
}
