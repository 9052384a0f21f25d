// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `Qs8Lanes` implementations: portable arrays and 32-bit multiply lanes
//! for SSE4.1, AVX2 and NEON.
//!
//! The vector requantization splits the 32-bit accumulators into even and
//! odd lanes to use the 32×32→64 widening multiply, and recombines the Q31
//! products with a 16-bit blend. Every step matches `requantize` exactly.

use crate::kernel::Qs8Lanes;
use crate::requantization::{requantize, Qs8RequantParams};

/// Scalar lanes, `N` channels per tile
pub(crate) enum Portable<const N: usize> {}

impl<const N: usize> Qs8Lanes for Portable<N> {
    const TILE: usize = N;
    type Acc = [i32; N];
    type Params = Qs8RequantParams;

    #[inline(always)]
    unsafe fn prepare(params: &Qs8RequantParams) -> Self::Params { *params }

    #[inline(always)]
    unsafe fn load_bias(w: *const u8) -> Self::Acc {
        let mut acc = [0; N];
        for (j, elt) in acc.iter_mut().enumerate() {
            *elt = (w as *const i32).add(j).read_unaligned();
        }
        acc
    }

    #[inline(always)]
    unsafe fn multiply_add(mut acc: Self::Acc, i: *const i8, k: *const i8) -> Self::Acc {
        for (j, elt) in acc.iter_mut().enumerate() {
            let product = *i.add(j) as i32 * *k.add(j) as i32;
            *elt = elt.wrapping_add(product);
        }
        acc
    }

    #[inline(always)]
    unsafe fn requantize_store(acc: Self::Acc, params: &Self::Params, output: *mut i8) {
        for (j, &elt) in acc.iter().enumerate() {
            *output.add(j) = requantize(elt, params);
        }
    }
}

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
pub(crate) use self::x86::{Avx2Mul32, Avx2Mul32x16, Sse41Mul32};

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
mod x86 {
    #[cfg(target_arch="x86")]
    use core::arch::x86::*;
    #[cfg(target_arch="x86_64")]
    use core::arch::x86_64::*;

    use crate::kernel::Qs8Lanes;
    use crate::requantization::Qs8RequantParams;

    /// SSE4.1, 8 channels in two vectors of 4
    pub(crate) enum Sse41Mul32 {}
    /// AVX2, 8 channels
    pub(crate) enum Avx2Mul32 {}
    /// AVX2, 16 channels in two vectors of 8
    pub(crate) enum Avx2Mul32x16 {}

    #[derive(Copy, Clone)]
    pub(crate) struct Sse41Params {
        multiplier: __m128i,
        rounding: __m128i,
        remainder_mask: __m128i,
        remainder_threshold: __m128i,
        shift: __m128i,
        output: OutputParams,
    }

    #[derive(Copy, Clone)]
    pub(crate) struct Avx2Params {
        multiplier: __m256i,
        rounding: __m256i,
        remainder_mask: __m256i,
        remainder_threshold: __m256i,
        shift: __m128i,
        output: OutputParams,
    }

    /// Zero point and clamp bounds as 8 × i16
    #[derive(Copy, Clone)]
    struct OutputParams {
        zero_point: __m128i,
        min: __m128i,
        max: __m128i,
    }

    #[inline(always)]
    unsafe fn output_params(params: &Qs8RequantParams) -> OutputParams {
        OutputParams {
            zero_point: _mm_set1_epi16(params.output_zero_point as i16),
            min: _mm_set1_epi16(params.output_min as i16),
            max: _mm_set1_epi16(params.output_max as i16),
        }
    }

    /// Add the zero point to 8 × i16 and clamp
    #[inline(always)]
    unsafe fn offset_clamp(v: __m128i, p: &OutputParams) -> __m128i {
        let v = _mm_adds_epi16(v, p.zero_point);
        _mm_min_epi16(_mm_max_epi16(v, p.min), p.max)
    }

    #[inline(always)]
    unsafe fn load8_widen_sse41(p: *const i8) -> [__m128i; 2] {
        let v = _mm_loadl_epi64(p as *const __m128i);
        [_mm_cvtepi8_epi32(v), _mm_cvtepi8_epi32(_mm_srli_si128(v, 4))]
    }

    #[inline(always)]
    unsafe fn load8_widen_avx2(p: *const i8) -> __m256i {
        _mm256_cvtepi8_epi32(_mm_loadl_epi64(p as *const __m128i))
    }

    /// Requantize 4 × i32 to the shifted (not yet offset) 4 × i32
    #[inline(always)]
    unsafe fn scale_sse41(acc: __m128i, p: &Sse41Params) -> __m128i {
        let acc_odd = _mm_srli_epi64(acc, 32);
        let product_even = _mm_add_epi64(_mm_mul_epi32(acc, p.multiplier), p.rounding);
        let product_odd = _mm_add_epi64(_mm_mul_epi32(acc_odd, p.multiplier), p.rounding);

        // bits 31..62 of each product: low half of the even lanes,
        // high half of the odd lanes
        let q31_even = _mm_srli_epi64(product_even, 31);
        let q31_odd = _mm_add_epi64(product_odd, product_odd);
        let q31 = _mm_blend_epi16(q31_even, q31_odd, 0xCC);

        let remainder = _mm_add_epi32(_mm_and_si128(q31, p.remainder_mask),
                                      _mm_cmpgt_epi32(_mm_setzero_si128(), q31));
        _mm_sub_epi32(_mm_sra_epi32(q31, p.shift),
                      _mm_cmpgt_epi32(remainder, p.remainder_threshold))
    }

    #[inline(always)]
    unsafe fn scale_avx2(acc: __m256i, p: &Avx2Params) -> __m256i {
        let acc_odd = _mm256_srli_epi64(acc, 32);
        let product_even = _mm256_add_epi64(_mm256_mul_epi32(acc, p.multiplier), p.rounding);
        let product_odd = _mm256_add_epi64(_mm256_mul_epi32(acc_odd, p.multiplier), p.rounding);

        let q31_even = _mm256_srli_epi64(product_even, 31);
        let q31_odd = _mm256_add_epi64(product_odd, product_odd);
        let q31 = _mm256_blend_epi16(q31_even, q31_odd, 0xCC);

        let remainder = _mm256_add_epi32(_mm256_and_si256(q31, p.remainder_mask),
                                         _mm256_cmpgt_epi32(_mm256_setzero_si256(), q31));
        _mm256_sub_epi32(_mm256_sra_epi32(q31, p.shift),
                         _mm256_cmpgt_epi32(remainder, p.remainder_threshold))
    }

    /// Saturating narrow of 8 × i32 (as one AVX2 vector) to 8 × i16
    #[inline(always)]
    unsafe fn pack_avx2(v: __m256i) -> __m128i {
        _mm_packs_epi32(_mm256_castsi256_si128(v), _mm256_extracti128_si256(v, 1))
    }

    impl Qs8Lanes for Sse41Mul32 {
        const TILE: usize = 8;
        type Acc = [__m128i; 2];
        type Params = Sse41Params;

        #[inline(always)]
        unsafe fn prepare(params: &Qs8RequantParams) -> Sse41Params {
            Sse41Params {
                multiplier: _mm_set1_epi32(params.multiplier),
                rounding: _mm_set1_epi64x(params.rounding),
                remainder_mask: _mm_set1_epi32(params.remainder_mask),
                remainder_threshold: _mm_set1_epi32(params.remainder_threshold),
                shift: _mm_cvtsi32_si128(params.shift as i32),
                output: output_params(params),
            }
        }

        #[inline(always)]
        unsafe fn load_bias(w: *const u8) -> Self::Acc {
            [_mm_loadu_si128(w as *const __m128i),
             _mm_loadu_si128(w.add(16) as *const __m128i)]
        }

        #[inline(always)]
        unsafe fn multiply_add(acc: Self::Acc, i: *const i8, k: *const i8) -> Self::Acc {
            let [i0, i1] = load8_widen_sse41(i);
            let [k0, k1] = load8_widen_sse41(k);
            [_mm_add_epi32(acc[0], _mm_mullo_epi32(i0, k0)),
             _mm_add_epi32(acc[1], _mm_mullo_epi32(i1, k1))]
        }

        #[inline(always)]
        unsafe fn requantize_store(acc: Self::Acc, p: &Sse41Params, output: *mut i8) {
            let v = _mm_packs_epi32(scale_sse41(acc[0], p), scale_sse41(acc[1], p));
            let v = offset_clamp(v, &p.output);
            _mm_storel_epi64(output as *mut __m128i, _mm_packs_epi16(v, v));
        }
    }

    #[inline(always)]
    unsafe fn prepare_avx2(params: &Qs8RequantParams) -> Avx2Params {
        Avx2Params {
            multiplier: _mm256_set1_epi32(params.multiplier),
            rounding: _mm256_set1_epi64x(params.rounding),
            remainder_mask: _mm256_set1_epi32(params.remainder_mask),
            remainder_threshold: _mm256_set1_epi32(params.remainder_threshold),
            shift: _mm_cvtsi32_si128(params.shift as i32),
            output: output_params(params),
        }
    }

    impl Qs8Lanes for Avx2Mul32 {
        const TILE: usize = 8;
        type Acc = __m256i;
        type Params = Avx2Params;

        #[inline(always)]
        unsafe fn prepare(params: &Qs8RequantParams) -> Avx2Params {
            prepare_avx2(params)
        }

        #[inline(always)]
        unsafe fn load_bias(w: *const u8) -> __m256i {
            _mm256_loadu_si256(w as *const __m256i)
        }

        #[inline(always)]
        unsafe fn multiply_add(acc: __m256i, i: *const i8, k: *const i8) -> __m256i {
            _mm256_add_epi32(acc, _mm256_mullo_epi32(load8_widen_avx2(i), load8_widen_avx2(k)))
        }

        #[inline(always)]
        unsafe fn requantize_store(acc: __m256i, p: &Avx2Params, output: *mut i8) {
            let v = offset_clamp(pack_avx2(scale_avx2(acc, p)), &p.output);
            _mm_storel_epi64(output as *mut __m128i, _mm_packs_epi16(v, v));
        }
    }

    impl Qs8Lanes for Avx2Mul32x16 {
        const TILE: usize = 16;
        type Acc = [__m256i; 2];
        type Params = Avx2Params;

        #[inline(always)]
        unsafe fn prepare(params: &Qs8RequantParams) -> Avx2Params {
            prepare_avx2(params)
        }

        #[inline(always)]
        unsafe fn load_bias(w: *const u8) -> Self::Acc {
            [_mm256_loadu_si256(w as *const __m256i),
             _mm256_loadu_si256(w.add(32) as *const __m256i)]
        }

        #[inline(always)]
        unsafe fn multiply_add(acc: Self::Acc, i: *const i8, k: *const i8) -> Self::Acc {
            let lo = _mm256_mullo_epi32(load8_widen_avx2(i), load8_widen_avx2(k));
            let hi = _mm256_mullo_epi32(load8_widen_avx2(i.add(8)), load8_widen_avx2(k.add(8)));
            [_mm256_add_epi32(acc[0], lo), _mm256_add_epi32(acc[1], hi)]
        }

        #[inline(always)]
        unsafe fn requantize_store(acc: Self::Acc, p: &Avx2Params, output: *mut i8) {
            let lo = offset_clamp(pack_avx2(scale_avx2(acc[0], p)), &p.output);
            let hi = offset_clamp(pack_avx2(scale_avx2(acc[1], p)), &p.output);
            _mm_storeu_si128(output as *mut __m128i, _mm_packs_epi16(lo, hi));
        }
    }
}

#[cfg(target_arch="aarch64")]
pub(crate) use self::aarch64::NeonMul32;

#[cfg(target_arch="aarch64")]
mod aarch64 {
    use core::arch::aarch64::*;

    use crate::kernel::Qs8Lanes;
    use crate::requantization::Qs8RequantParams;

    /// NEON, 8 channels in two vectors of 4
    pub(crate) enum NeonMul32 {}

    #[derive(Copy, Clone)]
    pub(crate) struct NeonParams {
        multiplier: int32x4_t,
        rounding: int64x2_t,
        remainder_mask: int32x4_t,
        remainder_threshold: int32x4_t,
        /// negated, for `vshlq_s32`
        right_shift: int32x4_t,
        zero_point: int16x8_t,
        min: int16x8_t,
        max: int16x8_t,
    }

    #[inline(always)]
    unsafe fn scale_neon(acc: int32x4_t, p: &NeonParams) -> int32x4_t {
        let product_lo = vaddq_s64(vmull_s32(vget_low_s32(acc), vget_low_s32(p.multiplier)),
                                   p.rounding);
        let product_hi = vaddq_s64(vmull_high_s32(acc, p.multiplier), p.rounding);
        let q31 = vcombine_s32(vmovn_s64(vshrq_n_s64::<31>(product_lo)),
                               vmovn_s64(vshrq_n_s64::<31>(product_hi)));

        let negative = vreinterpretq_s32_u32(vcltq_s32(q31, vdupq_n_s32(0)));
        let remainder = vaddq_s32(vandq_s32(q31, p.remainder_mask), negative);
        let round_up = vreinterpretq_s32_u32(vcgtq_s32(remainder, p.remainder_threshold));
        vsubq_s32(vshlq_s32(q31, p.right_shift), round_up)
    }

    impl Qs8Lanes for NeonMul32 {
        const TILE: usize = 8;
        type Acc = [int32x4_t; 2];
        type Params = NeonParams;

        #[inline(always)]
        unsafe fn prepare(params: &Qs8RequantParams) -> NeonParams {
            NeonParams {
                multiplier: vdupq_n_s32(params.multiplier),
                rounding: vdupq_n_s64(params.rounding),
                remainder_mask: vdupq_n_s32(params.remainder_mask),
                remainder_threshold: vdupq_n_s32(params.remainder_threshold),
                right_shift: vdupq_n_s32(-(params.shift as i32)),
                zero_point: vdupq_n_s16(params.output_zero_point as i16),
                min: vdupq_n_s16(params.output_min as i16),
                max: vdupq_n_s16(params.output_max as i16),
            }
        }

        #[inline(always)]
        unsafe fn load_bias(w: *const u8) -> Self::Acc {
            [vreinterpretq_s32_u8(vld1q_u8(w)), vreinterpretq_s32_u8(vld1q_u8(w.add(16)))]
        }

        #[inline(always)]
        unsafe fn multiply_add(acc: Self::Acc, i: *const i8, k: *const i8) -> Self::Acc {
            let vi = vmovl_s8(vld1_s8(i));
            let vk = vmovl_s8(vld1_s8(k));
            [vmlal_s16(acc[0], vget_low_s16(vi), vget_low_s16(vk)),
             vmlal_high_s16(acc[1], vi, vk)]
        }

        #[inline(always)]
        unsafe fn requantize_store(acc: Self::Acc, p: &NeonParams, output: *mut i8) {
            let v = vcombine_s16(vqmovn_s32(scale_neon(acc[0], p)),
                                 vqmovn_s32(scale_neon(acc[1], p)));
            let v = vqaddq_s16(v, p.zero_point);
            let v = vminq_s16(vmaxq_s16(v, p.min), p.max);
            vst1_s8(output, vqmovn_s16(v));
        }
    }
}
