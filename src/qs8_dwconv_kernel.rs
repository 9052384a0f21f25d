// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Quantized (signed 8-bit) depthwise convolution kernels.
//!
//! Each variant is named `qs8_dwconv_up{tile}x{taps}_{isa}`: it computes
//! `tile` channels at a time over a `taps` element receptive field.

use crate::cursor::InputRow;
use crate::dwconv::{dwconv_loop, packed_weights_len, Qs8DwConvFn};
use crate::kernel::Isa;
use crate::qs8_lanes::Portable;
use crate::requantization::Qs8RequantParams;

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
use crate::qs8_lanes::{Avx2Mul32, Avx2Mul32x16, Sse41Mul32};
#[cfg(target_arch="aarch64")]
use crate::qs8_lanes::NeonMul32;

/// A depthwise convolution kernel variant.
#[derive(Copy, Clone)]
pub struct Qs8DwConvUkernel {
    pub name: &'static str,
    pub isa: Isa,
    /// Channels per tile; the packed weights must use the same tile
    pub channel_tile: usize,
    /// Receptive field size (9 for 3×3, 25 for 5×5)
    pub taps: usize,
    kernel: Qs8DwConvFn,
}

impl Qs8DwConvUkernel {
    /// Raw entry point, see `Qs8DwConvFn` for the argument order.
    pub fn function(&self) -> Qs8DwConvFn { self.kernel }

    /// Compute `output_width` output pixels of `channels` channels each.
    ///
    /// + `input`: row table, `taps` entries per pixel, the table start
    ///   advancing by `input_stride` entries per pixel
    /// + `input_offset`: added to every `Data` row before reading
    ///   `channels` bytes
    /// + `weights`: from `pack_dwconv_weights` with this kernel's
    ///   `channel_tile` and `taps`
    /// + `output`: pixels of `channels` bytes, separated by
    ///   `output_increment` bytes that are left untouched
    ///
    /// ***Panics*** if the kernel's ISA is not available, if a count is zero
    /// or if any buffer is too short for the declared extents.
    pub fn run(&self,
               channels: usize,
               output_width: usize,
               input: &[InputRow<'_>],
               input_stride: usize,
               input_offset: usize,
               weights: &[u8],
               output: &mut [i8],
               output_increment: usize,
               params: &Qs8RequantParams)
    {
        assert!(self.isa.is_available(), "{}: {:?} is not available", self.name, self.isa);
        assert_ne!(channels, 0);
        assert_ne!(output_width, 0);
        assert!(input.len() >= (output_width - 1) * input_stride + self.taps,
                "row table has {} entries", input.len());
        for x in 0..output_width {
            let window = &input[x * input_stride..x * input_stride + self.taps];
            for row in window {
                if let InputRow::Data(row) = *row {
                    assert!(row.len() >= input_offset + channels,
                            "input row of {} bytes, needs {}", row.len(), input_offset + channels);
                }
            }
        }
        assert_eq!(weights.len(), packed_weights_len(channels, self.taps, self.channel_tile));
        assert!(output.len() >= (output_width - 1) * (channels + output_increment) + channels,
                "output has {} bytes", output.len());

        unsafe {
            (self.kernel)(channels, output_width, input.as_ptr(), weights.as_ptr(),
                          output.as_mut_ptr(), input_stride, output_increment, input_offset,
                          params)
        }
    }
}

impl core::fmt::Debug for Qs8DwConvUkernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Qs8DwConvUkernel")
            .field("name", &self.name)
            .field("isa", &self.isa)
            .field("channel_tile", &self.channel_tile)
            .field("taps", &self.taps)
            .finish()
    }
}

macro_rules! dwconv_ukernel {
    ($(#[$attr:meta])* $name:ident: $lanes:ty, $taps:expr) => {
        $(#[$attr])*
        unsafe fn $name(channels: usize, output_width: usize, input: *const InputRow<'_>,
                        weights: *const u8, output: *mut i8, input_stride: usize,
                        output_increment: usize, input_offset: usize,
                        params: &Qs8RequantParams)
        {
            dwconv_loop::<$lanes, { $taps }>(channels, output_width, input, weights, output,
                                         input_stride, output_increment, input_offset, params)
        }
    };
}

macro_rules! catalog_entry {
    ($name:ident, $isa:ident, $tile:expr, $taps:expr) => {
        Qs8DwConvUkernel {
            name: stringify!($name),
            isa: Isa::$isa,
            channel_tile: $tile,
            taps: $taps,
            kernel: $name,
        }
    };
}

dwconv_ukernel!(#[inline(never)] qs8_dwconv_up1x9_scalar: Portable<1>, 9);
dwconv_ukernel!(#[inline(never)] qs8_dwconv_up2x9_scalar: Portable<2>, 9);
dwconv_ukernel!(#[inline(never)] qs8_dwconv_up4x9_scalar: Portable<4>, 9);
dwconv_ukernel!(#[inline(never)] qs8_dwconv_up1x25_scalar: Portable<1>, 25);
dwconv_ukernel!(#[inline(never)] qs8_dwconv_up2x25_scalar: Portable<2>, 25);

dwconv_ukernel!(
    #[target_feature(enable="sse4.1")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    qs8_dwconv_up8x9_sse41: Sse41Mul32, 9);
dwconv_ukernel!(
    #[target_feature(enable="avx2")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    qs8_dwconv_up8x9_avx2: Avx2Mul32, 9);
dwconv_ukernel!(
    #[target_feature(enable="avx2")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    qs8_dwconv_up16x9_avx2: Avx2Mul32x16, 9);
dwconv_ukernel!(
    #[target_feature(enable="avx2")]
    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    qs8_dwconv_up8x25_avx2: Avx2Mul32, 25);

dwconv_ukernel!(
    #[target_feature(enable="neon")]
    #[cfg(target_arch="aarch64")]
    qs8_dwconv_up8x9_neon: NeonMul32, 9);
dwconv_ukernel!(
    #[target_feature(enable="neon")]
    #[cfg(target_arch="aarch64")]
    qs8_dwconv_up8x25_neon: NeonMul32, 25);

// best first, within each tap count
#[cfg(any(target_arch="x86", target_arch="x86_64"))]
const ARCH_KERNELS: &[Qs8DwConvUkernel] = &[
    catalog_entry!(qs8_dwconv_up16x9_avx2, Avx2, 16, 9),
    catalog_entry!(qs8_dwconv_up8x9_avx2, Avx2, 8, 9),
    catalog_entry!(qs8_dwconv_up8x25_avx2, Avx2, 8, 25),
    catalog_entry!(qs8_dwconv_up8x9_sse41, Sse41, 8, 9),
];

#[cfg(target_arch="aarch64")]
const ARCH_KERNELS: &[Qs8DwConvUkernel] = &[
    catalog_entry!(qs8_dwconv_up8x9_neon, Neon, 8, 9),
    catalog_entry!(qs8_dwconv_up8x25_neon, Neon, 8, 25),
];

#[cfg(not(any(target_arch="x86", target_arch="x86_64", target_arch="aarch64")))]
const ARCH_KERNELS: &[Qs8DwConvUkernel] = &[];

const PORTABLE_KERNELS: &[Qs8DwConvUkernel] = &[
    catalog_entry!(qs8_dwconv_up4x9_scalar, Scalar, 4, 9),
    catalog_entry!(qs8_dwconv_up2x9_scalar, Scalar, 2, 9),
    catalog_entry!(qs8_dwconv_up1x9_scalar, Scalar, 1, 9),
    catalog_entry!(qs8_dwconv_up2x25_scalar, Scalar, 2, 25),
    catalog_entry!(qs8_dwconv_up1x25_scalar, Scalar, 1, 25),
];

/// All depthwise convolution variants compiled for this target, whether or
/// not the running cpu supports them.
pub fn qs8_dwconv_ukernels() -> impl Iterator<Item=&'static Qs8DwConvUkernel> {
    ARCH_KERNELS.iter().chain(PORTABLE_KERNELS)
}

/// The preferred available variant for a `taps` element receptive field.
pub fn select_qs8_dwconv(taps: usize) -> Option<&'static Qs8DwConvUkernel> {
    let selected = qs8_dwconv_ukernels()
        .find(|k| k.taps == taps && k.isa.is_available());
    dprint!("qs8 dwconv: selected {:?} for {} taps", selected.map(|k| k.name), taps);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwconv::pack_dwconv_weights;

    /// Plain reference: `channels` × `taps` dot products, requantized
    fn reference(channels: usize, taps: usize, rows: &[InputRow<'_>], input_offset: usize,
                 kernel: &[i8], bias: &[i32], params: &Qs8RequantParams) -> Vec<i8>
    {
        (0..channels).map(|c| {
            let mut acc = bias[c];
            for t in 0..taps {
                let x = match rows[t] {
                    InputRow::Zero => 0,
                    InputRow::Data(row) => row[input_offset + c] as i32,
                };
                acc = acc.wrapping_add(x * kernel[t * channels + c] as i32);
            }
            crate::requantization::requantize(acc, params)
        })
        .collect()
    }

    fn test_a_kernel(_name: &str, kernel: Qs8DwConvFn, tile: usize, taps: usize)
    {
        let params = Qs8RequantParams::new(0.0123, -3, -100, 110).unwrap();
        for &channels in &[1, tile - 1, tile, tile + 1, 2 * tile + 3] {
            if channels == 0 { continue; }
            let data: Vec<Vec<i8>> = (0..taps)
                .map(|t| (0..channels + 5).map(|c| (c * 7 + t * 13) as i8).collect())
                .collect();
            let rows: Vec<InputRow<'_>> = data.iter().enumerate()
                .map(|(t, row)| if t % 4 == 3 { InputRow::Zero } else { InputRow::Data(row) })
                .collect();
            let weights: Vec<i8> = (0..taps * channels).map(|i| (i * 31) as i8).collect();
            let bias: Vec<i32> = (0..channels).map(|c| c as i32 * 1000 - 5000).collect();
            let mut packed = vec![0; packed_weights_len(channels, taps, tile)];
            pack_dwconv_weights(channels, taps, tile, &weights, Some(&bias[..]), &mut packed);

            let mut output = vec![0x55i8; channels + 1];
            unsafe {
                kernel(channels, 1, rows.as_ptr(), packed.as_ptr(), output.as_mut_ptr(),
                       taps, 0, 5, &params);
            }
            let expected = reference(channels, taps, &rows, 5, &weights, &bias, &params);
            assert_eq!(&output[..channels], &expected[..], "{} channels={}", _name, channels);
            assert_eq!(output[channels], 0x55, "{} wrote past the end", _name);
        }
    }

    #[test]
    fn test_scalar_kernels() {
        test_a_kernel("up1x9", qs8_dwconv_up1x9_scalar, 1, 9);
        test_a_kernel("up2x9", qs8_dwconv_up2x9_scalar, 2, 9);
        test_a_kernel("up4x9", qs8_dwconv_up4x9_scalar, 4, 9);
        test_a_kernel("up1x25", qs8_dwconv_up1x25_scalar, 1, 25);
        test_a_kernel("up2x25", qs8_dwconv_up2x25_scalar, 2, 25);
    }

    #[test]
    fn catalog_is_consistent() {
        for k in qs8_dwconv_ukernels() {
            assert!(k.name.contains(&format!("up{}x{}", k.channel_tile, k.taps)), "{:?}", k);
        }
        assert_eq!(select_qs8_dwconv(9).map(|k| k.taps), Some(9));
        assert_eq!(select_qs8_dwconv(25).map(|k| k.taps), Some(25));
        assert!(select_qs8_dwconv(4).is_none());
    }

    #[cfg(any(target_arch="x86", target_arch="x86_64"))]
    mod test_arch_kernels {
        use super::test_a_kernel;
        macro_rules! test_arch_kernels_x86 {
            ($($feature_name:tt, $function_name:ident, $tile:expr, $taps:expr),*) => {
                $(
                #[test]
                fn $function_name() {
                    if is_x86_feature_detected_!($feature_name) {
                        test_a_kernel(stringify!($function_name), super::super::$function_name,
                                      $tile, $taps);
                    } else {
                        println!("Skipping, host does not have feature: {:?}", $feature_name);
                    }
                }
                )*
            }
        }

        test_arch_kernels_x86! {
            "sse4.1", qs8_dwconv_up8x9_sse41, 8, 9,
            "avx2", qs8_dwconv_up8x9_avx2, 8, 9,
            "avx2", qs8_dwconv_up16x9_avx2, 16, 9,
            "avx2", qs8_dwconv_up8x25_avx2, 8, 25
        }
    }

    #[cfg(target_arch="aarch64")]
    mod test_arch_kernels {
        use super::test_a_kernel;
        macro_rules! test_arch_kernels_aarch64 {
            ($($feature_name:tt, $function_name:ident, $tile:expr, $taps:expr),*) => {
                $(
                #[test]
                fn $function_name() {
                    if is_aarch64_feature_detected_!($feature_name) {
                        test_a_kernel(stringify!($function_name), super::super::$function_name,
                                      $tile, $taps);
                    } else {
                        println!("Skipping, host does not have feature: {:?}", $feature_name);
                    }
                }
                )*
            }
        }

        test_arch_kernels_aarch64! {
            "neon", qs8_dwconv_up8x9_neon, 8, 9,
            "neon", qs8_dwconv_up8x25_neon, 8, 25
        }
    }
}
