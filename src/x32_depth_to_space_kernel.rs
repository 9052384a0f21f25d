// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Depth to space for 32-bit elements, planar (CHW) input to interleaved
//! (HWC) output.
//!
//! Input channel `c·bs² + by·bs + bx` at `(iy, ix)` moves to output channel
//! `c` at `(iy·bs + by, ix·bs + bx)`.

use core::mem::size_of;

use rawpointer::PointerExt;

use crate::kernel::Isa;

/// Byte increments of the five traversal axes on each side.
///
/// ```text
/// output[(iy·bs + by)·ohs + (ix·bs + bx)·ows + c·es]
///     = input[(c·bs² + by·bs + bx)·ics + iy·ihs + ix·es]
/// ```
///
/// with `bs` the block size, `es` the element size and the four strides
/// given in bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DepthToSpaceStrides {
    c_input: usize,
    by_input: usize,
    bx_input: usize,
    iy_input: usize,
    ix_input: usize,
    c_output: usize,
    by_output: usize,
    bx_output: usize,
    iy_output: usize,
    ix_output: usize,
}

impl DepthToSpaceStrides {
    pub fn new(block_size: usize,
               element_size: usize,
               input_channel_stride: usize,
               input_height_stride: usize,
               output_height_stride: usize,
               output_width_stride: usize) -> Self
    {
        DepthToSpaceStrides {
            c_input: block_size * block_size * input_channel_stride,
            by_input: block_size * input_channel_stride,
            bx_input: input_channel_stride,
            iy_input: input_height_stride,
            ix_input: element_size,
            c_output: element_size,
            by_output: output_height_stride,
            bx_output: output_width_stride,
            iy_output: block_size * output_height_stride,
            ix_output: block_size * output_width_stride,
        }
    }

    /// Byte offset of input element `(c, by, bx)` at `(iy, ix)`
    pub fn input_offset(&self, c: usize, by: usize, bx: usize, iy: usize, ix: usize) -> usize {
        c * self.c_input + by * self.by_input + bx * self.bx_input
            + iy * self.iy_input + ix * self.ix_input
    }

    /// Byte offset of output channel `c` at `(iy·bs + by, ix·bs + bx)`
    pub fn output_offset(&self, c: usize, by: usize, bx: usize, iy: usize, ix: usize) -> usize {
        c * self.c_output + by * self.by_output + bx * self.bx_output
            + iy * self.iy_output + ix * self.ix_output
    }
}

/// Raw entry point: `output_channels`, `input_height`, `input_width`,
/// `block_size`, `input`, `output`, then the byte strides
/// `input_channel_stride`, `input_height_stride`, `output_height_stride`,
/// `output_width_stride`.
pub type X32DepthToSpaceFn = unsafe fn(usize, usize, usize, usize, *const u32, *mut u32,
                                       usize, usize, usize, usize);

#[inline(always)]
unsafe fn copy_channels(channels: usize, i: *const u8, o: *mut u8, s: &DepthToSpaceStrides) {
    for c in 0..channels {
        let src = i.stride_offset(s.c_input as isize, c) as *const u32;
        let dst = o.stride_offset(s.c_output as isize, c) as *mut u32;
        *dst = *src;
    }
}

// the five nested loops, block columns unrolled by `$unroll`
macro_rules! depth_to_space_ukernel {
    ($name:ident, $unroll:tt) => {
        unsafe fn $name(output_channels: usize,
                        input_height: usize,
                        input_width: usize,
                        block_size: usize,
                        input: *const u32,
                        output: *mut u32,
                        input_channel_stride: usize,
                        input_height_stride: usize,
                        output_height_stride: usize,
                        output_width_stride: usize)
        {
            debug_assert_ne!(output_channels, 0);
            debug_assert_ne!(input_height, 0);
            debug_assert_ne!(input_width, 0);
            debug_assert_ne!(block_size, 0);

            let s = DepthToSpaceStrides::new(block_size, size_of::<u32>(),
                                             input_channel_stride, input_height_stride,
                                             output_height_stride, output_width_stride);

            let mut i_iy = input as *const u8;
            let mut o_iy = output as *mut u8;
            for _ in 0..input_height {
                let mut i_by = i_iy;
                let mut o_by = o_iy;
                for _ in 0..block_size {
                    let mut i_ix = i_by;
                    let mut o_ix = o_by;
                    for _ in 0..input_width {
                        let mut i_bx = i_ix;
                        let mut o_bx = o_ix;
                        unroll_by!($unroll => block_size, {
                            copy_channels(output_channels, i_bx, o_bx, &s);
                            i_bx = i_bx.wrapping_add(s.bx_input);
                            o_bx = o_bx.wrapping_add(s.bx_output);
                        });
                        i_ix = i_ix.wrapping_add(s.ix_input);
                        o_ix = o_ix.wrapping_add(s.ix_output);
                    }
                    i_by = i_by.wrapping_add(s.by_input);
                    o_by = o_by.wrapping_add(s.by_output);
                }
                i_iy = i_iy.wrapping_add(s.iy_input);
                o_iy = o_iy.wrapping_add(s.iy_output);
            }
        }
    };
}

depth_to_space_ukernel!(x32_depth_to_space_chw2hwc_scalar_c1_ib1, 1);
depth_to_space_ukernel!(x32_depth_to_space_chw2hwc_scalar_c1_ib2, 2);
depth_to_space_ukernel!(x32_depth_to_space_chw2hwc_scalar_c1_ib4, 4);

/// A depth to space kernel variant.
#[derive(Copy, Clone)]
pub struct X32DepthToSpaceUkernel {
    pub name: &'static str,
    pub isa: Isa,
    /// Unroll factor of the block column loop
    pub block_unroll: usize,
    kernel: X32DepthToSpaceFn,
}

impl X32DepthToSpaceUkernel {
    pub fn function(&self) -> X32DepthToSpaceFn { self.kernel }

    /// Rearrange `output_channels · block_size²` input planes of
    /// `input_height × input_width` into an interleaved output of
    /// `input_height · block_size` rows and `input_width · block_size`
    /// columns. All strides are in bytes.
    ///
    /// ***Panics*** if a count is zero, if a stride is not a multiple of the
    /// element size, or if the largest offset on either side is outside its
    /// slice.
    pub fn run(&self,
               output_channels: usize,
               input_height: usize,
               input_width: usize,
               block_size: usize,
               input: &[u32],
               output: &mut [u32],
               input_channel_stride: usize,
               input_height_stride: usize,
               output_height_stride: usize,
               output_width_stride: usize)
    {
        const ES: usize = size_of::<u32>();
        assert!(self.isa.is_available());
        assert_ne!(output_channels, 0);
        assert_ne!(input_height, 0);
        assert_ne!(input_width, 0);
        assert_ne!(block_size, 0);
        for &stride in &[input_channel_stride, input_height_stride,
                         output_height_stride, output_width_stride] {
            assert_eq!(stride % ES, 0, "stride {} is not a multiple of {}", stride, ES);
        }

        let s = DepthToSpaceStrides::new(block_size, ES, input_channel_stride,
                                         input_height_stride, output_height_stride,
                                         output_width_stride);
        let last = (output_channels - 1, block_size - 1, block_size - 1,
                    input_height - 1, input_width - 1);
        let input_end = s.input_offset(last.0, last.1, last.2, last.3, last.4) + ES;
        let output_end = s.output_offset(last.0, last.1, last.2, last.3, last.4) + ES;
        assert!(input_end <= input.len() * ES, "input needs {} bytes", input_end);
        assert!(output_end <= output.len() * ES, "output needs {} bytes", output_end);

        unsafe {
            (self.kernel)(output_channels, input_height, input_width, block_size,
                          input.as_ptr(), output.as_mut_ptr(),
                          input_channel_stride, input_height_stride,
                          output_height_stride, output_width_stride)
        }
    }
}

impl core::fmt::Debug for X32DepthToSpaceUkernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("X32DepthToSpaceUkernel")
            .field("name", &self.name)
            .field("isa", &self.isa)
            .field("block_unroll", &self.block_unroll)
            .finish()
    }
}

const KERNELS: &[X32DepthToSpaceUkernel] = &[
    X32DepthToSpaceUkernel {
        name: "x32_depth_to_space_chw2hwc_scalar_c1_ib1",
        isa: Isa::Scalar,
        block_unroll: 1,
        kernel: x32_depth_to_space_chw2hwc_scalar_c1_ib1,
    },
    X32DepthToSpaceUkernel {
        name: "x32_depth_to_space_chw2hwc_scalar_c1_ib2",
        isa: Isa::Scalar,
        block_unroll: 2,
        kernel: x32_depth_to_space_chw2hwc_scalar_c1_ib2,
    },
    X32DepthToSpaceUkernel {
        name: "x32_depth_to_space_chw2hwc_scalar_c1_ib4",
        isa: Isa::Scalar,
        block_unroll: 4,
        kernel: x32_depth_to_space_chw2hwc_scalar_c1_ib4,
    },
];

/// All depth to space variants.
pub fn x32_depth_to_space_ukernels() -> impl Iterator<Item=&'static X32DepthToSpaceUkernel> {
    KERNELS.iter()
}
