// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//!
//! Micro-kernels for quantized and floating point neural network
//! primitives.
//!
//! - Signed 8-bit depthwise convolution (3×3 and 5×5 receptive fields) with
//!   fixed-point requantization
//! - Elementwise f32 square root
//! - Depth to space for 32-bit elements, CHW to HWC
//!
//! ## Kernels
//!
//! Each kernel family has portable variants available on all targets and
//! variants for specific instruction sets, described by [`Isa`]:
//!
//! - *x86* and *x86-64*: `sse2`, `sse4.1`, `avx2`, `fma`
//! - *aarch64*: `neon`
//!
//! Every variant of a family computes the same result (the quantized ones
//! byte for byte). A variant is described by a small struct with its name,
//! ISA and tile size, and a safe `run` method that checks the buffer extents
//! before calling the kernel. The catalogs (`qs8_dwconv_ukernels()` and so
//! on) list everything compiled for the target; the `select_*` functions
//! pick the preferred variant the running cpu supports.
//!
//! ## Depthwise Convolution Input
//!
//! The input of a depthwise convolution is an indirection table: `taps`
//! [`InputRow`] entries per output pixel, each either a row of the input
//! image or the zero-padding marker [`InputRow::Zero`]. Weights and biases
//! are packed per channel tile with [`pack_dwconv_weights`].
//!
//! ## Other Notes
//!
//! Kernels are pure functions of their arguments; they do not allocate and
//! are safe to call from several threads at once on distinct outputs.
//!
//! Setting the compile time environment variable `QKTEST_FEATURE` to a
//! feature name (for example `avx2`) disables detection of all other
//! features, for testing.

#[macro_use] mod debugmacros;
#[macro_use] mod loopmacros;
#[macro_use] mod arch;

mod kernel;
mod util;
mod cursor;
mod requantization;
mod dwconv;
mod qs8_lanes;
mod qs8_dwconv_kernel;
mod f32_vsqrt_kernel;
mod x32_depth_to_space_kernel;

pub use crate::kernel::Isa;
pub use crate::requantization::{requantize, ParamsError, Qs8RequantParams, MIN_SCALE};
pub use crate::cursor::{InputRow, MAX_CHANNEL_TILE};
pub use crate::dwconv::{pack_dwconv_weights, packed_weights_len, Qs8DwConvFn};
pub use crate::qs8_dwconv_kernel::{qs8_dwconv_ukernels, select_qs8_dwconv, Qs8DwConvUkernel};
pub use crate::f32_vsqrt_kernel::{f32_vsqrt_ukernels, select_f32_vsqrt, F32UnaryFn,
                                  F32VSqrtUkernel};
pub use crate::x32_depth_to_space_kernel::{x32_depth_to_space_ukernels, DepthToSpaceStrides,
                                           X32DepthToSpaceFn, X32DepthToSpaceUkernel};
