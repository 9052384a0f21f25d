// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::mem::size_of;
use core::ptr::copy_nonoverlapping;

use crate::cursor::{InputRow, RowCursor, MAX_CHANNEL_TILE};
use crate::kernel::Qs8Lanes;
use crate::requantization::Qs8RequantParams;
use crate::util::{range_chunk, round_up_to};

/// Raw entry point of a quantized depthwise convolution kernel.
///
/// Arguments: `channels`, `output_width`, `input` (row table),
/// `weights` (packed), `output`, `input_stride` (row table entries per output
/// pixel), `output_increment` (bytes skipped after each pixel),
/// `input_offset` (bytes added to every data row), `params`.
pub type Qs8DwConvFn = for<'a> unsafe fn(usize, usize, *const InputRow<'a>, *const u8, *mut i8,
                                         usize, usize, usize, &Qs8RequantParams);

/// Length in bytes of the packed weights for a kernel with the given
/// channel tile and tap count.
pub fn packed_weights_len(channels: usize, taps: usize, channel_tile: usize) -> usize {
    round_up_to(channels, channel_tile) * (size_of::<i32>() + taps)
}

/// Pack a depthwise kernel for a variant with `channel_tile` lanes.
///
/// + `kernel`: `taps × channels` weights, tap major
/// + `bias`: one per channel, or zero if `None`
/// + `packed`: `packed_weights_len(channels, taps, channel_tile)` bytes
///
/// Each tile is written as `channel_tile` native endian i32 biases followed
/// by `taps` runs of `channel_tile` weights. The last tile is padded with
/// zero bias and zero weights.
pub fn pack_dwconv_weights(channels: usize, taps: usize, channel_tile: usize,
                           kernel: &[i8], bias: Option<&[i32]>, packed: &mut [u8])
{
    assert_ne!(channel_tile, 0);
    assert_eq!(kernel.len(), taps * channels);
    if let Some(bias) = bias {
        assert_eq!(bias.len(), channels);
    }
    assert_eq!(packed.len(), packed_weights_len(channels, taps, channel_tile));

    let tile_bytes = channel_tile * (size_of::<i32>() + taps);
    for (tile, packed_tile) in packed.chunks_exact_mut(tile_bytes).enumerate() {
        let (bias_bytes, weights) = packed_tile.split_at_mut(channel_tile * size_of::<i32>());
        for (lane, b) in bias_bytes.chunks_exact_mut(size_of::<i32>()).enumerate() {
            let c = tile * channel_tile + lane;
            let value = match bias {
                Some(bias) if c < channels => bias[c],
                _ => 0,
            };
            b.copy_from_slice(&value.to_ne_bytes());
        }
        for (tap, w) in weights.chunks_exact_mut(channel_tile).enumerate() {
            for (lane, elt) in w.iter_mut().enumerate() {
                let c = tile * channel_tile + lane;
                *elt = if c < channels { kernel[tap * channels + c] as u8 } else { 0 };
            }
        }
    }
}

/// The depthwise convolution loop, shared by every variant.
///
/// For each output pixel: resolve `TAPS` rows from the table, then walk
/// the channels one `L::TILE` at a time: bias, multiply-accumulate per tap,
/// requantize and store. A trailing partial tile is computed from inputs
/// copied into a zeroed tile on the stack, and only its `nc` valid bytes are
/// written, so nothing is read or written past the declared extents.
///
/// + `input`: `(output_width - 1) * input_stride + TAPS` entries
/// + `weights`: `packed_weights_len(channels, TAPS, L::TILE)` bytes
/// + `output`: `(output_width - 1) * (channels + output_increment) + channels`
///   bytes
#[inline(always)]
pub(crate) unsafe fn dwconv_loop<L: Qs8Lanes, const TAPS: usize>(
    channels: usize,
    output_width: usize,
    input: *const InputRow<'_>,
    weights: *const u8,
    output: *mut i8,
    input_stride: usize,
    output_increment: usize,
    input_offset: usize,
    params: &Qs8RequantParams)
{
    debug_assert_ne!(channels, 0);
    debug_assert_ne!(output_width, 0);
    debug_assert!(L::TILE <= MAX_CHANNEL_TILE);

    let vparams = L::prepare(params);
    let tile_bytes = L::TILE * (size_of::<i32>() + TAPS);

    let mut input = input;
    let mut output = output;
    for _ in 0..output_width {
        let mut rows = [RowCursor::zero(); TAPS];
        for (tap, row) in rows.iter_mut().enumerate() {
            *row = RowCursor::resolve(&*input.add(tap), input_offset, L::TILE);
        }
        input = input.wrapping_add(input_stride);

        let mut w = weights;
        for (_, nc) in range_chunk(channels, L::TILE) {
            let mut acc = L::load_bias(w);
            let k = w.add(L::TILE * size_of::<i32>()) as *const i8;
            if nc == L::TILE {
                for (tap, row) in rows.iter_mut().enumerate() {
                    acc = L::multiply_add(acc, row.ptr(L::TILE), k.add(tap * L::TILE));
                    row.advance();
                }
                L::requantize_store(acc, &vparams, output);
            } else {
                let mut tile = [0i8; MAX_CHANNEL_TILE];
                for (tap, row) in rows.iter().enumerate() {
                    copy_nonoverlapping(row.ptr(nc), tile.as_mut_ptr(), nc);
                    acc = L::multiply_add(acc, tile.as_ptr(), k.add(tap * L::TILE));
                }
                let mut out = [0i8; MAX_CHANNEL_TILE];
                L::requantize_store(acc, &vparams, out.as_mut_ptr());
                store_tail(out.as_ptr(), output, nc);
            }
            output = output.add(nc);
            w = w.add(tile_bytes);
        }
        output = output.wrapping_add(output_increment);
    }
}

/// Store `n < 16` bytes in descending power of two pieces
#[inline(always)]
unsafe fn store_tail(mut src: *const i8, mut dst: *mut i8, n: usize) {
    debug_assert!(n < MAX_CHANNEL_TILE);
    for &piece in &[8, 4, 2, 1] {
        if n & piece != 0 {
            copy_nonoverlapping(src, dst, piece);
            src = src.add(piece);
            dst = dst.add(piece);
        }
    }
}
