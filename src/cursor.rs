// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Input row table entries and their resolution to read cursors.

use core::ptr;

/// Widest channel tile of any kernel variant
pub const MAX_CHANNEL_TILE: usize = 16;

/// Backing storage for padding rows; a zero row never advances, so one tile
/// of zeros stands in for a row of any length.
static ZERO_ROW: [i8; MAX_CHANNEL_TILE] = [0; MAX_CHANNEL_TILE];

/// One entry of the indirection table of a depthwise convolution: either
/// a real input row or the zero-padding marker.
///
/// `Zero` is a distinct variant, so a `Data` row that happens to contain
/// only zeros still takes the data path (and has `input_offset` applied).
#[derive(Copy, Clone, Debug)]
pub enum InputRow<'a> {
    /// Padding: read as an unbounded run of zeros
    Zero,
    /// A row of the input image; the kernel reads
    /// `[input_offset, input_offset + channels)`
    Data(&'a [i8]),
}

impl<'a> InputRow<'a> {
    /// Pointer to the start of the row, null for `Zero`
    #[inline(always)]
    pub fn as_ptr(&self) -> *const i8 {
        match *self {
            InputRow::Zero => ptr::null(),
            InputRow::Data(row) => row.as_ptr(),
        }
    }

    #[inline(always)]
    fn len(&self) -> usize {
        match *self {
            InputRow::Zero => 0,
            InputRow::Data(row) => row.len(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            InputRow::Zero => true,
            InputRow::Data(_) => false,
        }
    }
}

/// Pick `if_true` or `if_false` without a data dependent branch.
#[cfg(has_select_unpredictable)]
#[inline(always)]
pub(crate) fn select<T>(cond: bool, if_true: T, if_false: T) -> T {
    core::hint::select_unpredictable(cond, if_true, if_false)
}

/// Pick `if_true` or `if_false` without a data dependent branch.
#[cfg(not(has_select_unpredictable))]
#[inline(always)]
pub(crate) fn select<T: Copy>(cond: bool, if_true: T, if_false: T) -> T {
    [if_false, if_true][cond as usize]
}

/// Read cursor for one tap of the current output pixel.
///
/// A data row starts at `input_offset` and moves one channel tile per
/// `advance`; the zero row points at `ZERO_ROW` and stays put.
#[derive(Copy, Clone)]
pub(crate) struct RowCursor {
    ptr: *const i8,
    step: usize,
    #[cfg(debug_assertions)]
    end: *const i8,
}

impl RowCursor {
    #[inline(always)]
    pub(crate) fn zero() -> Self {
        RowCursor {
            ptr: ZERO_ROW.as_ptr(),
            step: 0,
            #[cfg(debug_assertions)]
            end: ZERO_ROW.as_ptr().wrapping_add(MAX_CHANNEL_TILE),
        }
    }

    /// Resolve a table entry to a cursor advancing by `tile` channels.
    #[inline(always)]
    pub(crate) fn resolve(row: &InputRow<'_>, input_offset: usize, tile: usize) -> Self {
        let data = row.as_ptr();
        let is_zero = data.is_null();
        let _len = row.len();
        RowCursor {
            ptr: select(is_zero, ZERO_ROW.as_ptr(), data.wrapping_add(input_offset)),
            step: select(is_zero, 0, tile),
            #[cfg(debug_assertions)]
            end: select(is_zero, ZERO_ROW.as_ptr().wrapping_add(MAX_CHANNEL_TILE),
                        data.wrapping_add(_len)),
        }
    }

    /// Current position; the caller reads `len` bytes from it.
    #[inline(always)]
    pub(crate) fn ptr(&self, len: usize) -> *const i8 {
        #[cfg(debug_assertions)]
        debug_assert!(self.ptr.wrapping_add(len) <= self.end,
                      "row read of {} bytes runs past the end of the row", len);
        let _ = len;
        self.ptr
    }

    #[inline(always)]
    pub(crate) fn advance(&mut self) {
        self.ptr = self.ptr.wrapping_add(self.step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_picks() {
        assert_eq!(select(true, 1, 2), 1);
        assert_eq!(select(false, 1, 2), 2);
    }

    #[test]
    fn zero_row_does_not_advance() {
        let mut c = RowCursor::resolve(&InputRow::Zero, 100, 8);
        let start = c.ptr(8);
        c.advance();
        c.advance();
        assert_eq!(c.ptr(8), start);
        assert_eq!(start, ZERO_ROW.as_ptr());
    }

    #[test]
    fn data_row_applies_offset() {
        let row = [0i8; 32];
        let mut c = RowCursor::resolve(&InputRow::Data(&row), 4, 8);
        assert_eq!(c.ptr(8), row[4..].as_ptr());
        c.advance();
        assert_eq!(c.ptr(8), row[12..].as_ptr());
    }

    #[test]
    fn zero_filled_data_is_not_padding() {
        let row = [0i8; 16];
        let entry = InputRow::Data(&row);
        assert!(!entry.is_zero());
        let c = RowCursor::resolve(&entry, 0, 8);
        assert_eq!(c.ptr(8), row.as_ptr());
        assert_ne!(c.ptr(8), ZERO_ROW.as_ptr());
    }
}
