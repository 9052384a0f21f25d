// Copyright 2016 - 2018 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::cmp::min;

#[derive(Copy, Clone)]
pub struct RangeChunk { i: usize, n: usize, chunk: usize }

/// Create an iterator that splits `n` in chunks of size `chunk`;
/// the last item can be an uneven chunk.
///
/// Kernels use this to walk channels (or batch elements) tile by tile:
/// every item but the last has length `chunk`, the last one is the
/// remainder tile when `n` is not a multiple of `chunk`.
pub fn range_chunk(n: usize, chunk: usize) -> RangeChunk {
    debug_assert_ne!(chunk, 0);
    RangeChunk {
        i: 0,
        n,
        chunk,
    }
}

impl Iterator for RangeChunk {
    type Item = (usize, usize);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.n == 0 {
            None
        } else {
            let i = self.i;
            let rem = min(self.n, self.chunk);
            self.i += 1;
            self.n -= rem;
            Some((i, rem))
        }
    }
}

#[inline]
pub fn round_up_to(x: usize, multiple_of: usize) -> usize {
    let (mut d, r) = (x / multiple_of, x % multiple_of);
    if r > 0 { d += 1; }
    d * multiple_of
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_end_with_remainder() {
        let chunks: Vec<_> = range_chunk(19, 8).collect();
        assert_eq!(chunks, vec![(0, 8), (1, 8), (2, 3)]);
        let chunks: Vec<_> = range_chunk(16, 8).collect();
        assert_eq!(chunks, vec![(0, 8), (1, 8)]);
        assert_eq!(range_chunk(0, 4).count(), 0);
    }

    #[test]
    fn round_up() {
        assert_eq!(round_up_to(0, 8), 0);
        assert_eq!(round_up_to(1, 8), 8);
        assert_eq!(round_up_to(8, 8), 8);
        assert_eq!(round_up_to(9, 4), 12);
    }
}
