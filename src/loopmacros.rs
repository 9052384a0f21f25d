// Copyright 2016 bluss
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

macro_rules! repeat {
    (1 $e:expr) => {
        $e;
    };
    (2 $e:expr) => {
        $e;$e;
    };
    (4 $e:expr) => {
        $e;$e; $e;$e;
    };
}

/// Evaluate `$e` `$ntimes` times: `$by` copies per iteration of the main
/// loop, then one at a time for the leftover `$ntimes % $by`.
macro_rules! unroll_by {
    ($by:tt => $ntimes:expr, $e:expr) => {{
        let k = $ntimes;
        for _ in 0..k / $by {
            repeat!($by $e);
        }
        for _ in 0..k % $by {
            $e
        }
    }}
}
