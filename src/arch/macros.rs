// Copyright 2016 - 2021 Ulrik Sverdrup "bluss"
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

macro_rules! compile_env_matches_or_is_empty {
    ($envvar:tt, $feature_name:tt) => {
        (match option_env!($envvar) {
            None => true,
            Some(v) => v == $feature_name
        })
    }
}

#[cfg(any(target_arch="x86", target_arch="x86_64"))]
macro_rules! is_x86_feature_detected_ {
    ($name:tt) => {
        // for testing purposes, we can make sure only one specific feature
        // is enabled by setting QKTEST_FEATURE=featurename (all others
        // disabled). This does not force it to be detected, it must also be.
        compile_env_matches_or_is_empty!("QKTEST_FEATURE", $name) && is_x86_feature_detected!($name)
    }
}

#[cfg(target_arch="aarch64")]
macro_rules! is_aarch64_feature_detected_ {
    ($name:tt) => {
        compile_env_matches_or_is_empty!("QKTEST_FEATURE", $name)
            && std::arch::is_aarch64_feature_detected!($name)
    }
}
