// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Error vocabulary for the filesystem-operation boundary.
//!
//! Startup/CLI code uses `anyhow::Result`; everything below
//! `OperationDispatcher` returns `Result<T, nix::errno::Errno>` so the
//! FUSE bridge has a fixed, small set of outcomes to map onto
//! `reply.error(..)`.

pub use nix::errno::Errno;

/// Converts an `Errno` into the `i32` that `fuser`'s reply types expect.
pub fn errno_to_raw(e: Errno) -> i32 {
    e as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_round_trips_to_raw() {
        assert_eq!(errno_to_raw(Errno::ENOENT), Errno::ENOENT as i32);
        assert_eq!(errno_to_raw(Errno::EACCES), Errno::EACCES as i32);
        assert_ne!(errno_to_raw(Errno::ENOENT), errno_to_raw(Errno::EACCES));
    }
}
