// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Compares a mount point's device id against the synthetic root's device
//! id. Equal device ids mean nothing is actually mounted there anymore
//! (the directory is still sitting directly on the synthetic root's own
//! filesystem) — either the mount command never succeeded or the real
//! filesystem was unmounted out from under us.

use nix::sys::stat::lstat;
use std::path::Path;

pub fn device_id(path: &Path) -> nix::Result<u64> {
    Ok(lstat(path)?.st_dev)
}

/// `true` if `mount_point` is stale relative to `synthetic_root_dev`.
pub fn is_stale(mount_point: &Path, synthetic_root_dev: u64) -> nix::Result<bool> {
    Ok(device_id(mount_point)? == synthetic_root_dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_device_is_stale() {
        let root = tempdir().unwrap();
        let root_dev = device_id(root.path()).unwrap();
        let child = root.path().join("child");
        std::fs::create_dir(&child).unwrap();
        assert!(is_stale(&child, root_dev).unwrap());
    }

    #[test]
    fn nonexistent_path_errors_rather_than_panics() {
        let missing = Path::new("/no/such/path-xyz");
        assert!(is_stale(missing, 0).is_err());
    }
}
