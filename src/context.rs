// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Bundles the process-scoped global state (registry, filters, synthetic
//! root, options) into a single value threaded through every dispatcher
//! call, per spec.md §9: "Re-implementations should bundle these into a
//! single context value passed to every dispatcher function." Shared
//! between the FUSE-serving thread and the auto-unmount timer thread behind
//! one `parking_lot::Mutex` + `Condvar` (see `scheduler.rs`), replacing the
//! original's signal-masked critical sections (SPEC_FULL.md §5.1).

use crate::cli::AfuseOptions;
use crate::filter::FilterSet;
use crate::handles::DirHandle;
use crate::mount_registry::MountRegistry;
use nix::dir::Dir;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct AfuseContext {
    pub registry: MountRegistry,
    pub filters: FilterSet,
    pub options: AfuseOptions,
    /// Absolute path of the real directory backing the synthetic root.
    pub synthetic_root: PathBuf,
    /// Device id of `synthetic_root`, captured once at startup.
    pub synthetic_root_dev: u64,
    /// The currently programmed timer deadline, so the scheduler only
    /// wakes the timer thread early when the minimum actually decreases.
    pub next_timer_fire: Option<u64>,
    /// Open directory streams, keyed by the opaque handle stored in each
    /// `Mount`'s `HandleSets`. A `nix::dir::Dir` owns its descriptor, so it
    /// cannot live as a bare integer the way open file descriptors do.
    pub open_dirs: HashMap<DirHandle, Dir>,
    /// Full entry list read from a proxy directory stream on the first
    /// `readdir` call against a handle, cached because `nix::dir::Dir`'s
    /// iterator is single-pass and the kernel re-issues `readdir` at a
    /// growing offset rather than rewinding. Cleared on `releasedir`.
    pub dir_entry_cache: HashMap<DirHandle, Vec<(String, bool)>>,
    next_dir_handle: DirHandle,
    pub logger: slog::Logger,
}

impl AfuseContext {
    pub fn new(
        options: AfuseOptions,
        synthetic_root: PathBuf,
        synthetic_root_dev: u64,
        logger: slog::Logger,
    ) -> Self {
        let filters = options
            .filter_file
            .as_deref()
            .map(FilterSet::from_file)
            .transpose()
            .unwrap_or_else(|e| {
                slog::warn!(logger, "ignoring unreadable filter_file: {}", e);
                None
            })
            .unwrap_or_default();

        AfuseContext {
            registry: MountRegistry::new(),
            filters,
            options,
            synthetic_root,
            synthetic_root_dev,
            next_timer_fire: None,
            open_dirs: HashMap::new(),
            dir_entry_cache: HashMap::new(),
            next_dir_handle: 1,
            logger,
        }
    }

    pub fn register_open_dir(&mut self, dir: Dir) -> DirHandle {
        let handle = self.next_dir_handle;
        self.next_dir_handle += 1;
        self.open_dirs.insert(handle, dir);
        handle
    }

    /// Force-closes every handle the superseded mount still had open. Used
    /// when a stale mount is remounted (SPEC_FULL.md §9 Open Question #1):
    /// rather than silently aliasing old handles into the new mount, they
    /// are invalidated so later operations on them observe a closed
    /// descriptor instead of data from an unrelated filesystem.
    pub fn invalidate_mount_handles(&mut self, root_name: &str) {
        let Some(mount) = self.registry.get(root_name) else {
            return;
        };
        let fds: Vec<_> = mount.handles.fds().copied().collect();
        let dirs: Vec<_> = mount.handles.dirs().copied().collect();
        for fd in fds {
            let _ = nix::unistd::close(fd);
        }
        for handle in dirs {
            self.open_dirs.remove(&handle);
            self.dir_entry_cache.remove(&handle);
        }
        if let Some(mount) = self.registry.get_mut(root_name) {
            mount.handles = crate::handles::HandleSets::new();
        }
    }
}
