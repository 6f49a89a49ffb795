// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Startup: create the synthetic root, stat it for `syntheticRootDev`, and
//! spawn the auto-unmount timer thread. Ported from the original `main()`'s
//! setup sequence; the original's "register timer signal handler" step is
//! replaced by spawning `SharedScheduler::run_timer_loop` on a dedicated
//! thread (SPEC_FULL.md §5.1). Shutdown (unmount all, remove the synthetic
//! root) now lives in `fuse_bridge::AfuseFilesystem::destroy`, since that is
//! the hook `fuser` actually calls when the kernel mount goes away.

use crate::cli::AfuseOptions;
use crate::context::AfuseContext;
use crate::fuse_bridge::AfuseFilesystem;
use crate::scheduler::SharedScheduler;
use crate::stale::device_id;
use anyhow::Context;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct Started {
    pub filesystem: AfuseFilesystem,
    pub scheduler: Arc<SharedScheduler>,
    pub timer_thread: Option<JoinHandle<()>>,
}

/// Creates the `afuse-XXXXXX` synthetic root under `/tmp`, captures its
/// device id, and (only when auto-unmount is enabled) starts the timer
/// thread that drives it.
pub fn start(options: AfuseOptions, logger: slog::Logger) -> anyhow::Result<Started> {
    let synthetic_root = tempfile::Builder::new()
        .prefix("afuse-")
        .tempdir()
        .context("creating synthetic root under /tmp")?;
    let synthetic_root_dev =
        device_id(synthetic_root.path()).context("stat'ing synthetic root")?;

    let has_timeout = options.timeout.is_some();
    let ctx = AfuseContext::new(
        options,
        synthetic_root.path().to_path_buf(),
        synthetic_root_dev,
        logger,
    );
    let scheduler = SharedScheduler::new(ctx);
    let timer_shutdown = Arc::new(AtomicBool::new(false));

    let timer_thread = if has_timeout {
        let scheduler = Arc::clone(&scheduler);
        let timer_shutdown = Arc::clone(&timer_shutdown);
        Some(std::thread::Builder::new()
            .name("afuse-auto-unmount".into())
            .spawn(move || scheduler.run_timer_loop(&timer_shutdown))
            .context("spawning auto-unmount timer thread")?)
    } else {
        None
    };

    let filesystem = AfuseFilesystem::new(Arc::clone(&scheduler), timer_shutdown, synthetic_root);

    Ok(Started {
        filesystem,
        scheduler,
        timer_thread,
    })
}
