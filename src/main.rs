// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

mod cli;
mod context;
mod dispatcher;
mod errors;
mod filter;
mod fuse_bridge;
mod handles;
mod lifecycle;
mod logging;
mod mount;
mod mount_engine;
mod mount_registry;
mod pairing_heap;
mod path_router;
mod scheduler;
mod sorted_name_list;
mod stale;
mod template;

use anyhow::Context;
use fuser::MountOption;

fn run() -> anyhow::Result<()> {
    let args = std::env::args_os();
    let parsed = cli::parse_args(args)?;
    let level = if parsed.verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let logger = logging::setup_logger(level);

    let started = lifecycle::start(parsed.options, logger.clone())
        .context("starting up afuse")?;

    let mount_options = vec![
        MountOption::FSName("afuse".to_string()),
        MountOption::DefaultPermissions,
    ];

    slog::info!(logger, "mounting synthetic root at {:?}", parsed.mountpoint);
    let result = fuser::mount2(started.filesystem, &parsed.mountpoint, &mount_options)
        .with_context(|| format!("mounting afuse at {:?}", parsed.mountpoint));

    if let Some(timer_thread) = started.timer_thread {
        let _ = timer_thread.join();
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("afuse: {e:#}");
        std::process::exit(1);
    }
}
