// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Root logger setup, lifted straight from the teacher's `setup_logger`:
//! a synchronous plain-text drain over stdout, level-filtered by
//! `-v`/`--verbose`.

use slog::Drain;

pub fn setup_logger(level: slog::Level) -> slog::Logger {
    let drain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(drain).build();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    slog::Logger::root(drain, slog::o!())
}
