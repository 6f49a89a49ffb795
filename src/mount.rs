// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! `Mount`: one logical entry for a currently-mounted child, and the
//! microsecond deadline type the pairing heap and scheduler share.

use crate::handles::HandleSets;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock microsecond timestamp. `None` is the "never" sentinel from
/// spec.md §3 — the mount is ineligible for auto-unmount.
pub type Deadline = Option<u64>;

pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_micros() as u64
}

/// Intrusive linkage for the pairing heap, keyed by `rootName` rather than
/// a raw pointer (see `pairing_heap.rs`).
#[derive(Debug, Default, Clone)]
pub struct HeapLink {
    pub child: Option<String>,
    pub sibling: Option<String>,
    pub prev: Option<String>,
}

#[derive(Debug)]
pub struct Mount {
    pub root_name: String,
    pub mount_point: PathBuf,
    pub handles: HandleSets,
    pub unmount_deadline: Deadline,
    pub heap_link: HeapLink,
}

impl Mount {
    pub fn new(root_name: String, mount_point: PathBuf) -> Self {
        Mount {
            root_name,
            mount_point,
            handles: HandleSets::new(),
            unmount_deadline: None,
            heap_link: HeapLink::default(),
        }
    }

    /// Invariant 1: `unmountDeadline = never ⇔ fdSet ∪ dirSet ≠ ∅`.
    pub fn is_pinned(&self) -> bool {
        !self.handles.is_empty()
    }
}
