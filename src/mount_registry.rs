// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Set of active mounts keyed by first path component. Owns each mount's
//! handle sets and heap node (the heap itself lives alongside it, since the
//! heap's links are physically stored inside each `Mount`).

use crate::mount::Mount;
use crate::pairing_heap::{Arena, PairingHeap};

#[derive(Debug, Default)]
pub struct MountRegistry {
    mounts: Arena,
    heap: PairingHeap,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root_name: &str) -> Option<&Mount> {
        self.mounts.get(root_name)
    }

    pub fn get_mut(&mut self, root_name: &str) -> Option<&mut Mount> {
        self.mounts.get_mut(root_name)
    }

    pub fn contains(&self, root_name: &str) -> bool {
        self.mounts.contains_key(root_name)
    }

    /// Registers a freshly-mounted child. `rootName` must be unique (spec.md
    /// invariant 4); callers only reach here after confirming absence.
    pub fn insert(&mut self, mount: Mount) {
        debug_assert!(!self.mounts.contains_key(&mount.root_name));
        self.mounts.insert(mount.root_name.clone(), mount);
    }

    /// Deregisters a mount, unlinking it from the heap first if linked.
    /// Always succeeds if present, matching `doUmount`'s "always deregister"
    /// ordering rule even when the unmount command itself failed.
    pub fn remove(&mut self, root_name: &str) -> Option<Mount> {
        if self.mounts.get(root_name)?.unmount_deadline.is_some() {
            self.heap.remove(&mut self.mounts, root_name);
        }
        self.mounts.remove(root_name)
    }

    /// Ordered iteration over registered root names, used by root readdir.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mounts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mount)> {
        self.mounts.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn heap(&self) -> &PairingHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> (&mut PairingHeap, &mut Arena) {
        (&mut self.heap, &mut self.mounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_name_uniqueness_is_enforced_by_caller_contract() {
        let mut reg = MountRegistry::new();
        reg.insert(Mount::new("foo".into(), "/tmp/root/foo".into()));
        assert!(reg.contains("foo"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ordered_iteration_is_deterministic() {
        let mut reg = MountRegistry::new();
        for name in ["zeta", "alpha", "mike"] {
            reg.insert(Mount::new(name.into(), format!("/tmp/root/{name}").into()));
        }
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(names, vec!["alpha", "mike", "zeta"]);
    }

    #[test]
    fn remove_deregisters_even_without_heap_link() {
        let mut reg = MountRegistry::new();
        reg.insert(Mount::new("foo".into(), "/tmp/root/foo".into()));
        let removed = reg.remove("foo");
        assert!(removed.is_some());
        assert!(!reg.contains("foo"));
    }

    #[test]
    fn remove_unlinks_from_heap_when_linked() {
        let mut reg = MountRegistry::new();
        let mut m = Mount::new("foo".into(), "/tmp/root/foo".into());
        m.unmount_deadline = Some(100);
        reg.insert(m);
        {
            let (heap, arena) = reg.heap_mut();
            heap.insert(arena, "foo".into());
        }
        assert_eq!(reg.heap().min(), Some("foo"));
        reg.remove("foo");
        assert!(reg.heap().is_empty());
    }
}
