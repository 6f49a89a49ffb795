// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Intrusive min-heap of mounts keyed by `unmountDeadline`.
//!
//! Ported from `variable_pairing_heap.h`'s two-pass meld algorithm. The
//! original links nodes by raw pointer; this version links them by
//! `rootName`, navigated through the owning `BTreeMap<String, Mount>` (the
//! `MountRegistry`'s backing store) instead of through unsafe pointers.
//! Each `Mount` carries its own `HeapLink` (child/sibling/prev), so the heap
//! itself is just the root key plus the melding logic — the classic
//! leftmost-child, next-sibling representation with a `prev` back-pointer
//! that doubles as "parent pointer" for a first child (checked by comparing
//! `arena[prev].child == Some(node)`), which is what makes arbitrary-element
//! removal O(log n) amortized without external indices.

use crate::mount::Mount;
use std::collections::BTreeMap;

pub type Arena = BTreeMap<String, Mount>;

#[derive(Debug, Default)]
pub struct PairingHeap {
    root: Option<String>,
}

impl PairingHeap {
    pub fn new() -> Self {
        PairingHeap { root: None }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The key with the smallest `unmountDeadline`, if any.
    pub fn min(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn insert(&mut self, arena: &mut Arena, key: String) {
        debug_assert!(arena[&key].unmount_deadline.is_some());
        self.root = meld(arena, self.root.take(), Some(key));
    }

    /// Removes `key` from the heap, wherever it sits. `key` must currently
    /// be linked (caller upholds invariant 2 from spec.md §8).
    pub fn remove(&mut self, arena: &mut Arena, key: &str) {
        if self.root.as_deref() == Some(key) {
            let child = arena.get_mut(key).unwrap().heap_link.child.take();
            detach_parent_pointer(arena, &child);
            clear_link(arena, key);
            self.root = combine_children(arena, child);
            return;
        }

        let (prev, sibling) = {
            let link = &arena[key].heap_link;
            (link.prev.clone(), link.sibling.clone())
        };
        if let Some(ref p) = prev {
            let is_first_child = arena[p].heap_link.child.as_deref() == Some(key);
            if is_first_child {
                arena.get_mut(p).unwrap().heap_link.child = sibling.clone();
            } else {
                arena.get_mut(p).unwrap().heap_link.sibling = sibling.clone();
            }
        }
        if let Some(ref s) = sibling {
            arena.get_mut(s).unwrap().heap_link.prev = prev.clone();
        }

        let child = arena.get_mut(key).unwrap().heap_link.child.take();
        detach_parent_pointer(arena, &child);
        clear_link(arena, key);

        let orphan_subheap = combine_children(arena, child);
        self.root = meld(arena, self.root.take(), orphan_subheap);
    }
}

fn clear_link(arena: &mut Arena, key: &str) {
    let link = &mut arena.get_mut(key).unwrap().heap_link;
    link.child = None;
    link.sibling = None;
    link.prev = None;
}

fn detach_parent_pointer(arena: &mut Arena, child: &Option<String>) {
    if let Some(c) = child {
        arena.get_mut(c).unwrap().heap_link.prev = None;
    }
}

fn deadline_of(arena: &Arena, key: &str) -> u64 {
    arena[key]
        .unmount_deadline
        .expect("heap-linked mount must have a deadline")
}

/// Melds two heaps rooted at `a` and `b` (either may be `None`), returning
/// the new root. Both `a` and `b` must be heap roots (`prev == None`) on
/// entry; the loser becomes the first child of the winner.
fn meld(arena: &mut Arena, a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => {
            let (parent, child) = if deadline_of(arena, &a) <= deadline_of(arena, &b) {
                (a, b)
            } else {
                (b, a)
            };
            let old_first_child = arena[&parent].heap_link.child.clone();
            if let Some(ref oldc) = old_first_child {
                arena.get_mut(oldc).unwrap().heap_link.prev = Some(child.clone());
            }
            {
                let child_link = &mut arena.get_mut(&child).unwrap().heap_link;
                child_link.sibling = old_first_child;
                child_link.prev = Some(parent.clone());
            }
            arena.get_mut(&parent).unwrap().heap_link.child = Some(child);
            Some(parent)
        }
    }
}

/// Two-pass meld over a sibling chain: pair up left-to-right, then meld the
/// resulting list right-to-left.
fn combine_children(arena: &mut Arena, first_child: Option<String>) -> Option<String> {
    let mut siblings = Vec::new();
    let mut cur = first_child;
    while let Some(key) = cur {
        cur = arena[&key].heap_link.sibling.clone();
        {
            let link = &mut arena.get_mut(&key).unwrap().heap_link;
            link.sibling = None;
            link.prev = None;
        }
        siblings.push(key);
    }
    if siblings.is_empty() {
        return None;
    }

    let mut pass1 = Vec::with_capacity((siblings.len() + 1) / 2);
    let mut it = siblings.into_iter();
    loop {
        let first = match it.next() {
            Some(k) => k,
            None => break,
        };
        match it.next() {
            Some(second) => pass1.push(meld(arena, Some(first), Some(second))),
            None => pass1.push(Some(first)),
        }
    }

    let mut result = None;
    for melded in pass1.into_iter().rev() {
        result = meld(arena, result, melded);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount_with_deadline(name: &str, deadline: u64) -> Mount {
        let mut m = Mount::new(name.to_string(), format!("/tmp/{name}").into());
        m.unmount_deadline = Some(deadline);
        m
    }

    #[test]
    fn min_tracks_smallest_deadline() {
        let mut arena = Arena::new();
        let mut heap = PairingHeap::new();
        for (name, deadline) in [("c", 30), ("a", 10), ("b", 20)] {
            arena.insert(name.to_string(), mount_with_deadline(name, deadline));
            heap.insert(&mut arena, name.to_string());
        }
        assert_eq!(heap.min(), Some("a"));
    }

    #[test]
    fn remove_root_promotes_new_min() {
        let mut arena = Arena::new();
        let mut heap = PairingHeap::new();
        for (name, deadline) in [("a", 10), ("b", 20), ("c", 5)] {
            arena.insert(name.to_string(), mount_with_deadline(name, deadline));
            heap.insert(&mut arena, name.to_string());
        }
        assert_eq!(heap.min(), Some("c"));
        heap.remove(&mut arena, "c");
        assert_eq!(heap.min(), Some("a"));
        heap.remove(&mut arena, "a");
        assert_eq!(heap.min(), Some("b"));
        heap.remove(&mut arena, "b");
        assert!(heap.is_empty());
    }

    #[test]
    fn remove_arbitrary_non_root_element() {
        let mut arena = Arena::new();
        let mut heap = PairingHeap::new();
        for (name, deadline) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
            arena.insert(name.to_string(), mount_with_deadline(name, deadline));
            heap.insert(&mut arena, name.to_string());
        }
        heap.remove(&mut arena, "c");
        assert_eq!(heap.min(), Some("a"));
        // every remaining key must still be reachable and removable.
        for name in ["a", "b", "d", "e"] {
            heap.remove(&mut arena, name);
        }
        assert!(heap.is_empty());
    }

    #[test]
    fn heap_invariant_holds_under_interleaved_insert_remove() {
        let mut arena = Arena::new();
        let mut heap = PairingHeap::new();
        let mut live = std::collections::BTreeSet::new();
        for (name, deadline) in [
            ("a", 50),
            ("b", 10),
            ("c", 70),
            ("d", 20),
            ("e", 5),
            ("f", 60),
        ] {
            arena.insert(name.to_string(), mount_with_deadline(name, deadline));
            heap.insert(&mut arena, name.to_string());
            live.insert(name);
        }
        heap.remove(&mut arena, "b");
        live.remove("b");
        heap.remove(&mut arena, "e");
        live.remove("e");

        let expected_min = live
            .iter()
            .min_by_key(|name| deadline_of(&arena, name))
            .copied();
        assert_eq!(heap.min(), expected_min);
    }
}
