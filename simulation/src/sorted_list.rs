//! Ordered list of positions, highest nominal ratio first.
//!
//! Mirrors the protocol's doubly linked list: each node stores its neighbours,
//! insertion takes a hint bracket, checks it, and falls back to a walk from the
//! head when the hint is no longer valid.

use std::collections::HashMap;

use calida_types::{HintPair, Pubkey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    nicr: u128,
    prev: Option<Pubkey>,
    next: Option<Pubkey>,
    /// Index into `members`
    slot: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SortedList {
    nodes: HashMap<Pubkey, Node>,
    head: Option<Pubkey>,
    tail: Option<Pubkey>,
    /// Unordered ids for constant-time sampling
    members: Vec<Pubkey>,
}

impl SortedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &Pubkey) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn head(&self) -> Option<Pubkey> {
        self.head
    }

    pub fn tail(&self) -> Option<Pubkey> {
        self.tail
    }

    pub fn next(&self, id: &Pubkey) -> Option<Pubkey> {
        self.nodes.get(id)?.next
    }

    pub fn prev(&self, id: &Pubkey) -> Option<Pubkey> {
        self.nodes.get(id)?.prev
    }

    pub fn nicr(&self, id: &Pubkey) -> Option<u128> {
        self.nodes.get(id).map(|node| node.nicr)
    }

    /// Member at `index` in storage order, unrelated to list order
    pub fn member(&self, index: usize) -> Option<Pubkey> {
        self.members.get(index).copied()
    }

    /// Whether `hints` is an exact bracket for `nicr` in the current list
    pub fn is_valid_insert_position(&self, nicr: u128, hints: &HintPair) -> bool {
        match (hints.prev, hints.next) {
            (None, None) => self.is_empty(),
            (None, Some(next)) => self.head == Some(next) && self.nicr(&next).map_or(false, |n| nicr >= n),
            (Some(prev), None) => self.tail == Some(prev) && self.nicr(&prev).map_or(false, |p| p >= nicr),
            (Some(prev), Some(next)) => {
                self.next(&prev) == Some(next)
                    && self.nicr(&prev).map_or(false, |p| p >= nicr)
                    && self.nicr(&next).map_or(false, |n| nicr >= n)
            }
        }
    }

    /// Insert `id`, using `hints` when still valid.
    ///
    /// Returns `true` when the hint was used and `false` when the list had to
    /// be searched instead.
    pub fn insert(&mut self, id: Pubkey, nicr: u128, hints: &HintPair) -> bool {
        if self.contains(&id) {
            self.remove(&id);
        }

        let used = self.is_valid_insert_position(nicr, hints);
        let (prev, next) = if used {
            (hints.prev, hints.next)
        } else {
            self.find_insert_position(nicr)
        };

        self.nodes.insert(
            id,
            Node {
                nicr,
                prev,
                next,
                slot: self.members.len(),
            },
        );
        self.members.push(id);
        self.link(prev, Some(id));
        self.link(Some(id), next);
        used
    }

    pub fn remove(&mut self, id: &Pubkey) -> bool {
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        self.link(node.prev, node.next);

        self.members.swap_remove(node.slot);
        if let Some(moved) = self.members.get(node.slot).copied() {
            if let Some(moved_node) = self.nodes.get_mut(&moved) {
                moved_node.slot = node.slot;
            }
        }
        true
    }

    /// Ids from head to tail
    pub fn ids(&self) -> Vec<Pubkey> {
        let mut ids = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.next(&id);
        }
        ids
    }

    /// Walk from the head to the first entry strictly below `nicr`
    fn find_insert_position(&self, nicr: u128) -> (Option<Pubkey>, Option<Pubkey>) {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            if self.nicr(&id).map_or(true, |n| n < nicr) {
                break;
            }
            prev = Some(id);
            cursor = self.next(&id);
        }
        (prev, cursor)
    }

    /// Point `prev` forward to `next` and `next` back to `prev`, updating the ends
    fn link(&mut self, prev: Option<Pubkey>, next: Option<Pubkey>) {
        match prev {
            Some(id) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(id) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}
