//! Fixed-size doubly linked order over dense integer ids.
//!
//! Nodes live in a `Vec` indexed directly by id, so relocating an id never
//! allocates and never searches. Each id in `[0, capacity)` is either linked
//! exactly once or not linked at all.
//!
//! ## Architecture
//!
//! ```text
//!   nodes (Vec<Node>, index = id)
//!   ┌────┬───────────────────────────────────────────┐
//!   │ id │ Node { linked, prev, next }               │
//!   ├────┼───────────────────────────────────────────┤
//!   │ 0  │ { linked: true, prev: Some(2), next: None }│
//!   │ 1  │ { linked: false, .. }                     │
//!   │ 2  │ { linked: true, prev: None, next: Some(0) }│
//!   └────┴───────────────────────────────────────────┘
//!
//!   head (front) ─► [2] ◄──► [0] ◄── tail (back)
//! ```
//!
//! ## Operations
//! - `move_to_front(id)`: detach (if linked) + attach to head
//! - `back()`: id at the tail, no mutation
//! - `iter_back_to_front()`: tail-to-head walk
//!
//! ## Performance
//! - `move_to_front`: O(1)
//! - `front` / `back`: O(1)
//! - iteration: O(n)
//!
//! `debug_validate_invariants()` is available in debug/test builds.

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    linked: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked order over the ids `[0, capacity)`.
#[derive(Debug, Clone)]
pub struct IndexList {
    nodes: Vec<Node>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl IndexList {
    /// Creates a list over `capacity` ids with none of them linked.
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: vec![Node::default(); capacity],
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Creates a list with every id linked, `0` at the back and
    /// `capacity - 1` at the front.
    pub fn with_all_linked(capacity: usize) -> Self {
        let mut list = Self::new(capacity);
        for id in 0..capacity {
            list.move_to_front(id);
        }
        list
    }

    /// Number of ids the list can hold.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of ids currently linked.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `id` is in range and linked.
    pub fn contains(&self, id: usize) -> bool {
        self.nodes.get(id).is_some_and(|node| node.linked)
    }

    /// Id at the front (most recently moved).
    pub fn front(&self) -> Option<usize> {
        self.head
    }

    /// Id at the back (least recently moved).
    pub fn back(&self) -> Option<usize> {
        self.tail
    }

    /// Moves `id` to the front, linking it first if it was not linked.
    ///
    /// Returns `false` if `id` is out of range.
    pub fn move_to_front(&mut self, id: usize) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.linked {
            if self.head == Some(id) {
                return true;
            }
            self.detach(id);
        } else {
            self.len += 1;
        }
        self.attach_front(id);
        true
    }

    /// Walks from back to front.
    pub fn iter_back_to_front(&self) -> BackToFront<'_> {
        BackToFront {
            list: self,
            current: self.tail,
        }
    }

    fn detach(&mut self, id: usize) {
        let Node { prev, next, .. } = self.nodes[id];

        match prev {
            Some(prev_id) => self.nodes[prev_id].next = next,
            None => self.head = next,
        }
        match next {
            Some(next_id) => self.nodes[next_id].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[id];
        node.prev = None;
        node.next = None;
    }

    fn attach_front(&mut self, id: usize) {
        let old_head = self.head;
        self.nodes[id] = Node {
            linked: true,
            prev: None,
            next: old_head,
        };
        match old_head {
            Some(old_head) => self.nodes[old_head].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len, 0);
            assert!(self.nodes.iter().all(|node| !node.linked));
            return;
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut count = 0usize;
        let mut current = self.head;
        let mut prev = None;

        while let Some(id) = current {
            assert!(!seen[id], "id {id} linked twice");
            seen[id] = true;
            let node = &self.nodes[id];
            assert!(node.linked);
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(id));
            }
            prev = Some(id);
            current = node.next;
            count += 1;
            assert!(count <= self.len);
        }

        assert_eq!(count, self.len);
        let linked = self.nodes.iter().filter(|node| node.linked).count();
        assert_eq!(linked, self.len);
    }
}

/// Iterator over linked ids from back to front.
pub struct BackToFront<'a> {
    list: &'a IndexList,
    current: Option<usize>,
}

impl Iterator for BackToFront<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.list.nodes[id].prev;
        Some(id)
    }
}
