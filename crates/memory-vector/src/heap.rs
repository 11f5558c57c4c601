//! Array-backed binary heaps keyed by similarity.
//!
//! The search keeps two of these: a [`MaxHeap`] of candidates so the most
//! promising node is explored next, and a [`MinHeap`] of results so the
//! worst kept result can be evicted once the beam is full.

use std::cmp::Ordering;
use std::marker::PhantomData;

/// A value with the similarity it is ordered by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prioritized<T> {
    pub value: T,
    pub priority: f32,
}

impl<T> Prioritized<T> {
    pub fn new(value: T, priority: f32) -> Self {
        Self { value, priority }
    }
}

/// Decides which of two priorities belongs closer to the root.
pub trait HeapOrder {
    fn above(a: f32, b: f32) -> bool;
}

/// Root holds the highest priority.
#[derive(Debug)]
pub struct Max;

/// Root holds the lowest priority.
#[derive(Debug)]
pub struct Min;

// NaN compares equal to everything, so it never displaces a real score.
impl HeapOrder for Max {
    fn above(a: f32, b: f32) -> bool {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal) == Ordering::Greater
    }
}

impl HeapOrder for Min {
    fn above(a: f32, b: f32) -> bool {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal) == Ordering::Less
    }
}

/// Binary heap over a `Vec`, O(log n) push and pop.
#[derive(Debug)]
pub struct Heap<T, O: HeapOrder> {
    items: Vec<Prioritized<T>>,
    _order: PhantomData<O>,
}

pub type MaxHeap<T> = Heap<T, Max>;
pub type MinHeap<T> = Heap<T, Min>;

impl<T, O: HeapOrder> Default for Heap<T, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, O: HeapOrder> Heap<T, O> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _order: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            _order: PhantomData,
        }
    }

    pub fn push(&mut self, item: Prioritized<T>) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    pub fn pop(&mut self) -> Option<Prioritized<T>> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let root = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        root
    }

    pub fn peek(&self) -> Option<&Prioritized<T>> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the heap; items come out in internal array order.
    pub fn into_vec(self) -> Vec<Prioritized<T>> {
        self.items
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !O::above(self.items[index].priority, self.items[parent].priority) {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut top = index;

            if left < len && O::above(self.items[left].priority, self.items[top].priority) {
                top = left;
            }
            if right < len && O::above(self.items[right].priority, self.items[top].priority) {
                top = right;
            }
            if top == index {
                break;
            }
            self.items.swap(index, top);
            index = top;
        }
    }
}

impl<T: Clone, O: HeapOrder> Heap<T, O> {
    /// Snapshot of the current contents in internal array order.
    pub fn to_vec(&self) -> Vec<Prioritized<T>> {
        self.items.clone()
    }
}
