//! Opaque per-task resources.
//!
//! The tasking core does not manage page tables or open files; it only has
//! to know whether two tasks share them. Each resource carries an identity
//! and a size that is charged to whoever holds it.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub const PAGE_SIZE: usize = 4096;

fn next_resource_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct AddressSpace {
    id: u64,
    size: AtomicUsize,
}

impl AddressSpace {
    pub fn new(size: usize) -> Self {
        Self {
            id: next_resource_id(),
            size: AtomicUsize::new(size),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    /// A private copy of the same size, as fork makes.
    pub fn duplicate(&self) -> Self {
        Self::new(self.size())
    }

    /// Whether a whole page starting at `stack` lies inside the space.
    pub fn contains_page(&self, stack: usize) -> bool {
        stack
            .checked_add(PAGE_SIZE)
            .is_some_and(|end| end <= self.size())
    }
}

#[derive(Debug)]
pub struct ResourceTable {
    id: u64,
    open: AtomicUsize,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub fn new() -> Self {
        Self {
            id: next_resource_id(),
            open: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub fn set_open_count(&self, open: usize) {
        self.open.store(open, Ordering::Release);
    }

    pub fn duplicate(&self) -> Self {
        let table = Self::new();
        table.set_open_count(self.open_count());
        table
    }
}

/// User stack handed to a new thread. Only recorded, never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStack {
    pub base: usize,
}

impl UserStack {
    pub fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn is_valid_in(&self, space: &AddressSpace) -> bool {
        self.base != 0 && self.base % PAGE_SIZE == 0 && space.contains_page(self.base)
    }
}
