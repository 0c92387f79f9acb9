//! Intrusive singly-linked list of free blocks.
//!
//! A freed block stores the link to the next free block in its first word,
//! so the list needs no memory of its own. Every class block is at least 16
//! bytes and 16-aligned, which leaves room for the link.

use core::ptr::{self, NonNull};

#[repr(C)]
pub struct FreeObject {
    pub next: *mut FreeObject,
}

pub struct FreeList {
    head: *mut FreeObject,
    length: u32,
}

// SAFETY: the list exclusively owns the blocks linked into it.
unsafe impl Send for FreeList {}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            length: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let obj = NonNull::new(self.head)?;
        self.head = unsafe { (*obj.as_ptr()).next };
        self.length -= 1;
        Some(obj.cast())
    }

    /// # Safety
    /// `block` must be unused, writable and large enough to hold a [`FreeObject`].
    #[inline]
    pub unsafe fn push(&mut self, block: NonNull<u8>) {
        let obj = block.cast::<FreeObject>().as_ptr();
        unsafe { (*obj).next = self.head };
        self.head = obj;
        self.length += 1;
    }

    /// Pop up to `count` objects into a detached list. Returns (actual_count, list).
    pub fn pop_batch(&mut self, count: u32) -> (u32, FreeList) {
        let mut batch = FreeList::new();
        while batch.length < count {
            let Some(obj) = self.pop() else { break };
            // SAFETY: `obj` came off a free list, so it holds a FreeObject.
            unsafe { batch.push(obj) };
        }
        (batch.length, batch)
    }

    /// Detach the whole list, leaving `self` empty.
    pub fn detach(&mut self) -> FreeList {
        core::mem::replace(self, FreeList::new())
    }
}

impl Iterator for FreeList {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<NonNull<u8>> {
        self.pop()
    }
}
