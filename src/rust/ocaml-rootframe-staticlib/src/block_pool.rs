// Storage for root blocks.
//
// `CAMLparam` puts its `caml__roots_block` in the caller's stack frame, which a function call
// can't do. Instead each thread keeps a stack of heap allocated blocks: frames are LIFO, so a
// frame just remembers the top of the stack when it began and gives everything above it back when
// it ends. Blocks are never freed until the thread exits so their addresses stay put.
//
// A C stub that raises never ends its frame: the runtime unlinks its blocks from `local_roots`
// while unwinding instead. `reclaim_unlinked` finds those from the next frame that begins.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

use ocaml_rootframe_shared::MAX_ROOTS;

use crate::caml::mlvalues::Value;
use crate::caml::roots::CamlRootsBlock;

#[repr(C)]
#[derive(Debug)]
pub struct PooledBlock {
    pub block: CamlRootsBlock,
    // Slots owned by the block itself, for roots that don't live in the caller's memory
    pub slots: [Value; MAX_ROOTS],
}

impl Default for PooledBlock {
    fn default() -> Self {
        PooledBlock {
            block: CamlRootsBlock::default(),
            slots: [Value::UNIT; MAX_ROOTS],
        }
    }
}

struct BlockPool {
    blocks: Vec<NonNull<PooledBlock>>,
    // Position of each block in `blocks`, keyed by the address the runtime sees
    indices: HashMap<*mut CamlRootsBlock, usize>,
    top: usize,
}

impl BlockPool {
    fn new() -> BlockPool {
        BlockPool {
            blocks: Vec::new(),
            indices: HashMap::new(),
            top: 0,
        }
    }

    fn is_top(&self, block: *mut CamlRootsBlock) -> bool {
        self.top > 0 && self.blocks[self.top - 1].as_ptr() as *mut CamlRootsBlock == block
    }

    unsafe fn reclaim_unlinked(&mut self, head: *mut CamlRootsBlock) {
        if self.top == 0 || self.is_top(head) {
            return;
        }

        // Blocks are linked in the order they're acquired, so the first one of ours on the chain
        // is the highest still in use
        let mut block = head;
        while !block.is_null() {
            if let Some(&index) = self.indices.get(&block) {
                self.top = self.top.min(index + 1);
                return;
            }
            block = (*block).next;
        }

        self.top = 0;
    }

    fn acquire(&mut self) -> *mut PooledBlock {
        if self.top == self.blocks.len() {
            let block = NonNull::from(Box::leak(Box::new(PooledBlock::default())));
            self.indices
                .insert(block.as_ptr() as *mut CamlRootsBlock, self.blocks.len());
            self.blocks.push(block);
        }

        let block = self.blocks[self.top];
        self.top += 1;
        block.as_ptr()
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            unsafe { drop(Box::from_raw(block.as_ptr())) }
        }
    }
}

thread_local! {
    static POOL: RefCell<BlockPool> = RefCell::new(BlockPool::new());
}

/// Hands out the next free block on this thread
#[inline]
pub fn acquire() -> *mut PooledBlock {
    POOL.with(|pool| pool.borrow_mut().acquire())
}

/// The current top of this thread's pool, to be passed to `release_to` later
#[inline]
pub fn mark() -> usize {
    POOL.with(|pool| pool.borrow().top)
}

/// Gives back every block acquired since `mark` was taken
#[inline]
pub fn release_to(mark: usize) {
    POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        debug_assert!(mark <= pool.top);
        pool.top = mark;
    })
}

/// Gives back every block that is no longer reachable from `head`, the current `local_roots`
///
/// # Safety
/// Every block on the chain from `head` must be live
#[inline]
pub unsafe fn reclaim_unlinked(head: *mut CamlRootsBlock) {
    POOL.with(|pool| pool.borrow_mut().reclaim_unlinked(head))
}

pub fn in_use() -> usize {
    mark()
}

pub fn allocated() -> usize {
    POOL.with(|pool| pool.borrow().blocks.len())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::ptr;

    #[test]
    fn test_reuse() {
        let start = mark();

        let a = acquire();
        let b = acquire();
        assert_ne!(a, b);
        assert_eq!(in_use(), start + 2);

        release_to(start);
        assert_eq!(in_use(), start);

        // Same addresses come back in the same order
        assert_eq!(acquire(), a);
        assert_eq!(acquire(), b);
        release_to(start);

        assert!(allocated() >= start + 2);
    }

    #[test]
    fn test_addresses_are_stable() {
        let start = mark();
        let first = acquire();
        unsafe { (*first).slots[0] = Value::int(9) };

        // Force the backing vector to grow a few times
        for _ in 0..100 {
            acquire();
        }

        assert_eq!(unsafe { (*first).slots[0] }, Value::int(9));
        release_to(start);
    }

    fn link(block: *mut PooledBlock, next: *mut CamlRootsBlock) -> *mut CamlRootsBlock {
        unsafe {
            (*block).block.next = next;
            ptr::addr_of_mut!((*block).block)
        }
    }

    #[test]
    fn test_reclaim_keeps_linked_blocks() {
        let a = acquire();
        let b = acquire();
        let c = acquire();

        let mut foreign = CamlRootsBlock::default();
        let head_a = link(a, ptr::null_mut());
        let head_b = link(b, head_a);
        link(c, head_b);

        // `c` was unwound, and the runtime then pushed a block of its own above `b`
        foreign.next = head_b;
        unsafe { reclaim_unlinked(&mut foreign) };
        assert_eq!(in_use(), 2);
        assert_eq!(acquire(), c);

        unsafe { reclaim_unlinked(head_a) };
        assert_eq!(in_use(), 1);

        unsafe { reclaim_unlinked(ptr::null_mut()) };
        assert_eq!(in_use(), 0);
        assert_eq!(allocated(), 3);
    }

    #[test]
    fn test_reclaim_is_a_no_op_while_everything_is_linked() {
        let a = acquire();
        let b = acquire();
        let head = link(b, link(a, ptr::null_mut()));

        unsafe { reclaim_unlinked(head) };
        assert_eq!(in_use(), 2);
        release_to(0);
    }

    #[test]
    fn test_pools_are_per_thread() {
        let start = mark();
        acquire();

        let other = std::thread::spawn(in_use).join().unwrap();
        assert_eq!(other, 0);

        release_to(start);
    }
}
