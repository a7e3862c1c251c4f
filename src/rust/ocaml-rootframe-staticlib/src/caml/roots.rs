use std::ptr;

use ocaml_rootframe_shared::MAX_ROOTS;

use super::mlvalues::Value;

/// Mirrors `struct caml__roots_block` from `caml/memory.h`
///
/// The collector treats every `tables[i]` (for `i < ntables`) as an array of `nitems` value
/// slots. `CAMLparam`/`CAMLxparam` always use `nitems == 1`.
#[repr(C)]
#[derive(Debug)]
pub struct CamlRootsBlock {
    pub next: *mut CamlRootsBlock,
    pub ntables: isize,
    pub nitems: isize,
    pub tables: [*mut Value; MAX_ROOTS],
}

impl Default for CamlRootsBlock {
    fn default() -> Self {
        CamlRootsBlock {
            next: ptr::null_mut(),
            ntables: 0,
            nitems: 0,
            tables: [ptr::null_mut(); MAX_ROOTS],
        }
    }
}

impl CamlRootsBlock {
    /// Calls `f` with every slot this block registers
    ///
    /// # Safety
    /// The block's tables must point at live slots
    pub unsafe fn for_each_slot<F: FnMut(*mut Value)>(&self, mut f: F) {
        for table in &self.tables[..self.ntables as usize] {
            for item in 0..self.nitems {
                f(table.offset(item));
            }
        }
    }
}

/// Walks the `local_roots` list starting at `head`
///
/// # Safety
/// Every block reachable from `head` must be live
pub unsafe fn for_each_local_root<F: FnMut(*mut Value)>(head: *mut CamlRootsBlock, mut f: F) {
    let mut block = head;
    while !block.is_null() {
        (*block).for_each_slot(&mut f);
        block = (*block).next;
    }
}
