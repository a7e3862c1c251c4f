use std::cell::Cell;
use std::ptr;

use crate::caml::domain_state::Host;
use crate::caml::roots::CamlRootsBlock;

thread_local! {
    static LOCAL_ROOTS: Cell<*mut CamlRootsBlock> = Cell::new(ptr::null_mut());
}

/// The simulated runtime's `local_roots`, one list per thread
pub struct SimHost;

impl Host for SimHost {
    #[inline]
    fn local_roots() -> *mut CamlRootsBlock {
        LOCAL_ROOTS.with(Cell::get)
    }

    #[inline]
    unsafe fn set_local_roots(roots: *mut CamlRootsBlock) {
        LOCAL_ROOTS.with(|head| head.set(roots))
    }
}
