// Root frames: CAMLparam / CAMLxparam / CAMLlocal / CAMLdrop / CAMLreturn as functions.
//
// The raw functions do exactly what the macros do and nothing more, misuse is undefined behaviour
// just like with the macros. `checked` has the validating variant, and `with_frame` is the scoped
// version for Rust callers.

use std::marker::PhantomData;
use std::ptr::{self, addr_of_mut};

use ocaml_rootframe_shared::MAX_ROOTS;

use crate::block_pool::{self, PooledBlock};
use crate::caml::domain_state::{ActiveHost, Host};
use crate::caml::mlvalues::Value;
use crate::caml::roots::CamlRootsBlock;

/// Handle for a frame begun with `begin_frame`, ended by exactly one `drop_frame`/`return_frame`
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CamlFrame {
    // What `local_roots` was before the frame began (`caml__frame` in the macros)
    local_roots: *mut CamlRootsBlock,
    pool_mark: usize,
}

impl CamlFrame {
    pub fn local_roots(&self) -> *mut CamlRootsBlock {
        self.local_roots
    }

    pub fn pool_mark(&self) -> usize {
        self.pool_mark
    }
}

#[inline]
unsafe fn push_block<H: Host>(roots: &[*mut Value]) -> *mut PooledBlock {
    debug_assert!(roots.len() <= MAX_ROOTS);

    let pooled = block_pool::acquire();
    let block = addr_of_mut!((*pooled).block);
    (*block).next = H::local_roots();
    (*block).ntables = roots.len() as isize;
    (*block).nitems = 1;
    ptr::copy_nonoverlapping(
        roots.as_ptr(),
        addr_of_mut!((*block).tables) as *mut *mut Value,
        roots.len(),
    );
    H::set_local_roots(block);

    pooled
}

/// `CAMLparamN(roots...)`: 0 to 5 slots
///
/// # Safety
/// Every slot must stay valid until the frame ends, and frames must end in LIFO order on the
/// thread that began them
#[inline]
pub unsafe fn begin_frame<H: Host>(roots: &[*mut Value]) -> CamlFrame {
    let local_roots = H::local_roots();
    // Frames cut short by an exception never end, their blocks are only unlinked
    block_pool::reclaim_unlinked(local_roots);

    let frame = CamlFrame {
        local_roots,
        pool_mark: block_pool::mark(),
    };

    if !roots.is_empty() {
        push_block::<H>(roots);
    }

    frame
}

/// `CAMLxparamN(roots...)`: 1 to 5 more slots, at most once per frame
///
/// # Safety
/// As `begin_frame`, and `frame` must be the innermost active frame
#[inline]
pub unsafe fn extend_frame<H: Host>(_frame: CamlFrame, roots: &[*mut Value]) {
    push_block::<H>(roots);
}

/// `CAMLlocalN(slots...)`: sets each slot to `()` and registers it
///
/// # Safety
/// As `extend_frame`
#[inline]
pub unsafe fn local_frame<H: Host>(frame: CamlFrame, slots: &[*mut Value]) {
    for slot in slots {
        **slot = Value::UNIT;
    }
    extend_frame::<H>(frame, slots);
}

/// `CAMLdrop`
///
/// # Safety
/// `frame` must be the innermost active frame and must not be used again
#[inline]
pub unsafe fn drop_frame<H: Host>(frame: CamlFrame) {
    H::set_local_roots(frame.local_roots);
    block_pool::release_to(frame.pool_mark);
}

/// `CAMLreturn(result)`: the caller reads `result` out of its rooted slot, so it's already the
/// relocated value if a collection happened
///
/// # Safety
/// As `drop_frame`
#[inline]
pub unsafe fn return_frame<H: Host>(frame: CamlFrame, result: Value) -> Value {
    drop_frame::<H>(frame);
    result
}

/* Scoped frames */

// Invariant lifetime so roots can't be moved between frames or out of the closure
type Brand<'f> = PhantomData<fn(&'f ()) -> &'f ()>;

/// A frame that ends itself when it goes out of scope (including on unwind)
///
/// Created with `with_frame`. Roots can only be added to the innermost frame: `scope` borrows
/// the outer frame for the lifetime of the inner one.
pub struct RootFrame<'f, H: Host = ActiveHost> {
    frame: CamlFrame,
    // Block whose inline slots are being filled, null until the first root
    current: *mut PooledBlock,
    roots: usize,
    _brand: Brand<'f>,
    // Raw pointer also keeps this !Send
    _host: PhantomData<*const H>,
}

/// A slot registered with the collector. Always read it again after anything that may collect.
#[derive(Copy, Clone, Debug)]
pub struct Root<'f> {
    slot: *mut Value,
    _brand: Brand<'f>,
}

impl<'f> Root<'f> {
    #[inline]
    pub fn get(self) -> Value {
        unsafe { *self.slot }
    }

    #[inline]
    pub fn set(self, value: Value) {
        unsafe { *self.slot = value }
    }

    pub fn as_ptr(self) -> *mut Value {
        self.slot
    }
}

impl<'f, H: Host> RootFrame<'f, H> {
    /// Register `value` for the rest of this frame
    pub fn root(&mut self, value: Value) -> Root<'f> {
        unsafe {
            if self.current.is_null() || (*self.current).block.ntables as usize == MAX_ROOTS {
                self.current = push_block::<H>(&[]);
            }

            let pooled = self.current;
            let index = (*pooled).block.ntables as usize;
            let slot = addr_of_mut!((*pooled).slots[index]);
            *slot = value;
            (*pooled).block.tables[index] = slot;
            (*pooled).block.ntables += 1;
            self.roots += 1;

            Root {
                slot,
                _brand: PhantomData,
            }
        }
    }

    /// `CAMLlocal`: a fresh root holding `()`
    pub fn local(&mut self) -> Root<'f> {
        self.root(Value::UNIT)
    }

    /// Run `f` in a nested frame
    pub fn scope<R, F>(&mut self, f: F) -> R
    where
        F: for<'g> FnOnce(&mut RootFrame<'g, H>) -> R,
    {
        with_frame_on::<H, R, F>(f)
    }

    pub fn roots(&self) -> usize {
        self.roots
    }

    pub fn handle(&self) -> CamlFrame {
        self.frame
    }
}

impl<'f, H: Host> Drop for RootFrame<'f, H> {
    fn drop(&mut self) {
        unsafe { drop_frame::<H>(self.frame) }
    }
}

/// Run `f` inside a new frame on the active host
pub fn with_frame<R, F>(f: F) -> R
where
    F: for<'f> FnOnce(&mut RootFrame<'f, ActiveHost>) -> R,
{
    with_frame_on::<ActiveHost, R, F>(f)
}

pub fn with_frame_on<H, R, F>(f: F) -> R
where
    H: Host,
    F: for<'f> FnOnce(&mut RootFrame<'f, H>) -> R,
{
    let mut frame = RootFrame {
        frame: unsafe { begin_frame::<H>(&[]) },
        current: ptr::null_mut(),
        roots: 0,
        _brand: PhantomData,
        _host: PhantomData,
    };

    f(&mut frame)
}
