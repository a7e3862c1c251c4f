//! A stand-in for the OCaml runtime, so frames can be exercised without linking one.
//!
//! Each thread gets its own heap and its own `local_roots` list (`SimHost`). Allocation is the
//! only thing that collects, and every collection moves every live block, so any value that isn't
//! reachable from a root when something allocates is left pointing at poisoned memory.

use std::cell::RefCell;
use std::ptr;

use crate::caml::domain_state::Host;
use crate::caml::mlvalues::{Tag, Value};
use crate::caml::roots::for_each_local_root;
use crate::frame::with_frame_on;

pub use compare::structural_eq;
pub use heap::{atom, SimConfig, SimHeap, SimStats, POISON};
pub use host::SimHost;

mod compare;
mod heap;
mod host;

thread_local! {
    static HEAP: RefCell<SimHeap> = RefCell::new(SimHeap::new(SimConfig::default()));
}

fn with_heap<R, F: FnOnce(&mut SimHeap) -> R>(f: F) -> R {
    HEAP.with(|heap| f(&mut heap.borrow_mut()))
}

/// Replace this thread's heap with an empty one. Any value from the old heap is dead after this.
pub fn configure(config: SimConfig) {
    with_heap(|heap| *heap = SimHeap::new(config));
}

pub fn stats() -> SimStats {
    with_heap(|heap| heap.stats())
}

pub fn is_live(value: Value) -> bool {
    with_heap(|heap| heap.is_live(value))
}

pub fn alloc(wosize: usize, tag: Tag) -> Value {
    with_heap(|heap| heap.alloc(wosize, tag, SimHost::local_roots()))
}

/// Force a full collection
pub fn collect() {
    with_heap(|heap| heap.collect(SimHost::local_roots(), 0));
}

/// Allocate a block holding `fields`, keeping them rooted while it allocates
pub fn alloc_block(tag: Tag, fields: &[Value]) -> Value {
    with_frame_on::<SimHost, _, _>(|frame| {
        let rooted: Vec<_> = fields.iter().map(|&field| frame.root(field)).collect();

        let block = alloc(fields.len(), tag);
        for (i, root) in rooted.iter().enumerate() {
            block.as_block().initialize_field(i, root.get());
        }
        block
    })
}

pub fn alloc_tuple(fields: &[Value]) -> Value {
    alloc_block(Tag(0), fields)
}

pub fn alloc_string(s: &str) -> Value {
    let bytes = s.as_bytes();
    let wosize = bytes.len() / 8 + 1;
    let value = alloc(wosize, Tag::STRING);

    // Same padding as the runtime: the last byte says how many bytes of padding come before it
    let last = wosize * 8 - 1;
    unsafe {
        let data = value.as_block().field_pointer(0) as *mut u8;
        ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
        *data.add(last) = (last - bytes.len()) as u8;
    }
    value
}

pub fn alloc_double(d: f64) -> Value {
    let value = alloc(1, Tag::DOUBLE);
    value
        .as_block()
        .initialize_field(0, Value::from_raw(d.to_bits() as i64));
    value
}

pub fn string_val(value: Value) -> String {
    let block = value.as_block();
    let bytes = block.bytes();
    let len = bytes.len() - 1 - bytes[bytes.len() - 1] as usize;
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

pub fn double_val(value: Value) -> f64 {
    f64::from_bits(value.as_block().get_field(0).raw() as u64)
}

pub fn field(value: Value, index: usize) -> Value {
    value.as_block().get_field(index)
}

/// Number of slots currently reachable from this thread's `local_roots`
pub fn registered_local_roots() -> usize {
    let mut count = 0;
    unsafe { for_each_local_root(SimHost::local_roots(), |_| count += 1) };
    count
}

/// `caml_register_global_root`
///
/// # Safety
/// `slot` must stay valid until it is removed again
pub unsafe fn register_global_root(slot: *mut Value) {
    with_heap(|heap| heap.register_global_root(slot));
}

/// `caml_remove_global_root`
///
/// # Safety
/// `slot` must have been registered with `register_global_root`
pub unsafe fn remove_global_root(slot: *mut Value) {
    with_heap(|heap| heap.remove_global_root(slot));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_strings() {
        for s in &["", "a", "1234567", "12345678", "a longer string over a few words"] {
            let v = alloc_string(s);
            assert_eq!(v.as_block().tag(), Tag::STRING);
            assert_eq!(string_val(v), *s);
        }

        assert_eq!(alloc_string("1234567").as_block().wosize(), 1);
        assert_eq!(alloc_string("12345678").as_block().wosize(), 2);
    }

    #[test]
    fn test_doubles() {
        assert_eq!(double_val(alloc_double(2.5)), 2.5);
        assert_eq!(double_val(alloc_double(-0.0)).to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_alloc_block_keeps_fields_alive() {
        // Collect on every allocation so building the tuple moves its fields
        configure(SimConfig {
            heap_words: 256,
            collect_every: Some(1),
        });

        let s = alloc_string("field");
        let tuple = alloc_tuple(&[s, Value::int(3)]);

        assert!(is_live(tuple));
        assert!(!is_live(s));
        assert_eq!(string_val(field(tuple, 0)), "field");
        assert_eq!(field(tuple, 1), Value::int(3));
        assert_eq!(registered_local_roots(), 0);
    }

    #[test]
    fn test_empty_block_is_an_atom() {
        assert_eq!(alloc_tuple(&[]), atom(Tag(0)));
        assert_eq!(alloc_block(Tag(2), &[]), atom(Tag(2)));
    }

    #[test]
    fn test_structural_equality() {
        let a = alloc_tuple(&[Value::int(1), alloc_string("x")]);
        let b = alloc_tuple(&[Value::int(1), alloc_string("x")]);
        let c = alloc_tuple(&[Value::int(1), alloc_string("y")]);
        let d = alloc_block(Tag(1), &[Value::int(1), alloc_string("x")]);

        assert_ne!(a, b);
        assert!(structural_eq(a, b));
        assert!(!structural_eq(a, c));
        assert!(!structural_eq(a, d));
        assert!(!structural_eq(a, Value::int(1)));
        assert!(structural_eq(Value::int(4), Value::int(4)));
        assert!(structural_eq(alloc_double(1.5), alloc_double(1.5)));
    }

    #[test]
    fn test_global_roots() {
        configure(SimConfig::default());

        let mut v = alloc_string("global");
        let before = v;
        unsafe { register_global_root(&mut v) };

        collect();
        assert_ne!(v, before);
        assert_eq!(string_val(v), "global");

        unsafe { remove_global_root(&mut v) };
        collect();
        assert!(!is_live(v));
    }
}
