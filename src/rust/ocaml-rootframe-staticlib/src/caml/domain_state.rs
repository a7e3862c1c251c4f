use super::roots::CamlRootsBlock;

/// Access to the runtime's `local_roots` list, the head of the chain of root blocks the collector
/// scans on every collection
pub trait Host {
    fn local_roots() -> *mut CamlRootsBlock;

    /// # Safety
    /// `roots` must be null or a block that stays live until it is unlinked again
    unsafe fn set_local_roots(roots: *mut CamlRootsBlock);
}

#[cfg(feature = "ocaml-runtime")]
pub use self::ocaml::{DomainState, OcamlHost};

#[cfg(feature = "ocaml-runtime")]
pub type ActiveHost = OcamlHost;

#[cfg(not(feature = "ocaml-runtime"))]
pub type ActiveHost = crate::sim::SimHost;

#[cfg(feature = "ocaml-runtime")]
mod ocaml {
    use std::os::raw::c_void;

    use super::Host;
    use crate::caml::mlvalues::Value;
    use crate::caml::roots::CamlRootsBlock;

    // Using void pointers where the types don't matter. The layout is the 4.12 `domain_state.tbl`.

    #[allow(dead_code)]
    #[repr(C, align(8))]
    pub struct DomainState {
        young_ptr: *const c_void,
        young_limit: *const c_void,

        exception_pointer: *const c_void,

        young_base: *const c_void,
        young_start: *const c_void,
        young_end: *const c_void,
        young_alloc_start: *const c_void,
        young_alloc_end: *const c_void,
        young_alloc_mid: *const c_void,
        young_trigger: *const c_void,
        minor_heap_wsz: usize,
        in_minor_collection: i64,
        extra_heap_resources_minor: f64,
        ref_table: *const c_void,
        ephe_ref_table: *const c_void,
        custom_table: *const c_void,

        stack_low: *const Value,
        stack_high: *const Value,
        stack_threshold: *const Value,
        extern_sp: u64,
        trapsp: u64,
        trap_barrier: *mut Value,
        external_raise: u64,
        exn_bucket: Value,

        top_of_stack: *const c_void,
        bottom_of_stack: *const c_void,
        last_return_address: u64,
        gc_regs: *const c_void,

        backtrace_active: i64,
        backtrace_pos: i64,
        backtrace_buffer: *const c_void,
        backtrace_last_exn: Value,

        compare_unordered: i64,
        requested_major_slice: i64,
        requested_minor_gc: i64,
        pub local_roots: *mut CamlRootsBlock,
    }

    extern "C" {
        static Caml_state: *mut DomainState;
    }

    pub struct OcamlHost;

    impl Host for OcamlHost {
        #[inline(always)]
        fn local_roots() -> *mut CamlRootsBlock {
            unsafe { (*Caml_state).local_roots }
        }

        #[inline(always)]
        unsafe fn set_local_roots(roots: *mut CamlRootsBlock) {
            (*Caml_state).local_roots = roots;
        }
    }
}
