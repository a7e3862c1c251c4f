// Symbols are only exported when built against the real runtime: a staticlib exporting them
// over the simulated host would link into an OCaml program and silently root nothing. Without
// the feature they're plain functions for the tests to call.
#![cfg_attr(not(feature = "ocaml-runtime"), allow(dead_code))]

use std::panic;

use ocaml_rootframe_shared::{DisciplineError, FrameEvent};

use crate::caml::domain_state::ActiveHost;
use crate::caml::misc::fatal_error;
use crate::caml::mlvalues::Value;
use crate::checked::{self, CheckedFrame};
use crate::frame::{self, CamlFrame};
use crate::global_data::GlobalData;
use crate::on_shutdown;
use crate::trace::trace_frame_event;

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub extern "C" fn rootframe_on_startup() {
    // Set up the panic hook to call into the OCaml fatal error machinery
    // nothing here can unwind back through the C stubs anyway
    panic::set_hook(Box::new(|p| {
        fatal_error(format!("{}", p).as_str());
    }));

    GlobalData::force();
}

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub extern "C" fn rootframe_at_shutdown() {
    on_shutdown();
}

/* Checked family plumbing */

fn or_fatal<T>(result: Result<T, DisciplineError>) -> T {
    match result {
        Ok(t) => t,
        Err(e) => fatal_error(&format!("rootframe: {}", e)),
    }
}

fn check_slots(slots: &[*mut Value]) {
    if let Some(i) = slots.iter().position(|slot| slot.is_null()) {
        fatal_error(&format!("rootframe: root {} is a null pointer", i));
    }
}

fn record(event: &FrameEvent) {
    if !GlobalData::records_events() {
        return;
    }

    let mut global_data = GlobalData::get();
    trace_frame_event(&mut global_data, event);
}

macro_rules! param {
    ($name:ident, $checked:ident; $($v:ident),*) => {
        #[cfg_attr(feature = "ocaml-runtime", no_mangle)]
        pub unsafe extern "C" fn $name($($v: *mut Value),*) -> CamlFrame {
            frame::begin_frame::<ActiveHost>(&[$($v),*])
        }

        #[cfg_attr(feature = "ocaml-runtime", no_mangle)]
        pub unsafe extern "C" fn $checked($($v: *mut Value),*) -> CheckedFrame {
            let roots: &[*mut Value] = &[$($v),*];
            check_slots(roots);
            let (frame, event) = or_fatal(checked::begin_frame::<ActiveHost>(roots));
            record(&event);
            frame
        }
    };
}

macro_rules! extend {
    ($raw:path, $checked_op:path; $name:ident, $checked:ident; $($v:ident),+) => {
        #[cfg_attr(feature = "ocaml-runtime", no_mangle)]
        pub unsafe extern "C" fn $name(frame: CamlFrame, $($v: *mut Value),+) {
            $raw(frame, &[$($v),+])
        }

        #[cfg_attr(feature = "ocaml-runtime", no_mangle)]
        pub unsafe extern "C" fn $checked(frame: CheckedFrame, $($v: *mut Value),+) {
            let roots: &[*mut Value] = &[$($v),+];
            check_slots(roots);
            let event = or_fatal($checked_op(frame, roots));
            record(&event);
        }
    };
}

macro_rules! exported {
    ($($name:ident),* $(,)?) => {
        #[cfg(test)]
        const EXPORTED: &[&str] = &[$(stringify!($name)),*];
    };
}

param!(rootframe_param0, rootframe_checked_param0;);
param!(rootframe_param1, rootframe_checked_param1; v0);
param!(rootframe_param2, rootframe_checked_param2; v0, v1);
param!(rootframe_param3, rootframe_checked_param3; v0, v1, v2);
param!(rootframe_param4, rootframe_checked_param4; v0, v1, v2, v3);
param!(rootframe_param5, rootframe_checked_param5; v0, v1, v2, v3, v4);

extend!(frame::extend_frame::<ActiveHost>, checked::extend_frame::<ActiveHost>;
    rootframe_xparam1, rootframe_checked_xparam1; v0);
extend!(frame::extend_frame::<ActiveHost>, checked::extend_frame::<ActiveHost>;
    rootframe_xparam2, rootframe_checked_xparam2; v0, v1);
extend!(frame::extend_frame::<ActiveHost>, checked::extend_frame::<ActiveHost>;
    rootframe_xparam3, rootframe_checked_xparam3; v0, v1, v2);
extend!(frame::extend_frame::<ActiveHost>, checked::extend_frame::<ActiveHost>;
    rootframe_xparam4, rootframe_checked_xparam4; v0, v1, v2, v3);
extend!(frame::extend_frame::<ActiveHost>, checked::extend_frame::<ActiveHost>;
    rootframe_xparam5, rootframe_checked_xparam5; v0, v1, v2, v3, v4);

extend!(frame::local_frame::<ActiveHost>, checked::local_frame::<ActiveHost>;
    rootframe_local1, rootframe_checked_local1; v0);
extend!(frame::local_frame::<ActiveHost>, checked::local_frame::<ActiveHost>;
    rootframe_local2, rootframe_checked_local2; v0, v1);
extend!(frame::local_frame::<ActiveHost>, checked::local_frame::<ActiveHost>;
    rootframe_local3, rootframe_checked_local3; v0, v1, v2);
extend!(frame::local_frame::<ActiveHost>, checked::local_frame::<ActiveHost>;
    rootframe_local4, rootframe_checked_local4; v0, v1, v2, v3);
extend!(frame::local_frame::<ActiveHost>, checked::local_frame::<ActiveHost>;
    rootframe_local5, rootframe_checked_local5; v0, v1, v2, v3, v4);

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub unsafe extern "C" fn rootframe_drop(frame: CamlFrame) {
    frame::drop_frame::<ActiveHost>(frame);
}

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub unsafe extern "C" fn rootframe_return(frame: CamlFrame, result: Value) -> Value {
    frame::return_frame::<ActiveHost>(frame, result)
}

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub extern "C" fn rootframe_checked_drop(frame: CheckedFrame) {
    let event = or_fatal(checked::drop_frame::<ActiveHost>(frame));
    record(&event);
}

#[cfg_attr(feature = "ocaml-runtime", no_mangle)]
pub extern "C" fn rootframe_checked_return(frame: CheckedFrame, result: Value) -> Value {
    let (result, event) = or_fatal(checked::return_frame::<ActiveHost>(frame, result));
    record(&event);
    result
}

exported!(
    rootframe_param0,
    rootframe_param1,
    rootframe_param2,
    rootframe_param3,
    rootframe_param4,
    rootframe_param5,
    rootframe_xparam1,
    rootframe_xparam2,
    rootframe_xparam3,
    rootframe_xparam4,
    rootframe_xparam5,
    rootframe_local1,
    rootframe_local2,
    rootframe_local3,
    rootframe_local4,
    rootframe_local5,
    rootframe_drop,
    rootframe_return,
    rootframe_checked_param0,
    rootframe_checked_param1,
    rootframe_checked_param2,
    rootframe_checked_param3,
    rootframe_checked_param4,
    rootframe_checked_param5,
    rootframe_checked_xparam1,
    rootframe_checked_xparam2,
    rootframe_checked_xparam3,
    rootframe_checked_xparam4,
    rootframe_checked_xparam5,
    rootframe_checked_local1,
    rootframe_checked_local2,
    rootframe_checked_local3,
    rootframe_checked_local4,
    rootframe_checked_local5,
    rootframe_checked_drop,
    rootframe_checked_return,
);
