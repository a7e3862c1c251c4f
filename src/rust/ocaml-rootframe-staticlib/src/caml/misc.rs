use std::ffi::CString;
#[cfg(feature = "ocaml-runtime")]
use std::os::raw::c_char;

#[cfg(feature = "ocaml-runtime")]
extern "C" {
    fn caml_fatal_error(s: *const c_char, ...) -> !;
}

/// Stops the process through the host runtime's fatal error machinery
pub fn fatal_error(message: &str) -> ! {
    // Interior nul bytes would truncate the message, so drop them rather than losing it all
    let msg = CString::new(message.replace('\0', "")).unwrap_or_default();
    report_fatal(&msg)
}

#[cfg(feature = "ocaml-runtime")]
fn report_fatal(msg: &CString) -> ! {
    unsafe { caml_fatal_error(b"%s\0".as_ptr() as *const c_char, msg.as_ptr()) }
}

#[cfg(not(feature = "ocaml-runtime"))]
fn report_fatal(msg: &CString) -> ! {
    eprintln!("Fatal error: {}", msg.to_string_lossy());
    std::process::abort()
}
