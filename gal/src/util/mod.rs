pub mod align;
pub mod immediate_submit;

pub use align::align;
pub use immediate_submit::{ImmediateSubmit, ImmediateSubmitContext};

use std::ffi::{c_char, CStr};

/// Converts a Vulkan fixed-size name into an owned string
pub fn wrap_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}
