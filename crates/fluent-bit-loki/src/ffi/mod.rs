// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! C entry points called by fluent-bit's Go/C proxy.
//!
//! ## Lifecycle
//!
//! ```c
//! FlbLokiRegistration reg;
//! flb_loki_register(&reg);                         // once, at load
//!
//! if (flb_loki_init(get_property, ins) != FLB_OK)  // once per instance
//!     return FLB_ERROR;
//!
//! return flb_loki_flush(id, data, size);           // per chunk
//!
//! flb_loki_exit();                                 // once, at shutdown
//! ```
//!
//! `get_property` receives the instance pointer and a property name and
//! returns the value as a NUL-terminated string, or NULL/empty when unset. The
//! instance id is read from the `id` property.
//!
//! ## Panic Safety
//!
//! Every function wraps its body in `std::panic::catch_unwind()` so a panic
//! never crosses the `extern "C"` boundary; it is reported as `FLB_ERROR`.
//!
//! ## Thread Safety
//!
//! fluent-bit serializes `flb_loki_init` calls. `flb_loki_flush` may be called
//! concurrently for different ids.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use tracing::error;

use crate::config::{ConfigLookup, KEY_ID};
use crate::error::FlushStatus;
use crate::plugin::{Plugin, Registration};

pub const FLB_ERROR: c_int = FlushStatus::Error as c_int;
pub const FLB_OK: c_int = FlushStatus::Ok as c_int;
pub const FLB_RETRY: c_int = FlushStatus::Retry as c_int;

static PLUGIN: OnceLock<Plugin> = OnceLock::new();

fn plugin() -> &'static Plugin {
    PLUGIN.get_or_init(Plugin::new)
}

/// Plugin name and description, both static NUL-terminated strings.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct FlbLokiRegistration {
    pub name: *const c_char,
    pub description: *const c_char,
}

/// Property lookup supplied by the host.
pub type ConfigLookupFn =
    unsafe extern "C" fn(user_data: *mut c_void, key: *const c_char) -> *const c_char;

/// Adapts the host's property callback to [`ConfigLookup`].
struct HostLookup {
    callback: ConfigLookupFn,
    user_data: *mut c_void,
}

impl ConfigLookup for HostLookup {
    fn get(&self, key: &str) -> String {
        let Ok(key) = CString::new(key) else {
            return String::new();
        };
        // SAFETY: the host guarantees `callback` accepts its own `user_data`
        // and returns NULL or a NUL-terminated string valid for this call.
        unsafe {
            let value = (self.callback)(self.user_data, key.as_ptr());
            if value.is_null() {
                return String::new();
            }
            CStr::from_ptr(value).to_string_lossy().into_owned()
        }
    }
}

/// Fills `registration` with the plugin name and description.
///
/// # Safety
///
/// `registration` must be NULL or point to writable memory for one
/// `FlbLokiRegistration`.
#[no_mangle]
pub unsafe extern "C" fn flb_loki_register(registration: *mut FlbLokiRegistration) -> c_int {
    static NAME: OnceLock<CString> = OnceLock::new();
    static DESCRIPTION: OnceLock<CString> = OnceLock::new();

    let result = catch_unwind(AssertUnwindSafe(|| {
        if registration.is_null() {
            return FLB_ERROR;
        }
        let Registration { name, description } = Plugin::register();
        *registration = FlbLokiRegistration {
            name: static_cstr(&NAME, name),
            description: static_cstr(&DESCRIPTION, description),
        };
        FLB_OK
    }));
    result.unwrap_or(FLB_ERROR)
}

fn static_cstr(cell: &'static OnceLock<CString>, value: &str) -> *const c_char {
    cell.get_or_init(|| CString::new(value).unwrap_or_default())
        .as_ptr()
}

/// Initializes one plugin instance.
///
/// # Safety
///
/// `lookup` must be safe to call with `user_data` and any NUL-terminated key
/// for the duration of this call.
#[no_mangle]
pub unsafe extern "C" fn flb_loki_init(
    lookup: Option<ConfigLookupFn>,
    user_data: *mut c_void,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(callback) = lookup else {
            error!("flb_loki_init called without a property lookup");
            return FLB_ERROR;
        };
        let lookup = HostLookup {
            callback,
            user_data,
        };
        let id = lookup.get(KEY_ID);
        match plugin().init(&id, &lookup) {
            Ok(()) => FLB_OK,
            Err(_) => FLB_ERROR,
        }
    }));
    result.unwrap_or_else(|_| {
        error!("Panic during plugin initialization");
        FLB_ERROR
    })
}

/// Forwards one chunk of msgpack-encoded events for instance `id`.
///
/// Returns `FLB_OK`, `FLB_ERROR` or `FLB_RETRY`.
///
/// # Safety
///
/// - `id` must be NULL or a NUL-terminated string.
/// - `data` must be NULL (with `length == 0`) or valid for reads of `length` bytes.
#[no_mangle]
pub unsafe extern "C" fn flb_loki_flush(
    id: *const c_char,
    data: *const u8,
    length: usize,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        if id.is_null() || (data.is_null() && length > 0) {
            error!("flb_loki_flush called with a null pointer");
            return FLB_ERROR;
        }
        let id = CStr::from_ptr(id).to_string_lossy();
        let chunk: &[u8] = if length == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(data, length)
        };
        plugin().flush_status(&id, chunk).code()
    }));
    result.unwrap_or_else(|_| {
        error!("Panic during flush");
        FLB_ERROR
    })
}

/// Stops every instance's client, draining pending entries.
#[no_mangle]
pub extern "C" fn flb_loki_exit() -> c_int {
    let result = catch_unwind(|| {
        if let Some(plugin) = PLUGIN.get() {
            plugin.exit();
        }
        FLB_OK
    });
    result.unwrap_or_else(|_| {
        error!("Panic during exit");
        FLB_ERROR
    })
}

/// Library version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn flb_loki_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast::<c_char>()
}
