//! The native runtime: a compiled handler shipped as a shared object,
//! loaded with `libloading` and invoked through a small C ABI. The handler
//! receives its input as JSON byte buffers and reports mutations back
//! through callbacks rather than writing through fixed-size buffers, since
//! the handler doesn't know ahead of time how large the mutated document
//! will be.

use std::cell::RefCell;
use std::ffi::c_void;
use std::path::Path;
use std::rc::Rc;

use libloading::{Library, Symbol};
use serde_json::Value as JsonValue;

use crate::context::RequestContext;
use crate::error::ScriptError;

#[repr(C)]
pub struct NativeBuffer {
    pub ptr: *const u8,
    pub len: usize,
}

pub type LogCallback = extern "C" fn(user_data: *mut c_void, ptr: *const u8, len: usize);
pub type FieldCallback = extern "C" fn(user_data: *mut c_void, ptr: *const u8, len: usize);
pub type ErrorCallback =
    extern "C" fn(user_data: *mut c_void, field_ptr: *const u8, field_len: usize, msg_ptr: *const u8, msg_len: usize);
pub type CancelCallback = extern "C" fn(user_data: *mut c_void, msg_ptr: *const u8, msg_len: usize, status: i32);
pub type SetBufferCallback = extern "C" fn(user_data: *mut c_void, ptr: *const u8, len: usize);

/// The context a native handler's `run` entry point receives. Field order
/// and layout are part of the handler ABI and must not change without
/// rebuilding handlers compiled against it.
#[repr(C)]
pub struct NativeContext {
    pub data: NativeBuffer,
    pub query: NativeBuffer,
    pub me: NativeBuffer,
    pub is_root: i32,
    pub method: NativeBuffer,
    pub user_data: *mut c_void,
    pub log: LogCallback,
    pub error: ErrorCallback,
    pub cancel: CancelCallback,
    pub hide: FieldCallback,
    pub protect: FieldCallback,
    pub set_data: SetBufferCallback,
    pub set_query: SetBufferCallback,
}

type RunFn = unsafe extern "C" fn(*mut NativeContext) -> i32;

struct CallbackState {
    ctx: Rc<RefCell<RequestContext>>,
    new_data: Option<Vec<u8>>,
    new_query: Option<Vec<u8>>,
}

unsafe fn str_from_raw(ptr: *const u8, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    let slice = std::slice::from_raw_parts(ptr, len);
    String::from_utf8_lossy(slice).into_owned()
}

extern "C" fn host_log(_user_data: *mut c_void, ptr: *const u8, len: usize) {
    let message = unsafe { str_from_raw(ptr, len) };
    tracing::info!(target: "basin_script::handler", "{message}");
}

extern "C" fn host_error(user_data: *mut c_void, field_ptr: *const u8, field_len: usize, msg_ptr: *const u8, msg_len: usize) {
    let field = unsafe { str_from_raw(field_ptr, field_len) };
    let message = unsafe { str_from_raw(msg_ptr, msg_len) };
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    state.borrow().ctx.borrow_mut().record_error(field, message);
}

extern "C" fn host_cancel(user_data: *mut c_void, msg_ptr: *const u8, msg_len: usize, status: i32) {
    let message = unsafe { str_from_raw(msg_ptr, msg_len) };
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    let status = if status > 0 { Some(status as u16) } else { None };
    state.borrow().ctx.borrow_mut().cancel(message, status);
}

extern "C" fn host_hide(user_data: *mut c_void, ptr: *const u8, len: usize) {
    let field = unsafe { str_from_raw(ptr, len) };
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    state.borrow().ctx.borrow_mut().hide(field);
}

extern "C" fn host_protect(user_data: *mut c_void, ptr: *const u8, len: usize) {
    let field = unsafe { str_from_raw(ptr, len) };
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    state.borrow().ctx.borrow_mut().protect(field);
}

extern "C" fn host_set_data(user_data: *mut c_void, ptr: *const u8, len: usize) {
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec();
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    state.borrow_mut().new_data = Some(bytes);
}

extern "C" fn host_set_query(user_data: *mut c_void, ptr: *const u8, len: usize) {
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec();
    let state = unsafe { &*(user_data as *const RefCell<CallbackState>) };
    state.borrow_mut().new_query = Some(bytes);
}

/// A loaded shared object. Kept around in the handler cache so repeated
/// invocations don't pay `dlopen` again; the `run` symbol is re-resolved
/// on every call, which is cheap relative to the call itself.
pub struct NativeHandler {
    library: Library,
}

impl NativeHandler {
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let library = unsafe { Library::new(path) }.map_err(|e| ScriptError::CompileFailed {
            location: path.display().to_string(),
            message: e.to_string(),
        })?;
        // Resolve eagerly once so a missing symbol fails at load time, not
        // on the first request.
        unsafe {
            let _: Symbol<RunFn> = library.get(b"run\0").map_err(|e| ScriptError::CompileFailed {
                location: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(Self { library })
    }

    pub fn invoke(&self, location: &str, ctx: &Rc<RefCell<RequestContext>>) -> Result<(), ScriptError> {
        let run: Symbol<RunFn> = unsafe { self.library.get(b"run\0") }.map_err(|e| ScriptError::Runtime {
            location: location.to_string(),
            message: e.to_string(),
        })?;

        let data_json = serde_json::to_vec(&JsonValue::Object(ctx.borrow().data.clone()))
            .map_err(|e| runtime_error(location, e))?;
        let query_json = serde_json::to_vec(&basin_query::query_to_json(&ctx.borrow().query))
            .map_err(|e| runtime_error(location, e))?;
        let me_json = serde_json::to_vec(&ctx.borrow().me.clone().unwrap_or(JsonValue::Null))
            .map_err(|e| runtime_error(location, e))?;
        let method = ctx.borrow().method.clone();
        let is_root = ctx.borrow().is_root;

        let state = RefCell::new(CallbackState { ctx: ctx.clone(), new_data: None, new_query: None });

        let mut native_ctx = NativeContext {
            data: NativeBuffer { ptr: data_json.as_ptr(), len: data_json.len() },
            query: NativeBuffer { ptr: query_json.as_ptr(), len: query_json.len() },
            me: NativeBuffer { ptr: me_json.as_ptr(), len: me_json.len() },
            is_root: is_root as i32,
            method: NativeBuffer { ptr: method.as_ptr(), len: method.len() },
            user_data: &state as *const RefCell<CallbackState> as *mut c_void,
            log: host_log,
            error: host_error,
            cancel: host_cancel,
            hide: host_hide,
            protect: host_protect,
            set_data: host_set_data,
            set_query: host_set_query,
        };

        let code = unsafe { run(&mut native_ctx as *mut NativeContext) };
        if code != 0 {
            return Err(ScriptError::Runtime {
                location: location.to_string(),
                message: format!("native handler returned non-zero status {code}"),
            });
        }

        let state = state.into_inner();
        if let Some(bytes) = state.new_data {
            if let Ok(value) = serde_json::from_slice::<JsonValue>(&bytes) {
                ctx.borrow_mut().data = value.as_object().cloned().unwrap_or_default();
            }
        }
        if let Some(bytes) = state.new_query {
            if let Ok(value) = serde_json::from_slice::<JsonValue>(&bytes) {
                if let Ok(query) = basin_query::parse_query(&value) {
                    ctx.borrow_mut().query = query;
                }
            }
        }
        Ok(())
    }
}

fn runtime_error(location: &str, err: serde_json::Error) -> ScriptError {
    ScriptError::Runtime { location: location.to_string(), message: err.to_string() }
}

/// Drives the `host_*` callbacks directly against a manually built
/// [`CallbackState`], the way a loaded `.so`'s `run` entry point would —
/// without needing an actual shared object to compile and load. Exercises
/// the same `RequestContext` mutations the Lua runtime reaches through
/// global functions instead (spec.md §8's scenarios apply to either
/// runtime equally; this is the native side of that parity).
#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> (Rc<RefCell<RequestContext>>, RefCell<CallbackState>) {
        let ctx = Rc::new(RefCell::new(RequestContext::new(
            "POST",
            basin_query::Document::new(),
            basin_query::Query::match_all(),
            None,
            false,
        )));
        let state = RefCell::new(CallbackState { ctx: ctx.clone(), new_data: None, new_query: None });
        (ctx, state)
    }

    fn user_data(state: &RefCell<CallbackState>) -> *mut c_void {
        state as *const RefCell<CallbackState> as *mut c_void
    }

    #[test]
    fn host_error_records_a_field_error_on_the_context() {
        let (ctx, state) = fresh_state();
        let field = b"title";
        let msg = b"required";
        host_error(user_data(&state), field.as_ptr(), field.len(), msg.as_ptr(), msg.len());
        assert_eq!(ctx.borrow().errors.get("title"), Some(&"required".to_string()));
    }

    #[test]
    fn host_cancel_sets_message_and_status_once() {
        let (ctx, state) = fresh_state();
        let msg = b"out of stock";
        host_cancel(user_data(&state), msg.as_ptr(), msg.len(), 409);
        let cancelled = ctx.borrow().cancelled.clone().unwrap();
        assert_eq!(cancelled.message, "out of stock");
        assert_eq!(cancelled.status, 409);

        // A second cancel call must not overwrite the first (RequestContext::cancel is first-wins).
        let later = b"too late";
        host_cancel(user_data(&state), later.as_ptr(), later.len(), 500);
        assert_eq!(ctx.borrow().cancelled.as_ref().unwrap().status, 409);
    }

    #[test]
    fn host_cancel_with_zero_status_defaults_to_400() {
        let (ctx, state) = fresh_state();
        let msg = b"bad request";
        host_cancel(user_data(&state), msg.as_ptr(), msg.len(), 0);
        assert_eq!(ctx.borrow().cancelled.as_ref().unwrap().status, 400);
    }

    #[test]
    fn host_hide_and_host_protect_add_to_their_sets() {
        let (ctx, state) = fresh_state();
        let field = b"ssn";
        host_hide(user_data(&state), field.as_ptr(), field.len());
        host_protect(user_data(&state), field.as_ptr(), field.len());
        assert!(ctx.borrow().hidden.contains("ssn"));
        assert!(ctx.borrow().protected.contains("ssn"));
    }

    #[test]
    fn host_set_data_and_host_set_query_stage_bytes_for_invoke_to_apply() {
        let (_ctx, state) = fresh_state();
        let data = br#"{"title":"rewritten"}"#;
        let query = br#"{"limit":5}"#;
        host_set_data(user_data(&state), data.as_ptr(), data.len());
        host_set_query(user_data(&state), query.as_ptr(), query.len());

        let state = state.into_inner();
        assert_eq!(state.new_data.as_deref(), Some(&data[..]));
        assert_eq!(state.new_query.as_deref(), Some(&query[..]));
    }
}
