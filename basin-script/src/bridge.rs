//! Ties the handler cache to the two runtimes: resolves a compiled
//! program, runs it on a blocking thread (both `mlua` and `dlopen`'d code
//! execute synchronously), and enforces the per-invocation deadline.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CompiledProgram, HandlerCache};
use crate::context::{Event, RequestContext};
use crate::error::ScriptError;
use crate::{lua_runtime, native_runtime::NativeHandler};

/// Run the handler for `(collection, event)`, if any, against `ctx`, and
/// return the (possibly mutated) context. A missing handler is a no-op,
/// not an error.
pub async fn invoke(
    cache: &HandlerCache,
    collection: &str,
    event: Event,
    ctx: RequestContext,
    timeout: Duration,
) -> Result<RequestContext, ScriptError> {
    let program = cache.resolve(collection, event).await?;
    if matches!(*program, CompiledProgram::Noop) {
        return Ok(ctx);
    }

    let location = format!("{collection}/{}", event.file_stem());
    let join_location = location.clone();
    let task = tokio::task::spawn_blocking(move || run_blocking(program, &location, ctx));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(_join_err)) => Err(ScriptError::Runtime {
            location: join_location,
            message: "handler task panicked".to_string(),
        }),
        Err(_elapsed) => Err(ScriptError::TimedOut),
    }
}

fn run_blocking(
    program: Arc<CompiledProgram>,
    location: &str,
    ctx: RequestContext,
) -> Result<RequestContext, ScriptError> {
    let shared = Rc::new(RefCell::new(ctx));
    match &*program {
        CompiledProgram::Script(source) => lua_runtime::invoke(source, location, &shared)?,
        CompiledProgram::Native(handler) => invoke_native(handler, location, &shared)?,
        CompiledProgram::Noop => {}
    }
    match Rc::try_unwrap(shared) {
        Ok(cell) => Ok(cell.into_inner()),
        Err(rc) => Ok(rc.borrow().clone()),
    }
}

fn invoke_native(handler: &NativeHandler, location: &str, ctx: &Rc<RefCell<RequestContext>>) -> Result<(), ScriptError> {
    handler.invoke(location, ctx)
}
