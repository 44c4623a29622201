pub mod bridge;
pub mod cache;
pub mod context;
pub mod error;
pub mod lua_runtime;
pub mod native_runtime;
pub mod watch;

pub use cache::{CompiledProgram, HandlerCache};
pub use context::{Cancellation, Event, RequestContext};
pub use error::ScriptError;
pub use watch::HandlerWatcher;
