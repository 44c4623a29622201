//! The Collection Resource builds a [`RequestContext`] per request and
//! threads it through the event pipeline; the type itself lives in
//! `basin-script` since it's constructed and consumed by the handler
//! bridge, not the router — this module just re-exports it under the name
//! the rest of the crate expects.

pub use basin_script::{Cancellation, Event, RequestContext};
