//! The request context handlers observe and mutate (spec §3/§4.3). One
//! `RequestContext` is built per incoming request and threaded through the
//! event pipeline; the bridge re-reads it from the runtime on every handler
//! return rather than trusting the copy it handed in.

use std::collections::{BTreeMap, HashSet};

use basin_query::{Document, Query};
use serde_json::Value;

/// The pipeline stage a compiled handler runs for. File names under a
/// collection's handler directory match these, lowercased
/// (`validate.lua`, `post.so`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    BeforeRequest,
    Validate,
    Get,
    Post,
    Put,
    Delete,
    AfterCommit,
}

impl Event {
    pub fn file_stem(self) -> &'static str {
        match self {
            Event::BeforeRequest => "beforerequest",
            Event::Validate => "validate",
            Event::Get => "get",
            Event::Post => "post",
            Event::Put => "put",
            Event::Delete => "delete",
            Event::AfterCommit => "aftercommit",
        }
    }

    /// `beforerequest`/`aftercommit` are the optional hooks (spec.md §4.1's
    /// `?` suffix); a compile failure in one of these is logged and
    /// skipped rather than failing the request.
    pub fn is_optional(self) -> bool {
        matches!(self, Event::BeforeRequest | Event::AfterCommit)
    }
}

/// Recorded by a handler calling `cancel(message, status)`. Once set, no
/// further handler in the chain runs and the storage call is skipped.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub message: String,
    pub status: u16,
}

/// The mutable state a handler sees and can change. `data` and `query` are
/// the two fields handlers mutate in place; `errors`/`cancelled`/`hidden`/
/// `protected` are populated by the host functions a handler calls.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub data: Document,
    pub query: Query,
    pub me: Option<Value>,
    pub is_root: bool,
    pub method: String,
    pub errors: BTreeMap<String, String>,
    pub cancelled: Option<Cancellation>,
    pub hidden: HashSet<String>,
    pub protected: HashSet<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, data: Document, query: Query, me: Option<Value>, is_root: bool) -> Self {
        Self {
            data,
            query,
            me,
            is_root,
            method: method.into(),
            errors: BTreeMap::new(),
            cancelled: None,
            hidden: HashSet::new(),
            protected: HashSet::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn record_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    pub fn cancel(&mut self, message: impl Into<String>, status: Option<u16>) {
        if self.cancelled.is_none() {
            self.cancelled = Some(Cancellation {
                message: message.into(),
                status: status.unwrap_or(400),
            });
        }
    }

    pub fn hide(&mut self, field: impl Into<String>) {
        self.hidden.insert(field.into());
    }

    pub fn protect(&mut self, field: impl Into<String>) {
        self.protected.insert(field.into());
    }
}
