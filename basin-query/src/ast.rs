//! The adapter-neutral query AST (spec §4.4). A `StorageAdapter` translates
//! this into its native query form — a relational `WHERE`/`ORDER BY`/
//! `LIMIT`/`OFFSET` clause or an in-memory predicate.

use serde_json::Value;

/// A document: a mapping from property name to value. The host's canonical
/// value model (spec §3) — JSON already satisfies the primitive-
/// preservation rule the bridge relies on.
pub type Document = serde_json::Map<String, Value>;

/// A single comparison against one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex { pattern: String, options: Option<String> },
}

/// A filter clause: either a comparison on one field, or a logical
/// combination of sub-clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field { field: String, comparison: Comparison },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    /// The empty filter — matches every document. The canonical
    /// representation of `{}` and of an empty `$and`.
    MatchAll,
}

/// Sort direction for a single `$sort` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A fully parsed query: a filter plus the reserved modifiers (spec §4.4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    /// Projection: fields explicitly included (`1`) or excluded (`0`).
    /// Mixing inclusion and exclusion is rejected at parse time.
    pub fields: Option<Projection>,
    /// `$skipEvents` — honored only when the caller is root (spec §4.1).
    pub skip_events: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::MatchAll
    }
}

impl Query {
    pub fn match_all() -> Self {
        Query::default()
    }
}
