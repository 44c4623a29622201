pub mod ast;
pub mod eval;
pub mod parse;
pub mod render;

pub use ast::{Comparison, Document, Filter, Projection, Query, SortDirection};
pub use parse::{parse_query, QueryError};
pub use render::query_to_json;
