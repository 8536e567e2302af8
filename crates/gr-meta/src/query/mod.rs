//! Query helpers for reading data from the store.
//!
//! - [`adhoc`]: Ad-hoc SQL queries, table listing, row counts
//! - [`promotion`]: Gate-filtered reads for curated-tier refresh

pub mod adhoc;
pub mod promotion;

pub use adhoc::{execute_query, list_tables, table_row_count, QueryResult};
pub use promotion::{promotable_for_run, promotable_observations};
