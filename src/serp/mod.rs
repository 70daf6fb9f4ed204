//! Mobile result-page handling.
//!
//! - [`fetch`]: retrieves the raw HTML for one query
//! - [`parser`]: splits the HTML into ordered [`Section`](crate::models::Section)s
//! - [`classify`]: labels sections as popular-article or popular-topic and
//!   builds the per-query [`QuerySummary`](crate::models::QuerySummary)

pub mod classify;
pub mod fetch;
pub mod parser;

pub use classify::{classify_section, is_excluded_from_deep_analysis, summarize};
pub use fetch::fetch_sections;
