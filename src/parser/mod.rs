pub mod medline;

pub use medline::{ParseError, parse_search_results};
