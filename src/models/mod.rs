pub mod search;

pub use search::{ResultRecord, SearchMode, SearchPayload, SearchRequest, SearchResponse};
