pub mod cache;
pub use cache::{Fingerprint, ResultCache};

pub mod invalidator;
pub use invalidator::{CacheInvalidator, Clock, LocalClock};

pub mod search;
pub use search::{SearchError, SearchService};
