mod validation_cache;

pub use validation_cache::{CacheSettings, ValidationCache};
