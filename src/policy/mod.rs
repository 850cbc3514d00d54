pub mod lru_index;

pub use lru_index::{LruIndex, LruSnapshot};
