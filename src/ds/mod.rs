pub mod index_list;
pub mod result_cell;

pub use index_list::IndexList;
pub use result_cell::{ResultCell, collect_all, collect_some};
