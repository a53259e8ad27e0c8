pub mod sort;

pub use sort::{NullOrdering, RowComparator, SortExecutor, SortKey};
