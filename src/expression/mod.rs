pub mod pattern;
pub mod predicate;

pub use pattern::{Anchor, Pattern};
pub use predicate::{ColumnIndex, Predicate};
