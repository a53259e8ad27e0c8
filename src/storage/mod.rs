pub mod engine;
pub mod memory;
pub mod statement;
pub mod table;

pub use engine::{Storage, TransactionId};
pub use memory::InMemoryStorage;
pub use statement::Statement;
pub use table::Table;
