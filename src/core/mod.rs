pub mod error;
pub mod types;
pub mod value;

pub use error::{RecordError, Result};
pub use types::{FieldType, Row};
pub use value::Value;
