pub mod models;
pub mod operations;
pub mod query;
pub mod store;

pub use operations::DatabaseOperations;
pub use query::{Filter, Query, Value};
pub use store::RecordStore;

#[cfg(test)]
pub use store::MockRecordStore;
