pub mod base;
pub mod memory;
pub mod mongo;
pub mod store;

pub use base::{DaoError, DaoResult};
pub use memory::MemoryCallStore;
pub use mongo::MongoCallStore;
pub use store::CallStore;
