pub mod auth;
pub mod dao;

pub use auth::{AuthError, AuthService, Identity};
pub use dao::{CallStore, DaoError, DaoResult, MemoryCallStore, MongoCallStore};
