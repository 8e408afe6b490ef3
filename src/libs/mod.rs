mod column;
pub mod config;
pub mod error;
pub mod model;
pub mod orm;
pub mod query_builder;
pub mod record;
pub mod schema;

// Re-export them for easier access from the crate root
pub use config::*;
pub use error::*;
pub use orm::*;
pub use query_builder::{FindAll, Limit};
pub use record::*;
pub use schema::*;
