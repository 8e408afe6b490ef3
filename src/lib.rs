//! # minorm
//!
//! A small async ORM for MySQL. Declare a table once, get the select,
//! insert, update and delete statements derived for it, and run them
//! through a pooled connection.
//!
//! ```no_run
//! use minorm::{Field, FindAll, OrmPool, PoolConfig, Schema};
//!
//! # async fn demo() -> minorm::Result<()> {
//! let users = Schema::new("User")
//!     .table("users")
//!     .field("id", Field::integer().primary_key())
//!     .field("name", Field::string())
//!     .register()?;
//!
//! let pool = OrmPool::create_pool(&PoolConfig::new("www-data", "www-data", "awesome")).await?;
//!
//! let mut user = users.record().with("name", "Test");
//! user.save(&pool).await?;
//!
//! let everyone = users.find_all(&pool, FindAll::new().order_by("`id`")).await?;
//! # Ok(())
//! # }
//! ```

pub mod libs;

pub use libs::*;
