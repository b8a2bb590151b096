//! Diesel queries, one module per resource.
//!
//! Functions take a plain `&MysqlConnection` and never touch the async
//! runtime; handlers reach them through [`crate::db::Database::run`].

pub mod ingredients;
pub mod recipes;
pub mod relations;
pub mod users;
