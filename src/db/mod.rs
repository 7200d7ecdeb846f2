mod connection;
mod helpers;
mod migrations;
pub mod repositories;

pub use connection::{Database, DbError};
pub use repositories::ImportSummary;
