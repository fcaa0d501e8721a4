//! Authoritative relational persistence for the data-lake metadata control
//! plane: databases, tables, columns, metadata, files, and the change-log
//! CDC feed that `lakehouse_astha` polls.

pub mod entities;
pub mod error;
pub mod iceberg_type;
pub mod migrations;
pub mod store;
pub mod validation;

pub use entities::*;
pub use error::{Error, Result};
pub use store::Registry;
