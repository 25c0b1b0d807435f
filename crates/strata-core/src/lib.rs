mod error;
pub use error::{Error, ErrorCode, IntoError};

pub mod adapter;
pub use adapter::{FindOptions, StorageAdapter};

pub mod schema;
pub use schema::{ClassSchema, FieldType};

pub mod stmt;

/// A Result type alias that uses Strata's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// A stored object, as exchanged with the surrounding query engine.
pub type Object = serde_json::Map<String, serde_json::Value>;

pub use async_trait::async_trait;
