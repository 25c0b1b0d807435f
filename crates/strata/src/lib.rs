pub mod db;
pub use db::connect;

pub use strata_core::{
    adapter, bail, err, schema, stmt, ClassSchema, Error, ErrorCode, FieldType, FindOptions,
    Object, Result, StorageAdapter,
};

#[cfg(feature = "mongodb")]
pub use strata_driver_mongodb as mongodb;

#[cfg(feature = "postgresql")]
pub use strata_driver_postgresql as postgresql;
