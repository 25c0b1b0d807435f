//! Rewrites queries, updates, objects and pipelines into the stored
//! document layout, and decodes stored documents back.

mod aggregate;
pub use aggregate::{transform_pipeline, Aggregation};

pub mod key;

mod object;
pub use object::{decode_document, encode_object};

mod query;
pub use query::transform_where;

mod update;
pub use update::transform_update;

pub mod value;
