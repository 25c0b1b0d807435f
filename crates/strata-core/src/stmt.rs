mod acl;
pub use acl::{join_acl, split_acl};

mod atom;
pub use atom::Atom;

mod constraint;
pub use constraint::{Comparator, Constraint, TextSearch};

mod geo;
pub use geo::{GeoPoint, Polygon};

mod keys;
pub use keys::{expand_dot_fields, validate_keys};

mod pipeline;
pub use pipeline::{Pipeline, Stage};

pub mod pointer;

mod query;
pub use query::{Query, QueryEntry};

mod update;
pub use update::{Operation, Update};

use crate::{Error, Result};
use serde_json::Value;

/// Rejects `{"$relativeTime": ..}` operands, which neither backend evaluates.
pub(crate) fn reject_relative_time(value: &Value) -> Result<()> {
    match value {
        Value::Object(object) if object.contains_key("$relativeTime") => Err(Error::invalid_json(
            "$relativeTime is not supported by this storage adapter",
        )),
        _ => Ok(()),
    }
}

/// Reads a JSON number as `f64`.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}
