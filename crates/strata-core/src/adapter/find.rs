use crate::{Error, Result};

use indexmap::IndexMap;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Options accepted by [`StorageAdapter::find`](super::StorageAdapter::find).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,

    /// Field (dotted paths allowed) to direction, in priority order.
    pub sort: IndexMap<String, Direction>,

    /// Projection. `ACL` expands to the permission arrays; relation fields are dropped.
    pub keys: Option<Vec<String>>,

    /// Compare `username` and `email` case-insensitively.
    pub case_insensitive: bool,

    /// Honored by the document backend only.
    pub read_preference: Option<String>,

    /// Return the backend's query plan instead of objects.
    pub explain: bool,
}

impl Direction {
    pub fn from_json(value: &Value) -> Result<Direction> {
        match value.as_i64() {
            Some(1) => Ok(Direction::Asc),
            Some(-1) => Ok(Direction::Desc),
            _ => Err(Error::invalid_json(format!("invalid sort direction: {value}"))),
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }
}

impl FindOptions {
    pub fn sort_by(mut self, field: impl Into<String>, direction: Direction) -> FindOptions {
        self.sort.insert(field.into(), direction);
        self
    }

    pub fn limit(mut self, limit: u64) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> FindOptions {
        self.skip = Some(skip);
        self
    }

    pub fn keys<I, S>(mut self, keys: I) -> FindOptions
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}
