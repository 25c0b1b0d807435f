use crate::{Error, Object, Result};

use serde_json::Value;

/// An aggregation pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Group(Object),
    Match(Object),
    Project(Object),
    Sort(Object),
    Limit(u64),
    Skip(u64),

    /// Any other stage. Passed through by the document backend only.
    Other { name: String, body: Value },
}

impl Pipeline {
    /// Parses `[{"$group": {..}}, {"$limit": 10}, ..]`.
    pub fn from_json(value: &Value) -> Result<Pipeline> {
        let Value::Array(items) = value else {
            return Err(Error::invalid_query("pipeline must be an array of stages"));
        };
        let stages = items.iter().map(Stage::from_json).collect::<Result<_>>()?;
        Ok(Pipeline { stages })
    }
}

impl Stage {
    pub fn from_json(value: &Value) -> Result<Stage> {
        let stage = value
            .as_object()
            .filter(|stage| stage.len() == 1)
            .and_then(|stage| stage.iter().next())
            .ok_or_else(|| Error::invalid_query(format!("Invalid pipeline stage: {value}")))?;

        let (name, body) = stage;
        let object = || match body {
            Value::Object(object) => Ok(object.clone()),
            _ => Err(Error::invalid_query(format!(
                "Invalid parameter for query: {}",
                name.trim_start_matches('$')
            ))),
        };
        let count = || {
            body.as_u64().ok_or_else(|| {
                Error::invalid_query(format!(
                    "Invalid parameter for query: {}",
                    name.trim_start_matches('$')
                ))
            })
        };

        Ok(match name.as_str() {
            "$group" => Stage::Group(object()?),
            "$match" => Stage::Match(object()?),
            "$project" => Stage::Project(object()?),
            "$sort" => Stage::Sort(object()?),
            "$limit" => Stage::Limit(count()?),
            "$skip" => Stage::Skip(count()?),
            _ => Stage::Other {
                name: name.clone(),
                body: body.clone(),
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Group(_) => "$group",
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
            Stage::Other { name, .. } => name,
        }
    }
}
