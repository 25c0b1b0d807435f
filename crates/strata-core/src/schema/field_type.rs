use crate::Error;

use serde::{Deserialize, Serialize};

/// The declared type of a class field.
///
/// Serialized the way schema records store it: `{"type": "Pointer", "targetClass": "_User"}`,
/// `{"type": "Array", "contents": {"type": "String"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldType", into = "RawFieldType")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Bytes,
    File,
    GeoPoint,
    Polygon,

    /// An array, optionally declaring the type of its elements.
    Array(Option<Box<FieldType>>),

    Pointer(String),
    Relation(String),

    /// Access control list. Never stored as-is: the storage schema replaces it
    /// with the `_rperm` and `_wperm` string arrays.
    Acl,
}

#[derive(Serialize, Deserialize)]
struct RawFieldType {
    #[serde(rename = "type")]
    ty: String,

    #[serde(
        rename = "targetClass",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    target_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    contents: Option<Box<RawFieldType>>,
}

impl FieldType {
    pub fn string_array() -> FieldType {
        FieldType::Array(Some(Box::new(FieldType::String)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Object => "Object",
            FieldType::Bytes => "Bytes",
            FieldType::File => "File",
            FieldType::GeoPoint => "GeoPoint",
            FieldType::Polygon => "Polygon",
            FieldType::Array(_) => "Array",
            FieldType::Pointer(_) => "Pointer",
            FieldType::Relation(_) => "Relation",
            FieldType::Acl => "ACL",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// Arrays declared with `String` contents get native text-array storage.
    pub fn is_string_array(&self) -> bool {
        matches!(self, FieldType::Array(Some(contents)) if **contents == FieldType::String)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, FieldType::Pointer(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, FieldType::Relation(_))
    }

    pub fn target_class(&self) -> Option<&str> {
        match self {
            FieldType::Pointer(target) | FieldType::Relation(target) => Some(target),
            _ => None,
        }
    }
}

impl core::fmt::Display for FieldType {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            FieldType::Pointer(target) => write!(f, "Pointer<{target}>"),
            FieldType::Relation(target) => write!(f, "Relation<{target}>"),
            FieldType::Array(Some(contents)) => write!(f, "Array<{contents}>"),
            other => f.write_str(other.name()),
        }
    }
}

impl TryFrom<RawFieldType> for FieldType {
    type Error = Error;

    fn try_from(raw: RawFieldType) -> Result<FieldType, Error> {
        let RawFieldType {
            ty,
            target_class,
            contents,
        } = raw;

        let target = || {
            target_class
                .clone()
                .ok_or_else(|| Error::invalid_json(format!("type {ty} requires a targetClass")))
        };

        Ok(match ty.as_str() {
            "String" => FieldType::String,
            "Number" => FieldType::Number,
            "Boolean" => FieldType::Boolean,
            "Date" => FieldType::Date,
            "Object" => FieldType::Object,
            "Bytes" => FieldType::Bytes,
            "File" => FieldType::File,
            "GeoPoint" => FieldType::GeoPoint,
            "Polygon" => FieldType::Polygon,
            "ACL" => FieldType::Acl,
            "Array" => FieldType::Array(match contents {
                Some(contents) => Some(Box::new(FieldType::try_from(*contents)?)),
                None => None,
            }),
            "Pointer" => FieldType::Pointer(target()?),
            "Relation" => FieldType::Relation(target()?),
            other => return Err(Error::invalid_json(format!("invalid field type: {other}"))),
        })
    }
}

impl From<FieldType> for RawFieldType {
    fn from(ty: FieldType) -> RawFieldType {
        let name = ty.name().to_string();
        match ty {
            FieldType::Pointer(target) | FieldType::Relation(target) => RawFieldType {
                ty: name,
                target_class: Some(target),
                contents: None,
            },
            FieldType::Array(contents) => RawFieldType {
                ty: name,
                target_class: None,
                contents: contents.map(|contents| Box::new(RawFieldType::from(*contents))),
            },
            _ => RawFieldType {
                ty: name,
                target_class: None,
                contents: None,
            },
        }
    }
}

