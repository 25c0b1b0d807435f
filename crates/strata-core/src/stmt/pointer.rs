//! The `ClassName$objectId` marker both backends store pointers as.

use serde_json::{json, Value};

pub fn encode(class_name: &str, object_id: &str) -> String {
    format!("{class_name}${object_id}")
}

/// Splits a marker at its first `$`.
pub fn decode(marker: &str) -> Option<(&str, &str)> {
    marker
        .split_once('$')
        .filter(|(class_name, object_id)| !class_name.is_empty() && !object_id.is_empty())
}

/// The JSON form of a pointer, `{"__type": "Pointer", ..}`.
pub fn to_json(class_name: &str, object_id: &str) -> Value {
    json!({
        "__type": "Pointer",
        "className": class_name,
        "objectId": object_id,
    })
}

/// Decodes a stored marker back into its JSON form.
pub fn marker_to_json(marker: &str) -> Option<Value> {
    decode(marker).map(|(class_name, object_id)| to_json(class_name, object_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trip() {
        let marker = encode("_User", "abc123");
        assert_eq!(marker, "_User$abc123");
        assert_eq!(decode(&marker), Some(("_User", "abc123")));
    }

    #[test]
    fn malformed_markers() {
        assert_eq!(decode("abc123"), None);
        assert_eq!(decode("$abc123"), None);
        assert_eq!(decode("_User$"), None);
    }
}
