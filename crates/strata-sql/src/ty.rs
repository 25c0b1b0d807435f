use strata_core::FieldType;

/// The column type a field is stored as. Relations live in join tables and
/// have no column.
pub fn column_type(ty: &FieldType) -> Option<&'static str> {
    Some(match ty {
        FieldType::String => "text",
        FieldType::Date => "timestamp with time zone",
        FieldType::Object => "jsonb",
        FieldType::File => "text",
        FieldType::Boolean => "boolean",
        FieldType::Pointer(_) => "text",
        FieldType::Number => "double precision",
        FieldType::GeoPoint => "point",
        FieldType::Bytes => "jsonb",
        FieldType::Polygon => "polygon",
        FieldType::Array(_) if ty.is_string_array() => "text[]",
        FieldType::Array(_) => "jsonb",
        FieldType::Relation(_) | FieldType::Acl => return None,
    })
}
