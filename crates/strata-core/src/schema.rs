mod class_schema;
pub use class_schema::ClassSchema;

mod clp;
pub use clp::{default_class_level_permissions, merge_class_level_permissions, CLP_OPERATIONS};

mod field_type;
pub use field_type::FieldType;

mod index;
pub use index::{IndexChange, IndexKeys, IndexPlan};

mod storage;
pub use storage::{is_user_class, join_table_name, to_public_schema, to_storage_schema};

/// Name of the bootstrap class that records every other class's schema.
pub const SCHEMA_CLASS: &str = "_SCHEMA";

/// Fields every class carries regardless of its declared schema.
pub const DEFAULT_FIELDS: &[&str] = &["objectId", "createdAt", "updatedAt"];

/// Classes the surrounding engine owns. They exist on every deployment and
/// are dropped along with user classes.
pub const SYSTEM_CLASSES: &[&str] = &[
    "_PushStatus",
    "_JobStatus",
    "_JobSchedule",
    "_Hooks",
    "_GlobalConfig",
    "_GraphQLConfig",
    "_Audience",
    "_Idempotency",
];
