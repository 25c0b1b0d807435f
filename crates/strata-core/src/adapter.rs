mod find;
pub use find::{Direction, FindOptions};

use crate::{
    async_trait,
    schema::{ClassSchema, FieldType, IndexKeys},
    stmt::{Pipeline, Query, Update},
    Object, Result,
};

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Debug;

/// The contract every storage backend implements.
///
/// Schemas passed in are public schemas; adapters convert them with
/// [`to_storage_schema`](crate::schema::to_storage_schema) as needed and
/// return public schemas from the read methods.
#[async_trait]
pub trait StorageAdapter: Debug + Send + Sync + 'static {
    /// Verifies the backend is reachable.
    async fn connect(&self) -> Result<()>;

    /// Releases the connection pool.
    async fn handle_shutdown(&self) -> Result<()>;

    // ===== Schema lifecycle =====

    async fn class_exists(&self, class_name: &str) -> Result<bool>;

    async fn set_class_level_permissions(&self, class_name: &str, clp: &Object) -> Result<()>;

    /// Creates storage for a new class and records its schema. Fails with
    /// `DUPLICATE_VALUE` when the class is already recorded.
    async fn create_class(&self, class_name: &str, schema: &ClassSchema) -> Result<ClassSchema>;

    /// Adds a field, creating the class when it does not exist yet.
    async fn add_field_if_not_exists(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()>;

    /// Rewrites the recorded type of an existing field.
    async fn update_field_options(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()>;

    /// Drops a class. Returns `false` for relation join tables.
    async fn delete_class(&self, class_name: &str) -> Result<bool>;

    /// Drops every class. With `fast`, backends that can empty a class
    /// quicker than dropping it do so instead.
    async fn delete_all_classes(&self, fast: bool) -> Result<()>;

    async fn delete_fields(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()>;

    async fn get_all_classes(&self) -> Result<Vec<ClassSchema>>;

    /// Fails with `OBJECT_NOT_FOUND` for an unknown class.
    async fn get_class(&self, class_name: &str) -> Result<ClassSchema>;

    /// Applies a submitted index map (see [`IndexPlan`](crate::schema::IndexPlan))
    /// and persists the resulting index metadata. `None` is a no-op.
    async fn set_indexes_with_schema_format(
        &self,
        class_name: &str,
        submitted: Option<&Object>,
        existing: &IndexMap<String, IndexKeys>,
        fields: &IndexMap<String, FieldType>,
    ) -> Result<()>;

    // ===== Objects =====

    async fn create_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        object: Object,
    ) -> Result<()>;

    /// Deletes matching objects. Fails with `OBJECT_NOT_FOUND` when nothing matched.
    async fn delete_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
    ) -> Result<u64>;

    async fn find(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Object>>;

    async fn count(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        read_preference: Option<&str>,
        estimate: bool,
    ) -> Result<u64>;

    async fn distinct(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        field_name: &str,
    ) -> Result<Vec<Value>>;

    async fn aggregate(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        pipeline: &Pipeline,
        read_preference: Option<&str>,
        explain: bool,
    ) -> Result<Vec<Object>>;

    /// Returns the number of objects updated.
    async fn update_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<u64>;

    /// Updates the first matching object and returns it as updated.
    async fn find_one_and_update(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<Option<Object>>;

    async fn upsert_one_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<()>;

    // ===== Indexes =====

    /// Creates a unique index over `field_names`. Idempotent.
    async fn ensure_uniqueness(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()>;

    async fn create_index(
        &self,
        class_name: &str,
        keys: &IndexKeys,
        name: Option<&str>,
    ) -> Result<()>;

    async fn create_indexes(&self, class_name: &str, indexes: &[(String, IndexKeys)])
        -> Result<()>;

    async fn get_indexes(&self, class_name: &str) -> Result<IndexMap<String, IndexKeys>>;

    async fn drop_index(&self, class_name: &str, name: &str) -> Result<()>;

    async fn drop_all_indexes(&self, class_name: &str) -> Result<()>;

    /// Installs backend helpers and bootstraps the volatile system classes.
    async fn perform_initialization(&self, volatile_class_schemas: &[ClassSchema]) -> Result<()>;
}
