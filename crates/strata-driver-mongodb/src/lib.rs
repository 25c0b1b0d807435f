mod error;
use error::{delete_failure, map_error, Native};

mod index;

pub mod read_preference;
use read_preference::selection_criteria;

pub mod schema;
use schema::{indexes_bson, SchemaCollection};

pub mod transform;
use transform::{
    decode_document, encode_object, key, transform_pipeline, transform_update, transform_where,
    value,
};

use bson::{doc, Bson, Document};
use futures::stream::TryStreamExt;
use indexmap::IndexMap;
use mongodb::{
    options::{
        AggregateOptions, ClientOptions, Collation, CollationStrength, CountOptions,
        EstimatedDocumentCountOptions, FindOneAndUpdateOptions, FindOptions as MongoFindOptions,
        ReturnDocument, UpdateOptions,
    },
    Client, Collection, Database,
};
use serde_json::Value;
use std::borrow::Cow;
use strata_core::{
    async_trait,
    schema::{is_user_class, to_public_schema, to_storage_schema, IndexKeys, IndexPlan},
    stmt::{pointer, Constraint, Pipeline, Query, QueryEntry, Update},
    ClassSchema, Error, FieldType, FindOptions, Object, Result, StorageAdapter,
};
use url::Url;

#[derive(Debug)]
pub struct MongoDb {
    client: Client,
    database: Database,
}

impl MongoDb {
    pub fn new(client: Client, database: Database) -> Self {
        Self { client, database }
    }

    /// Connects using a `mongodb` or `mongodb+srv` connection string. The
    /// URL path names the database.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;

        if !matches!(url.scheme(), "mongodb" | "mongodb+srv") {
            return Err(anyhow::anyhow!(
                "connection URL does not have a `mongodb` scheme; url={url}"
            )
            .into());
        }

        let db_name = url.path().trim_start_matches('/');
        if db_name.is_empty() {
            return Err(anyhow::anyhow!(
                "no database specified - missing path in connection URL; url={url}"
            )
            .into());
        }
        let db_name = db_name.to_string();

        let options = ClientOptions::parse(url.as_str()).await.map_err(map_error)?;
        Self::connect_with_config(options, &db_name)
    }

    pub fn connect_with_config(options: ClientOptions, database_name: &str) -> Result<Self> {
        let client = Client::with_options(options).map_err(map_error)?;
        let database = client.database(database_name);
        Ok(Self { client, database })
    }

    fn collection(&self, class_name: &str) -> Collection<Document> {
        self.database.collection(class_name)
    }

    fn schemas(&self) -> SchemaCollection {
        SchemaCollection::new(&self.database)
    }

    async fn create_collection(&self, class_name: &str) -> Result<()> {
        match self.database.create_collection(class_name).await {
            Err(err) if Native::of(&err) == Some(Native::NamespaceExists) => {
                tracing::debug!(%class_name, "collection already exists");
                Ok(())
            }
            result => result.map_err(map_error),
        }
    }

    async fn run_explain(&self, command: Document) -> Result<Vec<Object>> {
        let plan = self
            .database
            .run_command(doc! {"explain": command, "verbosity": "queryPlanner"})
            .await
            .map_err(map_error)?;
        Ok(vec![value::document_to_json(&plan)])
    }

    /// Builds a text index for each searched field that has none, so `$text`
    /// queries can run.
    async fn ensure_text_indexes(&self, schema: &ClassSchema, query: &Query) -> Result<()> {
        for entry in &query.entries {
            let QueryEntry::Field { name, constraints } = entry else {
                continue;
            };
            if !constraints
                .iter()
                .any(|constraint| matches!(constraint, Constraint::TextSearch(_)))
            {
                continue;
            }
            if schema.indexes.values().any(|keys| keys.contains_key(name)) {
                continue;
            }

            let mut keys = IndexKeys::new();
            keys.insert(name.clone(), Value::String("text".to_string()));
            let mut submitted = Object::new();
            submitted.insert(format!("{name}_text"), Value::Object(keys));

            let result = self
                .set_indexes_with_schema_format(
                    &schema.class_name,
                    Some(&submitted),
                    &schema.indexes,
                    &schema.fields,
                )
                .await;
            match result {
                Err(err) if Native::of_error(&err) == Some(Native::IndexOptionsConflict) => {
                    tracing::debug!(field = %name, "text index already exists");
                }
                result => result?,
            }
        }
        Ok(())
    }

    async fn count_matching(&self, class_name: &str, filter: Document) -> Result<u64> {
        self.collection(class_name)
            .count_documents(filter)
            .await
            .map_err(map_error)
    }
}

/// `schema` under the collection name `class_name`.
fn named<'a>(class_name: &str, schema: &'a ClassSchema) -> Cow<'a, ClassSchema> {
    if schema.class_name == class_name {
        Cow::Borrowed(schema)
    } else {
        let mut schema = schema.clone();
        schema.class_name = class_name.to_string();
        Cow::Owned(schema)
    }
}

fn storage(class_name: &str, schema: &ClassSchema) -> ClassSchema {
    to_storage_schema(&named(class_name, schema))
}

/// Compares strings case-insensitively.
fn case_insensitive_collation() -> Collation {
    Collation::builder()
        .locale("en_US")
        .strength(CollationStrength::Secondary)
        .build()
}

fn as_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl StorageAdapter for MongoDb {
    async fn connect(&self) -> Result<()> {
        self.database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn handle_shutdown(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }

    async fn class_exists(&self, class_name: &str) -> Result<bool> {
        let names = self
            .database
            .list_collection_names()
            .filter(doc! {"name": class_name})
            .await
            .map_err(map_error)?;
        Ok(!names.is_empty())
    }

    async fn set_class_level_permissions(&self, class_name: &str, clp: &Object) -> Result<()> {
        let clp = value::interior_document(clp)?;
        self.schemas()
            .set_metadata(class_name, "class_permissions", Bson::Document(clp))
            .await
    }

    async fn create_class(&self, class_name: &str, schema: &ClassSchema) -> Result<ClassSchema> {
        let mut record = named(class_name, schema).into_owned();
        self.create_collection(class_name).await?;

        if !record.indexes.is_empty() {
            let submitted: Object = record
                .indexes
                .iter()
                .map(|(name, keys)| (name.clone(), Value::Object(keys.clone())))
                .collect();
            let plan = IndexPlan::diff(&submitted, &IndexMap::new(), &record.fields)?;
            index::apply_plan(&self.collection(class_name), &to_storage_schema(&record), &plan)
                .await?;
            record.indexes = plan.indexes;
        }

        self.schemas().insert(&record).await?;

        tracing::info!(%class_name, "created class");
        Ok(to_public_schema(&record))
    }

    async fn add_field_if_not_exists(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        self.schemas()
            .add_field_if_not_exists(class_name, field_name, ty)
            .await?;

        if *ty == FieldType::Polygon {
            index::create_tolerating_conflict(
                &self.collection(class_name),
                index::geo_index_model(field_name),
            )
            .await?;
        }
        Ok(())
    }

    async fn update_field_options(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        self.schemas().set_field(class_name, field_name, ty).await
    }

    async fn delete_class(&self, class_name: &str) -> Result<bool> {
        match self.collection(class_name).drop().await {
            Err(err) if Native::of(&err) == Some(Native::NamespaceNotFound) => {
                tracing::debug!(%class_name, "collection does not exist");
            }
            result => result.map_err(map_error)?,
        }
        self.schemas().delete(class_name).await?;

        tracing::info!(%class_name, "deleted class");
        Ok(is_user_class(class_name))
    }

    async fn delete_all_classes(&self, fast: bool) -> Result<()> {
        let names = self
            .database
            .list_collection_names()
            .await
            .map_err(map_error)?;

        let mut collections = 0;
        for name in names.iter().filter(|name| !name.starts_with("system.")) {
            let collection = self.collection(name);
            if fast {
                collection.delete_many(doc! {}).await.map_err(map_error)?;
            } else {
                match collection.drop().await {
                    Err(err) if Native::of(&err) == Some(Native::NamespaceNotFound) => {}
                    result => result.map_err(map_error)?,
                }
            }
            collections += 1;
        }

        tracing::info!(collections, fast, "deleted all classes");
        Ok(())
    }

    async fn delete_fields(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()> {
        if field_names.is_empty() {
            return Ok(());
        }
        let schema = named(class_name, schema);

        let stored: Vec<String> = field_names
            .iter()
            .filter(|name| !schema.field(name).is_some_and(FieldType::is_relation))
            .map(|name| key::storage_key(&schema, name))
            .collect();

        if !stored.is_empty() {
            let mut unset = Document::new();
            let mut present = vec![];
            for key in &stored {
                unset.insert(key.clone(), "");
                let mut exists = Document::new();
                exists.insert(key.clone(), doc! {"$exists": true});
                present.push(Bson::Document(exists));
            }

            self.collection(class_name)
                .update_many(doc! {"$or": present}, doc! {"$unset": unset})
                .await
                .map_err(map_error)?;
        }

        self.schemas().unset_fields(class_name, field_names).await
    }

    async fn get_all_classes(&self) -> Result<Vec<ClassSchema>> {
        self.schemas().fetch_all().await
    }

    async fn get_class(&self, class_name: &str) -> Result<ClassSchema> {
        self.schemas()
            .fetch_one(class_name)
            .await?
            .ok_or_else(|| Error::object_not_found(format!("Class {class_name} does not exist.")))
    }

    async fn set_indexes_with_schema_format(
        &self,
        class_name: &str,
        submitted: Option<&Object>,
        existing: &IndexMap<String, IndexKeys>,
        fields: &IndexMap<String, FieldType>,
    ) -> Result<()> {
        let Some(submitted) = submitted else {
            return Ok(());
        };

        let plan = IndexPlan::diff(submitted, existing, fields)?;
        if plan.is_empty() && plan.indexes == *existing {
            return Ok(());
        }

        let mut schema = ClassSchema::new(class_name);
        schema.fields = fields.clone();
        index::apply_plan(&self.collection(class_name), &schema, &plan).await?;

        self.schemas()
            .set_metadata(class_name, "indexes", indexes_bson(&plan.indexes)?)
            .await
    }

    async fn create_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        object: Object,
    ) -> Result<()> {
        let schema = storage(class_name, schema);
        let document = encode_object(&schema, object)?;
        self.collection(class_name)
            .insert_one(document)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
    ) -> Result<u64> {
        let schema = storage(class_name, schema);
        let filter = transform_where(&schema, query)?;

        let result = self
            .collection(class_name)
            .delete_many(filter)
            .await
            .map_err(|err| delete_failure(map_error(err)))?;

        match result.deleted_count {
            0 => Err(Error::object_not_found("Object not found.")),
            count => Ok(count),
        }
    }

    async fn find(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Object>> {
        let public = named(class_name, schema);
        self.ensure_text_indexes(&public, query).await?;

        let schema = to_storage_schema(&public);
        let filter = transform_where(&schema, query)?;
        let sort = key::sort(&schema, &options.sort);
        let projection = key::projection(&schema, options.keys.as_deref());

        if options.explain {
            let mut command = doc! {"find": class_name, "filter": filter};
            if let Some(sort) = sort {
                command.insert("sort", sort);
            }
            if let Some(projection) = projection {
                command.insert("projection", projection);
            }
            if let Some(skip) = options.skip {
                command.insert("skip", as_i64(skip));
            }
            if let Some(limit) = options.limit {
                command.insert("limit", as_i64(limit));
            }
            return self.run_explain(command).await;
        }

        if options.limit == Some(0) {
            return Ok(vec![]);
        }

        let mut find_options = MongoFindOptions::default();
        find_options.skip = options.skip;
        find_options.limit = options.limit.map(as_i64);
        find_options.sort = sort;
        find_options.projection = projection;
        find_options.selection_criteria =
            selection_criteria(options.read_preference.as_deref())?;
        if options.case_insensitive {
            find_options.collation = Some(case_insensitive_collation());
        }

        tracing::debug!(%class_name, %filter, "find");
        let documents: Vec<Document> = self
            .collection(class_name)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(map_error)?
            .try_collect()
            .await
            .map_err(map_error)?;

        Ok(documents
            .into_iter()
            .map(|document| decode_document(document, &schema))
            .collect())
    }

    async fn count(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        read_preference: Option<&str>,
        estimate: bool,
    ) -> Result<u64> {
        let criteria = selection_criteria(read_preference)?;
        let collection = self.collection(class_name);

        if estimate && query.is_empty() {
            let mut options = EstimatedDocumentCountOptions::default();
            options.selection_criteria = criteria;
            return collection
                .estimated_document_count()
                .with_options(options)
                .await
                .map_err(map_error);
        }

        let schema = storage(class_name, schema);
        let mut options = CountOptions::default();
        options.selection_criteria = criteria;
        collection
            .count_documents(transform_where(&schema, query)?)
            .with_options(options)
            .await
            .map_err(map_error)
    }

    async fn distinct(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        field_name: &str,
    ) -> Result<Vec<Value>> {
        let schema = storage(class_name, schema);
        let filter = transform_where(&schema, query)?;

        let values = self
            .collection(class_name)
            .distinct(key::storage_key(&schema, field_name), filter)
            .await
            .map_err(map_error)?;

        let target = match schema.field(field_name) {
            Some(FieldType::Pointer(target)) => Some(target.as_str()),
            _ => None,
        };

        Ok(values
            .iter()
            .filter(|value| !matches!(value, Bson::Null | Bson::Undefined))
            .map(|value| match (target, value) {
                (Some(target), Bson::String(marker)) => pointer::marker_to_json(marker)
                    .unwrap_or_else(|| pointer::to_json(target, marker)),
                (_, value) => value::to_json(value),
            })
            .collect())
    }

    async fn aggregate(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        pipeline: &Pipeline,
        read_preference: Option<&str>,
        explain: bool,
    ) -> Result<Vec<Object>> {
        let schema = storage(class_name, schema);
        let aggregation = transform_pipeline(&schema, pipeline)?;

        if explain {
            return self
                .run_explain(doc! {
                    "aggregate": class_name,
                    "pipeline": aggregation.stages.clone(),
                    "cursor": {},
                })
                .await;
        }

        let mut options = AggregateOptions::default();
        options.selection_criteria = selection_criteria(read_preference)?;

        let documents: Vec<Document> = self
            .collection(class_name)
            .aggregate(aggregation.stages.clone())
            .with_options(options)
            .await
            .map_err(map_error)?
            .try_collect()
            .await
            .map_err(map_error)?;

        Ok(documents
            .into_iter()
            .map(|document| aggregation.decode(document, &schema))
            .collect())
    }

    async fn update_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<u64> {
        let schema = storage(class_name, schema);
        let filter = transform_where(&schema, query)?;
        let update = transform_update(&schema, update)?;

        if update.is_empty() {
            return self.count_matching(class_name, filter).await;
        }

        let result = self
            .collection(class_name)
            .update_many(filter, update)
            .await
            .map_err(map_error)?;
        Ok(result.matched_count)
    }

    async fn find_one_and_update(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<Option<Object>> {
        let schema = storage(class_name, schema);
        let filter = transform_where(&schema, query)?;
        let update = transform_update(&schema, update)?;
        let collection = self.collection(class_name);

        let document = if update.is_empty() {
            collection.find_one(filter).await.map_err(map_error)?
        } else {
            let mut options = FindOneAndUpdateOptions::default();
            options.return_document = Some(ReturnDocument::After);
            collection
                .find_one_and_update(filter, update)
                .with_options(options)
                .await
                .map_err(map_error)?
        };

        Ok(document.map(|document| decode_document(document, &schema)))
    }

    async fn upsert_one_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<()> {
        let storage_schema = storage(class_name, schema);
        let filter = transform_where(&storage_schema, query)?;
        let mongo_update = transform_update(&storage_schema, update)?;

        if mongo_update.is_empty() {
            if self.count_matching(class_name, filter).await? == 0 {
                self.create_object(class_name, schema, query.equality_values())
                    .await?;
            }
            return Ok(());
        }

        let mut options = UpdateOptions::default();
        options.upsert = Some(true);
        self.collection(class_name)
            .update_one(filter, mongo_update)
            .with_options(options)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn ensure_uniqueness(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()> {
        let schema = storage(class_name, schema);
        let model = index::unique_index_model(&schema, field_names);

        match index::create_tolerating_conflict(&self.collection(class_name), model).await {
            Err(err) if err.is_duplicate_value() => Err(Error::duplicate_value(
                "Tried to ensure field uniqueness for a class that already has duplicates.",
            )),
            result => result,
        }
    }

    async fn create_index(
        &self,
        class_name: &str,
        keys: &IndexKeys,
        name: Option<&str>,
    ) -> Result<()> {
        let model = index::index_model(&ClassSchema::new(class_name), name, keys)?;
        self.collection(class_name)
            .create_index(model)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn create_indexes(
        &self,
        class_name: &str,
        indexes: &[(String, IndexKeys)],
    ) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }

        let schema = ClassSchema::new(class_name);
        let models = indexes
            .iter()
            .map(|(name, keys)| index::index_model(&schema, Some(name), keys))
            .collect::<Result<Vec<_>>>()?;

        self.collection(class_name)
            .create_indexes(models)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn get_indexes(&self, class_name: &str) -> Result<IndexMap<String, IndexKeys>> {
        let models: Vec<_> = match self.collection(class_name).list_indexes().await {
            Ok(cursor) => cursor.try_collect().await.map_err(map_error)?,
            Err(err) if Native::of(&err) == Some(Native::NamespaceNotFound) => vec![],
            Err(err) => return Err(map_error(err)),
        };

        Ok(models
            .iter()
            .filter_map(|model| Some((index::index_name(model)?, index::index_keys(model))))
            .collect())
    }

    async fn drop_index(&self, class_name: &str, name: &str) -> Result<()> {
        self.collection(class_name)
            .drop_index(name)
            .await
            .map_err(map_error)
    }

    async fn drop_all_indexes(&self, class_name: &str) -> Result<()> {
        self.collection(class_name)
            .drop_indexes()
            .await
            .map_err(map_error)
    }

    async fn perform_initialization(&self, volatile_class_schemas: &[ClassSchema]) -> Result<()> {
        for schema in volatile_class_schemas {
            self.create_collection(&schema.class_name).await?;
        }

        tracing::info!(
            volatile_classes = volatile_class_schemas.len(),
            "initialized storage"
        );
        Ok(())
    }
}
