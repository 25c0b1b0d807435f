mod error;
use error::{delete_failure, map_error, map_pool_error, Native};

mod index;

mod schema;

mod transaction;
use transaction::Transaction;

mod value;
use value::{decode_object, row_to_object};

use deadpool_postgres::{Client, Manager, ManagerConfig, Pool, RecyclingMethod};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::borrow::Cow;
use strata_core::{
    async_trait, bail,
    schema::{
        is_user_class, join_table_name, to_public_schema, to_storage_schema, IndexKeys, IndexPlan,
        SCHEMA_CLASS, SYSTEM_CLASSES,
    },
    stmt::{pointer, Pipeline, Query, Update},
    ClassSchema, Error, FieldType, FindOptions, Object, Result, StorageAdapter,
};
use strata_sql::{column_type, compile_aggregate, functions, Statement};
use tokio_postgres::{
    tls::{MakeTlsConnect, TlsConnect},
    Config, Row, Socket,
};
use url::Url;

/// Connections a pool opens when the URL does not say otherwise.
pub const DEFAULT_POOL_MAX_SIZE: usize = 16;

pub struct PostgreSQL {
    /// Pool of PostgreSQL connections.
    pool: Pool,
}

impl PostgreSQL {
    /// Initialize a Strata PostgreSQL driver using a connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connects to a PostgreSQL database using a connection string.
    ///
    /// Accepts the `postgresql` and `postgres` schemes. The `pool_max_size`
    /// query parameter bounds the pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;

        if !matches!(url.scheme(), "postgresql" | "postgres") {
            return Err(anyhow::anyhow!(
                "connection URL does not have a `postgresql` scheme; url={}",
                url
            )
            .into());
        }

        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("missing host in connection URL; url={}", url))?;

        if url.path().is_empty() || url.path() == "/" {
            return Err(anyhow::anyhow!(
                "no database specified - missing path in connection URL; url={}",
                url
            )
            .into());
        }

        let mut config = Config::new();
        config.host(host);
        config.dbname(url.path().trim_start_matches('/'));

        if let Some(port) = url.port() {
            config.port(port);
        }

        if !url.username().is_empty() {
            config.user(url.username());
        }

        if let Some(password) = url.password() {
            config.password(password);
        }

        let mut pool_max_size = DEFAULT_POOL_MAX_SIZE;
        for (key, value) in url.query_pairs() {
            match &*key {
                "pool_max_size" => {
                    pool_max_size = value.parse().map_err(|_| {
                        anyhow::anyhow!("invalid pool_max_size `{value}` in connection URL")
                    })?;
                }
                _ => tracing::debug!(%key, "ignoring connection URL parameter"),
            }
        }

        Self::connect_with_config(config, tokio_postgres::NoTls, pool_max_size).await
    }

    /// Connects to a PostgreSQL database using a [`tokio_postgres::Config`].
    ///
    /// One connection is opened eagerly so a bad configuration fails here
    /// rather than on first use.
    pub async fn connect_with_config<T>(config: Config, tls: T, pool_max_size: usize) -> Result<Self>
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        let manager = Manager::from_config(
            config,
            tls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(pool_max_size)
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build the connection pool: {err}"))?;

        let driver = Self::new(pool);
        let _client = driver.client().await?;
        Ok(driver)
    }

    async fn client(&self) -> Result<Client> {
        self.pool.get().await.map_err(map_pool_error)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let (sql, params) = value::prepare(statement)?;
        tracing::debug!(%sql, ?params, "query");
        let client = self.client().await?;
        client
            .query(sql.as_str(), &value::args(&params))
            .await
            .map_err(map_error)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let (sql, params) = value::prepare(statement)?;
        tracing::debug!(%sql, ?params, "execute");
        let client = self.client().await?;
        client
            .execute(sql.as_str(), &value::args(&params))
            .await
            .map_err(map_error)
    }

    /// Like [`PostgreSQL::query`], but a missing class table reads as no rows.
    async fn query_existing(&self, statement: &Statement) -> Result<Vec<Row>> {
        match self.query(statement).await {
            Err(err) if Native::of_error(&err) == Some(Native::UndefinedTable) => {
                tracing::debug!("class table does not exist");
                Ok(vec![])
            }
            result => result,
        }
    }

    async fn ensure_schema_table(&self) -> Result<()> {
        match self.execute(&Statement::create_schema_table()).await {
            Err(err)
                if Native::of_error(&err).is_some_and(|n| schema::BOOTSTRAP_RACES.contains(&n)) =>
            {
                Ok(())
            }
            Err(err) if err.is_duplicate_value() => Ok(()),
            result => result.map(|_| ()),
        }
    }

    /// Creates a (possibly case-insensitive) index over `field_names`.
    ///
    /// An index of the same name that already exists is kept.
    pub async fn ensure_index(
        &self,
        class_name: &str,
        field_names: &[String],
        index_name: Option<&str>,
        case_insensitive: bool,
    ) -> Result<()> {
        let default_name;
        let name = match index_name {
            Some(name) => name,
            None => {
                let mut sorted = field_names.to_vec();
                sorted.sort();
                default_name = format!("{}_index", sorted.join("_"));
                &default_name
            }
        };

        let statement = Statement::create_index(name, class_name, field_names, case_insensitive);
        self.execute_tolerating_duplicate(&statement).await
    }

    async fn execute_tolerating_duplicate(&self, statement: &Statement) -> Result<()> {
        match self.execute(statement).await {
            Err(err) if Native::of_error(&err) == Some(Native::DuplicateRelation) => {
                tracing::debug!("index already exists");
                Ok(())
            }
            result => result.map(|_| ()),
        }
    }
}

/// `schema` under the table name `class_name`.
fn named<'a>(class_name: &str, schema: &'a ClassSchema) -> Cow<'a, ClassSchema> {
    if schema.class_name == class_name {
        Cow::Borrowed(schema)
    } else {
        let mut schema = schema.clone();
        schema.class_name = class_name.to_string();
        Cow::Owned(schema)
    }
}

/// The first column of the first row.
fn scalar(rows: &[Row]) -> Result<Value> {
    let Some(row) = rows.first() else {
        return Ok(Value::Null);
    };
    Ok(row_to_object(row)?
        .into_iter()
        .next()
        .map(|(_, value)| value)
        .unwrap_or(Value::Null))
}

fn as_count(value: &Value) -> u64 {
    value.as_f64().map(|n| n.max(0.0) as u64).unwrap_or(0)
}

impl core::fmt::Debug for PostgreSQL {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PostgreSQL")
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl From<Pool> for PostgreSQL {
    fn from(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageAdapter for PostgreSQL {
    async fn connect(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    async fn handle_shutdown(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }

    async fn class_exists(&self, class_name: &str) -> Result<bool> {
        let rows = self.query(&Statement::table_exists(class_name)).await?;
        Ok(scalar(&rows)? == Value::Bool(true))
    }

    async fn set_class_level_permissions(&self, class_name: &str, clp: &Object) -> Result<()> {
        self.execute(&Statement::set_class_record_key(
            class_name,
            "classLevelPermissions",
            Value::Object(clp.clone()),
        ))
        .await?;
        Ok(())
    }

    async fn create_class(&self, class_name: &str, schema: &ClassSchema) -> Result<ClassSchema> {
        let schema = named(class_name, schema);

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        let record = schema::create_class(&mut tx, &schema).await?;
        tx.commit().await?;

        Ok(to_public_schema(&record))
    }

    async fn add_field_if_not_exists(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;

        if ty.is_relation() {
            tx.execute(&Statement::create_join_table(&join_table_name(
                field_name, class_name,
            )))
            .await?;
        } else {
            let Some(column_type) = column_type(ty) else {
                bail!("field type {ty} cannot be stored in a column");
            };

            let added = tx
                .tolerate(
                    &Statement::add_column(class_name, field_name, column_type),
                    &[Native::UndefinedTable, Native::DuplicateColumn],
                )
                .await?;

            if added == Some(Native::UndefinedTable) {
                let schema = ClassSchema::new(class_name).with_field(field_name, ty.clone());
                schema::create_class(&mut tx, &schema).await?;
                return tx.commit().await;
            }
        }

        let recorded = tx
            .query(&Statement::select_class_record_field(class_name, field_name))
            .await?;
        if !recorded.is_empty() {
            bail!("Attempted to add a field that already exists");
        }

        tx.execute(&Statement::set_class_record_field(
            class_name, field_name, ty,
        )?)
        .await?;
        tx.commit().await
    }

    async fn update_field_options(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        self.execute(&Statement::set_class_record_field(
            class_name, field_name, ty,
        )?)
        .await?;
        Ok(())
    }

    async fn delete_class(&self, class_name: &str) -> Result<bool> {
        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        tx.execute(&Statement::drop_table(class_name)).await?;
        tx.execute(&Statement::delete_class_record(class_name))
            .await?;
        tx.commit().await?;

        tracing::info!(%class_name, "deleted class");
        Ok(is_user_class(class_name))
    }

    async fn delete_all_classes(&self, fast: bool) -> Result<()> {
        let rows = self
            .query_existing(&Statement::select_class_records())
            .await?;
        let schemas = rows
            .iter()
            .map(schema::load_record)
            .collect::<Result<Vec<_>>>()?;

        let mut tables: IndexSet<String> = IndexSet::new();
        tables.insert(SCHEMA_CLASS.to_string());
        tables.extend(SYSTEM_CLASSES.iter().map(ToString::to_string));
        for schema in &schemas {
            tables.insert(schema.class_name.clone());
            tables.extend(
                schema
                    .relation_fields()
                    .map(|(field, _)| join_table_name(field, &schema.class_name)),
            );
        }

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        for table in &tables {
            if fast {
                tx.tolerate(&Statement::truncate_table(table), &[Native::UndefinedTable])
                    .await?;
            } else {
                tx.execute(&Statement::drop_table(table)).await?;
            }
        }
        tx.commit().await?;

        tracing::info!(tables = tables.len(), fast, "deleted all classes");
        Ok(())
    }

    async fn delete_fields(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()> {
        let mut schema = named(class_name, schema).into_owned();

        let columns: Vec<String> = field_names
            .iter()
            .filter(|name| !schema.field(name).is_some_and(FieldType::is_relation))
            .cloned()
            .collect();
        for name in field_names {
            schema.fields.shift_remove(name);
        }

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        tx.execute(&Statement::replace_class_record(&schema)?)
            .await?;
        if let Some(statement) = Statement::drop_columns(class_name, &columns) {
            tx.execute(&statement).await?;
        }
        tx.commit().await
    }

    async fn get_all_classes(&self) -> Result<Vec<ClassSchema>> {
        self.ensure_schema_table().await?;
        let rows = self.query(&Statement::select_class_records()).await?;
        rows.iter().map(schema::load_record).collect()
    }

    async fn get_class(&self, class_name: &str) -> Result<ClassSchema> {
        let rows = self
            .query_existing(&Statement::select_class_record(class_name))
            .await?;
        match rows.first() {
            Some(row) => schema::load_record(row),
            None => Err(Error::object_not_found(format!(
                "Class {class_name} does not exist."
            ))),
        }
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

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        index::apply_plan(&mut tx, class_name, &plan).await?;
        tx.commit().await
    }

    async fn create_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        object: Object,
    ) -> Result<()> {
        let schema = named(class_name, schema);
        self.execute(&Statement::insert(&schema, object)?).await?;
        Ok(())
    }

    async fn delete_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
    ) -> Result<u64> {
        let schema = named(class_name, schema);
        let statement = Statement::delete(&schema, query)?;

        let rows = match self.query(&statement).await {
            Err(err) if Native::of_error(&err) == Some(Native::UndefinedTable) => return Ok(0),
            Err(err) => return Err(delete_failure(err)),
            Ok(rows) => rows,
        };

        match as_count(&scalar(&rows)?) {
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
        let schema = named(class_name, schema);
        let rows = self
            .query_existing(&Statement::select(&schema, query, options)?)
            .await?;

        if options.explain {
            return rows.iter().map(row_to_object).collect();
        }

        let storage = to_storage_schema(&schema);
        rows.iter()
            .map(|row| Ok(decode_object(row_to_object(row)?, &storage)))
            .collect()
    }

    async fn count(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        _read_preference: Option<&str>,
        estimate: bool,
    ) -> Result<u64> {
        let schema = named(class_name, schema);
        let statement = if estimate && query.is_empty() {
            Statement::estimated_count(class_name)
        } else {
            Statement::count(&schema, query)?
        };

        let rows = self.query_existing(&statement).await?;
        Ok(as_count(&scalar(&rows)?))
    }

    async fn distinct(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        field_name: &str,
    ) -> Result<Vec<Value>> {
        let schema = named(class_name, schema);
        let rows = self
            .query_existing(&Statement::distinct(&schema, query, field_name)?)
            .await?;

        let target = match schema.field(field_name) {
            Some(FieldType::Pointer(target)) => Some(target.as_str()),
            _ => None,
        };

        let mut values = vec![];
        for row in &rows {
            let value = row_to_object(row)?
                .remove("value")
                .unwrap_or(Value::Null);
            match (target, value) {
                (_, Value::Null) => {}
                (Some(target), Value::String(marker)) => values.push(
                    pointer::marker_to_json(&marker)
                        .unwrap_or_else(|| pointer::to_json(target, &marker)),
                ),
                (_, value) => values.push(value),
            }
        }
        Ok(values)
    }

    async fn aggregate(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        pipeline: &Pipeline,
        _read_preference: Option<&str>,
        explain: bool,
    ) -> Result<Vec<Object>> {
        let schema = named(class_name, schema);
        let aggregate = compile_aggregate(class_name, &schema, pipeline)?;

        if explain {
            let rows = self.query(&aggregate.statement.clone().explain()).await?;
            return rows.iter().map(row_to_object).collect();
        }

        let rows = self.query(&aggregate.statement).await?;
        rows.iter()
            .map(|row| Ok(decode_object(aggregate.reshape(row_to_object(row)?), &schema)))
            .collect()
    }

    async fn update_objects_by_query(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<u64> {
        let schema = named(class_name, schema);
        match Statement::update(&schema, query, update)? {
            Some(statement) => self.execute(&statement).await,
            None => {
                let rows = self.query(&Statement::count(&schema, query)?).await?;
                Ok(as_count(&scalar(&rows)?))
            }
        }
    }

    async fn find_one_and_update(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<Option<Object>> {
        let schema = named(class_name, schema);
        let statement = match Statement::find_one_and_update(&schema, query, update)? {
            Some(statement) => statement,
            None => Statement::select(&schema, query, &FindOptions::default().limit(1))?,
        };

        let rows = self.query(&statement).await?;
        let storage = to_storage_schema(&schema);
        rows.first()
            .map(|row| Ok(decode_object(row_to_object(row)?, &storage)))
            .transpose()
    }

    async fn upsert_one_object(
        &self,
        class_name: &str,
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<()> {
        let mut object = query.equality_values();
        object.extend(update.insert_values());

        match self.create_object(class_name, schema, object).await {
            Err(err) if err.is_duplicate_value() => self
                .find_one_and_update(class_name, schema, query, update)
                .await
                .map(|_| ()),
            result => result,
        }
    }

    async fn ensure_uniqueness(
        &self,
        class_name: &str,
        _schema: &ClassSchema,
        field_names: &[String],
    ) -> Result<()> {
        self.execute_tolerating_duplicate(&Statement::create_unique_index(class_name, field_names))
            .await
    }

    async fn create_index(
        &self,
        class_name: &str,
        keys: &IndexKeys,
        name: Option<&str>,
    ) -> Result<()> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| index::default_index_name(keys));
        self.execute_tolerating_duplicate(&index::create_index_statement(class_name, &name, keys))
            .await
    }

    async fn create_indexes(
        &self,
        class_name: &str,
        indexes: &[(String, IndexKeys)],
    ) -> Result<()> {
        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        for (name, keys) in indexes {
            tx.execute(&index::create_index_statement(class_name, name, keys))
                .await?;
        }
        tx.commit().await
    }

    async fn get_indexes(&self, class_name: &str) -> Result<IndexMap<String, IndexKeys>> {
        let rows = self.query(&Statement::table_indexes(class_name)).await?;

        let mut indexes = IndexMap::new();
        for row in &rows {
            let row = row_to_object(row)?;
            if let (Some(Value::String(name)), Some(Value::String(definition))) =
                (row.get("indexname"), row.get("indexdef"))
            {
                indexes.insert(name.clone(), index::parse_index_definition(definition));
            }
        }
        Ok(indexes)
    }

    async fn drop_index(&self, _class_name: &str, name: &str) -> Result<()> {
        self.execute(&Statement::drop_index(name)).await?;
        Ok(())
    }

    async fn drop_all_indexes(&self, class_name: &str) -> Result<()> {
        let primary_key = format!("{class_name}_pkey");
        let indexes = self.get_indexes(class_name).await?;

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        for name in indexes.keys().filter(|name| **name != primary_key) {
            tx.execute(&Statement::drop_index(name)).await?;
        }
        tx.commit().await
    }

    async fn perform_initialization(&self, volatile_class_schemas: &[ClassSchema]) -> Result<()> {
        self.ensure_schema_table().await?;

        for schema in volatile_class_schemas {
            let mut client = self.client().await?;
            let mut tx = Transaction::begin(&mut client).await?;
            schema::create_table(&mut tx, schema).await?;

            let columns: Vec<String> = tx
                .query(&Statement::table_columns(&schema.class_name))
                .await?
                .iter()
                .map(|row| row.try_get::<_, String>(0).map_err(map_error))
                .collect::<Result<_>>()?;

            for (name, ty) in &to_storage_schema(schema).fields {
                if columns.contains(name) {
                    continue;
                }
                if ty.is_relation() {
                    tx.execute(&Statement::create_join_table(&join_table_name(
                        name,
                        &schema.class_name,
                    )))
                    .await?;
                } else if let Some(column_type) = column_type(ty) {
                    tx.execute(&Statement::add_column(&schema.class_name, name, column_type))
                        .await?;
                }
            }
            tx.commit().await?;
        }

        let mut client = self.client().await?;
        let mut tx = Transaction::begin(&mut client).await?;
        for function in functions::ALL {
            tx.batch_execute(function).await?;
        }
        tx.commit().await?;

        tracing::info!(
            volatile_classes = volatile_class_schemas.len(),
            "initialized storage"
        );
        Ok(())
    }
}
