use async_trait::async_trait;
use log::{debug, error, info};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Transaction};

use super::config::MigratorConfig;
use super::sql;
use super::{Database, SchemaTransaction};
use crate::core::{
    CheckConstraint, ColumnInfo, ConstraintInfo, DataType, Result, SchemaError, TableRef, Value,
    ValueCount,
};

/// [`Database`] backed by a single tokio-postgres connection.
pub struct PgDatabase {
    client: Client,
}

impl PgDatabase {
    /// Connects using `config.database_url`, bounded by `config.connect_timeout`.
    pub async fn connect(config: &MigratorConfig) -> Result<Self> {
        let pg_config: tokio_postgres::Config = config
            .database_url
            .parse()
            .map_err(|e| SchemaError::Config(format!("invalid DATABASE_URL: {}", e)))?;

        let (client, connection) =
            tokio::time::timeout(config.connect_timeout, pg_config.connect(NoTls))
                .await
                .map_err(|_| {
                    SchemaError::Connectivity(format!(
                        "connecting to {} timed out after {:?}",
                        config.to_redacted_url(),
                        config.connect_timeout
                    ))
                })?
                .map_err(classify)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        info!("Connected to {}", config.to_redacted_url());
        Ok(Self { client })
    }

    async fn table_oid(&self, table: &TableRef) -> Result<u32> {
        let row = self
            .client
            .query_opt(sql::TABLE_LOOKUP, &[&table.schema, &table.name])
            .await
            .map_err(classify)?
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        Ok(row.get(0))
    }

    async fn columns(&self, table: &TableRef, column: Option<&str>) -> Result<Vec<ColumnInfo>> {
        let oid = self.table_oid(table).await?;
        let rows = self
            .client
            .query(sql::COLUMN_LOOKUP, &[&oid, &column])
            .await
            .map_err(classify)?;

        Ok(rows
            .iter()
            .map(|row| {
                let type_name: String = row.get(1);
                ColumnInfo {
                    name: row.get(0),
                    data_type: DataType::parse(&type_name),
                    nullable: !row.get::<_, bool>(2),
                    default: row.get(3),
                }
            })
            .collect())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        self.columns(table, None).await
    }

    async fn column_info(&self, table: &TableRef, column: &str) -> Result<Option<ColumnInfo>> {
        Ok(self.columns(table, Some(column)).await?.into_iter().next())
    }

    async fn check_constraints(
        &self,
        table: &TableRef,
        column: &str,
    ) -> Result<Vec<ConstraintInfo>> {
        let oid = self.table_oid(table).await?;
        let rows = self
            .client
            .query(sql::CONSTRAINT_LOOKUP, &[&oid, &column])
            .await
            .map_err(classify)?;

        Ok(rows
            .iter()
            .map(|row| ConstraintInfo {
                name: row.get(0),
                definition: row.get(1),
            })
            .collect())
    }

    async fn value_counts(&self, table: &TableRef, column: &str) -> Result<Vec<ValueCount>> {
        let query = sql::value_counts(table, column);
        debug!("{}", query);
        let rows = self.client.query(query.as_str(), &[]).await.map_err(classify)?;

        Ok(rows
            .iter()
            .map(|row| {
                let value: Option<String> = row.get(0);
                let count: i64 = row.get(1);
                ValueCount::new(value.map_or(Value::Null, Value::Text), count.max(0) as u64)
            })
            .collect())
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        let query = sql::row_count(table);
        debug!("{}", query);
        let row = self.client.query_one(query.as_str(), &[]).await.map_err(classify)?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn begin(&mut self) -> Result<Box<dyn SchemaTransaction + '_>> {
        let txn = self.client.transaction().await.map_err(classify)?;
        debug!("BEGIN");
        Ok(Box::new(PgTransaction { txn }))
    }
}

/// Open transaction; tokio-postgres rolls it back if dropped uncommitted.
struct PgTransaction<'a> {
    txn: Transaction<'a>,
}

impl PgTransaction<'_> {
    async fn ddl(&self, statement: String) -> Result<()> {
        debug!("{}", statement);
        self.txn
            .execute(statement.as_str(), &[])
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

#[async_trait]
impl<'a> SchemaTransaction for PgTransaction<'a> {
    async fn add_column(
        &mut self,
        table: &TableRef,
        column: &str,
        data_type: &DataType,
    ) -> Result<()> {
        self.ddl(sql::add_column(table, column, data_type)).await
    }

    async fn normalize_empty(
        &mut self,
        table: &TableRef,
        column: &str,
        value: &Value,
    ) -> Result<u64> {
        let statement = sql::normalize_empty(table, column, value);
        debug!("{}", statement);
        self.txn.execute(statement.as_str(), &[]).await.map_err(classify)
    }

    async fn set_column_default(
        &mut self,
        table: &TableRef,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        self.ddl(sql::set_default(table, column, value)).await
    }

    async fn set_not_null(&mut self, table: &TableRef, column: &str) -> Result<()> {
        self.ddl(sql::set_not_null(table, column)).await
    }

    async fn add_check_constraint(
        &mut self,
        table: &TableRef,
        check: &CheckConstraint,
    ) -> Result<()> {
        self.ddl(sql::add_check(table, check)).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        debug!("COMMIT");
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("ROLLBACK");
        self.txn.rollback().await.map_err(classify)
    }
}

/// Maps a driver error onto the migration error taxonomy.
pub(crate) fn classify(err: tokio_postgres::Error) -> SchemaError {
    if let Some(db) = err.as_db_error() {
        let message = format!("{} (SQLSTATE {})", db.message(), db.code().code());
        return classify_sqlstate(db.code(), message);
    }

    let is_io = std::error::Error::source(&err)
        .map(|source| source.is::<std::io::Error>())
        .unwrap_or(false);
    if err.is_closed() || is_io {
        SchemaError::Connectivity(err.to_string())
    } else {
        SchemaError::Execution(err.to_string())
    }
}

pub(crate) fn classify_sqlstate(code: &SqlState, message: String) -> SchemaError {
    let raw = code.code();

    if *code == SqlState::INSUFFICIENT_PRIVILEGE || raw.starts_with("28") {
        SchemaError::Permission(message)
    } else if *code == SqlState::DUPLICATE_COLUMN || *code == SqlState::DUPLICATE_OBJECT {
        SchemaError::SchemaConflict(message)
    } else if *code == SqlState::CHECK_VIOLATION || *code == SqlState::NOT_NULL_VIOLATION {
        SchemaError::ConstraintViolation(message)
    } else if *code == SqlState::UNDEFINED_TABLE {
        SchemaError::TableNotFound(message)
    } else if raw.starts_with("08")
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::QUERY_CANCELED
    {
        SchemaError::Connectivity(message)
    } else {
        SchemaError::Execution(message)
    }
}
