use crate::error::{map_error, Native};
use crate::value::{args, prepare};

use strata_core::{Error, Result};
use strata_sql::Statement;
use tokio_postgres::Row;

/// One backend transaction. Dropping it without [`Transaction::commit`]
/// rolls it back.
pub(crate) struct Transaction<'a> {
    tx: tokio_postgres::Transaction<'a>,

    /// Savepoints opened so far, for unique names.
    savepoints: usize,

    /// The first statement failure. Later statements fail with "transaction
    /// aborted", which reports this instead.
    failure: Option<Error>,
}

impl<'a> Transaction<'a> {
    pub(crate) async fn begin(client: &'a mut tokio_postgres::Client) -> Result<Transaction<'a>> {
        let tx = client.transaction().await.map_err(map_error)?;
        Ok(Transaction {
            tx,
            savepoints: 0,
            failure: None,
        })
    }

    pub(crate) async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let (sql, params) = prepare(statement)?;
        tracing::debug!(%sql, ?params, "execute");
        let result = self.tx.execute(sql.as_str(), &args(&params)).await;
        result.map_err(|err| self.fail(err))
    }

    pub(crate) async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let (sql, params) = prepare(statement)?;
        tracing::debug!(%sql, ?params, "query");
        let result = self.tx.query(sql.as_str(), &args(&params)).await;
        result.map_err(|err| self.fail(err))
    }

    /// Runs SQL that binds nothing, such as function definitions.
    pub(crate) async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        let result = self.tx.batch_execute(sql).await;
        result.map_err(|err| self.fail(err))
    }

    /// Runs `statement` under a savepoint. When it fails with one of
    /// `tolerated`, the savepoint is rolled back and the failure returned so
    /// the transaction can go on.
    pub(crate) async fn tolerate(
        &mut self,
        statement: &Statement,
        tolerated: &[Native],
    ) -> Result<Option<Native>> {
        self.savepoints += 1;
        let savepoint = format!("sp_{}", self.savepoints);
        self.batch_execute(&format!("SAVEPOINT {savepoint}")).await?;

        let (sql, params) = prepare(statement)?;
        tracing::debug!(%sql, ?params, "execute");
        match self.tx.execute(sql.as_str(), &args(&params)).await {
            Ok(_) => {
                self.batch_execute(&format!("RELEASE SAVEPOINT {savepoint}"))
                    .await?;
                Ok(None)
            }
            Err(err) => match Native::of(&err) {
                Some(native) if tolerated.contains(&native) => {
                    tracing::debug!(?native, %sql, "ignoring tolerated failure");
                    self.batch_execute(&format!("ROLLBACK TO SAVEPOINT {savepoint}"))
                        .await?;
                    Ok(Some(native))
                }
                _ => Err(self.fail(err)),
            },
        }
    }

    pub(crate) async fn commit(self) -> Result<()> {
        if let Some(failure) = self.failure {
            return Err(failure);
        }
        self.tx.commit().await.map_err(map_error)
    }

    fn fail(&mut self, err: tokio_postgres::Error) -> Error {
        if Native::of(&err) == Some(Native::TransactionAborted) {
            if let Some(failure) = &self.failure {
                return failure.clone();
            }
        }

        let err = map_error(err);
        self.failure.get_or_insert_with(|| err.clone());
        err
    }
}
