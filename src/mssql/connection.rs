use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tiberius::{Query, QueryItem};
use tracing::{debug, trace};

use super::batch::{BatchPlan, render};
use super::client::{MssqlClient, create_mssql_client};
use super::config::MssqlOptions;
use super::query::{bind_all, column_info, to_sql_row};
use crate::command::FluentSqlCommand;
use crate::connection::{CommandRequest, Completion, DbConnection, RowSink, Transaction};
use crate::error::SqlFluentError;
use crate::results::ColumnInfo;

/// A lazily opened SQL Server connection.
pub struct MssqlConnection {
    options: MssqlOptions,
    client: Option<MssqlClient>,
    transaction: Option<Transaction>,
}

impl MssqlConnection {
    #[must_use]
    pub fn new(options: MssqlOptions) -> Self {
        Self {
            options,
            client: None,
            transaction: None,
        }
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` if the connection string cannot be parsed.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, SqlFluentError> {
        Ok(Self::new(MssqlOptions::from_connection_string(connection_string)?))
    }

    #[must_use]
    pub fn options(&self) -> &MssqlOptions {
        &self.options
    }

    fn client_mut(&mut self) -> Result<&mut MssqlClient, SqlFluentError> {
        self.client.as_mut().ok_or_else(|| {
            SqlFluentError::ConnectionError(
                "Connection is not open; call open() first".to_string(),
            )
        })
    }

    async fn run_control(&mut self, sql: &str) -> Result<(), SqlFluentError> {
        let client = self.client_mut()?;
        client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    /// Start a local transaction on this connection.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConnectionError` if the connection is closed,
    /// `SqlFluentError::ExecutionError` if a transaction is already pending,
    /// or the driver's error.
    pub async fn begin_transaction(&mut self) -> Result<Transaction, SqlFluentError> {
        if self.transaction.is_some() {
            return Err(SqlFluentError::ExecutionError(
                "SqlConnection does not support parallel transactions.".to_string(),
            ));
        }
        self.run_control("BEGIN TRANSACTION").await?;
        let transaction = Transaction::new();
        debug!(transaction = transaction.id(), "transaction started");
        self.transaction = Some(transaction.clone());
        Ok(transaction)
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ExecutionError` if `transaction` is not the
    /// pending transaction of this connection, or the driver's error.
    pub async fn commit(&mut self, transaction: Transaction) -> Result<(), SqlFluentError> {
        self.finish_transaction(&transaction, "COMMIT TRANSACTION").await
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ExecutionError` if `transaction` is not the
    /// pending transaction of this connection, or the driver's error.
    pub async fn rollback(&mut self, transaction: Transaction) -> Result<(), SqlFluentError> {
        self.finish_transaction(&transaction, "ROLLBACK TRANSACTION").await
    }

    async fn finish_transaction(
        &mut self,
        transaction: &Transaction,
        sql: &str,
    ) -> Result<(), SqlFluentError> {
        if self.transaction.as_ref() != Some(transaction) {
            return Err(SqlFluentError::ExecutionError(
                "This SqlTransaction has completed; it is no longer usable.".to_string(),
            ));
        }
        self.run_control(sql).await?;
        self.transaction = None;
        debug!(transaction = transaction.id(), %sql, "transaction finished");
        Ok(())
    }

    /// Run `plan.setup` if the command has output parameters.
    async fn prepare(client: &mut MssqlClient, plan: &BatchPlan) -> Result<(), SqlFluentError> {
        if let Some(setup) = &plan.setup {
            client.simple_query(setup.as_str()).await?.into_results().await?;
        }
        Ok(())
    }

    /// Read back the final values of output-capable parameters.
    async fn collect_outputs(
        client: &mut MssqlClient,
        plan: &BatchPlan,
    ) -> Result<Vec<(String, crate::types::SqlValue)>, SqlFluentError> {
        let Some(fetch) = &plan.fetch else {
            return Ok(Vec::new());
        };
        let row = client.simple_query(fetch.as_str()).await?.into_row().await?;
        let Some(row) = row else {
            return Ok(Vec::new());
        };
        let columns = column_info(row.columns());
        let row = to_sql_row(&columns, row)?;
        Ok(plan
            .outputs
            .iter()
            .cloned()
            .zip(row.into_values())
            .collect())
    }
}

impl FluentSqlCommand<MssqlConnection> {
    /// Command owning a new connection built from an ADO.NET connection string.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` if the connection string cannot be parsed.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, SqlFluentError> {
        Ok(Self::new(MssqlConnection::from_connection_string(
            connection_string,
        )?))
    }
}

#[async_trait]
impl DbConnection for MssqlConnection {
    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn open(&mut self) -> Result<(), SqlFluentError> {
        if self.client.is_none() {
            self.client = Some(create_mssql_client(&self.options).await?);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlFluentError> {
        self.transaction = None;
        if let Some(client) = self.client.take() {
            client.close().await?;
            debug!(server = %self.options.describe(), "connection closed");
        }
        Ok(())
    }

    fn current_transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    fn discard(&mut self) {
        self.transaction = None;
        self.client = None;
    }

    async fn execute_non_query(
        &mut self,
        request: &CommandRequest<'_>,
    ) -> Result<Completion, SqlFluentError> {
        let plan = render(request)?;
        let client = self.client_mut()?;
        Self::prepare(client, &plan).await?;

        let mut query = Query::new(plan.sql.as_str());
        bind_all(&mut query, &plan.binds);
        let result = query.execute(&mut *client).await?;
        let rows_affected = result.rows_affected().iter().sum();

        let outputs = Self::collect_outputs(client, &plan).await?;
        Ok(Completion {
            rows_affected,
            outputs,
        })
    }

    async fn execute_reader(
        &mut self,
        request: &CommandRequest<'_>,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<Completion, SqlFluentError> {
        let plan = render(request)?;
        let client = self.client_mut()?;
        Self::prepare(client, &plan).await?;

        let mut query = Query::new(plan.sql.as_str());
        bind_all(&mut query, &plan.binds);
        {
            let mut stream = query.query(&mut *client).await?;
            let mut result_index: Option<usize> = None;
            let mut columns = Arc::new(ColumnInfo::default());
            while let Some(item) = stream.try_next().await? {
                match item {
                    QueryItem::Metadata(meta) => {
                        let index = result_index.map_or(0, |i| i + 1);
                        result_index = Some(index);
                        columns = column_info(meta.columns());
                        trace!(index, columns = columns.len(), "result set metadata");
                        sink.start_result(index, &columns)?;
                    }
                    QueryItem::Row(row) => {
                        let row = to_sql_row(&columns, row)?;
                        sink.row(result_index.unwrap_or(0), &row)?;
                    }
                }
            }
        }

        let outputs = Self::collect_outputs(client, &plan).await?;
        Ok(Completion {
            rows_affected: 0,
            outputs,
        })
    }
}
