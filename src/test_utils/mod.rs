//! In-memory connection for exercising commands without a server.

pub mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::params::{SqlParameter, ensure_unique_names};
use crate::connection::{CommandRequest, Completion, DbConnection, RowSink, Transaction};
use crate::error::SqlFluentError;
use crate::results::{ColumnInfo, SqlRow};
use crate::types::{CommandKind, SqlValue};

pub use test_helpers::create_test_row;

/// A command as the connection received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub text: String,
    pub kind: CommandKind,
    pub transaction: Option<Transaction>,
    pub parameters: Vec<SqlParameter>,
}

#[derive(Debug, Clone)]
struct ScriptedResult {
    columns: Arc<ColumnInfo>,
    rows: Vec<Vec<SqlValue>>,
}

/// Connection that replays scripted results and records what it was asked to run.
///
/// The same script answers every execution.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    open: bool,
    opens: usize,
    closes: usize,
    requests: Vec<RecordedRequest>,
    results: Vec<ScriptedResult>,
    rows_affected: u64,
    outputs: Vec<(String, SqlValue)>,
    failure: Option<SqlFluentError>,
    fail_after_rows: Option<usize>,
    delay: Option<Duration>,
    transaction: Option<Transaction>,
}

impl ScriptedConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out already open.
    #[must_use]
    pub fn opened(mut self) -> Self {
        self.open = true;
        self
    }

    /// Append a result set returned by reader executions.
    #[must_use]
    pub fn with_result_set(mut self, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        self.results.push(ScriptedResult {
            columns: Arc::new(ColumnInfo::new(
                columns.iter().map(|name| (*name).to_string()).collect(),
            )),
            rows,
        });
        self
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    /// Final value reported for an output-capable parameter.
    #[must_use]
    pub fn with_output(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.outputs.push((name.to_string(), value.into()));
        self
    }

    /// Fail every execution with `error`, before any row is delivered.
    #[must_use]
    pub fn failing_with(mut self, error: SqlFluentError) -> Self {
        self.failure = Some(error);
        self
    }

    /// With `failing_with`, deliver this many rows before failing.
    #[must_use]
    pub fn fail_after_rows(mut self, rows: usize) -> Self {
        self.fail_after_rows = Some(rows);
        self
    }

    /// Sleep this long inside every execution.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes
    }

    #[must_use]
    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ConnectionError` when closed and
    /// `SqlFluentError::ExecutionError` when a transaction is already pending.
    pub fn begin_transaction(&mut self) -> Result<Transaction, SqlFluentError> {
        if !self.open {
            return Err(SqlFluentError::ConnectionError(
                "Connection is not open; call open() first".to_string(),
            ));
        }
        if self.transaction.is_some() {
            return Err(SqlFluentError::ExecutionError(
                "SqlConnection does not support parallel transactions.".to_string(),
            ));
        }
        let transaction = Transaction::new();
        self.transaction = Some(transaction.clone());
        Ok(transaction)
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ExecutionError` if `transaction` is not pending here.
    pub fn commit(&mut self, transaction: &Transaction) -> Result<(), SqlFluentError> {
        self.end_transaction(transaction)
    }

    /// # Errors
    ///
    /// Returns `SqlFluentError::ExecutionError` if `transaction` is not pending here.
    pub fn rollback(&mut self, transaction: &Transaction) -> Result<(), SqlFluentError> {
        self.end_transaction(transaction)
    }

    fn end_transaction(&mut self, transaction: &Transaction) -> Result<(), SqlFluentError> {
        if self.transaction.as_ref() != Some(transaction) {
            return Err(SqlFluentError::ExecutionError(
                "This SqlTransaction has completed; it is no longer usable.".to_string(),
            ));
        }
        self.transaction = None;
        Ok(())
    }

    async fn accept(&mut self, request: &CommandRequest<'_>) -> Result<(), SqlFluentError> {
        if !self.open {
            return Err(SqlFluentError::ConnectionError(
                "Connection is not open; call open() first".to_string(),
            ));
        }
        self.requests.push(RecordedRequest {
            text: request.text.to_string(),
            kind: request.kind,
            transaction: request.transaction.cloned(),
            parameters: request.parameters.to_vec(),
        });
        ensure_unique_names(request.parameters)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn completion(&self, rows_affected: u64) -> Completion {
        Completion {
            rows_affected,
            outputs: self.outputs.clone(),
        }
    }
}

#[async_trait]
impl DbConnection for ScriptedConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<(), SqlFluentError> {
        self.open = true;
        self.opens += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlFluentError> {
        if self.open {
            self.open = false;
            self.closes += 1;
        }
        self.transaction = None;
        Ok(())
    }

    fn current_transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    fn discard(&mut self) {
        self.open = false;
        self.transaction = None;
    }

    async fn execute_non_query(
        &mut self,
        request: &CommandRequest<'_>,
    ) -> Result<Completion, SqlFluentError> {
        self.accept(request).await?;
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.completion(self.rows_affected))
    }

    async fn execute_reader(
        &mut self,
        request: &CommandRequest<'_>,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<Completion, SqlFluentError> {
        self.accept(request).await?;
        let mut budget = match (&self.failure, self.fail_after_rows) {
            (Some(error), None) => return Err(error.clone()),
            (_, rows) => rows,
        };
        for (index, result) in self.results.iter().enumerate() {
            sink.start_result(index, &result.columns)?;
            for values in &result.rows {
                if let (Some(error), Some(0)) = (&self.failure, budget) {
                    return Err(error.clone());
                }
                budget = budget.map(|n| n.saturating_sub(1));
                sink.row(index, &SqlRow::new(Arc::clone(&result.columns), values.clone()))?;
            }
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.completion(0))
    }
}
