use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::command::params::SqlParameter;
use crate::error::SqlFluentError;
use crate::results::{ColumnInfo, SqlRow};
use crate::types::{CommandKind, SqlValue};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a local transaction started on one connection.
///
/// The handle only identifies the transaction; commit and rollback go
/// through the connection that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    /// Allocate a handle with a process-unique id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a driver needs to run one configured command.
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    pub text: &'a str,
    pub kind: CommandKind,
    pub transaction: Option<&'a Transaction>,
    pub parameters: &'a [SqlParameter],
}

/// What a driver reports once a command has run to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Rows touched by INSERT/UPDATE/DELETE statements
    pub rows_affected: u64,
    /// Final values of output, input-output and return-value parameters, by name
    pub outputs: Vec<(String, SqlValue)>,
}

/// Receives the result sets of a reader-style execution, one row at a time.
pub trait RowSink: Send {
    /// A new result set begins. `index` starts at 0 and grows by one per set.
    ///
    /// # Errors
    ///
    /// An error aborts the execution.
    fn start_result(
        &mut self,
        _index: usize,
        _columns: &Arc<ColumnInfo>,
    ) -> Result<(), SqlFluentError> {
        Ok(())
    }

    /// One row of result set `index`.
    ///
    /// # Errors
    ///
    /// An error aborts the execution.
    fn row(&mut self, index: usize, row: &SqlRow) -> Result<(), SqlFluentError>;

    /// Every result set has been consumed. Called by the command, not the driver.
    ///
    /// # Errors
    ///
    /// An error fails the execution.
    fn finish(&mut self) -> Result<(), SqlFluentError> {
        Ok(())
    }
}

/// A connection to the backing database.
#[async_trait]
pub trait DbConnection: Send {
    fn is_open(&self) -> bool;

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// Returns the driver's connection error.
    async fn open(&mut self) -> Result<(), SqlFluentError>;

    /// Close the connection. Closing a closed connection is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the close handshake fails.
    async fn close(&mut self) -> Result<(), SqlFluentError>;

    /// Transaction currently pending on this connection, if any.
    fn current_transaction(&self) -> Option<&Transaction> {
        None
    }

    /// Forget any in-flight protocol state after an interrupted call.
    fn discard(&mut self) {}

    /// Run a command that produces no rows of interest.
    ///
    /// # Errors
    ///
    /// Returns the driver's execution error.
    async fn execute_non_query(
        &mut self,
        request: &CommandRequest<'_>,
    ) -> Result<Completion, SqlFluentError>;

    /// Run a command and stream every result set into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the driver's execution error, or the first error raised by `sink`.
    async fn execute_reader(
        &mut self,
        request: &CommandRequest<'_>,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<Completion, SqlFluentError>;
}

#[async_trait]
impl<C: DbConnection + ?Sized> DbConnection for &mut C {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn open(&mut self) -> Result<(), SqlFluentError> {
        (**self).open().await
    }

    async fn close(&mut self) -> Result<(), SqlFluentError> {
        (**self).close().await
    }

    fn current_transaction(&self) -> Option<&Transaction> {
        (**self).current_transaction()
    }

    fn discard(&mut self) {
        (**self).discard();
    }

    async fn execute_non_query(
        &mut self,
        request: &CommandRequest<'_>,
    ) -> Result<Completion, SqlFluentError> {
        (**self).execute_non_query(request).await
    }

    async fn execute_reader(
        &mut self,
        request: &CommandRequest<'_>,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<Completion, SqlFluentError> {
        (**self).execute_reader(request, sink).await
    }
}
