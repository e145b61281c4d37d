use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{debug, trace, warn};

use super::{ExecStatus, FluentSqlCommand};
use crate::connection::{CommandRequest, Completion, DbConnection, RowSink};
use crate::conversion::{FromSqlValue, from_sql_or_default};
use crate::error::SqlFluentError;
use crate::results::data_set::table_name_for;
use crate::results::{ColumnInfo, DataSet, SqlRow};
use crate::types::SqlValue;
use crate::xml::first_outer_xml;

/// How the command is run against the connection.
enum Mode<'s> {
    NonQuery,
    Reader(&'s mut (dyn RowSink + Send)),
}

impl Mode<'_> {
    fn label(&self) -> &'static str {
        match self {
            Mode::NonQuery => "non-query",
            Mode::Reader(_) => "reader",
        }
    }
}

/// Runtime behind every `_blocking` call. Connections opened by one blocking
/// call register their sockets with it, so it must outlive any single call.
static SHARED_RUNTIME: LazyLock<Result<Runtime, Arc<std::io::Error>>> =
    LazyLock::new(|| Runtime::new().map_err(Arc::new));

/// Drive an execution future to completion on the shared runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output, SqlFluentError> {
    match &*SHARED_RUNTIME {
        Ok(runtime) => Ok(runtime.block_on(future)),
        Err(err) => Err(SqlFluentError::Io(Arc::clone(err))),
    }
}

impl<C: DbConnection> FluentSqlCommand<C> {
    /// Run the command once in `mode`. `Ok(None)` means the failure was
    /// swallowed by the failure handler.
    async fn run(&mut self, mut mode: Mode<'_>) -> Result<Option<Completion>, SqlFluentError> {
        if self.status != ExecStatus::NotExecuted {
            return Err(SqlFluentError::ConfigError(
                "command has already been executed; build a new one".to_string(),
            ));
        }

        let started = Instant::now();
        debug!(
            mode = mode.label(),
            kind = ?self.kind,
            text = %self.text,
            parameters = self.parameters.len(),
            "executing command"
        );

        let outcome = self.execute_bounded(&mut mode).await;
        let result = match outcome {
            Ok(completion) => {
                self.parameters.apply_outputs(completion.outputs.clone());
                self.status = ExecStatus::Success;
                Ok(Some(completion))
            }
            Err(err) => self.fail(err),
        };
        self.release().await;

        debug!(
            status = ?self.status,
            elapsed_ms = started.elapsed().as_millis(),
            "command finished"
        );
        result
    }

    /// Open if needed and run, bounded by the command timeout.
    async fn execute_bounded(&mut self, mode: &mut Mode<'_>) -> Result<Completion, SqlFluentError> {
        if !self.connection.is_open() {
            debug!("opening connection");
            self.connection.open().await?;
        }
        self.check_transaction()?;

        let seconds = self.timeout_seconds;
        let request = CommandRequest {
            text: &self.text,
            kind: self.kind,
            transaction: self.transaction.as_ref(),
            parameters: self.parameters.as_slice(),
        };
        let connection = &mut self.connection;
        let execution = async {
            match mode {
                Mode::NonQuery => connection.execute_non_query(&request).await,
                Mode::Reader(sink) => {
                    let completion = connection.execute_reader(&request, &mut **sink).await?;
                    sink.finish()?;
                    Ok::<_, SqlFluentError>(completion)
                }
            }
        };

        if seconds == 0 {
            return execution.await;
        }
        match tokio::time::timeout(Duration::from_secs(u64::from(seconds)), execution).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // A borrowed connection stays open; the driver drains the
                // abandoned response before its next request.
                if self.close_after {
                    self.connection.discard();
                }
                warn!(seconds, "command timed out");
                Err(SqlFluentError::Timeout(seconds))
            }
        }
    }

    fn check_transaction(&self) -> Result<(), SqlFluentError> {
        match (self.transaction.as_ref(), self.connection.current_transaction()) {
            (Some(requested), Some(pending)) if requested == pending => Ok(()),
            (Some(_), _) => Err(SqlFluentError::ExecutionError(
                "The transaction is either not associated with the current connection or has been completed."
                    .to_string(),
            )),
            (None, Some(_)) => Err(SqlFluentError::ExecutionError(
                "Execution requires the command to have a transaction when the connection assigned to the command is in a pending local transaction."
                    .to_string(),
            )),
            (None, None) => Ok(()),
        }
    }

    fn fail(&mut self, err: SqlFluentError) -> Result<Option<Completion>, SqlFluentError> {
        self.status = ExecStatus::Failed;
        self.error = Some(err.clone());

        let handled = match self.on_failure.take() {
            Some(handler) => handler(&*self),
            None => false,
        };
        if handled {
            warn!(error = %err, "command failure suppressed by handler");
            Ok(None)
        } else {
            Err(err)
        }
    }

    async fn release(&mut self) {
        if self.close_after && self.connection.is_open() {
            debug!("closing connection");
            if let Err(err) = self.connection.close().await {
                warn!(error = %err, "failed to close connection after command");
            }
        }
    }

    /// Execute and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the execution error unless the failure handler swallowed it
    /// (then 0 is returned).
    pub async fn exec_non_query(&mut self) -> Result<u64, SqlFluentError> {
        let completion = self.run(Mode::NonQuery).await?;
        Ok(completion.map_or(0, |c| c.rows_affected))
    }

    /// Execute and convert the first column of the first row.
    /// NULL, or no row at all, yields `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns the execution error unless the failure handler swallowed it,
    /// or a conversion error when the value does not fit `T`.
    pub async fn exec_scalar<T: FromSqlValue + Default>(&mut self) -> Result<T, SqlFluentError> {
        let mut sink = ScalarSink::default();
        self.run(Mode::Reader(&mut sink)).await?;
        from_sql_or_default(&sink.value.unwrap_or(SqlValue::Null))
    }

    /// Call `action` for every row of every result set, with the index of
    /// the result set the row belongs to.
    ///
    /// # Errors
    ///
    /// Returns the execution error (including one raised by `action`)
    /// unless the failure handler swallowed it.
    pub async fn exec_reader<F>(&mut self, action: F) -> Result<(), SqlFluentError>
    where
        F: FnMut(&SqlRow, usize) -> Result<(), SqlFluentError> + Send,
    {
        let mut sink = CallbackSink(action);
        self.run(Mode::Reader(&mut sink)).await?;
        Ok(())
    }

    /// [`exec_reader`](Self::exec_reader) without the result-set index.
    ///
    /// # Errors
    ///
    /// Same as [`exec_reader`](Self::exec_reader).
    pub async fn exec_reader_rows<F>(&mut self, mut action: F) -> Result<(), SqlFluentError>
    where
        F: FnMut(&SqlRow) -> Result<(), SqlFluentError> + Send,
    {
        self.exec_reader(move |row, _| action(row)).await
    }

    /// Map every row of every result set, in the order they arrive.
    /// A swallowed failure returns the items mapped before it.
    ///
    /// # Errors
    ///
    /// Returns the execution error (including one raised by `mapper`)
    /// unless the failure handler swallowed it.
    pub async fn exec_read_item_list<T, F>(&mut self, mapper: F) -> Result<Vec<T>, SqlFluentError>
    where
        T: Send,
        F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
    {
        let mut sink = ListSink {
            mapper,
            items: Vec::new(),
        };
        self.run(Mode::Reader(&mut sink)).await?;
        Ok(sink.items)
    }

    /// Map every row and keep only the value of the last one; `None` when
    /// no row was returned.
    ///
    /// # Errors
    ///
    /// Returns the execution error (including one raised by `mapper`)
    /// unless the failure handler swallowed it.
    pub async fn exec_read_item<T, F>(&mut self, mapper: F) -> Result<Option<T>, SqlFluentError>
    where
        T: Send,
        F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
    {
        let mut sink = LastSink { mapper, last: None };
        self.run(Mode::Reader(&mut sink)).await?;
        Ok(sink.last)
    }

    /// Execute a `FOR XML` style command and return the outer XML of its
    /// first node, `None` when nothing came back.
    ///
    /// # Errors
    ///
    /// Returns the execution error unless the failure handler swallowed it.
    pub async fn exec_read_xml(&mut self) -> Result<Option<String>, SqlFluentError> {
        let mut sink = XmlSink::default();
        self.run(Mode::Reader(&mut sink)).await?;
        Ok(sink.outer_xml)
    }

    /// Fill a new [`DataSet`] with every result set.
    ///
    /// # Errors
    ///
    /// Returns the execution error unless the failure handler swallowed it.
    pub async fn exec_fill_data_set(&mut self) -> Result<DataSet, SqlFluentError> {
        self.exec_fill_data_set_into(DataSet::new()).await
    }

    /// Fill `data_set`, appending to tables that already exist.
    ///
    /// # Errors
    ///
    /// Returns the execution error unless the failure handler swallowed it.
    pub async fn exec_fill_data_set_into(
        &mut self,
        mut data_set: DataSet,
    ) -> Result<DataSet, SqlFluentError> {
        let mut sink = FillSink {
            data_set: &mut data_set,
            table: String::new(),
            mapping: Vec::new(),
        };
        self.run(Mode::Reader(&mut sink)).await?;
        Ok(data_set)
    }

    /// Blocking [`exec_non_query`](Self::exec_non_query).
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Same as the async form, plus `SqlFluentError::Io` if the runtime
    /// cannot be started.
    pub fn exec_non_query_blocking(&mut self) -> Result<u64, SqlFluentError> {
        block_on(self.exec_non_query())?
    }

    /// Blocking [`exec_scalar`](Self::exec_scalar).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_scalar_blocking<T: FromSqlValue + Default>(&mut self) -> Result<T, SqlFluentError> {
        block_on(self.exec_scalar())?
    }

    /// Blocking [`exec_reader`](Self::exec_reader).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_reader_blocking<F>(&mut self, action: F) -> Result<(), SqlFluentError>
    where
        F: FnMut(&SqlRow, usize) -> Result<(), SqlFluentError> + Send,
    {
        block_on(self.exec_reader(action))?
    }

    /// Blocking [`exec_reader_rows`](Self::exec_reader_rows).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_reader_rows_blocking<F>(&mut self, action: F) -> Result<(), SqlFluentError>
    where
        F: FnMut(&SqlRow) -> Result<(), SqlFluentError> + Send,
    {
        block_on(self.exec_reader_rows(action))?
    }

    /// Blocking [`exec_read_item_list`](Self::exec_read_item_list).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_read_item_list_blocking<T, F>(&mut self, mapper: F) -> Result<Vec<T>, SqlFluentError>
    where
        T: Send,
        F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
    {
        block_on(self.exec_read_item_list(mapper))?
    }

    /// Blocking [`exec_read_item`](Self::exec_read_item).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_read_item_blocking<T, F>(&mut self, mapper: F) -> Result<Option<T>, SqlFluentError>
    where
        T: Send,
        F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
    {
        block_on(self.exec_read_item(mapper))?
    }

    /// Blocking [`exec_read_xml`](Self::exec_read_xml).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_read_xml_blocking(&mut self) -> Result<Option<String>, SqlFluentError> {
        block_on(self.exec_read_xml())?
    }

    /// Blocking [`exec_fill_data_set`](Self::exec_fill_data_set).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_fill_data_set_blocking(&mut self) -> Result<DataSet, SqlFluentError> {
        block_on(self.exec_fill_data_set())?
    }

    /// Blocking [`exec_fill_data_set_into`](Self::exec_fill_data_set_into).
    ///
    /// # Errors
    ///
    /// Same as the async form.
    pub fn exec_fill_data_set_into_blocking(
        &mut self,
        data_set: DataSet,
    ) -> Result<DataSet, SqlFluentError> {
        block_on(self.exec_fill_data_set_into(data_set))?
    }
}

#[derive(Default)]
struct ScalarSink {
    value: Option<SqlValue>,
}

impl RowSink for ScalarSink {
    fn row(&mut self, index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        if index == 0 && self.value.is_none() {
            self.value = Some(row.get_by_index(0).cloned().unwrap_or(SqlValue::Null));
        }
        Ok(())
    }
}

struct CallbackSink<F>(F);

impl<F> RowSink for CallbackSink<F>
where
    F: FnMut(&SqlRow, usize) -> Result<(), SqlFluentError> + Send,
{
    fn start_result(&mut self, index: usize, columns: &Arc<ColumnInfo>) -> Result<(), SqlFluentError> {
        trace!(index, columns = columns.len(), "result set");
        Ok(())
    }

    fn row(&mut self, index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        (self.0)(row, index)
    }
}

struct ListSink<T, F> {
    mapper: F,
    items: Vec<T>,
}

impl<T, F> RowSink for ListSink<T, F>
where
    T: Send,
    F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
{
    fn row(&mut self, _index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        self.items.push((self.mapper)(row)?);
        Ok(())
    }
}

struct LastSink<T, F> {
    mapper: F,
    last: Option<T>,
}

impl<T, F> RowSink for LastSink<T, F>
where
    T: Send,
    F: FnMut(&SqlRow) -> Result<T, SqlFluentError> + Send,
{
    fn row(&mut self, _index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        self.last = Some((self.mapper)(row)?);
        Ok(())
    }
}

/// Collects the first result set's first column; SQL Server splits long
/// XML documents across several rows.
#[derive(Default)]
struct XmlSink {
    document: Option<String>,
    outer_xml: Option<String>,
}

impl RowSink for XmlSink {
    fn row(&mut self, index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        if index != 0 {
            return Ok(());
        }
        let chunk = match row.get_by_index(0) {
            Some(SqlValue::Null) | None => "",
            Some(value) => value
                .as_str()
                .ok_or_else(|| SqlFluentError::type_mismatch("xml", value.type_name()))?,
        };
        self.document.get_or_insert_with(String::new).push_str(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SqlFluentError> {
        if let Some(document) = self.document.take() {
            self.outer_xml = first_outer_xml(&document)?;
        }
        Ok(())
    }
}

struct FillSink<'a> {
    data_set: &'a mut DataSet,
    table: String,
    mapping: Vec<usize>,
}

impl RowSink for FillSink<'_> {
    fn start_result(&mut self, index: usize, columns: &Arc<ColumnInfo>) -> Result<(), SqlFluentError> {
        self.table = table_name_for(index);
        self.mapping = self.data_set.table_or_insert(&self.table).merge_columns(columns);
        trace!(table = %self.table, columns = columns.len(), "filling table");
        Ok(())
    }

    fn row(&mut self, _index: usize, row: &SqlRow) -> Result<(), SqlFluentError> {
        if let Some(table) = self.data_set.table_mut(&self.table) {
            table.append_mapped(row, &self.mapping);
        }
        Ok(())
    }
}
