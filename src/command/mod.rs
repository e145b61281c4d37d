//! Fluent builder around one database command.
//!
//! A [`FluentSqlCommand`] is configured through chained calls, executed
//! exactly once through one of the `exec_*` methods, and can then be asked
//! for its [`status`](FluentSqlCommand::status), its captured
//! [`error`](FluentSqlCommand::error) and the final values of its output
//! parameters.

mod exec;
pub mod params;

use std::fmt;

use crate::connection::{DbConnection, Transaction};
use crate::conversion::{FromSqlValue, from_sql_or_default};
use crate::error::SqlFluentError;
use crate::types::{CommandKind, ParameterDirection, SqlType, SqlValue};

pub use params::{ParameterCollection, RETURN_VALUE_NAME, SqlParameter};

/// Command timeout applied when `with_timeout` is never called.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// Outcome of the single execution of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecStatus {
    #[default]
    NotExecuted,
    Success,
    Failed,
}

/// Decides whether an execution failure is swallowed (`true`) or returned
/// to the caller (`false`). It sees the command with `status()` and
/// `error()` already set.
pub type FailureHandler<C> = Box<dyn FnOnce(&FluentSqlCommand<C>) -> bool + Send>;

/// Chainable configuration of one command plus its execution.
///
/// ```rust,no_run
/// use sql_fluent::prelude::*;
///
/// # async fn run(conn: &mut MssqlConnection) -> Result<(), SqlFluentError> {
/// let mut cmd = FluentSqlCommand::with_connection(conn, true);
/// let names = cmd
///     .as_query("SELECT name FROM users WHERE active = @active")
///     .add_param("active", true)
///     .exec_read_item_list(|row| row.get_string("name"))
///     .await?;
/// # let _ = names;
/// # Ok(())
/// # }
/// ```
pub struct FluentSqlCommand<C: DbConnection> {
    connection: C,
    close_after: bool,
    text: String,
    kind: CommandKind,
    timeout_seconds: u32,
    transaction: Option<Transaction>,
    parameters: ParameterCollection,
    has_return_value: bool,
    on_failure: Option<FailureHandler<C>>,
    status: ExecStatus,
    error: Option<SqlFluentError>,
}

impl<C: DbConnection> FluentSqlCommand<C> {
    /// Command that owns `connection`: it is opened when needed and closed
    /// once the command has executed.
    pub fn new(connection: C) -> Self {
        Self::build(connection, true)
    }

    /// Command over a connection the caller keeps. With `leave_open` the
    /// connection is never closed by the command; without it, it is closed
    /// after execution just like an owned one.
    pub fn with_connection(connection: C, leave_open: bool) -> Self {
        Self::build(connection, !leave_open)
    }

    fn build(connection: C, close_after: bool) -> Self {
        Self {
            connection,
            close_after,
            text: String::new(),
            kind: CommandKind::Text,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            transaction: None,
            parameters: ParameterCollection::default(),
            has_return_value: false,
            on_failure: None,
            status: ExecStatus::NotExecuted,
            error: None,
        }
    }

    pub fn as_stored_procedure(&mut self, name: impl Into<String>) -> &mut Self {
        self.text = name.into();
        self.kind = CommandKind::StoredProcedure;
        self
    }

    pub fn as_query(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = text.into();
        self.kind = CommandKind::Text;
        self
    }

    /// Seconds the command may run before it is abandoned; `0` means no limit.
    pub fn with_timeout(&mut self, seconds: u32) -> &mut Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_transaction(&mut self, transaction: &Transaction) -> &mut Self {
        self.transaction = Some(transaction.clone());
        self
    }

    /// Bind an `int` parameter to the procedure's return code.
    ///
    /// Calling this twice adds a second parameter with the same name,
    /// which the driver rejects when the command runs.
    pub fn with_return_value(&mut self) -> &mut Self {
        self.parameters.push(
            SqlParameter::new(RETURN_VALUE_NAME, SqlValue::Null)
                .with_type(SqlType::Int)
                .with_direction(ParameterDirection::ReturnValue),
        );
        self.has_return_value = true;
        self
    }

    pub fn on_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnOnce(&FluentSqlCommand<C>) -> bool + Send + 'static,
    {
        self.on_failure = Some(Box::new(handler));
        self
    }

    /// Bind an input parameter. `None` binds database NULL.
    pub fn add_param(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.parameters.push(SqlParameter::new(name, value));
        self
    }

    pub fn add_param_typed(
        &mut self,
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        sql_type: SqlType,
    ) -> &mut Self {
        self.parameters
            .push(SqlParameter::new(name, value).with_type(sql_type));
        self
    }

    pub fn add_param_sized(
        &mut self,
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        sql_type: SqlType,
        size: i32,
    ) -> &mut Self {
        self.parameters.push(
            SqlParameter::new(name, value)
                .with_type(sql_type)
                .with_size(size),
        );
        self
    }

    /// Add a fully described parameter.
    pub fn add_parameter(&mut self, parameter: SqlParameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    /// Register an output-only parameter with the type's default size.
    pub fn add_out_param(&mut self, name: impl Into<String>, sql_type: SqlType) -> &mut Self {
        self.add_out_param_sized(name, sql_type, sql_type.default_output_size())
    }

    pub fn add_out_param_sized(
        &mut self,
        name: impl Into<String>,
        sql_type: SqlType,
        size: i32,
    ) -> &mut Self {
        self.parameters
            .push(SqlParameter::output(name, sql_type).with_size(size));
        self
    }

    pub fn add_in_out_param(
        &mut self,
        name: impl Into<String>,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        self.parameters.push(
            SqlParameter::new(name, value).with_direction(ParameterDirection::InputOutput),
        );
        self
    }

    #[must_use]
    pub fn status(&self) -> ExecStatus {
        self.status
    }

    /// The failure captured by the execution, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&SqlFluentError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    #[must_use]
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Give the connection back, e.g. one the command owned.
    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Current value of a parameter; NULL reads as `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ParameterNotFound` for an unknown name, or a
    /// conversion error when the value does not fit `T`.
    pub fn get_param_value<T: FromSqlValue + Default>(&self, name: &str) -> Result<T, SqlFluentError> {
        let param = self
            .parameters
            .find(name)
            .ok_or_else(|| SqlFluentError::ParameterNotFound(name.to_string()))?;
        from_sql_or_default(param.value())
    }

    /// Return code set by the procedure; NULL reads as `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` when `with_return_value` was
    /// never called.
    pub fn get_return_value<T: FromSqlValue + Default>(&self) -> Result<T, SqlFluentError> {
        if !self.has_return_value {
            return Err(SqlFluentError::ConfigError(
                "Can not get return value. Return value was not configured by with_return_value"
                    .to_string(),
            ));
        }
        self.get_param_value(RETURN_VALUE_NAME)
    }
}

impl<C: DbConnection> fmt::Debug for FluentSqlCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluentSqlCommand")
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("transaction", &self.transaction)
            .field("parameters", &self.parameters)
            .field("close_after", &self.close_after)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
