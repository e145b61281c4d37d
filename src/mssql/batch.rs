//! Rendering of a configured command into one parameterized T-SQL batch.
//!
//! tiberius binds positional `@P1..@Pn` parameters and has no notion of
//! output parameters or return codes. Every named parameter therefore
//! becomes a batch variable initialised from its positional bind; the
//! final values of output-capable parameters are written to a session
//! temp table at the end of the batch and read back afterwards.

use crate::command::params::{SqlParameter, bare_name, ensure_unique_names};
use crate::connection::CommandRequest;
use crate::error::SqlFluentError;
use crate::types::{CommandKind, ParameterDirection, SqlType, SqlValue};

/// Session temp table that receives output values.
pub const OUTPUT_TABLE: &str = "#fluent_outputs";

/// A value bound to `@P{n}`, with the type its NULL must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub value: SqlValue,
    pub sql_type: Option<SqlType>,
}

/// Statements needed to run one command.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    /// Session-level statement creating the output table
    pub setup: Option<String>,
    /// The parameterized batch itself
    pub sql: String,
    pub binds: Vec<Bind>,
    /// Session-level statement reading (and dropping) the output table
    pub fetch: Option<String>,
    /// Parameter names in output-table column order
    pub outputs: Vec<String>,
}

fn quote_column(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn check_name(param: &SqlParameter) -> Result<&str, SqlFluentError> {
    let name = bare_name(param.name());
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$'));
    if !valid {
        return Err(SqlFluentError::ExecutionError(format!(
            "Invalid parameter name \"{}\"",
            param.name()
        )));
    }
    if is_positional(name) {
        return Err(SqlFluentError::ExecutionError(format!(
            "Parameter name \"{}\" is reserved for positional binds",
            param.name()
        )));
    }
    Ok(name)
}

/// `P1`, `p2`, ...: the names tiberius gives its positional binds.
fn is_positional(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('P' | 'p'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

fn sized(base: &str, size: Option<i32>, limit: i32) -> String {
    match size {
        Some(n) if n > 0 && n <= limit => format!("{base}({n})"),
        _ => format!("{base}(max)"),
    }
}

fn fixed(base: &str, size: Option<i32>, value: &SqlValue, limit: i32) -> String {
    let len = match value {
        SqlValue::String(s) => s.chars().count(),
        SqlValue::Binary(b) => b.len(),
        _ => 0,
    };
    let n = size
        .filter(|n| *n > 0)
        .unwrap_or_else(|| i32::try_from(len).unwrap_or(limit))
        .clamp(1, limit);
    format!("{base}({n})")
}

/// T-SQL type used to declare the variable behind `param`.
#[must_use]
pub fn declaration(param: &SqlParameter) -> String {
    let size = param.size();
    let value = param.value();
    let Some(sql_type) = param.sql_type() else {
        return "nvarchar(max)".to_string();
    };
    match sql_type {
        SqlType::BigInt => "bigint".to_string(),
        SqlType::Int => "int".to_string(),
        SqlType::SmallInt => "smallint".to_string(),
        SqlType::TinyInt => "tinyint".to_string(),
        SqlType::Bit => "bit".to_string(),
        SqlType::Float => "float".to_string(),
        SqlType::Real => "real".to_string(),
        SqlType::Money => "money".to_string(),
        SqlType::Decimal => match value {
            SqlValue::Decimal(d) => format!("decimal(38, {})", d.scale().min(38)),
            _ => "decimal(38, 10)".to_string(),
        },
        SqlType::NVarChar => sized("nvarchar", size, 4000),
        SqlType::VarChar => sized("varchar", size, 8000),
        SqlType::VarBinary => sized("varbinary", size, 8000),
        SqlType::NChar => fixed("nchar", size, value, 4000),
        SqlType::Char => fixed("char", size, value, 8000),
        SqlType::Binary => fixed("binary", size, value, 8000),
        SqlType::UniqueIdentifier => "uniqueidentifier".to_string(),
        SqlType::DateTime => "datetime".to_string(),
        SqlType::DateTime2 => "datetime2(7)".to_string(),
        SqlType::SmallDateTime => "smalldatetime".to_string(),
        SqlType::Date => "date".to_string(),
        SqlType::Time => "time(7)".to_string(),
        SqlType::DateTimeOffset => "datetimeoffset(7)".to_string(),
        SqlType::Xml => "xml".to_string(),
    }
}

/// Render `request` into the statements that run it.
///
/// # Errors
///
/// Returns `SqlFluentError::ExecutionError` for an empty command text,
/// duplicate parameter names or names that are not valid identifiers.
pub fn render(request: &CommandRequest<'_>) -> Result<BatchPlan, SqlFluentError> {
    if request.text.trim().is_empty() {
        return Err(SqlFluentError::ExecutionError(
            "The command text has not been set (call as_query or as_stored_procedure)"
                .to_string(),
        ));
    }
    ensure_unique_names(request.parameters)?;

    let mut sql = String::new();
    let mut binds = Vec::new();
    let mut outputs = Vec::new();
    let mut columns = Vec::new();
    let mut arguments = Vec::new();
    let mut return_variable = None;

    for param in request.parameters {
        let name = check_name(param)?;
        let declared = declaration(param);
        match param.direction() {
            ParameterDirection::Output | ParameterDirection::ReturnValue => {
                sql.push_str(&format!("DECLARE @{name} {declared};\n"));
            }
            ParameterDirection::Input | ParameterDirection::InputOutput => {
                binds.push(Bind {
                    value: param.value().clone(),
                    sql_type: param.sql_type(),
                });
                sql.push_str(&format!(
                    "DECLARE @{name} {declared} = @P{};\n",
                    binds.len()
                ));
            }
        }

        match param.direction() {
            ParameterDirection::Input => arguments.push(format!("@{name} = @{name}")),
            ParameterDirection::Output | ParameterDirection::InputOutput => {
                arguments.push(format!("@{name} = @{name} OUTPUT"));
            }
            ParameterDirection::ReturnValue => return_variable = Some(name),
        }
        if param.direction().is_output() {
            outputs.push(name.to_string());
            columns.push(format!("{} {declared} NULL", quote_column(name)));
        }
    }

    match request.kind {
        CommandKind::Text => sql.push_str(request.text),
        CommandKind::StoredProcedure => {
            sql.push_str("EXEC ");
            if let Some(variable) = return_variable {
                sql.push_str(&format!("@{variable} = "));
            }
            sql.push_str(request.text.trim());
            if !arguments.is_empty() {
                sql.push(' ');
                sql.push_str(&arguments.join(", "));
            }
            sql.push(';');
        }
    }

    if outputs.is_empty() {
        return Ok(BatchPlan {
            setup: None,
            sql,
            binds,
            fetch: None,
            outputs,
        });
    }

    let column_list = outputs
        .iter()
        .map(|name| quote_column(name))
        .collect::<Vec<_>>()
        .join(", ");
    let variable_list = outputs
        .iter()
        .map(|name| format!("@{name}"))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(&format!(
        "\nSET NOCOUNT ON;\nINSERT INTO {OUTPUT_TABLE} ({column_list}) VALUES ({variable_list});"
    ));

    Ok(BatchPlan {
        setup: Some(format!(
            "IF OBJECT_ID('tempdb..{OUTPUT_TABLE}') IS NOT NULL DROP TABLE {OUTPUT_TABLE};\nCREATE TABLE {OUTPUT_TABLE} ({});",
            columns.join(", ")
        )),
        sql,
        binds,
        fetch: Some(format!(
            "SELECT {column_list} FROM {OUTPUT_TABLE};\nDROP TABLE {OUTPUT_TABLE};"
        )),
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        text: &'a str,
        kind: CommandKind,
        parameters: &'a [SqlParameter],
    ) -> CommandRequest<'a> {
        CommandRequest {
            text,
            kind,
            transaction: None,
            parameters,
        }
    }

    #[test]
    fn plain_query_passes_through() {
        let plan = render(&request("SELECT 1", CommandKind::Text, &[])).unwrap();
        assert_eq!(plan.sql, "SELECT 1");
        assert!(plan.setup.is_none());
        assert!(plan.binds.is_empty());
    }

    #[test]
    fn input_parameters_become_variables() {
        let params = [
            SqlParameter::new("@id", 5_i64),
            SqlParameter::new("name", "bob"),
        ];
        let plan = render(&request(
            "SELECT * FROM t WHERE id = @id AND name = @name",
            CommandKind::Text,
            &params,
        ))
        .unwrap();
        assert_eq!(
            plan.sql,
            "DECLARE @id bigint = @P1;\nDECLARE @name nvarchar(max) = @P2;\nSELECT * FROM t WHERE id = @id AND name = @name"
        );
        assert_eq!(plan.binds.len(), 2);
        assert!(plan.fetch.is_none());
    }

    #[test]
    fn stored_procedure_captures_outputs_and_return_code() {
        let params = [
            SqlParameter::new("a", 1_i32),
            SqlParameter::output("total", SqlType::NVarChar).with_size(4000),
            SqlParameter::new("counter", 3_i32).with_direction(ParameterDirection::InputOutput),
            SqlParameter::new("__returnValue", SqlValue::Null)
                .with_type(SqlType::Int)
                .with_direction(ParameterDirection::ReturnValue),
        ];
        let plan = render(&request("dbo.DoWork", CommandKind::StoredProcedure, &params)).unwrap();

        assert!(plan.sql.contains("DECLARE @total nvarchar(4000);"));
        assert!(plan.sql.contains("DECLARE @counter int = @P2;"));
        assert!(plan.sql.contains(
            "EXEC @__returnValue = dbo.DoWork @a = @a, @total = @total OUTPUT, @counter = @counter OUTPUT;"
        ));
        assert!(plan.sql.ends_with(
            "INSERT INTO #fluent_outputs ([total], [counter], [__returnValue]) VALUES (@total, @counter, @__returnValue);"
        ));
        assert_eq!(plan.outputs, ["total", "counter", "__returnValue"]);
        let setup = plan.setup.unwrap();
        assert!(setup.contains("[total] nvarchar(4000) NULL"));
        assert!(setup.contains("[__returnValue] int NULL"));
    }

    #[test]
    fn declarations_follow_type_and_size() {
        assert_eq!(
            declaration(&SqlParameter::output("v", SqlType::VarBinary).with_size(8000)),
            "varbinary(8000)"
        );
        assert_eq!(
            declaration(&SqlParameter::output("v", SqlType::VarChar).with_size(-1)),
            "varchar(max)"
        );
        assert_eq!(declaration(&SqlParameter::new("c", "abc").with_type(SqlType::NChar)), "nchar(3)");
        assert_eq!(declaration(&SqlParameter::new("n", SqlValue::Null)), "nvarchar(max)");
    }

    #[test]
    fn positional_bind_names_are_reserved() {
        for name in ["P1", "@p12"] {
            let params = [SqlParameter::new(name, 1_i32)];
            let err = render(&request("SELECT @P1", CommandKind::Text, &params)).unwrap_err();
            assert!(matches!(err, SqlFluentError::ExecutionError(msg) if msg.contains("reserved")));
        }
        let params = [SqlParameter::new("P", 1_i32), SqlParameter::new("P1x", 2_i32)];
        assert!(render(&request("SELECT @P, @P1x", CommandKind::Text, &params)).is_ok());
    }

    #[test]
    fn rejects_missing_text_and_bad_names() {
        assert!(render(&request("  ", CommandKind::Text, &[])).is_err());
        let params = [SqlParameter::new("bad name", 1_i32)];
        assert!(render(&request("SELECT 1", CommandKind::Text, &params)).is_err());
    }
}
