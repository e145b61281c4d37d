use sql_fluent::prelude::*;
use sql_fluent::test_utils::ScriptedConnection;
use sql_fluent::{DEFAULT_TIMEOUT_SECONDS, RETURN_VALUE_NAME};
use tokio::runtime::Runtime;

#[test]
fn chained_configuration_reaches_the_connection() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut conn = ScriptedConnection::new().with_rows_affected(3);
        let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
        let affected = cmd
            .as_stored_procedure("dbo.ArchiveOrders")
            .add_param("customer_id", 42_i64)
            .add_param("note", Option::<String>::None)
            .add_param_sized("code", "AB", SqlType::Char, 2)
            .add_out_param("archived", SqlType::Int)
            .with_return_value()
            .with_timeout(5)
            .exec_non_query()
            .await
            .unwrap();

        assert_eq!(affected, 3);
        assert_eq!(cmd.status(), ExecStatus::Success);
        assert!(cmd.error().is_none());
        assert_eq!(cmd.kind(), CommandKind::StoredProcedure);
        drop(cmd);

        let request = &conn.requests()[0];
        assert_eq!(request.text, "dbo.ArchiveOrders");
        assert_eq!(request.kind, CommandKind::StoredProcedure);
        let names: Vec<&str> = request.parameters.iter().map(SqlParameter::name).collect();
        assert_eq!(names, ["customer_id", "note", "code", "archived", RETURN_VALUE_NAME]);
        assert_eq!(request.parameters[1].value(), &SqlValue::Null);
        assert_eq!(request.parameters[2].size(), Some(2));
        assert_eq!(request.parameters[3].direction(), ParameterDirection::Output);
        assert_eq!(request.parameters[3].size(), Some(0));
        assert_eq!(request.parameters[4].direction(), ParameterDirection::ReturnValue);
        assert_eq!(request.parameters[4].sql_type(), Some(SqlType::Int));
    });
}

#[test]
fn output_parameter_default_sizes() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new());
    cmd.add_out_param("a", SqlType::NVarChar)
        .add_out_param("b", SqlType::VarChar)
        .add_out_param("c", SqlType::VarBinary)
        .add_out_param("d", SqlType::BigInt)
        .add_out_param_sized("e", SqlType::NVarChar, 50);

    let sizes: Vec<Option<i32>> = cmd.parameters().as_slice().iter().map(SqlParameter::size).collect();
    assert_eq!(sizes, [Some(4000), Some(8000), Some(8000), Some(0), Some(50)]);
    assert_eq!(cmd.status(), ExecStatus::NotExecuted);
}

#[test]
fn switching_kind_replaces_text() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new());
    cmd.as_stored_procedure("dbo.First").as_query("SELECT 1");
    assert_eq!(cmd.text(), "SELECT 1");
    assert_eq!(cmd.kind(), CommandKind::Text);
    assert!(format!("{cmd:?}").contains(&format!("timeout_seconds: {DEFAULT_TIMEOUT_SECONDS}")));
}

#[tokio::test]
async fn output_values_are_readable_after_success() {
    let conn = ScriptedConnection::new()
        .with_output("total", 1234_i32)
        .with_output("label", "done")
        .with_output(RETURN_VALUE_NAME, 7_i32);
    let mut cmd = FluentSqlCommand::new(conn);
    cmd.as_stored_procedure("dbo.Summarize")
        .add_out_param("total", SqlType::Int)
        .add_in_out_param("@label", "pending")
        .add_out_param("missing", SqlType::NVarChar)
        .with_return_value();

    cmd.exec_non_query().await.unwrap();

    assert_eq!(cmd.get_param_value::<i32>("total").unwrap(), 1234);
    assert_eq!(cmd.get_param_value::<i64>("@total").unwrap(), 1234);
    assert_eq!(cmd.get_param_value::<String>("label").unwrap(), "done");
    assert_eq!(cmd.get_param_value::<String>("missing").unwrap(), "");
    assert_eq!(cmd.get_return_value::<i32>().unwrap(), 7);
    assert!(matches!(
        cmd.get_param_value::<i32>("nope"),
        Err(SqlFluentError::ParameterNotFound(name)) if name == "nope"
    ));
}

#[tokio::test]
async fn return_value_requires_configuration() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new());
    cmd.as_query("SELECT 1");
    cmd.exec_non_query().await.unwrap();
    assert!(matches!(
        cmd.get_return_value::<i32>(),
        Err(SqlFluentError::ConfigError(_))
    ));
}

#[tokio::test]
async fn output_values_untouched_on_failure() {
    let conn = ScriptedConnection::new()
        .with_output("total", 99_i32)
        .failing_with(SqlFluentError::ExecutionError("deadlock".into()));
    let mut cmd = FluentSqlCommand::new(conn);
    cmd.as_stored_procedure("dbo.Summarize")
        .add_in_out_param("total", 5_i32)
        .on_failure(|_| true);

    assert_eq!(cmd.exec_non_query().await.unwrap(), 0);
    assert_eq!(cmd.get_param_value::<i32>("total").unwrap(), 5);
}

#[tokio::test]
async fn duplicate_parameter_names_fail_at_execution() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new());
    cmd.as_stored_procedure("dbo.Proc")
        .with_return_value()
        .with_return_value();

    let err = cmd.exec_non_query().await.unwrap_err();
    assert!(matches!(err, SqlFluentError::ExecutionError(_)));
    assert_eq!(cmd.status(), ExecStatus::Failed);
}

#[tokio::test]
async fn a_command_executes_only_once() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new().with_rows_affected(1));
    cmd.as_query("DELETE FROM t WHERE id = 1");
    assert_eq!(cmd.exec_non_query().await.unwrap(), 1);
    assert!(matches!(
        cmd.exec_non_query().await,
        Err(SqlFluentError::ConfigError(_))
    ));
    assert_eq!(cmd.status(), ExecStatus::Success);
    assert_eq!(cmd.into_connection().requests().len(), 1);
}
