use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_fluent::prelude::*;
use sql_fluent::test_utils::ScriptedConnection;
use sql_fluent::{CommandRequest, Completion, RowSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn failing() -> ScriptedConnection {
    ScriptedConnection::new().failing_with(SqlFluentError::ExecutionError("Invalid object name 't'.".into()))
}

#[tokio::test]
async fn handler_returning_true_swallows_the_error() {
    let seen = Arc::new(Mutex::new(None));
    let seen_in_handler = Arc::clone(&seen);
    let mut cmd = FluentSqlCommand::new(failing());
    let affected = cmd
        .as_query("DELETE FROM t")
        .on_failure(move |cmd| {
            *seen_in_handler.lock().unwrap() = Some((cmd.status(), cmd.error().cloned()));
            true
        })
        .exec_non_query()
        .await
        .unwrap();

    assert_eq!(affected, 0);
    assert_eq!(cmd.status(), ExecStatus::Failed);
    assert!(matches!(cmd.error(), Some(SqlFluentError::ExecutionError(_))));
    let (status, error) = seen.lock().unwrap().take().unwrap();
    assert_eq!(status, ExecStatus::Failed);
    assert!(error.is_some());
}

#[tokio::test]
async fn handler_returning_false_propagates_the_error() {
    let mut cmd = FluentSqlCommand::new(failing());
    let err = cmd
        .as_query("DELETE FROM t")
        .on_failure(|_| false)
        .exec_non_query()
        .await
        .unwrap_err();
    assert!(matches!(err, SqlFluentError::ExecutionError(msg) if msg.contains("Invalid object name")));
    assert_eq!(cmd.status(), ExecStatus::Failed);
}

#[tokio::test]
async fn swallowed_failures_return_defaults() {
    let mut cmd = FluentSqlCommand::new(failing());
    let scalar: i32 = cmd.as_query("SELECT 1").on_failure(|_| true).exec_scalar().await.unwrap();
    assert_eq!(scalar, 0);

    let mut cmd = FluentSqlCommand::new(failing());
    let item = cmd
        .as_query("SELECT 1")
        .on_failure(|_| true)
        .exec_read_item(|row| row.get_i32("n"))
        .await
        .unwrap();
    assert_eq!(item, None);

    let mut cmd = FluentSqlCommand::new(failing());
    let xml = cmd.as_query("SELECT 1").on_failure(|_| true).exec_read_xml().await.unwrap();
    assert_eq!(xml, None);
}

#[tokio::test]
async fn swallowed_failure_keeps_rows_read_so_far() {
    let conn = ScriptedConnection::new()
        .with_result_set(&["n"], (1..=5).map(|n| vec![SqlValue::I32(n)]).collect())
        .failing_with(SqlFluentError::ExecutionError("transport error".into()))
        .fail_after_rows(2);
    let mut cmd = FluentSqlCommand::new(conn);
    let items = cmd
        .as_query("SELECT n FROM t")
        .on_failure(|_| true)
        .exec_read_item_list(|row| row.get_i32("n"))
        .await
        .unwrap();
    assert_eq!(items, [1, 2]);
    assert_eq!(cmd.status(), ExecStatus::Failed);
}

#[tokio::test]
async fn owned_connection_is_opened_and_closed() {
    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new());
    cmd.as_query("UPDATE t SET a = 1").exec_non_query().await.unwrap();
    let conn = cmd.into_connection();
    assert_eq!(conn.opens(), 1);
    assert_eq!(conn.closes(), 1);
    assert!(!conn.is_open());
}

#[tokio::test]
async fn leave_open_keeps_caller_connection_open() {
    let mut conn = ScriptedConnection::new().with_result_set(&["n"], vec![vec![SqlValue::I32(1)]]);
    for _ in 0..3 {
        let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
        let n: i32 = cmd.as_query("SELECT 1").exec_scalar().await.unwrap();
        assert_eq!(n, 1);
    }
    assert!(conn.is_open());
    assert_eq!(conn.opens(), 1);
    assert_eq!(conn.closes(), 0);
    assert_eq!(conn.requests().len(), 3);
}

#[tokio::test]
async fn without_leave_open_the_connection_is_closed() {
    let mut conn = ScriptedConnection::new().opened();
    let mut cmd = FluentSqlCommand::with_connection(&mut conn, false);
    cmd.as_query("SELECT 1").exec_non_query().await.unwrap();
    drop(cmd);
    assert!(!conn.is_open());
    assert_eq!(conn.opens(), 0);
    assert_eq!(conn.closes(), 1);
}

#[tokio::test]
async fn connection_is_released_after_failure_too() {
    let mut conn = failing();
    let mut cmd = FluentSqlCommand::with_connection(&mut conn, false);
    let _ = cmd.as_query("SELECT 1").exec_non_query().await;
    drop(cmd);
    assert_eq!(conn.closes(), 1);
}

#[tokio::test]
async fn leave_open_survives_a_swallowed_failure() {
    let mut conn = failing();
    let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
    let affected = cmd
        .as_query("DELETE FROM t")
        .on_failure(|_| true)
        .exec_non_query()
        .await
        .unwrap();
    assert_eq!(affected, 0);
    assert_eq!(cmd.status(), ExecStatus::Failed);
    drop(cmd);
    assert!(conn.is_open());
    assert_eq!(conn.closes(), 0);
}

#[tokio::test]
async fn timeout_keeps_a_leave_open_connection_and_its_transaction() {
    let mut conn = ScriptedConnection::new()
        .opened()
        .with_delay(Duration::from_secs(3));
    let tx = conn.begin_transaction().unwrap();

    let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
    let affected = cmd
        .as_query("UPDATE t SET a = 1")
        .with_transaction(&tx)
        .with_timeout(1)
        .on_failure(|_| true)
        .exec_non_query()
        .await
        .unwrap();
    assert_eq!(affected, 0);
    assert!(matches!(cmd.error(), Some(SqlFluentError::Timeout(1))));
    drop(cmd);

    assert!(conn.is_open());
    assert_eq!(conn.current_transaction(), Some(&tx));
    conn.commit(&tx).unwrap();
}

#[tokio::test]
async fn timeout_discards_an_owned_connection() {
    let conn = ScriptedConnection::new().with_delay(Duration::from_secs(3));
    let mut cmd = FluentSqlCommand::new(conn);
    let _ = cmd.as_query("UPDATE t SET a = 1").with_timeout(1).exec_non_query().await;
    assert!(!cmd.connection().is_open());
}

#[tokio::test]
async fn timeout_abandons_the_command() {
    let conn = ScriptedConnection::new().with_delay(Duration::from_secs(5));
    let mut cmd = FluentSqlCommand::new(conn);
    let err = cmd
        .as_query("WAITFOR DELAY '00:00:05'")
        .with_timeout(1)
        .exec_non_query()
        .await
        .unwrap_err();
    assert!(matches!(err, SqlFluentError::Timeout(1)));
    assert_eq!(cmd.status(), ExecStatus::Failed);
}

#[tokio::test]
async fn zero_timeout_waits_for_completion() {
    let conn = ScriptedConnection::new()
        .with_delay(Duration::from_millis(50))
        .with_rows_affected(2);
    let mut cmd = FluentSqlCommand::new(conn);
    let affected = cmd.as_query("UPDATE t SET a = 1").with_timeout(0).exec_non_query().await.unwrap();
    assert_eq!(affected, 2);
}

#[tokio::test]
async fn transaction_must_match_the_pending_one() {
    let mut conn = ScriptedConnection::new().opened();
    let tx = conn.begin_transaction().unwrap();

    let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
    cmd.as_query("UPDATE t SET a = 1").with_transaction(&tx);
    cmd.exec_non_query().await.unwrap();

    drop(cmd);
    let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
    let err = cmd.as_query("UPDATE t SET a = 2").exec_non_query().await.unwrap_err();
    assert!(matches!(err, SqlFluentError::ExecutionError(_)));

    let stranger = Transaction::new();
    drop(cmd);
    let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
    let err = cmd
        .as_query("UPDATE t SET a = 3")
        .with_transaction(&stranger)
        .exec_non_query()
        .await
        .unwrap_err();
    assert!(matches!(err, SqlFluentError::ExecutionError(_)));

    drop(cmd);
    conn.commit(&tx).unwrap();
    assert!(conn.commit(&tx).is_err());
    assert_eq!(conn.requests().len(), 1);
    assert_eq!(conn.requests()[0].transaction.as_ref(), Some(&tx));
}

#[test]
fn blocking_twins_run_without_a_runtime() {
    let conn = ScriptedConnection::new().with_result_set(
        &["id", "name"],
        vec![
            vec![SqlValue::I32(1), SqlValue::from("a")],
            vec![SqlValue::I32(2), SqlValue::from("b")],
        ],
    );
    let mut cmd = FluentSqlCommand::new(conn);
    let names = cmd
        .as_query("SELECT id, name FROM t")
        .exec_read_item_list_blocking(|row| row.get_string("name"))
        .unwrap();
    assert_eq!(names, [Some("a".to_string()), Some("b".to_string())]);
    assert_eq!(cmd.status(), ExecStatus::Success);

    let mut cmd = FluentSqlCommand::new(ScriptedConnection::new().with_rows_affected(4));
    assert_eq!(cmd.as_query("DELETE FROM t").exec_non_query_blocking().unwrap(), 4);

    let mut cmd = FluentSqlCommand::new(failing());
    let result = cmd.as_query("SELECT 1").exec_scalar_blocking::<i32>();
    assert!(result.is_err());
    assert_eq!(cmd.status(), ExecStatus::Failed);
}

/// Connection whose socket pair is registered with the runtime that opened it.
#[derive(Default)]
struct LoopbackConnection {
    pair: Option<(TcpStream, TcpStream)>,
}

#[async_trait]
impl DbConnection for LoopbackConnection {
    fn is_open(&self) -> bool {
        self.pair.is_some()
    }

    async fn open(&mut self) -> Result<(), SqlFluentError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let client = TcpStream::connect(listener.local_addr()?).await?;
        let (server, _) = listener.accept().await?;
        self.pair = Some((client, server));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlFluentError> {
        self.pair = None;
        Ok(())
    }

    async fn execute_non_query(
        &mut self,
        _request: &CommandRequest<'_>,
    ) -> Result<Completion, SqlFluentError> {
        let Some((client, server)) = self.pair.as_mut() else {
            return Err(SqlFluentError::ConnectionError("closed".into()));
        };
        client.write_all(b"x").await?;
        let mut echoed = [0_u8; 1];
        server.read_exact(&mut echoed).await?;
        Ok(Completion {
            rows_affected: 1,
            outputs: Vec::new(),
        })
    }

    async fn execute_reader(
        &mut self,
        request: &CommandRequest<'_>,
        _sink: &mut (dyn RowSink + Send),
    ) -> Result<Completion, SqlFluentError> {
        self.execute_non_query(request).await
    }
}

#[test]
fn blocking_calls_share_a_leave_open_connection() {
    let mut conn = LoopbackConnection::default();
    for _ in 0..3 {
        let mut cmd = FluentSqlCommand::with_connection(&mut conn, true);
        assert_eq!(cmd.as_query("UPDATE t SET a = 1").exec_non_query_blocking().unwrap(), 1);
    }
    assert!(conn.is_open());
}
