use tiberius::{Client, Config as TiberiusConfig, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::config::MssqlOptions;
use crate::error::SqlFluentError;

/// Type alias for a SQL Server client over tokio TCP.
pub type MssqlClient = Client<Compat<TcpStream>>;

async fn connect_tcp(config: &TiberiusConfig, named: bool) -> Result<TcpStream, SqlFluentError> {
    let tcp = if named {
        TcpStream::connect_named(config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;
    Ok(tcp)
}

async fn login(options: &MssqlOptions) -> Result<MssqlClient, SqlFluentError> {
    let config = options.to_tiberius_config()?;
    // Resolves the port through SQL Browser only when an instance name is set
    let tcp = connect_tcp(&config, true).await?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways redirect the login to the actual node
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(%host, port, "login redirected");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = connect_tcp(&config, false).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Open a new SQL Server connection.
///
/// # Errors
///
/// Returns `SqlFluentError::ConnectionError` if the connect timeout expires,
/// or the driver's error if the TCP connect or login fails.
pub async fn create_mssql_client(options: &MssqlOptions) -> Result<MssqlClient, SqlFluentError> {
    debug!(server = %options.describe(), "connecting to SQL Server");
    match options.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, login(options))
            .await
            .map_err(|_| {
                SqlFluentError::ConnectionError(format!(
                    "Timed out after {}s connecting to {}",
                    limit.as_secs(),
                    options.describe()
                ))
            })?,
        None => login(options).await,
    }
}
