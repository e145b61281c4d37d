// MSSQL module - runs fluent commands against SQL Server through tiberius
//
// - config: connection options and their builder
// - client: raw client creation (TCP, SQL Browser, routing)
// - batch: rendering of named/output parameters into one T-SQL batch
// - query: parameter binding and cell decoding
// - connection: the `DbConnection` implementation and local transactions

pub mod batch;
pub mod client;
pub mod config;
pub mod connection;
pub mod query;

// Re-export the public API
pub use client::{MssqlClient, create_mssql_client};
pub use config::{MssqlOptions, MssqlOptionsBuilder};
pub use connection::MssqlConnection;
