//! # graphdb
//!
//! A connection pool and driver registry for pluggable graph database
//! backends.
//!
//! Backends implement the [`driver`] contract and are registered once by
//! name. Applications open a [`Pool`] by driver name and data source, then
//! work with graph entities, queries, prepared statements and transactions
//! without holding on to connections themselves.
//!
//! ## Core Types
//!
//! - **[`Pool`]**: Pool of backend connections for one data source
//! - **[`PoolConfig`]**: Idle connection limit
//! - **[`Statement`]**: Prepared statement that follows the pool's connections
//! - **[`Transaction`]**: Transaction pinned to one connection
//! - **[`QueryResult`]**: Rows read from a query, keyed by column
//! - **[`Error`]**: Error type for pool operations
//!
//! ## Architecture
//!
//! - **Registry**: process-wide name to driver map; registration happens once
//!   at startup and never changes afterwards
//! - **LIFO idle list**: released connections are reused most recent first,
//!   up to the idle limit
//! - **Bad connection eviction**: connections that report
//!   [`BadConn`](driver::Error::BadConn) are closed instead of reused
//! - **Dependency-gated close**: a connection is only physically closed once
//!   the pool and every statement prepared on it are done with it
//!
//! ## Example
//!
//! ```ignore
//! graphdb::register("memgraph", MyDriver::new());
//!
//! let pool = graphdb::Pool::open("memgraph", "bolt://localhost:7687")?;
//! let alice = pool.create_node().await?;
//! alice.set_property("name", "alice".into()).await?;
//! pool.close().await?;
//! ```

mod config;
mod dep;
mod driver_conn;
mod error;
mod pool;
mod registry;
mod rows;
mod statement;
mod transaction;


pub use graphdb_driver as driver;

pub use config::{DEFAULT_MAX_IDLE_CONNS, PoolConfig};
pub use error::{Error, Result};
pub use graphdb_driver::{
   ExecResult, Node, NodeId, Properties, Relationship, RelationshipId, Value,
};
pub use pool::{Pool, PoolStats};
pub use registry::{drivers, register};
pub use rows::QueryResult;
pub use statement::Statement;
pub use transaction::Transaction;
