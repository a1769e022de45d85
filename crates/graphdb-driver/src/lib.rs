//! # graphdb-driver
//!
//! The contract a graph backend implements to be driven by the `graphdb`
//! connection pool.
//!
//! Most code should use the `graphdb` crate instead. This crate is for
//! driver authors.
//!
//! ## Core Types
//!
//! - **[`Driver`]**: Factory that opens backend connections
//! - **[`Conn`]**: One stateful connection, used by a single task at a time
//! - **[`Node`]** / **[`Relationship`]**: Graph entity handles
//! - **[`Stmt`]**, **[`Rows`]**, **[`Tx`]**: Generic statement path
//! - **[`Execer`]**, **[`Queryer`]**, **[`Pinger`]**: Optional fast paths
//! - **[`Error`]**: Including the [`Error::Skip`] and [`Error::BadConn`] sentinels
//!
//! ## Sentinels
//!
//! - **`Skip`**: returned by an optional fast path when it can't serve a call;
//!   the pool falls back to prepare/execute/close
//! - **`BadConn`**: the connection is unusable and the request was never
//!   executed; the pool discards the connection

mod conn;
mod error;
mod graph;
mod stmt;
mod value;

pub use conn::{Conn, Driver, Execer, Pinger, Queryer};
pub use error::{Error, Result};
pub use graph::{Node, NodeId, Relationship, RelationshipId};
pub use stmt::{ExecResult, Rows, Stmt, Tx};
pub use value::{Properties, Value};
