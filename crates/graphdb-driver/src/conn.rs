//! Driver and connection contracts

use async_trait::async_trait;

use crate::graph::{Node, NodeId, Relationship};
use crate::stmt::{ExecResult, Rows, Stmt, Tx};
use crate::{Error, Result, Value};

/// A factory for backend connections, registered under a name with the pool.
///
/// `open` may hand back a cached connection, but there is no need to: the
/// pool already keeps idle connections around for reuse.
#[async_trait]
pub trait Driver: Send + Sync {
   /// Open a new connection. `dsn` is in a driver-specific format.
   async fn open(&self, dsn: &str) -> Result<Box<dyn Conn>>;
}

/// One stateful connection to a graph backend.
///
/// The pool guarantees a connection is used by a single task at a time, so
/// implementations need no internal synchronization against concurrent use.
///
/// Optional fast paths are advertised through the `as_*` accessors, which
/// return `None` unless overridden.
#[async_trait]
pub trait Conn: Send {
   async fn create_node(&mut self) -> Result<Box<dyn Node>>;

   async fn node(&mut self, id: NodeId) -> Result<Box<dyn Node>>;

   async fn create_relationship(
      &mut self,
      start: NodeId,
      end: NodeId,
      rel_type: &str,
   ) -> Result<Box<dyn Relationship>>;

   async fn relationship_types(&mut self) -> Result<Vec<String>>;

   /// Prepare a statement bound to this connection.
   async fn prepare(&mut self, _query: &str) -> Result<Box<dyn Stmt>> {
      Err(Error::Unsupported("prepare"))
   }

   /// Start a transaction on this connection.
   async fn begin(&mut self) -> Result<Box<dyn Tx>> {
      Err(Error::Unsupported("begin"))
   }

   fn as_execer(&mut self) -> Option<&mut dyn Execer> {
      None
   }

   fn as_queryer(&mut self) -> Option<&mut dyn Queryer> {
      None
   }

   fn as_pinger(&mut self) -> Option<&mut dyn Pinger> {
      None
   }

   /// Invalidate any prepared statements and transactions and release the
   /// connection.
   ///
   /// The pool only calls this once it has a surplus of idle connections or
   /// is discarding this one, so drivers need not cache connections
   /// themselves.
   async fn close(&mut self) -> Result<()>;
}

/// Optional fast path for statements that return no rows.
///
/// Without it the pool prepares a statement, executes it and closes it.
/// May return [`Error::Skip`].
#[async_trait]
pub trait Execer: Send {
   async fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult>;
}

/// Optional fast path for statements that return rows.
///
/// Without it the pool prepares a statement, queries it and closes it.
/// May return [`Error::Skip`].
#[async_trait]
pub trait Queryer: Send {
   async fn query(&mut self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>>;
}

/// Optional liveness check. Returning [`Error::BadConn`] evicts the
/// connection from the pool.
#[async_trait]
pub trait Pinger: Send {
   async fn ping(&mut self) -> Result<()>;
}
