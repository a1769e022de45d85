//! Pool-managed wrapper around one backend connection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use graphdb_driver::{Conn, ExecResult, Stmt, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::pool::PoolShared;
use crate::rows::{QueryResult, collect_rows};
use crate::{Error, Result};

pub(crate) type ConnId = u64;
pub(crate) type StmtId = u64;

/// Something that keeps a connection from being physically closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Dependent {
   /// The connection itself, until it is logically closed
   Conn(ConnId),
   /// A statement prepared on the connection
   Stmt(StmtId),
}

/// Deferred work awaited by whoever releases the connection next.
pub(crate) type OnRelease = BoxFuture<'static, ()>;

#[derive(Default)]
struct ConnState {
   in_use: bool,
   closed: bool,
   final_closed: bool,
   open_stmts: HashMap<StmtId, Arc<DriverStmt>>,
   on_release: Vec<OnRelease>,
}

/// One backend connection plus the pool's bookkeeping for it.
///
/// ## Locking
///
/// - **`state`**: the wrapper lock. Short, never held across an await, and
///   never held while taking the pool lock. The pool may take it while
///   holding its own lock (pool → wrapper is the only nesting allowed).
/// - **`ci`**: the backend handle. Held for the duration of backend I/O so
///   that direct connection calls, statement calls and teardown on this
///   connection serialize.
///
/// ## Lifecycle
///
/// ```text
/// idle <-> in use -> closed (logical) -> final closed (backend closed)
/// ```
///
/// The move from closed to final closed waits until every
/// [`Dependent`] registered for this connection has been removed.
pub(crate) struct DriverConn {
   id: ConnId,
   /// Back-reference only; the pool owns its connections
   pool: Weak<PoolShared>,
   ci: tokio::sync::Mutex<Box<dyn Conn>>,
   state: Mutex<ConnState>,
}

impl DriverConn {
   /// Wrap a freshly opened backend connection. It starts out in use.
   pub(crate) fn new(id: ConnId, pool: Weak<PoolShared>, ci: Box<dyn Conn>) -> Self {
      Self {
         id,
         pool,
         ci: tokio::sync::Mutex::new(ci),
         state: Mutex::new(ConnState {
            in_use: true,
            ..Default::default()
         }),
      }
   }

   pub(crate) fn id(&self) -> ConnId {
      self.id
   }

   pub(crate) async fn lock_conn(&self) -> tokio::sync::MutexGuard<'_, Box<dyn Conn>> {
      self.ci.lock().await
   }

   /// Mark as handed out. Called by the pool under its own lock.
   pub(crate) fn set_in_use(&self) {
      let mut state = self.state.lock();
      debug_assert!(!state.in_use, "idle connection {} already in use", self.id);
      state.in_use = true;
   }

   /// Clear the in-use flag and take the pending on-release callbacks.
   pub(crate) fn take_for_release(&self) -> Result<Vec<OnRelease>> {
      let mut state = self.state.lock();
      if !state.in_use {
         return Err(Error::ConnNotInUse);
      }
      state.in_use = false;
      Ok(std::mem::take(&mut state.on_release))
   }

   /// Queue `task` to run at the next release if the connection is in use.
   ///
   /// Returns `false` without building the task when the connection is not
   /// in use; the caller then does the work itself.
   pub(crate) fn defer_if_in_use<F>(&self, task: F) -> bool
   where
      F: FnOnce() -> OnRelease,
   {
      let mut state = self.state.lock();
      if state.in_use {
         state.on_release.push(task());
         true
      } else {
         false
      }
   }

   #[cfg(test)]
   pub(crate) fn is_in_use(&self) -> bool {
      self.state.lock().in_use
   }

   pub(crate) fn is_closed(&self) -> bool {
      self.state.lock().closed
   }

   #[cfg(test)]
   pub(crate) fn is_final_closed(&self) -> bool {
      self.state.lock().final_closed
   }

   pub(crate) fn add_open_stmt(&self, ds: Arc<DriverStmt>) {
      self.state.lock().open_stmts.insert(ds.id(), ds);
   }

   pub(crate) fn remove_open_stmt(&self, id: StmtId) {
      self.state.lock().open_stmts.remove(&id);
   }

   #[cfg(test)]
   pub(crate) fn open_stmt_count(&self) -> usize {
      self.state.lock().open_stmts.len()
   }

   /// Logical close.
   ///
   /// Drops the connection's hold on itself. The backend connection is only
   /// torn down here if nothing else (such as an open statement) still
   /// depends on it; otherwise the last dependent to go does it.
   pub(crate) async fn close(&self) -> Result<()> {
      {
         let mut state = self.state.lock();
         if state.closed {
            return Err(Error::DuplicateClose);
         }
         state.closed = true;
      }

      // Wrapper lock is released before the pool lock is taken
      let last = match self.pool.upgrade() {
         Some(pool) => pool.remove_dep(self.id, Dependent::Conn(self.id)),
         None => true,
      };

      if last {
         self.final_close().await
      } else {
         debug!(conn = self.id, "Connection closed, backend close deferred to dependents");
         Ok(())
      }
   }

   /// Close every statement still open on this connection, then the backend
   /// connection itself. Runs exactly once, when the dependency set empties.
   pub(crate) async fn final_close(&self) -> Result<()> {
      let stmts: Vec<Arc<DriverStmt>> = {
         let mut state = self.state.lock();
         state.open_stmts.drain().map(|(_, ds)| ds).collect()
      };

      let mut ci = self.ci.lock().await;
      for ds in stmts {
         if let Err(e) = ds.close().await {
            warn!(conn = self.id, stmt = ds.id(), error = %e, "Failed to close statement during final close");
         }
      }
      let result = ci.close().await;
      drop(ci);

      self.state.lock().final_closed = true;
      debug!(conn = self.id, "Backend connection closed");
      result.map_err(Error::from)
   }

   /// Run a statement that returns no rows, using the connection's fast path
   /// when it has one and it doesn't skip.
   pub(crate) async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
      let mut ci = self.ci.lock().await;

      if let Some(execer) = ci.as_execer() {
         match execer.exec(query, args).await {
            Err(e) if e.is_skip() => {}
            result => return result.map_err(Error::from),
         }
      }

      let mut si = ci.prepare(query).await?;
      let result = exec_stmt(si.as_mut(), args).await;
      let closed = si.close().await;
      let value = result?;
      closed?;
      Ok(value)
   }

   /// Run a statement that returns rows, draining them before returning.
   pub(crate) async fn query(&self, query: &str, args: &[Value]) -> Result<QueryResult> {
      let mut ci = self.ci.lock().await;

      if let Some(queryer) = ci.as_queryer() {
         match queryer.query(query, args).await {
            Err(e) if e.is_skip() => {}
            Err(e) => return Err(e.into()),
            Ok(rows) => return collect_rows(rows).await,
         }
      }

      let mut si = ci.prepare(query).await?;
      let result = query_stmt(si.as_mut(), args).await;
      let closed = si.close().await;
      let value = result?;
      closed?;
      Ok(value)
   }
}

/// A backend statement prepared on one [`DriverConn`].
///
/// Callers hold that connection's backend handle (see
/// [`DriverConn::lock_conn`]) around every call.
pub(crate) struct DriverStmt {
   id: StmtId,
   num_input: Option<usize>,
   si: tokio::sync::Mutex<Box<dyn Stmt>>,
   closed: AtomicBool,
}

impl DriverStmt {
   pub(crate) fn new(id: StmtId, si: Box<dyn Stmt>) -> Self {
      Self {
         id,
         num_input: si.num_input(),
         si: tokio::sync::Mutex::new(si),
         closed: AtomicBool::new(false),
      }
   }

   pub(crate) fn id(&self) -> StmtId {
      self.id
   }

   pub(crate) async fn exec(&self, args: &[Value]) -> Result<ExecResult> {
      check_arg_count(self.num_input, args.len())?;
      Ok(self.si.lock().await.exec(args).await?)
   }

   pub(crate) async fn query(&self, args: &[Value]) -> Result<QueryResult> {
      check_arg_count(self.num_input, args.len())?;
      let rows = self.si.lock().await.query(args).await?;
      collect_rows(rows).await
   }

   /// Close the backend statement. Later calls are no-ops.
   pub(crate) async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::AcqRel) {
         return Ok(());
      }
      Ok(self.si.lock().await.close().await?)
   }
}

fn check_arg_count(num_input: Option<usize>, got: usize) -> Result<()> {
   match num_input {
      Some(expected) if expected != got => Err(Error::ArgumentCount { expected, got }),
      _ => Ok(()),
   }
}

async fn exec_stmt(si: &mut dyn Stmt, args: &[Value]) -> Result<ExecResult> {
   check_arg_count(si.num_input(), args.len())?;
   Ok(si.exec(args).await?)
}

async fn query_stmt(si: &mut dyn Stmt, args: &[Value]) -> Result<QueryResult> {
   check_arg_count(si.num_input(), args.len())?;
   let rows = si.query(args).await?;
   collect_rows(rows).await
}
