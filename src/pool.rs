//! Connection pool over a registered graph driver

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use graphdb_driver::{Driver, ExecResult, Node, NodeId, Relationship, Value};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{PoolConfig, max_idle};
use crate::dep::DepSet;
use crate::driver_conn::{ConnId, Dependent, DriverConn, DriverStmt, StmtId};
use crate::registry;
use crate::rows::QueryResult;
use crate::statement::Statement;
use crate::transaction::Transaction;
use crate::{Error, Result};

/// A pool of connections to one data source through one registered driver.
///
/// ## Architecture
///
/// - **Lazy connect**: opening a pool only resolves the driver; backend
///   connections are opened on first use
/// - **LIFO reuse**: the most recently released connection is handed out
///   first, keeping a small working set warm
/// - **Bounded idle list**: at most `max_idle_conns` connections are kept;
///   extras are closed on release
/// - **Bad connection eviction**: a connection released with
///   [`BadConn`](graphdb_driver::Error::BadConn) is closed, never reused
///
/// ## Locking
///
/// The pool lock guards the idle list, the closed flag, the idle limit and
/// the dependency table. It is never held across backend I/O: opening and
/// closing backend connections always happens after it is released.
///
/// `Pool` is cheap to clone; clones share the same connections. Call
/// [`close`](Self::close) when done. If the last clone is dropped first, idle
/// connections are closed on the current tokio runtime.
#[derive(Clone)]
pub struct Pool {
   shared: Arc<PoolShared>,
}

pub(crate) struct PoolShared {
   driver_name: String,
   driver: Arc<dyn Driver>,
   dsn: String,
   next_id: AtomicU64,
   state: Mutex<PoolState>,
}

struct PoolState {
   /// Idle connections; the end is the most recently released
   free_conns: Vec<Arc<DriverConn>>,
   closed: bool,
   max_idle_conns: i32,
   deps: DepSet<ConnId, Dependent>,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
   /// Connections currently idle
   pub idle: usize,
   /// Effective idle limit
   pub max_idle: usize,
   pub closed: bool,
}

impl PoolShared {
   /// Remove one dependent of a connection, returning true when it was the
   /// last and the connection must be finally closed.
   pub(crate) fn remove_dep(&self, conn: ConnId, dependent: Dependent) -> bool {
      self.state.lock().deps.remove(conn, dependent)
   }

   fn next_id(&self) -> u64 {
      self.next_id.fetch_add(1, Ordering::Relaxed) + 1
   }
}

impl Pool {
   /// Open a pool for the driver registered as `driver_name`.
   ///
   /// No backend connection is made until one is needed; use
   /// [`ping`](Self::ping) to verify the data source is reachable.
   pub fn open(driver_name: &str, dsn: &str) -> Result<Self> {
      Self::open_with_config(driver_name, dsn, None)
   }

   /// Open a pool with optional custom configuration.
   pub fn open_with_config(
      driver_name: &str,
      dsn: &str,
      custom_config: Option<PoolConfig>,
   ) -> Result<Self> {
      let driver = registry::lookup(driver_name)
         .ok_or_else(|| Error::UnknownDriver(driver_name.to_string()))?;
      let config = custom_config.unwrap_or_default();

      debug!(driver = driver_name, max_idle = config.max_idle(), "Opened pool");

      Ok(Self {
         shared: Arc::new(PoolShared {
            driver_name: driver_name.to_string(),
            driver,
            dsn: dsn.to_string(),
            next_id: AtomicU64::new(0),
            state: Mutex::new(PoolState {
               free_conns: Vec::new(),
               closed: false,
               max_idle_conns: config.max_idle_conns,
               deps: DepSet::default(),
            }),
         }),
      })
   }

   /// The driver this pool opens connections with.
   pub fn driver(&self) -> Arc<dyn Driver> {
      Arc::clone(&self.shared.driver)
   }

   pub fn driver_name(&self) -> &str {
      &self.shared.driver_name
   }

   pub fn stats(&self) -> PoolStats {
      let state = self.shared.state.lock();
      PoolStats {
         idle: state.free_conns.len(),
         max_idle: max_idle(state.max_idle_conns),
         closed: state.closed,
      }
   }

   /// Verify a connection can be obtained, opening one if none is idle.
   ///
   /// If the connection implements [`Pinger`](graphdb_driver::Pinger) it is
   /// also pinged; a bad-connection result evicts it.
   pub async fn ping(&self) -> Result<()> {
      let dc = self.acquire().await?;
      let result = {
         let mut ci = dc.lock_conn().await;
         match ci.as_pinger() {
            Some(pinger) => pinger.ping().await.map_err(Error::from),
            None => Ok(()),
         }
      };
      self.finish(dc, result).await
   }

   /// Close the pool.
   ///
   /// Idle connections are closed now. Connections in use are closed when
   /// released. Every later operation fails with [`Error::PoolClosed`].
   /// Closing an already closed pool is a no-op.
   pub async fn close(&self) -> Result<()> {
      let idle = {
         let mut state = self.shared.state.lock();
         if state.closed {
            return Ok(());
         }
         state.closed = true;
         std::mem::take(&mut state.free_conns)
      };

      debug!(driver = %self.shared.driver_name, idle = idle.len(), "Closing pool");
      close_all(idle).await
   }

   /// Change the idle limit, closing idle connections beyond it.
   ///
   /// `0` restores the default, a negative value keeps none. The least
   /// recently used connections are the ones closed.
   pub async fn set_max_idle_conns(&self, n: i32) -> Result<()> {
      let excess = {
         let mut state = self.shared.state.lock();
         state.max_idle_conns = n;
         let keep = max_idle(n);
         let len = state.free_conns.len();
         if len > keep {
            state.free_conns.drain(..len - keep).collect()
         } else {
            Vec::new()
         }
      };

      close_all(excess).await
   }

   /// Execute a statement that returns no rows.
   pub async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
      let dc = self.acquire().await?;
      let result = dc.exec(query, args).await;
      self.finish(dc, result).await
   }

   /// Execute a statement and read all of its rows.
   pub async fn query(&self, query: &str, args: &[Value]) -> Result<QueryResult> {
      let dc = self.acquire().await?;
      let result = dc.query(query, args).await;
      self.finish(dc, result).await
   }

   /// Prepare a statement for repeated execution.
   ///
   /// The statement must be [closed](Statement::close) when no longer
   /// needed; connections it was prepared on are not torn down before then.
   pub async fn prepare(&self, query: &str) -> Result<Statement> {
      let stmt_id = self.shared.next_id();
      let dc = self.acquire().await?;
      let result = self.prepare_on(&dc, stmt_id, query).await;
      let ds = self.finish(Arc::clone(&dc), result).await?;
      Ok(Statement::new(self.clone(), stmt_id, query, dc, ds))
   }

   /// Begin a transaction. Its connection stays out of the pool until it
   /// is committed or rolled back.
   pub async fn begin(&self) -> Result<Transaction> {
      let dc = self.acquire().await?;
      let result = dc.lock_conn().await.begin().await.map_err(Error::from);
      match result {
         Ok(tx) => Ok(Transaction::new(self.clone(), dc, tx)),
         Err(e) => self.finish(dc, Err(e)).await,
      }
   }

   pub async fn create_node(&self) -> Result<Box<dyn Node>> {
      let dc = self.acquire().await?;
      let result = dc.lock_conn().await.create_node().await.map_err(Error::from);
      self.finish(dc, result).await
   }

   pub async fn node(&self, id: NodeId) -> Result<Box<dyn Node>> {
      let dc = self.acquire().await?;
      let result = dc.lock_conn().await.node(id).await.map_err(Error::from);
      self.finish(dc, result).await
   }

   pub async fn create_relationship(
      &self,
      start: NodeId,
      end: NodeId,
      rel_type: &str,
   ) -> Result<Box<dyn Relationship>> {
      let dc = self.acquire().await?;
      let result = dc
         .lock_conn()
         .await
         .create_relationship(start, end, rel_type)
         .await
         .map_err(Error::from);
      self.finish(dc, result).await
   }

   pub async fn relationship_types(&self) -> Result<Vec<String>> {
      let dc = self.acquire().await?;
      let result = dc
         .lock_conn()
         .await
         .relationship_types()
         .await
         .map_err(Error::from);
      self.finish(dc, result).await
   }

   /// Take a connection, reusing the most recently released idle one or
   /// opening a new one.
   pub(crate) async fn acquire(&self) -> Result<Arc<DriverConn>> {
      {
         let mut state = self.shared.state.lock();
         if state.closed {
            return Err(Error::PoolClosed);
         }
         if let Some(dc) = state.free_conns.pop() {
            dc.set_in_use();
            trace!(conn = dc.id(), "Reusing idle connection");
            return Ok(dc);
         }
      }

      let ci = self.shared.driver.open(&self.shared.dsn).await?;
      let id = self.shared.next_id();
      let dc = Arc::new(DriverConn::new(id, Arc::downgrade(&self.shared), ci));

      let closed = {
         let mut state = self.shared.state.lock();
         state.deps.add(id, Dependent::Conn(id));
         state.closed
      };

      // Pool was closed while the driver was opening
      if closed {
         if let Err(e) = dc.close().await {
            warn!(conn = id, error = %e, "Failed to close connection opened during pool close");
         }
         return Err(Error::PoolClosed);
      }

      debug!(conn = id, driver = %self.shared.driver_name, "Opened backend connection");
      Ok(dc)
   }

   /// Return a connection taken with [`acquire`](Self::acquire).
   ///
   /// Pending on-release work runs first. A bad-connection `err` closes the
   /// connection; otherwise it goes back on the idle list if the pool is open
   /// and under its idle limit, and is closed if not.
   pub(crate) async fn release(&self, dc: Arc<DriverConn>, err: Option<&Error>) -> Result<()> {
      let pending = dc.take_for_release().inspect_err(|_| {
         warn!(conn = dc.id(), "Connection released that was not in use");
      })?;
      for task in pending {
         task.await;
      }

      if err.is_some_and(Error::is_bad_conn) {
         debug!(conn = dc.id(), "Discarding bad connection");
         return dc.close().await;
      }

      let overflow = {
         let mut state = self.shared.state.lock();
         if !state.closed && state.free_conns.len() < max_idle(state.max_idle_conns) {
            trace!(conn = dc.id(), "Connection returned to idle list");
            state.free_conns.push(dc);
            None
         } else {
            Some(dc)
         }
      };

      match overflow {
         Some(dc) => dc.close().await,
         None => Ok(()),
      }
   }

   /// Release `dc` with the outcome of the work done on it.
   ///
   /// The work's own error wins over a release failure.
   pub(crate) async fn finish<T>(&self, dc: Arc<DriverConn>, result: Result<T>) -> Result<T> {
      let released = self.release(dc, result.as_ref().err()).await;
      let value = result?;
      released?;
      Ok(value)
   }

   /// Take `dc` out of the idle list if it is there.
   pub(crate) fn conn_if_free(&self, dc: &Arc<DriverConn>) -> Result<bool> {
      let mut state = self.shared.state.lock();
      if state.closed {
         return Err(Error::PoolClosed);
      }
      match state.free_conns.iter().position(|c| Arc::ptr_eq(c, dc)) {
         Some(i) => {
            let dc = state.free_conns.remove(i);
            dc.set_in_use();
            Ok(true)
         }
         None => Ok(false),
      }
   }

   /// Prepare `query` on an acquired connection and register the statement
   /// as one of its dependents.
   pub(crate) async fn prepare_on(
      &self,
      dc: &Arc<DriverConn>,
      stmt_id: StmtId,
      query: &str,
   ) -> Result<Arc<DriverStmt>> {
      let si = dc.lock_conn().await.prepare(query).await?;
      let ds = Arc::new(DriverStmt::new(stmt_id, si));

      dc.add_open_stmt(Arc::clone(&ds));
      self
         .shared
         .state
         .lock()
         .deps
         .add(dc.id(), Dependent::Stmt(stmt_id));

      Ok(ds)
   }

   /// Drop a dependent of `dc`, finally closing it if that was the last.
   pub(crate) async fn release_dep(&self, dc: &DriverConn, dependent: Dependent) -> Result<()> {
      if self.shared.remove_dep(dc.id(), dependent) {
         dc.final_close().await
      } else {
         Ok(())
      }
   }

   #[cfg(test)]
   pub(crate) fn idle_conns(&self) -> Vec<Arc<DriverConn>> {
      self.shared.state.lock().free_conns.clone()
   }

   #[cfg(test)]
   pub(crate) fn dependents(&self, conn: ConnId) -> usize {
      self.shared.state.lock().deps.dependents(conn)
   }

   #[cfg(test)]
   pub(crate) fn add_dep(&self, conn: ConnId, dependent: Dependent) {
      self.shared.state.lock().deps.add(conn, dependent);
   }
}

impl Drop for PoolShared {
   fn drop(&mut self) {
      let state = self.state.get_mut();
      if state.closed || state.free_conns.is_empty() {
         return;
      }
      state.closed = true;
      let idle = std::mem::take(&mut state.free_conns);

      // Statements and transactions hold a `Pool`, so only idle connections
      // can be left here; with the pool gone their close is final.
      match tokio::runtime::Handle::try_current() {
         Ok(handle) => {
            debug!(driver = %self.driver_name, idle = idle.len(), "Pool dropped without close, closing idle connections");
            handle.spawn(async move {
               if let Err(e) = close_all(idle).await {
                  warn!(error = %e, "Failed to close idle connection of dropped pool");
               }
            });
         }
         Err(_) => {
            warn!(
               driver = %self.driver_name,
               idle = idle.len(),
               "Pool dropped outside a tokio runtime; idle connections are not closed"
            );
         }
      }
   }
}

impl fmt::Debug for Pool {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Pool")
         .field("driver", &self.shared.driver_name)
         .field("stats", &self.stats())
         .finish()
   }
}

/// Close each connection, returning the first error.
async fn close_all(conns: Vec<Arc<DriverConn>>) -> Result<()> {
   let mut first_err = None;
   for dc in conns {
      if let Err(e) = dc.close().await {
         warn!(conn = dc.id(), error = %e, "Failed to close connection");
         first_err.get_or_insert(e);
      }
   }
   first_err.map_or(Ok(()), Err)
}
