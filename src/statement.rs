//! Prepared statements that follow the pool's connections

use std::sync::Arc;

use futures::FutureExt;
use graphdb_driver::{ExecResult, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::driver_conn::{Dependent, DriverConn, DriverStmt, StmtId};
use crate::pool::Pool;
use crate::rows::QueryResult;
use crate::{Error, Result};

/// A statement prepared through a [`Pool`].
///
/// A statement is not tied to one connection. Each execution takes a free
/// connection it was already prepared on, or prepares itself again on
/// whatever connection the pool hands out. Every backend statement keeps its
/// connection from being physically closed until the backend statement has
/// been closed, even if the pool has discarded the connection in the
/// meantime.
///
/// Call [`close`](Self::close) when done. A statement dropped without
/// closing schedules the cleanup on the current tokio runtime.
///
/// Clones share the same backend statements.
#[derive(Clone)]
pub struct Statement {
   inner: Arc<StatementInner>,
}

struct StatementInner {
   id: StmtId,
   pool: Pool,
   query: String,
   state: Mutex<StatementState>,
}

#[derive(Default)]
struct StatementState {
   closed: bool,
   css: Vec<ConnStmt>,
}

/// A backend statement and the connection it was prepared on.
#[derive(Clone)]
struct ConnStmt {
   dc: Arc<DriverConn>,
   ds: Arc<DriverStmt>,
}

impl Statement {
   pub(crate) fn new(
      pool: Pool,
      id: StmtId,
      query: &str,
      dc: Arc<DriverConn>,
      ds: Arc<DriverStmt>,
   ) -> Self {
      Self {
         inner: Arc::new(StatementInner {
            id,
            pool,
            query: query.to_string(),
            state: Mutex::new(StatementState {
               closed: false,
               css: vec![ConnStmt { dc, ds }],
            }),
         }),
      }
   }

   pub fn query_text(&self) -> &str {
      &self.inner.query
   }

   /// Execute with `args`, returning no rows.
   pub async fn exec(&self, args: &[Value]) -> Result<ExecResult> {
      let cs = self.conn_stmt().await?;
      let result = {
         let _ci = cs.dc.lock_conn().await;
         cs.ds.exec(args).await
      };
      self.inner.pool.finish(cs.dc, result).await
   }

   /// Execute with `args` and read all rows.
   pub async fn query(&self, args: &[Value]) -> Result<QueryResult> {
      let cs = self.conn_stmt().await?;
      let result = {
         let _ci = cs.dc.lock_conn().await;
         cs.ds.query(args).await
      };
      self.inner.pool.finish(cs.dc, result).await
   }

   /// Close every backend statement.
   ///
   /// Backend statements on connections that are busy are closed when those
   /// connections are released. Closing twice is a no-op.
   pub async fn close(&self) -> Result<()> {
      let css = {
         let mut state = self.inner.state.lock();
         if state.closed {
            return Ok(());
         }
         state.closed = true;
         std::mem::take(&mut state.css)
      };

      debug!(stmt = self.inner.id, conns = css.len(), "Closing statement");
      release_all(&self.inner.pool, self.inner.id, css).await
   }

   /// Pick a connection for one execution, with this statement prepared on it.
   ///
   /// The returned connection is in use and must be released by the caller.
   async fn conn_stmt(&self) -> Result<ConnStmt> {
      let pool = &self.inner.pool;

      let (live, dead) = {
         let mut state = self.inner.state.lock();
         if state.closed {
            return Err(Error::StmtClosed);
         }
         let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut state.css)
            .into_iter()
            .partition(|cs| cs.dc.is_closed());
         state.css = live.clone();
         (live, dead)
      };

      // Connections the pool has discarded since the last execution
      if let Err(e) = release_all(pool, self.inner.id, dead).await {
         warn!(stmt = self.inner.id, error = %e, "Failed to release statement on closed connection");
      }

      for cs in live {
         if pool.conn_if_free(&cs.dc)? {
            return Ok(cs);
         }
      }

      // Every known connection is busy; prepare on another one
      let dc = pool.acquire().await?;
      if let Some(cs) = self.find(&dc) {
         return Ok(cs);
      }

      let ds = match pool.prepare_on(&dc, self.inner.id, &self.inner.query).await {
         Ok(ds) => ds,
         Err(e) => return pool.finish(dc, Err(e)).await,
      };
      let cs = ConnStmt { dc, ds };

      let closed = {
         let mut state = self.inner.state.lock();
         if !state.closed {
            state.css.push(cs.clone());
         }
         state.closed
      };

      // Statement was closed while preparing
      if closed {
         let released = release_conn_stmt(pool, self.inner.id, cs.clone()).await;
         pool.release(cs.dc, None).await?;
         released?;
         return Err(Error::StmtClosed);
      }

      debug!(stmt = self.inner.id, conn = cs.dc.id(), "Statement prepared on another connection");
      Ok(cs)
   }

   fn find(&self, dc: &Arc<DriverConn>) -> Option<ConnStmt> {
      self
         .inner
         .state
         .lock()
         .css
         .iter()
         .find(|cs| Arc::ptr_eq(&cs.dc, dc))
         .cloned()
   }

   #[cfg(test)]
   fn conn_count(&self) -> usize {
      self.inner.state.lock().css.len()
   }
}

impl std::fmt::Debug for Statement {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Statement")
         .field("id", &self.inner.id)
         .field("query", &self.inner.query)
         .finish()
   }
}

impl Drop for StatementInner {
   fn drop(&mut self) {
      let state = self.state.get_mut();
      if state.closed {
         return;
      }
      state.closed = true;
      let css = std::mem::take(&mut state.css);

      match tokio::runtime::Handle::try_current() {
         Ok(handle) => {
            debug!(stmt = self.id, "Statement dropped without close, closing in background");
            let pool = self.pool.clone();
            let id = self.id;
            handle.spawn(async move {
               if let Err(e) = release_all(&pool, id, css).await {
                  warn!(stmt = id, error = %e, "Failed to close dropped statement");
               }
            });
         }
         Err(_) => {
            warn!(
               stmt = self.id,
               "Statement dropped outside a tokio runtime; its connections stay open"
            );
         }
      }
   }
}

/// Release each pair, returning the first error.
async fn release_all(pool: &Pool, id: StmtId, css: Vec<ConnStmt>) -> Result<()> {
   let mut first_err = None;
   for cs in css {
      if let Err(e) = release_conn_stmt(pool, id, cs).await {
         first_err.get_or_insert(e);
      }
   }
   first_err.map_or(Ok(()), Err)
}

/// Close one backend statement and drop its hold on the connection.
///
/// If the connection is in use the work is queued for its next release, so
/// the backend statement is never closed under a running call.
async fn release_conn_stmt(pool: &Pool, id: StmtId, cs: ConnStmt) -> Result<()> {
   cs.dc.remove_open_stmt(id);

   let deferred = {
      let task_pool = pool.clone();
      let task_cs = cs.clone();
      cs.dc.defer_if_in_use(move || {
         async move {
            if let Err(e) = close_conn_stmt(&task_pool, id, &task_cs).await {
               warn!(stmt = id, conn = task_cs.dc.id(), error = %e, "Deferred statement close failed");
            }
         }
         .boxed()
      })
   };

   if deferred {
      debug!(stmt = id, conn = cs.dc.id(), "Connection busy, statement close deferred to release");
      Ok(())
   } else {
      close_conn_stmt(pool, id, &cs).await
   }
}

async fn close_conn_stmt(pool: &Pool, id: StmtId, cs: &ConnStmt) -> Result<()> {
   let closed = {
      let _ci = cs.dc.lock_conn().await;
      cs.ds.close().await
   };
   let released = pool.release_dep(&cs.dc, Dependent::Stmt(id)).await;
   closed?;
   released
}
