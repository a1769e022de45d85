//! Transactions pinned to one pooled connection

use std::sync::Arc;

use graphdb_driver::{ExecResult, Tx, Value};
use tracing::{debug, warn};

use crate::driver_conn::DriverConn;
use crate::pool::Pool;
use crate::rows::QueryResult;
use crate::{Error, Result};

/// A transaction started with [`Pool::begin`].
///
/// Holds its connection until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); after either, every call fails with
/// [`Error::TxDone`].
#[must_use = "if unused, the transaction is rolled back on drop"]
pub struct Transaction {
   pool: Pool,
   /// `None` once the transaction is done
   active: Option<Active>,
   /// A call saw `BadConn`; the connection is discarded when released
   bad_conn: bool,
}

struct Active {
   dc: Arc<DriverConn>,
   tx: Box<dyn Tx>,
}

impl Transaction {
   pub(crate) fn new(pool: Pool, dc: Arc<DriverConn>, tx: Box<dyn Tx>) -> Self {
      debug!(conn = dc.id(), "Transaction started");
      Self {
         pool,
         active: Some(Active { dc, tx }),
         bad_conn: false,
      }
   }

   pub fn is_done(&self) -> bool {
      self.active.is_none()
   }

   pub async fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult> {
      let dc = self.conn()?;
      let result = dc.exec(query, args).await;
      self.note(&result);
      result
   }

   pub async fn query(&mut self, query: &str, args: &[Value]) -> Result<QueryResult> {
      let dc = self.conn()?;
      let result = dc.query(query, args).await;
      self.note(&result);
      result
   }

   /// Commit and return the connection to the pool.
   pub async fn commit(&mut self) -> Result<()> {
      let Active { dc, mut tx } = self.active.take().ok_or(Error::TxDone)?;
      let result = {
         let _ci = dc.lock_conn().await;
         tx.commit().await.map_err(Error::from)
      };
      debug!(conn = dc.id(), ok = result.is_ok(), "Transaction committed");
      release(&self.pool, dc, result, self.bad_conn).await
   }

   /// Roll back and return the connection to the pool.
   pub async fn rollback(&mut self) -> Result<()> {
      let Active { dc, mut tx } = self.active.take().ok_or(Error::TxDone)?;
      let result = {
         let _ci = dc.lock_conn().await;
         tx.rollback().await.map_err(Error::from)
      };
      debug!(conn = dc.id(), ok = result.is_ok(), "Transaction rolled back");
      release(&self.pool, dc, result, self.bad_conn).await
   }

   fn conn(&self) -> Result<Arc<DriverConn>> {
      let active = self.active.as_ref().ok_or(Error::TxDone)?;
      Ok(Arc::clone(&active.dc))
   }

   fn note<T>(&mut self, result: &Result<T>) {
      if result.as_ref().is_err_and(Error::is_bad_conn) {
         self.bad_conn = true;
      }
   }
}

/// Release the transaction's connection with the commit or rollback result,
/// discarding it if any call in the transaction saw `BadConn`.
async fn release(
   pool: &Pool,
   dc: Arc<DriverConn>,
   result: Result<()>,
   bad_conn: bool,
) -> Result<()> {
   if !bad_conn {
      return pool.finish(dc, result).await;
   }

   // Discarded whatever commit or rollback reported; their error still wins
   let bad = Error::from(graphdb_driver::Error::BadConn);
   let released = pool.release(dc, Some(&bad)).await;
   result?;
   released
}

impl std::fmt::Debug for Transaction {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Transaction")
         .field("conn", &self.active.as_ref().map(|a| a.dc.id()))
         .field("done", &self.is_done())
         .finish()
   }
}

impl Drop for Transaction {
   fn drop(&mut self) {
      let Some(Active { dc, mut tx }) = self.active.take() else {
         return;
      };

      warn!(conn = dc.id(), "Transaction dropped without commit or rollback");

      match tokio::runtime::Handle::try_current() {
         Ok(handle) => {
            let pool = self.pool.clone();
            let bad_conn = self.bad_conn;
            handle.spawn(async move {
               let result = {
                  let _ci = dc.lock_conn().await;
                  tx.rollback().await.map_err(Error::from)
               };
               if let Err(e) = release(&pool, dc, result, bad_conn).await {
                  warn!(error = %e, "Failed to release connection of dropped transaction");
               }
            });
         }
         Err(_) => {
            warn!(
               conn = dc.id(),
               "No tokio runtime; dropped transaction's connection is never returned"
            );
         }
      }
   }
}
