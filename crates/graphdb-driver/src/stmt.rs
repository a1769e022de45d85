//! Prepared statements, result rows and transactions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, Value};

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
   /// Number of entities created, updated or deleted.
   pub rows_affected: u64,
   /// Identifier generated by the backend, if the statement created one.
   pub last_insert_id: Option<i64>,
}

/// A prepared statement, bound to the connection that prepared it and never
/// used by more than one task at a time.
#[async_trait]
pub trait Stmt: Send {
   /// Number of placeholder arguments, or `None` if the driver can't tell.
   ///
   /// When `Some`, the pool rejects calls with a different argument count
   /// before reaching the driver.
   fn num_input(&self) -> Option<usize>;

   async fn exec(&mut self, args: &[Value]) -> Result<ExecResult>;

   async fn query(&mut self, args: &[Value]) -> Result<Box<dyn Rows>>;

   async fn close(&mut self) -> Result<()>;
}

/// Iterator over the rows of a query result.
#[async_trait]
pub trait Rows: Send {
   fn columns(&self) -> Vec<String>;

   /// The next row, with one value per column, or `None` when exhausted.
   async fn next(&mut self) -> Result<Option<Vec<Value>>>;

   async fn close(&mut self) -> Result<()>;
}

/// A backend transaction.
#[async_trait]
pub trait Tx: Send {
   async fn commit(&mut self) -> Result<()>;

   async fn rollback(&mut self) -> Result<()>;
}
