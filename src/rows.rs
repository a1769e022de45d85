//! Draining driver rows into owned query results

use graphdb_driver::{Rows, Value};
use indexmap::IndexMap;
use serde::Serialize;

use crate::Result;

/// Rows returned by a query, fully read from the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
   /// Column names in the order the driver reported them.
   pub columns: Vec<String>,
   /// One map per row, keyed by column name in column order.
   pub rows: Vec<IndexMap<String, Value>>,
}

impl QueryResult {
   pub fn len(&self) -> usize {
      self.rows.len()
   }

   pub fn is_empty(&self) -> bool {
      self.rows.is_empty()
   }
}

/// Read every row, then close the driver rows whether or not reading failed.
pub(crate) async fn collect_rows(mut rows: Box<dyn Rows>) -> Result<QueryResult> {
   let result = drain(rows.as_mut()).await;
   let closed = rows.close().await;
   let value = result?;
   closed?;
   Ok(value)
}

async fn drain(rows: &mut dyn Rows) -> Result<QueryResult> {
   let columns = rows.columns();
   let mut out = Vec::new();

   while let Some(values) = rows.next().await? {
      let mut row = IndexMap::with_capacity(columns.len());
      for (column, value) in columns.iter().zip(values) {
         row.insert(column.clone(), value);
      }
      out.push(row);
   }

   Ok(QueryResult { columns, rows: out })
}
