//! Error types for graphdb

use thiserror::Error;

/// Errors surfaced by the pool and its handles.
///
/// Driver failures, including the [`BadConn`](graphdb_driver::Error::BadConn)
/// sentinel, pass through unchanged in [`Error::Driver`].
#[derive(Error, Debug)]
pub enum Error {
   /// No driver has been registered under this name
   #[error("graph: unknown driver {0:?} (forgotten register?)")]
   UnknownDriver(String),

   /// The pool has been closed and cannot be used
   #[error("graph: database is closed")]
   PoolClosed,

   /// A connection was logically closed twice
   #[error("graph: duplicate driver connection close")]
   DuplicateClose,

   /// A connection was released that was not in use
   #[error("graph: connection returned that was never out")]
   ConnNotInUse,

   /// The statement has been closed
   #[error("graph: statement is closed")]
   StmtClosed,

   /// The transaction has already been committed or rolled back
   #[error("graph: transaction has already been committed or rolled back")]
   TxDone,

   /// Argument count does not match the statement's placeholders
   #[error("graph: expected {expected} arguments, got {got}")]
   ArgumentCount { expected: usize, got: usize },

   /// Error reported by the backend driver
   #[error(transparent)]
   Driver(#[from] graphdb_driver::Error),
}

impl Error {
   /// True if the backend flagged the connection as unusable.
   pub fn is_bad_conn(&self) -> bool {
      matches!(self, Error::Driver(e) if e.is_bad_conn())
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::UnknownDriver(_) => "UNKNOWN_DRIVER".to_string(),
         Error::PoolClosed => "POOL_CLOSED".to_string(),
         Error::DuplicateClose => "DUPLICATE_CLOSE".to_string(),
         Error::ConnNotInUse => "CONN_NOT_IN_USE".to_string(),
         Error::StmtClosed => "STMT_CLOSED".to_string(),
         Error::TxDone => "TX_DONE".to_string(),
         Error::ArgumentCount { .. } => "ARGUMENT_COUNT".to_string(),
         Error::Driver(e) => match e {
            graphdb_driver::Error::BadConn => "BAD_CONN".to_string(),
            graphdb_driver::Error::Skip => "SKIP".to_string(),
            graphdb_driver::Error::Unsupported(_) => "UNSUPPORTED".to_string(),
            graphdb_driver::Error::NotFound(_) => "NOT_FOUND".to_string(),
            _ => "DRIVER_ERROR".to_string(),
         },
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
