//! Error types for graphdb-driver

use thiserror::Error;

/// Errors a backend driver reports to the pool.
///
/// Two variants are sentinels with pool-level meaning rather than backend
/// failures: [`Error::Skip`] and [`Error::BadConn`]. Everything else is
/// propagated unchanged to whoever called into the pool.
#[derive(Error, Debug)]
pub enum Error {
   /// Returned by an optional fast-path capability (see
   /// [`Execer`](crate::Execer), [`Queryer`](crate::Queryer)) to signal that
   /// the fast path is unavailable for this call. The pool then proceeds as
   /// if the capability were not implemented.
   ///
   /// Only honored where explicitly documented.
   #[error("driver: skip fast-path; continue as if unimplemented")]
   Skip,

   /// The connection is in a bad state (for example the server closed it)
   /// and must not be reused.
   ///
   /// A driver must only return this when it is certain the backend never
   /// performed the requested operation. If there is any chance the server
   /// executed it, return the backend error instead, even if the server
   /// reported a failure; callers may retry on a fresh connection after
   /// seeing `BadConn`.
   #[error("driver: bad connection")]
   BadConn,

   /// The backend does not implement an optional operation
   #[error("driver: operation not supported: {0}")]
   Unsupported(&'static str),

   /// A node, relationship or other addressed entity does not exist
   #[error("driver: not found: {0}")]
   NotFound(String),

   /// Backend-specific failure with its original source
   #[error("driver: {0}")]
   Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

   /// Backend-specific failure described only by a message
   #[error("driver: {0}")]
   Message(String),
}

impl Error {
   /// Wrap any backend error.
   pub fn backend<E>(err: E) -> Self
   where
      E: std::error::Error + Send + Sync + 'static,
   {
      Error::Backend(Box::new(err))
   }

   /// True for the skip-fast-path sentinel.
   pub fn is_skip(&self) -> bool {
      matches!(self, Error::Skip)
   }

   /// True for the bad-connection sentinel.
   pub fn is_bad_conn(&self) -> bool {
      matches!(self, Error::BadConn)
   }
}

/// A type alias for Results with the driver Error type
pub type Result<T> = std::result::Result<T, Error>;
