//! Configuration for graph connection pools

/// Idle connections kept when `max_idle_conns` is 0
pub const DEFAULT_MAX_IDLE_CONNS: usize = 2;

/// Configuration for a [`Pool`](crate::Pool)
///
/// # Examples
///
/// ```
/// use graphdb::PoolConfig;
///
/// // Use defaults
/// let config = PoolConfig::default();
///
/// // Keep up to 8 idle connections
/// let config = PoolConfig { max_idle_conns: 8 };
///
/// // Never keep idle connections; close each one on release
/// let config = PoolConfig { max_idle_conns: -1 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
   /// Maximum number of idle connections kept for reuse
   ///
   /// - `0`: use [`DEFAULT_MAX_IDLE_CONNS`]
   /// - negative: keep none; every released connection is closed
   ///
   /// Default: 0
   pub max_idle_conns: i32,
}

impl Default for PoolConfig {
   fn default() -> Self {
      Self { max_idle_conns: 0 }
   }
}

impl PoolConfig {
   /// The idle limit after applying the 0 and negative conventions.
   pub fn max_idle(&self) -> usize {
      max_idle(self.max_idle_conns)
   }
}

pub(crate) fn max_idle(n: i32) -> usize {
   match n {
      0 => DEFAULT_MAX_IDLE_CONNS,
      n if n < 0 => 0,
      n => n as usize,
   }
}
