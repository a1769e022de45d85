//! Process-wide driver registry
//!
//! Drivers are registered once, typically during startup before any pool is
//! opened, and looked up on every [`Pool::open`](crate::Pool::open). Entries
//! are never removed or replaced, so a lookup either sees a fully registered
//! driver or none at all.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use graphdb_driver::Driver;
use parking_lot::RwLock;
use tracing::debug;

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> =
   LazyLock::new(|| RwLock::new(HashMap::new()));

/// Make a driver available under `name`.
///
/// # Panics
///
/// Panics if `name` is empty or a driver is already registered under it.
/// Either is a programming error that should surface at startup.
pub fn register<D>(name: &str, driver: D)
where
   D: Driver + 'static,
{
   assert!(!name.is_empty(), "graph: Register called with an empty name");

   let mut drivers = DRIVERS.write();
   if drivers.contains_key(name) {
      panic!("graph: Register called twice for driver {name}");
   }
   drivers.insert(name.to_string(), Arc::new(driver));
   debug!(driver = name, "Registered driver");
}

/// Names of all registered drivers, sorted.
pub fn drivers() -> Vec<String> {
   let mut names: Vec<String> = DRIVERS.read().keys().cloned().collect();
   names.sort();
   names
}

pub(crate) fn lookup(name: &str) -> Option<Arc<dyn Driver>> {
   DRIVERS.read().get(name).cloned()
}
