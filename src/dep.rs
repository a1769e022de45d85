//! Dependency tracking for deterministic final close
//!
//! A resource (a pooled connection) stays physically open while anything
//! depends on it. Each dependent is registered independently, so the pool's
//! own hold on a connection and an open statement's hold never have to
//! coordinate. Removing the last dependent tells the caller to run the
//! resource's final close, exactly once.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Table of resources to their current dependents.
///
/// Not synchronized; the pool keeps it under its own lock.
#[derive(Debug)]
pub(crate) struct DepSet<R, D> {
   deps: HashMap<R, HashSet<D>>,
}

impl<R, D> Default for DepSet<R, D> {
   fn default() -> Self {
      Self {
         deps: HashMap::new(),
      }
   }
}

impl<R, D> DepSet<R, D>
where
   R: Eq + Hash + Copy + std::fmt::Debug,
   D: Eq + Hash + Copy + std::fmt::Debug,
{
   /// Record that `dependent` keeps `resource` open. Re-adding is a no-op.
   pub(crate) fn add(&mut self, resource: R, dependent: D) {
      self.deps.entry(resource).or_default().insert(dependent);
   }

   /// Drop one dependent of `resource`.
   ///
   /// Returns `true` when that was the last one; the entry is gone and the
   /// caller must perform the final close.
   ///
   /// # Panics
   ///
   /// Panics on a removal with no matching [`add`](Self::add). That is an
   /// internal bookkeeping bug, not a condition to recover from.
   pub(crate) fn remove(&mut self, resource: R, dependent: D) -> bool {
      let Some(set) = self.deps.get_mut(&resource) else {
         panic!("graph: unpaired dependency removal: no dependents for {resource:?}");
      };
      if !set.remove(&dependent) {
         panic!("graph: unpaired dependency removal: {dependent:?} does not depend on {resource:?}");
      }
      if set.is_empty() {
         self.deps.remove(&resource);
         true
      } else {
         false
      }
   }

   #[cfg(test)]
   pub(crate) fn dependents(&self, resource: R) -> usize {
      self.deps.get(&resource).map_or(0, HashSet::len)
   }
}
