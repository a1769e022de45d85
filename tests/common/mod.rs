//! In-memory graph backend for integration tests.
//!
//! Pools opened on the same DSN share one graph. Only graph operations, ping
//! and a node-count query are supported; everything else goes through the
//! generic path and comes back unsupported.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use graphdb::driver::{
   Conn, Driver, Error, Node, NodeId, Pinger, Properties, Queryer, Relationship, RelationshipId,
   Result, Rows, Value,
};
use parking_lot::Mutex;

pub const COUNT_NODES: &str = "MATCH (n) RETURN count(n) AS count";

static NEXT_NAME: AtomicUsize = AtomicUsize::new(0);

pub fn init_tracing() {
   let _ = tracing_subscriber::fmt()
      .with_test_writer()
      .with_max_level(tracing::Level::DEBUG)
      .try_init();
}

/// Register a fresh in-memory driver and return its name.
pub fn register_mem() -> (String, MemDriver) {
   init_tracing();
   let name = format!("mem-{}", NEXT_NAME.fetch_add(1, Ordering::Relaxed));
   let driver = MemDriver::default();
   graphdb::register(&name, driver.clone());
   (name, driver)
}

#[derive(Clone, Default)]
pub struct MemDriver {
   graphs: Arc<Mutex<HashMap<String, Arc<Mutex<MemGraph>>>>>,
   opens: Arc<AtomicUsize>,
   closes: Arc<AtomicUsize>,
}

impl MemDriver {
   pub fn opens(&self) -> usize {
      self.opens.load(Ordering::SeqCst)
   }

   pub fn closes(&self) -> usize {
      self.closes.load(Ordering::SeqCst)
   }
}

#[async_trait]
impl Driver for MemDriver {
   async fn open(&self, dsn: &str) -> Result<Box<dyn Conn>> {
      if dsn.is_empty() {
         return Err(Error::Message("mem: empty dsn".into()));
      }
      let graph = Arc::clone(self.graphs.lock().entry(dsn.to_string()).or_default());
      self.opens.fetch_add(1, Ordering::SeqCst);
      Ok(Box::new(MemConn {
         graph,
         closes: Arc::clone(&self.closes),
      }))
   }
}

#[derive(Default)]
pub struct MemGraph {
   next_id: i64,
   nodes: BTreeMap<NodeId, Properties>,
   rels: BTreeMap<RelationshipId, MemRel>,
}

#[derive(Clone)]
struct MemRel {
   rel_type: String,
   start: NodeId,
   end: NodeId,
   properties: Properties,
}

struct MemConn {
   graph: Arc<Mutex<MemGraph>>,
   closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Conn for MemConn {
   async fn create_node(&mut self) -> Result<Box<dyn Node>> {
      let id = {
         let mut graph = self.graph.lock();
         graph.next_id += 1;
         let id = graph.next_id;
         graph.nodes.insert(id, Properties::new());
         id
      };
      Ok(Box::new(MemNode {
         id,
         graph: Arc::clone(&self.graph),
      }))
   }

   async fn node(&mut self, id: NodeId) -> Result<Box<dyn Node>> {
      if !self.graph.lock().nodes.contains_key(&id) {
         return Err(Error::NotFound(format!("node {id}")));
      }
      Ok(Box::new(MemNode {
         id,
         graph: Arc::clone(&self.graph),
      }))
   }

   async fn create_relationship(
      &mut self,
      start: NodeId,
      end: NodeId,
      rel_type: &str,
   ) -> Result<Box<dyn Relationship>> {
      let id = {
         let mut graph = self.graph.lock();
         for node in [start, end] {
            if !graph.nodes.contains_key(&node) {
               return Err(Error::NotFound(format!("node {node}")));
            }
         }
         graph.next_id += 1;
         let id = graph.next_id;
         graph.rels.insert(
            id,
            MemRel {
               rel_type: rel_type.to_string(),
               start,
               end,
               properties: Properties::new(),
            },
         );
         id
      };
      Ok(Box::new(MemRelHandle {
         id,
         rel_type: rel_type.to_string(),
         start,
         end,
         graph: Arc::clone(&self.graph),
      }))
   }

   async fn relationship_types(&mut self) -> Result<Vec<String>> {
      let graph = self.graph.lock();
      let mut types: Vec<String> = graph.rels.values().map(|r| r.rel_type.clone()).collect();
      types.sort();
      types.dedup();
      Ok(types)
   }

   fn as_queryer(&mut self) -> Option<&mut dyn Queryer> {
      Some(self)
   }

   fn as_pinger(&mut self) -> Option<&mut dyn Pinger> {
      Some(self)
   }

   async fn close(&mut self) -> Result<()> {
      self.closes.fetch_add(1, Ordering::SeqCst);
      Ok(())
   }
}

#[async_trait]
impl Queryer for MemConn {
   async fn query(&mut self, query: &str, _args: &[Value]) -> Result<Box<dyn Rows>> {
      if query != COUNT_NODES {
         return Err(Error::Skip);
      }
      let count = self.graph.lock().nodes.len() as i64;
      Ok(Box::new(MemRows {
         row: Some(vec![Value::Int(count)]),
      }))
   }
}

#[async_trait]
impl Pinger for MemConn {
   async fn ping(&mut self) -> Result<()> {
      Ok(())
   }
}

struct MemRows {
   row: Option<Vec<Value>>,
}

#[async_trait]
impl Rows for MemRows {
   fn columns(&self) -> Vec<String> {
      vec!["count".into()]
   }

   async fn next(&mut self) -> Result<Option<Vec<Value>>> {
      Ok(self.row.take())
   }

   async fn close(&mut self) -> Result<()> {
      Ok(())
   }
}

struct MemNode {
   id: NodeId,
   graph: Arc<Mutex<MemGraph>>,
}

impl MemNode {
   fn handles(&self, keep: impl Fn(&MemRel) -> bool) -> Vec<Box<dyn Relationship>> {
      let graph = self.graph.lock();
      graph
         .rels
         .iter()
         .filter(|(_, r)| keep(r))
         .map(|(id, r)| {
            Box::new(MemRelHandle {
               id: *id,
               rel_type: r.rel_type.clone(),
               start: r.start,
               end: r.end,
               graph: Arc::clone(&self.graph),
            }) as Box<dyn Relationship>
         })
         .collect()
   }

   fn with_props<T>(&self, f: impl FnOnce(&mut Properties) -> T) -> Result<T> {
      let mut graph = self.graph.lock();
      let props = graph
         .nodes
         .get_mut(&self.id)
         .ok_or_else(|| Error::NotFound(format!("node {}", self.id)))?;
      Ok(f(props))
   }
}

#[async_trait]
impl Node for MemNode {
   fn id(&self) -> NodeId {
      self.id
   }

   async fn set_property(&self, key: &str, value: Value) -> Result<()> {
      self.with_props(|p| {
         p.insert(key.to_string(), value);
      })
   }

   async fn update_properties(&self, properties: Properties) -> Result<()> {
      self.with_props(|p| p.extend(properties))
   }

   async fn properties(&self) -> Result<Properties> {
      self.with_props(|p| p.clone())
   }

   async fn relationships(&self) -> Result<Vec<Box<dyn Relationship>>> {
      Ok(self.handles(|r| r.start == self.id || r.end == self.id))
   }

   async fn incoming_relationships(&self) -> Result<Vec<Box<dyn Relationship>>> {
      Ok(self.handles(|r| r.end == self.id))
   }

   async fn outgoing_relationships(&self) -> Result<Vec<Box<dyn Relationship>>> {
      Ok(self.handles(|r| r.start == self.id))
   }

   async fn typed_relationships(&self, types: &[&str]) -> Result<Vec<Box<dyn Relationship>>> {
      Ok(self.handles(|r| {
         (r.start == self.id || r.end == self.id) && types.contains(&r.rel_type.as_str())
      }))
   }

   async fn delete(&self) -> Result<()> {
      let mut graph = self.graph.lock();
      let id = self.id;
      if graph.rels.values().any(|r| r.start == id || r.end == id) {
         return Err(Error::Message(format!("mem: node {id} still has relationships")));
      }
      graph
         .nodes
         .remove(&id)
         .map(|_| ())
         .ok_or_else(|| Error::NotFound(format!("node {id}")))
   }
}

struct MemRelHandle {
   id: RelationshipId,
   rel_type: String,
   start: NodeId,
   end: NodeId,
   graph: Arc<Mutex<MemGraph>>,
}

impl MemRelHandle {
   fn with_props<T>(&self, f: impl FnOnce(&mut Properties) -> T) -> Result<T> {
      let mut graph = self.graph.lock();
      let rel = graph
         .rels
         .get_mut(&self.id)
         .ok_or_else(|| Error::NotFound(format!("relationship {}", self.id)))?;
      Ok(f(&mut rel.properties))
   }
}

#[async_trait]
impl Relationship for MemRelHandle {
   fn id(&self) -> RelationshipId {
      self.id
   }

   fn rel_type(&self) -> &str {
      &self.rel_type
   }

   fn start_node(&self) -> NodeId {
      self.start
   }

   fn end_node(&self) -> NodeId {
      self.end
   }

   async fn set_property(&self, key: &str, value: Value) -> Result<()> {
      self.with_props(|p| {
         p.insert(key.to_string(), value);
      })
   }

   async fn set_properties(&self, properties: Properties) -> Result<()> {
      self.with_props(|p| *p = properties)
   }

   async fn property(&self, key: &str) -> Result<Option<Value>> {
      self.with_props(|p| p.get(key).cloned())
   }

   async fn properties(&self) -> Result<Properties> {
      self.with_props(|p| p.clone())
   }

   async fn remove_property(&self, key: &str) -> Result<()> {
      self.with_props(|p| {
         p.shift_remove(key);
      })
   }

   async fn remove_properties(&self) -> Result<()> {
      self.with_props(|p| p.clear())
   }

   async fn delete(&self) -> Result<()> {
      self
         .graph
         .lock()
         .rels
         .remove(&self.id)
         .map(|_| ())
         .ok_or_else(|| Error::NotFound(format!("relationship {}", self.id)))
   }
}
