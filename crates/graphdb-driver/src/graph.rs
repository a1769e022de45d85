//! Node and relationship handles returned by a connection

use async_trait::async_trait;

use crate::{Properties, Result, Value};

/// Backend identifier of a node
pub type NodeId = i64;

/// Backend identifier of a relationship
pub type RelationshipId = i64;

/// A node in the backend graph.
///
/// Handles are self-contained: they stay usable after the connection that
/// produced them has been handed back to the pool, so an implementation must
/// not borrow that connection's session state.
#[async_trait]
pub trait Node: Send + Sync {
   fn id(&self) -> NodeId;

   /// Set a single property, replacing any previous value.
   async fn set_property(&self, key: &str, value: Value) -> Result<()>;

   /// Merge `properties` into the node's properties.
   async fn update_properties(&self, properties: Properties) -> Result<()>;

   async fn properties(&self) -> Result<Properties>;

   /// All relationships touching this node, in either direction.
   async fn relationships(&self) -> Result<Vec<Box<dyn Relationship>>>;

   async fn incoming_relationships(&self) -> Result<Vec<Box<dyn Relationship>>>;

   async fn outgoing_relationships(&self) -> Result<Vec<Box<dyn Relationship>>>;

   /// Relationships touching this node whose type is one of `types`.
   async fn typed_relationships(&self, types: &[&str]) -> Result<Vec<Box<dyn Relationship>>>;

   async fn delete(&self) -> Result<()>;
}

/// A typed, directed relationship between two nodes.
#[async_trait]
pub trait Relationship: Send + Sync {
   fn id(&self) -> RelationshipId;

   fn rel_type(&self) -> &str;

   fn start_node(&self) -> NodeId;

   fn end_node(&self) -> NodeId;

   async fn set_property(&self, key: &str, value: Value) -> Result<()>;

   /// Replace all properties with `properties`.
   async fn set_properties(&self, properties: Properties) -> Result<()>;

   /// A single property, `None` if unset.
   async fn property(&self, key: &str) -> Result<Option<Value>>;

   async fn properties(&self) -> Result<Properties>;

   async fn remove_property(&self, key: &str) -> Result<()>;

   /// Remove every property.
   async fn remove_properties(&self) -> Result<()>;

   async fn delete(&self) -> Result<()>;
}
