//! Values exchanged between the pool and a driver

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A value that every driver must be able to handle, as a property value,
/// a statement argument, or a column in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
   Null,
   Bool(bool),
   Int(i64),
   Float(f64),
   Bytes(Vec<u8>),
   String(String),
   Time(OffsetDateTime),
}

/// Property map of a node or relationship, in insertion order
pub type Properties = IndexMap<String, Value>;

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   pub fn as_i64(&self) -> Option<i64> {
      match self {
         Value::Int(v) => Some(*v),
         _ => None,
      }
   }

   pub fn as_f64(&self) -> Option<f64> {
      match self {
         Value::Float(v) => Some(*v),
         Value::Int(v) => Some(*v as f64),
         _ => None,
      }
   }

   pub fn as_bool(&self) -> Option<bool> {
      match self {
         Value::Bool(v) => Some(*v),
         _ => None,
      }
   }

   pub fn as_str(&self) -> Option<&str> {
      match self {
         Value::String(v) => Some(v),
         _ => None,
      }
   }

   /// Convert to JSON.
   ///
   /// Bytes become an array of numbers and times an RFC 3339 string; a time
   /// that cannot be formatted maps to `null`. Non-finite floats also map to
   /// `null` since JSON has no representation for them.
   pub fn to_json(&self) -> JsonValue {
      match self {
         Value::Null => JsonValue::Null,
         Value::Bool(v) => JsonValue::Bool(*v),
         Value::Int(v) => JsonValue::from(*v),
         Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
         Value::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
         Value::String(v) => JsonValue::String(v.clone()),
         Value::Time(v) => v
            .format(&Rfc3339)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
      }
   }
}

impl Serialize for Value {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      self.to_json().serialize(serializer)
   }
}

impl From<JsonValue> for Value {
   /// Arrays and objects have no native representation and are stored as
   /// their JSON text.
   fn from(json: JsonValue) -> Self {
      match json {
         JsonValue::Null => Value::Null,
         JsonValue::Bool(v) => Value::Bool(v),
         JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
         },
         JsonValue::String(s) => Value::String(s),
         other @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::String(other.to_string()),
      }
   }
}

macro_rules! impl_from {
   ($($ty:ty => $variant:ident),* $(,)?) => {
      $(
         impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
               Value::$variant(v.into())
            }
         }
      )*
   };
}

impl_from! {
   bool => Bool,
   i32 => Int,
   i64 => Int,
   u32 => Int,
   f32 => Float,
   f64 => Float,
   Vec<u8> => Bytes,
   String => String,
   &str => String,
   OffsetDateTime => Time,
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(v: Option<T>) -> Self {
      v.map(Into::into).unwrap_or(Value::Null)
   }
}
