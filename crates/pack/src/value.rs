//! The dynamic value tree Pack writes and reads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::marshal::Marshal;
use crate::references::Instance;
use crate::types::*;

/// Shared handle to a marshalled object. Compares by identity.
#[derive(Clone)]
pub struct ObjectRef(pub Arc<dyn Marshal>);

impl ObjectRef {
    pub fn new<T: Marshal>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Borrows the object as its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Shared handle to a host instance. Compares by identity.
#[derive(Clone)]
pub struct InstanceRef(pub Arc<dyn Instance>);

impl InstanceRef {
    pub fn new<T: Instance>(instance: T) -> Self {
        Self(Arc::new(instance))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Stable identity key for the lifetime of the instance.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// A runtime value.
///
/// Dictionaries compare without regard to key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Buffer(Vec<u8>),
    BitField(Vec<bool>),
    Vector2(Vector2),
    Vector2Int16(Vector2Int16),
    Vector3(Vector3),
    Vector3Int16(Vector3Int16),
    CFrame(CFrame),
    Color3(Color3),
    BrickColor(u16),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    /// Item name within the schema's enum.
    EnumItem(String),
    UDim(UDim),
    UDim2(UDim2),
    Region3(Region3),
    Region3Int16(Region3Int16),
    Array(Vec<Value>),
    Dictionary(IndexMap<String, Value>),
    Map(Vec<(Value, Value)>),
    Object(ObjectRef),
    Instance(Option<InstanceRef>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Buffer(_) => "buffer",
            Value::BitField(_) => "bit field",
            Value::Vector2(_) => "Vector2",
            Value::Vector2Int16(_) => "Vector2int16",
            Value::Vector3(_) => "Vector3",
            Value::Vector3Int16(_) => "Vector3int16",
            Value::CFrame(_) => "CFrame",
            Value::Color3(_) => "Color3",
            Value::BrickColor(_) => "BrickColor",
            Value::DateTime(_) => "DateTime",
            Value::EnumItem(_) => "EnumItem",
            Value::UDim(_) => "UDim",
            Value::UDim2(_) => "UDim2",
            Value::Region3(_) => "Region3",
            Value::Region3Int16(_) => "Region3int16",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Instance(_) => "Instance",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Builds a dictionary from `(name, value)` pairs.
    pub fn dictionary<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Dictionary(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dictionary(fields) => fields.get(key),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Buffer(v)
    }
}

impl From<Vector3> for Value {
    fn from(v: Vector3) -> Self {
        Value::Vector3(v)
    }
}

impl From<CFrame> for Value {
    fn from(v: CFrame) -> Self {
        Value::CFrame(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl From<InstanceRef> for Value {
    fn from(v: InstanceRef) -> Self {
        Value::Instance(Some(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_equality_ignores_order() {
        let a = Value::dictionary([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let b = Value::dictionary([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }

    #[test]
    fn test_int_reads_as_float() {
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Float(2.0).as_i64(), None);
    }
}
