//! Object marshalling.
//!
//! An object's declared fields are encoded like a `Dictionary`; its behavior
//! never is. On read, the object is rebuilt through the same [`Prototype`]
//! the schema was defined with, then each decoded field is set on it, so the
//! result has its methods back. Writer and reader must agree on the
//! prototype; nothing on the wire can detect a mismatch.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{PackError, Result};
use crate::options::PackOptions;
use crate::pack::Pack;
use crate::reader::Reader;
use crate::references::ReferenceTable;
use crate::schema::Field;
use crate::value::{ObjectRef, Value};
use crate::writer::Writer;

/// An object whose fields can be read and written by name.
pub trait Marshal: Any + Send + Sync + fmt::Debug {
    /// Current value of `name`, or `None` when the object has no such field.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Sets `name` on a freshly constructed object.
    fn set_field(&mut self, name: &str, value: Value) -> std::result::Result<(), String>;

    fn as_any(&self) -> &dyn Any;
}

/// Factory for blank objects of one kind.
pub trait Prototype: Send + Sync {
    fn name(&self) -> &str;

    fn construct(&self) -> Box<dyn Marshal>;
}

/// A prototype bound to the fields that make up its wire form.
pub struct ObjectMarshaller {
    prototype: Arc<dyn Prototype>,
    fields: Vec<Field>,
}

impl fmt::Debug for ObjectMarshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMarshaller")
            .field("prototype", &self.prototype.name())
            .field("fields", &self.fields)
            .finish()
    }
}

impl ObjectMarshaller {
    pub fn new(prototype: Arc<dyn Prototype>, fields: Vec<Field>) -> Self {
        Self { prototype, fields }
    }

    pub fn prototype(&self) -> &Arc<dyn Prototype> {
        &self.prototype
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Reads the declared fields off `object`. Fields the object does not
    /// have come back as `Null`.
    pub fn extract(&self, object: &ObjectRef) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|field| {
                let value = object.0.get_field(&field.name).unwrap_or_default();
                (field.name.clone(), value)
            })
            .collect()
    }

    /// Constructs a blank object and populates it with `entries`.
    pub fn rehydrate(&self, entries: IndexMap<String, Value>) -> Result<ObjectRef> {
        let mut object = self.prototype.construct();
        for (name, value) in entries {
            object
                .set_field(&name, value)
                .map_err(|detail| PackError::Object {
                    prototype: self.prototype.name().to_owned(),
                    detail: format!("field `{name}`: {detail}"),
                })?;
        }
        Ok(ObjectRef(Arc::from(object)))
    }

    /// Encodes `object` with default options and the global reference table.
    /// Use [`ObjectMarshaller::write_in`] to honor a configured [`Pack`].
    pub fn write(&self, object: &ObjectRef) -> Result<Vec<u8>> {
        Writer::new(ReferenceTable::global(), PackOptions::default()).write_object(self, object)
    }

    /// Decodes an object written by [`ObjectMarshaller::write`].
    pub fn read(&self, data: &[u8]) -> Result<ObjectRef> {
        Reader::new(data).read_object(self)
    }

    /// Encodes `object` with the options and reference table of `pack`.
    pub fn write_in(&self, pack: &Pack, object: &ObjectRef) -> Result<Vec<u8>> {
        Writer::new(pack.references(), *pack.options()).write_object(self, object)
    }

    /// Decodes an object with the options and reference table of `pack`.
    pub fn read_in(&self, pack: &Pack, data: &[u8]) -> Result<ObjectRef> {
        Reader::with_context(data, pack.references(), *pack.options()).read_object(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[derive(Debug, Default)]
    struct Counter {
        count: i64,
        label: String,
    }

    impl Counter {
        fn describe(&self) -> String {
            format!("{}={}", self.label, self.count)
        }
    }

    impl Marshal for Counter {
        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "count" => Some(Value::Int(self.count)),
                "label" => Some(Value::from(self.label.as_str())),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> std::result::Result<(), String> {
            match (name, value) {
                ("count", Value::Int(n)) => self.count = n,
                ("label", Value::Str(s)) => self.label = s,
                (name, value) => return Err(format!("cannot set {name} to {}", value.type_name())),
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct CounterPrototype;

    impl Prototype for CounterPrototype {
        fn name(&self) -> &str {
            "Counter"
        }

        fn construct(&self) -> Box<dyn Marshal> {
            Box::new(Counter::default())
        }
    }

    fn marshaller() -> ObjectMarshaller {
        ObjectMarshaller::new(
            Arc::new(CounterPrototype),
            vec![
                Field::new("count", Schema::Int32),
                Field::new("label", Schema::String(crate::schema::WidthClass::W8)),
            ],
        )
    }

    #[test]
    fn test_round_trip_keeps_behavior() {
        let m = marshaller();
        let original = ObjectRef::new(Counter {
            count: 3,
            label: "hits".into(),
        });
        let bytes = m.write(&original).unwrap();
        assert_eq!(bytes.len(), 4 + 1 + 4);
        let copy = m.read(&bytes).unwrap();
        assert_ne!(copy, original);
        assert_eq!(copy.downcast_ref::<Counter>().unwrap().describe(), "hits=3");
    }

    #[test]
    fn test_set_field_error_names_prototype() {
        let m = marshaller();
        let entries = IndexMap::from([("count".to_string(), Value::Bool(true))]);
        let err = m.rehydrate(entries).unwrap_err();
        assert!(matches!(err, PackError::Object { ref prototype, .. } if prototype == "Counter"));
    }
}
