//! Schema registration.

use std::sync::Arc;

use crate::error::{Result, SchemaError};
use crate::options::PackOptions;
use crate::reader::Reader;
use crate::references::ReferenceTable;
use crate::schema::{validate_schema, Schema};
use crate::value::Value;
use crate::writer::Writer;

/// Entry point: validates schemas and hands out [`PackSchema`] handles.
#[derive(Debug, Clone)]
pub struct Pack {
    options: PackOptions,
    references: Arc<ReferenceTable>,
}

impl Default for Pack {
    fn default() -> Self {
        Self::new()
    }
}

impl Pack {
    /// Default options, global reference table.
    pub fn new() -> Self {
        Self {
            options: PackOptions::default(),
            references: Arc::clone(ReferenceTable::global()),
        }
    }

    pub fn with_options(mut self, options: PackOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses a private reference table instead of the global one.
    pub fn with_references(mut self, references: Arc<ReferenceTable>) -> Self {
        self.references = references;
        self
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    pub fn references(&self) -> &Arc<ReferenceTable> {
        &self.references
    }

    /// Validates `root` and freezes it into a reusable handle.
    pub fn define_schema(&self, root: Schema) -> Result<PackSchema, SchemaError> {
        validate_schema(&root)?;
        tracing::debug!(
            kind = root.kind_name(),
            fixed_size = ?root.fixed_size(),
            "defined schema"
        );
        Ok(PackSchema {
            root: Arc::new(root),
            options: self.options,
            references: Arc::clone(&self.references),
        })
    }
}

/// A validated schema. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct PackSchema {
    root: Arc<Schema>,
    options: PackOptions,
    references: Arc<ReferenceTable>,
}

impl PackSchema {
    pub fn schema(&self) -> &Schema {
        &self.root
    }

    /// Encoded size when it does not depend on the value.
    pub fn fixed_size(&self) -> Option<usize> {
        self.root.fixed_size()
    }

    fn writer(&self) -> Writer<'_> {
        Writer::new(&self.references, self.options)
    }

    /// Encodes `value`. Blocks while fresh instances are tagged.
    pub fn write(&self, value: &Value) -> Result<Vec<u8>> {
        self.writer().write(&self.root, value)
    }

    pub async fn write_async(&self, value: &Value) -> Result<Vec<u8>> {
        self.writer().write_async(&self.root, value).await
    }

    pub fn read(&self, data: &[u8]) -> Result<Value> {
        Reader::with_context(data, &self.references, self.options).read(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn test_define_rejects_invalid_schema() {
        let s = SchemaBuilder::new();
        let err = Pack::new().define_schema(s.buffer_fixed(0)).unwrap_err();
        assert_eq!(err, SchemaError::NonPositiveLength { path: "$".into() });
    }

    #[test]
    fn test_handle_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PackSchema>();
    }

    #[test]
    fn test_fixed_size() {
        let s = SchemaBuilder::new();
        let pack = Pack::new();
        let fixed = pack.define_schema(s.Dictionary([("a", s.uint8()), ("b", s.Vector3())])).unwrap();
        assert_eq!(fixed.fixed_size(), Some(13));
        let variable = pack.define_schema(s.Array(s.uint8())).unwrap();
        assert_eq!(variable.fixed_size(), None);
    }

    #[test]
    fn test_round_trip_through_handle() {
        let s = SchemaBuilder::new();
        let schema = Pack::new()
            .with_references(Arc::new(ReferenceTable::new()))
            .define_schema(s.Map(s.string8(), s.uint32()))
            .unwrap();
        let value = Value::Map(vec![(Value::from("a"), Value::Int(1)), (Value::from("b"), Value::Int(2))]);
        let bytes = schema.write(&value).unwrap();
        assert_eq!(schema.read(&bytes).unwrap(), value);
    }
}
