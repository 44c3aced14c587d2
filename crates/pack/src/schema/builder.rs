//! Schema builder.
//!
//! Provides a fluent API for constructing schema nodes, with the datatype
//! names Pack users know (`uint8`, `string16`, `Vector3`, `Dictionary`, ...).

use std::sync::Arc;

use super::schema::*;
use crate::marshal::{ObjectMarshaller, Prototype};

/// Builder for constructing schema nodes.
///
/// Nodes are not validated here; [`Pack::define_schema`](crate::Pack::define_schema)
/// validates the whole tree once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaBuilder;

fn fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Vec<Field> {
    fields
        .into_iter()
        .map(|(name, schema)| Field::new(name, schema))
        .collect()
}

#[allow(non_snake_case)]
impl SchemaBuilder {
    pub fn new() -> Self {
        Self
    }

    // ------------------------------------------------------------------
    // Numbers and scalars

    pub fn null(&self) -> Schema {
        Schema::Null
    }

    pub fn boolean(&self) -> Schema {
        Schema::Boolean
    }

    pub fn int8(&self) -> Schema {
        Schema::Int8
    }

    pub fn int16(&self) -> Schema {
        Schema::Int16
    }

    pub fn int32(&self) -> Schema {
        Schema::Int32
    }

    pub fn uint8(&self) -> Schema {
        Schema::UInt8
    }

    pub fn uint16(&self) -> Schema {
        Schema::UInt16
    }

    pub fn uint32(&self) -> Schema {
        Schema::UInt32
    }

    pub fn float32(&self) -> Schema {
        Schema::Float32
    }

    pub fn float64(&self) -> Schema {
        Schema::Float64
    }

    // Aliases

    pub fn Byte(&self) -> Schema {
        self.int8()
    }

    pub fn Short(&self) -> Schema {
        self.int16()
    }

    pub fn Int(&self) -> Schema {
        self.int32()
    }

    pub fn UByte(&self) -> Schema {
        self.uint8()
    }

    pub fn UShort(&self) -> Schema {
        self.uint16()
    }

    pub fn UInt(&self) -> Schema {
        self.uint32()
    }

    pub fn Float(&self) -> Schema {
        self.float32()
    }

    pub fn Double(&self) -> Schema {
        self.float64()
    }

    // ------------------------------------------------------------------
    // Strings and buffers

    pub fn string8(&self) -> Schema {
        Schema::String(WidthClass::W8)
    }

    pub fn string16(&self) -> Schema {
        Schema::String(WidthClass::W16)
    }

    pub fn string32(&self) -> Schema {
        Schema::String(WidthClass::W32)
    }

    pub fn string_fixed(&self, length: usize) -> Schema {
        Schema::FixedString(length)
    }

    pub fn buffer8(&self) -> Schema {
        Schema::Buffer(WidthClass::W8)
    }

    pub fn buffer16(&self) -> Schema {
        Schema::Buffer(WidthClass::W16)
    }

    pub fn buffer32(&self) -> Schema {
        Schema::Buffer(WidthClass::W32)
    }

    pub fn buffer_fixed(&self, length: usize) -> Schema {
        Schema::FixedBuffer(length)
    }

    // ------------------------------------------------------------------
    // Host datatypes

    pub fn DateTime(&self) -> Schema {
        Schema::DateTime
    }

    pub fn Color3(&self) -> Schema {
        Schema::Color3
    }

    pub fn Color3float32(&self) -> Schema {
        Schema::Color3Float32
    }

    pub fn BrickColor(&self) -> Schema {
        Schema::BrickColor
    }

    pub fn EnumItem(&self, def: EnumDef) -> Schema {
        Schema::EnumItem(Arc::new(def))
    }

    pub fn Vector2(&self) -> Schema {
        Schema::Vector2
    }

    pub fn Vector2int16(&self) -> Schema {
        Schema::Vector2Int16
    }

    pub fn Vector3(&self) -> Schema {
        Schema::Vector3
    }

    pub fn Vector3int16(&self) -> Schema {
        Schema::Vector3Int16
    }

    pub fn CFrame(&self) -> Schema {
        Schema::CFrame
    }

    pub fn UDim(&self) -> Schema {
        Schema::UDim
    }

    pub fn UDim2(&self) -> Schema {
        Schema::UDim2
    }

    pub fn Region3(&self) -> Schema {
        Schema::Region3
    }

    pub fn Region3int16(&self) -> Schema {
        Schema::Region3Int16
    }

    pub fn Instance(&self) -> Schema {
        Schema::Instance
    }

    pub fn BitField(&self, length: usize) -> Schema {
        Schema::BitField(length)
    }

    // ------------------------------------------------------------------
    // Structures

    pub fn Array(&self, element: Schema) -> Schema {
        Schema::Array(Box::new(element))
    }

    /// Fields are encoded in the order given.
    pub fn Dictionary<K: Into<String>>(
        &self,
        entries: impl IntoIterator<Item = (K, Schema)>,
    ) -> Schema {
        Schema::Dictionary(fields(entries))
    }

    /// Optional fields get one presence bit each, in the order given.
    pub fn SparseDictionary<K: Into<String>, R: Into<String>>(
        &self,
        optional: impl IntoIterator<Item = (K, Schema)>,
        required: impl IntoIterator<Item = (R, Schema)>,
    ) -> Schema {
        Schema::SparseDictionary {
            optional: fields(optional),
            required: fields(required),
        }
    }

    pub fn Map(&self, key: Schema, value: Schema) -> Schema {
        Schema::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn Nullable(&self, inner: Schema) -> Schema {
        Schema::Nullable(Box::new(inner))
    }

    /// Marshals objects built by `prototype` through the given fields.
    pub fn Object<K: Into<String>>(
        &self,
        prototype: Arc<dyn Prototype>,
        entries: impl IntoIterator<Item = (K, Schema)>,
    ) -> Schema {
        Schema::Object(Arc::new(ObjectMarshaller::new(prototype, fields(entries))))
    }
}
