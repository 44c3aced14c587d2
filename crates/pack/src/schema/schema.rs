use std::sync::Arc;

use crate::marshal::ObjectMarshaller;

/// Length-prefix width of a variable buffer or string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthClass {
    W8,
    W16,
    W32,
}

impl WidthClass {
    /// Bytes taken by the length prefix.
    pub fn prefix_len(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
        }
    }

    /// Largest payload length the prefix can express.
    pub fn max_len(self) -> usize {
        match self {
            Self::W8 => u8::MAX as usize,
            Self::W16 => u16::MAX as usize,
            Self::W32 => u32::MAX as usize,
        }
    }
}

/// One item of an [`EnumDef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItemDef {
    pub name: String,
    pub value: u16,
}

/// A named enum. Items are encoded by their value, not their position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub items: Vec<EnumItemDef>,
}

impl EnumDef {
    /// An enum from `(item, value)` pairs.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        items: impl IntoIterator<Item = (S, u16)>,
    ) -> Self {
        Self {
            name: name.into(),
            items: items
                .into_iter()
                .map(|(name, value)| EnumItemDef {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }

    /// An enum whose items are valued `0, 1, 2, ...` in the order given.
    pub fn sequential<S: Into<String>>(
        name: impl Into<String>,
        items: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            items: items
                .into_iter()
                .enumerate()
                .map(|(i, name)| EnumItemDef {
                    name: name.into(),
                    value: i as u16,
                })
                .collect(),
        }
    }

    /// 1 byte when every value fits in a `u8`, 2 otherwise.
    pub fn width(&self) -> usize {
        match self.items.iter().map(|item| item.value).max() {
            Some(max) if max > u8::MAX as u16 => 2,
            _ => 1,
        }
    }

    pub fn value_of(&self, item: &str) -> Option<u16> {
        self.items.iter().find(|i| i.name == item).map(|i| i.value)
    }

    pub fn item_of(&self, value: u16) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.value == value)
            .map(|i| i.name.as_str())
    }
}

/// A named field of a dictionary-like node.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Element/pair count bound of arrays and maps (u16 prefix).
pub const MAX_COLLECTION_LEN: usize = u16::MAX as usize;

/// CFrame with an axis-aligned rotation.
pub const CFRAME_AXIS_ALIGNED_SIZE: usize = 13;
/// CFrame with an arbitrary rotation (packed quaternion).
pub const CFRAME_QUATERNION_SIZE: usize = 19;

/// Binary shape of a value.
///
/// Nodes are built once (see [`SchemaBuilder`](super::SchemaBuilder)) and
/// shared read-only by every write and read.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Zero bytes.
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    Float32,
    Float64,
    /// Unix milliseconds as an `i64`.
    DateTime,
    /// 24-bit RGB.
    Color3,
    Color3Float32,
    BrickColor,
    EnumItem(Arc<EnumDef>),
    Vector2,
    Vector2Int16,
    Vector3,
    Vector3Int16,
    CFrame,
    UDim,
    UDim2,
    Region3,
    Region3Int16,
    Buffer(WidthClass),
    String(WidthClass),
    FixedBuffer(usize),
    FixedString(usize),
    /// Packed booleans, LSB-first.
    BitField(usize),
    Array(Box<Schema>),
    Dictionary(Vec<Field>),
    SparseDictionary {
        optional: Vec<Field>,
        required: Vec<Field>,
    },
    Map {
        key: Box<Schema>,
        value: Box<Schema>,
    },
    Nullable(Box<Schema>),
    Object(Arc<ObjectMarshaller>),
    /// 4-byte reference tag.
    Instance,
}

impl Schema {
    /// Encoded size when it does not depend on the value.
    pub fn fixed_size(&self) -> Option<usize> {
        let size = match self {
            Schema::Null => 0,
            Schema::Boolean | Schema::Int8 | Schema::UInt8 => 1,
            Schema::Int16 | Schema::UInt16 | Schema::BrickColor => 2,
            Schema::Int32 | Schema::UInt32 | Schema::Float32 | Schema::Instance => 4,
            Schema::Float64 | Schema::DateTime => 8,
            Schema::Color3 => 3,
            Schema::Color3Float32 => 12,
            Schema::EnumItem(def) => def.width(),
            Schema::Vector2 => 8,
            Schema::Vector2Int16 => 4,
            Schema::Vector3 => 12,
            Schema::Vector3Int16 => 6,
            Schema::UDim => 6,
            Schema::UDim2 => 12,
            Schema::Region3 => 24,
            Schema::Region3Int16 => 12,
            Schema::FixedBuffer(n) | Schema::FixedString(n) => *n,
            Schema::BitField(n) => n.div_ceil(8),
            Schema::Dictionary(fields) => fields_fixed_size(fields)?,
            Schema::SparseDictionary { optional, required } if optional.is_empty() => {
                fields_fixed_size(required)?
            }
            Schema::Object(marshaller) => fields_fixed_size(marshaller.fields())?,
            Schema::CFrame
            | Schema::Buffer(_)
            | Schema::String(_)
            | Schema::Array(_)
            | Schema::SparseDictionary { .. }
            | Schema::Map { .. }
            | Schema::Nullable(_) => return None,
        };
        Some(size)
    }

    /// Whether a missing or null value is a valid input.
    pub fn accepts_null(&self) -> bool {
        matches!(self, Schema::Null | Schema::Nullable(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Null => "null",
            Schema::Boolean => "boolean",
            Schema::Int8 => "int8",
            Schema::Int16 => "int16",
            Schema::Int32 => "int32",
            Schema::UInt8 => "uint8",
            Schema::UInt16 => "uint16",
            Schema::UInt32 => "uint32",
            Schema::Float32 => "float32",
            Schema::Float64 => "float64",
            Schema::DateTime => "DateTime",
            Schema::Color3 => "Color3",
            Schema::Color3Float32 => "Color3float32",
            Schema::BrickColor => "BrickColor",
            Schema::EnumItem(_) => "EnumItem",
            Schema::Vector2 => "Vector2",
            Schema::Vector2Int16 => "Vector2int16",
            Schema::Vector3 => "Vector3",
            Schema::Vector3Int16 => "Vector3int16",
            Schema::CFrame => "CFrame",
            Schema::UDim => "UDim",
            Schema::UDim2 => "UDim2",
            Schema::Region3 => "Region3",
            Schema::Region3Int16 => "Region3int16",
            Schema::Buffer(WidthClass::W8) => "buffer8",
            Schema::Buffer(WidthClass::W16) => "buffer16",
            Schema::Buffer(WidthClass::W32) => "buffer32",
            Schema::String(WidthClass::W8) => "string8",
            Schema::String(WidthClass::W16) => "string16",
            Schema::String(WidthClass::W32) => "string32",
            Schema::FixedBuffer(_) => "buffer_fixed",
            Schema::FixedString(_) => "string_fixed",
            Schema::BitField(_) => "BitField",
            Schema::Array(_) => "Array",
            Schema::Dictionary(_) => "Dictionary",
            Schema::SparseDictionary { .. } => "SparseDictionary",
            Schema::Map { .. } => "Map",
            Schema::Nullable(_) => "Nullable",
            Schema::Object(_) => "object",
            Schema::Instance => "Instance",
        }
    }
}

fn fields_fixed_size(fields: &[Field]) -> Option<usize> {
    fields.iter().map(|f| f.schema.fixed_size()).sum()
}
