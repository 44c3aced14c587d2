//! Schema-driven binary codec for structured runtime values.
//!
//! A schema describes the exact byte layout of a value. Writing a value
//! produces the smallest buffer that layout allows, with no type tags and no
//! field names on the wire; reading walks the same schema to rebuild it.
//!
//! # Example
//!
//! ```
//! use pack::{Pack, SchemaBuilder, Value, Vector3};
//!
//! let s = SchemaBuilder::new();
//! let schema = Pack::new()
//!     .define_schema(s.Dictionary([
//!         ("id", s.uint16()),
//!         ("position", s.Vector3()),
//!         ("nickname", s.Nullable(s.string8())),
//!     ]))
//!     .unwrap();
//!
//! let value = Value::dictionary([
//!     ("id", Value::Int(7)),
//!     ("position", Value::Vector3(Vector3::new(1.0, 2.0, 3.0))),
//! ]);
//! let bytes = schema.write(&value).unwrap();
//! assert_eq!(bytes.len(), 2 + 12 + 1);
//!
//! let decoded = schema.read(&bytes).unwrap();
//! assert_eq!(decoded.get("id"), Some(&Value::Int(7)));
//! assert_eq!(decoded.get("nickname"), Some(&Value::Null));
//! ```

mod error;
mod options;
mod pack;
mod types;
mod value;

pub mod marshal;
pub mod reader;
pub mod references;
pub mod schema;
pub mod writer;

pub use error::{PackError, Result, SchemaError};
pub use marshal::{Marshal, ObjectMarshaller, Prototype};
pub use options::{FixedLengthPolicy, PackOptions};
pub use pack::{Pack, PackSchema};
pub use reader::Reader;
pub use references::{Instance, ReferenceTable, TagSlot, Uid};
pub use schema::{validate_schema, EnumDef, EnumItemDef, Field, Schema, SchemaBuilder, WidthClass};
pub use types::{
    axis_aligned_rotations, CFrame, Color3, Quaternion, Region3, Region3Int16, Rotation, UDim,
    UDim2, Vector2, Vector2Int16, Vector3, Vector3Int16,
};
pub use value::{InstanceRef, ObjectRef, Value};
pub use writer::Writer;

pub use pack_buffers::{BitCursor, BufferError};
