//! Schema-driven decoder.

use indexmap::IndexMap;
use pack_buffers::BitCursor;

use crate::error::{PackError, Result};
use crate::marshal::ObjectMarshaller;
use crate::options::PackOptions;
use crate::references::ReferenceTable;
use crate::schema::{EnumDef, Field, Schema, WidthClass};
use crate::types::*;
use crate::value::{ObjectRef, Value};

/// Decodes values in the order [`Writer`](crate::Writer) emitted them.
///
/// The cursor is public for callers that mix schema reads with primitive
/// reads of their own framing.
#[derive(Debug)]
pub struct Reader<'a> {
    pub cursor: BitCursor<&'a [u8]>,
    references: &'a ReferenceTable,
    options: PackOptions,
}

impl<'a> Reader<'a> {
    /// A reader with default options, resolving instances through the
    /// global [`ReferenceTable`].
    pub fn new(uint8: &'a [u8]) -> Self {
        Self::with_context(uint8, ReferenceTable::global(), PackOptions::default())
    }

    pub fn with_context(
        uint8: &'a [u8],
        references: &'a ReferenceTable,
        options: PackOptions,
    ) -> Self {
        Self {
            cursor: BitCursor::new(uint8),
            references,
            options,
        }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.options.bounds_check {
            self.cursor.ensure(n)?;
        }
        Ok(())
    }

    pub fn read(&mut self, schema: &Schema) -> Result<Value> {
        let start = self.cursor.x;
        let value = self.read_value(schema)?;
        tracing::trace!(bytes = self.cursor.x - start, kind = schema.kind_name(), "read value");
        Ok(value)
    }

    /// Reads the declared fields of an object and rebuilds it through the
    /// marshaller's prototype.
    pub fn read_object(&mut self, marshaller: &ObjectMarshaller) -> Result<ObjectRef> {
        let entries = self.read_fields(marshaller.fields())?;
        marshaller.rehydrate(entries)
    }

    fn read_value(&mut self, schema: &Schema) -> Result<Value> {
        if let Some(size) = leaf_size(schema) {
            self.need(size)?;
        }
        let c = &mut self.cursor;
        let value = match schema {
            Schema::Null => Value::Null,
            Schema::Boolean => Value::Bool(c.u8() != 0),
            Schema::Int8 => Value::Int(c.i8() as i64),
            Schema::Int16 => Value::Int(c.i16() as i64),
            Schema::Int32 => Value::Int(c.i32() as i64),
            Schema::UInt8 => Value::Int(c.u8() as i64),
            Schema::UInt16 => Value::Int(c.u16() as i64),
            Schema::UInt32 => Value::Int(c.u32() as i64),
            Schema::Float32 => Value::Float(c.f32() as f64),
            Schema::Float64 => Value::Float(c.f64()),
            Schema::DateTime => Value::DateTime(c.i64()),
            Schema::Color3 => Value::Color3(Color3::from_rgb(c.u8(), c.u8(), c.u8())),
            Schema::Color3Float32 => Value::Color3(Color3 {
                r: c.f32(),
                g: c.f32(),
                b: c.f32(),
            }),
            Schema::BrickColor => Value::BrickColor(c.u16()),
            Schema::EnumItem(def) => read_enum(c, def)?,
            Schema::Vector2 => Value::Vector2(Vector2 {
                x: c.f32(),
                y: c.f32(),
            }),
            Schema::Vector2Int16 => Value::Vector2Int16(Vector2Int16 {
                x: c.i16(),
                y: c.i16(),
            }),
            Schema::Vector3 => Value::Vector3(read_vector3(c)),
            Schema::Vector3Int16 => Value::Vector3Int16(read_vector3_int16(c)),
            Schema::UDim => Value::UDim(read_udim(c)),
            Schema::UDim2 => Value::UDim2(UDim2 {
                x: read_udim(c),
                y: read_udim(c),
            }),
            Schema::Region3 => Value::Region3(Region3 {
                min: read_vector3(c),
                max: read_vector3(c),
            }),
            Schema::Region3Int16 => Value::Region3Int16(Region3Int16 {
                min: read_vector3_int16(c),
                max: read_vector3_int16(c),
            }),
            Schema::CFrame => Value::CFrame(self.read_cframe()?),
            Schema::Buffer(width) => {
                let len = self.read_prefix(*width)?;
                self.need(len)?;
                Value::Buffer(self.cursor.bytes(len).to_vec())
            }
            Schema::String(width) => {
                let len = self.read_prefix(*width)?;
                self.need(len)?;
                Value::Str(self.cursor.string(len)?.to_owned())
            }
            Schema::FixedBuffer(n) => Value::Buffer(c.bytes(*n).to_vec()),
            Schema::FixedString(n) => {
                let offset = c.x;
                let data = c.bytes(*n);
                let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                let text = std::str::from_utf8(&data[..end])
                    .map_err(|_| PackError::InvalidUtf8 { offset })?;
                Value::Str(text.to_owned())
            }
            Schema::BitField(n) => Value::BitField(read_bits(c, *n)),
            Schema::Array(element) => {
                self.need(2)?;
                let count = self.cursor.u16() as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(element)?);
                }
                Value::Array(items)
            }
            Schema::Dictionary(fields) => Value::Dictionary(self.read_fields(fields)?),
            Schema::SparseDictionary { optional, required } => {
                let mut entries = self.read_fields(required)?;
                self.need(optional.len().div_ceil(8))?;
                let presence = read_bits(&mut self.cursor, optional.len());
                for (field, present) in optional.iter().zip(presence) {
                    if present {
                        let item = self.read_value(&field.schema)?;
                        entries.insert(field.name.clone(), item);
                    }
                }
                Value::Dictionary(entries)
            }
            Schema::Map { key, value } => {
                self.need(2)?;
                let count = self.cursor.u16() as usize;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = self.read_value(key)?;
                    let v = self.read_value(value)?;
                    pairs.push((k, v));
                }
                Value::Map(pairs)
            }
            Schema::Nullable(inner) => {
                self.need(1)?;
                if self.cursor.u8() == 0 {
                    Value::Null
                } else {
                    self.read_value(inner)?
                }
            }
            Schema::Object(marshaller) => Value::Object(self.read_object(marshaller)?),
            Schema::Instance => {
                let uid = c.u32();
                if uid == 0 {
                    Value::Instance(None)
                } else {
                    let instance = self.references.resolve(uid);
                    if instance.is_none() {
                        tracing::warn!(uid, "reference tag does not resolve to a live instance");
                    }
                    Value::Instance(instance)
                }
            }
        };
        Ok(value)
    }

    fn read_fields(&mut self, fields: &[Field]) -> Result<IndexMap<String, Value>> {
        let mut entries = IndexMap::with_capacity(fields.len());
        for field in fields {
            let value = self.read_value(&field.schema)?;
            entries.insert(field.name.clone(), value);
        }
        Ok(entries)
    }

    fn read_prefix(&mut self, width: WidthClass) -> Result<usize> {
        self.need(width.prefix_len())?;
        Ok(match width {
            WidthClass::W8 => self.cursor.u8() as usize,
            WidthClass::W16 => self.cursor.u16() as usize,
            WidthClass::W32 => self.cursor.u32() as usize,
        })
    }

    fn read_cframe(&mut self) -> Result<CFrame> {
        use crate::schema::{CFRAME_AXIS_ALIGNED_SIZE, CFRAME_QUATERNION_SIZE};

        self.need(CFRAME_AXIS_ALIGNED_SIZE)?;
        let c = &mut self.cursor;
        let position = read_vector3(c);
        let header = c.u8();
        match header {
            0..=23 => Ok(CFrame {
                position,
                rotation: axis_aligned_rotations()[header as usize],
            }),
            24..=27 => {
                self.need(CFRAME_QUATERNION_SIZE - CFRAME_AXIS_ALIGNED_SIZE)?;
                let c = &mut self.cursor;
                let a = c.n_bit_float(4, 11, 0);
                let b = c.n_bit_float(4, 11, 16);
                c.move_cursor(4);
                let d = c.n_bit_float(4, 11, 0);
                c.move_cursor(2);
                let largest = (header - 24) as usize;
                let dropped = (1.0 - a * a - b * b - d * d).max(0.0).sqrt();
                let mut rest = [a, b, d].into_iter();
                let mut q = [0.0; 4];
                for (i, slot) in q.iter_mut().enumerate() {
                    *slot = if i == largest {
                        dropped
                    } else {
                        rest.next().unwrap_or(0.0)
                    };
                }
                Ok(CFrame::from_quaternion(position, q))
            }
            _ => Err(PackError::InvalidData {
                kind: "CFrame",
                detail: format!("rotation header {header}"),
            }),
        }
    }
}

/// Bytes a node needs up front, for nodes whose size does not depend on
/// the data.
fn leaf_size(schema: &Schema) -> Option<usize> {
    match schema {
        Schema::Dictionary(_) | Schema::SparseDictionary { .. } | Schema::Object(_) => None,
        _ => schema.fixed_size(),
    }
}

fn read_enum(c: &mut BitCursor<&[u8]>, def: &EnumDef) -> Result<Value> {
    let encoded = if def.width() == 1 {
        c.u8() as u16
    } else {
        c.u16()
    };
    def.item_of(encoded)
        .map(|item| Value::EnumItem(item.to_owned()))
        .ok_or_else(|| PackError::InvalidData {
            kind: "EnumItem",
            detail: format!("no item with value {encoded} in enum `{}`", def.name),
        })
}

fn read_bits(c: &mut BitCursor<&[u8]>, n: usize) -> Vec<bool> {
    let bytes = c.bytes(n.div_ceil(8));
    (0..n).map(|i| bytes[i / 8] >> (i % 8) & 1 == 1).collect()
}

fn read_vector3(c: &mut BitCursor<&[u8]>) -> Vector3 {
    Vector3 {
        x: c.f32(),
        y: c.f32(),
        z: c.f32(),
    }
}

fn read_vector3_int16(c: &mut BitCursor<&[u8]>) -> Vector3Int16 {
    Vector3Int16 {
        x: c.i16(),
        y: c.i16(),
        z: c.i16(),
    }
}

fn read_udim(c: &mut BitCursor<&[u8]>) -> UDim {
    UDim {
        scale: c.f32(),
        offset: c.i16() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    fn read(schema: &Schema, data: &[u8]) -> Result<Value> {
        let table = ReferenceTable::new();
        Reader::with_context(data, &table, PackOptions::default()).read(schema)
    }

    #[test]
    fn test_read_dictionary() {
        let s = SchemaBuilder::new();
        let schema = s.Dictionary([("a", s.uint8()), ("b", s.int16())]);
        let value = read(&schema, &[7, 0xfe, 0xff]).unwrap();
        assert_eq!(value, Value::dictionary([("a", Value::Int(7)), ("b", Value::Int(-2))]));
    }

    #[test]
    fn test_fixed_string_strips_padding() {
        let s = SchemaBuilder::new();
        let value = read(&s.string_fixed(5), b"abc\0\0").unwrap();
        assert_eq!(value, Value::from("abc"));
    }

    #[test]
    fn test_short_buffer() {
        let s = SchemaBuilder::new();
        let err = read(&s.Vector3(), &[0; 11]).unwrap_err();
        assert!(matches!(err, PackError::BufferUnderrun(_)));
        let err = read(&s.string8(), &[5, b'a']).unwrap_err();
        assert!(matches!(err, PackError::BufferUnderrun(_)));
    }

    #[test]
    fn test_invalid_utf8() {
        let s = SchemaBuilder::new();
        let err = read(&s.string8(), &[2, 0xc3, 0x28]).unwrap_err();
        assert_eq!(err, PackError::InvalidUtf8 { offset: 1 });
    }

    #[test]
    fn test_unknown_enum_value() {
        let s = SchemaBuilder::new();
        let schema = s.EnumItem(EnumDef::new("Material", [("Plastic", 3), ("Wood", 7)]));
        assert_eq!(read(&schema, &[7]).unwrap(), Value::EnumItem("Wood".into()));
        assert!(matches!(
            read(&schema, &[1]),
            Err(PackError::InvalidData { kind: "EnumItem", .. })
        ));
    }

    #[test]
    fn test_unknown_uid_reads_as_none() {
        let s = SchemaBuilder::new();
        assert_eq!(read(&s.Instance(), &[9, 0, 0, 0]).unwrap(), Value::Instance(None));
        assert_eq!(read(&s.Instance(), &[0, 0, 0, 0]).unwrap(), Value::Instance(None));
    }

    #[test]
    fn test_invalid_cframe_header() {
        let s = SchemaBuilder::new();
        let mut data = vec![0u8; 12];
        data.push(28);
        assert!(matches!(
            read(&s.CFrame(), &data),
            Err(PackError::InvalidData { kind: "CFrame", .. })
        ));
    }

    #[test]
    fn test_cursor_is_shared_with_caller() {
        let s = SchemaBuilder::new();
        let data = [0xaa, 3, 0];
        let table = ReferenceTable::new();
        let mut reader = Reader::with_context(&data, &table, PackOptions::default());
        assert_eq!(reader.cursor.u8(), 0xaa);
        assert_eq!(reader.read(&s.uint16()).unwrap(), Value::Int(3));
        assert_eq!(reader.cursor.remaining(), 0);
    }
}
