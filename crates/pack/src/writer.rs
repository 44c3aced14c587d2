//! Schema-driven encoder.
//!
//! A write runs in three phases:
//!
//! 1. **prepare** walks the schema and value together, validating types,
//!    ranges and capacities while summing the exact encoded size;
//! 2. **tag** assigns reference tags to every instance met in (1), which is
//!    the only step that can suspend;
//! 3. **emit** allocates the output once and walks the tree again, writing
//!    through a [`BitCursor`].

use indexmap::IndexMap;
use pack_buffers::BitCursor;

use crate::error::{PackError, Result};
use crate::marshal::ObjectMarshaller;
use crate::options::{FixedLengthPolicy, PackOptions};
use crate::references::{ReferenceTable, Uid};
use crate::schema::{Field, Schema, WidthClass, MAX_COLLECTION_LEN};
use crate::types::*;
use crate::value::{InstanceRef, ObjectRef, Value};

static NULL: Value = Value::Null;

/// Output of the prepare phase.
#[derive(Default)]
struct Plan {
    size: usize,
    /// Instances in traversal order.
    instances: Vec<InstanceRef>,
    /// Extracted object fields in traversal order, so getters run once.
    objects: Vec<IndexMap<String, Value>>,
}

struct Emitter<'p> {
    cursor: BitCursor<Vec<u8>>,
    plan: &'p Plan,
    uids: &'p [Uid],
    next_instance: usize,
    next_object: usize,
}

/// Encodes values against a schema.
#[derive(Debug, Clone, Copy)]
pub struct Writer<'a> {
    references: &'a ReferenceTable,
    options: PackOptions,
}

impl<'a> Writer<'a> {
    pub fn new(references: &'a ReferenceTable, options: PackOptions) -> Self {
        Self {
            references,
            options,
        }
    }

    /// Encodes `value`, blocking the calling thread while fresh instances
    /// are tagged.
    pub fn write(&self, schema: &Schema, value: &Value) -> Result<Vec<u8>> {
        let mut plan = Plan::default();
        self.size(schema, value, &mut plan)?;
        let uids = futures::executor::block_on(self.tag_all(&plan.instances));
        self.emit_planned(&plan, &uids, |e| e.emit(schema, value))
    }

    /// Encodes `value`, awaiting the tagging of fresh instances.
    pub async fn write_async(&self, schema: &Schema, value: &Value) -> Result<Vec<u8>> {
        let mut plan = Plan::default();
        self.size(schema, value, &mut plan)?;
        let uids = self.tag_all(&plan.instances).await;
        self.emit_planned(&plan, &uids, |e| e.emit(schema, value))
    }

    /// Encodes the declared fields of `object`.
    pub fn write_object(
        &self,
        marshaller: &ObjectMarshaller,
        object: &ObjectRef,
    ) -> Result<Vec<u8>> {
        let values = marshaller.extract(object);
        let mut plan = Plan::default();
        self.size_fields(marshaller.fields(), &values, &mut plan)?;
        let uids = futures::executor::block_on(self.tag_all(&plan.instances));
        self.emit_planned(&plan, &uids, |e| e.emit_fields(marshaller.fields(), &values))
    }

    async fn tag_all(&self, instances: &[InstanceRef]) -> Vec<Uid> {
        let mut uids = Vec::with_capacity(instances.len());
        for instance in instances {
            uids.push(self.references.tag(instance).await);
        }
        uids
    }

    fn emit_planned(
        &self,
        plan: &Plan,
        uids: &[Uid],
        walk: impl FnOnce(&mut Emitter<'_>) -> Result<()>,
    ) -> Result<Vec<u8>> {
        let mut emitter = Emitter {
            cursor: BitCursor::new(vec![0; plan.size]),
            plan,
            uids,
            next_instance: 0,
            next_object: 0,
        };
        walk(&mut emitter)?;
        debug_assert_eq!(emitter.cursor.x, plan.size, "emitted size differs from plan");
        tracing::trace!(bytes = plan.size, instances = uids.len(), "wrote value");
        Ok(emitter.cursor.into_inner())
    }

    // ------------------------------------------------------------------
    // Prepare

    fn size(&self, schema: &Schema, value: &Value, plan: &mut Plan) -> Result<()> {
        if let Some(size) = self.leaf_size(schema, value)? {
            plan.size += size;
            return Ok(());
        }
        match schema {
            Schema::Buffer(width) => {
                let data = buffer(value)?;
                check_width(schema, *width, data.len())?;
                plan.size += width.prefix_len() + data.len();
            }
            Schema::String(width) => {
                let text = string(value)?;
                check_width(schema, *width, text.len())?;
                plan.size += width.prefix_len() + text.len();
            }
            Schema::FixedBuffer(n) => {
                self.check_fixed(schema, *n, buffer(value)?.len())?;
                plan.size += n;
            }
            Schema::FixedString(n) => {
                self.check_fixed(schema, *n, string(value)?.len())?;
                plan.size += n;
            }
            Schema::BitField(n) => {
                // Missing trailing flags are false under every policy.
                let len = bits(value)?.len();
                if len > *n {
                    return Err(PackError::CapacityExceeded {
                        kind: schema.kind_name(),
                        len,
                        max: *n,
                    });
                }
                plan.size += n.div_ceil(8);
            }
            Schema::CFrame => {
                let Value::CFrame(frame) = value else {
                    return Err(mismatch("CFrame", value));
                };
                plan.size += if frame.axis_aligned_index().is_some() {
                    crate::schema::CFRAME_AXIS_ALIGNED_SIZE
                } else {
                    crate::schema::CFRAME_QUATERNION_SIZE
                };
            }
            Schema::Array(element) => {
                let items = array(value)?;
                check_count(schema, items.len())?;
                plan.size += 2;
                for item in items {
                    self.size(element, item, plan)?;
                }
            }
            Schema::Dictionary(fields) => self.size_fields(fields, dictionary(value)?, plan)?,
            Schema::SparseDictionary { optional, required } => {
                let entries = dictionary(value)?;
                self.size_fields(required, entries, plan)?;
                plan.size += optional.len().div_ceil(8);
                for field in optional {
                    if let Some(item) = present(entries, field) {
                        self.size(&field.schema, item, plan)?;
                    }
                }
            }
            Schema::Map { key, value: item } => {
                let Value::Map(pairs) = value else {
                    return Err(mismatch("map", value));
                };
                check_count(schema, pairs.len())?;
                plan.size += 2;
                for (k, v) in pairs {
                    self.size(key, k, plan)?;
                    self.size(item, v, plan)?;
                }
            }
            Schema::Nullable(inner) => {
                plan.size += 1;
                if !value.is_null() {
                    self.size(inner, value, plan)?;
                }
            }
            Schema::Object(marshaller) => {
                let Value::Object(object) = value else {
                    return Err(mismatch("object", value));
                };
                let slot = plan.objects.len();
                plan.objects.push(IndexMap::new());
                let entries = marshaller.extract(object);
                self.size_fields(marshaller.fields(), &entries, plan)?;
                plan.objects[slot] = entries;
            }
            Schema::Instance => {
                match value {
                    Value::Instance(Some(instance)) => plan.instances.push(instance.clone()),
                    Value::Instance(None) => {}
                    other => return Err(mismatch("Instance", other)),
                }
                plan.size += 4;
            }
            // Leaves were sized by `leaf_size`.
            _ => {}
        }
        Ok(())
    }

    fn size_fields(
        &self,
        fields: &[Field],
        entries: &IndexMap<String, Value>,
        plan: &mut Plan,
    ) -> Result<()> {
        for field in fields {
            self.size(&field.schema, field_value(entries, field)?, plan)?;
        }
        Ok(())
    }

    /// Validates a fixed-size leaf and returns its size, or `None` for
    /// nodes that need the full walk.
    fn leaf_size(&self, schema: &Schema, value: &Value) -> Result<Option<usize>> {
        match schema {
            Schema::Null => {
                if !value.is_null() {
                    return Err(mismatch("null", value));
                }
            }
            Schema::Boolean => {
                boolean(value)?;
            }
            Schema::Int8 => {
                integer(schema, value, i8::MIN as i64, i8::MAX as i64)?;
            }
            Schema::Int16 => {
                integer(schema, value, i16::MIN as i64, i16::MAX as i64)?;
            }
            Schema::Int32 => {
                integer(schema, value, i32::MIN as i64, i32::MAX as i64)?;
            }
            Schema::UInt8 => {
                integer(schema, value, 0, u8::MAX as i64)?;
            }
            Schema::UInt16 => {
                integer(schema, value, 0, u16::MAX as i64)?;
            }
            Schema::UInt32 => {
                integer(schema, value, 0, u32::MAX as i64)?;
            }
            Schema::Float32 | Schema::Float64 => {
                number(value)?;
            }
            Schema::DateTime => {
                date_time(value)?;
            }
            Schema::Color3 | Schema::Color3Float32 => {
                color(value)?;
            }
            Schema::BrickColor => {
                brick_color(value)?;
            }
            Schema::EnumItem(def) => {
                enum_value(def, value)?;
            }
            Schema::Vector2 => {
                let Value::Vector2(_) = value else {
                    return Err(mismatch("Vector2", value));
                };
            }
            Schema::Vector2Int16 => {
                let Value::Vector2Int16(_) = value else {
                    return Err(mismatch("Vector2int16", value));
                };
            }
            Schema::Vector3 => {
                vector3(value)?;
            }
            Schema::Vector3Int16 => {
                let Value::Vector3Int16(_) = value else {
                    return Err(mismatch("Vector3int16", value));
                };
            }
            Schema::UDim => {
                let Value::UDim(udim) = value else {
                    return Err(mismatch("UDim", value));
                };
                udim_offset(udim)?;
            }
            Schema::UDim2 => {
                let Value::UDim2(udim2) = value else {
                    return Err(mismatch("UDim2", value));
                };
                udim_offset(&udim2.x)?;
                udim_offset(&udim2.y)?;
            }
            Schema::Region3 => {
                let Value::Region3(_) = value else {
                    return Err(mismatch("Region3", value));
                };
            }
            Schema::Region3Int16 => {
                let Value::Region3Int16(_) = value else {
                    return Err(mismatch("Region3int16", value));
                };
            }
            _ => return Ok(None),
        }
        Ok(schema.fixed_size())
    }

    fn check_fixed(&self, schema: &Schema, expected: usize, actual: usize) -> Result<()> {
        if actual > expected {
            return Err(PackError::CapacityExceeded {
                kind: schema.kind_name(),
                len: actual,
                max: expected,
            });
        }
        if actual < expected && self.options.fixed_length == FixedLengthPolicy::Strict {
            return Err(PackError::FixedLengthMismatch {
                kind: schema.kind_name(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl Emitter<'_> {
    fn emit(&mut self, schema: &Schema, value: &Value) -> Result<()> {
        let cursor = &mut self.cursor;
        match schema {
            Schema::Null => {}
            Schema::Boolean => cursor.write_u8(boolean(value)? as u8),
            Schema::Int8 => cursor.write_i8(integer(schema, value, i8::MIN as i64, i8::MAX as i64)? as i8),
            Schema::Int16 => {
                cursor.write_i16(integer(schema, value, i16::MIN as i64, i16::MAX as i64)? as i16)
            }
            Schema::Int32 => {
                cursor.write_i32(integer(schema, value, i32::MIN as i64, i32::MAX as i64)? as i32)
            }
            Schema::UInt8 => cursor.write_u8(integer(schema, value, 0, u8::MAX as i64)? as u8),
            Schema::UInt16 => cursor.write_u16(integer(schema, value, 0, u16::MAX as i64)? as u16),
            Schema::UInt32 => cursor.write_u32(integer(schema, value, 0, u32::MAX as i64)? as u32),
            Schema::Float32 => cursor.write_f32(number(value)? as f32),
            Schema::Float64 => cursor.write_f64(number(value)?),
            Schema::DateTime => cursor.write_i64(date_time(value)?),
            Schema::Color3 => {
                let c = color(value)?;
                for channel in [c.r, c.g, c.b] {
                    cursor.write_u8((channel.clamp(0.0, 1.0) * 255.0).round() as u8);
                }
            }
            Schema::Color3Float32 => {
                let c = color(value)?;
                cursor.write_f32(c.r);
                cursor.write_f32(c.g);
                cursor.write_f32(c.b);
            }
            Schema::BrickColor => cursor.write_u16(brick_color(value)?),
            Schema::EnumItem(def) => {
                let encoded = enum_value(def, value)?;
                if def.width() == 1 {
                    cursor.write_u8(encoded as u8);
                } else {
                    cursor.write_u16(encoded);
                }
            }
            Schema::Vector2 => {
                let Value::Vector2(v) = value else {
                    return Err(mismatch("Vector2", value));
                };
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
            }
            Schema::Vector2Int16 => {
                let Value::Vector2Int16(v) = value else {
                    return Err(mismatch("Vector2int16", value));
                };
                cursor.write_i16(v.x);
                cursor.write_i16(v.y);
            }
            Schema::Vector3 => write_vector3(cursor, vector3(value)?),
            Schema::Vector3Int16 => {
                let Value::Vector3Int16(v) = value else {
                    return Err(mismatch("Vector3int16", value));
                };
                write_vector3_int16(cursor, v);
            }
            Schema::CFrame => {
                let Value::CFrame(frame) = value else {
                    return Err(mismatch("CFrame", value));
                };
                write_cframe(cursor, frame);
            }
            Schema::UDim => {
                let Value::UDim(udim) = value else {
                    return Err(mismatch("UDim", value));
                };
                write_udim(cursor, udim)?;
            }
            Schema::UDim2 => {
                let Value::UDim2(udim2) = value else {
                    return Err(mismatch("UDim2", value));
                };
                write_udim(cursor, &udim2.x)?;
                write_udim(cursor, &udim2.y)?;
            }
            Schema::Region3 => {
                let Value::Region3(region) = value else {
                    return Err(mismatch("Region3", value));
                };
                write_vector3(cursor, &region.min);
                write_vector3(cursor, &region.max);
            }
            Schema::Region3Int16 => {
                let Value::Region3Int16(region) = value else {
                    return Err(mismatch("Region3int16", value));
                };
                write_vector3_int16(cursor, &region.min);
                write_vector3_int16(cursor, &region.max);
            }
            Schema::Buffer(width) => {
                let data = buffer(value)?;
                write_prefix(cursor, *width, data.len());
                cursor.write_bytes(data);
            }
            Schema::String(width) => {
                let text = string(value)?;
                write_prefix(cursor, *width, text.len());
                cursor.write_bytes(text.as_bytes());
            }
            Schema::FixedBuffer(n) => write_padded(cursor, buffer(value)?, *n),
            Schema::FixedString(n) => write_padded(cursor, string(value)?.as_bytes(), *n),
            Schema::BitField(n) => write_bits(cursor, bits(value)?.iter().copied(), *n),
            Schema::Array(element) => {
                let items = array(value)?;
                cursor.write_u16(items.len() as u16);
                for item in items {
                    self.emit(element, item)?;
                }
            }
            Schema::Dictionary(fields) => self.emit_fields(fields, dictionary(value)?)?,
            Schema::SparseDictionary { optional, required } => {
                let entries = dictionary(value)?;
                self.emit_fields(required, entries)?;
                let presence = optional.iter().map(|f| present(entries, f).is_some());
                write_bits(&mut self.cursor, presence, optional.len());
                for field in optional {
                    if let Some(item) = present(entries, field) {
                        self.emit(&field.schema, item)?;
                    }
                }
            }
            Schema::Map { key, value: item } => {
                let Value::Map(pairs) = value else {
                    return Err(mismatch("map", value));
                };
                cursor.write_u16(pairs.len() as u16);
                for (k, v) in pairs {
                    self.emit(key, k)?;
                    self.emit(item, v)?;
                }
            }
            Schema::Nullable(inner) => {
                if value.is_null() {
                    cursor.write_u8(0);
                } else {
                    cursor.write_u8(1);
                    self.emit(inner, value)?;
                }
            }
            Schema::Object(marshaller) => {
                let plan = self.plan;
                let entries = plan
                    .objects
                    .get(self.next_object)
                    .ok_or_else(|| PackError::Object {
                        prototype: marshaller.prototype().name().to_owned(),
                        detail: "object was not prepared".into(),
                    })?;
                self.next_object += 1;
                self.emit_fields(marshaller.fields(), entries)?;
            }
            Schema::Instance => {
                let uid = match value {
                    Value::Instance(Some(_)) => {
                        let uid = *self
                            .uids
                            .get(self.next_instance)
                            .ok_or(PackError::UntaggedInstance)?;
                        self.next_instance += 1;
                        uid
                    }
                    _ => 0,
                };
                self.cursor.write_u32(uid);
            }
        }
        Ok(())
    }

    fn emit_fields(&mut self, fields: &[Field], entries: &IndexMap<String, Value>) -> Result<()> {
        for field in fields {
            self.emit(&field.schema, field_value(entries, field)?)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Value accessors

fn mismatch(expected: &'static str, found: &Value) -> PackError {
    PackError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

fn field_value<'v>(entries: &'v IndexMap<String, Value>, field: &Field) -> Result<&'v Value> {
    let value = entries.get(&field.name).unwrap_or(&NULL);
    if value.is_null() && !field.schema.accepts_null() {
        return Err(PackError::MissingField(field.name.clone()));
    }
    Ok(value)
}

fn present<'v>(entries: &'v IndexMap<String, Value>, field: &Field) -> Option<&'v Value> {
    entries.get(&field.name).filter(|v| !v.is_null())
}

fn boolean(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(mismatch("boolean", other)),
    }
}

fn integer(schema: &Schema, value: &Value, min: i64, max: i64) -> Result<i64> {
    match value {
        Value::Int(i) if (min..=max).contains(i) => Ok(*i),
        Value::Int(i) => Err(PackError::OutOfRange {
            kind: schema.kind_name(),
            value: i.to_string(),
        }),
        other => Err(mismatch("integer", other)),
    }
}

fn number(value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch("number", value))
}

fn date_time(value: &Value) -> Result<i64> {
    match value {
        Value::DateTime(ms) => Ok(*ms),
        other => Err(mismatch("DateTime", other)),
    }
}

fn color(value: &Value) -> Result<&Color3> {
    match value {
        Value::Color3(c) => Ok(c),
        other => Err(mismatch("Color3", other)),
    }
}

fn brick_color(value: &Value) -> Result<u16> {
    match value {
        Value::BrickColor(n) => Ok(*n),
        other => Err(mismatch("BrickColor", other)),
    }
}

fn enum_value(def: &crate::schema::EnumDef, value: &Value) -> Result<u16> {
    let Value::EnumItem(item) = value else {
        return Err(mismatch("EnumItem", value));
    };
    def.value_of(item).ok_or_else(|| PackError::UnknownEnumItem {
        name: def.name.clone(),
        item: item.clone(),
    })
}

fn vector3(value: &Value) -> Result<&Vector3> {
    match value {
        Value::Vector3(v) => Ok(v),
        other => Err(mismatch("Vector3", other)),
    }
}

fn udim_offset(udim: &UDim) -> Result<i16> {
    i16::try_from(udim.offset).map_err(|_| PackError::OutOfRange {
        kind: "UDim offset",
        value: udim.offset.to_string(),
    })
}

fn buffer(value: &Value) -> Result<&[u8]> {
    match value {
        Value::Buffer(data) => Ok(data),
        other => Err(mismatch("buffer", other)),
    }
}

fn string(value: &Value) -> Result<&str> {
    match value {
        Value::Str(text) => Ok(text),
        other => Err(mismatch("string", other)),
    }
}

fn bits(value: &Value) -> Result<&[bool]> {
    match value {
        Value::BitField(bits) => Ok(bits),
        other => Err(mismatch("bit field", other)),
    }
}

fn array(value: &Value) -> Result<&[Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch("array", other)),
    }
}

fn dictionary(value: &Value) -> Result<&IndexMap<String, Value>> {
    match value {
        Value::Dictionary(entries) => Ok(entries),
        other => Err(mismatch("dictionary", other)),
    }
}

fn check_width(schema: &Schema, width: WidthClass, len: usize) -> Result<()> {
    if len > width.max_len() {
        return Err(PackError::CapacityExceeded {
            kind: schema.kind_name(),
            len,
            max: width.max_len(),
        });
    }
    Ok(())
}

fn check_count(schema: &Schema, len: usize) -> Result<()> {
    if len > MAX_COLLECTION_LEN {
        return Err(PackError::CapacityExceeded {
            kind: schema.kind_name(),
            len,
            max: MAX_COLLECTION_LEN,
        });
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Emit helpers

fn write_prefix(cursor: &mut BitCursor<Vec<u8>>, width: WidthClass, len: usize) {
    match width {
        WidthClass::W8 => cursor.write_u8(len as u8),
        WidthClass::W16 => cursor.write_u16(len as u16),
        WidthClass::W32 => cursor.write_u32(len as u32),
    }
}

/// The output starts zeroed, so padding is a cursor move.
fn write_padded(cursor: &mut BitCursor<Vec<u8>>, data: &[u8], n: usize) {
    cursor.write_bytes(data);
    cursor.move_cursor((n - data.len()) as isize);
}

/// Packs `n` flags LSB-first, 8 per byte. Missing trailing flags are false.
fn write_bits(cursor: &mut BitCursor<Vec<u8>>, flags: impl Iterator<Item = bool>, n: usize) {
    let mut bytes = vec![0u8; n.div_ceil(8)];
    for (i, flag) in flags.take(n).enumerate() {
        if flag {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    cursor.write_bytes(&bytes);
}

fn write_vector3(cursor: &mut BitCursor<Vec<u8>>, v: &Vector3) {
    cursor.write_f32(v.x);
    cursor.write_f32(v.y);
    cursor.write_f32(v.z);
}

fn write_vector3_int16(cursor: &mut BitCursor<Vec<u8>>, v: &Vector3Int16) {
    cursor.write_i16(v.x);
    cursor.write_i16(v.y);
    cursor.write_i16(v.z);
}

fn write_udim(cursor: &mut BitCursor<Vec<u8>>, udim: &UDim) -> Result<()> {
    cursor.write_f32(udim.scale);
    cursor.write_i16(udim_offset(udim)?);
    Ok(())
}

/// Position, then a rotation header. Axis-aligned rotations are a table
/// index; others drop the largest quaternion component and pack the other
/// three as 16-bit minifloats.
fn write_cframe(cursor: &mut BitCursor<Vec<u8>>, frame: &CFrame) {
    write_vector3(cursor, &frame.position);
    if let Some(index) = frame.axis_aligned_index() {
        cursor.write_u8(index);
        return;
    }
    let q = frame.to_quaternion();
    let mut largest = 0;
    for i in 1..4 {
        if q[i].abs() > q[largest].abs() {
            largest = i;
        }
    }
    // q and -q are the same rotation; keep the dropped component positive.
    let sign = if q[largest] < 0.0 { -1.0 } else { 1.0 };
    let mut rest = (0..4).filter(|&i| i != largest).map(|i| q[i] * sign);
    let mut next = || rest.next().unwrap_or(0.0);
    cursor.write_u8(24 + largest as u8);
    cursor.write_n_bit_float(4, 11, 0, next());
    cursor.write_n_bit_float(4, 11, 16, next());
    cursor.move_cursor(4);
    cursor.write_n_bit_float(4, 11, 0, next());
    cursor.move_cursor(2);
}
