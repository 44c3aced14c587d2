//! Object marshalling: fields round-trip, behavior comes back through the
//! prototype.

use std::any::Any;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use pack::{
    FixedLengthPolicy, Instance, InstanceRef, Marshal, ObjectMarshaller, ObjectRef, Pack,
    PackError, PackOptions, Prototype, ReferenceTable, Schema, SchemaBuilder, TagSlot, Uid, Value,
    Vector3,
};

#[derive(Debug, Default)]
struct Projectile {
    position: Vector3,
    velocity: Vector3,
    owner: String,
    hits: Mutex<u32>,
}

impl Projectile {
    fn advance(&self, dt: f32) -> Vector3 {
        Vector3::new(
            self.position.x + self.velocity.x * dt,
            self.position.y + self.velocity.y * dt,
            self.position.z + self.velocity.z * dt,
        )
    }

    fn register_hit(&self) -> u32 {
        let mut hits = self.hits.lock().unwrap();
        *hits += 1;
        *hits
    }
}

impl Marshal for Projectile {
    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "position" => Some(Value::Vector3(self.position)),
            "velocity" => Some(Value::Vector3(self.velocity)),
            "owner" => Some(Value::from(self.owner.as_str())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), String> {
        match (name, value) {
            ("position", Value::Vector3(v)) => self.position = v,
            ("velocity", Value::Vector3(v)) => self.velocity = v,
            ("owner", Value::Str(s)) => self.owner = s,
            (name, _) => return Err(format!("unknown field {name}")),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ProjectilePrototype;

impl Prototype for ProjectilePrototype {
    fn name(&self) -> &str {
        "Projectile"
    }

    fn construct(&self) -> Box<dyn Marshal> {
        Box::new(Projectile::default())
    }
}

fn projectile_schema(s: SchemaBuilder) -> Schema {
    s.Object(
        Arc::new(ProjectilePrototype),
        [
            ("position", s.Vector3()),
            ("velocity", s.Vector3()),
            ("owner", s.string8()),
        ],
    )
}

fn sample() -> ObjectRef {
    ObjectRef::new(Projectile {
        position: Vector3::new(1.0, 2.0, 3.0),
        velocity: Vector3::new(0.5, 0.0, -1.0),
        owner: "player1".into(),
        hits: Mutex::new(4),
    })
}

#[test]
fn object_roundtrip_keeps_behavior() {
    let s = SchemaBuilder::new();
    let schema = Pack::new()
        .with_references(Arc::new(ReferenceTable::new()))
        .define_schema(projectile_schema(s))
        .unwrap();
    let original = sample();
    let bytes = schema.write(&Value::Object(original.clone())).unwrap();
    assert_eq!(bytes.len(), 12 + 12 + 1 + 7);
    assert_eq!(schema.fixed_size(), None);

    let Value::Object(copy) = schema.read(&bytes).unwrap() else {
        panic!("expected object");
    };
    assert_ne!(copy, original, "read builds a new object");
    let projectile = copy.downcast_ref::<Projectile>().unwrap();
    assert_eq!(projectile.owner, "player1");
    assert_eq!(projectile.advance(2.0), Vector3::new(2.0, 2.0, 1.0));
    // Undeclared state is not serialized.
    assert_eq!(projectile.register_hit(), 1);
}

#[test]
fn objects_nest_inside_structures() {
    let s = SchemaBuilder::new();
    let schema = Pack::new()
        .with_references(Arc::new(ReferenceTable::new()))
        .define_schema(s.Dictionary([
            ("wave", s.uint8()),
            ("projectiles", s.Array(projectile_schema(s))),
            ("leader", s.Nullable(projectile_schema(s))),
        ]))
        .unwrap();
    let value = Value::dictionary([
        ("wave", Value::Int(3)),
        (
            "projectiles",
            Value::Array(vec![Value::Object(sample()), Value::Object(sample())]),
        ),
        ("leader", Value::Null),
    ]);
    let bytes = schema.write(&value).unwrap();
    let read = schema.read(&bytes).unwrap();

    let Some(Value::Array(items)) = read.get("projectiles") else {
        panic!("expected projectiles");
    };
    assert_eq!(items.len(), 2);
    for item in items {
        let Value::Object(object) = item else {
            panic!("expected object");
        };
        let projectile = object.downcast_ref::<Projectile>().unwrap();
        assert_eq!(projectile.position, Vector3::new(1.0, 2.0, 3.0));
    }
    assert_eq!(read.get("leader"), Some(&Value::Null));
}

#[test]
fn marshaller_reads_and_writes_directly() {
    let s = SchemaBuilder::new();
    let Schema::Object(marshaller) = projectile_schema(s) else {
        panic!("expected object schema");
    };
    let bytes = marshaller.write(&sample()).unwrap();
    let copy = marshaller.read(&bytes).unwrap();
    let projectile = copy.downcast_ref::<Projectile>().unwrap();
    assert_eq!(projectile.velocity, Vector3::new(0.5, 0.0, -1.0));
    assert_eq!(marshaller.prototype().name(), "Projectile");
}

#[derive(Debug)]
struct Partial;

impl Marshal for Partial {
    fn get_field(&self, name: &str) -> Option<Value> {
        (name == "position").then(|| Value::Vector3(Vector3::default()))
    }

    fn set_field(&mut self, _: &str, _: Value) -> Result<(), String> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn missing_object_field_is_reported() {
    let s = SchemaBuilder::new();
    let marshaller = ObjectMarshaller::new(
        Arc::new(ProjectilePrototype),
        vec![
            pack::Field::new("position", s.Vector3()),
            pack::Field::new("owner", s.string8()),
        ],
    );
    let err = marshaller.write(&ObjectRef::new(Partial)).unwrap_err();
    assert_eq!(err, PackError::MissingField("owner".into()));
}

#[derive(Debug, Default)]
struct Anchor {
    slot: TagSlot,
}

impl Instance for Anchor {
    fn tag(&self) -> Option<Uid> {
        self.slot.get()
    }

    fn attach_tag(&self, uid: Uid) -> BoxFuture<'_, ()> {
        self.slot.set(uid);
        Box::pin(futures::future::ready(()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct Beacon {
    code: String,
    anchor: Option<InstanceRef>,
}

impl Marshal for Beacon {
    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "code" => Some(Value::from(self.code.as_str())),
            "anchor" => Some(Value::Instance(self.anchor.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), String> {
        match (name, value) {
            ("code", Value::Str(s)) => self.code = s,
            ("anchor", Value::Instance(anchor)) => self.anchor = anchor,
            (name, _) => return Err(format!("unknown field {name}")),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct BeaconPrototype;

impl Prototype for BeaconPrototype {
    fn name(&self) -> &str {
        "Beacon"
    }

    fn construct(&self) -> Box<dyn Marshal> {
        Box::new(Beacon::default())
    }
}

#[test]
fn marshaller_uses_the_pack_context() {
    let s = SchemaBuilder::new();
    let marshaller = ObjectMarshaller::new(
        Arc::new(BeaconPrototype),
        vec![
            pack::Field::new("code", s.string_fixed(4)),
            pack::Field::new("anchor", s.Instance()),
        ],
    );
    let table = Arc::new(ReferenceTable::new());
    let pack = Pack::new().with_references(Arc::clone(&table));
    let anchor = InstanceRef::new(Anchor::default());
    let beacon = ObjectRef::new(Beacon {
        code: "AB12".into(),
        anchor: Some(anchor.clone()),
    });

    let bytes = marshaller.write_in(&pack, &beacon).unwrap();
    assert_eq!(bytes, vec![b'A', b'B', b'1', b'2', 1, 0, 0, 0]);
    assert_eq!(table.resolve(1), Some(anchor.clone()));
    let copy = marshaller.read_in(&pack, &bytes).unwrap();
    assert_eq!(copy.downcast_ref::<Beacon>().unwrap().anchor, Some(anchor));

    let strict = pack.with_options(PackOptions {
        fixed_length: FixedLengthPolicy::Strict,
        ..PackOptions::default()
    });
    let short = ObjectRef::new(Beacon {
        code: "AB".into(),
        anchor: None,
    });
    assert!(matches!(
        marshaller.write_in(&strict, &short),
        Err(PackError::FixedLengthMismatch { .. })
    ));
    assert!(marshaller.write(&short).is_ok());
}
