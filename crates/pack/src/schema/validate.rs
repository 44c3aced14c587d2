//! Definition-time schema validation.

use std::collections::HashSet;

use super::schema::*;
use crate::error::SchemaError;

/// Validates a schema tree for structural integrity.
///
/// Paths in errors start at `$` and name fields with `.name`, array
/// elements with `[]`, map keys/values with `{key}`/`{value}` and nullable
/// payloads with `?`.
pub fn validate_schema(schema: &Schema) -> Result<(), SchemaError> {
    validate_at(schema, "$")
}

fn validate_at(schema: &Schema, path: &str) -> Result<(), SchemaError> {
    match schema {
        Schema::FixedBuffer(0) | Schema::FixedString(0) | Schema::BitField(0) => {
            Err(SchemaError::NonPositiveLength { path: path.into() })
        }
        Schema::EnumItem(def) => validate_enum(def, path),
        Schema::Array(element) => validate_at(element, &format!("{path}[]")),
        Schema::Dictionary(fields) => validate_fields(fields, path, &mut HashSet::new()),
        Schema::SparseDictionary { optional, required } => {
            let mut seen = HashSet::new();
            validate_fields(required, path, &mut seen)?;
            validate_fields(optional, path, &mut seen)?;
            for field in optional {
                if matches!(field.schema, Schema::Nullable(_)) {
                    tracing::warn!(
                        path,
                        field = %field.name,
                        "optional field is wrapped in Nullable; optional fields are already nullable"
                    );
                }
            }
            Ok(())
        }
        Schema::Map { key, value } => {
            validate_at(key, &format!("{path}{{key}}"))?;
            validate_at(value, &format!("{path}{{value}}"))
        }
        Schema::Nullable(inner) => validate_at(inner, &format!("{path}?")),
        Schema::Object(marshaller) => {
            validate_fields(marshaller.fields(), path, &mut HashSet::new())
        }
        _ => Ok(()),
    }
}

fn validate_fields<'a>(
    fields: &'a [Field],
    path: &str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), SchemaError> {
    for field in fields {
        if field.name.is_empty() {
            return Err(SchemaError::EmptyFieldName { path: path.into() });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                path: path.into(),
                name: field.name.clone(),
            });
        }
        validate_at(&field.schema, &format!("{path}.{}", field.name))?;
    }
    Ok(())
}

fn validate_enum(def: &EnumDef, path: &str) -> Result<(), SchemaError> {
    let count = def.items.len();
    if count == 0 || count > 1 << 16 {
        return Err(SchemaError::EnumCapacity {
            path: path.into(),
            name: def.name.clone(),
            count,
        });
    }
    let mut names = HashSet::with_capacity(count);
    let mut values = HashSet::with_capacity(count);
    for item in &def.items {
        if !names.insert(item.name.as_str()) {
            return Err(SchemaError::DuplicateEnumItem {
                path: path.into(),
                name: def.name.clone(),
                item: item.name.clone(),
            });
        }
        if !values.insert(item.value) {
            return Err(SchemaError::DuplicateEnumValue {
                path: path.into(),
                name: def.name.clone(),
                value: item.value,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn test_zero_length_fixed_string() {
        let s = SchemaBuilder::new();
        let schema = s.Dictionary([("name", s.string_fixed(0))]);
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::NonPositiveLength {
                path: "$.name".into()
            })
        );
    }

    #[test]
    fn test_duplicate_across_sparse_sections() {
        let s = SchemaBuilder::new();
        let schema = s.SparseDictionary([("id", s.uint8())], [("id", s.uint16())]);
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::DuplicateField {
                path: "$".into(),
                name: "id".into()
            })
        );
    }

    #[test]
    fn test_nested_path() {
        let s = SchemaBuilder::new();
        let schema = s.Array(s.Nullable(s.Dictionary([("", s.boolean())])));
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::EmptyFieldName {
                path: "$[]?".into()
            })
        );
    }

    #[test]
    fn test_enum_rules() {
        let s = SchemaBuilder::new();
        let empty = s.EnumItem(EnumDef::sequential("Empty", Vec::<String>::new()));
        assert!(matches!(
            validate_schema(&empty),
            Err(SchemaError::EnumCapacity { count: 0, .. })
        ));
        let dup = s.EnumItem(EnumDef::sequential("KeyCode", ["A", "B", "A"]));
        assert!(matches!(
            validate_schema(&dup),
            Err(SchemaError::DuplicateEnumItem { .. })
        ));
        let shared = s.EnumItem(EnumDef::new("KeyCode", [("A", 97), ("a", 97)]));
        assert_eq!(
            validate_schema(&shared),
            Err(SchemaError::DuplicateEnumValue {
                path: "$".into(),
                name: "KeyCode".into(),
                value: 97,
            })
        );
    }

    #[test]
    fn test_deep_valid_schema() {
        let s = SchemaBuilder::new();
        let schema = s.Map(
            s.string8(),
            s.Array(s.Dictionary([("pos", s.Vector3()), ("tag", s.Nullable(s.string_fixed(4)))])),
        );
        assert_eq!(validate_schema(&schema), Ok(()));
    }
}
