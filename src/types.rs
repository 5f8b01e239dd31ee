use crate::resolver::ResolvedType;
use crate::tags::{BindingTagKind, BindingTagMap, ValidationTagMap};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A denormalised projection of [`ResolvedType`] used by the route model, so
/// routes can be manipulated without dragging resolver state along.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub kind: String,
    pub name: String,
    pub package: String,
    pub slice_type: String,
    pub array_type: String,
    pub array_length: i64,
    pub map_key_type: String,
    pub map_key_package: String,
    pub map_value_type: String,
    pub map_value_package: String,
    pub map_value_slice_type: String,
    pub map_value_array_type: String,
    pub struct_fields: IndexMap<String, Field>,
    pub is_embedded: bool,
    pub enum_values: Vec<Value>,
    pub enum_names: Vec<String>,
    pub doc: String,
    pub binding_tags: BindingTagMap,
    pub validation_tags: ValidationTagMap,
}

impl Field {
    pub fn from_resolved(resolved: ResolvedType) -> Field {
        Field {
            kind: resolved.kind,
            name: resolved.name,
            package: resolved.package,
            slice_type: resolved.slice_type,
            array_type: resolved.array_type,
            array_length: resolved.array_length,
            map_key_type: resolved.map_key_type,
            map_key_package: resolved.map_key_package,
            map_value_type: resolved.map_value_type,
            map_value_package: resolved.map_value_package,
            map_value_slice_type: resolved.map_value_slice_type,
            map_value_array_type: resolved.map_value_array_type,
            struct_fields: resolved
                .struct_fields
                .into_iter()
                .map(|(name, value)| (name, Field::from_resolved(value)))
                .collect(),
            is_embedded: resolved.is_embedded,
            enum_values: resolved.enum_values,
            enum_names: resolved.enum_names,
            doc: resolved.doc,
            binding_tags: resolved.binding_tags,
            validation_tags: resolved.validation_tags,
        }
    }

    /// A field of a simple kind, as produced by single-value context calls.
    pub fn of_kind(kind: &str) -> Field {
        Field {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
    }
}

/// A single extracted request parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Param {
    pub name: String,
    pub field: Field,
    pub is_required: bool,
    /// `true` when the parameter is populated by struct binding rather than
    /// a single value call.
    pub is_bound: bool,
    pub is_array: bool,
    pub is_map: bool,
}

/// A request-body entry: a [`Param`] plus the content type it binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyParam {
    pub content_type: String,
    pub name: String,
    pub field: Field,
    pub is_required: bool,
    pub is_bound: bool,
    pub is_array: bool,
    pub is_map: bool,
}

/// One discovered response shape for a route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnType {
    pub status_code: u16,
    pub content_type: String,
    pub field: Field,
}

/// A single registered endpoint and everything the walker extracted from its
/// handler.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub path: String,
    pub method: String,
    pub doc: String,
    pub operation_id: String,
    /// The runtime function name the router registered for the handler.
    pub handler: String,
    pub file: String,
    pub line_no: usize,
    pub path_params: Vec<Param>,
    pub query_params: Vec<Param>,
    pub request_headers: Vec<Param>,
    pub response_headers: Vec<Param>,
    pub body: Vec<BodyParam>,
    pub return_types: Vec<ReturnType>,
}

/// Inserts a return type into the set keyed by `(status_code, content_type)`.
/// A second write with the same key replaces the field only when the new
/// field is non-empty.
pub fn add_return_type(mut return_types: Vec<ReturnType>, new: ReturnType) -> Vec<ReturnType> {
    for existing in &mut return_types {
        if existing.status_code == new.status_code && existing.content_type == new.content_type {
            if !new.field.is_empty() {
                existing.field = new.field;
            }
            return return_types;
        }
    }
    return_types.push(new);
    return_types
}

/// Records a component, deduplicated by `(package, name)`. An existing bare
/// placeholder is upgraded when a resolved record with fields arrives.
pub fn add_component(mut components: Vec<Field>, field: Field) -> Vec<Field> {
    if field.package.is_empty() {
        return components;
    }
    let name = if field.name.is_empty() {
        field.kind.clone()
    } else {
        field.name.clone()
    };
    if let Some(existing) = components
        .iter_mut()
        .find(|c| c.package == field.package && c.name == name)
    {
        if existing.struct_fields.is_empty() && !field.struct_fields.is_empty() {
            let mut field = field;
            field.name = name;
            *existing = field;
        }
        return components;
    }
    let mut field = field;
    field.name = name;
    components.push(field);
    components
}

/// Looks a component up by its `(package, name)` identity.
pub fn find_component<'a>(components: &'a [Field], package: &str, name: &str) -> Option<&'a Field> {
    components
        .iter()
        .find(|c| c.package == package && c.name == name)
}

/// Returns the binding kinds present across a struct's fields, and whether
/// the explicit kinds are non-uniform between fields — in which case the
/// emitter produces one schema per kind.
pub fn extract_binding_tags(fields: &IndexMap<String, Field>) -> (Vec<BindingTagKind>, bool) {
    if fields.is_empty() {
        return (vec![BindingTagKind::None], false);
    }

    let mut union: BTreeSet<BindingTagKind> = BTreeSet::new();
    let mut sets: Vec<BTreeSet<BindingTagKind>> = Vec::new();
    for field in fields.values() {
        let set: BTreeSet<BindingTagKind> = field.binding_tags.keys().copied().collect();
        union.extend(set.iter().copied());
        sets.push(set);
    }

    let per_tag = sets.windows(2).any(|pair| pair[0] != pair[1]);
    (union.into_iter().collect(), per_tag)
}

/// The OpenAPI `(type, format)` pair a predefined type maps to. An empty
/// `schema_type` means the type carries no schema of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFormat {
    pub schema_type: String,
    pub format: String,
}

impl TypeFormat {
    fn new(schema_type: &str, format: &str) -> TypeFormat {
        TypeFormat {
            schema_type: schema_type.to_string(),
            format: format.to_string(),
        }
    }
}

/// The predefined mapping from accepted type names to OpenAPI types.
pub static PREDEFINED_TYPE_MAP: Lazy<BTreeMap<&'static str, TypeFormat>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    map.insert("string", TypeFormat::new("string", ""));
    map.insert("bool", TypeFormat::new("boolean", ""));
    map.insert("int", TypeFormat::new("integer", ""));
    map.insert("int8", TypeFormat::new("integer", ""));
    map.insert("int16", TypeFormat::new("integer", ""));
    map.insert("int32", TypeFormat::new("integer", "int32"));
    map.insert("int64", TypeFormat::new("integer", "int64"));
    map.insert("uint", TypeFormat::new("integer", ""));
    map.insert("uint8", TypeFormat::new("integer", ""));
    map.insert("uint16", TypeFormat::new("integer", ""));
    map.insert("uint32", TypeFormat::new("integer", "int32"));
    map.insert("uint64", TypeFormat::new("integer", "int64"));
    map.insert("uintptr", TypeFormat::new("integer", ""));
    map.insert("rune", TypeFormat::new("integer", "int32"));
    map.insert("byte", TypeFormat::new("string", "byte"));
    map.insert("float32", TypeFormat::new("number", "float"));
    map.insert("float64", TypeFormat::new("number", "double"));
    map.insert("file", TypeFormat::new("string", "binary"));
    map.insert("struct", TypeFormat::new("object", ""));
    map.insert("slice", TypeFormat::new("array", ""));
    map.insert("array", TypeFormat::new("array", ""));
    map.insert("map", TypeFormat::new("object", ""));
    map.insert("any", TypeFormat::new("", ""));
    map.insert("nil", TypeFormat::new("", ""));
    map
});

/// Whether a type name is accepted as-is by the emitter; anything else
/// denotes a reference to a named component.
pub fn is_accepted_type(name: &str) -> bool {
    PREDEFINED_TYPE_MAP.contains_key(name)
}

/// Maps a request/response content type to the binding kind that governs
/// property naming for it.
pub fn content_type_to_binding(content_type: &str) -> BindingTagKind {
    match content_type {
        "application/json" => BindingTagKind::Json,
        "application/xml" => BindingTagKind::Xml,
        "application/yaml" | "application/x-yaml" => BindingTagKind::Yaml,
        "application/x-www-form-urlencoded" | "multipart/form-data" => BindingTagKind::Form,
        _ => BindingTagKind::None,
    }
}

/// The content types a body binding kind expands to.
pub fn binding_to_content_types(kind: BindingTagKind) -> &'static [&'static str] {
    match kind {
        BindingTagKind::Form => &["application/x-www-form-urlencoded"],
        BindingTagKind::Json => &["application/json"],
        BindingTagKind::Xml => &["application/xml"],
        BindingTagKind::Yaml => &["application/yaml"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::parse_struct_tag;

    fn field_with_tag(name: &str, tag: &str) -> Field {
        let (binding_tags, validation_tags) = parse_struct_tag(name, Some(tag));
        Field {
            kind: "string".to_string(),
            binding_tags,
            validation_tags,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_return_type_appends_new_keys() {
        let types = add_return_type(
            Vec::new(),
            ReturnType {
                status_code: 200,
                content_type: "application/json".to_string(),
                field: Field::of_kind("struct"),
            },
        );
        let types = add_return_type(
            types,
            ReturnType {
                status_code: 404,
                content_type: "application/json".to_string(),
                field: Field::of_kind("nil"),
            },
        );
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn test_add_return_type_replaces_only_with_content() {
        let types = add_return_type(
            Vec::new(),
            ReturnType {
                status_code: 200,
                content_type: "application/json".to_string(),
                field: Field::of_kind("User"),
            },
        );
        // An empty field must not clobber the existing one.
        let types = add_return_type(
            types,
            ReturnType {
                status_code: 200,
                content_type: "application/json".to_string(),
                field: Field::default(),
            },
        );
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].field.kind, "User");

        let types = add_return_type(
            types,
            ReturnType {
                status_code: 200,
                content_type: "application/json".to_string(),
                field: Field::of_kind("Contact"),
            },
        );
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].field.kind, "Contact");
    }

    #[test]
    fn test_add_component_dedups_by_package_and_name() {
        let user = Field {
            kind: "struct".to_string(),
            name: "User".to_string(),
            package: "example.com/demo/models".to_string(),
            ..Default::default()
        };
        let components = add_component(Vec::new(), user.clone());
        let components = add_component(components, user);
        assert_eq!(components.len(), 1);
    }

    #[test]
    fn test_add_component_upgrades_placeholder() {
        let bare = Field {
            kind: "struct".to_string(),
            name: "User".to_string(),
            package: "p".to_string(),
            ..Default::default()
        };
        let mut resolved = bare.clone();
        resolved
            .struct_fields
            .insert("ID".to_string(), Field::of_kind("int"));

        let components = add_component(Vec::new(), bare);
        let components = add_component(components, resolved);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].struct_fields.len(), 1);
    }

    #[test]
    fn test_extract_binding_tags_uniform() {
        let mut fields = IndexMap::new();
        fields.insert("ID".to_string(), field_with_tag("ID", "json:\"id\""));
        fields.insert("Name".to_string(), field_with_tag("Name", "json:\"name\""));
        let (kinds, per_tag) = extract_binding_tags(&fields);
        assert!(!per_tag);
        assert!(kinds.contains(&BindingTagKind::Json));
        assert!(kinds.contains(&BindingTagKind::None));
    }

    #[test]
    fn test_extract_binding_tags_non_uniform() {
        let mut fields = IndexMap::new();
        fields.insert("ID".to_string(), field_with_tag("ID", "json:\"id\""));
        fields.insert("Name".to_string(), field_with_tag("Name", "yaml:\"name\""));
        let (kinds, per_tag) = extract_binding_tags(&fields);
        assert!(per_tag);
        assert!(kinds.contains(&BindingTagKind::Json));
        assert!(kinds.contains(&BindingTagKind::Yaml));
    }

    #[test]
    fn test_content_type_binding_round_trip() {
        assert_eq!(
            content_type_to_binding("application/json"),
            BindingTagKind::Json
        );
        assert_eq!(
            content_type_to_binding("multipart/form-data"),
            BindingTagKind::Form
        );
        assert_eq!(
            binding_to_content_types(BindingTagKind::Form),
            &["application/x-www-form-urlencoded"]
        );
        assert!(binding_to_content_types(BindingTagKind::Header).is_empty());
    }

    #[test]
    fn test_predefined_types() {
        assert!(is_accepted_type("string"));
        assert!(is_accepted_type("nil"));
        assert!(!is_accepted_type("User"));
        assert_eq!(PREDEFINED_TYPE_MAP["int64"].format, "int64");
        assert_eq!(PREDEFINED_TYPE_MAP["file"].schema_type, "string");
    }
}
